// Asset store - filesystem layout under a library root
//
// Stored files are addressed by content hash: media/<kind>/<aa>/<sha>.<ext>
// where <aa> is the first two hex digits of the digest. Thumbnails and the
// embedding cache follow the same fan-out. All writes go through a temp
// file and rename so a crash never leaves a partial file at a final path.

use std::path::{Path, PathBuf};

use crate::constants::{EMBEDDINGS_FOLDER, MEDIA_FOLDER, THUMBS_FOLDER, THUMB_FORMAT};
use crate::error::{Result, VaultError};
use crate::model::AssetKind;

#[derive(Debug, Clone)]
pub struct AssetStore {
    root: PathBuf,
}

impl AssetStore {
    /// Open the store, creating the library folder structure if needed.
    pub fn open(root: &Path) -> Result<Self> {
        for folder in [MEDIA_FOLDER, THUMBS_FOLDER, EMBEDDINGS_FOLDER] {
            std::fs::create_dir_all(root.join(folder))?;
        }
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn fan_out(digest: &str) -> &str {
        if digest.len() >= 2 {
            &digest[..2]
        } else {
            digest
        }
    }

    /// Deterministic path for a stored asset file.
    pub fn media_path(&self, kind: AssetKind, sha256: &str, ext: &str) -> PathBuf {
        self.root
            .join(MEDIA_FOLDER)
            .join(kind.as_str())
            .join(Self::fan_out(sha256))
            .join(format!("{}.{}", sha256, ext))
    }

    /// Deterministic path for a derived thumbnail.
    pub fn thumb_path(&self, kind: AssetKind, sha256: &str) -> PathBuf {
        self.root
            .join(THUMBS_FOLDER)
            .join(kind.as_str())
            .join(Self::fan_out(sha256))
            .join(format!("{}.{}", sha256, THUMB_FORMAT))
    }

    /// Cache path for a computed tag embedding, keyed by digest of the
    /// normalized tag text.
    pub fn embedding_path(&self, key: &str) -> PathBuf {
        self.root
            .join(EMBEDDINGS_FOLDER)
            .join(format!("{}.json", key))
    }

    /// Write `data` to `path` atomically (temp file + rename).
    pub async fn write_atomic(&self, path: &Path, data: &[u8]) -> Result<()> {
        let parent = path
            .parent()
            .ok_or_else(|| VaultError::InvalidPath(path.display().to_string()))?;
        tokio::fs::create_dir_all(parent).await?;

        let tmp_path = path.with_extension("tmp");
        if let Err(e) = tokio::fs::write(&tmp_path, data).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }
        tokio::fs::rename(&tmp_path, path).await?;
        Ok(())
    }

    /// Delete a file, treating "already missing" as success.
    /// Returns whether a file was actually removed.
    pub async fn remove_file(&self, path: &Path) -> Result<bool> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
