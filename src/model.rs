// Asset record types shared across the vault

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::TIMESTAMP_FORMAT;
use crate::error::{Result, VaultError};

/// The two cached media kinds. Content hashes are unique per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Image,
    Video,
}

impl AssetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetKind::Image => "image",
            AssetKind::Video => "video",
        }
    }

    pub fn parse(s: &str) -> Option<AssetKind> {
        match s {
            "image" => Some(AssetKind::Image),
            "video" => Some(AssetKind::Video),
            _ => None,
        }
    }
}

/// Stream details recorded for video assets only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoMeta {
    pub duration_ms: i64,
    pub fps: Option<f64>,
    pub video_codec: Option<String>,
    pub audio_codec: Option<String>,
    pub bitrate: Option<i64>,
    pub has_audio: bool,
}

/// Provenance of a downloaded asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetSource {
    pub provider: String,
    pub url: Option<String>,
}

/// A cached media file plus its metadata.
///
/// `sha256` is the digest of the bytes actually stored (post-optimization if
/// one was applied); `original_sha256` is the digest of the bytes as
/// received. They match when no transform occurred.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetRecord {
    pub id: String,
    pub kind: AssetKind,
    pub sha256: String,
    pub original_sha256: String,
    pub filename: String,
    pub ext: String,
    pub bytes: i64,
    pub width: i32,
    pub height: i32,
    pub video: Option<VideoMeta>,
    pub provider: Option<String>,
    pub source_url: Option<String>,
    pub path: String,
    pub thumb_path: Option<String>,
    pub embedding: Vec<f32>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
}

impl AssetRecord {
    /// Bump `last_used_at`, never decreasing it.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.last_used_at {
            self.last_used_at = now;
        }
    }
}

/// Normalize a raw tag list: trim, lowercase, drop empties, dedup, sort.
/// Sorted output gives sets a stable representation for comparison.
pub fn normalize_tags(raw: &[String]) -> Vec<String> {
    let mut tags: Vec<String> = raw
        .iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();
    tags.sort();
    tags.dedup();
    tags
}

/// Union of two normalized tag sets.
pub fn merge_tags(existing: &[String], incoming: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = existing.to_vec();
    merged.extend(incoming.iter().cloned());
    merged.sort();
    merged.dedup();
    merged
}

/// Format a timestamp for persistence (fixed-width UTC, sortable).
pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a persisted timestamp.
pub fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| VaultError::Metadata(format!("Bad timestamp '{}': {}", s, e)))
}
