// SQLite metadata store
//
// Embedded persistence engine for the `MetadataStore` capability.
// Migrations are forward-only. Never edit or delete a migration after it
// ships.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use crate::constants::DB_FILENAME;
use crate::error::{Result, VaultError};
use crate::meta::{AssetOrder, AssetQuery, MetadataStore};
use crate::model::{format_ts, parse_ts, AssetKind, AssetRecord, VideoMeta};

/// All migrations in order. Each migration is a SQL string.
const MIGRATIONS: &[&str] = &[
    // Migration 1: Initial schema
    r#"
    CREATE TABLE assets (
        id TEXT PRIMARY KEY,
        kind TEXT NOT NULL CHECK (kind IN ('image', 'video')),
        sha256 TEXT NOT NULL,
        original_sha256 TEXT NOT NULL,
        filename TEXT NOT NULL,
        ext TEXT NOT NULL,
        bytes INTEGER NOT NULL,
        width INTEGER NOT NULL,
        height INTEGER NOT NULL,
        duration_ms INTEGER,
        fps REAL,
        video_codec TEXT,
        audio_codec TEXT,
        bitrate INTEGER,
        has_audio INTEGER,
        provider TEXT,
        source_url TEXT,
        path TEXT NOT NULL,
        thumb_path TEXT,
        embedding TEXT NOT NULL DEFAULT '[]',
        created_at TEXT NOT NULL,
        last_used_at TEXT NOT NULL,
        UNIQUE (kind, sha256)
    );

    CREATE INDEX idx_assets_original ON assets(kind, original_sha256);
    CREATE INDEX idx_assets_last_used ON assets(kind, last_used_at);

    CREATE TABLE asset_tags (
        asset_id TEXT NOT NULL REFERENCES assets(id) ON DELETE CASCADE,
        tag TEXT NOT NULL,
        PRIMARY KEY (asset_id, tag)
    );

    CREATE INDEX idx_asset_tags_tag ON asset_tags(tag);
    "#,
];

/// Get the database path for a library root.
pub fn db_path(library_root: &Path) -> PathBuf {
    library_root.join(DB_FILENAME)
}

fn run_migrations(conn: &Connection) -> Result<()> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    for (idx, migration) in MIGRATIONS.iter().enumerate() {
        let target = (idx + 1) as i64;
        if version < target {
            conn.execute_batch(migration)?;
            conn.execute_batch(&format!("PRAGMA user_version = {};", target))?;
        }
    }

    Ok(())
}

fn open_connection(path: Option<&Path>) -> Result<Connection> {
    let conn = match path {
        Some(p) => Connection::open(p)?,
        None => Connection::open_in_memory()?,
    };

    // Foreign keys must be enabled per connection; tag rows cascade with
    // their asset.
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.execute_batch("PRAGMA journal_mode = WAL;")?;

    run_migrations(&conn)?;
    Ok(conn)
}

pub struct SqliteStore {
    conn: Mutex<Option<Connection>>,
}

impl SqliteStore {
    /// Open or create a database at the given path.
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self {
            conn: Mutex::new(Some(open_connection(Some(db_path))?)),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            conn: Mutex::new(Some(open_connection(None)?)),
        })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut guard = self
            .conn
            .lock()
            .map_err(|_| VaultError::Metadata("Connection lock poisoned".to_string()))?;
        let conn = guard.as_mut().ok_or(VaultError::Disposed)?;
        f(conn)
    }
}

const ASSET_COLUMNS: &str = "id, kind, sha256, original_sha256, filename, ext, bytes, width, height, \
     duration_ms, fps, video_codec, audio_codec, bitrate, has_audio, \
     provider, source_url, path, thumb_path, embedding, created_at, last_used_at";

/// Raw row before JSON/timestamp parsing, which rusqlite's row closure
/// cannot express cleanly.
struct RawRow {
    id: String,
    kind: String,
    sha256: String,
    original_sha256: String,
    filename: String,
    ext: String,
    bytes: i64,
    width: i32,
    height: i32,
    duration_ms: Option<i64>,
    fps: Option<f64>,
    video_codec: Option<String>,
    audio_codec: Option<String>,
    bitrate: Option<i64>,
    has_audio: Option<bool>,
    provider: Option<String>,
    source_url: Option<String>,
    path: String,
    thumb_path: Option<String>,
    embedding: String,
    created_at: String,
    last_used_at: String,
}

fn read_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok(RawRow {
        id: row.get(0)?,
        kind: row.get(1)?,
        sha256: row.get(2)?,
        original_sha256: row.get(3)?,
        filename: row.get(4)?,
        ext: row.get(5)?,
        bytes: row.get(6)?,
        width: row.get(7)?,
        height: row.get(8)?,
        duration_ms: row.get(9)?,
        fps: row.get(10)?,
        video_codec: row.get(11)?,
        audio_codec: row.get(12)?,
        bitrate: row.get(13)?,
        has_audio: row.get(14)?,
        provider: row.get(15)?,
        source_url: row.get(16)?,
        path: row.get(17)?,
        thumb_path: row.get(18)?,
        embedding: row.get(19)?,
        created_at: row.get(20)?,
        last_used_at: row.get(21)?,
    })
}

fn finish_row(conn: &Connection, raw: RawRow) -> Result<AssetRecord> {
    let kind = AssetKind::parse(&raw.kind)
        .ok_or_else(|| VaultError::Metadata(format!("Unknown asset kind '{}'", raw.kind)))?;

    let video = raw.duration_ms.map(|duration_ms| VideoMeta {
        duration_ms,
        fps: raw.fps,
        video_codec: raw.video_codec.clone(),
        audio_codec: raw.audio_codec.clone(),
        bitrate: raw.bitrate,
        has_audio: raw.has_audio.unwrap_or(false),
    });

    let embedding: Vec<f32> = serde_json::from_str(&raw.embedding)?;

    let mut stmt =
        conn.prepare("SELECT tag FROM asset_tags WHERE asset_id = ?1 ORDER BY tag")?;
    let tags = stmt
        .query_map(params![raw.id], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;

    Ok(AssetRecord {
        id: raw.id,
        kind,
        sha256: raw.sha256,
        original_sha256: raw.original_sha256,
        filename: raw.filename,
        ext: raw.ext,
        bytes: raw.bytes,
        width: raw.width,
        height: raw.height,
        video,
        provider: raw.provider,
        source_url: raw.source_url,
        path: raw.path,
        thumb_path: raw.thumb_path,
        embedding,
        tags,
        created_at: parse_ts(&raw.created_at)?,
        last_used_at: parse_ts(&raw.last_used_at)?,
    })
}

fn build_filter(kind: Option<AssetKind>, query: &AssetQuery) -> (String, Vec<Value>) {
    let mut clauses: Vec<String> = Vec::new();
    let mut params: Vec<Value> = Vec::new();

    if let Some(kind) = kind {
        clauses.push("kind = ?".to_string());
        params.push(Value::from(kind.as_str().to_string()));
    }
    if let Some(ref ids) = query.ids {
        if ids.is_empty() {
            clauses.push("0".to_string());
        } else {
            let placeholders = vec!["?"; ids.len()].join(", ");
            clauses.push(format!("id IN ({})", placeholders));
            params.extend(ids.iter().map(|id| Value::from(id.clone())));
        }
    }
    if let Some(ref tags) = query.any_tags {
        if tags.is_empty() {
            clauses.push("0".to_string());
        } else {
            let placeholders = vec!["?"; tags.len()].join(", ");
            clauses.push(format!(
                "id IN (SELECT asset_id FROM asset_tags WHERE tag IN ({}))",
                placeholders
            ));
            params.extend(tags.iter().map(|t| Value::from(t.clone())));
        }
    }
    if let Some(min_width) = query.min_width {
        clauses.push("width >= ?".to_string());
        params.push(Value::from(min_width as i64));
    }
    if let Some(min_height) = query.min_height {
        clauses.push("height >= ?".to_string());
        params.push(Value::from(min_height as i64));
    }
    if let Some(min_duration) = query.min_duration_ms {
        // NULL duration (image rows) never satisfies the comparison
        clauses.push("duration_ms >= ?".to_string());
        params.push(Value::from(min_duration));
    }

    let where_clause = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };
    (where_clause, params)
}

fn order_clause(order: AssetOrder) -> &'static str {
    match order {
        AssetOrder::LastUsedDesc => " ORDER BY last_used_at DESC",
        AssetOrder::LastUsedAsc => " ORDER BY last_used_at ASC",
        AssetOrder::CreatedDesc => " ORDER BY created_at DESC",
    }
}

fn select_assets(
    conn: &Connection,
    kind: Option<AssetKind>,
    query: &AssetQuery,
) -> Result<Vec<AssetRecord>> {
    let (where_clause, params) = build_filter(kind, query);
    let mut sql = format!(
        "SELECT {} FROM assets{}{}",
        ASSET_COLUMNS,
        where_clause,
        order_clause(query.order)
    );
    if let Some(limit) = query.limit {
        sql.push_str(&format!(" LIMIT {}", limit));
    }

    let mut stmt = conn.prepare(&sql)?;
    let raw_rows = stmt
        .query_map(params_from_iter(params), read_raw)?
        .collect::<rusqlite::Result<Vec<RawRow>>>()?;

    raw_rows
        .into_iter()
        .map(|raw| finish_row(conn, raw))
        .collect()
}

fn insert_tags(conn: &Connection, asset_id: &str, tags: &[String]) -> Result<()> {
    let mut stmt =
        conn.prepare("INSERT OR IGNORE INTO asset_tags (asset_id, tag) VALUES (?1, ?2)")?;
    for tag in tags {
        stmt.execute(params![asset_id, tag])?;
    }
    Ok(())
}

fn write_record(conn: &Connection, record: &AssetRecord) -> Result<usize> {
    let video = record.video.as_ref();
    let changed = conn.execute(
        "UPDATE assets SET sha256 = ?2, original_sha256 = ?3, filename = ?4, ext = ?5,
                bytes = ?6, width = ?7, height = ?8, duration_ms = ?9, fps = ?10,
                video_codec = ?11, audio_codec = ?12, bitrate = ?13, has_audio = ?14,
                provider = ?15, source_url = ?16, path = ?17, thumb_path = ?18,
                embedding = ?19, last_used_at = ?20
         WHERE id = ?1",
        params![
            record.id,
            record.sha256,
            record.original_sha256,
            record.filename,
            record.ext,
            record.bytes,
            record.width,
            record.height,
            video.map(|v| v.duration_ms),
            video.and_then(|v| v.fps),
            video.and_then(|v| v.video_codec.clone()),
            video.and_then(|v| v.audio_codec.clone()),
            video.and_then(|v| v.bitrate),
            video.map(|v| v.has_audio),
            record.provider,
            record.source_url,
            record.path,
            record.thumb_path,
            serde_json::to_string(&record.embedding)?,
            format_ts(record.last_used_at),
        ],
    )?;
    if changed > 0 {
        conn.execute(
            "DELETE FROM asset_tags WHERE asset_id = ?1",
            params![record.id],
        )?;
        insert_tags(conn, &record.id, &record.tags)?;
    }
    Ok(changed)
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn insert(&self, record: &AssetRecord) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let video = record.video.as_ref();
            let inserted = tx.execute(
                "INSERT INTO assets (id, kind, sha256, original_sha256, filename, ext, bytes,
                        width, height, duration_ms, fps, video_codec, audio_codec, bitrate,
                        has_audio, provider, source_url, path, thumb_path, embedding,
                        created_at, last_used_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                        ?16, ?17, ?18, ?19, ?20, ?21, ?22)",
                params![
                    record.id,
                    record.kind.as_str(),
                    record.sha256,
                    record.original_sha256,
                    record.filename,
                    record.ext,
                    record.bytes,
                    record.width,
                    record.height,
                    video.map(|v| v.duration_ms),
                    video.and_then(|v| v.fps),
                    video.and_then(|v| v.video_codec.clone()),
                    video.and_then(|v| v.audio_codec.clone()),
                    video.and_then(|v| v.bitrate),
                    video.map(|v| v.has_audio),
                    record.provider,
                    record.source_url,
                    record.path,
                    record.thumb_path,
                    serde_json::to_string(&record.embedding)?,
                    format_ts(record.created_at),
                    format_ts(record.last_used_at),
                ],
            );
            match inserted {
                Ok(_) => {}
                Err(ref e) if is_constraint_violation(e) => {
                    return Err(VaultError::DuplicateHash(record.sha256.clone()));
                }
                Err(e) => return Err(e.into()),
            }
            insert_tags(&tx, &record.id, &record.tags)?;
            tx.commit()?;
            Ok(())
        })
    }

    async fn get(&self, kind: AssetKind, id: &str) -> Result<Option<AssetRecord>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM assets WHERE kind = ?1 AND id = ?2",
                ASSET_COLUMNS
            );
            let raw = conn
                .query_row(&sql, params![kind.as_str(), id], read_raw)
                .optional()?;
            raw.map(|r| finish_row(conn, r)).transpose()
        })
    }

    async fn find_by_digest(&self, kind: AssetKind, digest: &str) -> Result<Option<AssetRecord>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM assets
                 WHERE kind = ?1 AND (sha256 = ?2 OR original_sha256 = ?2)",
                ASSET_COLUMNS
            );
            let raw = conn
                .query_row(&sql, params![kind.as_str(), digest], read_raw)
                .optional()?;
            raw.map(|r| finish_row(conn, r)).transpose()
        })
    }

    async fn list(&self, kind: AssetKind, query: &AssetQuery) -> Result<Vec<AssetRecord>> {
        self.with_conn(|conn| select_assets(conn, Some(kind), query))
    }

    async fn list_all(&self, query: &AssetQuery) -> Result<Vec<AssetRecord>> {
        self.with_conn(|conn| select_assets(conn, None, query))
    }

    async fn update(&self, record: &AssetRecord) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let changed = write_record(&tx, record)?;
            if changed == 0 {
                return Err(VaultError::AssetNotFound(record.id.clone()));
            }
            tx.commit()?;
            Ok(())
        })
    }

    async fn update_many(&self, records: &[AssetRecord]) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            for record in records {
                let changed = write_record(&tx, record)?;
                if changed == 0 {
                    return Err(VaultError::AssetNotFound(record.id.clone()));
                }
            }
            tx.commit()?;
            Ok(())
        })
    }

    async fn remove(&self, kind: AssetKind, id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM assets WHERE kind = ?1 AND id = ?2",
                params![kind.as_str(), id],
            )?;
            Ok(())
        })
    }

    async fn remove_many(&self, kind: AssetKind, ids: &[String]) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare("DELETE FROM assets WHERE kind = ?1 AND id = ?2")?;
                for id in ids {
                    stmt.execute(params![kind.as_str(), id])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
    }

    async fn count(&self, kind: AssetKind) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM assets WHERE kind = ?1",
                params![kind.as_str()],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
    }

    async fn total_bytes(&self) -> Result<u64> {
        self.with_conn(|conn| {
            let total: i64 =
                conn.query_row("SELECT COALESCE(SUM(bytes), 0) FROM assets", [], |row| {
                    row.get(0)
                })?;
            Ok(total.max(0) as u64)
        })
    }

    async fn close(&self) -> Result<()> {
        let mut guard = self
            .conn
            .lock()
            .map_err(|_| VaultError::Metadata("Connection lock poisoned".to_string()))?;
        guard.take();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn record(id: &str, kind: AssetKind, sha: &str, tags: &[&str]) -> AssetRecord {
        let now = Utc::now();
        AssetRecord {
            id: id.to_string(),
            kind,
            sha256: sha.to_string(),
            original_sha256: sha.to_string(),
            filename: format!("{}.jpg", id),
            ext: "jpg".to_string(),
            bytes: 1234,
            width: 800,
            height: 600,
            video: None,
            provider: Some("pexels".to_string()),
            source_url: None,
            path: format!("/lib/media/{}.jpg", id),
            thumb_path: None,
            embedding: vec![0.5, -0.25],
            tags: tags.iter().map(|t| t.to_string()).collect(),
            created_at: now,
            last_used_at: now,
        }
    }

    #[tokio::test]
    async fn test_insert_and_round_trip() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut original = record("a", AssetKind::Video, "h1", &["dog", "park"]);
        original.video = Some(VideoMeta {
            duration_ms: 4200,
            fps: Some(29.97),
            video_codec: Some("h264".to_string()),
            audio_codec: Some("aac".to_string()),
            bitrate: Some(2_000_000),
            has_audio: true,
        });
        store.insert(&original).await.unwrap();

        let loaded = store.get(AssetKind::Video, "a").await.unwrap().unwrap();
        assert_eq!(loaded.sha256, "h1");
        assert_eq!(loaded.tags, vec!["dog", "park"]);
        assert_eq!(loaded.embedding, vec![0.5, -0.25]);
        assert_eq!(loaded.video, original.video);
        assert_eq!(loaded.created_at, parse_ts(&format_ts(original.created_at)).unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_hash_rejected() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .insert(&record("a", AssetKind::Image, "h1", &[]))
            .await
            .unwrap();

        let err = store
            .insert(&record("b", AssetKind::Image, "h1", &[]))
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::DuplicateHash(_)));

        // Same digest for the other kind is a distinct asset
        store
            .insert(&record("c", AssetKind::Video, "h1", &[]))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_find_by_digest_checks_both_columns() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut a = record("a", AssetKind::Image, "stored", &[]);
        a.original_sha256 = "original".to_string();
        store.insert(&a).await.unwrap();

        for digest in ["stored", "original"] {
            let found = store
                .find_by_digest(AssetKind::Image, digest)
                .await
                .unwrap();
            assert_eq!(found.unwrap().id, "a");
        }
        assert!(store
            .find_by_digest(AssetKind::Image, "other")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_list_tag_filter_and_order() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut a = record("a", AssetKind::Image, "h1", &["dog"]);
        a.last_used_at = Utc::now() - Duration::hours(3);
        let mut b = record("b", AssetKind::Image, "h2", &["dog", "park"]);
        b.last_used_at = Utc::now() - Duration::hours(1);
        let c = record("c", AssetKind::Image, "h3", &["cat"]);
        store.insert(&a).await.unwrap();
        store.insert(&b).await.unwrap();
        store.insert(&c).await.unwrap();

        let results = store
            .list(
                AssetKind::Image,
                &AssetQuery {
                    any_tags: Some(vec!["dog".to_string()]),
                    order: AssetOrder::LastUsedAsc,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(
            results.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(),
            vec!["a", "b"]
        );
    }

    #[tokio::test]
    async fn test_update_replaces_tags() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut a = record("a", AssetKind::Image, "h1", &["dog"]);
        store.insert(&a).await.unwrap();

        a.tags = vec!["dog".to_string(), "puppy".to_string()];
        a.last_used_at = a.last_used_at + Duration::seconds(5);
        store.update(&a).await.unwrap();

        let loaded = store.get(AssetKind::Image, "a").await.unwrap().unwrap();
        assert_eq!(loaded.tags, vec!["dog", "puppy"]);

        let mut missing = record("ghost", AssetKind::Image, "h9", &[]);
        missing.id = "ghost".to_string();
        let err = store.update(&missing).await.unwrap_err();
        assert!(matches!(err, VaultError::AssetNotFound(_)));
    }

    #[tokio::test]
    async fn test_remove_cascades_tags_and_sums_bytes() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .insert(&record("a", AssetKind::Image, "h1", &["dog"]))
            .await
            .unwrap();
        store
            .insert(&record("b", AssetKind::Image, "h2", &["cat"]))
            .await
            .unwrap();
        assert_eq!(store.total_bytes().await.unwrap(), 2468);

        store.remove(AssetKind::Image, "a").await.unwrap();
        assert_eq!(store.count(AssetKind::Image).await.unwrap(), 1);
        assert_eq!(store.total_bytes().await.unwrap(), 1234);

        // No orphaned tag rows survive the cascade
        let results = store
            .list(
                AssetKind::Image,
                &AssetQuery {
                    any_tags: Some(vec!["dog".to_string()]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_blocks_access() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.close().await.unwrap();
        store.close().await.unwrap();

        let err = store.count(AssetKind::Image).await.unwrap_err();
        assert!(matches!(err, VaultError::Disposed));
    }
}
