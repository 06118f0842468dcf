// Metadata store capability
//
// The vault is specified against this trait, not a storage engine. Two
// implementations ship: an in-memory map (tests, ephemeral use) and an
// embedded SQLite database. Any engine that can satisfy the contract —
// including the `UNIQUE (kind, sha256)` constraint `insert` relies on —
// can stand in.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{AssetKind, AssetRecord};

/// Ordering for `list` results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AssetOrder {
    #[default]
    LastUsedDesc,
    LastUsedAsc,
    CreatedDesc,
}

/// Filtered, ordered, limited listing over asset records.
///
/// `any_tags` keeps records whose tag set intersects the given tags.
/// `min_duration_ms` only matches records that carry video metadata.
#[derive(Debug, Clone, Default)]
pub struct AssetQuery {
    pub ids: Option<Vec<String>>,
    pub any_tags: Option<Vec<String>>,
    pub min_width: Option<i32>,
    pub min_height: Option<i32>,
    pub min_duration_ms: Option<i64>,
    pub order: AssetOrder,
    pub limit: Option<usize>,
}

/// CRUD over asset records and their tag sets.
///
/// Implementations MUST reject an `insert` whose `(kind, sha256)` pair
/// already exists with [`VaultError::DuplicateHash`](crate::error::VaultError);
/// the ingest path converges concurrent duplicate ingests through that error.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn insert(&self, record: &AssetRecord) -> Result<()>;

    async fn get(&self, kind: AssetKind, id: &str) -> Result<Option<AssetRecord>>;

    /// Unique lookup matching the digest against both `sha256` and
    /// `original_sha256`.
    async fn find_by_digest(&self, kind: AssetKind, digest: &str) -> Result<Option<AssetRecord>>;

    async fn list(&self, kind: AssetKind, query: &AssetQuery) -> Result<Vec<AssetRecord>>;

    /// Listing across both kinds; used by the garbage collector.
    async fn list_all(&self, query: &AssetQuery) -> Result<Vec<AssetRecord>>;

    async fn update(&self, record: &AssetRecord) -> Result<()>;

    async fn update_many(&self, records: &[AssetRecord]) -> Result<()>;

    async fn remove(&self, kind: AssetKind, id: &str) -> Result<()>;

    async fn remove_many(&self, kind: AssetKind, ids: &[String]) -> Result<()>;

    async fn count(&self, kind: AssetKind) -> Result<u64>;

    /// Sum of stored bytes across both kinds; drives budget checks.
    async fn total_bytes(&self) -> Result<u64>;

    /// Release held resources. Idempotent.
    async fn close(&self) -> Result<()>;
}
