// media-vault: a local content-addressable cache for stock media assets.
//
// Assets are deduplicated by content hash, stored under a fan-out layout
// with generated thumbnails, findable by tag overlap with an embedding
// fallback, and kept under a byte budget by least-recently-used eviction.

pub mod config;
pub mod constants;
pub mod error;
pub mod gc;
pub mod hash;
pub mod meta;
pub mod model;
pub mod optimize;
pub mod preview;
pub mod probe;
pub mod repo;
pub mod retry;
pub mod search;
pub mod semantic;
pub mod store;
pub mod tools;

pub use config::VaultConfig;
pub use error::{Result, VaultError};
pub use gc::GcReport;
pub use meta::memory::MemoryStore;
pub use meta::sqlite::SqliteStore;
pub use meta::{AssetOrder, AssetQuery, MetadataStore};
pub use model::{AssetKind, AssetRecord, AssetSource, VideoMeta};
pub use repo::MediaVault;
pub use retry::{with_retry, with_timeout, RetryPolicy};
pub use search::SearchOptions;
