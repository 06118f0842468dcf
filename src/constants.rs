// Media Vault Constants
// Shared defaults and layout names. Changing folder names or the timestamp
// format invalidates existing libraries.

// Hashing
pub const HASH_ALGORITHM: &str = "sha256";
pub const HASH_CHUNK_SIZE: usize = 1_048_576; // 1MB

// Library layout
pub const MEDIA_FOLDER: &str = "media";
pub const THUMBS_FOLDER: &str = "thumbs";
pub const EMBEDDINGS_FOLDER: &str = "embeddings";
pub const DB_FILENAME: &str = "vault.db";

// Thumbnail settings
pub const THUMB_MAX_WIDTH: u32 = 400;
pub const THUMB_FORMAT: &str = "jpg";
pub const THUMB_QUALITY: u8 = 85;

// Optimization settings
pub const OPTIMIZE_JPEG_QUALITY: u8 = 80;
pub const DEFAULT_MIN_SAVINGS_PERCENT: f64 = 10.0;

// Budget defaults
pub const DEFAULT_BUDGET_BYTES: u64 = 2 * 1024 * 1024 * 1024; // 2 GiB

// Search ranking
pub const DEFAULT_RECENCY_BOOST: f64 = 0.3;
pub const RECENCY_HALF_LIFE_HOURS: f64 = 168.0; // one week

// Semantic fallback
pub const DEFAULT_SEMANTIC_DIMENSIONS: usize = 256;
pub const DEFAULT_SEMANTIC_MIN_SCORE: f32 = 0.35;
pub const DEFAULT_SEMANTIC_CANDIDATE_LIMIT: usize = 200;

// Search defaults
pub const DEFAULT_MAX_RESULTS: usize = 20;

// External tool deadlines
pub const FFPROBE_TIMEOUT_MS: u64 = 15_000;
pub const FFMPEG_THUMB_TIMEOUT_MS: u64 = 30_000;

// Timestamps are persisted as fixed-width UTC strings so lexicographic
// order equals chronological order.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

// Fallback extension when a source path carries none
pub const DEFAULT_EXT: &str = "bin";
