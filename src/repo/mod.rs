// Local media repository orchestration
//
// Ties the layers together: hash -> dedup lookup -> (optimize) -> store ->
// thumbnail -> tag merge -> budget check, with search ranking and
// budget-enforced garbage collection on top. One instance owns its budget
// counters and GC flags; independent repositories never interfere.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

use crate::config::VaultConfig;
use crate::constants::{
    DEFAULT_EXT, FFMPEG_THUMB_TIMEOUT_MS, FFPROBE_TIMEOUT_MS, THUMB_MAX_WIDTH,
};
use crate::error::{Result, VaultError};
use crate::gc::{self, GcReport};
use crate::hash;
use crate::meta::{AssetOrder, AssetQuery, MetadataStore};
use crate::model::{merge_tags, normalize_tags, AssetKind, AssetRecord, AssetSource};
use crate::optimize;
use crate::preview;
use crate::probe;
use crate::retry::{self, RetryPolicy};
use crate::search::{self, SearchOptions};
use crate::semantic::SemanticIndexer;
use crate::store::AssetStore;

struct Inner {
    config: VaultConfig,
    store: AssetStore,
    meta: Arc<dyn MetadataStore>,
    semantic: SemanticIndexer,
    gc_requested: AtomicBool,
    gc_worker: AtomicBool,
    // Held for the duration of any collection pass, explicit or
    // background; at most one pass runs at a time
    gc_running: AsyncMutex<()>,
    disposed: AtomicBool,
}

/// The local media repository.
///
/// Cheap to clone; clones share the same library, metadata handle and GC
/// state.
#[derive(Clone)]
pub struct MediaVault {
    inner: Arc<Inner>,
}

/// Everything the blocking image pass produces in one decode.
struct PreparedImage {
    width: u32,
    height: u32,
    thumb: preview::ThumbRender,
    optimized: Option<Vec<u8>>,
    data: Vec<u8>,
}

fn source_ext(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_else(|| DEFAULT_EXT.to_string())
}

fn source_filename(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Run a blocking tool call off the async runtime, bounded by a deadline.
/// On expiry the blocking work keeps running detached; the caller just
/// stops waiting for it.
async fn blocking_with_deadline<T>(
    label: &str,
    deadline: Duration,
    task: impl FnOnce() -> Result<T> + Send + 'static,
) -> Result<T>
where
    T: Send + 'static,
{
    let owned_label = label.to_string();
    retry::with_timeout(label, deadline, async move {
        tokio::task::spawn_blocking(task)
            .await
            .map_err(|e| VaultError::Other(format!("{} task failed: {}", owned_label, e)))?
    })
    .await
}

impl MediaVault {
    /// Open a repository over `config.library_root`, creating the folder
    /// structure if needed.
    pub fn open(config: VaultConfig, meta: Arc<dyn MetadataStore>) -> Result<Self> {
        let store = AssetStore::open(&config.library_root)?;
        let semantic = SemanticIndexer::new(config.semantic_dimensions);
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                store,
                meta,
                semantic,
                gc_requested: AtomicBool::new(false),
                gc_worker: AtomicBool::new(false),
                gc_running: AsyncMutex::new(()),
                disposed: AtomicBool::new(false),
            }),
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.inner.disposed.load(Ordering::SeqCst) {
            return Err(VaultError::Disposed);
        }
        Ok(())
    }

    // ----- Ingest -----

    pub async fn ingest_image(
        &self,
        path: &Path,
        tags: &[String],
        source: Option<AssetSource>,
    ) -> Result<AssetRecord> {
        self.ingest(AssetKind::Image, path, tags, source).await
    }

    pub async fn ingest_video(
        &self,
        path: &Path,
        tags: &[String],
        source: Option<AssetSource>,
    ) -> Result<AssetRecord> {
        self.ingest(AssetKind::Video, path, tags, source).await
    }

    async fn ingest(
        &self,
        kind: AssetKind,
        path: &Path,
        tags: &[String],
        source: Option<AssetSource>,
    ) -> Result<AssetRecord> {
        self.ensure_open()?;
        let tags = normalize_tags(tags);
        let data = tokio::fs::read(path).await?;
        let original_sha256 = hash::digest_bytes(&data);

        // Dedup lookup against both digest columns: the content may have
        // been stored post-optimization under a different hash
        if let Some(existing) = self
            .inner
            .meta
            .find_by_digest(kind, &original_sha256)
            .await?
        {
            return self.merge_into_existing(existing, &tags).await;
        }

        match kind {
            AssetKind::Image => {
                self.ingest_new_image(path, data, original_sha256, tags, source)
                    .await
            }
            AssetKind::Video => {
                self.ingest_new_video(path, data, original_sha256, tags, source)
                    .await
            }
        }
    }

    async fn ingest_new_image(
        &self,
        path: &Path,
        data: Vec<u8>,
        original_sha256: String,
        tags: Vec<String>,
        source: Option<AssetSource>,
    ) -> Result<AssetRecord> {
        let kind = AssetKind::Image;
        let optimize_enabled = self.inner.config.optimize_images;
        let min_savings = self.inner.config.optimize_min_savings_percent;

        let prepared = tokio::task::spawn_blocking(move || -> Result<PreparedImage> {
            let img = probe::decode_image(&data)?;
            let thumb = preview::render_default_thumbnail(&img)?;
            let optimized = if optimize_enabled {
                optimize::reencode_smaller(&img, data.len(), min_savings)?
            } else {
                None
            };
            Ok(PreparedImage {
                width: img.width(),
                height: img.height(),
                thumb,
                optimized,
                data,
            })
        })
        .await
        .map_err(|e| VaultError::Other(format!("Image processing task failed: {}", e)))??;

        let (stored, ext, sha256) = match prepared.optimized {
            Some(jpeg) => {
                let digest = hash::digest_bytes(&jpeg);
                (jpeg, "jpg".to_string(), digest)
            }
            None => (prepared.data, source_ext(path), original_sha256.clone()),
        };

        // The optimized encoding may already be cached from another source
        // of the same content
        if sha256 != original_sha256 {
            if let Some(existing) = self.inner.meta.find_by_digest(kind, &sha256).await? {
                return self.merge_into_existing(existing, &tags).await;
            }
        }

        self.check_budget(stored.len() as u64).await?;

        let media_path = self.inner.store.media_path(kind, &sha256, &ext);
        self.inner.store.write_atomic(&media_path, &stored).await?;

        let thumb_path = self.inner.store.thumb_path(kind, &sha256);
        self.inner
            .store
            .write_atomic(&thumb_path, &prepared.thumb.jpeg)
            .await?;

        let record = AssetRecord {
            id: Uuid::new_v4().to_string(),
            kind,
            sha256,
            original_sha256,
            filename: source_filename(path),
            ext,
            bytes: stored.len() as i64,
            width: prepared.width as i32,
            height: prepared.height as i32,
            video: None,
            provider: source.as_ref().map(|s| s.provider.clone()),
            source_url: source.and_then(|s| s.url),
            path: media_path.to_string_lossy().into_owned(),
            thumb_path: Some(thumb_path.to_string_lossy().into_owned()),
            embedding: self.embedding_for(&tags).await?,
            tags,
            created_at: Utc::now(),
            last_used_at: Utc::now(),
        };
        self.insert_converging(record).await
    }

    async fn ingest_new_video(
        &self,
        path: &Path,
        data: Vec<u8>,
        original_sha256: String,
        tags: Vec<String>,
        source: Option<AssetSource>,
    ) -> Result<AssetRecord> {
        let kind = AssetKind::Video;

        // Probe before any storage mutation so corrupt input fails fast
        let probe_path = path.to_path_buf();
        let info = blocking_with_deadline(
            "video probe",
            Duration::from_millis(FFPROBE_TIMEOUT_MS),
            move || probe::probe_video(&probe_path),
        )
        .await?;

        // Videos are stored unmodified
        let sha256 = original_sha256.clone();
        self.check_budget(data.len() as u64).await?;

        let ext = source_ext(path);
        let media_path = self.inner.store.media_path(kind, &sha256, &ext);
        self.inner.store.write_atomic(&media_path, &data).await?;

        // First-frame still; transient ffmpeg failures get one more try,
        // anything persistent is repaired lazily later
        let thumb_path = self.inner.store.thumb_path(kind, &sha256);
        let policy = RetryPolicy {
            max_retries: 1,
            ..RetryPolicy::default()
        };
        let extracted = retry::with_retry("first-frame extraction", &policy, || {
            let src = media_path.clone();
            let dst = thumb_path.clone();
            blocking_with_deadline(
                "first-frame extraction",
                Duration::from_millis(FFMPEG_THUMB_TIMEOUT_MS),
                move || preview::video_thumbnail(&src, &dst, THUMB_MAX_WIDTH),
            )
        })
        .await;
        let thumb_path = match extracted {
            Ok(()) => Some(thumb_path.to_string_lossy().into_owned()),
            Err(e) => {
                log::warn!("First-frame extraction for {} failed: {}", sha256, e);
                None
            }
        };

        let record = AssetRecord {
            id: Uuid::new_v4().to_string(),
            kind,
            sha256,
            original_sha256,
            filename: source_filename(path),
            ext,
            bytes: data.len() as i64,
            width: info.width,
            height: info.height,
            video: Some(info.meta),
            provider: source.as_ref().map(|s| s.provider.clone()),
            source_url: source.and_then(|s| s.url),
            path: media_path.to_string_lossy().into_owned(),
            thumb_path,
            embedding: self.embedding_for(&tags).await?,
            tags,
            created_at: Utc::now(),
            last_used_at: Utc::now(),
        };
        self.insert_converging(record).await
    }

    /// Insert a freshly built record, converging on the existing record
    /// if a concurrent ingest of the same content won the race.
    async fn insert_converging(&self, record: AssetRecord) -> Result<AssetRecord> {
        match self.inner.meta.insert(&record).await {
            Ok(()) => Ok(record),
            Err(VaultError::DuplicateHash(_)) => {
                let existing = self
                    .inner
                    .meta
                    .find_by_digest(record.kind, &record.sha256)
                    .await?
                    .ok_or_else(|| {
                        VaultError::Metadata(format!(
                            "Asset with hash {} vanished mid-ingest",
                            record.sha256
                        ))
                    })?;
                self.merge_into_existing(existing, &record.tags).await
            }
            Err(e) => Err(e),
        }
    }

    /// Duplicate ingest path: tag union, recency bump, thumbnail repair.
    /// No new storage write for the asset bytes.
    async fn merge_into_existing(
        &self,
        mut record: AssetRecord,
        tags: &[String],
    ) -> Result<AssetRecord> {
        let merged = merge_tags(&record.tags, tags);
        if merged != record.tags {
            record.tags = merged;
            record.embedding = self.embedding_for(&record.tags).await?;
        }
        record.touch(Utc::now());
        self.ensure_thumbnail(&mut record).await;
        self.inner.meta.update(&record).await?;
        Ok(record)
    }

    /// Make sure the thumbnail exists on disk, regenerating it if the
    /// file went missing. Idempotent; failures downgrade to a warning.
    async fn ensure_thumbnail(&self, record: &mut AssetRecord) {
        if let Some(ref thumb) = record.thumb_path {
            if tokio::fs::try_exists(thumb).await.unwrap_or(false) {
                return;
            }
        }

        let dest = self.inner.store.thumb_path(record.kind, &record.sha256);
        match self.regenerate_thumbnail(record, &dest).await {
            Ok(()) => record.thumb_path = Some(dest.to_string_lossy().into_owned()),
            Err(e) => {
                log::warn!("Thumbnail repair for asset {} failed: {}", record.id, e);
                record.thumb_path = None;
            }
        }
    }

    async fn regenerate_thumbnail(&self, record: &AssetRecord, dest: &Path) -> Result<()> {
        match record.kind {
            AssetKind::Image => {
                let data = tokio::fs::read(&record.path).await?;
                let thumb = tokio::task::spawn_blocking(move || -> Result<preview::ThumbRender> {
                    let img = probe::decode_image(&data)?;
                    preview::render_default_thumbnail(&img)
                })
                .await
                .map_err(|e| VaultError::Other(format!("Thumbnail task failed: {}", e)))??;
                self.inner.store.write_atomic(dest, &thumb.jpeg).await
            }
            AssetKind::Video => {
                let src = PathBuf::from(&record.path);
                let dst = dest.to_path_buf();
                blocking_with_deadline(
                    "thumbnail repair",
                    Duration::from_millis(FFMPEG_THUMB_TIMEOUT_MS),
                    move || preview::video_thumbnail(&src, &dst, THUMB_MAX_WIDTH),
                )
                .await
            }
        }
    }

    async fn check_budget(&self, projected_new: u64) -> Result<()> {
        let total = self.inner.meta.total_bytes().await?;
        if total + projected_new > self.inner.config.budget_bytes {
            self.request_gc();
            return Err(VaultError::QuotaExceeded {
                needed: projected_new,
                budget: self.inner.config.budget_bytes,
            });
        }
        Ok(())
    }

    /// Embedding for a tag set, memoized in the on-disk embedding cache.
    /// Returns the empty vector when semantic indexing is disabled.
    async fn embedding_for(&self, tags: &[String]) -> Result<Vec<f32>> {
        if !self.inner.config.semantic_enabled {
            return Ok(Vec::new());
        }

        let key = hash::digest_bytes(tags.join(" ").as_bytes());
        let cache_path = self.inner.store.embedding_path(&key);
        if let Ok(bytes) = tokio::fs::read(&cache_path).await {
            if let Ok(vector) = serde_json::from_slice::<Vec<f32>>(&bytes) {
                if vector.len() == self.inner.semantic.dims() {
                    return Ok(vector);
                }
            }
            log::debug!("Discarding stale embedding cache entry {}", key);
        }

        let vector = self.inner.semantic.embed(tags);
        let encoded = serde_json::to_vec(&vector)?;
        if let Err(e) = self.inner.store.write_atomic(&cache_path, &encoded).await {
            log::debug!("Embedding cache write failed for {}: {}", key, e);
        }
        Ok(vector)
    }

    // ----- Search -----

    pub async fn search_images(
        &self,
        tags: &[String],
        options: &SearchOptions,
    ) -> Result<Vec<AssetRecord>> {
        self.search(AssetKind::Image, tags, options).await
    }

    pub async fn search_videos(
        &self,
        tags: &[String],
        options: &SearchOptions,
    ) -> Result<Vec<AssetRecord>> {
        self.search(AssetKind::Video, tags, options).await
    }

    async fn search(
        &self,
        kind: AssetKind,
        tags: &[String],
        options: &SearchOptions,
    ) -> Result<Vec<AssetRecord>> {
        self.ensure_open()?;
        let query = normalize_tags(tags);
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let min_duration_ms = match kind {
            AssetKind::Video => options.min_duration_ms,
            AssetKind::Image => None,
        };

        let candidates = self
            .inner
            .meta
            .list(
                kind,
                &AssetQuery {
                    any_tags: Some(query.clone()),
                    min_width: options.min_width,
                    min_height: options.min_height,
                    min_duration_ms,
                    order: AssetOrder::LastUsedDesc,
                    ..Default::default()
                },
            )
            .await?;

        let mut ranked = if !candidates.is_empty() {
            search::rank_overlap(
                candidates,
                &query,
                self.inner.config.prefer_recency_boost,
                Utc::now(),
            )
        } else if self.inner.config.semantic_enabled {
            let pool = self
                .inner
                .meta
                .list(
                    kind,
                    &AssetQuery {
                        min_width: options.min_width,
                        min_height: options.min_height,
                        min_duration_ms,
                        order: AssetOrder::LastUsedDesc,
                        limit: Some(self.inner.config.semantic_candidate_limit),
                        ..Default::default()
                    },
                )
                .await?;
            let query_embedding = self.embedding_for(&query).await?;
            search::rank_semantic(pool, &query_embedding, self.inner.config.semantic_min_score)
        } else {
            Vec::new()
        };

        ranked.truncate(options.max_results);
        Ok(ranked)
    }

    // ----- Recency -----

    /// Bump `last_used_at` for the given assets. Fails with a not-found
    /// error (before touching anything) if any id no longer exists, e.g.
    /// when racing with eviction.
    pub async fn mark_used(&self, ids: &[String], kind: AssetKind) -> Result<()> {
        self.ensure_open()?;
        if ids.is_empty() {
            return Ok(());
        }

        let mut records = self
            .inner
            .meta
            .list(
                kind,
                &AssetQuery {
                    ids: Some(ids.to_vec()),
                    ..Default::default()
                },
            )
            .await?;

        if let Some(missing) = ids.iter().find(|id| !records.iter().any(|r| &r.id == *id)) {
            return Err(VaultError::AssetNotFound(missing.clone()));
        }

        let now = Utc::now();
        for record in &mut records {
            record.touch(now);
        }
        self.inner.meta.update_many(&records).await
    }

    // ----- Garbage collection -----

    /// Evict least-recently-used assets until total stored bytes fit the
    /// budget. Serialized against any other pass, explicit or background:
    /// a call arriving while one runs waits its turn and then observes
    /// the remaining excess, never the same victims. Per-victim failures
    /// are logged and the pass continues.
    pub async fn garbage_collect(&self) -> Result<GcReport> {
        self.ensure_open()?;
        let _pass = self.inner.gc_running.lock().await;
        Self::run_gc(&self.inner).await
    }

    /// Whether a collection is pending or in flight.
    pub fn gc_pending(&self) -> bool {
        self.inner.gc_requested.load(Ordering::SeqCst)
            || self.inner.gc_worker.load(Ordering::SeqCst)
            || self.inner.gc_running.try_lock().is_err()
    }

    /// Fire-and-forget collection request. Requests arriving while a pass
    /// runs coalesce into a single pending flag; at most one pass is in
    /// flight at a time.
    fn request_gc(&self) {
        let inner = Arc::clone(&self.inner);
        inner.gc_requested.store(true, Ordering::SeqCst);

        if inner
            .gc_worker
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            tokio::spawn(async move {
                loop {
                    while inner.gc_requested.swap(false, Ordering::SeqCst) {
                        if inner.disposed.load(Ordering::SeqCst) {
                            break;
                        }
                        let _pass = inner.gc_running.lock().await;
                        if let Err(e) = MediaVault::run_gc(&inner).await {
                            log::error!("Background garbage collection failed: {}", e);
                        }
                    }
                    inner.gc_worker.store(false, Ordering::SeqCst);
                    // A request that landed between the two flag flips
                    // still gets its pass
                    if inner.gc_requested.load(Ordering::SeqCst)
                        && inner
                            .gc_worker
                            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                            .is_ok()
                    {
                        continue;
                    }
                    break;
                }
            });
        }
    }

    async fn run_gc(inner: &Arc<Inner>) -> Result<GcReport> {
        let budget = inner.config.budget_bytes;
        let total = inner.meta.total_bytes().await?;
        if total <= budget {
            return Ok(GcReport::default());
        }

        let assets = inner
            .meta
            .list_all(&AssetQuery {
                order: AssetOrder::LastUsedAsc,
                ..Default::default()
            })
            .await?;
        let victims = gc::plan_evictions(&assets, total, budget);

        let mut report = GcReport::default();
        for victim in victims {
            if victim.path.is_empty() {
                log::error!(
                    "Asset {} has no stored file recorded; leaving its record in place",
                    victim.id
                );
                continue;
            }
            match Self::evict(inner, &victim).await {
                Ok(freed) => {
                    report.removed += 1;
                    report.freed_bytes += freed;
                }
                Err(e) => log::error!("Failed to evict asset {}: {}", victim.id, e),
            }
        }

        log::debug!(
            "Garbage collection removed {} assets, freed {} bytes",
            report.removed,
            report.freed_bytes
        );
        Ok(report)
    }

    async fn evict(inner: &Arc<Inner>, victim: &AssetRecord) -> Result<u64> {
        inner.store.remove_file(Path::new(&victim.path)).await?;
        if let Some(ref thumb) = victim.thumb_path {
            inner.store.remove_file(Path::new(thumb)).await?;
        }
        inner.meta.remove(victim.kind, &victim.id).await?;
        Ok(victim.bytes.max(0) as u64)
    }

    // ----- Lifecycle -----

    /// Release held resources. Idempotent; all later operations fail with
    /// a disposed error.
    pub async fn dispose(&self) -> Result<()> {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.inner.gc_requested.store(false, Ordering::SeqCst);
        self.inner.meta.close().await
    }
}
