// In-memory metadata store
//
// Reference implementation of the `MetadataStore` contract. Used by the
// test suite and by callers that do not need persistence across runs.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{Result, VaultError};
use crate::meta::{AssetOrder, AssetQuery, MetadataStore};
use crate::model::{AssetKind, AssetRecord};

#[derive(Default)]
pub struct MemoryStore {
    assets: Mutex<HashMap<(AssetKind, String), AssetRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn matches(record: &AssetRecord, query: &AssetQuery) -> bool {
    if let Some(ref ids) = query.ids {
        if !ids.iter().any(|id| id == &record.id) {
            return false;
        }
    }
    if let Some(ref tags) = query.any_tags {
        if !tags.iter().any(|t| record.tags.contains(t)) {
            return false;
        }
    }
    if let Some(min_width) = query.min_width {
        if record.width < min_width {
            return false;
        }
    }
    if let Some(min_height) = query.min_height {
        if record.height < min_height {
            return false;
        }
    }
    if let Some(min_duration) = query.min_duration_ms {
        match record.video {
            Some(ref video) if video.duration_ms >= min_duration => {}
            _ => return false,
        }
    }
    true
}

fn order_and_limit(mut records: Vec<AssetRecord>, query: &AssetQuery) -> Vec<AssetRecord> {
    match query.order {
        AssetOrder::LastUsedDesc => records.sort_by(|a, b| b.last_used_at.cmp(&a.last_used_at)),
        AssetOrder::LastUsedAsc => records.sort_by(|a, b| a.last_used_at.cmp(&b.last_used_at)),
        AssetOrder::CreatedDesc => records.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
    }
    if let Some(limit) = query.limit {
        records.truncate(limit);
    }
    records
}

#[async_trait]
impl MetadataStore for MemoryStore {
    async fn insert(&self, record: &AssetRecord) -> Result<()> {
        let mut assets = self.assets.lock().unwrap();
        let duplicate = assets
            .values()
            .any(|a| a.kind == record.kind && a.sha256 == record.sha256);
        if duplicate {
            return Err(VaultError::DuplicateHash(record.sha256.clone()));
        }
        assets.insert((record.kind, record.id.clone()), record.clone());
        Ok(())
    }

    async fn get(&self, kind: AssetKind, id: &str) -> Result<Option<AssetRecord>> {
        let assets = self.assets.lock().unwrap();
        Ok(assets.get(&(kind, id.to_string())).cloned())
    }

    async fn find_by_digest(&self, kind: AssetKind, digest: &str) -> Result<Option<AssetRecord>> {
        let assets = self.assets.lock().unwrap();
        Ok(assets
            .values()
            .find(|a| a.kind == kind && (a.sha256 == digest || a.original_sha256 == digest))
            .cloned())
    }

    async fn list(&self, kind: AssetKind, query: &AssetQuery) -> Result<Vec<AssetRecord>> {
        let assets = self.assets.lock().unwrap();
        let selected: Vec<AssetRecord> = assets
            .values()
            .filter(|a| a.kind == kind && matches(a, query))
            .cloned()
            .collect();
        Ok(order_and_limit(selected, query))
    }

    async fn list_all(&self, query: &AssetQuery) -> Result<Vec<AssetRecord>> {
        let assets = self.assets.lock().unwrap();
        let selected: Vec<AssetRecord> = assets
            .values()
            .filter(|a| matches(a, query))
            .cloned()
            .collect();
        Ok(order_and_limit(selected, query))
    }

    async fn update(&self, record: &AssetRecord) -> Result<()> {
        let mut assets = self.assets.lock().unwrap();
        let key = (record.kind, record.id.clone());
        if !assets.contains_key(&key) {
            return Err(VaultError::AssetNotFound(record.id.clone()));
        }
        assets.insert(key, record.clone());
        Ok(())
    }

    async fn update_many(&self, records: &[AssetRecord]) -> Result<()> {
        let mut assets = self.assets.lock().unwrap();
        for record in records {
            let key = (record.kind, record.id.clone());
            if !assets.contains_key(&key) {
                return Err(VaultError::AssetNotFound(record.id.clone()));
            }
            assets.insert(key, record.clone());
        }
        Ok(())
    }

    async fn remove(&self, kind: AssetKind, id: &str) -> Result<()> {
        let mut assets = self.assets.lock().unwrap();
        assets.remove(&(kind, id.to_string()));
        Ok(())
    }

    async fn remove_many(&self, kind: AssetKind, ids: &[String]) -> Result<()> {
        let mut assets = self.assets.lock().unwrap();
        for id in ids {
            assets.remove(&(kind, id.clone()));
        }
        Ok(())
    }

    async fn count(&self, kind: AssetKind) -> Result<u64> {
        let assets = self.assets.lock().unwrap();
        Ok(assets.values().filter(|a| a.kind == kind).count() as u64)
    }

    async fn total_bytes(&self) -> Result<u64> {
        let assets = self.assets.lock().unwrap();
        Ok(assets.values().map(|a| a.bytes.max(0) as u64).sum())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
