//! Item store contract and an in-memory implementation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use recall_core::{Item, ReviewMetadata};
use tokio::sync::Mutex;

use crate::error::StoreError;

/// Source of study items and sink for their review metadata.
#[async_trait]
pub trait ItemStore: Send + Sync {
    /// All items associated with a collection, metadata as stored.
    async fn fetch_items_for_collection(&self, collection_id: &str) -> Result<Vec<Item>, StoreError>;

    /// Replace an item's metadata.
    async fn write_metadata(&self, item_id: &str, metadata: &ReviewMetadata) -> Result<(), StoreError>;
}

#[derive(Default)]
struct MemoryInner {
    items: HashMap<String, Item>,
    /// Collection id to item ids, in insertion order.
    collections: HashMap<String, Vec<String>>,
}

/// Thread-safe in-memory store.
///
/// Items may belong to several collections. Writes stamp `updated_at` with the
/// current time, the way a database trigger would.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
    writes: AtomicUsize,
    fail_fetches: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) an item and associate it with a collection.
    pub async fn insert(&self, collection_id: &str, item: Item) {
        let mut inner = self.inner.lock().await;
        let ids = inner.collections.entry(collection_id.to_string()).or_default();
        if !ids.contains(&item.id) {
            ids.push(item.id.clone());
        }
        inner.items.insert(item.id.clone(), item);
    }

    pub async fn item(&self, item_id: &str) -> Option<Item> {
        self.inner.lock().await.items.get(item_id).cloned()
    }

    /// Number of successful metadata writes so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Make every fetch fail until switched back.
    pub fn set_fail_fetches(&self, fail: bool) {
        self.fail_fetches.store(fail, Ordering::SeqCst);
    }

    /// Make every write fail until switched back.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ItemStore for MemoryStore {
    async fn fetch_items_for_collection(&self, collection_id: &str) -> Result<Vec<Item>, StoreError> {
        if self.fail_fetches.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("fetch disabled".to_string()));
        }

        let inner = self.inner.lock().await;
        let ids = inner
            .collections
            .get(collection_id)
            .ok_or_else(|| StoreError::NotFound(format!("collection {collection_id}")))?;

        Ok(ids
            .iter()
            .filter_map(|id| inner.items.get(id).cloned())
            .collect())
    }

    async fn write_metadata(&self, item_id: &str, metadata: &ReviewMetadata) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("write disabled".to_string()));
        }

        let mut inner = self.inner.lock().await;
        let item = inner
            .items
            .get_mut(item_id)
            .ok_or_else(|| StoreError::NotFound(format!("item {item_id}")))?;
        item.metadata = Some(metadata.to_value());
        item.updated_at = Utc::now();

        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
