//! In-memory collaborators shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_desktop::TokioFileSystem;
use bridge_traits::{
    error::{BridgeError, Result},
    metadata::{LocalMetadataStore, LocalRecord},
    remote::{ObjectStore, RemoteItem, RemoteMetadataService},
    storage::FileSystemAccess,
    time::Clock,
};
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use core_sync::{
    fingerprint, EventFilter, EventQueue, EventProducer, IgnoreRules, ItemRequest, QueueReceiver,
    RelativePath,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::Mutex;

pub fn path(s: &str) -> RelativePath {
    RelativePath::new(s).unwrap()
}

// ============================================================================
// Remote metadata service
// ============================================================================

#[derive(Default)]
pub struct MemoryRemote {
    items: Mutex<BTreeMap<String, RemoteItem>>,
    pub put_calls: AtomicUsize,
}

impl MemoryRemote {
    pub async fn insert(&self, item: RemoteItem) {
        self.items.lock().await.insert(item.path.clone(), item);
    }

    pub async fn get(&self, path: &str) -> Option<RemoteItem> {
        self.items.lock().await.get(path).cloned()
    }

    pub async fn paths(&self) -> Vec<String> {
        self.items.lock().await.keys().cloned().collect()
    }
}

#[async_trait]
impl RemoteMetadataService for MemoryRemote {
    async fn list_items(&self) -> Result<Vec<RemoteItem>> {
        Ok(self.items.lock().await.values().cloned().collect())
    }

    async fn get_item(&self, path: &str) -> Result<Option<RemoteItem>> {
        Ok(self.items.lock().await.get(path).cloned())
    }

    async fn put_item(&self, item: &RemoteItem) -> Result<()> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        self.items
            .lock()
            .await
            .insert(item.path.clone(), item.clone());
        Ok(())
    }

    async fn rename_item(&self, old_path: &str, new_path: &str) -> Result<()> {
        let mut items = self.items.lock().await;
        let mut item = items
            .remove(old_path)
            .ok_or_else(|| BridgeError::NotFound(old_path.to_string()))?;
        item.path = new_path.to_string();
        items.insert(new_path.to_string(), item);
        Ok(())
    }

    async fn delete_item(&self, path: &str) -> Result<()> {
        self.items
            .lock()
            .await
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| BridgeError::NotFound(path.to_string()))
    }
}

// ============================================================================
// Object store
// ============================================================================

#[derive(Default)]
pub struct MemoryObjects {
    objects: Mutex<BTreeMap<String, Bytes>>,
    pub put_calls: AtomicUsize,
}

impl MemoryObjects {
    pub async fn insert(&self, key: &str, data: &[u8]) {
        self.objects
            .lock()
            .await
            .insert(key.to_string(), Bytes::copy_from_slice(data));
    }

    pub async fn get(&self, key: &str) -> Option<Bytes> {
        self.objects.lock().await.get(key).cloned()
    }

    pub async fn keys(&self) -> Vec<String> {
        self.objects.lock().await.keys().cloned().collect()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjects {
    async fn put_object(&self, key: &str, data: Bytes) -> Result<()> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        self.objects.lock().await.insert(key.to_string(), data);
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Bytes> {
        self.objects
            .lock()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| BridgeError::NotFound(key.to_string()))
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        self.objects
            .lock()
            .await
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| BridgeError::NotFound(key.to_string()))
    }
}

// ============================================================================
// Local metadata store
// ============================================================================

#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<BTreeMap<String, LocalRecord>>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    /// Make every call fail as if the database were gone.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(BridgeError::DatabaseError("store offline".to_string()));
        }
        Ok(())
    }

    pub async fn insert(&self, path: &str, content: &[u8]) {
        let record = LocalRecord::new(path, fingerprint(content), content.len() as u64, 0);
        self.records.lock().await.insert(path.to_string(), record);
    }

    pub async fn get(&self, path: &str) -> Option<LocalRecord> {
        self.records.lock().await.get(path).cloned()
    }

    pub async fn paths(&self) -> Vec<String> {
        self.records.lock().await.keys().cloned().collect()
    }
}

#[async_trait]
impl LocalMetadataStore for MemoryStore {
    async fn all_records(&self) -> Result<Vec<LocalRecord>> {
        self.check()?;
        Ok(self.records.lock().await.values().cloned().collect())
    }

    async fn get_record(&self, path: &str) -> Result<Option<LocalRecord>> {
        self.check()?;
        Ok(self.records.lock().await.get(path).cloned())
    }

    async fn upsert_record(&self, record: &LocalRecord) -> Result<()> {
        self.check()?;
        self.records
            .lock()
            .await
            .insert(record.path.clone(), record.clone());
        Ok(())
    }

    async fn rename_record(&self, old_path: &str, new_path: &str) -> Result<bool> {
        self.check()?;
        let mut records = self.records.lock().await;
        match records.remove(old_path) {
            Some(mut record) => {
                record.path = new_path.to_string();
                records.insert(new_path.to_string(), record);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_record(&self, path: &str) -> Result<bool> {
        self.check()?;
        Ok(self.records.lock().await.remove(path).is_some())
    }

    async fn health_check(&self) -> Result<()> {
        self.check()
    }
}

pub struct FixedClock;

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }
}

// ============================================================================
// Harness
// ============================================================================

/// A watched folder in a temp dir wired to in-memory remote and store
pub struct Harness {
    _dir: TempDir,
    pub root: PathBuf,
    pub fs: Arc<TokioFileSystem>,
    pub remote: Arc<MemoryRemote>,
    pub objects: Arc<MemoryObjects>,
    pub store: Arc<MemoryStore>,
}

impl Harness {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path().to_path_buf();
        std::fs::create_dir_all(root.join(".ignore")).unwrap();

        Self {
            _dir: dir,
            root,
            fs: Arc::new(TokioFileSystem::new()),
            remote: Arc::new(MemoryRemote::default()),
            objects: Arc::new(MemoryObjects::default()),
            store: Arc::new(MemoryStore::default()),
        }
    }

    pub fn write(&self, name: &str, content: &[u8]) {
        let target = self.abs(name);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(target, content).unwrap();
    }

    pub fn read(&self, name: &str) -> Option<Vec<u8>> {
        std::fs::read(self.abs(name)).ok()
    }

    pub fn rename(&self, from: &str, to: &str) {
        std::fs::rename(self.abs(from), self.abs(to)).unwrap();
    }

    pub fn delete(&self, name: &str) {
        std::fs::remove_file(self.abs(name)).unwrap();
    }

    pub fn abs(&self, name: &str) -> PathBuf {
        path(name).to_absolute(&self.root)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn request(&self) -> ItemRequest {
        self.request_with_objects(self.objects.clone())
    }

    pub fn request_with_objects(&self, objects: Arc<dyn ObjectStore>) -> ItemRequest {
        ItemRequest::new(
            self.root.clone(),
            self.fs.clone() as Arc<dyn FileSystemAccess>,
            self.remote.clone() as Arc<dyn RemoteMetadataService>,
            objects,
            self.store.clone() as Arc<dyn LocalMetadataStore>,
            Arc::new(FixedClock),
        )
    }

    pub fn filter(&self) -> EventFilter {
        EventFilter::new(
            self.root.clone(),
            self.fs.clone(),
            self.store.clone(),
            IgnoreRules::builtin(),
        )
    }

    /// Producer on an unbounded queue
    pub fn producer(&self) -> (EventProducer, QueueReceiver) {
        self.producer_with_filter(self.filter())
    }

    pub fn producer_with_ignore(&self, patterns: &[&str]) -> (EventProducer, QueueReceiver) {
        let filter = EventFilter::new(
            self.root.clone(),
            self.fs.clone(),
            self.store.clone(),
            IgnoreRules::new(patterns).unwrap(),
        );
        self.producer_with_filter(filter)
    }

    fn producer_with_filter(&self, filter: EventFilter) -> (EventProducer, QueueReceiver) {
        let (tx, rx) = EventQueue::unbounded();
        let producer = EventProducer::new(
            self.root.clone(),
            self.fs.clone(),
            self.store.clone(),
            filter,
            tx,
        );
        (producer, rx)
    }
}
