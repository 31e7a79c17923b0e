use crate::app::ports::{BlobStorePort, TableStorePort};
use crate::envelope::Row;
use crate::error::{IngestError, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// In-memory blob store for dry runs and tests
#[derive(Clone, Default)]
pub struct InMemoryBlobStore {
    objects: Arc<Mutex<BTreeMap<(String, String), Vec<u8>>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().map(|o| o.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: T) -> IngestError {
    IngestError::storage("in-memory store lock poisoned")
}

#[async_trait]
impl BlobStorePort for InMemoryBlobStore {
    async fn put(&self, bucket: &str, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        let mut objects = self.objects.lock().map_err(poisoned)?;
        debug!("put {}/{} ({} bytes, {})", bucket, key, bytes.len(), content_type);
        objects.insert((bucket.to_string(), key.to_string()), bytes);
        Ok(())
    }

    async fn list(&self, bucket: &str, folder: Option<&str>) -> Result<Vec<String>> {
        let objects = self.objects.lock().map_err(poisoned)?;
        let prefix = folder
            .map(|f| f.trim_matches('/'))
            .filter(|f| !f.is_empty())
            .map(|f| format!("{}/", f));
        Ok(objects
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k)
            .filter(|k| prefix.as_deref().map_or(true, |p| k.starts_with(p)))
            .cloned()
            .collect())
    }

    async fn get_text(&self, bucket: &str, key: &str) -> Result<String> {
        let objects = self.objects.lock().map_err(poisoned)?;
        let bytes = objects
            .get(&(bucket.to_string(), key.to_string()))
            .ok_or_else(|| IngestError::storage(format!("object not found: {}/{}", bucket, key)))?;
        String::from_utf8(bytes.clone())
            .map_err(|e| IngestError::storage(format!("{}/{} is not UTF-8: {}", bucket, key, e)))
    }
}

/// In-memory table store; keeps every appended batch in order.
#[derive(Clone, Default)]
pub struct InMemoryTableStore {
    tables: Arc<Mutex<BTreeMap<String, Vec<Row>>>>,
}

impl InMemoryTableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all rows appended to `dataset.table` so far.
    pub fn rows(&self, dataset: &str, table: &str) -> Vec<Row> {
        self.tables
            .lock()
            .ok()
            .and_then(|t| t.get(&format!("{}.{}", dataset, table)).cloned())
            .unwrap_or_default()
    }
}

#[async_trait]
impl TableStorePort for InMemoryTableStore {
    async fn append_rows(&self, dataset: &str, table: &str, rows: Vec<Row>) -> Result<()> {
        let mut tables = self
            .tables
            .lock()
            .map_err(|_| IngestError::load("in-memory table store lock poisoned"))?;
        debug!("append {} rows to {}.{}", rows.len(), dataset, table);
        tables
            .entry(format!("{}.{}", dataset, table))
            .or_default()
            .extend(rows);
        Ok(())
    }
}
