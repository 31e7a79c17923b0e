use crate::envelope::Row;
use crate::error::Result;
use crate::request::QueryParams;
use async_trait::async_trait;
use serde_json::Value;

// Fetch-side ports
#[async_trait]
pub trait HttpClientPort: Send + Sync {
    /// GET `url` and decode the body as JSON. Only HTTP 200 counts as success;
    /// every other status and any transport failure is `IngestError::Transport`.
    async fn get_json(
        &self,
        url: &str,
        headers: &[(String, String)],
        query: &QueryParams,
    ) -> Result<Value>;
}

#[async_trait]
pub trait BlobStorePort: Send + Sync {
    async fn put(&self, bucket: &str, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()>;

    /// Keys under `folder` (all keys when `None`), in a stable order.
    async fn list(&self, bucket: &str, folder: Option<&str>) -> Result<Vec<String>>;

    async fn get_text(&self, bucket: &str, key: &str) -> Result<String>;
}

// Load-side port
#[async_trait]
pub trait TableStorePort: Send + Sync {
    /// Appends `rows` to `dataset.table`. Never overwrites or upserts.
    async fn append_rows(&self, dataset: &str, table: &str, rows: Vec<Row>) -> Result<()>;
}
