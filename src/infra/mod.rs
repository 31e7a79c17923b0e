pub mod fs_blob_store;
pub mod gcs_blob_store;
pub mod http_client;
pub mod memory;
pub mod sqlite_table_store;

pub use fs_blob_store::FsBlobStore;
pub use gcs_blob_store::GcsBlobStore;
pub use http_client::{OfflineHttp, ReqwestHttp};
pub use memory::{InMemoryBlobStore, InMemoryTableStore};
pub use sqlite_table_store::SqliteTableStore;

use crate::app::ports::{BlobStorePort, TableStorePort};
use crate::config::{BlobBackend, StorageConfig, TableBackend, WarehouseConfig};
use crate::error::{IngestError, Result};
use std::sync::Arc;

/// Builds the blob store selected by `storage.backend`.
pub fn blob_store_from_config(config: &StorageConfig) -> Result<Arc<dyn BlobStorePort>> {
    Ok(match config.backend {
        BlobBackend::Filesystem => Arc::new(FsBlobStore::new(config.root.clone())),
        BlobBackend::Gcs => {
            let token = config.gcs_token.clone().ok_or_else(|| {
                IngestError::Config("gcs backend needs GCS_ACCESS_TOKEN or storage.gcs_token".into())
            })?;
            Arc::new(GcsBlobStore::new(token, config.gcs_api_base.clone()))
        }
        BlobBackend::Memory => Arc::new(InMemoryBlobStore::new()),
    })
}

/// Builds the table store selected by `warehouse.backend`.
pub fn table_store_from_config(config: &WarehouseConfig) -> Result<Arc<dyn TableStorePort>> {
    Ok(match config.backend {
        TableBackend::Sqlite => Arc::new(SqliteTableStore::open(&config.path)?),
        TableBackend::Memory => Arc::new(InMemoryTableStore::new()),
    })
}
