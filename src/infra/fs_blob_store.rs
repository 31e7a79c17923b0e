use crate::app::ports::BlobStorePort;
use crate::error::{IngestError, Result};
use async_trait::async_trait;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Blob store on the local filesystem: objects live at `root/<bucket>/<key>`.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    fn bucket_dir(&self, bucket: &str) -> Result<PathBuf> {
        Ok(self.root.join(checked_relative(bucket)?))
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf> {
        Ok(self.bucket_dir(bucket)?.join(checked_relative(key)?))
    }
}

/// Rejects absolute paths and `..` so keys cannot escape the bucket.
fn checked_relative(part: &str) -> Result<&Path> {
    let path = Path::new(part);
    let ok = !part.is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if ok {
        Ok(path)
    } else {
        Err(IngestError::storage(format!("invalid object path '{}'", part)))
    }
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}

#[async_trait]
impl BlobStorePort for FsBlobStore {
    async fn put(&self, bucket: &str, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        let path = self.object_path(bucket, key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                IngestError::storage(format!("create {} failed: {}", parent.display(), e))
            })?;
        }
        fs::write(&path, &bytes)
            .map_err(|e| IngestError::storage(format!("write {} failed: {}", path.display(), e)))?;
        debug!("Wrote {} ({} bytes, {})", path.display(), bytes.len(), content_type);
        Ok(())
    }

    async fn list(&self, bucket: &str, folder: Option<&str>) -> Result<Vec<String>> {
        let bucket_dir = self.bucket_dir(bucket)?;
        let base = match folder.map(|f| f.trim_matches('/')).filter(|f| !f.is_empty()) {
            Some(folder) => bucket_dir.join(checked_relative(folder)?),
            None => bucket_dir.clone(),
        };
        if !base.is_dir() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        collect_files(&base, &mut files)
            .map_err(|e| IngestError::storage(format!("list {} failed: {}", base.display(), e)))?;

        let mut keys: Vec<String> = files
            .iter()
            .filter_map(|p| p.strip_prefix(&bucket_dir).ok())
            .map(|rel| {
                rel.components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/")
            })
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn get_text(&self, bucket: &str, key: &str) -> Result<String> {
        let path = self.object_path(bucket, key)?;
        fs::read_to_string(&path)
            .map_err(|e| IngestError::storage(format!("read {} failed: {}", path.display(), e)))
    }
}
