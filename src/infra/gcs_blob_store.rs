use crate::app::ports::BlobStorePort;
use crate::constants::GCS_API_BASE;
use crate::error::{IngestError, Result};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::Url;
use serde::Deserialize;
use tracing::debug;

/// Google Cloud Storage through the JSON API.
/// Config via env:
/// - GCS_ACCESS_TOKEN (OAuth2 bearer token, e.g. from `gcloud auth print-access-token`)
/// - GCS_API_BASE (optional, defaults to https://storage.googleapis.com)
pub struct GcsBlobStore {
    client: reqwest::Client,
    api_base: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct ObjectList {
    #[serde(default)]
    items: Vec<ObjectItem>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ObjectItem {
    name: String,
}

impl GcsBlobStore {
    pub fn new(token: impl Into<String>, api_base: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.unwrap_or_else(|| GCS_API_BASE.to_string()),
            token: token.into(),
        }
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.api_base)
            .map_err(|e| IngestError::Config(format!("invalid GCS base '{}': {}", self.api_base, e)))?;
        url.path_segments_mut()
            .map_err(|_| IngestError::Config(format!("GCS base '{}' cannot hold a path", self.api_base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn upload_url(&self, bucket: &str, key: &str) -> Result<Url> {
        let mut url = self.url(&["upload", "storage", "v1", "b", bucket, "o"])?;
        url.query_pairs_mut()
            .append_pair("uploadType", "media")
            .append_pair("name", key);
        Ok(url)
    }

    fn media_url(&self, bucket: &str, key: &str) -> Result<Url> {
        let mut url = self.url(&["storage", "v1", "b", bucket, "o", key])?;
        url.query_pairs_mut().append_pair("alt", "media");
        Ok(url)
    }

    fn list_url(&self, bucket: &str, prefix: Option<&str>, page_token: Option<&str>) -> Result<Url> {
        let mut url = self.url(&["storage", "v1", "b", bucket, "o"])?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("fields", "items(name),nextPageToken");
            if let Some(prefix) = prefix {
                pairs.append_pair("prefix", prefix);
            }
            if let Some(token) = page_token {
                pairs.append_pair("pageToken", token);
            }
        }
        Ok(url)
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }

    async fn checked(resp: reqwest::Response, what: &str) -> Result<reqwest::Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(IngestError::storage(format!("{} failed: {} - {}", what, status, body)))
    }
}

#[async_trait]
impl BlobStorePort for GcsBlobStore {
    async fn put(&self, bucket: &str, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        let url = self.upload_url(bucket, key)?;
        let resp = self
            .client
            .post(url)
            .header(AUTHORIZATION, self.bearer())
            .header(CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await
            .map_err(|e| IngestError::storage(format!("upload {}/{} failed: {}", bucket, key, e)))?;
        Self::checked(resp, &format!("upload {}/{}", bucket, key)).await?;
        debug!("Uploaded gs://{}/{}", bucket, key);
        Ok(())
    }

    async fn list(&self, bucket: &str, folder: Option<&str>) -> Result<Vec<String>> {
        let prefix = folder
            .map(|f| f.trim_matches('/'))
            .filter(|f| !f.is_empty())
            .map(|f| format!("{}/", f));

        let mut keys = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let url = self.list_url(bucket, prefix.as_deref(), page_token.as_deref())?;
            let resp = self
                .client
                .get(url)
                .header(AUTHORIZATION, self.bearer())
                .send()
                .await
                .map_err(|e| IngestError::storage(format!("list gs://{} failed: {}", bucket, e)))?;
            let page: ObjectList = Self::checked(resp, &format!("list gs://{}", bucket))
                .await?
                .json()
                .await
                .map_err(|e| IngestError::storage(format!("list gs://{} returned bad JSON: {}", bucket, e)))?;

            keys.extend(page.items.into_iter().map(|item| item.name));
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
        Ok(keys)
    }

    async fn get_text(&self, bucket: &str, key: &str) -> Result<String> {
        let url = self.media_url(bucket, key)?;
        let resp = self
            .client
            .get(url)
            .header(AUTHORIZATION, self.bearer())
            .send()
            .await
            .map_err(|e| IngestError::storage(format!("download gs://{}/{} failed: {}", bucket, key, e)))?;
        Self::checked(resp, &format!("download gs://{}/{}", bucket, key))
            .await?
            .text()
            .await
            .map_err(|e| IngestError::storage(format!("download gs://{}/{} failed: {}", bucket, key, e)))
    }
}
