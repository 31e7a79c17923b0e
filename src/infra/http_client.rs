use crate::app::ports::HttpClientPort;
use crate::error::{IngestError, Result};
use crate::request::QueryParams;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

pub struct ReqwestHttp {
    client: reqwest::Client,
}

impl ReqwestHttp {
    /// `timeout` of `None` keeps reqwest's defaults.
    pub fn new(timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("brasil_api_ingest/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| IngestError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpClientPort for ReqwestHttp {
    async fn get_json(
        &self,
        url: &str,
        headers: &[(String, String)],
        query: &QueryParams,
    ) -> Result<Value> {
        let mut req = self.client.get(url).query(query.as_pairs());
        for (name, value) in headers {
            req = req.header(name.as_str(), value.as_str());
        }

        let resp = req
            .send()
            .await
            .map_err(|e| IngestError::transport(format!("GET {} failed: {}", url, e)))?;
        let status = resp.status();
        debug!("GET {} -> {}", resp.url(), status);
        if status != StatusCode::OK {
            let body = resp.text().await.unwrap_or_default();
            return Err(IngestError::transport(format!(
                "GET {} returned {}: {}",
                url,
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        resp.json::<Value>()
            .await
            .map_err(|e| IngestError::transport(format!("GET {} returned invalid JSON: {}", url, e)))
    }
}

/// Stand-in for commands that never reach the API, such as `load`.
/// Every call fails with a transport error.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineHttp;

#[async_trait]
impl HttpClientPort for OfflineHttp {
    async fn get_json(
        &self,
        url: &str,
        _headers: &[(String, String)],
        _query: &QueryParams,
    ) -> Result<Value> {
        Err(IngestError::transport(format!("GET {} refused: HTTP is offline for this command", url)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn offline_client_refuses_every_request() {
        let err = OfflineHttp
            .get_json("https://brasilapi.com.br/api/ibge/municipios/v1/AL", &[], &QueryParams::new())
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Transport { .. }));
        assert!(err.to_string().contains("municipios/v1/AL"));
    }
}
