use crate::app::ports::{BlobStorePort, HttpClientPort, TableStorePort};
use crate::constants::JSON_CONTENT_TYPE;
use crate::envelope::{self, StoredObject};
use crate::error::{IngestError, Result};
use crate::expand::ParameterSpace;
use crate::naming::{generate_name, object_key};
use crate::request::RequestDescriptor;
use crate::trace::TraceId;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, info_span, instrument, warn, Instrument};

/// Where requests go and how they authenticate.
#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub base_url: String,
    pub endpoint: String,
    pub token: Option<String>,
    pub auth_header: String,
}

impl ApiSettings {
    fn headers(&self) -> Vec<(String, String)> {
        match &self.token {
            Some(token) => vec![(self.auth_header.clone(), token.clone())],
            None => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvelopeSettings {
    pub enabled: bool,
    /// Add `fetched_at` to the envelope
    pub timestamp: bool,
    /// Add the request URL as `source`
    pub source: bool,
}

impl Default for EnvelopeSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            timestamp: false,
            source: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub api: ApiSettings,
    pub parameters: ParameterSpace,
    pub bucket: String,
    pub download_folder: Option<String>,
    pub envelope: EnvelopeSettings,
    pub dataset: String,
    pub table: String,
    pub trace_id: TraceId,
}

/// One item (descriptor or object key) that failed inside a phase.
#[derive(Debug, Clone, Serialize)]
pub struct ItemFailure {
    pub item: String,
    pub kind: &'static str,
    pub message: String,
}

impl ItemFailure {
    fn new(item: impl Into<String>, err: &IngestError) -> Self {
        Self {
            item: item.into(),
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Outcome of the fetch-and-persist phase
#[derive(Debug, Clone, Serialize)]
pub struct FetchReport {
    pub trace_id: TraceId,
    pub attempted: usize,
    pub persisted_keys: Vec<String>,
    pub failures: Vec<ItemFailure>,
}

/// Outcome of the load phase
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadReport {
    pub objects_listed: usize,
    pub objects_loaded: usize,
    pub rows_appended: usize,
    pub failures: Vec<ItemFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub fetch: FetchReport,
    pub load: LoadReport,
}

impl RunReport {
    pub fn failure_count(&self) -> usize {
        self.fetch.failures.len() + self.load.failures.len()
    }
}

/// Drives expand, fetch-and-persist and load, strictly one item at a time.
///
/// A failing descriptor or object is logged, recorded in the report and
/// skipped; nothing is retried or rolled back. Loading the same folder twice
/// appends the rows twice.
pub struct ApiOrchestrator {
    http: Arc<dyn HttpClientPort>,
    blobs: Arc<dyn BlobStorePort>,
    tables: Arc<dyn TableStorePort>,
    settings: OrchestratorSettings,
}

impl ApiOrchestrator {
    pub fn new(
        http: Arc<dyn HttpClientPort>,
        blobs: Arc<dyn BlobStorePort>,
        tables: Arc<dyn TableStorePort>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            http,
            blobs,
            tables,
            settings,
        }
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    pub fn expand(&self) -> Vec<RequestDescriptor> {
        self.settings.parameters.expand(&self.settings.api.endpoint)
    }

    /// Fetches every expanded descriptor and writes one object per success.
    #[instrument(name = "fetch_and_persist", skip(self), fields(trace_id = %self.settings.trace_id))]
    pub async fn execute_requests(&self) -> FetchReport {
        let descriptors = self.expand();
        info!(
            "Executing {} requests against {}{}",
            descriptors.len(),
            self.settings.api.base_url,
            self.settings.api.endpoint
        );
        if descriptors.is_empty() {
            warn!("Parameter expansion produced no requests");
        }

        let mut report = FetchReport {
            trace_id: self.settings.trace_id,
            attempted: descriptors.len(),
            persisted_keys: Vec::new(),
            failures: Vec::new(),
        };

        for descriptor in &descriptors {
            let name = generate_name(descriptor);
            let span = info_span!("request", object = %name);
            match self.persist_one(descriptor, &name).instrument(span).await {
                Ok(key) => report.persisted_keys.push(key),
                Err(e) => {
                    error!(
                        object = %name,
                        url = %descriptor.url(&self.settings.api.base_url),
                        trace_id = %self.settings.trace_id,
                        "Request failed, continuing with next descriptor: {}",
                        e
                    );
                    report.failures.push(ItemFailure::new(name, &e));
                }
            }
        }

        info!(
            "Persisted {}/{} objects ({} failures)",
            report.persisted_keys.len(),
            report.attempted,
            report.failures.len()
        );
        report
    }

    async fn persist_one(&self, descriptor: &RequestDescriptor, name: &str) -> Result<String> {
        let api = &self.settings.api;
        let url = descriptor.url(&api.base_url);

        let started = Instant::now();
        let body = match self
            .http
            .get_json(&url, &api.headers(), descriptor.query_parameter())
            .await
        {
            Ok(body) => {
                crate::metrics::fetch::request_success(started.elapsed().as_secs_f64());
                body
            }
            Err(e) => {
                crate::metrics::fetch::request_error();
                return Err(e);
            }
        };
        debug!("Fetched {} in {:?}", url, started.elapsed());

        let bytes = if self.settings.envelope.enabled {
            let mut env = envelope::wrap(self.settings.trace_id, body);
            if self.settings.envelope.timestamp {
                env = env.with_fetched_at(chrono::Utc::now());
            }
            if self.settings.envelope.source {
                env = env.with_source(url.as_str());
            }
            env.to_bytes()?
        } else {
            serde_json::to_vec(&body)?
        };

        let key = object_key(self.settings.download_folder.as_deref(), name);
        match self
            .blobs
            .put(&self.settings.bucket, &key, bytes, JSON_CONTENT_TYPE)
            .await
        {
            Ok(()) => crate::metrics::storage::object_stored(),
            Err(e) => {
                crate::metrics::storage::error();
                return Err(e);
            }
        }
        info!("Stored {}/{}", self.settings.bucket, key);
        Ok(key)
    }

    /// Appends the rows of every object under `folder` to the configured table.
    ///
    /// Listing failures abort the phase; per-object failures are logged and skipped.
    #[instrument(name = "load", skip(self), fields(trace_id = %self.settings.trace_id))]
    pub async fn load_folder(&self, bucket: &str, folder: Option<&str>) -> Result<LoadReport> {
        let keys = self.blobs.list(bucket, folder).await?;
        let keys: Vec<String> = keys.into_iter().filter(|k| !k.ends_with('/')).collect();
        info!(
            "Loading {} objects from {}/{} into {}.{}",
            keys.len(),
            bucket,
            folder.unwrap_or(""),
            self.settings.dataset,
            self.settings.table
        );

        let mut report = LoadReport {
            objects_listed: keys.len(),
            ..LoadReport::default()
        };

        for key in keys {
            match self.load_one(bucket, &key).await {
                Ok(rows) => {
                    crate::metrics::load::object_loaded(rows);
                    report.objects_loaded += 1;
                    report.rows_appended += rows;
                }
                Err(e) => {
                    crate::metrics::load::error();
                    error!(
                        object = %key,
                        trace_id = %self.settings.trace_id,
                        "Load failed, continuing with next object: {}",
                        e
                    );
                    report.failures.push(ItemFailure::new(key, &e));
                }
            }
        }

        info!(
            "Appended {} rows from {} objects ({} failures)",
            report.rows_appended,
            report.objects_loaded,
            report.failures.len()
        );
        Ok(report)
    }

    async fn load_one(&self, bucket: &str, key: &str) -> Result<usize> {
        let text = self.blobs.get_text(bucket, key).await?;
        let stored = StoredObject::parse(&text)
            .map_err(|e| IngestError::load(format!("{} is not valid JSON: {}", key, e)))?;
        let unwrapped = envelope::unwrap(stored);
        let rows = unwrapped.rows.len();
        if rows == 0 {
            debug!("{} holds no rows, nothing to append", key);
            return Ok(0);
        }
        self.tables
            .append_rows(&self.settings.dataset, &self.settings.table, unwrapped.rows)
            .await?;
        debug!("Appended {} rows from {}", rows, key);
        Ok(rows)
    }

    /// Fetch-and-persist followed by loading the configured folder.
    pub async fn run(&self) -> Result<RunReport> {
        let fetch = self.execute_requests().await;
        let load = self
            .load_folder(&self.settings.bucket, self.settings.download_folder.as_deref())
            .await?;
        Ok(RunReport { fetch, load })
    }
}
