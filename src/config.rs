use crate::app::orchestrator::{ApiSettings, EnvelopeSettings, OrchestratorSettings};
use crate::constants::{
    DEFAULT_AUTH_HEADER, DEFAULT_BASE_URL, DEFAULT_BLOB_ROOT, DEFAULT_BUCKET, DEFAULT_CONFIG_PATH,
    DEFAULT_DATASET, DEFAULT_ENDPOINT, DEFAULT_WAREHOUSE_PATH,
};
use crate::error::{IngestError, Result};
use crate::expand::ParameterSpace;
use crate::naming;
use crate::trace::TraceId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_CONFIG_PATH: &str = "INGEST_CONFIG";
pub const ENV_API_TOKEN: &str = "INGEST_API_TOKEN";
pub const ENV_TRACE_ID: &str = "INGEST_TRACE_ID";
pub const ENV_BUCKET: &str = "INGEST_BUCKET";
pub const ENV_FOLDER: &str = "INGEST_FOLDER";
pub const ENV_BLOB_BACKEND: &str = "INGEST_BLOB_BACKEND";
pub const ENV_BLOB_ROOT: &str = "INGEST_BLOB_ROOT";
pub const ENV_WAREHOUSE_PATH: &str = "INGEST_WAREHOUSE_PATH";
pub const ENV_GCS_TOKEN: &str = "GCS_ACCESS_TOKEN";
pub const ENV_GCS_API_BASE: &str = "GCS_API_BASE";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub parameters: ParametersConfig,
    pub storage: StorageConfig,
    pub envelope: EnvelopeConfig,
    pub warehouse: WarehouseConfig,
    /// Fixed trace id; generated per run when absent
    pub trace_id: Option<TraceId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub endpoint: String,
    pub auth_header: String,
    pub token: Option<String>,
    pub timeout_seconds: Option<u64>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            auth_header: DEFAULT_AUTH_HEADER.to_string(),
            token: None,
            timeout_seconds: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParametersConfig {
    /// Values appended to the endpoint, one request set per value
    pub path: Vec<String>,
    /// Query parameter name to a scalar or a list of candidate values
    pub query: Map<String, Value>,
}

impl Default for ParametersConfig {
    fn default() -> Self {
        let mut query = Map::new();
        query.insert(
            "providers".to_string(),
            Value::String("dados-abertos-br,gov,wikipedia".to_string()),
        );
        Self {
            path: vec!["AL".to_string(), "RR".to_string()],
            query,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlobBackend {
    Filesystem,
    Gcs,
    Memory,
}

impl std::str::FromStr for BlobBackend {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "filesystem" | "fs" => Ok(BlobBackend::Filesystem),
            "gcs" => Ok(BlobBackend::Gcs),
            "memory" => Ok(BlobBackend::Memory),
            other => Err(IngestError::Config(format!("unknown blob backend '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: BlobBackend,
    /// Root directory for the filesystem backend
    pub root: PathBuf,
    pub bucket: String,
    pub folder: Option<String>,
    pub gcs_api_base: Option<String>,
    pub gcs_token: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: BlobBackend::Filesystem,
            root: PathBuf::from(DEFAULT_BLOB_ROOT),
            bucket: DEFAULT_BUCKET.to_string(),
            folder: None,
            gcs_api_base: None,
            gcs_token: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvelopeConfig {
    pub enabled: bool,
    pub timestamp: bool,
    pub source: bool,
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timestamp: false,
            source: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableBackend {
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WarehouseConfig {
    pub backend: TableBackend,
    pub path: PathBuf,
    pub dataset: String,
    /// Destination table; derived from the endpoint when absent
    pub table: Option<String>,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            backend: TableBackend::Sqlite,
            path: PathBuf::from(DEFAULT_WAREHOUSE_PATH),
            dataset: DEFAULT_DATASET.to_string(),
            table: None,
        }
    }
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl Config {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Reads the TOML file (explicit path, `INGEST_CONFIG`, or `ingest.toml`
    /// when present), then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let env: HashMap<String, String> = std::env::vars().collect();
        let explicit = path
            .map(Path::to_path_buf)
            .or_else(|| non_empty(env.get(ENV_CONFIG_PATH)).map(PathBuf::from));

        let mut config = match explicit {
            Some(path) => Self::read_file(&path)?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::read_file(Path::new(DEFAULT_CONFIG_PATH))?
            }
            None => Self::default(),
        };
        config.apply_overrides(&env)?;
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            IngestError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Applies `INGEST_*` / `GCS_*` overrides from a key/value map.
    pub fn apply_overrides(&mut self, kv: &HashMap<String, String>) -> Result<()> {
        if let Some(token) = non_empty(kv.get(ENV_API_TOKEN)) {
            self.api.token = Some(token);
        }
        if let Some(raw) = non_empty(kv.get(ENV_TRACE_ID)) {
            let trace_id = raw.parse::<TraceId>().map_err(|e| {
                IngestError::Config(format!("{} must be an integer, got '{}': {}", ENV_TRACE_ID, raw, e))
            })?;
            self.trace_id = Some(trace_id);
        }
        if let Some(bucket) = non_empty(kv.get(ENV_BUCKET)) {
            self.storage.bucket = bucket;
        }
        if let Some(folder) = non_empty(kv.get(ENV_FOLDER)) {
            self.storage.folder = Some(folder);
        }
        if let Some(backend) = non_empty(kv.get(ENV_BLOB_BACKEND)) {
            self.storage.backend = backend.parse()?;
        }
        if let Some(root) = non_empty(kv.get(ENV_BLOB_ROOT)) {
            self.storage.root = PathBuf::from(root);
        }
        if let Some(token) = non_empty(kv.get(ENV_GCS_TOKEN)) {
            self.storage.gcs_token = Some(token);
        }
        if let Some(base) = non_empty(kv.get(ENV_GCS_API_BASE)) {
            self.storage.gcs_api_base = Some(base);
        }
        if let Some(path) = non_empty(kv.get(ENV_WAREHOUSE_PATH)) {
            self.warehouse.path = PathBuf::from(path);
        }
        Ok(())
    }

    /// Validated expansion input. Fails with `InvalidParameterShape` on
    /// malformed query values.
    pub fn parameter_space(&self) -> Result<ParameterSpace> {
        let paths = self.parameters.path.iter().cloned().map(Some).collect();
        ParameterSpace::from_raw(&self.parameters.query, paths)
    }

    pub fn table_name(&self) -> Result<String> {
        let table = non_empty(self.warehouse.table.as_ref())
            .unwrap_or_else(|| naming::table_name(&self.api.endpoint));
        if table.is_empty() {
            return Err(IngestError::Config(format!(
                "cannot derive a table name from endpoint '{}'; set warehouse.table",
                self.api.endpoint
            )));
        }
        Ok(table)
    }

    pub fn http_timeout(&self) -> Option<Duration> {
        self.api.timeout_seconds.map(Duration::from_secs)
    }

    pub fn resolve_trace_id(&self) -> TraceId {
        self.trace_id.unwrap_or_else(TraceId::generate)
    }

    pub fn orchestrator_settings(&self, trace_id: TraceId) -> Result<OrchestratorSettings> {
        Ok(OrchestratorSettings {
            api: ApiSettings {
                base_url: self.api.base_url.clone(),
                endpoint: self.api.endpoint.clone(),
                token: non_empty(self.api.token.as_ref()),
                auth_header: self.api.auth_header.clone(),
            },
            parameters: self.parameter_space()?,
            bucket: self.storage.bucket.clone(),
            download_folder: non_empty(self.storage.folder.as_ref()),
            envelope: EnvelopeSettings {
                enabled: self.envelope.enabled,
                timestamp: self.envelope.timestamp,
                source: self.envelope.source,
            },
            dataset: self.warehouse.dataset.clone(),
            table: self.table_name()?,
            trace_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_production_run() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.api.base_url, "https://brasilapi.com.br/api/");
        assert_eq!(config.api.endpoint, "ibge/municipios/v1/");
        assert_eq!(config.storage.bucket, "brasil_api");
        assert_eq!(config.storage.backend, BlobBackend::Filesystem);
        assert!(config.envelope.enabled);

        let space = config.parameter_space().unwrap();
        assert_eq!(space.request_count(), 2);
        assert_eq!(config.table_name().unwrap(), "ibge_municipios");
    }

    #[test]
    fn example_config_matches_defaults() {
        let example = Config::from_toml_str(include_str!("../ingest.example.toml")).unwrap();
        let defaults = Config::default();
        assert_eq!(example.api.base_url, defaults.api.base_url);
        assert_eq!(example.parameters.path, defaults.parameters.path);
        assert_eq!(example.parameters.query, defaults.parameters.query);
        assert_eq!(example.storage.root, defaults.storage.root);
        assert_eq!(example.warehouse.path, defaults.warehouse.path);
        assert_eq!(example.http_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn toml_preserves_query_order_and_accepts_lists() {
        let config = Config::from_toml_str(
            r#"
            trace_id = 1234120000

            [api]
            endpoint = "cep/v2/"
            token = "abc"

            [parameters]
            path = []

            [parameters.query]
            zeta = ["1", "2"]
            alpha = 3

            [storage]
            backend = "memory"
            folder = "2024-01-01"

            [warehouse]
            backend = "memory"
            table = "ceps"
            "#,
        )
        .unwrap();

        let space = config.parameter_space().unwrap();
        let keys: Vec<&str> = space.query_parameters().iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["zeta", "alpha"]);
        assert_eq!(space.request_count(), 2);

        let settings = config.orchestrator_settings(config.resolve_trace_id()).unwrap();
        assert_eq!(settings.trace_id, TraceId::new(1234120000));
        assert_eq!(settings.api.token.as_deref(), Some("abc"));
        assert_eq!(settings.download_folder.as_deref(), Some("2024-01-01"));
        assert_eq!(settings.table, "ceps");
        assert_eq!(config.storage.backend, BlobBackend::Memory);
        assert_eq!(config.warehouse.backend, TableBackend::Memory);
    }

    #[test]
    fn malformed_query_values_are_rejected() {
        let config = Config::from_toml_str(
            r#"
            [parameters.query]
            providers = { nested = "x" }
            "#,
        )
        .unwrap();
        let err = config.orchestrator_settings(TraceId::new(1)).unwrap_err();
        assert!(matches!(err, IngestError::InvalidParameterShape { .. }));
    }

    #[test]
    fn overrides_apply_from_key_values() {
        let mut config = Config::default();
        let kv: HashMap<String, String> = [
            (ENV_API_TOKEN, "tok"),
            (ENV_TRACE_ID, "987612345"),
            (ENV_FOLDER, "run-7"),
            (ENV_BLOB_BACKEND, "gcs"),
            (ENV_GCS_TOKEN, "ya29"),
            (ENV_BUCKET, "  "),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        config.apply_overrides(&kv).unwrap();

        assert_eq!(config.api.token.as_deref(), Some("tok"));
        assert_eq!(config.trace_id, Some(TraceId::new(987612345)));
        assert_eq!(config.storage.folder.as_deref(), Some("run-7"));
        assert_eq!(config.storage.backend, BlobBackend::Gcs);
        assert_eq!(config.storage.gcs_token.as_deref(), Some("ya29"));
        // blank values are ignored
        assert_eq!(config.storage.bucket, "brasil_api");
    }

    #[test]
    fn bad_trace_id_override_is_a_config_error() {
        let mut config = Config::default();
        let kv = HashMap::from([(ENV_TRACE_ID.to_string(), "not-a-number".to_string())]);
        assert!(matches!(config.apply_overrides(&kv), Err(IngestError::Config(_))));
    }

    #[test]
    fn endpoint_without_meaningful_segments_needs_explicit_table() {
        let mut config = Config::default();
        config.api.endpoint = "v1/".to_string();
        assert!(config.table_name().is_err());
        config.warehouse.table = Some("manual".to_string());
        assert_eq!(config.table_name().unwrap(), "manual");
    }
}
