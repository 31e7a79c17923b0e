/// Defaults mirroring the production deployment against BrasilAPI.

pub const DEFAULT_BASE_URL: &str = "https://brasilapi.com.br/api/";
pub const DEFAULT_ENDPOINT: &str = "ibge/municipios/v1/";

/// Header BrasilAPI-style services read the API key from
pub const DEFAULT_AUTH_HEADER: &str = "chave-api-dados";

pub const DEFAULT_BUCKET: &str = "brasil_api";
pub const DEFAULT_DATASET: &str = "brasil_api";

pub const DEFAULT_BLOB_ROOT: &str = "data/blobs";
pub const DEFAULT_WAREHOUSE_PATH: &str = "data/warehouse.db";
pub const DEFAULT_CONFIG_PATH: &str = "ingest.toml";

pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Message the HTTP trigger and CLI report once a run finishes
pub const RUN_FINISHED_MESSAGE: &str = "Script executed with success";

pub const GCS_API_BASE: &str = "https://storage.googleapis.com";
