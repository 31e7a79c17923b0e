use anyhow::Result;
use async_trait::async_trait;
use brasil_api_ingest::app::ports::HttpClientPort;
use brasil_api_ingest::config::Config;
use brasil_api_ingest::infra::{blob_store_from_config, table_store_from_config, SqliteTableStore};
use brasil_api_ingest::{ApiOrchestrator, QueryParams, TraceId};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::tempdir;

struct MunicipiosHttp;

#[async_trait]
impl HttpClientPort for MunicipiosHttp {
    async fn get_json(
        &self,
        url: &str,
        _headers: &[(String, String)],
        query: &QueryParams,
    ) -> brasil_api_ingest::Result<Value> {
        let uf = url.rsplit('/').next().unwrap_or_default().to_string();
        Ok(json!([
            { "nome": format!("{} 1", uf), "codigo_ibge": "1", "providers": query.get("providers") },
            { "nome": format!("{} 2", uf), "codigo_ibge": "2", "providers": query.get("providers") }
        ]))
    }
}

fn config_for(root: &std::path::Path) -> Result<Config> {
    let toml = format!(
        r#"
[api]
endpoint = "ibge/municipios/v1/"

[parameters]
path = ["AL", "RR"]

[parameters.query]
providers = ["gov", "wikipedia"]

[storage]
backend = "filesystem"
root = "{blobs}"
folder = "daily"

[envelope]
source = true

[warehouse]
backend = "sqlite"
path = "{db}"
"#,
        blobs = root.join("blobs").display(),
        db = root.join("wh").join("warehouse.db").display(),
    );
    let mut config = Config::from_toml_str(&toml)?;
    config.trace_id = Some(TraceId::new(42421200));
    Ok(config)
}

#[tokio::test]
async fn fetch_to_files_then_load_into_sqlite() -> Result<()> {
    let temp_dir = tempdir()?;
    let config = config_for(temp_dir.path())?;
    let trace_id = config.resolve_trace_id();

    let orchestrator = ApiOrchestrator::new(
        Arc::new(MunicipiosHttp),
        blob_store_from_config(&config.storage)?,
        table_store_from_config(&config.warehouse)?,
        config.orchestrator_settings(trace_id)?,
    );
    let report = orchestrator.run().await?;

    assert_eq!(report.failure_count(), 0);
    assert_eq!(report.fetch.persisted_keys.len(), 4);
    assert_eq!(report.load.objects_loaded, 4);
    assert_eq!(report.load.rows_appended, 8);

    // Objects land at <root>/<bucket>/<folder>/<name>
    let stored_path = temp_dir
        .path()
        .join("blobs")
        .join("brasil_api")
        .join("daily")
        .join("ibge_municipios_path(AL)_providers(gov).json");
    let stored: Value = serde_json::from_str(&std::fs::read_to_string(stored_path)?)?;
    assert_eq!(stored["envelope"]["trace_id"], json!(42421200));
    assert_eq!(
        stored["envelope"]["source"],
        json!("https://brasilapi.com.br/api/ibge/municipios/v1/AL")
    );
    assert_eq!(stored["content"][0]["nome"], json!("AL 1"));

    drop(orchestrator);
    let warehouse = SqliteTableStore::open(temp_dir.path().join("wh").join("warehouse.db"))?;
    let rows = warehouse.rows("brasil_api", "ibge_municipios")?;
    assert_eq!(rows.len(), 8);
    assert!(rows.iter().all(|r| r["trace_id"] == json!(42421200)));
    let columns = warehouse.columns("brasil_api", "ibge_municipios")?;
    for expected in ["_ingested_at", "nome", "codigo_ibge", "providers", "trace_id", "source"] {
        assert!(columns.iter().any(|c| c == expected), "missing column {}", expected);
    }
    Ok(())
}

#[tokio::test]
async fn loading_a_missing_folder_is_empty_not_an_error() -> Result<()> {
    let temp_dir = tempdir()?;
    let config = config_for(temp_dir.path())?;

    let orchestrator = ApiOrchestrator::new(
        Arc::new(MunicipiosHttp),
        blob_store_from_config(&config.storage)?,
        table_store_from_config(&config.warehouse)?,
        config.orchestrator_settings(TraceId::new(1))?,
    );
    let report = orchestrator.load_folder("brasil_api", Some("never-written")).await?;

    assert_eq!(report.objects_listed, 0);
    assert_eq!(report.rows_appended, 0);
    assert!(report.failures.is_empty());
    Ok(())
}
