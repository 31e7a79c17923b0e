use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use brasil_api_ingest::app::ports::{BlobStorePort, HttpClientPort};
use brasil_api_ingest::config::Config;
use brasil_api_ingest::infra::{InMemoryBlobStore, InMemoryTableStore};
use brasil_api_ingest::server::{create_server, AppState};
use brasil_api_ingest::{IngestError, QueryParams, Result, TraceId};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

struct FlakyHttp;

#[async_trait]
impl HttpClientPort for FlakyHttp {
    async fn get_json(
        &self,
        url: &str,
        _headers: &[(String, String)],
        _query: &QueryParams,
    ) -> Result<Value> {
        if url.ends_with("/RR") {
            return Err(IngestError::transport("GET returned 500"));
        }
        Ok(json!([{ "nome": "Maceió" }, { "nome": "Arapiraca" }]))
    }
}

fn state(toml: &str) -> (Arc<AppState>, Arc<InMemoryBlobStore>, Arc<InMemoryTableStore>) {
    let mut config = Config::from_toml_str(toml).unwrap();
    config.trace_id = Some(TraceId::new(55550101));
    let blobs = Arc::new(InMemoryBlobStore::new());
    let tables = Arc::new(InMemoryTableStore::new());
    let state = Arc::new(AppState {
        config,
        http: Arc::new(FlakyHttp),
        blobs: blobs.clone(),
        tables: tables.clone(),
    });
    (state, blobs, tables)
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn health_reports_service() {
    let (state, _, _) = state("");
    let app = create_server(state);

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "brasil_api_ingest");
}

#[tokio::test]
async fn trigger_answers_generic_success_despite_item_failures() {
    let (state, blobs, tables) = state("");
    let app = create_server(state);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/?folder=2024-05-01")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "Script executed with success");

    // Default parameters expand to AL and RR; RR fails upstream
    let keys = blobs.list("brasil_api", Some("2024-05-01")).await.unwrap();
    assert_eq!(
        keys,
        vec!["2024-05-01/ibge_municipios_path(AL)_providers(dados-abertos-br,gov,wikipedia).json"]
    );
    let rows = tables.rows("brasil_api", "ibge_municipios");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1]["nome"], json!("Arapiraca"));
    assert_eq!(rows[1]["trace_id"], json!(55550101));
}

#[tokio::test]
async fn invalid_parameter_shape_fails_the_trigger() {
    let (state, blobs, _) = state(
        r#"
[parameters]
path = ["AL"]
[parameters.query]
providers = [["nested"]]
"#,
    );
    let app = create_server(state);

    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body_text(response).await.contains("providers"));
    assert!(blobs.is_empty(), "nothing is fetched before validation passes");
}
