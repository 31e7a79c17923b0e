use crate::app::orchestrator::ApiOrchestrator;
use crate::app::ports::{BlobStorePort, HttpClientPort, TableStorePort};
use crate::config::Config;
use crate::constants::RUN_FINISHED_MESSAGE;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info, info_span, warn, Instrument};

/// Everything a triggered run needs; ports are shared across requests.
pub struct AppState {
    pub config: Config,
    pub http: Arc<dyn HttpClientPort>,
    pub blobs: Arc<dyn BlobStorePort>,
    pub tables: Arc<dyn TableStorePort>,
}

#[derive(Debug, Deserialize)]
pub struct TriggerParams {
    /// Blob folder for this run; falls back to `storage.folder`
    pub folder: Option<String>,
}

/// Health check endpoint
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "brasil_api_ingest",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Runs fetch-and-persist then load, like the scheduled cloud trigger did.
///
/// Per-descriptor and per-object failures still answer 200 with the generic
/// message; they only show up in the logs. Configuration and listing
/// failures answer 500.
async fn trigger(State(state): State<Arc<AppState>>, Query(params): Query<TriggerParams>) -> Response {
    let trace_id = state.config.resolve_trace_id();
    let mut settings = match state.config.orchestrator_settings(trace_id) {
        Ok(settings) => settings,
        Err(e) => {
            error!(trace_id = %trace_id, "Invalid configuration, run aborted: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
        }
    };
    if let Some(folder) = params.folder.filter(|f| !f.trim().is_empty()) {
        settings.download_folder = Some(folder);
    }

    let orchestrator = ApiOrchestrator::new(
        state.http.clone(),
        state.blobs.clone(),
        state.tables.clone(),
        settings,
    );

    let span = info_span!("ingest_run", trace_id = %trace_id);
    match orchestrator.run().instrument(span).await {
        Ok(report) => {
            if report.failure_count() > 0 {
                warn!(
                    trace_id = %trace_id,
                    "Run finished with {} failed requests and {} failed loads",
                    report.fetch.failures.len(),
                    report.load.failures.len()
                );
            }
            (StatusCode::OK, RUN_FINISHED_MESSAGE).into_response()
        }
        Err(e) => {
            error!(trace_id = %trace_id, "Run aborted: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

pub fn create_server(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(trigger))
        .route("/health", get(health))
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, state: Arc<AppState>) -> Result<(), hyper::Error> {
    info!("HTTP trigger listening on http://{}", addr);
    axum::Server::bind(&addr)
        .serve(create_server(state).into_make_service())
        .await
}
