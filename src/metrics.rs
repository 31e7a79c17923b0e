//! Pipeline metrics, grouped by phase.
//!
//! Calls are cheap no-ops until a recorder is installed, so the CLI can run
//! without an exporter while `serve` exposes them to Prometheus.

use std::net::SocketAddr;
use std::sync::OnceLock;
use tracing::{info, warn};

static INSTALLED: OnceLock<bool> = OnceLock::new();

/// Installs the Prometheus recorder and its HTTP listener on `addr`.
/// Must run inside a Tokio runtime. Idempotent; returns whether an exporter
/// is active.
pub fn init_metrics(addr: SocketAddr) -> bool {
    *INSTALLED.get_or_init(|| {
        match metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
        {
            Ok(()) => {
                info!("Prometheus exporter listening at http://{}/metrics", addr);
                register_metrics();
                true
            }
            Err(e) => {
                warn!("Failed to install Prometheus exporter: {}", e);
                false
            }
        }
    })
}

/// Pre-register so every series shows up on the first scrape.
fn register_metrics() {
    let _ = ::metrics::counter!(fetch::REQUESTS_SUCCESS);
    let _ = ::metrics::counter!(fetch::REQUESTS_ERROR);
    let _ = ::metrics::histogram!(fetch::REQUEST_DURATION);
    let _ = ::metrics::counter!(storage::OBJECTS_STORED);
    let _ = ::metrics::counter!(storage::ERRORS);
    let _ = ::metrics::counter!(load::ROWS_APPENDED);
    let _ = ::metrics::counter!(load::OBJECTS_LOADED);
    let _ = ::metrics::counter!(load::ERRORS);
}

pub mod fetch {
    pub const REQUESTS_SUCCESS: &str = "ingest_fetch_requests_success_total";
    pub const REQUESTS_ERROR: &str = "ingest_fetch_requests_error_total";
    pub const REQUEST_DURATION: &str = "ingest_fetch_request_duration_seconds";

    pub fn request_success(duration_secs: f64) {
        ::metrics::counter!(REQUESTS_SUCCESS).increment(1);
        ::metrics::histogram!(REQUEST_DURATION).record(duration_secs);
    }

    pub fn request_error() {
        ::metrics::counter!(REQUESTS_ERROR).increment(1);
    }
}

pub mod storage {
    pub const OBJECTS_STORED: &str = "ingest_storage_objects_stored_total";
    pub const ERRORS: &str = "ingest_storage_errors_total";

    pub fn object_stored() {
        ::metrics::counter!(OBJECTS_STORED).increment(1);
    }

    pub fn error() {
        ::metrics::counter!(ERRORS).increment(1);
    }
}

pub mod load {
    pub const ROWS_APPENDED: &str = "ingest_load_rows_appended_total";
    pub const OBJECTS_LOADED: &str = "ingest_load_objects_loaded_total";
    pub const ERRORS: &str = "ingest_load_errors_total";

    pub fn object_loaded(rows: usize) {
        ::metrics::counter!(OBJECTS_LOADED).increment(1);
        ::metrics::counter!(ROWS_APPENDED).increment(rows as u64);
    }

    pub fn error() {
        ::metrics::counter!(ERRORS).increment(1);
    }
}
