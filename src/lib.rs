//! Fans out parameterized BrasilAPI requests, persists each JSON payload to
//! blob storage inside a trace envelope, and loads persisted objects into an
//! append-only table store.

pub mod app;
pub mod config;
pub mod constants;
pub mod envelope;
pub mod error;
pub mod expand;
pub mod infra;
pub mod logging;
pub mod metrics;
pub mod naming;
pub mod request;
pub mod server;
pub mod trace;

pub use app::orchestrator::{ApiOrchestrator, FetchReport, LoadReport, OrchestratorSettings, RunReport};
pub use error::{IngestError, Result};
pub use expand::{expand, ParameterSpace};
pub use naming::generate_name;
pub use request::{QueryParams, RequestDescriptor};
pub use trace::TraceId;
