use brasil_api_ingest::app::orchestrator::{ApiOrchestrator, FetchReport, LoadReport};
use brasil_api_ingest::app::ports::TableStorePort;
use brasil_api_ingest::config::Config;
use brasil_api_ingest::constants::RUN_FINISHED_MESSAGE;
use brasil_api_ingest::infra::{
    blob_store_from_config, table_store_from_config, InMemoryTableStore, OfflineHttp, ReqwestHttp,
};
use brasil_api_ingest::server::{self, AppState};
use brasil_api_ingest::{generate_name, logging, metrics, TraceId};
use clap::{Parser, Subcommand};
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, info_span, warn, Instrument};

#[derive(Parser)]
#[command(name = "brasil_api_ingest")]
#[command(about = "Fetch parameterized BrasilAPI data into blob storage and load it into tables")]
#[command(version)]
struct Cli {
    /// TOML config file (defaults to ingest.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Fixed trace id instead of a generated one
    #[arg(long, global = true)]
    trace_id: Option<TraceId>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the expanded requests and their object names without fetching
    Expand,
    /// Fetch every expanded request and persist the payloads
    Fetch {
        /// Blob folder for this run
        #[arg(long)]
        folder: Option<String>,
    },
    /// Load the persisted objects of a folder into the table store
    Load {
        #[arg(long)]
        folder: Option<String>,
        /// Bucket to read from (defaults to storage.bucket)
        #[arg(long)]
        bucket: Option<String>,
    },
    /// Fetch then load the same folder
    Run {
        #[arg(long)]
        folder: Option<String>,
    },
    /// Serve the HTTP trigger (GET /?folder=<name>)
    Serve {
        #[arg(long, env = "INGEST_ADDR", default_value = "0.0.0.0:8080")]
        addr: SocketAddr,
        /// Expose Prometheus metrics on this address
        #[arg(long, env = "INGEST_METRICS_ADDR")]
        metrics_addr: Option<SocketAddr>,
    },
}

fn print_fetch(report: &FetchReport) {
    println!("\n📊 Fetch results (trace {}):", report.trace_id);
    println!("   Requests: {}", report.attempted);
    println!("   Persisted: {}", report.persisted_keys.len());
    println!("   Failed: {}", report.failures.len());
    for failure in &report.failures {
        println!("   - {} [{}]: {}", failure.item, failure.kind, failure.message);
    }
}

fn print_load(report: &LoadReport) {
    println!("\n📊 Load results:");
    println!("   Objects listed: {}", report.objects_listed);
    println!("   Objects loaded: {}", report.objects_loaded);
    println!("   Rows appended: {}", report.rows_appended);
    println!("   Failed: {}", report.failures.len());
    for failure in &report.failures {
        println!("   - {} [{}]: {}", failure.item, failure.kind, failure.message);
    }
}

/// Runs one batch command inside the `ingest_run` span of its trace id.
async fn in_run_span<F>(trace_id: TraceId, work: F) -> anyhow::Result<()>
where
    F: Future<Output = anyhow::Result<()>>,
{
    let span = info_span!("ingest_run", trace_id = %trace_id);
    async {
        info!("Starting API orchestrator");
        work.await?;
        println!("✅ {}", RUN_FINISHED_MESSAGE);
        Ok(())
    }
    .instrument(span)
    .await
}

fn expand_command(config: &Config, trace_id: TraceId) -> anyhow::Result<()> {
    // Expansion input is validated here, before any network call
    let settings = config.orchestrator_settings(trace_id)?;
    for descriptor in settings.parameters.expand(&settings.api.endpoint) {
        let query: Vec<String> = descriptor
            .query_parameter()
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        println!(
            "{}\t{}?{}",
            generate_name(&descriptor),
            descriptor.url(&settings.api.base_url),
            query.join("&")
        );
    }
    Ok(())
}

async fn fetch_command(config: &Config, trace_id: TraceId, folder: Option<String>) -> anyhow::Result<()> {
    let mut settings = config.orchestrator_settings(trace_id)?;
    println!("📥 Fetching {}{}...", settings.api.base_url, settings.api.endpoint);
    if folder.is_some() {
        settings.download_folder = folder;
    }
    // Fetching never touches the warehouse
    let tables: Arc<dyn TableStorePort> = Arc::new(InMemoryTableStore::new());
    let orchestrator = ApiOrchestrator::new(
        Arc::new(ReqwestHttp::new(config.http_timeout())?),
        blob_store_from_config(&config.storage)?,
        tables,
        settings,
    );
    let report = orchestrator.execute_requests().await;
    print_fetch(&report);
    if !report.failures.is_empty() {
        warn!("{} requests failed", report.failures.len());
    }
    Ok(())
}

async fn load_command(
    config: &Config,
    trace_id: TraceId,
    folder: Option<String>,
    bucket: Option<String>,
) -> anyhow::Result<()> {
    let settings = config.orchestrator_settings(trace_id)?;
    let folder = folder.or_else(|| settings.download_folder.clone());
    let bucket = bucket.unwrap_or_else(|| settings.bucket.clone());
    println!("🔨 Loading {}/{}...", bucket, folder.as_deref().unwrap_or(""));
    // Loading never calls the API
    let orchestrator = ApiOrchestrator::new(
        Arc::new(OfflineHttp),
        blob_store_from_config(&config.storage)?,
        table_store_from_config(&config.warehouse)?,
        settings,
    );
    let report = orchestrator.load_folder(&bucket, folder.as_deref()).await?;
    print_load(&report);
    if !report.failures.is_empty() {
        warn!("{} objects failed to load", report.failures.len());
    }
    Ok(())
}

async fn run_command(config: &Config, trace_id: TraceId, folder: Option<String>) -> anyhow::Result<()> {
    let mut settings = config.orchestrator_settings(trace_id)?;
    println!("🚀 Running fetch + load...");
    if folder.is_some() {
        settings.download_folder = folder;
    }
    let orchestrator = ApiOrchestrator::new(
        Arc::new(ReqwestHttp::new(config.http_timeout())?),
        blob_store_from_config(&config.storage)?,
        table_store_from_config(&config.warehouse)?,
        settings,
    );
    let report = orchestrator.run().await?;
    print_fetch(&report.fetch);
    print_load(&report.load);
    if report.failure_count() > 0 {
        warn!("Run finished with {} failed items", report.failure_count());
    }
    Ok(())
}

async fn serve_command(
    config: Config,
    addr: SocketAddr,
    metrics_addr: Option<SocketAddr>,
) -> anyhow::Result<()> {
    if let Some(metrics_addr) = metrics_addr {
        metrics::init_metrics(metrics_addr);
    }
    let state = Arc::new(AppState {
        http: Arc::new(ReqwestHttp::new(config.http_timeout())?),
        blobs: blob_store_from_config(&config.storage)?,
        tables: table_store_from_config(&config.warehouse)?,
        config,
    });
    server::serve(addr, state).await?;
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    let _log_guard = logging::init_logging();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(trace_id) = cli.trace_id {
        config.trace_id = Some(trace_id);
    }
    // The server resolves its own trace id per request
    let trace_id = config.resolve_trace_id();

    match cli.command {
        Commands::Expand => in_run_span(trace_id, async { expand_command(&config, trace_id) }).await,
        Commands::Fetch { folder } => in_run_span(trace_id, fetch_command(&config, trace_id, folder)).await,
        Commands::Load { folder, bucket } => {
            in_run_span(trace_id, load_command(&config, trace_id, folder, bucket)).await
        }
        Commands::Run { folder } => in_run_span(trace_id, run_command(&config, trace_id, folder)).await,
        Commands::Serve { addr, metrics_addr } => serve_command(config, addr, metrics_addr).await,
    }
}
