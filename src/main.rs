//! CLI entry point for ptla.
//!
//! `serve` runs the poll scheduler alongside the metrics server; `analyze`
//! decodes and aggregates a single payload from disk or over HTTP.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ptla::analyzers::aggregate;
use ptla::config::ServeArgs;
use ptla::feed::FeedKind;
use ptla::fetch::{ApiKey, BasicClient, HttpClient, fetch_bytes};
use ptla::metrics::MetricState;
use ptla::output::{SnapshotEmitter, print_json};
use ptla::parser::decode;
use ptla::scheduler::PollScheduler;
use ptla::server;
use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "ptla")]
#[command(about = "Per-route KPIs from GTFS-Realtime feeds", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll both feeds and serve metrics until interrupted
    Serve(ServeArgs),
    /// Decode and aggregate a single GTFS-RT payload from a file or URL
    Analyze {
        /// Path to file or URL to fetch
        #[arg(value_name = "FILE_OR_URL")]
        source: String,

        /// Which feed the payload belongs to
        #[arg(short, long, default_value = "vehicle_positions")]
        kind: FeedKind,

        /// Fetch timeout in seconds when the source is a URL
        #[arg(long, default_value_t = 15)]
        timeout_seconds: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/ptla.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("ptla.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => serve(args).await?,
        Commands::Analyze {
            source,
            kind,
            timeout_seconds,
        } => {
            let bytes = fetcher(&source, kind, Duration::from_secs(timeout_seconds)).await?;
            let decoded = decode(&bytes, kind)?;
            info!(
                entities = decoded.entity_count,
                records = decoded.entities.len(),
                %kind,
                "Payload decoded"
            );

            let results = aggregate(&decoded.entities);
            print_json(&results.values().collect::<Vec<_>>())?;
        }
    }

    Ok(())
}

/// Loads feed data from a local file path or fetches it over HTTP.
#[tracing::instrument(skip_all, fields(source = %source, %kind))]
async fn fetcher(source: &str, kind: FeedKind, timeout: Duration) -> Result<Vec<u8>> {
    let bytes = if source.starts_with("http") {
        let client = BasicClient::new(timeout)?;
        fetch_bytes(&client, kind, source, timeout).await?.to_vec()
    } else {
        std::fs::read(source).with_context(|| format!("reading {source}"))?
    };
    Ok(bytes)
}

async fn serve(args: ServeArgs) -> Result<()> {
    let config = args.poll_config();

    for feed in FeedKind::ALL {
        if config.url(feed).trim().is_empty() {
            tracing::warn!(%feed, "Feed URL not configured; it will report failure every cycle");
        }
    }

    let metrics = Arc::new(
        MetricState::new(&config.agency, &config.city)
            .context("registering metrics")?
            .with_delay_ttl(args.delay_series_ttl_cycles),
    );

    let basic = BasicClient::new(config.fetch_timeout)?;
    let client: Arc<dyn HttpClient> = match &args.api_key {
        Some(key) => Arc::new(ApiKey::new(basic, &args.api_key_header, key)?),
        None => Arc::new(basic),
    };

    let emitter = SnapshotEmitter::open(&args.log_path)?;
    let scheduler = PollScheduler::new(config, client, Arc::clone(&metrics), emitter);

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let poller = tokio::spawn(scheduler.run(async move {
        let _ = shutdown_rx.changed().await;
    }));

    let app = server::router(metrics);
    let listener = tokio::net::TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("binding {}", args.listen))?;
    info!(addr = %args.listen, "Listening on http://{}", args.listen);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    poller.await.context("poll scheduler task panicked")?;

    info!("Shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    let _ = signal::ctrl_c().await;
    info!("Shutdown requested");
}
