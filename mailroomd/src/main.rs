mod ipc;
mod runtime;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use clap::{Parser, Subcommand};
use mailroom_core::{CONTAINER_NAME_PREFIX, Engine, MailroomConfig, load_config};
use serde::Serialize;
use tracing::info;

use crate::ipc::{IpcWatcher, IpcWatcherConfig, LogOnlyDelegate};
use crate::runtime::{detect, lifecycle};

#[derive(Parser, Debug)]
#[command(name = "mailroomd", version, about = "Mailroom host daemon")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the mailbox watcher and health endpoints.
    Serve(ServeArgs),
    /// Print effective mailroomd config as JSON.
    PrintConfig(PrintConfigArgs),
}

#[derive(clap::Args, Debug)]
struct ServeArgs {
    #[arg(long, default_value = "config/mailroom.toml")]
    config: PathBuf,
    #[arg(long)]
    bind: Option<String>,
}

#[derive(clap::Args, Debug)]
struct PrintConfigArgs {
    #[arg(long, default_value = "config/mailroom.toml")]
    config: PathBuf,
}

#[derive(Clone)]
struct AppState {
    started_at: Instant,
    engine: Engine,
    config: Arc<MailroomConfig>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
    uptime_seconds: u64,
    bind: String,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: &'static str,
    engine: &'static str,
    poll_interval_ms: u64,
    main_group_folder: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    match cli.command.unwrap_or(Command::Serve(ServeArgs {
        config: PathBuf::from("config/mailroom.toml"),
        bind: None,
    })) {
        Command::Serve(args) => serve(args).await,
        Command::PrintConfig(args) => print_config(args),
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let mut config = load_config(&args.config)
        .with_context(|| format!("failed to load config from {}", args.config.display()))?;

    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }

    // Resolve the container engine once; everything downstream receives the
    // resolved value. Unusable override or no engine at all is fatal here.
    let engine = detect::resolve_cached(
        config.runtime.engine_override.as_deref(),
        Duration::from_millis(config.runtime.probe_timeout_ms),
    )
    .await
    .context("container engine resolution failed")?;
    info!(engine = engine.as_str(), "container engine resolved");

    lifecycle::ensure_running(engine)
        .await
        .context("container engine is unavailable")?;

    // Recover from a previous unclean shutdown before accepting new work.
    lifecycle::cleanup_orphans(engine, CONTAINER_NAME_PREFIX).await;

    let data_dir = PathBuf::from(&config.storage.data_dir);
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let watcher = IpcWatcher::new(
        IpcWatcherConfig {
            ipc_base_dir: data_dir.join("ipc"),
            poll_interval: Duration::from_millis(config.watcher.poll_interval_ms),
            main_group_folder: config.watcher.main_group_folder.clone(),
        },
        Arc::new(LogOnlyDelegate),
    );
    let watcher_handle = tokio::spawn(async move { watcher.run(shutdown_rx).await });

    let bind = config.server.bind.clone();
    let state = AppState {
        started_at: Instant::now(),
        engine,
        config: Arc::new(config),
    };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("failed to bind listener on {bind}"))?;

    info!(bind = %bind, "mailroomd listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server exited unexpectedly")?;

    // Let the in-flight tick drain before the process exits.
    shutdown_tx.send(true).ok();
    watcher_handle.await.ok();
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.ok();
    info!("shutdown signal received");
}

fn print_config(args: PrintConfigArgs) -> anyhow::Result<()> {
    let cfg = load_config(&args.config)
        .with_context(|| format!("failed to load config from {}", args.config.display()))?;
    println!("{}", serde_json::to_string_pretty(&cfg)?);
    Ok(())
}

async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: "mailroomd",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        bind: state.config.server.bind.clone(),
    })
}

async fn readyz(State(state): State<AppState>) -> Json<ReadyResponse> {
    Json(ReadyResponse {
        status: "ready",
        engine: state.engine.as_str(),
        poll_interval_ms: state.config.watcher.poll_interval_ms,
        main_group_folder: state.config.watcher.main_group_folder.clone(),
    })
}
