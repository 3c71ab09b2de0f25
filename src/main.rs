use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use discourse_comment_sync::config::Config;
use discourse_comment_sync::db::{Database, SqliteLock};
use discourse_comment_sync::render::SummaryFormatter;
use discourse_comment_sync::sync::{self, CountReconciler, SyncGuard, SystemClock};
use discourse_comment_sync::web::{self, AppState};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    init_tracing()?;

    info!("Starting discourse-comment-sync");

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    info!(
        webhook_mode = config.webhook_mode,
        sync_period_secs = config.sync_period.as_secs(),
        "Configuration loaded"
    );

    if let Some(parent) = config.database_path.parent() {
        tokio::fs::create_dir_all(parent).await.with_context(|| {
            format!("Failed to create database directory: {}", parent.display())
        })?;
    }

    let db = Database::new(&config.database_path)
        .await
        .context("Failed to initialize database")?;

    info!("Database initialized");

    let client = reqwest::Client::builder()
        .timeout(config.http_timeout)
        .user_agent(concat!("discourse-comment-sync/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")?;

    let store = Arc::new(db.clone());
    let lock = Arc::new(SqliteLock::new(db, config.lock_stale_after));
    let guard = SyncGuard::new(client, store.clone(), lock, Arc::new(SystemClock));
    let policy = Arc::new(config.policy());

    let state = AppState {
        guard: guard.clone(),
        reconciler: CountReconciler::new(guard.clone(), policy.clone()),
        policy: policy.clone(),
        formatter: Arc::new(SummaryFormatter::new(store)),
    };

    let web_host = config.web_host.clone();
    let web_port = config.web_port;
    let web_handle = tokio::spawn(async move {
        if let Err(e) = web::serve(&web_host, web_port, state).await {
            error!("Web server error: {e:#}");
        }
    });

    let poll_interval = config.poll_interval;
    let loop_policy = (*policy).clone();
    let shutdown = CancellationToken::new();
    let loop_shutdown = shutdown.clone();
    let mut sync_handle = tokio::spawn(async move {
        sync::sync_loop(guard, loop_policy, poll_interval, loop_shutdown).await;
    });
    info!(interval_secs = poll_interval.as_secs(), "Sync loop started");

    shutdown_signal().await;

    info!("Shutting down...");

    web_handle.abort();

    // Let an in-flight sync finish and release the advisory lock.
    shutdown.cancel();
    let grace = config.http_timeout + Duration::from_secs(5);
    if tokio::time::timeout(grace, &mut sync_handle).await.is_err() {
        warn!(grace_secs = grace.as_secs(), "Sync loop did not stop in time, aborting");
        sync_handle.abort();
    }

    info!("Shutdown complete");

    Ok(())
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,discourse_comment_sync=debug"));

    // Check if JSON logging is requested
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| matches!(v.to_lowercase().as_str(), "json" | "structured"))
        .unwrap_or(false);

    if use_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
