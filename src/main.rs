//! # Repository Stats Entry Point
//!
//! Loads configuration, connects the database, starts the repository watcher
//! and serves the read API until Ctrl-C or SIGTERM.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;

use repostats::{
    config::{AppConfig, ConfigLoader, parse_since},
    connectors::GitHubSource,
    db,
    registration::{Registrar, registration_channel},
    repositories::DbStore,
    scheduler::RepoWatcher,
    server::{AppState, run_server, shutdown_signal},
    service::StatsService,
    sync_engine::{SyncConfig, SyncEngine},
    telemetry,
};

/// Watches GitHub repositories and serves commit statistics.
#[derive(Debug, Parser)]
#[command(name = "repostats", version, about)]
struct Cli {
    /// Address to bind the HTTP server to (overrides REPOSTATS_API_BIND_ADDR)
    #[arg(long)]
    bind: Option<String>,

    /// Only ingest commits after this date on a repository's first sync
    /// (RFC 3339 or YYYY-MM-DD; overrides REPOSTATS_COMMITS_SINCE)
    #[arg(long)]
    since: Option<String>,

    /// Log level filter (overrides REPOSTATS_LOG_LEVEL)
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn apply(self, config: &mut AppConfig) -> anyhow::Result<()> {
        if let Some(bind) = self.bind {
            config.api_bind_addr = bind;
        }
        if let Some(since) = self.since {
            config.commits_since = Some(parse_since(&since)?);
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        config.validate()?;
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = ConfigLoader::new()
        .load()
        .context("Failed to load configuration")?;
    cli.apply(&mut config)?;

    telemetry::init_tracing(&config)?;
    info!(profile = %config.profile, "Loaded configuration");
    if let Ok(redacted) = config.redacted_json() {
        tracing::debug!(config = %redacted, "Effective configuration");
    }

    let db = db::init_pool(&config).await?;
    db::migrate(&db).await?;

    let config = Arc::new(config);
    let store = Arc::new(DbStore::new(Arc::new(db.clone())));
    let source = Arc::new(GitHubSource::new(&config.github).context("Failed to build GitHub client")?);

    let engine = Arc::new(SyncEngine::new(
        store.clone(),
        source,
        SyncConfig {
            page_size: config.watcher.page_size,
            default_since: config.commits_since,
            backoff: config.backoff.policy(),
        },
    ));

    let (signals, registrations) = registration_channel(config.watcher.queue_capacity);
    let registrar = Registrar::new(store.clone(), signals);
    let service = Arc::new(StatsService::new(registrar, store.clone()));

    let shutdown = CancellationToken::new();
    let watcher = RepoWatcher::new(engine, store, config.watcher.refresh_interval());
    let watcher_handle = tokio::spawn(watcher.run(registrations, shutdown.clone()));

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            shutdown.cancel();
        }
    });

    let state = AppState {
        config: config.clone(),
        db,
        service,
    };
    let served = run_server(state, shutdown.clone()).await;

    // The server may also stop on its own error; make sure the watcher follows.
    shutdown.cancel();
    if let Err(err) = watcher_handle.await {
        tracing::error!(error = ?err, "Watcher task terminated abnormally");
    }

    served
}
