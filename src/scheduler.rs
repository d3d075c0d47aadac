//! # Repository Watcher
//!
//! Two long-lived loops sharing one [`SyncEngine`]:
//!
//! - the registration listener, which starts an independent first sync for
//!   every newly registered repository;
//! - the periodic pass, which runs immediately at startup and then once per
//!   refresh interval, syncing every tracked repository one after another.
//!
//! Both loops stop only when the shared shutdown token is cancelled. Overlap
//! between a periodic run and a first-sync run of the same repository is
//! tolerated; their high-water mark writes are last-writer-wins.

use std::sync::Arc;
use std::time::Duration;

use metrics::histogram;
use tokio::task::JoinSet;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::registration::{RegistrationReceiver, RepoName};
use crate::repositories::RepoStore;
use crate::sync_engine::{SyncEngine, SyncError};

/// Outcome counts of one periodic pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PassStats {
    pub repositories: usize,
    pub synced: usize,
    pub failed: usize,
    /// The tracked set could not be read; nothing was attempted.
    pub listing_failed: bool,
    pub cancelled: bool,
}

/// Background watcher over the tracked repository set.
#[derive(Clone)]
pub struct RepoWatcher {
    engine: Arc<SyncEngine>,
    store: Arc<dyn RepoStore>,
    refresh_interval: Duration,
}

impl RepoWatcher {
    pub fn new(engine: Arc<SyncEngine>, store: Arc<dyn RepoStore>, refresh_interval: Duration) -> Self {
        Self {
            engine,
            store,
            refresh_interval,
        }
    }

    /// Run both loops until `shutdown` fires. In-flight first syncs are awaited
    /// before returning; they observe the same token.
    #[instrument(skip_all)]
    pub async fn run(self, registrations: RegistrationReceiver, shutdown: CancellationToken) {
        info!(
            refresh_interval_secs = self.refresh_interval.as_secs(),
            "Starting repository watcher"
        );
        tokio::join!(
            self.listen(registrations, &shutdown),
            self.periodic(&shutdown)
        );
        info!("Repository watcher stopped");
    }

    async fn listen(&self, mut registrations: RegistrationReceiver, shutdown: &CancellationToken) {
        let mut first_syncs = JoinSet::new();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("Registration listener shutdown requested");
                    break;
                }
                received = registrations.recv() => {
                    let Some(name) = received else {
                        warn!("Registration queue closed; waiting for shutdown");
                        shutdown.cancelled().await;
                        break;
                    };
                    self.start_first_sync(name, &mut first_syncs, shutdown).await;
                }
                Some(joined) = first_syncs.join_next(), if !first_syncs.is_empty() => {
                    if let Err(err) = joined {
                        error!(error = ?err, "First sync task panicked");
                    }
                }
            }
        }

        while let Some(joined) = first_syncs.join_next().await {
            if let Err(err) = joined {
                error!(error = ?err, "First sync task panicked");
            }
        }
    }

    async fn start_first_sync(
        &self,
        name: RepoName,
        tasks: &mut JoinSet<()>,
        shutdown: &CancellationToken,
    ) {
        let lookup = tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                debug!(repository = %name, "Shutdown before first sync started");
                return;
            }
            lookup = self.store.get_by_name(name.as_str()) => lookup,
        };
        let repo = match lookup {
            Ok(repo) => repo,
            Err(err) => {
                error!(repository = %name, error = %err, "Failed to load newly registered repository");
                return;
            }
        };

        debug!(repository = %name, repository_id = %repo.id, "Starting first sync");
        let engine = self.engine.clone();
        let shutdown = shutdown.clone();
        tasks.spawn(async move {
            // Failures are logged by the engine with phase context.
            let _ = engine.run(&repo, &shutdown).await;
        });
    }

    async fn periodic(&self, shutdown: &CancellationToken) {
        loop {
            let stats = self.run_pass(shutdown).await;
            if stats.cancelled {
                break;
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = sleep(self.refresh_interval) => {}
            }
        }
        debug!("Periodic pass loop stopped");
    }

    /// Sync every tracked repository sequentially.
    ///
    /// An empty tracked set is not an error; a failure to list it skips the pass.
    #[instrument(skip_all)]
    pub async fn run_pass(&self, shutdown: &CancellationToken) -> PassStats {
        let started = Instant::now();
        let mut stats = PassStats::default();

        let repositories = match self.store.list_tracked().await {
            Ok(repositories) => repositories,
            Err(err) if err.is_not_found() => {
                warn!("No tracked repositories; skipping pass");
                Vec::new()
            }
            Err(err) => {
                error!(error = %err, "Failed to list tracked repositories; skipping pass");
                stats.listing_failed = true;
                return stats;
            }
        };
        stats.repositories = repositories.len();

        for repo in &repositories {
            if shutdown.is_cancelled() {
                stats.cancelled = true;
                break;
            }
            match self.engine.run(repo, shutdown).await {
                Ok(_) => stats.synced += 1,
                Err(SyncError::Cancelled { .. }) => {
                    stats.cancelled = true;
                    break;
                }
                Err(_) => stats.failed += 1,
            }
        }
        stats.cancelled |= shutdown.is_cancelled();

        histogram!("repo_watch_pass_duration_ms").record(started.elapsed().as_secs_f64() * 1_000.0);
        info!(
            repositories = stats.repositories,
            synced = stats.synced,
            failed = stats.failed,
            cancelled = stats.cancelled,
            "Periodic pass finished"
        );
        stats
    }
}
