//! # Registration Gateway
//!
//! Resolves a user supplied `owner/name` to a tracked repository id, creating
//! the record on first sight and signalling the watcher to run a first sync.
//!
//! The signal queue is bounded. When it is full, [`Registrar::resolve`]
//! waits for the watcher to drain it; registrations are never dropped.

use std::fmt;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::repositories::RepoStore;

static REPO_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9_.-]+/[a-z0-9_.-]+$").expect("repository name pattern is valid")
});

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("invalid repository name '{0}': expected owner/name")]
    InvalidName(String),
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[source] RepositoryError),
}

/// Canonical `owner/name`, trimmed and lowercased.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoName(String);

impl RepoName {
    pub fn parse(raw: &str) -> Result<Self, RegistrationError> {
        let normalized = raw.trim().to_lowercase();
        let dot_segment = normalized.split('/').any(|segment| segment == "." || segment == "..");
        if dot_segment || !REPO_NAME.is_match(&normalized) {
            return Err(RegistrationError::InvalidName(raw.to_string()));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RepoName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Producer half of the registration queue.
#[derive(Debug, Clone)]
pub struct RegistrationSender(mpsc::Sender<RepoName>);

/// Consumer half of the registration queue, owned by the watcher.
#[derive(Debug)]
pub struct RegistrationReceiver(mpsc::Receiver<RepoName>);

impl RegistrationReceiver {
    pub async fn recv(&mut self) -> Option<RepoName> {
        self.0.recv().await
    }
}

/// Bounded queue carrying newly registered names to the watcher.
pub fn registration_channel(capacity: usize) -> (RegistrationSender, RegistrationReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (RegistrationSender(tx), RegistrationReceiver(rx))
}

pub struct Registrar {
    store: Arc<dyn RepoStore>,
    signals: RegistrationSender,
}

impl Registrar {
    pub fn new(store: Arc<dyn RepoStore>, signals: RegistrationSender) -> Self {
        Self { store, signals }
    }

    /// Returns the id for `raw`, creating and announcing it when new.
    ///
    /// Malformed names fail before any store access.
    pub async fn resolve(&self, raw: &str) -> Result<Uuid, RegistrationError> {
        let name = RepoName::parse(raw)?;

        match self.store.get_by_name(name.as_str()).await {
            Ok(existing) => return Ok(existing.id),
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(RegistrationError::StoreUnavailable(err)),
        }

        let id = match self.store.create(name.as_str()).await {
            Ok(id) => id,
            Err(RepositoryError::Conflict { .. }) => {
                // Lost a creation race; the winner announces it.
                debug!(repository = %name, "Repository created concurrently");
                return self
                    .store
                    .get_by_name(name.as_str())
                    .await
                    .map(|repo| repo.id)
                    .map_err(RegistrationError::StoreUnavailable);
            }
            Err(err) => return Err(RegistrationError::StoreUnavailable(err)),
        };

        info!(repository = %name, repository_id = %id, "Tracking new repository");
        if self.signals.0.send(name.clone()).await.is_err() {
            warn!(repository = %name, "Watcher is not listening; first sync deferred to the periodic pass");
        }
        Ok(id)
    }
}
