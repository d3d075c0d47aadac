//! Read-facing operations consumed by the HTTP layer.
//!
//! Reads never wait for an external sync: a repository seen for the first
//! time is registered and answered with an empty list.

use std::sync::Arc;

use thiserror::Error;

use crate::error::{ApiError, RepositoryError, validation_error};
use crate::models::commit;
use crate::registration::{Registrar, RegistrationError};
use crate::repositories::{LeaderboardEntry, RepoStore};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Registration(#[from] RegistrationError),
    #[error(transparent)]
    Store(#[from] RepositoryError),
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Registration(RegistrationError::InvalidName(name)) => validation_error(
                "repository name must be of the form owner/name",
                serde_json::json!({ "repoName": name }),
            ),
            ServiceError::Registration(RegistrationError::StoreUnavailable(err))
            | ServiceError::Store(err) => err.into(),
        }
    }
}

pub struct StatsService {
    registrar: Registrar,
    store: Arc<dyn RepoStore>,
}

impl StatsService {
    pub fn new(registrar: Registrar, store: Arc<dyn RepoStore>) -> Self {
        Self { registrar, store }
    }

    /// Commits of `name`, newest first. Registers the repository when new.
    ///
    /// An empty result for a newly seen name means tracking has started and
    /// data is pending.
    pub async fn get_commits(
        &self,
        name: &str,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<commit::Model>, ServiceError> {
        let id = self.registrar.resolve(name).await?;
        Ok(self.store.list_commits(id, limit, offset).await?)
    }

    pub async fn get_leaderboard(&self, limit: u64) -> Result<Vec<LeaderboardEntry>, ServiceError> {
        Ok(self.store.leaderboard(limit).await?)
    }
}
