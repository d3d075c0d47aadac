//! In-memory [`RepoStore`] implementation for tests and local runs.
//!
//! Mirrors the database semantics: unique names, `(hash, repository)`
//! uniqueness for commits, `NotFound` on an empty tracked set, and the same
//! ordering and tie-breaks for listings.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{DbErr, RuntimeErr};
use uuid::Uuid;

use super::{LeaderboardEntry, RepoStore};
use crate::connectors::{CommitRecord, RepositoryMetadata};
use crate::error::RepositoryError;
use crate::models::{commit, to_db_time, tracked_repository};

/// In-memory store. Every trait call is counted, and the store can be switched
/// into an unavailable state that fails every call.
#[derive(Default)]
pub struct MemoryStore {
    repositories: RwLock<HashMap<Uuid, tracked_repository::Model>>,
    commits: RwLock<Vec<commit::Model>>,
    calls: AtomicUsize,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of trait calls served so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Make every subsequent call fail with a connection error (or recover).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn repository(&self, id: Uuid) -> Option<tracked_repository::Model> {
        self.read_repositories().get(&id).cloned()
    }

    pub fn repository_count(&self) -> usize {
        self.read_repositories().len()
    }

    pub fn commit_count(&self, repository_id: Uuid) -> usize {
        self.read_commits()
            .iter()
            .filter(|c| c.repository_id == repository_id)
            .count()
    }

    fn enter(&self) -> Result<(), RepositoryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RepositoryError::Database(DbErr::Conn(RuntimeErr::Internal(
                "memory store marked unavailable".to_string(),
            ))));
        }
        Ok(())
    }

    fn read_repositories(&self) -> RwLockReadGuard<'_, HashMap<Uuid, tracked_repository::Model>> {
        self.repositories.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_repositories(
        &self,
    ) -> RwLockWriteGuard<'_, HashMap<Uuid, tracked_repository::Model>> {
        self.repositories.write().unwrap_or_else(|e| e.into_inner())
    }

    fn read_commits(&self) -> RwLockReadGuard<'_, Vec<commit::Model>> {
        self.commits.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_commits(&self) -> RwLockWriteGuard<'_, Vec<commit::Model>> {
        self.commits.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl RepoStore for MemoryStore {
    async fn list_tracked(&self) -> Result<Vec<tracked_repository::Model>, RepositoryError> {
        self.enter()?;
        let mut rows: Vec<_> = self.read_repositories().values().cloned().collect();
        if rows.is_empty() {
            return Err(RepositoryError::not_found("repository", "*"));
        }
        rows.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.repository_name.cmp(&b.repository_name))
        });
        Ok(rows)
    }

    async fn get_by_name(&self, name: &str) -> Result<tracked_repository::Model, RepositoryError> {
        self.enter()?;
        self.read_repositories()
            .values()
            .find(|r| r.repository_name == name)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found("repository", name))
    }

    async fn create(&self, name: &str) -> Result<Uuid, RepositoryError> {
        self.enter()?;
        let mut repositories = self.write_repositories();
        if repositories.values().any(|r| r.repository_name == name) {
            return Err(RepositoryError::Conflict {
                entity: "repository",
                key: name.to_string(),
            });
        }

        let id = Uuid::new_v4();
        repositories.insert(
            id,
            tracked_repository::Model {
                id,
                repository_name: name.to_string(),
                description: None,
                url: None,
                language: None,
                forks_count: 0,
                stars_count: 0,
                open_issues_count: 0,
                watchers_count: 0,
                commit_last_pulled_at: None,
                created_at: to_db_time(Utc::now()),
                updated_at: None,
            },
        );
        Ok(id)
    }

    async fn replace_metadata(
        &self,
        id: Uuid,
        metadata: &RepositoryMetadata,
    ) -> Result<(), RepositoryError> {
        self.enter()?;
        let mut repositories = self.write_repositories();
        let repo = repositories
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::not_found("repository", id.to_string()))?;
        repo.description = metadata.description.clone();
        repo.url = metadata.html_url.clone();
        repo.language = metadata.language.clone();
        repo.forks_count = metadata.forks_count;
        repo.stars_count = metadata.stargazers_count;
        repo.open_issues_count = metadata.open_issues;
        repo.watchers_count = metadata.subscribers_count;
        repo.updated_at = Some(to_db_time(Utc::now()));
        Ok(())
    }

    async fn advance_high_water_mark(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        self.enter()?;
        let mut repositories = self.write_repositories();
        let repo = repositories
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::not_found("repository", id.to_string()))?;
        repo.commit_last_pulled_at = Some(to_db_time(at));
        repo.updated_at = Some(to_db_time(Utc::now()));
        Ok(())
    }

    async fn insert_commit_if_absent(
        &self,
        repository_id: Uuid,
        record: &CommitRecord,
    ) -> Result<bool, RepositoryError> {
        self.enter()?;
        let mut commits = self.write_commits();
        if commits
            .iter()
            .any(|c| c.repository_id == repository_id && c.commit_hash == record.sha)
        {
            return Ok(false);
        }
        commits.push(commit::Model {
            id: Uuid::new_v4(),
            repository_id,
            commit_hash: record.sha.clone(),
            message: record.message.clone(),
            author_name: record.author_name.clone(),
            author_email: record.author_email.clone(),
            committed_at: to_db_time(record.authored_at),
            url: record.url.clone(),
            created_at: to_db_time(Utc::now()),
        });
        Ok(true)
    }

    async fn list_commits(
        &self,
        repository_id: Uuid,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<commit::Model>, RepositoryError> {
        self.enter()?;
        let mut rows: Vec<_> = self
            .read_commits()
            .iter()
            .filter(|c| c.repository_id == repository_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            b.committed_at
                .cmp(&a.committed_at)
                .then_with(|| a.commit_hash.cmp(&b.commit_hash))
        });
        Ok(rows
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .collect())
    }

    async fn leaderboard(&self, limit: u64) -> Result<Vec<LeaderboardEntry>, RepositoryError> {
        self.enter()?;
        let mut counts: HashMap<String, i64> = HashMap::new();
        for c in self.read_commits().iter() {
            *counts.entry(c.author_name.clone()).or_default() += 1;
        }
        let mut entries: Vec<_> = counts
            .into_iter()
            .map(|(author_name, commit_count)| LeaderboardEntry {
                author_name,
                commit_count,
            })
            .collect();
        entries.sort_by(|a, b| {
            b.commit_count
                .cmp(&a.commit_count)
                .then_with(|| a.author_name.cmp(&b.author_name))
        });
        entries.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(entries)
    }
}
