//! # Sync Engine
//!
//! Synchronizes one tracked repository: refreshes its metadata, then ingests
//! commit pages from the high-water mark onwards. Rate limited fetches are
//! retried in place under a [`Backoff`]; every other failure ends the run.
//!
//! A run is abortable at every suspension point through the shared
//! [`CancellationToken`]. Commit inserts are individually idempotent, so an
//! aborted run resumes from the last persisted high-water mark next time.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use thiserror::Error;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::backoff::{Backoff, BackoffPolicy};
use crate::connectors::{CommitSource, SourceError};
use crate::error::RepositoryError;
use crate::models::tracked_repository;
use crate::repositories::RepoStore;

/// Step of a sync run, carried on errors and log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Metadata,
    Commits,
}

impl SyncPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncPhase::Metadata => "metadata",
            SyncPhase::Commits => "commits",
        }
    }
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal failure of a single run.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("source unavailable during {phase}: {source}")]
    SourceUnavailable {
        phase: SyncPhase,
        #[source]
        source: SourceError,
    },
    #[error("store unavailable during {phase}: {source}")]
    StoreUnavailable {
        phase: SyncPhase,
        #[source]
        source: RepositoryError,
    },
    #[error("sync cancelled during {phase}")]
    Cancelled { phase: SyncPhase },
}

impl SyncError {
    pub fn phase(&self) -> SyncPhase {
        match self {
            SyncError::SourceUnavailable { phase, .. }
            | SyncError::StoreUnavailable { phase, .. }
            | SyncError::Cancelled { phase } => *phase,
        }
    }

    fn outcome(&self) -> &'static str {
        match self {
            SyncError::SourceUnavailable { .. } => "source_unavailable",
            SyncError::StoreUnavailable { .. } => "store_unavailable",
            SyncError::Cancelled { .. } => "cancelled",
        }
    }
}

/// Tunables for a run.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub page_size: u32,
    /// `since` used only while a repository has no high-water mark.
    pub default_since: Option<DateTime<Utc>>,
    pub backoff: BackoffPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_size: 100,
            default_since: None,
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Summary of a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub pages_fetched: u32,
    pub commits_seen: usize,
    pub commits_inserted: usize,
    pub rate_limited: u32,
    pub high_water_mark: Option<DateTime<Utc>>,
}

pub struct SyncEngine {
    store: Arc<dyn RepoStore>,
    source: Arc<dyn CommitSource>,
    config: SyncConfig,
}

impl SyncEngine {
    pub fn new(store: Arc<dyn RepoStore>, source: Arc<dyn CommitSource>, config: SyncConfig) -> Self {
        Self {
            store,
            source,
            config,
        }
    }

    /// Run a full metadata + commit sync for `repo`.
    ///
    /// Errors are logged here with repository and phase context before being returned.
    #[instrument(skip_all, fields(repository_id = %repo.id, repository = %repo.repository_name))]
    pub async fn run(
        &self,
        repo: &tracked_repository::Model,
        shutdown: &CancellationToken,
    ) -> Result<SyncReport, SyncError> {
        let started = Instant::now();
        let result = self.sync(repo, shutdown).await;

        histogram!("repo_sync_duration_ms").record(started.elapsed().as_secs_f64() * 1000.0);
        match &result {
            Ok(report) => {
                counter!("repo_sync_runs_total", "outcome" => "success").increment(1);
                counter!("repo_sync_commits_inserted_total").increment(report.commits_inserted as u64);
                info!(
                    pages = report.pages_fetched,
                    seen = report.commits_seen,
                    inserted = report.commits_inserted,
                    rate_limited = report.rate_limited,
                    "Repository sync completed"
                );
            }
            Err(SyncError::Cancelled { phase }) => {
                counter!("repo_sync_runs_total", "outcome" => "cancelled").increment(1);
                info!(phase = %phase, "Repository sync cancelled");
            }
            Err(err) => {
                counter!("repo_sync_runs_total", "outcome" => err.outcome()).increment(1);
                error!(phase = %err.phase(), error = %err, "Repository sync failed");
            }
        }
        result
    }

    async fn sync(
        &self,
        repo: &tracked_repository::Model,
        shutdown: &CancellationToken,
    ) -> Result<SyncReport, SyncError> {
        let mut report = SyncReport::default();
        self.sync_metadata(repo, shutdown, &mut report).await?;
        self.sync_commits(repo, shutdown, &mut report).await?;
        Ok(report)
    }

    async fn sync_metadata(
        &self,
        repo: &tracked_repository::Model,
        shutdown: &CancellationToken,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        let phase = SyncPhase::Metadata;
        let name = repo.repository_name.as_str();
        let mut backoff = self.config.backoff.start();

        let metadata = self
            .fetch_with_backoff(phase, None, &mut backoff, shutdown, || {
                self.source.fetch_metadata(name)
            })
            .await?;
        report.rate_limited += backoff.attempts();

        guard(shutdown, phase, self.store.replace_metadata(repo.id, &metadata)).await?;
        debug!(
            stars = metadata.stargazers_count,
            forks = metadata.forks_count,
            "Repository metadata replaced"
        );
        Ok(())
    }

    async fn sync_commits(
        &self,
        repo: &tracked_repository::Model,
        shutdown: &CancellationToken,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        let phase = SyncPhase::Commits;
        let name = repo.repository_name.as_str();
        let page_size = self.config.page_size;
        let since = repo.high_water_mark().or(self.config.default_since);
        // One backoff for the whole pagination: a rate limit on page N keeps growing
        // the delay seeded by earlier pages of the same run.
        let mut backoff = self.config.backoff.start();

        debug!(since = ?since, page_size, "Starting commit ingestion");

        let mut page = 1u32;
        loop {
            let commits = self
                .fetch_with_backoff(phase, Some(page), &mut backoff, shutdown, || {
                    self.source.fetch_commit_page(name, page, page_size, since)
                })
                .await?;
            report.pages_fetched += 1;
            report.commits_seen += commits.len();

            for commit in &commits {
                if guard(shutdown, phase, self.store.insert_commit_if_absent(repo.id, commit))
                    .await?
                {
                    report.commits_inserted += 1;
                }
            }

            // Pages arrive newest first, so the last element is the oldest of the batch.
            if let Some(last) = commits.last() {
                guard(
                    shutdown,
                    phase,
                    self.store.advance_high_water_mark(repo.id, last.authored_at),
                )
                .await?;
                report.high_water_mark = Some(last.authored_at);
            }

            if commits.len() < page_size as usize {
                break;
            }
            page += 1;
        }

        report.rate_limited += backoff.attempts();
        Ok(())
    }

    /// Retry `fetch` for as long as it is rate limited, sleeping per `backoff`.
    async fn fetch_with_backoff<T, F, Fut>(
        &self,
        phase: SyncPhase,
        page: Option<u32>,
        backoff: &mut Backoff,
        shutdown: &CancellationToken,
        mut fetch: F,
    ) -> Result<T, SyncError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SourceError>>,
    {
        loop {
            let result = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Err(SyncError::Cancelled { phase }),
                result = fetch() => result,
            };

            match result {
                Ok(value) => return Ok(value),
                Err(err) if err.is_rate_limited() => {
                    let delay = backoff.next_delay();
                    counter!("repo_sync_rate_limited_total", "phase" => phase.as_str())
                        .increment(1);
                    warn!(
                        phase = %phase,
                        page,
                        attempt = backoff.attempts(),
                        backoff_seconds = delay.as_secs(),
                        error = %err,
                        "Rate limit reached, retrying after backoff"
                    );
                    tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => return Err(SyncError::Cancelled { phase }),
                        _ = sleep(delay) => {}
                    }
                }
                Err(source) => return Err(SyncError::SourceUnavailable { phase, source }),
            }
        }
    }
}

/// Await a store call unless the run is cancelled first.
async fn guard<T, Fut>(
    shutdown: &CancellationToken,
    phase: SyncPhase,
    op: Fut,
) -> Result<T, SyncError>
where
    Fut: Future<Output = Result<T, RepositoryError>>,
{
    tokio::select! {
        biased;
        _ = shutdown.cancelled() => Err(SyncError::Cancelled { phase }),
        result = op => result.map_err(|source| SyncError::StoreUnavailable { phase, source }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::{CommitRecord, RepositoryMetadata};
    use crate::repositories::MemoryStore;
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Clone)]
    enum Step<T> {
        Ok(T),
        RateLimited,
        Fail,
    }

    impl<T> Step<T> {
        fn into_result(self) -> Result<T, SourceError> {
            match self {
                Step::Ok(value) => Ok(value),
                Step::RateLimited => Err(SourceError::RateLimited {
                    retry_after_secs: None,
                }),
                Step::Fail => Err(SourceError::Http {
                    status: 500,
                    body: "boom".to_string(),
                }),
            }
        }
    }

    /// Replays scripted responses; when a script runs dry the last step repeats.
    #[derive(Default)]
    struct ScriptedSource {
        metadata: Mutex<VecDeque<Step<RepositoryMetadata>>>,
        pages: Mutex<HashMap<u32, VecDeque<Step<Vec<CommitRecord>>>>>,
        page_calls: Mutex<Vec<(u32, Option<DateTime<Utc>>)>>,
        metadata_calls: Mutex<Vec<Instant>>,
    }

    impl ScriptedSource {
        fn with_metadata(self, steps: Vec<Step<RepositoryMetadata>>) -> Self {
            *self.metadata.lock().unwrap() = steps.into();
            self
        }

        fn with_page(self, page: u32, steps: Vec<Step<Vec<CommitRecord>>>) -> Self {
            self.pages.lock().unwrap().insert(page, steps.into());
            self
        }

        fn requested_pages(&self) -> Vec<u32> {
            self.page_calls.lock().unwrap().iter().map(|(p, _)| *p).collect()
        }

        fn since_values(&self) -> Vec<Option<DateTime<Utc>>> {
            self.page_calls.lock().unwrap().iter().map(|(_, s)| *s).collect()
        }
    }

    fn pop<T: Clone>(queue: &mut VecDeque<T>) -> Option<T> {
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }

    #[async_trait]
    impl CommitSource for ScriptedSource {
        async fn fetch_metadata(&self, _repository: &str) -> Result<RepositoryMetadata, SourceError> {
            self.metadata_calls.lock().unwrap().push(Instant::now());
            let step = pop(&mut self.metadata.lock().unwrap())
                .unwrap_or(Step::Ok(RepositoryMetadata::default()));
            step.into_result()
        }

        async fn fetch_commit_page(
            &self,
            _repository: &str,
            page: u32,
            _per_page: u32,
            since: Option<DateTime<Utc>>,
        ) -> Result<Vec<CommitRecord>, SourceError> {
            self.page_calls.lock().unwrap().push((page, since));
            let step = self
                .pages
                .lock()
                .unwrap()
                .get_mut(&page)
                .and_then(pop)
                .unwrap_or(Step::Ok(Vec::new()));
            step.into_result()
        }
    }

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    /// `count` commits numbered from `offset`, newest first.
    fn page(offset: usize, count: usize) -> Vec<CommitRecord> {
        (0..count)
            .map(|i| {
                let n = offset + i;
                CommitRecord {
                    sha: format!("sha-{n:04}"),
                    message: format!("commit {n}"),
                    author_name: "Mona".to_string(),
                    author_email: "mona@example.com".to_string(),
                    authored_at: base_time() - ChronoDuration::minutes(n as i64),
                    url: format!("https://github.com/octo/cat/commit/{n}"),
                }
            })
            .collect()
    }

    fn engine(store: Arc<MemoryStore>, source: Arc<ScriptedSource>) -> SyncEngine {
        SyncEngine::new(store, source, SyncConfig::default())
    }

    async fn tracked(store: &MemoryStore, name: &str) -> tracked_repository::Model {
        let id = store.create(name).await.unwrap();
        store.repository(id).unwrap()
    }

    #[tokio::test]
    async fn ingests_all_pages_and_marks_oldest_commit() {
        let store = Arc::new(MemoryStore::new());
        let source = Arc::new(
            ScriptedSource::default()
                .with_page(1, vec![Step::Ok(page(0, 100))])
                .with_page(2, vec![Step::Ok(page(100, 100))])
                .with_page(3, vec![Step::Ok(page(200, 37))]),
        );
        let repo = tracked(&store, "octo/cat").await;

        let report = engine(store.clone(), source.clone())
            .run(&repo, &CancellationToken::new())
            .await
            .unwrap();

        let oldest = base_time() - ChronoDuration::minutes(236);
        assert_eq!(report.commits_inserted, 237);
        assert_eq!(report.high_water_mark, Some(oldest));
        assert_eq!(store.commit_count(repo.id), 237);
        assert_eq!(
            store.repository(repo.id).unwrap().high_water_mark(),
            Some(oldest)
        );
        assert_eq!(source.requested_pages(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn rerun_is_idempotent_and_uses_high_water_mark() {
        let store = Arc::new(MemoryStore::new());
        let source = Arc::new(ScriptedSource::default().with_page(1, vec![Step::Ok(page(0, 12))]));
        let repo = tracked(&store, "octo/cat").await;
        let engine = engine(store.clone(), source.clone());

        engine.run(&repo, &CancellationToken::new()).await.unwrap();
        let refreshed = store.repository(repo.id).unwrap();
        let second = engine.run(&refreshed, &CancellationToken::new()).await.unwrap();

        assert_eq!(second.commits_seen, 12);
        assert_eq!(second.commits_inserted, 0);
        assert_eq!(store.commit_count(repo.id), 12);
        let since = source.since_values();
        assert_eq!(since[0], None);
        assert_eq!(since[1], Some(base_time() - ChronoDuration::minutes(11)));
    }

    #[tokio::test]
    async fn default_since_applies_only_before_first_mark() {
        let cutoff = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let store = Arc::new(MemoryStore::new());
        let source = Arc::new(ScriptedSource::default().with_page(1, vec![Step::Ok(page(0, 3))]));
        let repo = tracked(&store, "octo/cat").await;
        let engine = SyncEngine::new(
            store.clone(),
            source.clone(),
            SyncConfig {
                default_since: Some(cutoff),
                ..SyncConfig::default()
            },
        );

        engine.run(&repo, &CancellationToken::new()).await.unwrap();
        let refreshed = store.repository(repo.id).unwrap();
        engine.run(&refreshed, &CancellationToken::new()).await.unwrap();

        assert_eq!(
            source.since_values(),
            vec![Some(cutoff), Some(base_time() - ChronoDuration::minutes(2))]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn metadata_backoff_doubles_from_seed() {
        let store = Arc::new(MemoryStore::new());
        let source = Arc::new(ScriptedSource::default().with_metadata(vec![
            Step::RateLimited,
            Step::RateLimited,
            Step::RateLimited,
            Step::Ok(RepositoryMetadata {
                stargazers_count: 9,
                ..RepositoryMetadata::default()
            }),
        ]));
        let repo = tracked(&store, "octo/cat").await;

        let report = engine(store.clone(), source.clone())
            .run(&repo, &CancellationToken::new())
            .await
            .unwrap();

        let calls = source.metadata_calls.lock().unwrap().clone();
        let gaps: Vec<u64> = calls.windows(2).map(|w| (w[1] - w[0]).as_secs()).collect();
        assert_eq!(gaps, vec![60, 120, 240]);
        assert_eq!(report.rate_limited, 3);
        assert_eq!(store.repository(repo.id).unwrap().stars_count, 9);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_page_is_retried_in_place() {
        let store = Arc::new(MemoryStore::new());
        let source = Arc::new(
            ScriptedSource::default()
                .with_page(1, vec![Step::Ok(page(0, 100))])
                .with_page(2, vec![Step::RateLimited, Step::Ok(page(100, 5))]),
        );
        let repo = tracked(&store, "octo/cat").await;

        let report = engine(store.clone(), source.clone())
            .run(&repo, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(source.requested_pages(), vec![1, 2, 2]);
        assert_eq!(report.commits_inserted, 105);
        assert_eq!(report.rate_limited, 1);
    }

    #[tokio::test]
    async fn metadata_failure_leaves_store_untouched() {
        let store = Arc::new(MemoryStore::new());
        let source = Arc::new(ScriptedSource::default().with_metadata(vec![Step::Fail]));
        let repo = tracked(&store, "octo/cat").await;
        let calls_before = store.calls();

        let err = engine(store.clone(), source.clone())
            .run(&repo, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SyncError::SourceUnavailable {
                phase: SyncPhase::Metadata,
                ..
            }
        ));
        assert_eq!(store.calls(), calls_before);
        assert!(source.requested_pages().is_empty());
    }

    #[tokio::test]
    async fn page_failure_keeps_earlier_pages() {
        let store = Arc::new(MemoryStore::new());
        let source = Arc::new(
            ScriptedSource::default()
                .with_page(1, vec![Step::Ok(page(0, 100))])
                .with_page(2, vec![Step::Fail]),
        );
        let repo = tracked(&store, "octo/cat").await;

        let err = engine(store.clone(), source.clone())
            .run(&repo, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.phase(), SyncPhase::Commits);
        assert_eq!(store.commit_count(repo.id), 100);
        assert_eq!(
            store.repository(repo.id).unwrap().high_water_mark(),
            Some(base_time() - ChronoDuration::minutes(99))
        );
    }

    #[tokio::test]
    async fn empty_history_is_not_an_error() {
        let store = Arc::new(MemoryStore::new());
        let source = Arc::new(ScriptedSource::default());
        let repo = tracked(&store, "octo/empty").await;

        let report = engine(store.clone(), source.clone())
            .run(&repo, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.pages_fetched, 1);
        assert_eq!(report.high_water_mark, None);
        assert!(store.repository(repo.id).unwrap().high_water_mark().is_none());
    }

    #[tokio::test]
    async fn store_failure_is_reported_with_phase() {
        let store = Arc::new(MemoryStore::new());
        let source = Arc::new(ScriptedSource::default());
        let repo = tracked(&store, "octo/cat").await;
        store.set_unavailable(true);

        let err = engine(store.clone(), source)
            .run(&repo, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SyncError::StoreUnavailable {
                phase: SyncPhase::Metadata,
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_backoff_stops_the_run() {
        let store = Arc::new(MemoryStore::new());
        let source = Arc::new(
            ScriptedSource::default()
                .with_page(1, vec![Step::Ok(page(0, 100))])
                .with_page(2, vec![Step::RateLimited]),
        );
        let repo = tracked(&store, "octo/cat").await;
        let shutdown = CancellationToken::new();

        let canceller = shutdown.clone();
        tokio::spawn(async move {
            sleep(Duration::from_secs(30)).await;
            canceller.cancel();
        });

        let started = Instant::now();
        let err = engine(store.clone(), source.clone())
            .run(&repo, &shutdown)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SyncError::Cancelled {
                phase: SyncPhase::Commits
            }
        ));
        assert!(started.elapsed() < Duration::from_secs(60));
        assert_eq!(store.commit_count(repo.id), 100);
        assert_eq!(source.requested_pages(), vec![1, 2]);
    }
}
