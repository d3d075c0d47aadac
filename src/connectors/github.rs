//! GitHub REST commit source
//!
//! Reads repository metadata from `GET /repos/{owner}/{name}` and commit pages
//! from `GET /repos/{owner}/{name}/commits`. Requests are unauthenticated.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use super::trait_::{CommitRecord, CommitSource, RepositoryMetadata, SourceError};
use crate::config::GitHubConfig;

const ACCEPT_HEADER: &str = "application/vnd.github.v3+json";

#[derive(Debug, Deserialize)]
struct GitHubCommit {
    sha: String,
    commit: GitHubCommitDetails,
    #[serde(default)]
    html_url: String,
}

#[derive(Debug, Deserialize)]
struct GitHubCommitDetails {
    #[serde(default)]
    message: String,
    author: GitHubCommitAuthor,
}

#[derive(Debug, Deserialize)]
struct GitHubCommitAuthor {
    #[serde(default)]
    name: String,
    #[serde(default)]
    email: String,
    date: DateTime<Utc>,
}

impl From<GitHubCommit> for CommitRecord {
    fn from(raw: GitHubCommit) -> Self {
        Self {
            sha: raw.sha,
            message: raw.commit.message,
            author_name: raw.commit.author.name,
            author_email: raw.commit.author.email,
            authored_at: raw.commit.author.date,
            url: raw.html_url,
        }
    }
}

/// GitHub API client implementing [`CommitSource`].
#[derive(Clone)]
pub struct GitHubSource {
    client: reqwest::Client,
    api_base: String,
    user_agent: String,
}

impl GitHubSource {
    /// Build a client from configuration. The underlying connection pool uses reqwest defaults.
    pub fn new(config: &GitHubConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            user_agent: config.user_agent.clone(),
        })
    }

    /// `{api_base}/repos/{owner}/{name}/{tail..}` with every segment percent-encoded.
    fn repo_url(&self, repository: &str, tail: &[&str]) -> Result<Url, SourceError> {
        let (owner, name) = repository
            .split_once('/')
            .ok_or_else(|| SourceError::Network(format!("invalid repository name '{repository}'")))?;
        let mut url = Url::parse(&self.api_base)
            .map_err(|e| SourceError::Network(format!("invalid api base: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| SourceError::Network(format!("api base cannot carry a path: {}", self.api_base)))?
            .pop_if_empty()
            .extend(["repos", owner, name])
            .extend(tail);
        Ok(url)
    }

    async fn get(&self, url: Url) -> Result<Response, SourceError> {
        let response = self
            .client
            .get(url)
            .header("User-Agent", &self.user_agent)
            .header("Accept", ACCEPT_HEADER)
            .send()
            .await
            .map_err(|e| SourceError::Network(e.to_string()))?;

        classify(response).await
    }
}

/// Splits responses into success, rate limited, and every other failure.
///
/// GitHub reports primary rate limits as 403 and secondary limits as 429.
async fn classify(response: Response) -> Result<Response, SourceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::FORBIDDEN || status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after_secs = response
            .headers()
            .get("Retry-After")
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok());
        warn!(
            status = status.as_u16(),
            retry_after_secs, "Rate limited by GitHub API"
        );
        return Err(SourceError::RateLimited { retry_after_secs });
    }

    let body = response.text().await.unwrap_or_default();
    Err(SourceError::Http {
        status: status.as_u16(),
        body,
    })
}

async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, SourceError> {
    let bytes = response
        .bytes()
        .await
        .map_err(|e| SourceError::Network(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| SourceError::Decode(e.to_string()))
}

#[async_trait]
impl CommitSource for GitHubSource {
    async fn fetch_metadata(&self, repository: &str) -> Result<RepositoryMetadata, SourceError> {
        let url = self.repo_url(repository, &[])?;
        debug!(repository, "Fetching repository metadata");
        let response = self.get(url).await?;
        decode(response).await
    }

    async fn fetch_commit_page(
        &self,
        repository: &str,
        page: u32,
        per_page: u32,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<CommitRecord>, SourceError> {
        let mut url = self.repo_url(repository, &["commits"])?;
        url.query_pairs_mut()
            .append_pair("page", &page.to_string())
            .append_pair("per_page", &per_page.to_string());
        if let Some(since) = since {
            url.query_pairs_mut()
                .append_pair("since", &since.to_rfc3339_opts(SecondsFormat::Secs, true));
        }

        debug!(repository, page, per_page, "Fetching commit page");
        let response = self.get(url).await?;
        let commits: Vec<GitHubCommit> = decode(response).await?;
        Ok(commits.into_iter().map(CommitRecord::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn source_for(server: &MockServer) -> GitHubSource {
        GitHubSource::new(&GitHubConfig {
            api_base: server.uri(),
            user_agent: "repostats-test".to_string(),
            timeout_seconds: 5,
        })
        .expect("client builds")
    }

    fn commit_json(sha: &str, date: &str) -> serde_json::Value {
        json!({
            "sha": sha,
            "html_url": format!("https://github.com/octo/cat/commit/{sha}"),
            "commit": {
                "message": format!("change {sha}"),
                "author": {"name": "Mona", "email": "mona@example.com", "date": date}
            }
        })
    }

    #[test]
    fn test_repo_url_encodes_name_segments() {
        let source = GitHubSource::new(&GitHubConfig {
            api_base: "https://ghe.example.com/api/v3/".to_string(),
            user_agent: "repostats-test".to_string(),
            timeout_seconds: 5,
        })
        .expect("client builds");

        let url = source.repo_url("octo/cat", &["commits"]).unwrap();
        assert_eq!(url.as_str(), "https://ghe.example.com/api/v3/repos/octo/cat/commits");

        let url = source.repo_url("octo/cat#frag", &["commits"]).unwrap();
        assert_eq!(url.path(), "/api/v3/repos/octo/cat%23frag/commits");
        assert!(url.fragment().is_none());

        let url = source.repo_url("octo/cat?x=1", &[]).unwrap();
        assert_eq!(url.path(), "/api/v3/repos/octo/cat%3Fx=1");
        assert!(url.query().is_none());

        let url = source.repo_url("octo/cat/../..", &[]).unwrap();
        assert!(url.path().starts_with("/api/v3/repos/octo/"));

        assert!(source.repo_url("octocat", &[]).is_err());
    }

    #[tokio::test]
    async fn test_fetch_metadata_maps_fields() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/octo/cat"))
            .and(header("User-Agent", "repostats-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "description": "meow",
                "html_url": "https://github.com/octo/cat",
                "language": "Rust",
                "forks_count": 3,
                "stargazers_count": 42,
                "open_issues": 7,
                "subscribers_count": 5,
                "unrelated": true
            })))
            .mount(&server)
            .await;

        let meta = source_for(&server).fetch_metadata("octo/cat").await.unwrap();
        assert_eq!(meta.description.as_deref(), Some("meow"));
        assert_eq!(meta.language.as_deref(), Some("Rust"));
        assert_eq!(meta.stargazers_count, 42);
        assert_eq!(meta.open_issues, 7);
        assert_eq!(meta.subscribers_count, 5);
    }

    #[tokio::test]
    async fn test_fetch_commit_page_sends_pagination_and_since() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/octo/cat/commits"))
            .and(query_param("page", "2"))
            .and(query_param("per_page", "100"))
            .and(query_param("since", "2024-01-01T00:00:00Z"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                commit_json("bbb", "2024-02-02T10:00:00Z"),
                commit_json("aaa", "2024-02-01T10:00:00Z"),
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let since = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let commits = source_for(&server)
            .fetch_commit_page("octo/cat", 2, 100, Some(since))
            .await
            .unwrap();

        assert_eq!(commits.len(), 2);
        assert_eq!(commits[0].sha, "bbb");
        assert_eq!(commits[1].author_email, "mona@example.com");
        assert_eq!(
            commits[1].authored_at,
            Utc.with_ymd_and_hms(2024, 2, 1, 10, 0, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn test_rate_limit_statuses_are_classified() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/octo/forbidden"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/octo/secondary"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "30"))
            .mount(&server)
            .await;

        let source = source_for(&server);
        let forbidden = source.fetch_metadata("octo/forbidden").await.unwrap_err();
        assert!(forbidden.is_rate_limited());

        match source.fetch_metadata("octo/secondary").await.unwrap_err() {
            SourceError::RateLimited { retry_after_secs } => assert_eq!(retry_after_secs, Some(30)),
            other => panic!("expected rate limit, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_other_failures_are_not_rate_limits() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/octo/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_string("Not Found"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/octo/garbled/commits"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{not json"))
            .mount(&server)
            .await;

        let source = source_for(&server);
        match source.fetch_metadata("octo/missing").await.unwrap_err() {
            SourceError::Http { status, .. } => assert_eq!(status, 404),
            other => panic!("expected http error, got {other:?}"),
        }

        let decode_err = source
            .fetch_commit_page("octo/garbled", 1, 100, None)
            .await
            .unwrap_err();
        assert!(matches!(decode_err, SourceError::Decode(_)));
    }
}
