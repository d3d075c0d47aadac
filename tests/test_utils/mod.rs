//! Test utilities for database testing.
//!
//! In-memory SQLite databases with all migrations applied, plus small
//! fixture builders shared by the integration suites.

use anyhow::Result;
use chrono::{DateTime, Duration, TimeZone, Utc};
use migration::{Migrator, MigratorTrait};
use repostats::connectors::CommitRecord;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Statement};
use std::sync::Arc;

/// Sets up an in-memory SQLite database with all migrations applied.
///
/// # Returns
///
/// Returns a Result containing the database connection
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await?;

    Migrator::up(&db, None).await?;

    db.execute(Statement::from_string(
        db.get_database_backend(),
        "PRAGMA foreign_keys = ON".to_string(),
    ))
    .await?;

    Ok(db)
}

/// Sets up an in-memory SQLite database and returns it behind an Arc.
#[allow(dead_code)]
pub async fn setup_test_db_arc() -> Result<Arc<DatabaseConnection>> {
    Ok(Arc::new(setup_test_db().await?))
}

/// Fixed reference instant used by fixtures.
#[allow(dead_code)]
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
}

/// A commit authored `minutes_ago` minutes before [`base_time`].
#[allow(dead_code)]
pub fn commit_record(sha: &str, author: &str, minutes_ago: i64) -> CommitRecord {
    CommitRecord {
        sha: sha.to_string(),
        message: format!("commit {sha}"),
        author_name: author.to_string(),
        author_email: format!("{}@example.com", author.to_lowercase()),
        authored_at: base_time() - Duration::minutes(minutes_ago),
        url: format!("https://github.com/octo/cat/commit/{sha}"),
    }
}

/// GitHub API JSON for `count` commits numbered from `offset`, newest first.
#[allow(dead_code)]
pub fn github_commit_page(offset: usize, count: usize) -> serde_json::Value {
    let commits: Vec<_> = (offset..offset + count)
        .map(|n| {
            let date = base_time() - Duration::minutes(n as i64);
            serde_json::json!({
                "sha": format!("sha-{n:04}"),
                "html_url": format!("https://github.com/octo/cat/commit/{n}"),
                "commit": {
                    "message": format!("commit {n}"),
                    "author": {
                        "name": if n % 2 == 0 { "Mona" } else { "Hubot" },
                        "email": "dev@example.com",
                        "date": date.to_rfc3339(),
                    }
                }
            })
        })
        .collect();
    serde_json::Value::Array(commits)
}
