//! Connectors module
//!
//! - The `CommitSource` trait the sync engine reads through
//! - The GitHub REST implementation

pub mod github;
pub mod trait_;

pub use github::GitHubSource;
pub use trait_::{CommitRecord, CommitSource, RepositoryMetadata, SourceError};
