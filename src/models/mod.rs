//! # Data Models
//!
//! SeaORM entities for tracked repositories and their commits, plus the small
//! service info payload returned by the root endpoint.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod commit;
pub mod tracked_repository;

pub use commit::Entity as Commit;
pub use tracked_repository::Entity as TrackedRepository;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "repostats".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Convert a UTC timestamp into the offset-carrying form stored by SeaORM.
pub fn to_db_time(dt: DateTime<Utc>) -> DateTime<FixedOffset> {
    dt.fixed_offset()
}
