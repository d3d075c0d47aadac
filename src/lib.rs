//! # Repository Stats Library
//!
//! Watches a dynamic set of GitHub repositories, ingests their metadata and
//! commit history incrementally, and serves commit listings and a contributor
//! leaderboard.

pub mod backoff;
pub mod config;
pub mod connectors;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod registration;
pub mod repositories;
pub mod scheduler;
pub mod server;
pub mod service;
pub mod sync_engine;
pub mod telemetry;
pub use migration;
