//! # release-mirror
//!
//! Keep a local mirror of a repository's releases and their assets up to date.
//!
//! ## Design Philosophy
//!
//! release-mirror is designed to be:
//! - **Idempotent** - A second run against an unchanged remote downloads nothing
//! - **Resumable** - An interrupted run leaves complete files or none, never partial ones
//! - **Patient** - Rate limits and flaky gateways are waited out with exponential backoff
//! - **Sequential** - One request at a time, in a deterministic order
//!
//! ## Quick Start
//!
//! ```no_run
//! use release_mirror::{ApiConfig, Config, Mirror, RepositoryId};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config {
//!         output_dir: "mirror".into(),
//!         api: ApiConfig::default().with_token(ApiConfig::token_from_env()),
//!         ..Default::default()
//!     };
//!
//!     let mirror = Mirror::new(config)?;
//!     let repositories: Vec<RepositoryId> = vec!["acme/widgets".parse()?];
//!
//!     for outcome in mirror.sync_all(&repositories).await {
//!         println!("{}: {:?}", outcome.repository, outcome.result);
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Local layout
//!
//! ```text
//! <output>/<owner>/<name>/<tag>/_release.json
//! <output>/<owner>/<name>/<tag>/_description.md
//! <output>/<owner>/<name>/<tag>/<asset name>
//! <output>/<owner>/<name>/<tag>/<source archive name>   (optional)
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// HTTP client for the release API
pub mod client;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Streaming downloads with atomic publication
pub mod fetcher;
/// Local artifact comparison
pub mod identity;
/// Sync driver
pub mod mirror;
/// Cursor-following pagination
pub mod pagination;
/// Retry logic with exponential backoff
pub mod retry;
/// Core types
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use client::{Accept, ApiClient};
pub use config::{ApiConfig, Config, RetryConfig, UnsupportedDigestPolicy};
pub use error::{Error, Result};
pub use fetcher::Fetcher;
pub use identity::Identity;
pub use mirror::{Mirror, RepositoryOutcome};
pub use types::{Asset, AssetDigest, DigestAlgorithm, Release, RepositoryId, SyncReport};
