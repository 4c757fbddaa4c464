//! Voter Pulse service
//!
//! The system of record and the k-anonymity aggregation engine:
//! - Anonymous session issuance and profile updates
//! - Office/candidate catalog with scope filtering
//! - Preference upserts keyed on `(user, office)`
//! - Per-state aggregates, withheld below the disclosure threshold
//!
//! # Example
//!
//! ```rust,ignore
//! use pulse_server::{build_service, routes, ServerConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ServerConfig::new().with_threshold(30);
//! let service = build_service(&config).await?;
//! warp::serve(routes::routes(service)).run(config.bind).await;
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod aggregate;
pub mod config;
pub mod error;
pub mod repository;
pub mod routes;
pub mod seed;
pub mod service;

pub use aggregate::AggregationEngine;
pub use config::ServerConfig;
pub use error::ServerError;
pub use repository::{MemoryRepository, PulseRepository};
pub use service::{CandidateQuery, PulseService, SessionGrant};

use std::sync::Arc;

/// Build a service over an in-memory repository, seeding the catalog when
/// configured
///
/// # Errors
/// `Config` for an invalid configuration, or a seeding failure
pub async fn build_service(config: &ServerConfig) -> Result<Arc<PulseService>, ServerError> {
    config.validate()?;
    let repo = Arc::new(MemoryRepository::new());
    if config.seed_catalog {
        seed::seed_catalog(&*repo).await?;
    }
    Ok(Arc::new(PulseService::new(repo, config.disclosure_threshold)))
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
