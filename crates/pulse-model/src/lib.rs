//! Voter Pulse domain model
//!
//! Shared types for both sides of the wire:
//! - [`User`] identities and the derived onboarding rule
//! - [`Office`] / [`Candidate`] reference data and scope visibility
//! - [`Preference`] records, drafts and pending [`OutboxItem`]s
//! - [`Aggregate`] tallies gated by the disclosure threshold
//!
//! # Example
//!
//! ```rust
//! use pulse_model::{Aggregate, DISCLOSURE_THRESHOLD};
//!
//! let gated = Aggregate::withheld("Governor", DISCLOSURE_THRESHOLD - 1);
//! assert!(!gated.allowed());
//! assert!(gated.data().is_none());
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod aggregate;
mod catalog;
mod error;
mod ids;
mod preference;
mod user;

pub use aggregate::{Aggregate, Pulse, PulseRecord, DISCLOSURE_THRESHOLD};
pub use catalog::{Candidate, Office, Scope};
pub use error::ModelError;
pub use ids::{CandidateId, OfficeId, PreferenceId, SessionId, UserId};
pub use preference::{OutboxItem, Preference, PreferenceDraft};
pub use user::{is_onboarded, LocationUpdate, SessionInit, User};

/// Name of the cookie carrying the anonymous session token
pub const SESSION_COOKIE: &str = "vb_session";

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
