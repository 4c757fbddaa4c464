//! Voter Pulse client core
//!
//! Local-first preference capture for the voter pulse app:
//! - [`LocalPreferenceStore`]: optimistic, persisted, one record per office
//! - [`SyncOutbox`]: write-ahead queue with a single serialized delivery lane
//! - [`SessionResolver`]: bounded, memoized identity resolution with an
//!   offline fallback
//! - [`PulseClient`]: the facade UI code uses
//!
//! # Example
//!
//! ```rust,ignore
//! use pulse_client::{ClientConfig, FileStore, PulseClient};
//! use pulse_model::PreferenceDraft;
//! use pulse_remote::HttpTransport;
//! use std::sync::Arc;
//!
//! let transport = Arc::new(HttpTransport::new("http://127.0.0.1:8080")?);
//! let store = Arc::new(FileStore::open("./pulse-data")?);
//! let client = PulseClient::new(ClientConfig::new(), transport, store);
//!
//! let user = client.start().await;
//! let receipt = client.save(PreferenceDraft::new("pres", "p2")).await?;
//! assert!(receipt.preference.provisional);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod client;
pub mod config;
pub mod error;
pub mod outbox;
pub mod preferences;
pub mod session;
pub mod storage;
pub mod sync;

pub use client::{PulseClient, SaveReceipt};
pub use config::ClientConfig;
pub use error::{ClientError, StorageError};
pub use outbox::{Confirmation, Delivery, DrainReport, PreferenceSink, SyncOutbox};
pub use preferences::LocalPreferenceStore;
pub use session::SessionResolver;
pub use storage::{FileStore, KeyValueStore, MemoryStore, StorageKeys};
pub use sync::{Connectivity, SubmitOutcome, Synchronizer};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
