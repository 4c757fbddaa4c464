//! Voter Pulse remote access
//!
//! - [`TransportAdapter`]: bounded-timeout wrapper over any [`Transport`]
//! - [`HttpTransport`]: reqwest-backed production transport
//! - [`RemoteApi`]: typed calls for every service endpoint
//!
//! # Example
//!
//! ```rust,ignore
//! use pulse_remote::{HttpTransport, RemoteApi, TransportAdapter};
//! use std::{sync::Arc, time::Duration};
//!
//! let transport = HttpTransport::new("http://127.0.0.1:8080")?;
//! let api = RemoteApi::new(TransportAdapter::new(Arc::new(transport)), Duration::from_secs(5));
//! let offices = api.offices().await?;
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod api;
pub mod error;
pub mod http;
pub mod transport;

pub use api::{paths, RemoteApi};
pub use error::TransportError;
pub use http::HttpTransport;
pub use transport::{Method, Request, Response, Transport, TransportAdapter};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
