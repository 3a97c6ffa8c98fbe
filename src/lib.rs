//! # svc-discovery
//!
//! Lifecycle management for a single, cancellable mDNS service discovery run.
//!
//! A [`ServiceDiscovery`] owns a resolution backend and at most one background
//! discovery run. It can advertise this host's own services, and search the
//! local network for instances of a named service, handing every instance that
//! resolves to a host to a caller-supplied callback.
//!
//! ## Features
//!
//! - One run at a time: starting a new run stops the previous one first
//! - Cooperative cancellation, checked between discovered records
//! - Bounded `stop`: runs that ignore the stop request are aborted after a
//!   grace period (5 seconds by default)
//! - Pluggable backends: real mDNS via `mdns-sd`, or an in-memory registry
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use svc_discovery::{backend::MdnsBackend, DiscoveryConfig, ServiceDiscovery};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let discovery = ServiceDiscovery::new(MdnsBackend::new());
//!     discovery.init().await?;
//!     discovery.set_hostname("my-node").await?;
//!
//!     let config = DiscoveryConfig::new("_http", "_tcp")
//!         .with_timeout(Duration::from_secs(3))
//!         .with_callback(|service| println!("Found {service}"));
//!     discovery.start(&config).await?;
//!
//!     tokio::time::sleep(Duration::from_secs(5)).await;
//!     discovery.deinit().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! Argument and state checks fail synchronously with
//! [`DiscoveryError::InvalidArgument`] or [`DiscoveryError::InvalidState`].
//! Backend failures are passed through as [`DiscoveryError::Backend`]. Failures
//! inside a background run are only logged.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod backend;
pub mod cancel;
pub mod config;
pub mod discovery;
pub mod error;
pub mod task;
pub mod types;

// Re-export main types for convenience
pub use backend::ResolutionBackend;
pub use config::{DiscoveryCallback, DiscoveryConfig, SubsystemSettings};
pub use discovery::{ServiceDiscovery, StopOutcome};
pub use error::{BackendError, DiscoveryError, Result};
pub use task::TaskOutcome;
pub use types::{DiscoveredRecord, DiscoveredService, TxtRecord};
