//! Configuration types for a discovery run

use crate::error::{require_non_empty, DiscoveryError, Result};
use crate::types::DiscoveredService;
use std::{fmt, sync::Arc, time::Duration};

pub mod env;

pub use env::SubsystemSettings;

/// Callback invoked once per discovered service
///
/// Whatever context the caller needs travels inside the closure.
pub type DiscoveryCallback = Arc<dyn Fn(&DiscoveredService) + Send + Sync>;

/// Default query timeout for a discovery run, in milliseconds
pub const DEFAULT_DISCOVERY_TIMEOUT_MS: u64 = 3000;

/// Default query timeout for a discovery run
pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_millis(DEFAULT_DISCOVERY_TIMEOUT_MS);

/// Configuration for a single discovery run
///
/// [`ServiceDiscovery::start`](crate::ServiceDiscovery::start) takes its own
/// copy, so the caller may drop or change this value while the run is active.
#[derive(Clone)]
pub struct DiscoveryConfig {
    /// Service type, e.g. "_http"
    pub service_type: String,
    /// Protocol, "_tcp" or "_udp"
    pub protocol: String,
    /// Upper bound on the backend query
    pub timeout: Duration,
    /// Called for every service that resolves to a host
    pub callback: Option<DiscoveryCallback>,
}

impl DiscoveryConfig {
    /// Create a configuration for `service_type`/`protocol` with the default timeout
    pub fn new(service_type: impl Into<String>, protocol: impl Into<String>) -> Self {
        Self {
            service_type: service_type.into(),
            protocol: protocol.into(),
            timeout: DEFAULT_DISCOVERY_TIMEOUT,
            callback: None,
        }
    }

    /// Set the query timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the discovery callback
    pub fn with_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&DiscoveredService) + Send + Sync + 'static,
    {
        self.callback = Some(Arc::new(callback));
        self
    }

    /// Remove the discovery callback
    pub fn without_callback(mut self) -> Self {
        self.callback = None;
        self
    }

    /// Check the required fields, reporting the first one that is missing
    ///
    /// Fields are checked in the order service type, protocol, callback.
    pub fn validate(&self) -> Result<()> {
        require_non_empty("service_type", &self.service_type)?;
        require_non_empty("protocol", &self.protocol)?;
        if self.callback.is_none() {
            return Err(DiscoveryError::invalid_argument(
                "callback",
                "a discovery callback is required",
            ));
        }
        Ok(())
    }

    /// Conventional `_service._proto` form
    pub fn full_service_type(&self) -> String {
        format!("{}.{}", self.service_type, self.protocol)
    }
}

impl fmt::Debug for DiscoveryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscoveryConfig")
            .field("service_type", &self.service_type)
            .field("protocol", &self.protocol)
            .field("timeout", &self.timeout)
            .field("callback", &self.callback.as_ref().map(|_| "Fn(&DiscoveredService)"))
            .finish()
    }
}
