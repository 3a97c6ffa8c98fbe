//! Name-resolution backends the discovery controller drives

use crate::{
    error::BackendError,
    types::{DiscoveredRecord, TxtRecord},
};
use async_trait::async_trait;
use std::time::Duration;

#[cfg(feature = "mdns-sd")]
pub mod mdns;
pub mod memory;

#[cfg(feature = "mdns-sd")]
pub use mdns::MdnsBackend;
pub use memory::MemoryBackend;

/// Multicast name-resolution engine used for querying and advertising
///
/// Implementations are shared between the controller and the background
/// discovery task, hence `Send + Sync`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResolutionBackend: Send + Sync {
    /// Bring the engine up
    async fn init(&self) -> Result<(), BackendError>;

    /// Release the engine; advertised services are withdrawn
    async fn shutdown(&self) -> Result<(), BackendError>;

    /// One-shot query for instances of `service_type`/`protocol`
    ///
    /// Blocks for at most `timeout` and returns no more than `max_results`
    /// records, in the backend's own order.
    async fn query(
        &self,
        service_type: &str,
        protocol: &str,
        timeout: Duration,
        max_results: usize,
    ) -> Result<Vec<DiscoveredRecord>, BackendError>;

    /// Advertise a service instance of this host
    async fn advertise(
        &self,
        instance_name: &str,
        service_type: &str,
        protocol: &str,
        port: u16,
        txt_records: &[TxtRecord],
    ) -> Result<(), BackendError>;

    /// Withdraw the service advertised for `service_type`/`protocol`
    async fn unadvertise(&self, service_type: &str, protocol: &str) -> Result<(), BackendError>;

    /// Set the hostname used for this host's advertisements
    async fn set_hostname(&self, hostname: &str) -> Result<(), BackendError>;

    /// Hand back the records of a successful query
    ///
    /// Called exactly once per successful query, however the scan ended.
    fn release_results(&self, results: Vec<DiscoveredRecord>) {
        drop(results);
    }
}
