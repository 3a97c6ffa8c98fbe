//! In-process resolution backend
//!
//! Advertised services and seeded "remote" records live in a shared map, so a
//! `MemoryBackend` stands in for the network in tests and offline runs. Clones
//! share state.

use super::ResolutionBackend;
use crate::{
    error::BackendError,
    types::{DiscoveredRecord, TxtRecord},
};
use async_trait::async_trait;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::RwLock;
use tracing::debug;

type ServiceKey = (String, String);

/// Shared in-memory registry
#[derive(Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<MemoryBackendInner>,
}

#[derive(Default)]
struct MemoryBackendInner {
    initialized: AtomicBool,
    hostname: RwLock<Option<String>>,
    /// Records seen on the "network", keyed by (service type, protocol)
    remote: RwLock<HashMap<ServiceKey, Vec<DiscoveredRecord>>>,
    /// Our own advertisements
    local: RwLock<HashMap<ServiceKey, DiscoveredRecord>>,
    query_delay: RwLock<Option<Duration>>,
    query_failure: RwLock<Option<BackendError>>,
    init_calls: AtomicUsize,
    shutdown_calls: AtomicUsize,
    queries: AtomicUsize,
    releases: AtomicUsize,
}

impl MemoryBackend {
    /// Create an empty backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a record visible to queries for `service_type`/`protocol`
    pub async fn insert_record(&self, service_type: &str, protocol: &str, record: DiscoveredRecord) {
        self.inner
            .remote
            .write()
            .await
            .entry(key(service_type, protocol))
            .or_default()
            .push(record);
    }

    /// Delay every query by `delay` before it answers
    pub async fn set_query_delay(&self, delay: Option<Duration>) {
        *self.inner.query_delay.write().await = delay;
    }

    /// Make every query fail with `err`
    pub async fn set_query_failure(&self, err: Option<BackendError>) {
        *self.inner.query_failure.write().await = err;
    }

    /// Hostname set through `set_hostname`
    pub async fn hostname(&self) -> Option<String> {
        self.inner.hostname.read().await.clone()
    }

    /// Number of services currently advertised
    pub async fn advertised_count(&self) -> usize {
        self.inner.local.read().await.len()
    }

    /// Whether the backend is between `init` and `shutdown`
    pub fn is_initialized(&self) -> bool {
        self.inner.initialized.load(Ordering::SeqCst)
    }

    /// Number of `init` calls so far
    pub fn init_calls(&self) -> usize {
        self.inner.init_calls.load(Ordering::SeqCst)
    }

    /// Number of `shutdown` calls so far
    pub fn shutdown_calls(&self) -> usize {
        self.inner.shutdown_calls.load(Ordering::SeqCst)
    }

    /// Number of queries started so far
    pub fn query_count(&self) -> usize {
        self.inner.queries.load(Ordering::SeqCst)
    }

    /// Number of result lists handed back through `release_results`
    pub fn release_count(&self) -> usize {
        self.inner.releases.load(Ordering::SeqCst)
    }

    fn ensure_initialized(&self) -> Result<(), BackendError> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(BackendError::NotInitialized)
        }
    }
}

fn key(service_type: &str, protocol: &str) -> ServiceKey {
    (service_type.to_string(), protocol.to_string())
}

#[async_trait]
impl ResolutionBackend for MemoryBackend {
    async fn init(&self) -> Result<(), BackendError> {
        self.inner.init_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), BackendError> {
        self.inner.shutdown_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.initialized.store(false, Ordering::SeqCst);
        self.inner.local.write().await.clear();
        Ok(())
    }

    async fn query(
        &self,
        service_type: &str,
        protocol: &str,
        timeout: Duration,
        max_results: usize,
    ) -> Result<Vec<DiscoveredRecord>, BackendError> {
        self.ensure_initialized()?;
        self.inner.queries.fetch_add(1, Ordering::SeqCst);

        let delay = *self.inner.query_delay.read().await;
        if let Some(delay) = delay {
            if delay > timeout {
                tokio::time::sleep(timeout).await;
                return Err(BackendError::Timeout(format!(
                    "no answer for {service_type}.{protocol} within {timeout:?}"
                )));
            }
            tokio::time::sleep(delay).await;
        }

        if let Some(err) = self.inner.query_failure.read().await.clone() {
            return Err(err);
        }

        let key = key(service_type, protocol);
        let mut results: Vec<DiscoveredRecord> = self
            .inner
            .local
            .read()
            .await
            .get(&key)
            .cloned()
            .into_iter()
            .collect();
        if let Some(remote) = self.inner.remote.read().await.get(&key) {
            results.extend(remote.iter().cloned());
        }
        results.truncate(max_results);

        debug!("Memory query for {}.{} returned {} records", service_type, protocol, results.len());
        Ok(results)
    }

    async fn advertise(
        &self,
        instance_name: &str,
        service_type: &str,
        protocol: &str,
        port: u16,
        txt_records: &[TxtRecord],
    ) -> Result<(), BackendError> {
        self.ensure_initialized()?;
        let mut local = self.inner.local.write().await;
        if local.contains_key(&key(service_type, protocol)) {
            return Err(BackendError::already_exists(format!("{service_type}.{protocol}")));
        }

        let hostname = self
            .hostname()
            .await
            .unwrap_or_else(|| instance_name.replace(' ', "-"));
        let record = DiscoveredRecord::new(instance_name, format!("{hostname}.local"), port)
            .with_txt_records(txt_records.to_vec());
        local.insert(key(service_type, protocol), record);
        Ok(())
    }

    async fn unadvertise(&self, service_type: &str, protocol: &str) -> Result<(), BackendError> {
        self.ensure_initialized()?;
        match self.inner.local.write().await.remove(&key(service_type, protocol)) {
            Some(_) => Ok(()),
            None => Err(BackendError::not_found(format!("{service_type}.{protocol}"))),
        }
    }

    async fn set_hostname(&self, hostname: &str) -> Result<(), BackendError> {
        self.ensure_initialized()?;
        *self.inner.hostname.write().await = Some(hostname.to_string());
        Ok(())
    }

    fn release_results(&self, results: Vec<DiscoveredRecord>) {
        self.inner.releases.fetch_add(1, Ordering::SeqCst);
        drop(results);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(1);

    #[tokio::test]
    async fn test_requires_init() {
        let backend = MemoryBackend::new();
        let err = backend.query("_http", "_tcp", TIMEOUT, 20).await.unwrap_err();
        assert_eq!(err, BackendError::NotInitialized);
    }

    #[tokio::test]
    async fn test_advertised_service_is_queryable() {
        let backend = MemoryBackend::new();
        backend.init().await.unwrap();
        backend.set_hostname("node-1").await.unwrap();
        backend
            .advertise("Web", "_http", "_tcp", 8080, &[TxtRecord::new("path", "/")])
            .await
            .unwrap();

        let results = backend.query("_http", "_tcp", TIMEOUT, 20).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].hostname.as_deref(), Some("node-1.local"));
        assert_eq!(results[0].txt_records, vec![TxtRecord::new("path", "/")]);
    }

    #[tokio::test]
    async fn test_query_respects_max_results() {
        let backend = MemoryBackend::new();
        backend.init().await.unwrap();
        for i in 0..30 {
            backend
                .insert_record("_ipp", "_tcp", DiscoveredRecord::new(format!("p{i}"), "h", 631))
                .await;
        }

        let results = backend.query("_ipp", "_tcp", TIMEOUT, 20).await.unwrap();
        assert_eq!(results.len(), 20);
        assert_eq!(results[0].instance_name, "p0");
    }

    #[tokio::test]
    async fn test_unadvertise_unknown_is_not_found() {
        let backend = MemoryBackend::new();
        backend.init().await.unwrap();
        let err = backend.unadvertise("_ssh", "_tcp").await.unwrap_err();
        assert!(matches!(err, BackendError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_second_advertisement_for_same_type_is_rejected() {
        let backend = MemoryBackend::new();
        backend.init().await.unwrap();
        backend.advertise("First", "_http", "_tcp", 80, &[]).await.unwrap();

        let err = backend.advertise("Second", "_http", "_tcp", 81, &[]).await.unwrap_err();
        assert!(matches!(err, BackendError::AlreadyExists(_)));
        let results = backend.query("_http", "_tcp", TIMEOUT, 20).await.unwrap();
        assert_eq!(results[0].instance_name, "First");

        backend.unadvertise("_http", "_tcp").await.unwrap();
        assert_eq!(backend.advertised_count().await, 0);
        backend.advertise("Second", "_http", "_tcp", 81, &[]).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_beyond_timeout_times_out() {
        let backend = MemoryBackend::new();
        backend.init().await.unwrap();
        backend.set_query_delay(Some(Duration::from_secs(10))).await;

        let err = backend.query("_http", "_tcp", TIMEOUT, 20).await.unwrap_err();
        assert!(matches!(err, BackendError::Timeout(_)));
    }
}
