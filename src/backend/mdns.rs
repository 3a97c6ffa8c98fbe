//! mDNS (Multicast DNS) resolution backend

use super::ResolutionBackend;
use crate::{
    error::BackendError,
    types::{DiscoveredRecord, TxtRecord},
};
use async_trait::async_trait;
use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo as MdnsServiceInfo, UnregisterStatus};
use std::{collections::HashMap, time::Duration};
use tokio::{sync::RwLock, time::Instant};
use tracing::{debug, warn};

const DAEMON_CREATE_ATTEMPTS: u64 = 3;
const UNREGISTER_ACK_TIMEOUT: Duration = Duration::from_secs(1);

/// Resolution backend on top of an `mdns_sd` daemon
#[derive(Default)]
pub struct MdnsBackend {
    daemon: RwLock<Option<ServiceDaemon>>,
    hostname: RwLock<Option<String>>,
    /// Full mDNS names of our advertisements, keyed by (service type, protocol)
    advertised: RwLock<HashMap<(String, String), String>>,
}

impl MdnsBackend {
    /// Create a backend; the daemon starts on `init`
    pub fn new() -> Self {
        Self::default()
    }

    /// Create mDNS daemon with retry logic
    async fn create_daemon_with_retry() -> Result<ServiceDaemon, BackendError> {
        let mut attempt = 1;
        loop {
            match ServiceDaemon::new() {
                Ok(daemon) => return Ok(daemon),
                Err(e) if attempt < DAEMON_CREATE_ATTEMPTS => {
                    warn!("Failed to create mDNS daemon (attempt {}): {}", attempt, e);
                    tokio::time::sleep(Duration::from_millis(100 * attempt)).await;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(BackendError::mdns(format!(
                        "Failed to create mDNS daemon after {attempt} attempts: {e}"
                    )));
                }
            }
        }
    }

    async fn daemon(&self) -> Result<ServiceDaemon, BackendError> {
        self.daemon
            .read()
            .await
            .clone()
            .ok_or(BackendError::NotInitialized)
    }

    async fn collect_resolved(
        receiver: flume::Receiver<ServiceEvent>,
        ty_domain: &str,
        timeout: Duration,
        max_results: usize,
    ) -> Vec<DiscoveredRecord> {
        let deadline = Instant::now() + timeout;
        let mut records = Vec::new();

        while records.len() < max_results {
            match tokio::time::timeout_at(deadline, receiver.recv_async()).await {
                Ok(Ok(ServiceEvent::ServiceResolved(info))) => {
                    let record = to_record(&info, ty_domain);
                    debug!("Resolved {} at {:?}:{}", record.instance_name, record.hostname, record.port);
                    records.push(record);
                }
                Ok(Ok(ServiceEvent::SearchStopped(_))) => break,
                Ok(Ok(_)) => continue,
                // Channel closed or deadline reached
                Ok(Err(_)) | Err(_) => break,
            }
        }
        records
    }
}

fn ty_domain(service_type: &str, protocol: &str) -> String {
    format!("{service_type}.{protocol}.local.")
}

fn to_record(info: &MdnsServiceInfo, ty_domain: &str) -> DiscoveredRecord {
    let fullname = info.get_fullname();
    let instance_name = fullname
        .strip_suffix(ty_domain)
        .map(|name| name.trim_end_matches('.'))
        .unwrap_or(fullname)
        .to_string();

    let hostname = info.get_hostname().trim_end_matches('.');
    let txt_records = info
        .get_properties()
        .iter()
        .map(|prop| TxtRecord {
            key: prop.key().to_string(),
            value: prop.val().map(|_| prop.val_str().to_string()),
        })
        .collect();

    DiscoveredRecord {
        instance_name,
        hostname: (!hostname.is_empty()).then(|| hostname.to_string()),
        port: info.get_port(),
        txt_records,
    }
}

#[async_trait]
impl ResolutionBackend for MdnsBackend {
    async fn init(&self) -> Result<(), BackendError> {
        let mut daemon = self.daemon.write().await;
        if daemon.is_none() {
            *daemon = Some(Self::create_daemon_with_retry().await?);
        }
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), BackendError> {
        self.advertised.write().await.clear();
        if let Some(daemon) = self.daemon.write().await.take() {
            daemon.shutdown()?;
        }
        Ok(())
    }

    async fn query(
        &self,
        service_type: &str,
        protocol: &str,
        timeout: Duration,
        max_results: usize,
    ) -> Result<Vec<DiscoveredRecord>, BackendError> {
        let daemon = self.daemon().await?;
        let ty_domain = ty_domain(service_type, protocol);

        let receiver = daemon
            .browse(&ty_domain)
            .map_err(|e| BackendError::mdns(format!("Failed to browse services: {e}")))?;
        let records = Self::collect_resolved(receiver, &ty_domain, timeout, max_results).await;

        if let Err(e) = daemon.stop_browse(&ty_domain) {
            debug!("Failed to stop browsing {}: {}", ty_domain, e);
        }
        Ok(records)
    }

    async fn advertise(
        &self,
        instance_name: &str,
        service_type: &str,
        protocol: &str,
        port: u16,
        txt_records: &[TxtRecord],
    ) -> Result<(), BackendError> {
        let daemon = self.daemon().await?;
        let key = (service_type.to_string(), protocol.to_string());
        let mut advertised = self.advertised.write().await;
        if let Some(existing) = advertised.get(&key) {
            return Err(BackendError::already_exists(existing.clone()));
        }

        let ty_domain = ty_domain(service_type, protocol);
        let hostname = match self.hostname.read().await.clone() {
            Some(hostname) => hostname,
            None => format!("{}.local.", instance_name.replace(' ', "-")),
        };

        let properties: Vec<(&str, &str)> = txt_records
            .iter()
            .map(|r| (r.key.as_str(), r.value.as_deref().unwrap_or("")))
            .collect();

        let info = MdnsServiceInfo::new(
            &ty_domain,
            instance_name,
            &hostname,
            "",
            port,
            properties.as_slice(),
        )
        .map_err(|e| BackendError::mdns(format!("Failed to create mDNS service info: {e}")))?
        .enable_addr_auto();

        let fullname = info.get_fullname().to_string();
        daemon
            .register(info)
            .map_err(|e| BackendError::mdns(format!("Failed to register service: {e}")))?;

        advertised.insert(key, fullname);
        Ok(())
    }

    async fn unadvertise(&self, service_type: &str, protocol: &str) -> Result<(), BackendError> {
        let daemon = self.daemon().await?;
        let key = (service_type.to_string(), protocol.to_string());
        let mut advertised = self.advertised.write().await;
        let fullname = advertised
            .get(&key)
            .cloned()
            .ok_or_else(|| BackendError::not_found(format!("{service_type}.{protocol}")))?;

        // Keep the entry until the daemon has taken the request
        let status = daemon
            .unregister(&fullname)
            .map_err(|e| BackendError::mdns(format!("Failed to unregister service: {e}")))?;
        advertised.remove(&key);

        match tokio::time::timeout(UNREGISTER_ACK_TIMEOUT, status.recv_async()).await {
            Ok(Ok(UnregisterStatus::NotFound)) => Err(BackendError::not_found(fullname)),
            Ok(Ok(_)) => Ok(()),
            _ => {
                debug!("No unregister acknowledgement for {}", fullname);
                Ok(())
            }
        }
    }

    async fn set_hostname(&self, hostname: &str) -> Result<(), BackendError> {
        self.daemon().await?;
        let hostname = hostname.trim_end_matches('.').trim_end_matches(".local");
        *self.hostname.write().await = Some(format!("{hostname}.local."));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ty_domain() {
        assert_eq!(ty_domain("_http", "_tcp"), "_http._tcp.local.");
    }

    #[tokio::test]
    async fn test_requires_init() {
        let backend = MdnsBackend::new();
        let err = backend.set_hostname("node").await.unwrap_err();
        assert_eq!(err, BackendError::NotInitialized);
    }

    #[tokio::test]
    async fn test_unadvertise_unknown_is_not_found() {
        let backend = MdnsBackend::new();
        // Daemon creation may fail without a usable network interface
        if backend.init().await.is_err() {
            return;
        }
        let err = backend.unadvertise("_never", "_tcp").await.unwrap_err();
        assert!(matches!(err, BackendError::NotFound(_)));
        backend.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_second_advertisement_for_same_type_is_rejected() {
        let backend = MdnsBackend::new();
        if backend.init().await.is_err() {
            return;
        }

        backend.advertise("First", "_svcdiscdup", "_tcp", 8090, &[]).await.unwrap();
        let err = backend
            .advertise("Second", "_svcdiscdup", "_tcp", 8091, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::AlreadyExists(ref name) if name.starts_with("First.")));

        // The first registration is still the one that gets withdrawn
        backend.unadvertise("_svcdiscdup", "_tcp").await.unwrap();
        let err = backend.unadvertise("_svcdiscdup", "_tcp").await.unwrap_err();
        assert!(matches!(err, BackendError::NotFound(_)));
        backend.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_unregister_keeps_bookkeeping() {
        let backend = MdnsBackend::new();
        if backend.init().await.is_err() {
            return;
        }
        backend.advertise("Kept", "_svcdisckeep", "_tcp", 8092, &[]).await.unwrap();

        // Stop the daemon thread underneath the backend so unregister cannot be sent
        let daemon = backend.daemon().await.unwrap();
        let status = daemon.shutdown().unwrap();
        let _ = tokio::time::timeout(Duration::from_secs(2), status.recv_async()).await;
        let disconnected = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if let Ok(status) = daemon.status() {
                    if let Ok(Ok(mdns_sd::DaemonStatus::Shutdown)) =
                        tokio::time::timeout(Duration::from_millis(50), status.recv_async()).await
                    {
                        break;
                    }
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        if disconnected.is_err() {
            return;
        }

        let err = backend.unadvertise("_svcdisckeep", "_tcp").await.unwrap_err();
        assert!(matches!(err, BackendError::Mdns(_)));
        assert!(
            backend
                .advertised
                .read()
                .await
                .contains_key(&("_svcdisckeep".to_string(), "_tcp".to_string()))
        );
    }
}
