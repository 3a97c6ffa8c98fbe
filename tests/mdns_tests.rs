#![cfg(feature = "mdns-sd")]

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use svc_discovery::{
    backend::MdnsBackend, BackendError, DiscoveryConfig, Result, ServiceDiscovery, StopOutcome,
    TaskOutcome, TxtRecord,
};
use tokio::time;

/// Bring up discovery over a real mDNS daemon, or `None` where the test
/// environment has no usable multicast interface
async fn mdns_discovery() -> Option<ServiceDiscovery> {
    let discovery = ServiceDiscovery::new(MdnsBackend::new());
    match discovery.init().await {
        Ok(()) => Some(discovery),
        Err(_) => None,
    }
}

#[tokio::test]
async fn test_mdns_lifecycle() -> Result<()> {
    let Some(discovery) = mdns_discovery().await else {
        return Ok(());
    };

    assert!(discovery.is_initialized().await);
    discovery.set_hostname("svc-disc-test").await?;
    discovery.deinit().await?;
    assert!(!discovery.is_initialized().await);

    Ok(())
}

#[tokio::test]
async fn test_mdns_service_advertisement() -> Result<()> {
    let Some(discovery) = mdns_discovery().await else {
        return Ok(());
    };

    let txt = [TxtRecord::new("version", "1.0"), TxtRecord::new("test", "true")];
    discovery
        .advertise_service("Test Service", "_svcdisctest", "_tcp", 8080, &txt)
        .await?;
    discovery.remove_service("_svcdisctest", "_tcp").await?;

    let err = discovery
        .remove_service("_svcdisctest", "_tcp")
        .await
        .unwrap_err();
    assert!(matches!(err.backend_error(), Some(BackendError::NotFound(_))));

    discovery.deinit().await
}

#[tokio::test]
async fn test_mdns_discovery_run() -> Result<()> {
    let Some(discovery) = mdns_discovery().await else {
        return Ok(());
    };

    discovery.set_hostname("svc-disc-run").await?;
    discovery
        .advertise_service("Run Test", "_svcdiscrun", "_tcp", 8081, &[])
        .await?;

    // Allow time for registration
    time::sleep(Duration::from_millis(100)).await;

    let count = Arc::new(AtomicUsize::new(0));
    let seen = count.clone();
    let config = DiscoveryConfig::new("_svcdiscrun", "_tcp")
        .with_timeout(Duration::from_millis(500))
        .with_callback(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
    discovery.start(&config).await?;

    // The query is bounded by its timeout, so the run ends well inside the grace period
    time::sleep(Duration::from_secs(1)).await;
    // Multicast loopback may be unavailable, so the count itself can be zero
    assert_ne!(discovery.stop_with_outcome().await, StopOutcome::Forced);
    let delivered = count.load(Ordering::SeqCst);
    assert_eq!(
        discovery.last_outcome().await,
        Some(TaskOutcome::Exhausted { delivered })
    );

    discovery.remove_service("_svcdiscrun", "_tcp").await?;
    discovery.deinit().await
}

#[tokio::test]
async fn test_mdns_timeout_handling() -> Result<()> {
    let Some(discovery) = mdns_discovery().await else {
        return Ok(());
    };

    let count = Arc::new(AtomicUsize::new(0));
    let seen = count.clone();
    let config = DiscoveryConfig::new("_nonexistent", "_tcp")
        .with_timeout(Duration::from_millis(100))
        .with_callback(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
    discovery.start(&config).await?;

    time::sleep(Duration::from_millis(500)).await;
    assert!(!discovery.is_running().await);
    assert_eq!(count.load(Ordering::SeqCst), 0);

    discovery.deinit().await
}
