//! Periodic service discovery over mDNS
//!
//! Advertises an HTTP service for this host, then cycles through a list of
//! common service types, logging every instance found. Stop with Ctrl-C.
//!
//! ```text
//! RUST_LOG=info cargo run --example discovery_demo
//! ```

use std::time::Duration;
use svc_discovery::{
    backend::MdnsBackend, types::split_service_type, DiscoveredService, DiscoveryConfig,
    ServiceDiscovery, SubsystemSettings, TxtRecord,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const SERVICE_TYPES: &[&str] = &[
    "_http._tcp",
    "_ftp._tcp",
    "_ssh._tcp",
    "_printer._tcp",
    "_ipp._tcp",
    "_smb._tcp",
    "_afpovertcp._tcp",
    "_modbus._tcp",
];

/// Time a run is given before the next one is started
const RUN_WINDOW: Duration = Duration::from_secs(5);
/// Pause between discovery cycles
const CYCLE_PAUSE: Duration = Duration::from_secs(2);

fn log_service(service: &DiscoveredService) {
    info!("=== Service Discovered ===");
    info!("Service: {}", service.instance_name);
    info!("Hostname: {}", service.hostname);
    info!("Port: {}", service.port);
    if !service.txt_records.is_empty() {
        info!("TXT Records:");
        for record in &service.txt_records {
            info!("  {} = {}", record.key, record.value.as_deref().unwrap_or(""));
        }
    }
    info!("========================");
}

async fn discovery_cycle(discovery: &ServiceDiscovery, timeout: Duration) {
    for full in SERVICE_TYPES.iter().cycle() {
        let Some((service_type, protocol)) = split_service_type(full) else {
            error!("Invalid service format: {}", full);
            tokio::time::sleep(RUN_WINDOW).await;
            continue;
        };

        info!("Discovering services: {}.{}", service_type, protocol);
        let config = DiscoveryConfig::new(service_type, protocol)
            .with_timeout(timeout)
            .with_callback(log_service);

        if let Err(e) = discovery.start(&config).await {
            error!("Failed to start service discovery: {}", e);
        }

        tokio::time::sleep(RUN_WINDOW).await;
        tokio::time::sleep(CYCLE_PAUSE).await;
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Service discovery demo starting...");

    let settings = SubsystemSettings::load()?;
    let timeout = settings.default_timeout();
    let discovery = ServiceDiscovery::with_settings(MdnsBackend::new(), settings);

    info!("Initializing service discovery...");
    discovery.init().await?;
    discovery.set_hostname("rust-svc-disc").await?;

    let txt = [
        TxtRecord::new("version", "1.0"),
        TxtRecord::new("path", "/"),
        TxtRecord::new("description", "Rust Service Discovery Example"),
    ];
    discovery
        .advertise_service("Rust Web Server", "_http", "_tcp", 80, &txt)
        .await?;

    tokio::select! {
        _ = discovery_cycle(&discovery, timeout) => {}
        _ = tokio::signal::ctrl_c() => info!("Shutting down"),
    }

    discovery.deinit().await?;
    Ok(())
}
