//! Lifecycle controller for the discovery subsystem

use crate::{
    backend::ResolutionBackend,
    cancel::CancellationSignal,
    config::{DiscoveryConfig, SubsystemSettings},
    error::{require_non_empty, DiscoveryError, Result},
    task::{DiscoveryTask, TaskHandle, TaskOutcome},
    types::TxtRecord,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// How a call to [`ServiceDiscovery::stop_with_outcome`] ended the active run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// Nothing was running
    Idle,
    /// The run observed the stop request and exited by itself
    Graceful,
    /// The run outlived the grace period and was aborted
    Forced,
}

#[derive(Default)]
struct SubsystemState {
    initialized: bool,
    signal: Option<CancellationSignal>,
    task: Option<TaskHandle>,
    active_config: Option<DiscoveryConfig>,
    last_outcome: Option<TaskOutcome>,
    next_task_id: u64,
}

impl SubsystemState {
    fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(TaskHandle::is_running)
    }
}

/// Service discovery context: one backend, at most one discovery run
///
/// Every operation other than `init`/`deinit` requires `init` first. Starting
/// a run while another is active stops the old one before the new one is
/// spawned.
pub struct ServiceDiscovery {
    backend: Arc<dyn ResolutionBackend>,
    settings: SubsystemSettings,
    state: Mutex<SubsystemState>,
}

impl ServiceDiscovery {
    /// Create an uninitialized context over `backend` with default settings
    pub fn new<B: ResolutionBackend + 'static>(backend: B) -> Self {
        Self::with_settings(backend, SubsystemSettings::default())
    }

    /// Create an uninitialized context with explicit settings
    pub fn with_settings<B: ResolutionBackend + 'static>(
        backend: B,
        settings: SubsystemSettings,
    ) -> Self {
        Self::from_shared(Arc::new(backend), settings)
    }

    /// Create an uninitialized context over an already shared backend
    pub fn from_shared(backend: Arc<dyn ResolutionBackend>, settings: SubsystemSettings) -> Self {
        Self {
            backend,
            settings,
            state: Mutex::new(SubsystemState::default()),
        }
    }

    /// Settings in effect
    pub fn settings(&self) -> &SubsystemSettings {
        &self.settings
    }

    /// Bring up the backend and the cancellation signal
    ///
    /// Calling this again while initialized is a no-op.
    pub async fn init(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.initialized {
            warn!("Service discovery already initialized");
            return Ok(());
        }

        if let Err(e) = self.backend.init().await {
            error!("Resolution backend init failed: {}", e);
            return Err(e.into());
        }

        state.signal = Some(CancellationSignal::new());
        state.initialized = true;
        info!("Service discovery initialized");
        Ok(())
    }

    /// Stop any run, release the backend and the signal
    ///
    /// Calling this while not initialized is a no-op.
    pub async fn deinit(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.initialized {
            return Ok(());
        }

        self.stop_locked(&mut state).await;

        if let Err(e) = self.backend.shutdown().await {
            warn!("Resolution backend shutdown failed: {}", e);
        }
        state.signal = None;
        state.initialized = false;
        info!("Service discovery deinitialized");
        Ok(())
    }

    /// Whether `init` has run without a matching `deinit`
    pub async fn is_initialized(&self) -> bool {
        self.state.lock().await.initialized
    }

    /// Whether a discovery run is active
    pub async fn is_running(&self) -> bool {
        self.state.lock().await.is_running()
    }

    /// Copy of the configuration of the active run, if any
    pub async fn active_config(&self) -> Option<DiscoveryConfig> {
        let state = self.state.lock().await;
        if state.is_running() {
            state.active_config.clone()
        } else {
            None
        }
    }

    /// How the most recently finished run ended
    ///
    /// `None` until a run has finished, and after a run that had to be aborted.
    pub async fn last_outcome(&self) -> Option<TaskOutcome> {
        let mut state = self.state.lock().await;
        if let Some(handle) = state.task.take_if(|task| !task.is_running()) {
            state.active_config = None;
            state.last_outcome = handle.outcome().await;
        }
        state.last_outcome
    }

    /// Start a discovery run in the background
    ///
    /// Arguments are checked before anything else happens. A run that is
    /// already active is stopped first. Returns once the run is spawned;
    /// query failures inside the run are only logged.
    pub async fn start(&self, config: &DiscoveryConfig) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.initialized {
            error!("Service discovery not initialized");
            return Err(DiscoveryError::invalid_state("service discovery not initialized"));
        }

        if let Err(e) = config.validate() {
            error!("Invalid discovery configuration: {}", e);
            return Err(e);
        }
        let Some(callback) = config.callback.clone() else {
            return Err(DiscoveryError::invalid_argument("callback", "a discovery callback is required"));
        };

        if state.is_running() {
            warn!("Discovery already running, stopping previous discovery");
        }
        self.stop_locked(&mut state).await;

        let Some(signal) = state.signal.as_mut() else {
            return Err(DiscoveryError::resource_exhausted("cancellation signal not allocated"));
        };
        signal.clear();
        let cancel = signal.observer();

        let active = config.clone();
        state.next_task_id += 1;
        let task = DiscoveryTask {
            id: state.next_task_id,
            backend: self.backend.clone(),
            service_type: active.service_type.clone(),
            protocol: active.protocol.clone(),
            timeout: active.timeout,
            max_results: self.settings.max_results,
            callback,
            cancel,
        };

        match task.spawn() {
            Ok(handle) => {
                debug!(task = handle.id(), "Spawned discovery task for {}", active.full_service_type());
                state.task = Some(handle);
                state.active_config = Some(active);
                Ok(())
            }
            Err(e) => {
                error!("Failed to create discovery task: {}", e);
                state.task = None;
                state.active_config = None;
                Err(DiscoveryError::resource_exhausted(format!(
                    "failed to create discovery task: {e}"
                )))
            }
        }
    }

    /// Stop the active run, if any
    ///
    /// Waits up to the configured grace period for the run to notice the stop
    /// request, then aborts it. Always succeeds.
    pub async fn stop(&self) -> Result<()> {
        self.stop_with_outcome().await;
        Ok(())
    }

    /// Stop the active run and report which path ended it
    pub async fn stop_with_outcome(&self) -> StopOutcome {
        let mut state = self.state.lock().await;
        self.stop_locked(&mut state).await
    }

    async fn stop_locked(&self, state: &mut SubsystemState) -> StopOutcome {
        let Some(handle) = state.task.take() else {
            return StopOutcome::Idle;
        };
        state.active_config = None;

        if !handle.is_running() {
            state.last_outcome = handle.outcome().await;
            return StopOutcome::Idle;
        }

        if let Some(signal) = &state.signal {
            signal.set();
        }

        let interval = self.settings.stop_poll_interval();
        let mut attempts = 0;
        while handle.is_running() && attempts < self.settings.stop_poll_attempts {
            tokio::time::sleep(interval).await;
            attempts += 1;
        }

        if handle.is_running() {
            warn!(
                task = handle.id(),
                "Discovery task did not stop gracefully within {:?}, aborting",
                self.settings.stop_grace_period()
            );
            handle.force_stop();
            state.last_outcome = None;
            info!("Service discovery stopped");
            return StopOutcome::Forced;
        }

        info!(task = handle.id(), "Service discovery stopped");
        state.last_outcome = handle.outcome().await;
        StopOutcome::Graceful
    }

    /// Set the hostname this host advertises under
    pub async fn set_hostname(&self, hostname: &str) -> Result<()> {
        let _state = self.require_initialized().await?;
        require_non_empty("hostname", hostname)?;

        if let Err(e) = self.backend.set_hostname(hostname).await {
            error!("Failed to set hostname: {}", e);
            return Err(e.into());
        }
        info!("Hostname set to: {}", hostname);
        Ok(())
    }

    /// Advertise a service of this host
    pub async fn advertise_service(
        &self,
        instance_name: &str,
        service_type: &str,
        protocol: &str,
        port: u16,
        txt_records: &[TxtRecord],
    ) -> Result<()> {
        let _state = self.require_initialized().await?;
        require_non_empty("instance_name", instance_name)?;
        require_non_empty("service_type", service_type)?;
        require_non_empty("protocol", protocol)?;

        if let Err(e) = self
            .backend
            .advertise(instance_name, service_type, protocol, port, txt_records)
            .await
        {
            error!("Failed to add service: {}", e);
            return Err(e.into());
        }
        info!(
            "Service advertised: {}.{}.{} on port {}",
            instance_name, service_type, protocol, port
        );
        Ok(())
    }

    /// Withdraw the service advertised for `service_type`/`protocol`
    pub async fn remove_service(&self, service_type: &str, protocol: &str) -> Result<()> {
        let _state = self.require_initialized().await?;
        require_non_empty("service_type", service_type)?;
        require_non_empty("protocol", protocol)?;

        if let Err(e) = self.backend.unadvertise(service_type, protocol).await {
            error!("Failed to remove service: {}", e);
            return Err(e.into());
        }
        info!("Service removed: {}.{}", service_type, protocol);
        Ok(())
    }

    /// Lock the state, failing if the subsystem is not initialized
    ///
    /// The guard is held across the backend call so `deinit` cannot race it.
    async fn require_initialized(&self) -> Result<tokio::sync::MutexGuard<'_, SubsystemState>> {
        let state = self.state.lock().await;
        if !state.initialized {
            error!("Service discovery not initialized");
            return Err(DiscoveryError::invalid_state("service discovery not initialized"));
        }
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backend::{MemoryBackend, MockResolutionBackend},
        error::BackendError,
    };

    #[tokio::test]
    async fn test_backend_init_failure_leaves_uninitialized() {
        let mut backend = MockResolutionBackend::new();
        backend
            .expect_init()
            .times(1)
            .returning(|| Err(BackendError::mdns("no interfaces")));

        let discovery = ServiceDiscovery::new(backend);
        let err = discovery.init().await.unwrap_err();
        assert_eq!(err.backend_error(), Some(&BackendError::mdns("no interfaces")));
        assert!(!discovery.is_initialized().await);
    }

    #[tokio::test]
    async fn test_backend_failures_pass_through_unchanged() {
        let mut backend = MockResolutionBackend::new();
        backend.expect_init().returning(|| Ok(()));
        backend
            .expect_set_hostname()
            .returning(|_| Err(BackendError::other("hostname rejected")));
        backend
            .expect_advertise()
            .returning(|_, _, _, _, _| Err(BackendError::mdns("duplicate")));

        let discovery = ServiceDiscovery::new(backend);
        discovery.init().await.unwrap();

        let err = discovery.set_hostname("node").await.unwrap_err();
        assert_eq!(err.backend_error(), Some(&BackendError::other("hostname rejected")));

        let err = discovery
            .advertise_service("Web", "_http", "_tcp", 80, &[])
            .await
            .unwrap_err();
        assert_eq!(err.backend_error(), Some(&BackendError::mdns("duplicate")));
    }

    #[tokio::test]
    async fn test_deinit_tolerates_backend_shutdown_failure() {
        let mut backend = MockResolutionBackend::new();
        backend.expect_init().returning(|| Ok(()));
        backend
            .expect_shutdown()
            .times(1)
            .returning(|| Err(BackendError::other("busy")));

        let discovery = ServiceDiscovery::new(backend);
        discovery.init().await.unwrap();
        assert!(discovery.deinit().await.is_ok());
        assert!(!discovery.is_initialized().await);
    }

    #[tokio::test]
    async fn test_argument_checks_precede_backend_calls() {
        let mut backend = MockResolutionBackend::new();
        backend.expect_init().returning(|| Ok(()));
        backend.expect_advertise().never();
        backend.expect_unadvertise().never();
        backend.expect_set_hostname().never();

        let discovery = ServiceDiscovery::new(backend);
        discovery.init().await.unwrap();

        let err = discovery.set_hostname("").await.unwrap_err();
        assert_eq!(err.invalid_field(), Some("hostname"));
        let err = discovery.advertise_service("", "_http", "_tcp", 80, &[]).await.unwrap_err();
        assert_eq!(err.invalid_field(), Some("instance_name"));
        let err = discovery.advertise_service("Web", "", "_tcp", 80, &[]).await.unwrap_err();
        assert_eq!(err.invalid_field(), Some("service_type"));
        let err = discovery.advertise_service("Web", "_http", "", 80, &[]).await.unwrap_err();
        assert_eq!(err.invalid_field(), Some("protocol"));
        let err = discovery.remove_service("", "_tcp").await.unwrap_err();
        assert_eq!(err.invalid_field(), Some("service_type"));
        let err = discovery.remove_service("_http", "").await.unwrap_err();
        assert_eq!(err.invalid_field(), Some("protocol"));
    }

    #[tokio::test]
    async fn test_stop_when_idle() {
        let discovery = ServiceDiscovery::new(MemoryBackend::new());
        assert_eq!(discovery.stop_with_outcome().await, StopOutcome::Idle);
        discovery.init().await.unwrap();
        assert_eq!(discovery.stop_with_outcome().await, StopOutcome::Idle);
        assert!(discovery.stop().await.is_ok());
    }

    #[tokio::test]
    async fn test_active_config_only_while_running() {
        let backend = MemoryBackend::new();
        backend.set_query_delay(Some(std::time::Duration::from_millis(200))).await;
        let discovery = ServiceDiscovery::new(backend);
        discovery.init().await.unwrap();
        assert!(discovery.active_config().await.is_none());

        let config = DiscoveryConfig::new("_ssh", "_tcp").with_callback(|_| {});
        discovery.start(&config).await.unwrap();
        let active = discovery.active_config().await.unwrap();
        assert_eq!(active.full_service_type(), "_ssh._tcp");

        discovery.stop().await.unwrap();
        assert!(discovery.active_config().await.is_none());
    }
}
