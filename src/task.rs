//! The background discovery run and the handle the controller keeps for it

use crate::{
    backend::ResolutionBackend,
    cancel::CancellationObserver,
    config::DiscoveryCallback,
    types::DiscoveredRecord,
};
use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{runtime::Handle, task::JoinHandle};
use tracing::{debug, error, info};

/// Phases a discovery run moves through, as reported in log events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TaskPhase {
    /// Waiting on the backend query
    Running,
    /// Handing records to the callback
    ScanningResults,
    /// Stopped early on request
    Cancelled,
    /// Every record was processed
    Exhausted,
    /// Cleanup done; the run no longer exists
    Terminated,
}

/// How a run ended
///
/// Reported by [`ServiceDiscovery::last_outcome`](crate::ServiceDiscovery::last_outcome)
/// once the controller has reaped the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The query failed; no callback was made
    QueryFailed,
    /// The scan did not complete, normally because a callback panicked
    ScanFailed,
    /// Cancellation was observed after `delivered` callbacks
    Cancelled {
        /// Callbacks made before the stop was seen
        delivered: usize,
    },
    /// All records were consumed
    Exhausted {
        /// Callbacks made
        delivered: usize,
    },
}

/// Everything a run needs, copied out of the controller at `start`
pub(crate) struct DiscoveryTask {
    pub(crate) id: u64,
    pub(crate) backend: Arc<dyn ResolutionBackend>,
    pub(crate) service_type: String,
    pub(crate) protocol: String,
    pub(crate) timeout: Duration,
    pub(crate) max_results: usize,
    pub(crate) callback: DiscoveryCallback,
    pub(crate) cancel: CancellationObserver,
}

/// Clears the run's flag when the run ends, aborted or not
struct RunningGuard {
    id: u64,
    running: Arc<AtomicBool>,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        debug!(task = self.id, phase = ?TaskPhase::Terminated, "Discovery task finished");
    }
}

/// Returns query results to the backend exactly once
struct QueryResults {
    backend: Arc<dyn ResolutionBackend>,
    records: Vec<DiscoveredRecord>,
}

impl Drop for QueryResults {
    fn drop(&mut self) {
        self.backend.release_results(std::mem::take(&mut self.records));
    }
}

impl DiscoveryTask {
    /// Spawn the run on the current runtime
    ///
    /// Fails only when there is no runtime to spawn onto.
    pub(crate) fn spawn(self) -> Result<TaskHandle, tokio::runtime::TryCurrentError> {
        let runtime = Handle::try_current()?;
        let id = self.id;
        let running = Arc::new(AtomicBool::new(true));
        let guard = RunningGuard {
            id,
            running: running.clone(),
        };
        let join = runtime.spawn(self.run(guard));
        Ok(TaskHandle { id, running, join })
    }

    async fn run(self, _guard: RunningGuard) -> TaskOutcome {
        let Self {
            id,
            backend,
            service_type,
            protocol,
            timeout,
            max_results,
            callback,
            cancel,
        } = self;
        info!(
            task = id,
            phase = ?TaskPhase::Running,
            "Starting service discovery for {}.{}", service_type, protocol
        );

        let records = match backend
            .query(&service_type, &protocol, timeout, max_results)
            .await
        {
            Ok(records) => records,
            Err(e) => {
                error!(task = id, "mDNS query failed: {}", e);
                return TaskOutcome::QueryFailed;
            }
        };
        let results = QueryResults { backend, records };

        debug!(task = id, phase = ?TaskPhase::ScanningResults, count = results.records.len());
        // Callbacks are synchronous and may block; keep them off the async workers
        let scanned =
            tokio::task::spawn_blocking(move || scan(id, &callback, &cancel, &results)).await;
        let outcome = match scanned {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(task = id, "Discovery scan failed: {}", e);
                return TaskOutcome::ScanFailed;
            }
        };

        match outcome {
            TaskOutcome::Cancelled { delivered } => {
                info!(task = id, phase = ?TaskPhase::Cancelled, delivered, "Discovery stop requested")
            }
            TaskOutcome::Exhausted { delivered } => {
                info!(task = id, phase = ?TaskPhase::Exhausted, delivered, "Service discovery task completed")
            }
            TaskOutcome::QueryFailed | TaskOutcome::ScanFailed => {}
        }
        outcome
    }
}

/// Deliver records to the callback until done or cancelled
fn scan(
    id: u64,
    callback: &DiscoveryCallback,
    cancel: &CancellationObserver,
    results: &QueryResults,
) -> TaskOutcome {
    let mut delivered = 0;
    for record in &results.records {
        if cancel.is_cancelled() {
            return TaskOutcome::Cancelled { delivered };
        }
        let Some(service) = record.to_service() else {
            debug!(task = id, "Skipping {} without hostname", record.instance_name);
            continue;
        };
        info!(task = id, "Found service: {}", service);
        callback(&service);
        delivered += 1;
    }
    TaskOutcome::Exhausted { delivered }
}

/// Lifecycle view of a spawned discovery run
///
/// Records never flow through the handle; they reach the caller only via the
/// configured callback.
pub(crate) struct TaskHandle {
    id: u64,
    running: Arc<AtomicBool>,
    join: JoinHandle<TaskOutcome>,
}

impl TaskHandle {
    /// Identifier of the run, as it appears in log events
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether the run has yet to finish its cleanup
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Abort the run without its cooperation
    ///
    /// The abort lands at the run's next suspension point; its drop guards
    /// still hand results back to the backend. A callback that is blocked
    /// keeps its blocking thread until it returns, then sees the stop request.
    pub fn force_stop(&self) {
        self.join.abort();
        self.running.store(false, Ordering::SeqCst);
    }

    /// Wait for the run and report how it ended; `None` if it was aborted or panicked
    pub async fn outcome(self) -> Option<TaskOutcome> {
        self.join.await.ok()
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id)
            .field("running", &self.is_running())
            .finish()
    }
}
