//! Acquisition worker runner
//!
//! Each worker gets a dedicated blocking thread that polls it in a loop with
//! a short idle sleep and merges every result into the store.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::hardware::{AcquisitionWorker, HardwareError, IndicatorOutput};
use crate::shutdown::ShutdownSignal;
use crate::store::TelemetryStore;

/// Default pause between polls
pub const DEFAULT_IDLE_SLEEP: Duration = Duration::from_millis(1);

/// Worker shared between its poll thread and the shutdown coordinator
pub type SharedWorker = Arc<Mutex<Box<dyn AcquisitionWorker>>>;

/// Wrap a worker for sharing
pub fn shared(worker: Box<dyn AcquisitionWorker>) -> SharedWorker {
    Arc::new(Mutex::new(worker))
}

fn lock(worker: &SharedWorker) -> MutexGuard<'_, Box<dyn AcquisitionWorker>> {
    worker.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Why a worker loop returned
#[derive(Debug)]
pub enum WorkerExit {
    /// Shutdown was requested
    Stopped,
    /// The worker reported a fatal I/O error
    Failed(HardwareError),
}

/// Poll `worker` until `signal` is raised or a fatal error occurs.
///
/// Fatal errors raise the error indicator; the worker is not restarted.
pub fn run_worker_loop(
    worker: &SharedWorker,
    store: &TelemetryStore,
    signal: &ShutdownSignal,
    indicators: &dyn IndicatorOutput,
    idle_sleep: Duration,
) -> WorkerExit {
    let (name, domain) = {
        let w = lock(worker);
        (w.name().to_string(), w.domain())
    };
    debug!(worker = %name, %domain, "Worker loop started");

    while !signal.is_triggered() {
        // Guard is released before merging and sleeping.
        let polled = lock(worker).poll();
        match polled {
            Ok(Some(fields)) => store.merge(domain, fields),
            Ok(None) => {}
            Err(e) if !e.is_fatal() => debug!(worker = %name, "Poll timed out"),
            Err(e) => {
                error!(worker = %name, "Worker stopped after fatal error: {}", e);
                indicators.set_error_indicator(true);
                return WorkerExit::Failed(e);
            }
        }
        std::thread::sleep(idle_sleep);
    }

    info!(worker = %name, "Worker loop stopped");
    WorkerExit::Stopped
}

/// Run [`run_worker_loop`] on a dedicated blocking thread
pub fn spawn_worker(
    worker: SharedWorker,
    store: TelemetryStore,
    signal: ShutdownSignal,
    indicators: Arc<dyn IndicatorOutput>,
    idle_sleep: Duration,
) -> JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        run_worker_loop(&worker, &store, &signal, indicators.as_ref(), idle_sleep);
    })
}
