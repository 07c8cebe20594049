//! Shutdown coordination
//!
//! One [`ShutdownSignal`] is shared by every loop. Worker threads poll it
//! with [`ShutdownSignal::is_triggered`]; async loops await
//! [`ShutdownSignal::triggered`]. The [`ShutdownCoordinator`] raises the
//! signal, joins the loops with a deadline and releases every collaborator,
//! each release isolated from the others.

use std::any::Any;
use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, TryLockError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::hardware::{AcquisitionWorker, ControlBusSender, IndicatorOutput};
use crate::session::{lock_session, SharedSession};
use crate::transport::Transport;
use crate::worker::SharedWorker;

/// Default time each loop gets to exit after the signal is raised
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Cooperative stop flag shared by all loops
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    token: CancellationToken,
}

impl ShutdownSignal {
    /// Create an unraised signal
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the signal. Idempotent.
    pub fn trigger(&self) {
        self.token.cancel();
    }

    /// Whether the signal has been raised
    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the signal is raised
    pub async fn triggered(&self) {
        self.token.cancelled().await
    }
}

/// Raise `signal` on SIGINT or SIGTERM.
///
/// Must be called from within a Tokio runtime.
#[cfg(unix)]
pub fn install_signal_handlers(signal: &ShutdownSignal) -> io::Result<JoinHandle<()>> {
    use tokio::signal::unix::{signal as unix_signal, SignalKind};

    let mut sigterm = unix_signal(SignalKind::terminate())?;
    let mut sigint = unix_signal(SignalKind::interrupt())?;
    let signal = signal.clone();

    Ok(tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = sigint.recv() => info!("Received SIGINT"),
            _ = signal.triggered() => return,
        }
        signal.trigger();
    }))
}

/// Raise `signal` on Ctrl-C.
///
/// Must be called from within a Tokio runtime.
#[cfg(not(unix))]
pub fn install_signal_handlers(signal: &ShutdownSignal) -> io::Result<JoinHandle<()>> {
    let signal = signal.clone();
    Ok(tokio::spawn(async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    error!("Ctrl-C handler failed: {}", e);
                    return;
                }
                info!("Received Ctrl-C");
            }
            _ = signal.triggered() => return,
        }
        signal.trigger();
    }))
}

/// Outcome of a shutdown pass
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Loops that did not exit before the join deadline
    pub late_tasks: Vec<String>,
    /// Collaborators whose release failed, with the reason
    pub failures: Vec<(String, String)>,
    /// Log file closed during this pass
    pub closed_log: Option<std::path::PathBuf>,
}

impl ShutdownReport {
    /// No late loops and no failed releases
    pub fn is_clean(&self) -> bool {
        self.late_tasks.is_empty() && self.failures.is_empty()
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "panic".to_string())
}

/// Tears down loops and collaborators exactly once
pub struct ShutdownCoordinator {
    signal: ShutdownSignal,
    join_timeout: Duration,
    tasks: Vec<(String, JoinHandle<()>)>,
    session: Option<SharedSession>,
    transport: Option<Arc<dyn Transport>>,
    workers: Vec<(String, SharedWorker)>,
    bus: Option<Arc<dyn ControlBusSender>>,
    indicators: Option<Arc<dyn IndicatorOutput>>,
    done: bool,
}

impl ShutdownCoordinator {
    /// Create a coordinator for `signal`
    pub fn new(signal: ShutdownSignal, join_timeout: Duration) -> Self {
        Self {
            signal,
            join_timeout,
            tasks: Vec::new(),
            session: None,
            transport: None,
            workers: Vec::new(),
            bus: None,
            indicators: None,
            done: false,
        }
    }

    /// The signal this coordinator raises
    pub fn signal(&self) -> &ShutdownSignal {
        &self.signal
    }

    /// Whether [`ShutdownCoordinator::shutdown`] already ran
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Track a loop to be joined
    pub fn register_task(&mut self, name: impl Into<String>, handle: JoinHandle<()>) {
        self.tasks.push((name.into(), handle));
    }

    /// Session to force closed
    pub fn set_session(&mut self, session: SharedSession) {
        self.session = Some(session);
    }

    /// Transport to disconnect
    pub fn set_transport(&mut self, transport: Arc<dyn Transport>) {
        self.transport = Some(transport);
    }

    /// Worker to shut down
    pub fn add_worker(&mut self, name: impl Into<String>, worker: SharedWorker) {
        self.workers.push((name.into(), worker));
    }

    /// Control bus to release
    pub fn set_bus(&mut self, bus: Arc<dyn ControlBusSender>) {
        self.bus = Some(bus);
    }

    /// Indicator lines to release (released last)
    pub fn set_indicators(&mut self, indicators: Arc<dyn IndicatorOutput>) {
        self.indicators = Some(indicators);
    }

    /// Raise the signal, join every loop and release every collaborator.
    ///
    /// Later calls return an empty report.
    pub async fn shutdown(&mut self) -> ShutdownReport {
        let mut report = ShutdownReport::default();
        if self.done {
            return report;
        }
        self.done = true;

        self.signal.trigger();
        info!("Shutting down all loops and workers");

        let deadline = tokio::time::Instant::now() + self.join_timeout;
        for (name, mut handle) in self.tasks.drain(..) {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => debug!(task = %name, "Loop exited"),
                Ok(Err(e)) => {
                    error!(task = %name, "Loop ended abnormally: {}", e);
                    report.failures.push((name, e.to_string()));
                }
                Err(_) => {
                    warn!(task = %name, "Loop missed join deadline");
                    handle.abort();
                    report.late_tasks.push(name);
                }
            }
        }

        if let Some(session) = self.session.take() {
            match catch_unwind(AssertUnwindSafe(|| lock_session(&session).stop())) {
                Ok(closed) => report.closed_log = closed,
                Err(p) => report.failures.push(("session".into(), panic_message(p))),
            }
        }

        if let Some(transport) = self.transport.take() {
            Self::release(&mut report, "transport", || {
                transport.disconnect().map_err(|e| e.to_string())
            });
        }

        // One deadline for all workers, however many are stuck.
        let release_deadline = tokio::time::Instant::now() + self.join_timeout;
        for (name, worker) in std::mem::take(&mut self.workers) {
            let result = Self::shutdown_worker(&worker, release_deadline).await;
            Self::release(&mut report, &name, || result);
        }

        if let Some(bus) = self.bus.take() {
            Self::release(&mut report, "control bus", || {
                bus.release().map_err(|e| e.to_string())
            });
        }

        if let Some(indicators) = self.indicators.take() {
            Self::release(&mut report, "indicators", || {
                indicators.release().map_err(|e| e.to_string())
            });
        }

        if report.is_clean() {
            info!("Shutdown complete");
        } else {
            warn!(
                late = report.late_tasks.len(),
                failed = report.failures.len(),
                "Shutdown completed with problems"
            );
        }
        report
    }

    fn release<F>(report: &mut ShutdownReport, name: &str, f: F)
    where
        F: FnOnce() -> Result<(), String>,
    {
        let outcome = match catch_unwind(AssertUnwindSafe(f)) {
            Ok(result) => result,
            Err(p) => Err(panic_message(p)),
        };
        if let Err(reason) = outcome {
            error!(collaborator = name, "Release failed: {}", reason);
            report.failures.push((name.to_string(), reason));
        }
    }

    fn shutdown_locked(worker: &mut Box<dyn AcquisitionWorker>) -> Result<(), String> {
        catch_unwind(AssertUnwindSafe(|| worker.shutdown()))
            .map_err(panic_message)
            .and_then(|r| r.map_err(|e| e.to_string()))
    }

    /// A worker thread past its deadline may still hold the lock for one
    /// bounded poll, so retry until `deadline`.
    async fn shutdown_worker(
        worker: &SharedWorker,
        deadline: tokio::time::Instant,
    ) -> Result<(), String> {
        loop {
            let attempt = match worker.try_lock() {
                Ok(mut w) => Some(Self::shutdown_locked(&mut w)),
                Err(TryLockError::Poisoned(p)) => Some(Self::shutdown_locked(&mut p.into_inner())),
                Err(TryLockError::WouldBlock) => None,
            };
            if let Some(result) = attempt {
                return result;
            }
            if tokio::time::Instant::now() >= deadline {
                return Err("worker busy past deadline".to_string());
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}
