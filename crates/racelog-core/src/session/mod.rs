//! Data Logging
//!
//! Records live telemetry into per-session CSV files.

mod error;
mod recorder;
pub mod schema;

pub use error::SessionError;
pub use recorder::{LoggingSession, Transition, DEFAULT_CADENCE};
pub use schema::CSV_COLUMNS;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Logging session shared between the control loop and shutdown
pub type SharedSession = Arc<Mutex<LoggingSession>>;

/// Lock a shared session, recovering from a poisoned lock.
///
/// The session's state is only ever replaced whole, so a panic while holding
/// the lock leaves it usable.
pub fn lock_session(session: &Mutex<LoggingSession>) -> MutexGuard<'_, LoggingSession> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}
