//! Logging session state machine
//!
//! Owns the open CSV file while logging is active and writes one projected
//! snapshot per cadence interval.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use tracing::{error, info, warn};

use super::schema::{header_line, project_row, ROW_TIMESTAMP_FORMAT};
use super::SessionError;
use crate::hardware::IndicatorOutput;
use crate::store::{Snapshot, TelemetryStore};

/// Default interval between rows
pub const DEFAULT_CADENCE: Duration = Duration::from_millis(50);

/// Highest `_N` suffix tried when a file name is already taken
const MAX_NAME_SUFFIX: u32 = 99;

/// Result of a toggle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Idle → Active, writing to the given file
    Started(PathBuf),
    /// Active → Idle, the given file was closed
    Stopped(PathBuf),
}

struct ActiveLog {
    writer: BufWriter<File>,
    path: PathBuf,
    /// Cadence anchor: instant of activation or of the last row
    last_write: Instant,
    started_at: DateTime<Local>,
    rows: u64,
}

/// CSV logging session
///
/// `Idle` when no file is open, `Active` while one is. The file is flushed
/// and closed exactly once, on the next toggle, on [`LoggingSession::stop`],
/// or when the session is dropped.
pub struct LoggingSession {
    log_dir: PathBuf,
    cadence: Duration,
    indicators: Arc<dyn IndicatorOutput>,
    active: Option<ActiveLog>,
}

impl LoggingSession {
    /// Create an idle session writing into `log_dir`
    pub fn new(
        log_dir: impl Into<PathBuf>,
        cadence: Duration,
        indicators: Arc<dyn IndicatorOutput>,
    ) -> Self {
        Self {
            log_dir: log_dir.into(),
            cadence,
            indicators,
            active: None,
        }
    }

    /// Whether a file is open
    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Path of the open file
    pub fn current_path(&self) -> Option<&Path> {
        self.active.as_ref().map(|a| a.path.as_path())
    }

    /// Rows written to the open file
    pub fn rows_written(&self) -> u64 {
        self.active.as_ref().map(|a| a.rows).unwrap_or(0)
    }

    /// When the open file was started
    pub fn started_at(&self) -> Option<DateTime<Local>> {
        self.active.as_ref().map(|a| a.started_at)
    }

    /// Interval between rows
    pub fn cadence(&self) -> Duration {
        self.cadence
    }

    /// Directory new files are created in
    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Flip between Idle and Active.
    ///
    /// A failed open leaves the session Idle and raises the error indicator;
    /// calling `toggle` again retries.
    pub fn toggle(&mut self, now: Instant) -> Result<Transition, SessionError> {
        match self.stop() {
            Some(path) => Ok(Transition::Stopped(path)),
            None => self.start(now).map(Transition::Started),
        }
    }

    /// Open a new log file. Returns the open path if already active.
    pub fn start(&mut self, now: Instant) -> Result<PathBuf, SessionError> {
        if let Some(active) = &self.active {
            return Ok(active.path.clone());
        }

        let started_at = Local::now();
        let opened = open_log_file(&self.log_dir, &started_at).and_then(|(file, path)| {
            let mut writer = BufWriter::new(file);
            writeln!(writer, "{}", header_line())
                .and_then(|_| writer.flush())
                .map_err(SessionError::Write)?;
            Ok((writer, path))
        });

        let (writer, path) = match opened {
            Ok(v) => v,
            Err(e) => {
                error!("Logging not started: {}", e);
                self.indicators.set_error_indicator(true);
                return Err(e);
            }
        };

        info!(path = %path.display(), "Logging started");
        self.indicators.set_logging_indicator(true);
        self.active = Some(ActiveLog {
            writer,
            path: path.clone(),
            last_write: now,
            started_at,
            rows: 0,
        });
        Ok(path)
    }

    /// Flush and close the open file, returning its path. No-op when idle.
    pub fn stop(&mut self) -> Option<PathBuf> {
        let mut active = self.active.take()?;

        if let Err(e) = active.writer.flush() {
            error!(path = %active.path.display(), "Failed to flush log file: {}", e);
        }
        drop(active.writer);

        self.indicators.set_logging_indicator(false);
        info!(
            path = %active.path.display(),
            rows = active.rows,
            "Logging stopped, file saved"
        );
        Some(active.path)
    }

    /// Write a row if the cadence has elapsed since the last one.
    ///
    /// Returns true when a row was written. Write failures are logged and the
    /// session stays active.
    pub fn tick(&mut self, now: Instant, store: &TelemetryStore) -> bool {
        let due = match &self.active {
            Some(active) => now.saturating_duration_since(active.last_write) >= self.cadence,
            None => false,
        };
        if !due {
            return false;
        }

        let snapshot = store.snapshot();
        let written = match self.write_row(&snapshot) {
            Ok(()) => true,
            Err(e) => {
                warn!("Dropped log row: {}", e);
                false
            }
        };

        if let Some(active) = self.active.as_mut() {
            active.last_write = now;
        }
        if written {
            self.indicators.pulse_logging_indicator_once();
        }
        written
    }

    /// Append one row projected from `snapshot`, stamped with its capture time
    pub fn write_row(&mut self, snapshot: &Snapshot) -> Result<(), SessionError> {
        let Some(active) = self.active.as_mut() else {
            return Ok(());
        };

        let stamp = snapshot.captured_at.format(ROW_TIMESTAMP_FORMAT).to_string();
        let row = project_row(snapshot, &stamp);
        writeln!(active.writer, "{}", row.join(","))?;
        // Flushed per row so a full disk shows up on the row that hit it.
        active.writer.flush()?;
        active.rows += 1;
        Ok(())
    }
}

impl Drop for LoggingSession {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Create `datalog_<YYYYMMDD_HHMMSS>.csv` in `dir`, adding `_N` if taken
fn open_log_file(dir: &Path, at: &DateTime<Local>) -> Result<(File, PathBuf), SessionError> {
    let open_err = |path: &Path, source: io::Error| SessionError::Open {
        path: path.to_path_buf(),
        source,
    };

    fs::create_dir_all(dir).map_err(|e| open_err(dir, e))?;

    let stem = format!("datalog_{}", at.format("%Y%m%d_%H%M%S"));
    let mut path = dir.join(format!("{}.csv", stem));
    let mut suffix = 0;
    loop {
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((file, path)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists && suffix < MAX_NAME_SUFFIX => {
                suffix += 1;
                path = dir.join(format!("{}_{}.csv", stem, suffix));
            }
            Err(e) => return Err(open_err(&path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::NullIndicators;
    use crate::store::Domain;

    fn session(dir: &Path) -> LoggingSession {
        LoggingSession::new(dir, DEFAULT_CADENCE, Arc::new(NullIndicators))
    }

    #[test]
    fn test_session_basic() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = session(dir.path());
        assert!(!log.is_active());

        let t0 = Instant::now();
        let started = log.toggle(t0).unwrap();
        assert!(log.is_active());
        let path = match started {
            Transition::Started(p) => p,
            other => panic!("unexpected {:?}", other),
        };
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("datalog_") && name.ends_with(".csv"));

        assert_eq!(log.toggle(t0).unwrap(), Transition::Stopped(path.clone()));
        assert!(!log.is_active());
        assert!(log.current_path().is_none());
    }

    #[test]
    fn test_tick_respects_cadence() {
        let dir = tempfile::tempdir().unwrap();
        let store = TelemetryStore::new();
        store.merge(Domain::Can, [("RPM", 900.0)]);
        let mut log = session(dir.path());

        let t0 = Instant::now();
        log.start(t0).unwrap();

        assert!(!log.tick(t0 + Duration::from_millis(20), &store));
        assert!(log.tick(t0 + Duration::from_millis(50), &store));
        assert!(!log.tick(t0 + Duration::from_millis(80), &store));
        assert!(log.tick(t0 + Duration::from_millis(100), &store));
        assert_eq!(log.rows_written(), 2);
    }

    #[test]
    fn test_rows_reach_disk_before_stop() {
        let dir = tempfile::tempdir().unwrap();
        let store = TelemetryStore::new();
        store.merge(Domain::Can, [("RPM", 4200.0)]);
        let mut log = session(dir.path());

        let t0 = Instant::now();
        let path = log.start(t0).unwrap();
        assert!(log.tick(t0 + Duration::from_millis(50), &store));

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.lines().nth(1).unwrap().contains("4200"));
        assert!(log.is_active());
    }

    #[test]
    fn test_idle_tick_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = session(dir.path());
        let t0 = Instant::now();
        assert!(!log.tick(t0 + Duration::from_secs(1), &TelemetryStore::new()));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_same_second_names_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let at = Local::now();
        let (_, first) = open_log_file(dir.path(), &at).unwrap();
        let (_, second) = open_log_file(dir.path(), &at).unwrap();
        assert_ne!(first, second);
        assert!(second.to_str().unwrap().ends_with("_1.csv"));
    }
}
