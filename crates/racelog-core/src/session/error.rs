//! Logging session errors

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while opening or writing a log file
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Cannot open log file {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Log write failed: {0}")]
    Write(#[from] std::io::Error),
}
