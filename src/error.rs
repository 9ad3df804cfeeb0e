//! Domain errors and error-handling helpers.
//!
//! The taxonomy mirrors how each failure is handled: file/parse problems for
//! non-default contexts are swallowed (the context is treated as absent),
//! capture revocation feeds the failover protocol, transient system errors get
//! a bounded backoff retry, validation problems block saves but never dispatch.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, warn};

use crate::validator::Diagnostic;

/// Error severity for user-facing reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

#[derive(Error, Debug)]
pub enum KeychordError {
    #[error("file error for {path}: {source}")]
    FileIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed document {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("validation failed with {} diagnostic(s)", .0.len())]
    Validation(Vec<Diagnostic>),

    #[error("capture handle unavailable: {0}")]
    Capture(String),

    #[error("transient system error: {0}")]
    Transient(String),
}

impl KeychordError {
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::FileIo { .. } => ErrorSeverity::Warning,
            Self::Parse { .. } => ErrorSeverity::Warning,
            Self::Validation(_) => ErrorSeverity::Error,
            Self::Capture(_) => ErrorSeverity::Error,
            Self::Transient(_) => ErrorSeverity::Warning,
        }
    }

    /// Only transient system errors are worth retrying; everything else is
    /// either permanent or handled by a dedicated protocol.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Classify an I/O error: resource-busy and interrupted conditions are
    /// transient, everything else is a plain file error.
    pub fn from_io(path: PathBuf, source: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match source.kind() {
            ErrorKind::Interrupted | ErrorKind::WouldBlock | ErrorKind::TimedOut => {
                Self::Transient(format!("{}: {}", path.display(), source))
            }
            _ => Self::FileIo { path, source },
        }
    }
}

pub type Result<T> = std::result::Result<T, KeychordError>;

/// Retry an operation with bounded exponential backoff. Only retries while the
/// error reports itself as retryable; at most `max_attempts` tries total.
pub fn retry_with_backoff<T, F>(max_attempts: u32, base_delay: Duration, mut op: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let mut attempt = 0;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt + 1 < max_attempts => {
                let delay = base_delay * 2u32.saturating_pow(attempt);
                warn!(
                    attempt = attempt + 1,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient error, retrying"
                );
                std::thread::sleep(delay);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Extension trait for silent error logging with caller location tracking.
/// Use when the operation is recoverable and the user doesn't need to know.
pub trait ResultExt<T> {
    /// Log error with caller location and return None. Use for recoverable failures.
    fn log_err(self) -> Option<T>;
    /// Log as warning with caller location and return None. Use for expected failures.
    fn warn_on_err(self) -> Option<T>;
}

impl<T, E: std::fmt::Debug> ResultExt<T> for std::result::Result<T, E> {
    #[track_caller]
    fn log_err(self) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(err) => {
                let caller = std::panic::Location::caller();
                error!(
                    error = ?err,
                    file = caller.file(),
                    line = caller.line(),
                    "Operation failed"
                );
                None
            }
        }
    }

    #[track_caller]
    fn warn_on_err(self) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(err) => {
                let caller = std::panic::Location::caller();
                warn!(
                    error = ?err,
                    file = caller.file(),
                    line = caller.line(),
                    "Operation had warning"
                );
                None
            }
        }
    }
}
