//! Structured JSONL logging plus human-readable stderr output.
//!
//! Two sinks share one subscriber: an append-only JSONL file under the log
//! directory (for tooling) and a compact stderr layer (for developers). The
//! guard returned by [`init`] must outlive the program so buffered lines are
//! flushed on exit. A small in-memory ring of recent lines is kept for the
//! diagnostics view.

use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const LOG_FILE_NAME: &str = "keychord.jsonl";
const RING_CAPACITY: usize = 50;

static RING: OnceLock<Mutex<Ring>> = OnceLock::new();

struct Ring {
    lines: VecDeque<String>,
}

impl Ring {
    fn push(&mut self, line: String) {
        if self.lines.len() >= RING_CAPACITY {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }
}

fn ring() -> &'static Mutex<Ring> {
    RING.get_or_init(|| {
        Mutex::new(Ring {
            lines: VecDeque::with_capacity(RING_CAPACITY),
        })
    })
}

/// Keeps the non-blocking file writer alive; dropping it flushes the log file.
pub struct LoggingGuard {
    _file_guard: WorkerGuard,
}

/// Initialize the dual-output logging system. Call once, early.
pub fn init() -> LoggingGuard {
    let path = log_path();
    let (file_writer, file_guard) = tracing_appender::non_blocking(open_log_file(&path));

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,notify=warn"));

    // JSONL sink stays off the dispatch path via the non-blocking writer.
    let file_layer = fmt::layer()
        .json()
        .with_writer(file_writer)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_span_events(FmtSpan::NONE);

    let stderr_layer = fmt::layer().with_writer(std::io::stderr).compact();

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .init();

    tracing::info!(
        event_type = "app_lifecycle",
        action = "started",
        log_path = %path.display(),
        "Logging initialized"
    );

    LoggingGuard {
        _file_guard: file_guard,
    }
}

fn open_log_file(path: &PathBuf) -> File {
    if let Some(dir) = path.parent() {
        if let Err(e) = fs::create_dir_all(dir) {
            eprintln!("[LOGGING] Failed to create log directory: {}", e);
        }
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .unwrap_or_else(|e| {
            eprintln!("[LOGGING] Failed to open log file: {}", e);
            OpenOptions::new()
                .write(true)
                .open("/dev/null")
                .expect("Failed to open /dev/null")
        })
}

/// Path to the JSONL log file. Follows the config directory override so logs
/// land next to the configs they describe.
pub fn log_path() -> PathBuf {
    crate::config::Settings::default()
        .config_dir()
        .join("logs")
        .join(LOG_FILE_NAME)
}

/// Category-tagged log line; also mirrored into the in-memory ring.
pub fn log(category: &str, message: &str) {
    remember(category, message);
    tracing::info!(category = category, "{}", message);
}

fn remember(category: &str, message: &str) {
    if let Ok(mut ring) = ring().lock() {
        ring.push(format!("[{}] {}", category, message));
    }
}

/// Recent log lines, oldest first, for the diagnostics view.
pub fn get_recent_logs() -> Vec<String> {
    ring()
        .lock()
        .map(|r| r.lines.iter().cloned().collect())
        .unwrap_or_default()
}

/// Key dispatch outcome, at debug so chatty typing stays out of info logs.
pub fn log_key_event(key: char, outcome: &str) {
    remember("KEY", &format!("'{}' -> {}", key, outcome));
    tracing::debug!(
        event_type = "key_event",
        key = %key,
        outcome = outcome,
        "Key '{}' {}", key, outcome
    );
}

/// Capture layer transition (failover, recovery).
pub fn log_capture_event(action: &str, detail: &str) {
    remember("CAPTURE", &format!("{} {}", action, detail));
    tracing::info!(
        event_type = "capture_event",
        action = action,
        detail = detail,
        "Capture {} {}", action, detail
    );
}
