use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::formats::{CommitLog, FormatRegistry};
use crate::probe::{self, ProbeError};
use crate::seek;

/// Resolution progress. Transitions are monotonic:
/// Startup -> Fetching -> Success | Failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ResolveStatus {
    Startup = 0,
    Fetching = 1,
    Success = 2,
    Failure = 3,
}

impl ResolveStatus {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Startup,
            1 => Self::Fetching,
            2 => Self::Success,
            _ => Self::Failure,
        }
    }
}

/// Immutable snapshot of everything the worker needs. Taken at spawn time
/// so the worker never reads shared mutable settings.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub path: String,
    /// Declared format; empty means auto-detect.
    pub log_format: String,
    /// Deliver commits at or after this epoch timestamp; 0 means unset.
    pub start_timestamp: i64,
    /// Consumers stop after this epoch timestamp; 0 means unset.
    pub stop_timestamp: i64,
    /// True when the path came from the built-in default rather than the user.
    pub default_path: bool,
    /// When set and probing the default path fails without a declared
    /// format, the presence of this binary clears the error text so the
    /// frontend can fall through to its usage help.
    pub companion: Option<PathBuf>,
}

struct Shared {
    status: AtomicU8,
    error: Mutex<String>,
    log: Mutex<Option<Box<dyn CommitLog>>>,
}

/// Resolves a commit log source on a background task. One resolver is one
/// resolution attempt: the caller polls `status`/`is_finished`, then takes
/// ownership of the opened log with `take_log`.
pub struct LogResolver {
    shared: Arc<Shared>,
    shutdown: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl LogResolver {
    pub fn spawn(settings: Settings, shutdown: Arc<AtomicBool>) -> Self {
        Self::spawn_with(settings, shutdown, FormatRegistry::builtin())
    }

    pub fn spawn_with(
        settings: Settings,
        shutdown: Arc<AtomicBool>,
        registry: FormatRegistry,
    ) -> Self {
        let shared = Arc::new(Shared {
            status: AtomicU8::new(ResolveStatus::Startup as u8),
            error: Mutex::new(String::new()),
            log: Mutex::new(None),
        });

        let worker = {
            let shared = shared.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                run(shared, settings, shutdown, registry).await;
            })
        };

        Self {
            shared,
            shutdown,
            worker: Some(worker),
        }
    }

    /// Non-blocking read of the current state.
    pub fn status(&self) -> ResolveStatus {
        ResolveStatus::from_u8(self.shared.status.load(Ordering::Acquire))
    }

    pub fn is_finished(&self) -> bool {
        self.status() > ResolveStatus::Fetching
    }

    /// Human-readable error text; empty when none occurred (or none yet).
    pub fn error(&self) -> String {
        self.shared.error.lock().unwrap().clone()
    }

    /// Waits for the worker to finish, then hands over the resolved log.
    /// Ownership moves out exactly once; later calls return None.
    pub async fn take_log(&mut self) -> Option<Box<dyn CommitLog>> {
        self.join().await;
        self.shared.log.lock().unwrap().take()
    }

    /// Requests cooperative cancellation and waits for the worker to wind
    /// down. Idempotent.
    pub async fn abort(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        self.join().await;
    }

    async fn join(&mut self) {
        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.await {
                warn!("resolver worker failed: {}", e);
            }
        }
    }
}

impl Drop for LogResolver {
    fn drop(&mut self) {
        // Drop cannot join an async task; signal the worker instead. It
        // holds its own Arc of the shared state and releases the log
        // handle when it winds down.
        if self.worker.is_some() {
            self.shutdown.store(true, Ordering::Relaxed);
        }
    }
}

async fn run(
    shared: Arc<Shared>,
    settings: Settings,
    shutdown: Arc<AtomicBool>,
    registry: FormatRegistry,
) {
    shared
        .status
        .store(ResolveStatus::Fetching as u8, Ordering::Release);

    let mut log = None;

    match probe::probe(&registry, &settings.path, &settings.log_format, &shutdown).await {
        Ok(Some(l)) => log = Some(l),
        Ok(None) => {}
        // an unknown declared format classifies like any failed probe
        Err(e @ ProbeError::UnsupportedFormat(_)) => warn!("{}", e),
        Err(e) => *shared.error.lock().unwrap() = e.to_string(),
    }

    // find the first commit at or after the start timestamp, if set
    if let Some(log) = log.as_mut() {
        if settings.start_timestamp != 0 {
            match seek::seek_to(log.as_mut(), settings.start_timestamp, &shutdown).await {
                Ok(found) => debug!(
                    "seek to {}: {}",
                    settings.start_timestamp,
                    if found { "found" } else { "exhausted" }
                ),
                // a failed seek never reverts a validated log to Failure
                Err(e) => warn!("seek to start timestamp failed: {}", e),
            }
        }
    }

    {
        let mut error = shared.error.lock().unwrap();
        if log.is_none() && error.is_empty() {
            *error = classify_failure(&settings);
        }
    }

    let status = if log.is_some() {
        ResolveStatus::Success
    } else {
        ResolveStatus::Failure
    };
    *shared.log.lock().unwrap() = log;
    shared.status.store(status as u8, Ordering::Release);
}

fn classify_failure(settings: &Settings) -> String {
    if Path::new(&settings.path).is_dir() {
        if !settings.log_format.is_empty() {
            if settings.start_timestamp != 0 || settings.stop_timestamp != 0 {
                "failed to generate log file for the specified time period".to_string()
            } else {
                "failed to generate log file".to_string()
            }
        } else if settings.default_path && companion_exists(settings) {
            // leave the error empty so the frontend falls through to its
            // usage help instead of reporting a hard failure
            String::new()
        } else {
            "directory not supported".to_string()
        }
    } else {
        "unsupported log format (you may need to regenerate your log file)".to_string()
    }
}

fn companion_exists(settings: &Settings) -> bool {
    settings
        .companion
        .as_deref()
        .map(Path::exists)
        .unwrap_or(false)
}
