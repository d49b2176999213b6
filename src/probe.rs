use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

use crate::formats::{CommitLog, FormatRegistry, LogError, LogInput};

/// Path sentinel meaning "read from standard input".
pub const STDIN_PATH: &str = "-";

#[derive(Debug, Error)]
pub enum ProbeError {
    /// A candidate format failed at the I/O level while reading the source.
    #[error("unable to read log file")]
    Seek(#[source] std::io::Error),
    /// A lower-level component failed with its own message.
    #[error("{0}")]
    Application(String),
    /// The declared format names no known variant.
    #[error("unsupported log format: {0}")]
    UnsupportedFormat(String),
}

impl From<LogError> for ProbeError {
    fn from(err: LogError) -> Self {
        match err {
            LogError::Seek(e) => ProbeError::Seek(e),
            LogError::Application(msg) => ProbeError::Application(msg),
        }
    }
}

/// Finds the first format variant that validates `path`, trying only the
/// declared format when one is given. Stdin is collected once up front so
/// every candidate sees the full stream.
pub async fn probe(
    registry: &FormatRegistry,
    path: &str,
    format_hint: &str,
    shutdown: &AtomicBool,
) -> Result<Option<Box<dyn CommitLog>>, ProbeError> {
    let input = if path == STDIN_PATH {
        let mut buffer = Vec::new();
        tokio::io::stdin()
            .read_to_end(&mut buffer)
            .await
            .map_err(ProbeError::Seek)?;
        LogInput::Bytes(buffer)
    } else {
        if format_hint.is_empty() && !Path::new(path).is_file() {
            warn!("no format declared and {} is not a readable log file", path);
        }
        LogInput::Path(PathBuf::from(path))
    };

    probe_input(registry, input, format_hint, shutdown).await
}

/// Probe over an already-materialized input.
pub async fn probe_input(
    registry: &FormatRegistry,
    input: LogInput,
    format_hint: &str,
    shutdown: &AtomicBool,
) -> Result<Option<Box<dyn CommitLog>>, ProbeError> {
    if !format_hint.is_empty() {
        debug!("log format declared as {}", format_hint);

        let build = registry
            .get(format_hint)
            .ok_or_else(|| ProbeError::UnsupportedFormat(format_hint.to_string()))?;

        let mut log = build(input);
        if log.check_format().await? {
            return Ok(Some(log));
        }
        return Ok(None);
    }

    // try each variant in priority order until one validates
    for (name, build) in registry.iter() {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }
        debug!("trying {} format", name);

        let mut log = build(input.clone());
        if log.check_format().await? {
            return Ok(Some(log));
        }
        // rejected handle is dropped before the next variant is attempted
    }
    Ok(None)
}
