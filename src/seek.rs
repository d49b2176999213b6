use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

use crate::formats::{CommitLog, LogError};

/// Advances `log` until a commit stamped at or after `target` is found,
/// then pushes it back so the consumer sees it as the first commit.
/// Returns false when the log ran out, or shutdown was requested, first.
pub async fn seek_to(
    log: &mut dyn CommitLog,
    target: i64,
    shutdown: &AtomicBool,
) -> Result<bool, LogError> {
    while !shutdown.load(Ordering::Relaxed) && !log.is_finished() {
        let commit = match log.next_commit().await? {
            Some(commit) => commit,
            None => continue,
        };
        if commit.timestamp >= target {
            debug!(
                "first commit at or after {} is stamped {}",
                target, commit.timestamp
            );
            log.buffer_commit(commit);
            return Ok(true);
        }
    }
    Ok(false)
}
