mod config;
mod formats;
mod probe;
mod resolver;
mod seek;

use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use resolver::{LogResolver, Settings};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cfg = config::Config::load()?;

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupt received, shutting down");
                shutdown.store(true, Ordering::Relaxed);
            }
        });
    }

    let settings = Settings {
        path: cfg.path.clone(),
        log_format: cfg.log_format.clone(),
        start_timestamp: cfg.start_timestamp,
        stop_timestamp: cfg.stop_timestamp,
        default_path: cfg.default_path,
        companion: cfg.companion.clone(),
    };

    let mut resolver = LogResolver::spawn(settings, shutdown.clone());

    while !resolver.is_finished() {
        if shutdown.load(Ordering::Relaxed) {
            resolver.abort().await;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let mut log = match resolver.take_log().await {
        Some(log) => log,
        None => {
            let error = resolver.error();
            if error.is_empty() {
                // suppressed failure: nothing to stream, nothing to report
                return Ok(());
            }
            anyhow::bail!(error);
        }
    };

    if cfg.verbose {
        tracing::info!("resolved {} as a {} log", cfg.path, log.name());
    }

    while !shutdown.load(Ordering::Relaxed) {
        let commit = match log.next_commit().await {
            Ok(Some(commit)) => commit,
            Ok(None) => break,
            Err(e) => {
                tracing::error!("error reading commit: {}", e);
                break;
            }
        };
        if cfg.stop_timestamp != 0 && commit.timestamp > cfg.stop_timestamp {
            break;
        }
        println!("{}", serde_json::to_string(&commit)?);
    }

    Ok(())
}
