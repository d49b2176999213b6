use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Resolve the log source in the current directory when no path is given.
const DEFAULT_PATH: &str = ".";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub log_format: String,
    #[serde(default)]
    pub start_date: String,
    #[serde(default)]
    pub stop_date: String,
    #[serde(default)]
    pub companion: Option<PathBuf>,
}

#[derive(Parser, Debug)]
#[command(name = "logresolve")]
#[command(about = "Resolve and stream a commit log from a file, directory or stdin", long_about = None)]
pub struct Args {
    /// Log source to resolve ("-" reads standard input)
    pub path: Option<String>,

    /// Path to configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Declared log format (custom, jsonl); auto-detected when omitted
    #[arg(long, env = "LOG_FORMAT")]
    pub log_format: Option<String>,

    /// First commit date, "YYYY-MM-DD" or "YYYY-MM-DD HH:MM:SS"
    #[arg(long)]
    pub start_date: Option<String>,

    /// Last commit date
    #[arg(long)]
    pub stop_date: Option<String>,

    /// Companion binary whose presence downgrades a failed auto-detect on
    /// the default path to a silent failure (usage-help fall-through)
    #[arg(long)]
    pub companion: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub path: String,
    pub default_path: bool,
    pub log_format: String,
    pub start_timestamp: i64,
    pub stop_timestamp: i64,
    pub companion: Option<PathBuf>,
    pub verbose: bool,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::from_args(Args::parse())
    }

    fn from_args(args: Args) -> Result<Self> {
        let mut file_config = FileConfig::default();
        if let Some(config_path) = &args.config {
            let content = std::fs::read_to_string(config_path)
                .with_context(|| format!("Failed to read config file: {:?}", config_path))?;
            file_config = serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", config_path))?;
        }

        // CLI args override the config file
        let (path, default_path) = match args.path {
            Some(path) => (path, false),
            None if !file_config.path.is_empty() => (file_config.path.clone(), false),
            None => (DEFAULT_PATH.to_string(), true),
        };

        let log_format = args
            .log_format
            .unwrap_or_else(|| file_config.log_format.clone());

        let start_date = args
            .start_date
            .unwrap_or_else(|| file_config.start_date.clone());
        let stop_date = args
            .stop_date
            .unwrap_or_else(|| file_config.stop_date.clone());

        Ok(Config {
            path,
            default_path,
            log_format,
            start_timestamp: parse_date(&start_date)
                .with_context(|| format!("Invalid start date: {}", start_date))?,
            stop_timestamp: parse_date(&stop_date)
                .with_context(|| format!("Invalid stop date: {}", stop_date))?,
            companion: args.companion.or(file_config.companion),
            verbose: args.verbose,
        })
    }
}

/// Epoch seconds for a date string; empty means unset (0).
fn parse_date(value: &str) -> Result<i64> {
    if value.is_empty() {
        return Ok(0);
    }
    let datetime = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S").or_else(|_| {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").map(|date| date.and_time(NaiveTime::MIN))
    })?;
    Ok(datetime.and_utc().timestamp())
}
