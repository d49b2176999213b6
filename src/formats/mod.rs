use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::path::PathBuf;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};

pub mod custom;
pub mod jsonl;

/// Failure raised by a commit log while reading its source.
#[derive(Debug, Error)]
pub enum LogError {
    /// The source could not be read at the I/O level after it was opened.
    #[error("unable to read log file")]
    Seek(#[from] std::io::Error),
    /// A descriptive failure from the format itself.
    #[error("{0}")]
    Application(String),
}

/// A single unit of commit history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Commit {
    pub timestamp: i64,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub files: Vec<FileChange>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileChange {
    pub action: String,
    pub path: String,
}

/// Where a commit log reads from: a file on disk, or bytes already
/// collected from standard input (stdin can only be consumed once, so
/// the probe buffers it and every candidate gets its own cursor).
#[derive(Debug, Clone)]
pub enum LogInput {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

impl LogInput {
    async fn open(&self) -> std::io::Result<Box<dyn AsyncBufRead + Unpin + Send>> {
        match self {
            LogInput::Path(path) => {
                // Opening a directory succeeds on Linux and only the first
                // read fails; reject it here so a directory is unopenable
                // rather than a read failure.
                let metadata = tokio::fs::metadata(path).await?;
                if !metadata.is_file() {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        format!("not a regular file: {}", path.display()),
                    ));
                }
                let file = File::open(path).await?;
                Ok(Box::new(BufReader::new(file)))
            }
            LogInput::Bytes(bytes) => Ok(Box::new(BufReader::new(Cursor::new(bytes.clone())))),
        }
    }
}

#[async_trait]
pub trait CommitLog: Send {
    /// Returns the format identifier of this log
    fn name(&self) -> &str;

    /// Lightweight structural check: reads the first record and buffers it
    /// for re-delivery. Ok(false) means the source is not this format.
    async fn check_format(&mut self) -> Result<bool, LogError>;

    /// Next commit record, or None once the source is exhausted
    async fn next_commit(&mut self) -> Result<Option<Commit>, LogError>;

    /// Push back an already-read commit so it is the next one delivered
    fn buffer_commit(&mut self, commit: Commit);

    fn is_finished(&self) -> bool;
}

/// Shared line-reading state for the text-based format variants.
pub(crate) struct LineReader {
    input: LogInput,
    lines: Option<Lines<Box<dyn AsyncBufRead + Unpin + Send>>>,
    finished: bool,
}

impl LineReader {
    pub(crate) fn new(input: LogInput) -> Self {
        Self {
            input,
            lines: None,
            finished: false,
        }
    }

    /// Opens the underlying input on first use. Returns false when the
    /// source cannot be opened at all (missing file, directory, permission
    /// denied) so the variant can report "not my format" instead of a read
    /// failure.
    pub(crate) async fn open(&mut self) -> bool {
        if self.lines.is_some() {
            return true;
        }
        match self.input.open().await {
            Ok(reader) => {
                self.lines = Some(reader.lines());
                true
            }
            Err(e) => {
                tracing::debug!("cannot open log source: {}", e);
                self.finished = true;
                false
            }
        }
    }

    /// Next non-blank line, or None at end of input.
    pub(crate) async fn next_line(&mut self) -> Result<Option<String>, LogError> {
        if self.finished || !self.open().await {
            return Ok(None);
        }
        let lines = match self.lines.as_mut() {
            Some(lines) => lines,
            None => return Ok(None),
        };
        loop {
            match lines.next_line().await? {
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => return Ok(Some(line)),
                None => {
                    self.finished = true;
                    return Ok(None);
                }
            }
        }
    }

    pub(crate) fn finished(&self) -> bool {
        self.finished
    }
}

pub type BuildLog = Box<dyn Fn(LogInput) -> Box<dyn CommitLog> + Send + Sync>;

/// Known format variants in probing priority order.
pub struct FormatRegistry {
    entries: Vec<(&'static str, BuildLog)>,
}

impl FormatRegistry {
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// The built-in variants, highest priority first.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register("custom", |input| Box::new(custom::CustomLog::new(input)));
        registry.register("jsonl", |input| Box::new(jsonl::JsonlLog::new(input)));
        registry
    }

    pub fn register<F>(&mut self, name: &'static str, build: F)
    where
        F: Fn(LogInput) -> Box<dyn CommitLog> + Send + Sync + 'static,
    {
        self.entries.push((name, Box::new(build)));
    }

    pub fn get(&self, name: &str) -> Option<&BuildLog> {
        self.entries
            .iter()
            .find(|(entry_name, _)| *entry_name == name)
            .map(|(_, build)| build)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &BuildLog)> + '_ {
        self.entries.iter().map(|(name, build)| (*name, build))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::VecDeque;

    /// In-memory commit log for exercising the probe, seeker and resolver.
    pub(crate) struct MemoryLog {
        validates: bool,
        commits: VecDeque<Commit>,
        finished: bool,
    }

    impl MemoryLog {
        pub(crate) fn new(timestamps: &[i64]) -> Self {
            let commits = timestamps
                .iter()
                .map(|&timestamp| Commit {
                    timestamp,
                    author: "test".to_string(),
                    files: Vec::new(),
                })
                .collect();
            Self {
                validates: true,
                commits,
                finished: false,
            }
        }

        pub(crate) fn rejecting() -> Self {
            let mut log = Self::new(&[]);
            log.validates = false;
            log
        }
    }

    #[async_trait]
    impl CommitLog for MemoryLog {
        fn name(&self) -> &str {
            "memory"
        }

        async fn check_format(&mut self) -> Result<bool, LogError> {
            Ok(self.validates)
        }

        async fn next_commit(&mut self) -> Result<Option<Commit>, LogError> {
            match self.commits.pop_front() {
                Some(commit) => Ok(Some(commit)),
                None => {
                    self.finished = true;
                    Ok(None)
                }
            }
        }

        fn buffer_commit(&mut self, commit: Commit) {
            self.commits.push_front(commit);
        }

        fn is_finished(&self) -> bool {
            self.finished && self.commits.is_empty()
        }
    }
}
