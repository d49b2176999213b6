use async_trait::async_trait;
use std::collections::VecDeque;

use super::{Commit, CommitLog, LineReader, LogError, LogInput};

/// JSON-lines commit log: one commit object per line with at least a
/// `timestamp` field.
pub struct JsonlLog {
    reader: LineReader,
    buffered: VecDeque<Commit>,
}

impl JsonlLog {
    pub fn new(input: LogInput) -> Self {
        Self {
            reader: LineReader::new(input),
            buffered: VecDeque::new(),
        }
    }
}

fn parse_line(line: &str) -> Option<Commit> {
    serde_json::from_str(line).ok()
}

#[async_trait]
impl CommitLog for JsonlLog {
    fn name(&self) -> &str {
        "jsonl"
    }

    async fn check_format(&mut self) -> Result<bool, LogError> {
        let line = match self.reader.next_line().await? {
            Some(line) => line,
            None => return Ok(false),
        };
        match parse_line(&line) {
            Some(commit) => {
                self.buffered.push_back(commit);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn next_commit(&mut self) -> Result<Option<Commit>, LogError> {
        if let Some(commit) = self.buffered.pop_front() {
            return Ok(Some(commit));
        }
        while let Some(line) = self.reader.next_line().await? {
            match parse_line(&line) {
                Some(commit) => return Ok(Some(commit)),
                None => tracing::debug!("skipping unparsable jsonl line: {}", line),
            }
        }
        Ok(None)
    }

    fn buffer_commit(&mut self, commit: Commit) {
        self.buffered.push_front(commit);
    }

    fn is_finished(&self) -> bool {
        self.buffered.is_empty() && self.reader.finished()
    }
}
