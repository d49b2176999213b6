use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::VecDeque;

use super::{Commit, CommitLog, FileChange, LineReader, LogError, LogInput};

// Example: 1275543595|andrew|A|src/main.rs|00FF00
static LINE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d+)\|([^|]*)\|([ADM])\|([^|]+?)(?:\|#?[0-9A-Fa-f]{6})?$").unwrap()
});

/// Pipe-delimited commit log: `timestamp|author|action|path` with an
/// optional trailing colour field.
pub struct CustomLog {
    reader: LineReader,
    buffered: VecDeque<Commit>,
}

impl CustomLog {
    pub fn new(input: LogInput) -> Self {
        Self {
            reader: LineReader::new(input),
            buffered: VecDeque::new(),
        }
    }
}

fn parse_line(line: &str) -> Result<Option<Commit>, LogError> {
    let caps = match LINE_REGEX.captures(line) {
        Some(caps) => caps,
        None => return Ok(None),
    };
    let timestamp = caps[1].parse::<i64>().map_err(|_| {
        LogError::Application(format!("commit timestamp out of range: {}", &caps[1]))
    })?;

    Ok(Some(Commit {
        timestamp,
        author: caps[2].to_string(),
        files: vec![FileChange {
            action: caps[3].to_string(),
            path: caps[4].to_string(),
        }],
    }))
}

#[async_trait]
impl CommitLog for CustomLog {
    fn name(&self) -> &str {
        "custom"
    }

    async fn check_format(&mut self) -> Result<bool, LogError> {
        let line = match self.reader.next_line().await? {
            Some(line) => line,
            None => return Ok(false),
        };
        match parse_line(&line)? {
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
            match parse_line(&line)? {
                Some(commit) => return Ok(Some(commit)),
                None => tracing::debug!("skipping unparsable custom log line: {}", line),
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line() {
        let commit = parse_line("1275543595|andrew|A|src/main.rs").unwrap().unwrap();
        assert_eq!(commit.timestamp, 1275543595);
        assert_eq!(commit.author, "andrew");
        assert_eq!(commit.files[0].action, "A");
        assert_eq!(commit.files[0].path, "src/main.rs");
    }

    #[test]
    fn test_parse_line_with_colour() {
        let commit = parse_line("10|bob|M|lib.rs|#00FF00").unwrap().unwrap();
        assert_eq!(commit.timestamp, 10);
        assert_eq!(commit.files[0].path, "lib.rs");
    }

    #[test]
    fn test_parse_line_rejects_garbage() {
        assert!(parse_line("not a log line").unwrap().is_none());
        assert!(parse_line("abc|bob|M|lib.rs").unwrap().is_none());
        assert!(parse_line("10|bob|X|lib.rs").unwrap().is_none());
        assert!(parse_line("{\"timestamp\":10}").unwrap().is_none());
    }

    #[test]
    fn test_parse_line_timestamp_out_of_range() {
        let err = parse_line("99999999999999999999|bob|M|lib.rs").unwrap_err();
        assert!(matches!(err, LogError::Application(_)));
        assert!(err.to_string().contains("out of range"));
    }

    #[tokio::test]
    async fn test_check_format_buffers_first_commit() {
        let input = LogInput::Bytes(b"5|alice|A|a.txt\n10|bob|M|b.txt\n".to_vec());
        let mut log = CustomLog::new(input);

        assert!(log.check_format().await.unwrap());

        // The probed commit is re-delivered first
        let first = log.next_commit().await.unwrap().unwrap();
        assert_eq!(first.timestamp, 5);
        let second = log.next_commit().await.unwrap().unwrap();
        assert_eq!(second.timestamp, 10);
        assert_eq!(log.next_commit().await.unwrap().map(|c| c.timestamp), None);
        assert!(log.is_finished());
    }

    #[tokio::test]
    async fn test_check_format_rejects_other_format() {
        let input = LogInput::Bytes(b"{\"timestamp\":5,\"author\":\"alice\"}\n".to_vec());
        let mut log = CustomLog::new(input);
        assert!(!log.check_format().await.unwrap());
    }

    #[tokio::test]
    async fn test_next_commit_skips_malformed_lines() {
        let input = LogInput::Bytes(b"5|alice|A|a.txt\ngarbage\n10|bob|D|b.txt\n".to_vec());
        let mut log = CustomLog::new(input);

        assert_eq!(log.next_commit().await.unwrap().unwrap().timestamp, 5);
        assert_eq!(log.next_commit().await.unwrap().unwrap().timestamp, 10);
        assert!(log.next_commit().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_buffer_commit_redelivers() {
        let input = LogInput::Bytes(b"5|alice|A|a.txt\n".to_vec());
        let mut log = CustomLog::new(input);

        let commit = log.next_commit().await.unwrap().unwrap();
        log.buffer_commit(commit);
        assert!(!log.is_finished());
        assert_eq!(log.next_commit().await.unwrap().unwrap().timestamp, 5);
    }
}
