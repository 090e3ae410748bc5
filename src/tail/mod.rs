//! Tailing of container log files.
//!
//! The [`TailSupervisor`] is the entry point: it is told about container directories and
//! guarantees that every canonical log file is followed by exactly one [`LogFileReader`]
//! at a time. The [`TailRegistry`] is the single source of truth for which files are
//! currently tailed.
//!
//! # Policies
//!
//! - [`TailPolicy::ReplayThenTail`] (default): rotated segments (`<id>-json.log.*`,
//!   ordered by name) are read completely, then the canonical file is read from its
//!   first byte and followed. The canonical file is read as one continuous stream, so
//!   there is no gap or overlap between history and live data.
//! - [`TailPolicy::TailOnly`]: only lines appended after the reader opened the
//!   canonical file are forwarded.
//!
//! A file that vanishes from its path (renamed away or deleted) is drained through the
//! open handle. The tail then waits [`TailConfig::reappear_timeout`] for a new file at
//! the same path before it ends.
//!
//! Offsets live in memory only; after a restart the policy is applied from scratch.
mod error;
mod reader;
mod registry;
mod supervisor;
mod wait;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub use error::{Error, Result};
pub use reader::{LogFileReader, StartPosition, TailExit};
pub use registry::{Registration, TailRegistry};
pub use supervisor::TailSupervisor;
pub use wait::{WaitOutcome, wait_for_file};

/// Interval between two reads of a log file that has no new complete line.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// How long a container's log file may take to appear before the wait is abandoned.
pub const DEFAULT_FILE_WAIT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// How long a log file that vanished from its path may take to be recreated.
pub const DEFAULT_REAPPEAR_TIMEOUT: Duration = Duration::from_secs(5);

/// Longest line, in bytes without the newline, that is forwarded.
pub const DEFAULT_MAX_LINE_LEN: usize = 1024 * 1024;

/// Where tailing of a newly discovered container starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TailPolicy {
    /// Replay rotated segments and the whole canonical file, then follow it.
    #[default]
    ReplayThenTail,
    /// Start at the current end of the canonical file.
    TailOnly,
}

impl FromStr for TailPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "replay" | "replay-then-tail" => Ok(Self::ReplayThenTail),
            "tail" | "tail-only" => Ok(Self::TailOnly),
            other => Err(format!(
                "unknown tail policy `{other}`, expected `replay` or `tail`"
            )),
        }
    }
}

/// Lifecycle state of a tail task as seen through the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailMode {
    WaitingForFile,
    ReplayingHistory,
    Live,
    /// Reported for files without a registered task.
    Stopped,
}

impl fmt::Display for TailMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TailMode::WaitingForFile => "waiting-for-file",
            TailMode::ReplayingHistory => "replaying-history",
            TailMode::Live => "live",
            TailMode::Stopped => "stopped",
        })
    }
}

/// Settings shared by all tail tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TailConfig {
    pub policy: TailPolicy,
    pub poll_interval: Duration,
    pub file_wait_timeout: Duration,
    pub reappear_timeout: Duration,
    /// Lines longer than this are dropped with a warning.
    pub max_line_len: usize,
}

impl Default for TailConfig {
    fn default() -> Self {
        Self {
            policy: TailPolicy::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            file_wait_timeout: DEFAULT_FILE_WAIT_TIMEOUT,
            reappear_timeout: DEFAULT_REAPPEAR_TIMEOUT,
            max_line_len: DEFAULT_MAX_LINE_LEN,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tail_policy_from_str() {
        assert_eq!("replay".parse(), Ok(TailPolicy::ReplayThenTail));
        assert_eq!("Tail-Only".parse(), Ok(TailPolicy::TailOnly));
        assert!("latest".parse::<TailPolicy>().is_err());
    }
}
