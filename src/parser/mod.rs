//! Decoding of the container runtime's json-file log format.
//!
//! Every line of a container log file is a standalone JSON object:
//!
//! ```json
//! {"log":"GET /health 200\n","stream":"stdout","time":"2024-05-01T10:00:00.123456789Z"}
//! ```
//!
//! [`parse_line`] turns one such line into a [`LogRecord`].
mod error;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::record::{LogRecord, Stream};

pub use error::{ParseError, Result};

#[derive(Debug, Deserialize)]
struct RawLine {
    #[serde(default)]
    log: Option<String>,
    #[serde(default)]
    stream: Option<String>,
    #[serde(default)]
    time: Option<String>,
}

/// Parses a single raw log line into a [`LogRecord`].
///
/// The message has trailing whitespace (including the newline the runtime stores inside
/// the `log` value) removed; newlines embedded in the value are kept. A missing `stream`
/// defaults to [`Stream::Stdout`].
///
/// # Arguments
///
/// * `line` - The raw line without its terminating newline.
/// * `container_id` - Id of the container the line belongs to.
/// * `service_name` - Resolved service name of the container.
///
/// # Errors
///
/// Returns a [`ParseError`] if the line is not a JSON object of the expected shape, the
/// timestamp is missing or not RFC 3339, or the stream is neither `stdout` nor `stderr`.
///
/// # Example
///
/// ```
/// # use creo_log_forwarder::parser::parse_line;
/// let line = br#"{"log":"hello\n","stream":"stderr","time":"2024-05-01T10:00:00.5Z"}"#;
/// let record = parse_line(line, &"c1".into(), &"web".into()).unwrap();
/// assert_eq!(record.message(), "hello");
/// assert_eq!(record.stream().as_str(), "stderr");
/// ```
pub fn parse_line(
    line: &[u8],
    container_id: &Arc<str>,
    service_name: &Arc<str>,
) -> Result<LogRecord> {
    let raw: RawLine = serde_json::from_slice(line)?;

    let stream = match raw.stream.as_deref() {
        None | Some("stdout") => Stream::Stdout,
        Some("stderr") => Stream::Stderr,
        Some(other) => return Err(ParseError::UnknownStream(other.to_owned())),
    };

    let time = raw.time.ok_or(ParseError::MissingTimestamp)?;
    let timestamp = parse_timestamp(&time)?;

    let mut message = raw.log.unwrap_or_default();
    let trimmed_len = message.trim_end().len();
    message.truncate(trimmed_len);

    Ok(LogRecord::new(
        Arc::clone(container_id),
        Arc::clone(service_name),
        stream,
        message,
        timestamp,
    ))
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|source| ParseError::InvalidTimestamp {
            value: value.to_owned(),
            source,
        })
}
