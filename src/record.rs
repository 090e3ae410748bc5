use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The output stream a log line was written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stream {
    #[default]
    Stdout,
    Stderr,
}

impl Stream {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stream::Stdout => "stdout",
            Stream::Stderr => "stderr",
        }
    }
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single structured log line of a container, ready to be indexed.
///
/// Serializes to the document shape stored in the search backend:
///
/// ```json
/// {"containerId":"…","serviceName":"…","stream":"stdout","message":"…","timestamp":"2024-05-01T10:00:00.123Z"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    container_id: Arc<str>,
    service_name: Arc<str>,
    stream: Stream,
    message: String,
    timestamp: DateTime<Utc>,
}

impl LogRecord {
    pub fn new(
        container_id: Arc<str>,
        service_name: Arc<str>,
        stream: Stream,
        message: String,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            container_id,
            service_name,
            stream,
            message,
            timestamp,
        }
    }

    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn stream(&self) -> Stream {
        self.stream
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}
