/// Errors that make a single log line unusable.
///
/// All variants are recoverable: the caller drops the line and continues with the next.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("malformed log line: {0}")]
    Json(#[from] serde_json::Error),
    #[error("log line has no `time` field")]
    MissingTimestamp,
    #[error("invalid timestamp `{value}`: {source}")]
    InvalidTimestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },
    #[error("unknown stream `{0}`")]
    UnknownStream(String),
}

pub type Result<T> = std::result::Result<T, ParseError>;
