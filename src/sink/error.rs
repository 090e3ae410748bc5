#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to send record to `{url}`: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("search backend rejected record at `{url}` with status {status}: {body}")]
    Rejected {
        url: String,
        status: reqwest::StatusCode,
        body: String,
    },
    #[cfg(test)]
    #[error("sink unavailable")]
    Unavailable,
}

pub type Result<T> = std::result::Result<T, Error>;
