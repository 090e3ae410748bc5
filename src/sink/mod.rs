mod error;
#[cfg(test)]
pub(crate) mod memory;
mod opensearch;

use crate::record::LogRecord;

pub use error::{Error, Result};
pub use opensearch::OpenSearchSink;

/// Destination of finished log records.
///
/// Tail loops await every call before reading the next line, so records of one container
/// reach the sink in file order. Implementations own their retry policy; a returned error
/// is logged by the caller and the record is dropped.
pub trait LogSink: Send + Sync + 'static {
    fn index_log(&self, record: &LogRecord) -> impl std::future::Future<Output = Result<()>> + Send;
}
