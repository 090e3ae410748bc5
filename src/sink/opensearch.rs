use crate::record::LogRecord;

use super::{Error, LogSink, Result};

/// Indexes every record as a single document into an OpenSearch index.
#[derive(Debug, Clone)]
pub struct OpenSearchSink {
    client: reqwest::Client,
    doc_url: String,
}

impl OpenSearchSink {
    /// Creates a sink writing to `index` of the cluster reachable at `base_url`.
    ///
    /// # Arguments
    ///
    /// * `client` - Shared HTTP client; timeouts are configured on the client.
    /// * `base_url` - Cluster root, e.g. `http://localhost:9200`.
    /// * `index` - Target index name.
    pub fn new(client: reqwest::Client, base_url: &str, index: &str) -> Self {
        Self {
            client,
            doc_url: format!("{}/{}/_doc", base_url.trim_end_matches('/'), index),
        }
    }

    pub fn doc_url(&self) -> &str {
        &self.doc_url
    }
}

impl LogSink for OpenSearchSink {
    /// Sends `record` as the body of an index request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Request`] if the request cannot be sent and [`Error::Rejected`] if
    /// the cluster answers with a non-success status.
    async fn index_log(&self, record: &LogRecord) -> Result<()> {
        let response = self
            .client
            .post(&self.doc_url)
            .json(record)
            .send()
            .await
            .map_err(|source| Error::Request {
                url: self.doc_url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Rejected {
                url: self.doc_url.clone(),
                status,
                body,
            });
        }

        log::trace!(
            "indexed record: container_id={}, status={}",
            record.container_id(),
            status
        );
        Ok(())
    }
}
