//! One-time setup of the search backend and its dashboards at startup.
//!
//! Every step is best effort: failures are logged and the forwarder starts anyway.
use std::time::Duration;

use serde_json::json;

use crate::config::{DashboardsConfig, OpenSearchConfig};

/// Field of the indexed documents used as time field of the index pattern.
pub const TIME_FIELD: &str = "timestamp";

const OPENSEARCH_READY_TIMEOUT: Duration = Duration::from_secs(30);
const DASHBOARDS_READY_TIMEOUT: Duration = Duration::from_secs(60);
const READY_POLL_INTERVAL: Duration = Duration::from_secs(3);
const XSRF_HEADER: &str = "osd-xsrf";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("request to `{url}` failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("unexpected status {status} from `{url}`: {body}")]
    UnexpectedStatus {
        url: String,
        status: reqwest::StatusCode,
        body: String,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Whether [`Bootstrapper::ensure_index`] had to create the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexStatus {
    Created,
    Existing,
}

/// Creates the log index and registers it with the dashboards.
#[derive(Debug, Clone)]
pub struct Bootstrapper {
    client: reqwest::Client,
    opensearch_url: String,
    dashboards_url: String,
    index: String,
    opensearch_ready_timeout: Duration,
    dashboards_ready_timeout: Duration,
    ready_poll_interval: Duration,
}

impl Bootstrapper {
    pub fn new(
        client: reqwest::Client,
        opensearch: &OpenSearchConfig,
        dashboards: &DashboardsConfig,
    ) -> Self {
        Self {
            client,
            opensearch_url: opensearch.base_url(),
            dashboards_url: dashboards.base_url(),
            index: opensearch.index.clone(),
            opensearch_ready_timeout: OPENSEARCH_READY_TIMEOUT,
            dashboards_ready_timeout: DASHBOARDS_READY_TIMEOUT,
            ready_poll_interval: READY_POLL_INTERVAL,
        }
    }

    /// Overrides how long each service may take to become ready and how often it is polled.
    pub fn with_ready_timeouts(
        mut self,
        opensearch: Duration,
        dashboards: Duration,
        poll_interval: Duration,
    ) -> Self {
        self.opensearch_ready_timeout = opensearch;
        self.dashboards_ready_timeout = dashboards;
        self.ready_poll_interval = poll_interval;
        self
    }

    /// Runs all setup steps in order. Never fails.
    pub async fn run(&self) {
        self.wait_until_ready("OpenSearch", &self.opensearch_url, self.opensearch_ready_timeout)
            .await;
        match self.ensure_index().await {
            Ok(IndexStatus::Created) => log::info!("Created index `{}`", self.index),
            Ok(IndexStatus::Existing) => log::info!("Index `{}` already exists", self.index),
            Err(err) => log::warn!("failed to ensure index `{}` exists: {}", self.index, err),
        }

        let status_url = format!("{}/api/status", self.dashboards_url);
        self.wait_until_ready("Dashboards", &status_url, self.dashboards_ready_timeout)
            .await;
        if let Err(err) = self.create_index_pattern().await {
            log::warn!("failed to create index pattern `{}`: {}", self.index, err);
        }
        if let Err(err) = self.set_default_index_pattern().await {
            log::warn!("failed to set default index pattern: {}", err);
        }
    }

    /// Polls `url` until it answers with a status below 500, at most `budget`.
    ///
    /// Returns whether the service became ready.
    pub async fn wait_until_ready(&self, name: &str, url: &str, budget: Duration) -> bool {
        log::info!("Waiting for {name} to become ready...");
        let deadline = tokio::time::Instant::now() + budget;
        loop {
            match self.client.get(url).send().await {
                Ok(response) if response.status().as_u16() < 500 => {
                    log::info!("{name} is ready");
                    return true;
                }
                Ok(response) => log::debug!("{name} answered {}", response.status()),
                Err(err) => log::debug!("{name} not reachable: {err}"),
            }
            if tokio::time::Instant::now() + self.ready_poll_interval > deadline {
                log::warn!("{name} did not become ready within {budget:?}");
                return false;
            }
            tokio::time::sleep(self.ready_poll_interval).await;
        }
    }

    /// Creates the log index unless it exists.
    ///
    /// # Errors
    ///
    /// Returns an error if OpenSearch cannot be reached or rejects a request.
    pub async fn ensure_index(&self) -> Result<IndexStatus> {
        let url = format!("{}/{}", self.opensearch_url, self.index);
        let response = self.send(self.client.head(&url), &url).await?;
        if response.status().is_success() {
            return Ok(IndexStatus::Existing);
        }
        if response.status() != reqwest::StatusCode::NOT_FOUND {
            return Err(unexpected(url, response).await);
        }

        let response = self.send(self.client.put(&url).json(&index_body()), &url).await?;
        if !response.status().is_success() {
            return Err(unexpected(url, response).await);
        }
        Ok(IndexStatus::Created)
    }

    /// Registers an index pattern named after the index, with [`TIME_FIELD`] as time field.
    ///
    /// An already existing pattern counts as success.
    ///
    /// # Errors
    ///
    /// Returns an error if the dashboards cannot be reached or answer neither 200 nor 409.
    pub async fn create_index_pattern(&self) -> Result<()> {
        let url = format!(
            "{}/api/saved_objects/index-pattern/{}",
            self.dashboards_url, self.index
        );
        let request = self
            .client
            .post(&url)
            .header(XSRF_HEADER, "true")
            .json(&index_pattern_body(&self.index));
        let response = self.send(request, &url).await?;
        match response.status().as_u16() {
            200 | 409 => {
                log::info!("Index pattern `{}` created or already exists", self.index);
                Ok(())
            }
            _ => Err(unexpected(url, response).await),
        }
    }

    /// Makes the index pattern the dashboards' default.
    ///
    /// # Errors
    ///
    /// Returns an error if the dashboards cannot be reached or do not answer 200.
    pub async fn set_default_index_pattern(&self) -> Result<()> {
        let url = format!(
            "{}/api/opensearch-dashboards/settings/defaultIndex",
            self.dashboards_url
        );
        let request = self
            .client
            .post(&url)
            .header(XSRF_HEADER, "true")
            .json(&json!({ "value": self.index }));
        let response = self.send(request, &url).await?;
        if response.status() != reqwest::StatusCode::OK {
            return Err(unexpected(url, response).await);
        }
        log::info!("Default index pattern set to `{}`", self.index);
        Ok(())
    }

    async fn send(&self, request: reqwest::RequestBuilder, url: &str) -> Result<reqwest::Response> {
        request.send().await.map_err(|source| Error::Request {
            url: url.to_owned(),
            source,
        })
    }
}

async fn unexpected(url: String, response: reqwest::Response) -> Error {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Error::UnexpectedStatus { url, status, body }
}

/// Settings and mappings of the log index.
pub fn index_body() -> serde_json::Value {
    json!({
        "settings": {
            "index": {
                "number_of_shards": 1,
                "number_of_replicas": 0
            }
        },
        "mappings": {
            "properties": {
                "containerId": { "type": "keyword" },
                "serviceName": { "type": "keyword" },
                "stream": { "type": "keyword" },
                "message": { "type": "text" },
                "timestamp": { "type": "date" }
            }
        }
    })
}

pub fn index_pattern_body(index: &str) -> serde_json::Value {
    json!({
        "attributes": {
            "title": index,
            "timeFieldName": TIME_FIELD
        }
    })
}
