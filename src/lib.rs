use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use bootstrap::Bootstrapper;
use config::Config;
use discovery::Discoverer;
use sink::OpenSearchSink;
use tail::TailSupervisor;

/// Creo Log Forwarder: follows the json log files of all containers of a Docker host and
/// indexes every line as a structured document into OpenSearch.
///
/// Containers are discovered below the runtime's containers directory (e.g.
/// `/var/lib/docker/containers`), each log file is tailed by exactly one task, and every
/// line is parsed into a [`record::LogRecord`] before it is handed to a [`sink::LogSink`].
pub mod bootstrap;
pub mod config;
pub mod container;
pub mod discovery;
pub mod error;
pub mod fsutil;
pub mod parser;
pub mod record;
pub mod sink;
pub mod tail;
pub mod watch;

#[cfg(test)]
pub(crate) mod testutil;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Sets up OpenSearch, starts container discovery and forwards logs until interrupted.
///
/// # Returns
///
/// `Ok(())` after a clean shutdown on Ctrl-C.
///
/// # Errors
///
/// Returns an error if the configuration is invalid, the HTTP client cannot be built, or
/// the containers directory cannot be watched or listed.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;
    log::debug!("Configuration: {:?}", config);

    let client = reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(REQUEST_TIMEOUT)
        .build()?;

    if config.bootstrap {
        let bootstrapper = Bootstrapper::new(client.clone(), &config.opensearch, &config.dashboards);
        tokio::select! {
            _ = bootstrapper.run() => {}
            res = tokio::signal::ctrl_c() => {
                res?;
                log::info!("Interrupted during bootstrap");
                return Ok(());
            }
        }
    } else {
        log::info!("Skipping OpenSearch bootstrap");
    }

    let sink = Arc::new(OpenSearchSink::new(
        client,
        &config.opensearch.base_url(),
        &config.opensearch.index,
    ));
    log::debug!("Indexing records via `{}`", sink.doc_url());

    let cancel = CancellationToken::new();
    let supervisor = TailSupervisor::new(sink, config.tail, cancel.child_token());
    let mut discoverer = Discoverer::new(config.containers_dir.clone(), supervisor.clone());
    discoverer.start(cancel.clone()).await?;
    log::info!(
        "Forwarding container logs from `{}` (policy={:?})",
        config.containers_dir.display(),
        config.tail.policy
    );

    tokio::signal::ctrl_c().await?;
    log::info!(
        "Shutting down, stopping {} tails",
        supervisor.active_tails().len()
    );
    cancel.cancel();
    discoverer.join_all().await?;
    supervisor.shutdown().await;

    Ok(())
}
