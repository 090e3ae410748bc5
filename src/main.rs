/// Entry point for the Creo Log Forwarder.
///
/// This binary discovers the containers of the local Docker host, tails their json log
/// files and indexes every line into OpenSearch until it receives Ctrl-C.
///
/// # Errors
///
/// Returns an error if initialization fails (e.g., invalid environment variables or an
/// unreadable containers directory).
///
/// # Examples
///
/// ```bash
/// RUST_LOG=info OPENSEARCH_HOST=localhost CONTAINERS_DIR=/var/lib/docker/containers cargo run
/// ```
#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    creo_log_forwarder::run().await
}
