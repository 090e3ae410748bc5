use std::io::Write;
use std::path::Path;
use std::time::Duration;

/// Appends `content` to `path`, creating the file if needed.
pub(crate) fn append(path: &Path, content: &str) {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
}

/// A newline-terminated line in the container runtime's json log format.
pub(crate) fn json_line(message: &str) -> String {
    let line = serde_json::json!({
        "log": format!("{message}\n"),
        "stream": "stdout",
        "time": "2024-05-01T10:00:00.123456789Z",
    });
    format!("{line}\n")
}

/// Polls `condition` until it holds or `timeout` elapses. Returns whether it held.
pub(crate) async fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
