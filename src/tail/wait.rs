use std::path::Path;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::watch::{self, DirectoryWatch};

/// Result of waiting for a log file to be created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Appeared,
    TimedOut,
    Cancelled,
}

/// Waits until `dir/file_name` exists, at most `ceiling`.
///
/// The directory is subscribed to before the file is first checked, so a file created
/// in between is not missed.
///
/// # Errors
///
/// Returns a [`watch::Error`] if `dir` cannot be watched.
pub async fn wait_for_file(
    dir: &Path,
    file_name: &str,
    ceiling: Duration,
    cancel: &CancellationToken,
) -> watch::Result<WaitOutcome> {
    let target = dir.join(file_name);
    let mut watch = DirectoryWatch::new(dir)?;
    if exists(&target).await {
        return Ok(WaitOutcome::Appeared);
    }

    let appeared = async {
        while let Some(event) = watch.recv().await {
            let event = match event {
                Ok(event) => event,
                Err(err) => {
                    log::warn!(
                        "watch error while waiting for `{}`: {}",
                        target.display(),
                        err
                    );
                    continue;
                }
            };
            let names_target = event
                .paths
                .iter()
                .any(|path| path.file_name().is_some_and(|name| name == file_name));
            if names_target && exists(&target).await {
                return true;
            }
        }
        false
    };

    let res = tokio::select! {
        _ = cancel.cancelled() => return Ok(WaitOutcome::Cancelled),
        res = tokio::time::timeout(ceiling, appeared) => res,
    };
    // the watch may close or expire right as the file is created
    if matches!(res, Ok(true)) || exists(&target).await {
        Ok(WaitOutcome::Appeared)
    } else {
        Ok(WaitOutcome::TimedOut)
    }
}

async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}
