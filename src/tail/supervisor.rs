use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::container::ContainerLogSource;
use crate::error::ResultOkLogExt;
use crate::sink::LogSink;

use super::reader::{LogFileReader, StartPosition, TailExit};
use super::registry::{Registration, TailRegistry};
use super::wait::{WaitOutcome, wait_for_file};
use super::{TailConfig, TailMode};

/// Starts and tracks one tail task per container log file.
///
/// Cloning is cheap; clones share the registry, the sink and the tasks.
pub struct TailSupervisor<S> {
    registry: Arc<TailRegistry>,
    sink: Arc<S>,
    config: TailConfig,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl<S> Clone for TailSupervisor<S> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            sink: Arc::clone(&self.sink),
            config: self.config,
            cancel: self.cancel.clone(),
            tracker: self.tracker.clone(),
        }
    }
}

impl<S: LogSink> TailSupervisor<S> {
    /// Creates a supervisor whose tasks are children of `cancel`.
    pub fn new(sink: Arc<S>, config: TailConfig, cancel: CancellationToken) -> Self {
        Self {
            registry: Arc::new(TailRegistry::default()),
            sink,
            config,
            cancel,
            tracker: TaskTracker::new(),
        }
    }

    pub fn is_tailing(&self, log_file_path: &Path) -> bool {
        self.registry.contains(log_file_path)
    }

    pub fn mode_of(&self, log_file_path: &Path) -> TailMode {
        self.registry.mode(log_file_path)
    }

    pub fn active_tails(&self) -> Vec<PathBuf> {
        self.registry.paths()
    }

    /// Stops the task tailing `log_file_path`. Returns `false` if there is none.
    pub fn stop_tailing(&self, log_file_path: &Path) -> bool {
        let stopped = self.registry.cancel(log_file_path);
        if stopped {
            log::info!("Stopping tail of `{}`", log_file_path.display());
        }
        stopped
    }

    /// Makes sure the log file of the container in `container_dir` is tailed.
    ///
    /// Returns `true` if a new task was started, `false` if the file is already tailed
    /// or the directory does not describe a container. Never blocks on the file itself:
    /// waiting for a missing log file happens inside the spawned task.
    pub fn start_tailing_if_needed(&self, container_dir: &Path) -> bool {
        let Some(source) = ContainerLogSource::new(container_dir)
            .ok_warn(format_args!("skipping `{}`", container_dir.display()))
        else {
            return false;
        };
        let start = StartPosition::from(self.config.policy);
        self.launch(Arc::new(source), start, self.config.file_wait_timeout)
    }

    /// Cancels all tasks and waits for them to finish.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        log::debug!("All tail tasks finished");
    }

    /// Registers `source` and spawns its tail task. A missing file is waited for at
    /// most `wait_ceiling`.
    fn launch(
        &self,
        source: Arc<ContainerLogSource>,
        start: StartPosition,
        wait_ceiling: Duration,
    ) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }

        let path = source.log_file_path();
        // the file is not opened yet; the task sets the real mode
        let Some(registration) = self.registry.try_register(
            path,
            source.container_id().clone(),
            TailMode::WaitingForFile,
            self.cancel.child_token(),
        ) else {
            log::trace!("`{}` is already tailed", path.display());
            return false;
        };

        log::info!(
            "Starting tail of `{}` (container_id={}, start={:?})",
            path.display(),
            source.container_id(),
            start
        );
        let supervisor = self.clone();
        self.tracker.spawn(async move {
            supervisor
                .supervise(source, start, wait_ceiling, registration)
                .await
        });
        true
    }

    async fn supervise(
        self,
        source: Arc<ContainerLogSource>,
        mut start: StartPosition,
        wait_ceiling: Duration,
        registration: Registration,
    ) {
        let cancel = registration.cancel_token().clone();
        let path = source.log_file_path();

        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            let outcome = wait_for_file(
                source.container_dir(),
                &source.log_file_name(),
                wait_ceiling,
                &cancel,
            )
            .await
            .ok_warn(format!("cannot wait for `{}`", path.display()));
            match outcome {
                Some(WaitOutcome::Appeared) => {
                    log::debug!("`{}` appeared", path.display());
                }
                Some(WaitOutcome::TimedOut) => {
                    log::warn!(
                        "giving up on `{}`: file did not appear within {:?} (container_id={})",
                        path.display(),
                        wait_ceiling,
                        source.container_id()
                    );
                    return;
                }
                Some(WaitOutcome::Cancelled) | None => return,
            }
            // a file created after discovery holds only new data
            if start == StartPosition::End {
                start = StartPosition::Beginning;
            }
        }

        let reader = LogFileReader::new(
            Arc::clone(&source),
            Arc::clone(&self.sink),
            &self.config,
            cancel,
        )
        .await;
        let exit = reader.run(start, &registration).await;
        drop(registration);

        match exit {
            Ok(TailExit::Cancelled) => {
                log::debug!("Tail of `{}` cancelled", path.display());
            }
            Ok(TailExit::Vanished) => {
                if !tokio::fs::try_exists(source.container_dir())
                    .await
                    .unwrap_or(false)
                {
                    log::info!(
                        "`{}` was deleted with its container, stopping tail (container_id={})",
                        path.display(),
                        source.container_id()
                    );
                    return;
                }
                log::info!(
                    "`{}` vanished, waiting {:?} for a new file (container_id={})",
                    path.display(),
                    self.config.reappear_timeout,
                    source.container_id()
                );
                self.launch(
                    source,
                    StartPosition::Beginning,
                    self.config.reappear_timeout,
                );
            }
            Ok(TailExit::Rotated) => {
                log::info!("`{}` was rotated, following new file", path.display());
                self.launch(
                    source,
                    StartPosition::Beginning,
                    self.config.file_wait_timeout,
                );
            }
            Err(err) => {
                log::error!(
                    "tail ended: container_id={}, error={}",
                    source.container_id(),
                    err
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::memory::MemorySink;
    use crate::tail::TailPolicy;
    use crate::testutil::{append, json_line, wait_until};

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn config(policy: TailPolicy) -> TailConfig {
        TailConfig {
            policy,
            poll_interval: Duration::from_millis(20),
            file_wait_timeout: Duration::from_secs(5),
            reappear_timeout: Duration::from_secs(2),
            max_line_len: 1024,
        }
    }

    fn supervisor(config: TailConfig) -> (TailSupervisor<MemorySink>, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::default());
        let supervisor = TailSupervisor::new(Arc::clone(&sink), config, CancellationToken::new());
        (supervisor, sink)
    }

    fn container_dir(base: &Path, id: &str) -> (PathBuf, PathBuf) {
        let dir = base.join(id);
        std::fs::create_dir(&dir).unwrap();
        let log = dir.join(format!("{id}-json.log"));
        (dir, log)
    }

    #[tokio::test]
    async fn test_duplicate_start_yields_one_tail() {
        let base = tempfile::tempdir().unwrap();
        let (dir, log) = container_dir(base.path(), "c1");
        append(&log, &json_line("A"));
        let (supervisor, sink) = supervisor(config(TailPolicy::ReplayThenTail));

        let started: Vec<bool> = (0..5)
            .map(|_| supervisor.start_tailing_if_needed(&dir))
            .collect();
        assert_eq!(started.iter().filter(|s| **s).count(), 1);
        assert_eq!(supervisor.active_tails(), vec![log.clone()]);

        let records = Arc::clone(&sink);
        assert!(wait_until(TIMEOUT, move || records.len() == 1).await);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(sink.messages(), vec!["A"]);

        supervisor.shutdown().await;
        assert!(supervisor.active_tails().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_starts_yield_one_tail() {
        let base = tempfile::tempdir().unwrap();
        let (dir, _log) = container_dir(base.path(), "c1");
        let (supervisor, _sink) = supervisor(config(TailPolicy::ReplayThenTail));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let supervisor = supervisor.clone();
                let dir = dir.clone();
                tokio::spawn(async move { supervisor.start_tailing_if_needed(&dir) })
            })
            .collect();
        let mut started = 0;
        for handle in handles {
            if handle.await.unwrap() {
                started += 1;
            }
        }
        assert_eq!(started, 1);
        assert_eq!(supervisor.active_tails().len(), 1);

        supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn test_waits_for_log_file_to_appear() {
        let base = tempfile::tempdir().unwrap();
        let (dir, log) = container_dir(base.path(), "c1");
        let (supervisor, sink) = supervisor(config(TailPolicy::TailOnly));

        assert!(supervisor.start_tailing_if_needed(&dir));
        assert_eq!(supervisor.mode_of(&log), TailMode::WaitingForFile);
        assert!(!supervisor.start_tailing_if_needed(&dir));

        tokio::time::sleep(Duration::from_millis(100)).await;
        append(&log, &json_line("first"));

        let records = Arc::clone(&sink);
        assert!(wait_until(TIMEOUT, move || records.len() == 1).await);
        assert_eq!(sink.messages(), vec!["first"]);
        let view = supervisor.clone();
        let path = log.clone();
        assert!(wait_until(TIMEOUT, move || view.mode_of(&path) == TailMode::Live).await);

        supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn test_wait_timeout_deregisters() {
        let base = tempfile::tempdir().unwrap();
        let (dir, log) = container_dir(base.path(), "c1");
        let mut config = config(TailPolicy::ReplayThenTail);
        config.file_wait_timeout = Duration::from_millis(100);
        let (supervisor, _sink) = supervisor(config);

        assert!(supervisor.start_tailing_if_needed(&dir));
        let view = supervisor.clone();
        let path = log.clone();
        assert!(wait_until(TIMEOUT, move || !view.is_tailing(&path)).await);
        assert_eq!(supervisor.mode_of(&log), TailMode::Stopped);

        // a later discovery event may start it again
        assert!(supervisor.start_tailing_if_needed(&dir));
        supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn test_invalid_container_dir_is_skipped() {
        let (supervisor, _sink) = supervisor(config(TailPolicy::ReplayThenTail));

        assert!(!supervisor.start_tailing_if_needed(Path::new("/")));
        assert!(supervisor.active_tails().is_empty());
    }

    #[tokio::test]
    async fn test_stop_tailing_ends_single_task() {
        let base = tempfile::tempdir().unwrap();
        let (dir1, log1) = container_dir(base.path(), "c1");
        let (dir2, log2) = container_dir(base.path(), "c2");
        append(&log1, "");
        append(&log2, "");
        let (supervisor, _sink) = supervisor(config(TailPolicy::ReplayThenTail));

        assert!(supervisor.start_tailing_if_needed(&dir1));
        assert!(supervisor.start_tailing_if_needed(&dir2));
        assert!(supervisor.stop_tailing(&log1));
        assert!(!supervisor.stop_tailing(&base.path().join("c3/c3-json.log")));

        let view = supervisor.clone();
        let path = log1.clone();
        assert!(wait_until(TIMEOUT, move || !view.is_tailing(&path)).await);
        assert!(supervisor.is_tailing(&log2));

        supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_ends_all_tasks() {
        let base = tempfile::tempdir().unwrap();
        let (dir1, log1) = container_dir(base.path(), "c1");
        let (dir2, _log2) = container_dir(base.path(), "c2");
        append(&log1, &json_line("A"));
        let (supervisor, _sink) = supervisor(config(TailPolicy::ReplayThenTail));

        assert!(supervisor.start_tailing_if_needed(&dir1));
        assert!(supervisor.start_tailing_if_needed(&dir2));
        assert_eq!(supervisor.active_tails().len(), 2);

        tokio::time::timeout(TIMEOUT, supervisor.shutdown())
            .await
            .unwrap();
        assert!(supervisor.active_tails().is_empty());
        assert!(!supervisor.start_tailing_if_needed(&dir1));
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_rotation_is_followed() {
        let base = tempfile::tempdir().unwrap();
        let (dir, log) = container_dir(base.path(), "c1");
        append(&log, &json_line("before"));
        let (supervisor, sink) = supervisor(config(TailPolicy::ReplayThenTail));

        assert!(supervisor.start_tailing_if_needed(&dir));
        let view = supervisor.clone();
        let path = log.clone();
        assert!(wait_until(TIMEOUT, move || view.mode_of(&path) == TailMode::Live).await);

        std::fs::hard_link(&log, dir.join("c1-json.log.1")).unwrap();
        let fresh = dir.join("fresh.tmp");
        append(&fresh, &json_line("after"));
        std::fs::rename(&fresh, &log).unwrap();

        let records = Arc::clone(&sink);
        assert!(wait_until(TIMEOUT, move || records.len() == 2).await);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(sink.messages(), vec!["before", "after"]);
        assert!(supervisor.is_tailing(&log));

        supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn test_rename_then_create_is_followed() {
        let base = tempfile::tempdir().unwrap();
        let (dir, log) = container_dir(base.path(), "c1");
        append(&log, &json_line("before"));
        let (supervisor, sink) = supervisor(config(TailPolicy::ReplayThenTail));

        assert!(supervisor.start_tailing_if_needed(&dir));
        let view = supervisor.clone();
        let path = log.clone();
        assert!(wait_until(TIMEOUT, move || view.mode_of(&path) == TailMode::Live).await);

        std::fs::rename(&log, dir.join("c1-json.log.1")).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        append(&log, &json_line("after"));

        let records = Arc::clone(&sink);
        assert!(wait_until(TIMEOUT, move || records.len() == 2).await);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(sink.messages(), vec!["before", "after"]);
        assert!(supervisor.is_tailing(&log));

        supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn test_vanished_file_not_recreated_deregisters() {
        let base = tempfile::tempdir().unwrap();
        let (dir, log) = container_dir(base.path(), "c1");
        append(&log, &json_line("A"));
        let mut config = config(TailPolicy::ReplayThenTail);
        config.reappear_timeout = Duration::from_millis(500);
        let (supervisor, sink) = supervisor(config);

        assert!(supervisor.start_tailing_if_needed(&dir));
        let records = Arc::clone(&sink);
        assert!(wait_until(TIMEOUT, move || records.len() == 1).await);

        std::fs::remove_file(&log).unwrap();
        let view = supervisor.clone();
        let path = log.clone();
        assert!(wait_until(TIMEOUT, move || view.mode_of(&path) == TailMode::WaitingForFile).await);
        let view = supervisor.clone();
        let path = log.clone();
        assert!(wait_until(TIMEOUT, move || !view.is_tailing(&path)).await);

        supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn test_removed_container_ends_tail() {
        let base = tempfile::tempdir().unwrap();
        let (dir, log) = container_dir(base.path(), "c1");
        append(&log, &json_line("A"));
        let mut config = config(TailPolicy::ReplayThenTail);
        config.reappear_timeout = Duration::from_secs(3600);
        let (supervisor, sink) = supervisor(config);

        assert!(supervisor.start_tailing_if_needed(&dir));
        let records = Arc::clone(&sink);
        assert!(wait_until(TIMEOUT, move || records.len() == 1).await);

        std::fs::remove_dir_all(&dir).unwrap();
        let view = supervisor.clone();
        let path = log.clone();
        assert!(wait_until(TIMEOUT, move || !view.is_tailing(&path)).await);

        supervisor.shutdown().await;
    }
}
