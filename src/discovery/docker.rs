use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;

use crate::sink::LogSink;
use crate::tail::TailSupervisor;
use crate::watch::{self, DirectoryWatch, EventReceiver};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to subscribe to base directory: {0}")]
    Subscribe(#[source] watch::Error),
    #[error("failed to list base directory `{path}`: {source}")]
    ListBaseDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("discovery task failed: {0}")]
    Join(#[source] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Finds container directories below `base_dir` and hands them to the [`TailSupervisor`].
///
/// Existing containers are found by listing the directory once, new ones through a
/// watch on it.
pub struct Discoverer<S> {
    base_dir: PathBuf,
    supervisor: TailSupervisor<S>,
    join_handles: Vec<tokio::task::JoinHandle<Result<()>>>,
}

impl<S: LogSink> Discoverer<S> {
    pub fn new(base_dir: PathBuf, supervisor: TailSupervisor<S>) -> Self {
        Self {
            base_dir,
            supervisor,
            join_handles: Vec::default(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Starts discovery until `cancel` is cancelled.
    ///
    /// The base directory is subscribed to before it is listed, so a container created
    /// during startup is seen by at least one of the two.
    ///
    /// # Errors
    ///
    /// Returns an error if the base directory cannot be watched or listed.
    pub async fn start(&mut self, cancel: CancellationToken) -> Result<()> {
        let (watcher, events) = DirectoryWatch::new(&self.base_dir)
            .map_err(Error::Subscribe)?
            .into_parts();

        let started = discover_existing(&self.base_dir, &self.supervisor).await?;
        log::info!(
            "Discovered {} existing containers in `{}`",
            started,
            self.base_dir.display()
        );

        let supervisor = self.supervisor.clone();
        self.join_handles.push(tokio::spawn(async move {
            // dropping the watcher ends the subscription
            let _watcher = watcher;
            events_task(events, supervisor, cancel).await
        }));

        Ok(())
    }

    /// Waits for all discovery tasks to finish.
    pub async fn join_all(&mut self) -> Result<()> {
        for handle in self.join_handles.drain(..) {
            handle.await.map_err(Error::Join)??;
        }

        Ok(())
    }
}

/// Starts tailing every container directory currently in `base_dir`.
///
/// Returns the number of newly started tails.
///
/// # Errors
///
/// Returns [`Error::ListBaseDir`] if `base_dir` cannot be read. Unreadable single entries
/// are skipped.
pub async fn discover_existing<S: LogSink>(
    base_dir: &Path,
    supervisor: &TailSupervisor<S>,
) -> Result<usize> {
    let map_err = |source| Error::ListBaseDir {
        path: base_dir.to_path_buf(),
        source,
    };
    let mut entries = tokio::fs::read_dir(base_dir).await.map_err(map_err)?;

    let mut started = 0;
    while let Some(entry) = entries.next_entry().await.map_err(map_err)? {
        let path = entry.path();
        if is_dir(&path).await && supervisor.start_tailing_if_needed(&path) {
            started += 1;
        }
    }
    Ok(started)
}

/// Starts tailing every directory reported as created by `events`.
///
/// Runs until `cancel` is cancelled or the event source closes.
pub async fn events_task<S: LogSink>(
    mut events: EventReceiver,
    supervisor: TailSupervisor<S>,
    cancel: CancellationToken,
) -> Result<()> {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.recv() => event,
        };
        let event = match event {
            Some(Ok(event)) => event,
            Some(Err(err)) => {
                log::warn!("failed to receive discovery event: {}", err);
                continue;
            }
            None => {
                log::warn!("discovery event source closed");
                break;
            }
        };
        log::trace!("discovery event: {:?}", event);

        for path in watch::created_paths(&event) {
            if is_dir(path).await {
                supervisor.start_tailing_if_needed(path);
            }
        }
    }

    log::debug!("Stopped container discovery");
    Ok(())
}

async fn is_dir(path: &Path) -> bool {
    match tokio::fs::metadata(path).await {
        Ok(metadata) => metadata.is_dir(),
        Err(err) => {
            log::debug!("skipping `{}`: {}", path.display(), err);
            false
        }
    }
}
