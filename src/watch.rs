//! Directory watches delivering filesystem events to async tasks.
//!
//! `notify` invokes its handler on its own thread; [`DirectoryWatch`] forwards every event
//! into an unbounded tokio channel so discovery and wait-for-file tasks can `await` them.
use std::path::{Path, PathBuf};

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

/// Error that occurs when subscribing to a directory fails.
#[derive(Debug, thiserror::Error)]
#[error("failed to watch directory `{path}`: {source}")]
pub struct Error {
    pub path: PathBuf,
    #[source]
    pub source: notify::Error,
}

pub type Result<T> = std::result::Result<T, Error>;

/// Receiving side of a directory watch.
pub type EventReceiver = mpsc::UnboundedReceiver<notify::Result<Event>>;

/// A non-recursive watch on a single directory.
///
/// The subscription lasts as long as the watch (or the watcher returned by
/// [`DirectoryWatch::into_parts`]) is alive.
#[derive(Debug)]
pub struct DirectoryWatch {
    path: PathBuf,
    watcher: RecommendedWatcher,
    events: EventReceiver,
}

impl DirectoryWatch {
    /// Subscribes to events of the entries directly below `path`.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if the watcher cannot be created or the directory cannot be
    /// watched, e.g. because it does not exist or permission is denied.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let (tx, events) = mpsc::unbounded_channel();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            // receiver gone means the watch is being torn down
            let _ = tx.send(res);
        })
        .map_err(|source| Error {
            path: path.clone(),
            source,
        })?;

        watcher
            .watch(&path, RecursiveMode::NonRecursive)
            .map_err(|source| Error {
                path: path.clone(),
                source,
            })?;
        log::debug!("Watching directory `{}`", path.display());

        Ok(Self {
            path,
            watcher,
            events,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Waits for the next event. Returns `None` once the watcher is gone.
    pub async fn recv(&mut self) -> Option<notify::Result<Event>> {
        self.events.recv().await
    }

    /// Splits the watch into the watcher keeping the subscription alive and its events.
    pub fn into_parts(self) -> (RecommendedWatcher, EventReceiver) {
        (self.watcher, self.events)
    }
}

/// Returns the paths that came into existence with `event`.
///
/// Covers plain creation as well as entries renamed into the watched directory.
pub fn created_paths(event: &Event) -> &[PathBuf] {
    match event.kind {
        EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            &event.paths
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            event.paths.get(1..).unwrap_or_default()
        }
        _ => &[],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, RemoveKind};

    #[test]
    fn test_created_paths() {
        let create = Event::new(EventKind::Create(CreateKind::Folder)).add_path("/base/c1".into());
        assert_eq!(created_paths(&create), [PathBuf::from("/base/c1")]);

        let rename_to = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::To)))
            .add_path("/base/c2".into());
        assert_eq!(created_paths(&rename_to), [PathBuf::from("/base/c2")]);

        let rename_both = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path("/base/tmp".into())
            .add_path("/base/c3".into());
        assert_eq!(created_paths(&rename_both), [PathBuf::from("/base/c3")]);

        let write = Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content)))
            .add_path("/base/c1".into());
        assert!(created_paths(&write).is_empty());

        let remove =
            Event::new(EventKind::Remove(RemoveKind::Folder)).add_path("/base/c1".into());
        assert!(created_paths(&remove).is_empty());
    }

    #[test]
    fn test_watch_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing");

        let err = DirectoryWatch::new(&missing).unwrap_err();
        assert_eq!(err.path, missing);
    }

    #[tokio::test]
    async fn test_watch_reports_created_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut watch = DirectoryWatch::new(dir.path()).unwrap();
        assert_eq!(watch.path(), dir.path());

        let created = dir.path().join("c1-json.log");
        std::fs::write(&created, "").unwrap();

        let seen = tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while let Some(event) = watch.recv().await {
                let event = event.unwrap();
                if created_paths(&event).iter().any(|p| p.ends_with("c1-json.log")) {
                    return true;
                }
            }
            false
        })
        .await
        .unwrap();
        assert!(seen);
    }
}
