use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio_util::sync::CancellationToken;

use crate::container::ContainerID;

use super::TailMode;

#[derive(Debug)]
struct TailEntry {
    id: u64,
    container_id: ContainerID,
    mode: TailMode,
    cancel: CancellationToken,
}

/// The set of log files that currently have a tail task, keyed by log file path.
///
/// Claiming a path is an atomic insert-if-absent, so concurrent discovery events for the
/// same container never produce two tasks.
#[derive(Debug, Default)]
pub struct TailRegistry {
    tails: DashMap<PathBuf, TailEntry>,
    next_id: AtomicU64,
}

impl TailRegistry {
    /// Claims `path` for a new tail task.
    ///
    /// Returns `None` if the path is already claimed. Otherwise returns the
    /// [`Registration`] which releases the claim when dropped.
    ///
    /// # Arguments
    ///
    /// * `path` - Canonical log file path.
    /// * `container_id` - Owner of the log file.
    /// * `mode` - Initial mode reported for the task.
    /// * `cancel` - Token stopping this task only.
    pub fn try_register(
        self: &Arc<Self>,
        path: &Path,
        container_id: ContainerID,
        mode: TailMode,
        cancel: CancellationToken,
    ) -> Option<Registration> {
        match self.tails.entry(path.to_path_buf()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(vacant) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                vacant.insert(TailEntry {
                    id,
                    container_id,
                    mode,
                    cancel: cancel.clone(),
                });
                log::debug!("Registered tail for `{}` (mode={})", path.display(), mode);
                Some(Registration {
                    registry: Arc::clone(self),
                    path: path.to_path_buf(),
                    id,
                    cancel,
                })
            }
        }
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.tails.contains_key(path)
    }

    /// Returns the mode of the task tailing `path`, or [`TailMode::Stopped`] if there is none.
    pub fn mode(&self, path: &Path) -> TailMode {
        self.tails
            .get(path)
            .map(|entry| entry.mode)
            .unwrap_or(TailMode::Stopped)
    }

    pub fn container_id(&self, path: &Path) -> Option<ContainerID> {
        self.tails.get(path).map(|entry| entry.container_id.clone())
    }

    /// Asks the task tailing `path` to stop. Returns `false` if there is none.
    pub fn cancel(&self, path: &Path) -> bool {
        match self.tails.get(path) {
            Some(entry) => {
                entry.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.tails.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.tails.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tails.is_empty()
    }

    fn set_mode(&self, path: &Path, id: u64, mode: TailMode) {
        if let Some(mut entry) = self.tails.get_mut(path) {
            if entry.id == id {
                entry.mode = mode;
            }
        }
    }

    fn release(&self, path: &Path, id: u64) {
        if self
            .tails
            .remove_if(path, |_, entry| entry.id == id)
            .is_some()
        {
            log::debug!("Deregistered tail for `{}`", path.display());
        }
    }
}

/// Proof of ownership of a registry entry.
///
/// Dropping it removes the entry, whichever way the owning task ends. A registration
/// only ever removes its own entry, never one created later for the same path.
#[derive(Debug)]
pub struct Registration {
    registry: Arc<TailRegistry>,
    path: PathBuf,
    id: u64,
    cancel: CancellationToken,
}

impl Registration {
    pub fn set_mode(&self, mode: TailMode) {
        self.registry.set_mode(&self.path, self.id, mode);
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.release(&self.path, self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id() -> ContainerID {
        ContainerID::new("c1").unwrap()
    }

    #[test]
    fn test_register_is_exclusive() {
        let registry = Arc::new(TailRegistry::default());
        let path = Path::new("/base/c1/c1-json.log");

        let first = registry.try_register(path, id(), TailMode::Live, CancellationToken::new());
        assert!(first.is_some());
        let second = registry.try_register(path, id(), TailMode::Live, CancellationToken::new());
        assert!(second.is_none());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.container_id(path), Some(id()));
    }

    #[test]
    fn test_drop_releases_entry() {
        let registry = Arc::new(TailRegistry::default());
        let path = Path::new("/base/c1/c1-json.log");

        let registration = registry
            .try_register(path, id(), TailMode::WaitingForFile, CancellationToken::new())
            .unwrap();
        assert_eq!(registry.mode(path), TailMode::WaitingForFile);
        registration.set_mode(TailMode::Live);
        assert_eq!(registry.mode(path), TailMode::Live);

        drop(registration);
        assert!(!registry.contains(path));
        assert_eq!(registry.mode(path), TailMode::Stopped);
        assert!(
            registry
                .try_register(path, id(), TailMode::Live, CancellationToken::new())
                .is_some()
        );
    }

    #[test]
    fn test_stale_registration_keeps_newer_entry() {
        let registry = Arc::new(TailRegistry::default());
        let path = Path::new("/base/c1/c1-json.log");

        let old = registry
            .try_register(path, id(), TailMode::Live, CancellationToken::new())
            .unwrap();
        registry.release(path, old.id);
        let new = registry
            .try_register(path, id(), TailMode::ReplayingHistory, CancellationToken::new())
            .unwrap();

        old.set_mode(TailMode::Live);
        drop(old);
        assert!(registry.contains(path));
        assert_eq!(registry.mode(path), TailMode::ReplayingHistory);
        drop(new);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_cancel_reaches_task_token() {
        let registry = Arc::new(TailRegistry::default());
        let path = Path::new("/base/c1/c1-json.log");
        let registration = registry
            .try_register(path, id(), TailMode::Live, CancellationToken::new())
            .unwrap();

        assert!(registry.cancel(path));
        assert!(registration.cancel_token().is_cancelled());
        assert!(!registry.cancel(Path::new("/base/c2/c2-json.log")));
    }

    #[test]
    fn test_concurrent_registration_yields_single_owner() {
        let registry = Arc::new(TailRegistry::default());
        let path = PathBuf::from("/base/c1/c1-json.log");
        let barrier = Arc::new(std::sync::Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let path = path.clone();
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    registry.try_register(&path, id(), TailMode::Live, CancellationToken::new())
                })
            })
            .collect();

        let registrations: Vec<_> = handles
            .into_iter()
            .filter_map(|handle| handle.join().unwrap())
            .collect();
        assert_eq!(registrations.len(), 1);
        assert_eq!(registry.paths(), vec![path]);
    }
}
