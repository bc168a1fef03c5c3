use mediakeep_core::{DiscoveryError, ProjectView, StorageConfig};
use parking_lot::Mutex;

use crate::fs::FileSystem;
use crate::orchestrator::{invalidate_registry, Discovery, DiscoveryState, StorageCatalog};
use crate::resolver::StorageStatus;

/// A [`Discovery`] and its state behind one lock, for hosts that read from
/// several threads (a refresh timer next to a foreground menu, say).
///
/// The lock covers the whole validity-check-then-commit sequence, so no
/// reader can see Master from one commit and Backup from another.
pub struct SharedDiscovery<C, F> {
    discovery: Discovery<C, F>,
    state: Mutex<DiscoveryState>,
}

impl<C: StorageCatalog, F: FileSystem> SharedDiscovery<C, F> {
    pub fn new(discovery: Discovery<C, F>, storage: StorageConfig) -> Self {
        Self {
            discovery,
            state: Mutex::new(DiscoveryState::new(storage)),
        }
    }

    pub fn get_projects(&self, force_rescan: bool) -> Result<ProjectView, DiscoveryError> {
        let mut state = self.state.lock();
        self.discovery.get_projects(&mut state, force_rescan)
    }

    pub fn confirm_storage(&self) -> Result<Vec<StorageStatus>, DiscoveryError> {
        let mut state = self.state.lock();
        self.discovery.confirm_storage(&mut state)
    }

    pub fn invalidate(&self) {
        invalidate_registry(&mut self.state.lock());
    }

    /// Runs `f` against the state while holding the lock.
    pub fn with_state<R>(&self, f: impl FnOnce(&DiscoveryState) -> R) -> R {
        let state = self.state.lock();
        f(&*state)
    }
}
