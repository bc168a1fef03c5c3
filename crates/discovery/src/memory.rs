//! Simulated filesystem and drive catalog for test-mode runs and
//! deterministic tests.
//!
//! Directories only. Every mutation advances a logical clock; creating or
//! removing a child stamps the parent with the new tick, the way a real
//! directory's modification time moves when its entries change.

use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use mediakeep_core::PhysicalDrive;
use parking_lot::Mutex;
use time::{Duration, OffsetDateTime};

use crate::fs::{DirEntry, FileSystem};
use crate::orchestrator::StorageCatalog;

/// Number of calls per operation since creation or the last reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FsCounters {
    pub exists: usize,
    pub probe: usize,
    pub modified: usize,
    pub list: usize,
    pub make_dir: usize,
}

#[derive(Debug, Default)]
struct MemoryState {
    dirs: BTreeMap<PathBuf, OffsetDateTime>,
    clock: i64,
    unreachable: BTreeSet<PathBuf>,
    failing_lists: BTreeSet<PathBuf>,
    failing_modified: BTreeSet<PathBuf>,
    read_only: BTreeSet<PathBuf>,
    counters: FsCounters,
}

impl MemoryState {
    fn tick(&mut self) -> OffsetDateTime {
        self.clock += 1;
        OffsetDateTime::UNIX_EPOCH + Duration::seconds(self.clock)
    }

    fn is_unreachable(&self, path: &Path) -> bool {
        self.unreachable.iter().any(|root| path.starts_with(root))
    }

    fn visible(&self, path: &Path) -> bool {
        !self.is_unreachable(path) && self.dirs.contains_key(path)
    }

    fn create(&mut self, path: &Path) {
        let mut missing = Vec::new();
        let mut current = Some(path);
        while let Some(dir) = current {
            if dir.as_os_str().is_empty() || self.dirs.contains_key(dir) {
                break;
            }
            missing.push(dir.to_path_buf());
            current = dir.parent();
        }
        for dir in missing.into_iter().rev() {
            let stamp = self.tick();
            if let Some(parent) = dir.parent() {
                if let Some(parent_stamp) = self.dirs.get_mut(parent) {
                    *parent_stamp = stamp;
                }
            }
            self.dirs.insert(dir, stamp);
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryFileSystem {
    state: Mutex<MemoryState>,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates `path` and its parents. Not counted as a `make_dir` call.
    pub fn add_dir(&self, path: impl AsRef<Path>) {
        self.state.lock().create(path.as_ref());
    }

    /// Removes `path` and everything under it.
    pub fn remove_dir(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        let mut state = self.state.lock();
        state.dirs.retain(|dir, _| !dir.starts_with(path));
        let stamp = state.tick();
        if let Some(parent) = path.parent() {
            if let Some(parent_stamp) = state.dirs.get_mut(parent) {
                *parent_stamp = stamp;
            }
        }
    }

    /// Moves the modification time of an existing directory forward.
    pub fn touch(&self, path: impl AsRef<Path>) {
        let mut state = self.state.lock();
        let stamp = state.tick();
        if let Some(existing) = state.dirs.get_mut(path.as_ref()) {
            *existing = stamp;
        }
    }

    /// Everything under `root` stops responding, as if the disk were ejected.
    pub fn set_unreachable(&self, root: impl AsRef<Path>, unreachable: bool) {
        let mut state = self.state.lock();
        let root = root.as_ref().to_path_buf();
        if unreachable {
            state.unreachable.insert(root);
        } else {
            state.unreachable.remove(&root);
        }
    }

    /// Listing `path` fails with an I/O error.
    pub fn fail_listing(&self, path: impl AsRef<Path>) {
        self.state.lock().failing_lists.insert(path.as_ref().to_path_buf());
    }

    /// Reading the modification time of `path` fails; listing still works.
    pub fn fail_modified(&self, path: impl AsRef<Path>) {
        self.state.lock().failing_modified.insert(path.as_ref().to_path_buf());
    }

    /// Creating anything under `root` fails with permission denied.
    pub fn set_read_only(&self, root: impl AsRef<Path>) {
        self.state.lock().read_only.insert(root.as_ref().to_path_buf());
    }

    pub fn counters(&self) -> FsCounters {
        self.state.lock().counters
    }

    pub fn reset_counters(&self) {
        self.state.lock().counters = FsCounters::default();
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("{} not found", path.display()),
    )
}

impl FileSystem for MemoryFileSystem {
    fn exists(&self, path: &Path) -> bool {
        let mut state = self.state.lock();
        state.counters.exists += 1;
        state.visible(path)
    }

    fn probe(&self, root: &Path) -> bool {
        let mut state = self.state.lock();
        state.counters.probe += 1;
        state.visible(root)
    }

    fn modified(&self, path: &Path) -> io::Result<OffsetDateTime> {
        let mut state = self.state.lock();
        state.counters.modified += 1;
        if state.is_unreachable(path) {
            return Err(not_found(path));
        }
        if state.failing_modified.contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("simulated stat failure at {}", path.display()),
            ));
        }
        state.dirs.get(path).copied().ok_or_else(|| not_found(path))
    }

    fn list_subdirectories(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        let mut state = self.state.lock();
        state.counters.list += 1;
        if state.failing_lists.contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("simulated listing failure at {}", path.display()),
            ));
        }
        if !state.visible(path) {
            return Err(not_found(path));
        }
        Ok(state
            .dirs
            .keys()
            .filter(|dir| dir.parent() == Some(path))
            .map(|dir| DirEntry {
                name: dir
                    .file_name()
                    .map(|name| name.to_string_lossy().to_string())
                    .unwrap_or_default(),
                full_path: dir.clone(),
            })
            .collect())
    }

    fn make_dir(&self, path: &Path) -> io::Result<()> {
        let mut state = self.state.lock();
        state.counters.make_dir += 1;
        if state.is_unreachable(path) {
            return Err(not_found(path));
        }
        if state.read_only.iter().any(|root| path.starts_with(root)) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("{} is read-only", path.display()),
            ));
        }
        state.create(path);
        Ok(())
    }
}

/// Fixed drive list standing in for the host catalog.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    drives: Mutex<Vec<PhysicalDrive>>,
    failing: Mutex<bool>,
    listings: Mutex<usize>,
}

impl MemoryCatalog {
    pub fn new(drives: Vec<PhysicalDrive>) -> Self {
        Self {
            drives: Mutex::new(drives),
            ..Default::default()
        }
    }

    /// Detaches the drive with `serial`, as if it were unplugged.
    pub fn detach(&self, serial: &str) {
        self.drives.lock().retain(|drive| drive.serial() != serial);
    }

    pub fn attach(&self, drive: PhysicalDrive) {
        self.drives.lock().push(drive);
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock() = failing;
    }

    pub fn listings(&self) -> usize {
        *self.listings.lock()
    }
}

impl StorageCatalog for MemoryCatalog {
    fn list_physical_drives(&self) -> Result<Vec<PhysicalDrive>> {
        *self.listings.lock() += 1;
        if *self.failing.lock() {
            return Err(anyhow!("simulated catalog failure"));
        }
        Ok(self.drives.lock().clone())
    }
}
