//! Filesystem access used by the scanner and the cache validity check.

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use time::OffsetDateTime;

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub full_path: PathBuf,
}

pub trait FileSystem {
    fn exists(&self, path: &Path) -> bool;

    /// Whether a mount root answers at all. Must not block indefinitely.
    fn probe(&self, root: &Path) -> bool {
        self.exists(root)
    }

    fn modified(&self, path: &Path) -> io::Result<OffsetDateTime>;

    /// Immediate subdirectories, in enumeration order.
    fn list_subdirectories(&self, path: &Path) -> io::Result<Vec<DirEntry>>;

    /// Creates `path` and any missing parents.
    fn make_dir(&self, path: &Path) -> io::Result<()>;
}

impl<T: FileSystem + ?Sized> FileSystem for &T {
    fn exists(&self, path: &Path) -> bool {
        (**self).exists(path)
    }

    fn probe(&self, root: &Path) -> bool {
        (**self).probe(root)
    }

    fn modified(&self, path: &Path) -> io::Result<OffsetDateTime> {
        (**self).modified(path)
    }

    fn list_subdirectories(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        (**self).list_subdirectories(path)
    }

    fn make_dir(&self, path: &Path) -> io::Result<()> {
        (**self).make_dir(path)
    }
}

/// Remembers each root's reachability for the length of one discovery call,
/// so the validity check and the scan share a single answer per drive.
pub(crate) struct PassFileSystem<'a, F> {
    inner: &'a F,
    reachable: Mutex<HashMap<PathBuf, bool>>,
}

impl<'a, F: FileSystem> PassFileSystem<'a, F> {
    pub(crate) fn new(inner: &'a F) -> Self {
        Self {
            inner,
            reachable: Mutex::new(HashMap::new()),
        }
    }
}

impl<F: FileSystem> FileSystem for PassFileSystem<'_, F> {
    fn exists(&self, path: &Path) -> bool {
        self.inner.exists(path)
    }

    fn probe(&self, root: &Path) -> bool {
        if let Some(known) = self.reachable.lock().get(root) {
            return *known;
        }
        let answer = self.inner.probe(root);
        self.reachable.lock().insert(root.to_path_buf(), answer);
        answer
    }

    fn modified(&self, path: &Path) -> io::Result<OffsetDateTime> {
        self.inner.modified(path)
    }

    fn list_subdirectories(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        self.inner.list_subdirectories(path)
    }

    fn make_dir(&self, path: &Path) -> io::Result<()> {
        self.inner.make_dir(path)
    }
}

/// The host filesystem.
#[derive(Debug, Clone)]
pub struct LocalFileSystem {
    probe_timeout: Duration,
    /// Roots whose helper thread has not answered yet.
    pending: Arc<Mutex<HashSet<PathBuf>>>,
}

impl Default for LocalFileSystem {
    fn default() -> Self {
        Self {
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            pending: Arc::new(Mutex::new(HashSet::new())),
        }
    }
}

impl LocalFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }
}

impl FileSystem for LocalFileSystem {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn probe(&self, root: &Path) -> bool {
        // An ejected disk can leave a stale mount that hangs on stat; the
        // helper thread is abandoned if it does not answer in time. At most
        // one thread per root is outstanding.
        if !self.pending.lock().insert(root.to_path_buf()) {
            tracing::warn!(root = %root.display(), "earlier drive probe still pending");
            return false;
        }
        let (tx, rx) = mpsc::channel();
        let target = root.to_path_buf();
        let pending = Arc::clone(&self.pending);
        let spawned = thread::Builder::new()
            .name("mediakeep-probe".to_string())
            .spawn(move || {
                let responded = std::fs::metadata(&target).is_ok();
                pending.lock().remove(&target);
                let _ = tx.send(responded);
            });
        if spawned.is_err() {
            self.pending.lock().remove(root);
            return false;
        }
        match rx.recv_timeout(self.probe_timeout) {
            Ok(responded) => responded,
            Err(_) => {
                tracing::warn!(timeout_ms = self.probe_timeout.as_millis() as u64, "drive probe timed out");
                false
            }
        }
    }

    fn modified(&self, path: &Path) -> io::Result<OffsetDateTime> {
        let modified = std::fs::metadata(path)?.modified()?;
        Ok(OffsetDateTime::from(modified))
    }

    fn list_subdirectories(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            let full_path = entry.path();
            if !full_path.is_dir() {
                continue;
            }
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().to_string(),
                full_path,
            });
        }
        Ok(entries)
    }

    fn make_dir(&self, path: &Path) -> io::Result<()> {
        std::fs::create_dir_all(path)
    }
}
