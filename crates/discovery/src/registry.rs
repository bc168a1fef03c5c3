//! Registry Cache: the in-memory result of the last full scan and the
//! timestamps that decide whether it can still be served.
//!
//! States: empty (`last_scanned == None`, always invalid), valid, invalid
//! (a tracked `Projects` folder moved or a rescan was forced), and back to
//! valid once a rescan is committed. [`RegistryCache::clear`] returns to
//! empty from any state.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use mediakeep_core::{DriveRegistryEntry, DriveType, ProjectRecord, ProjectView, StorageConfig};
use time::OffsetDateTime;

use crate::fs::FileSystem;

pub type DriveMap = BTreeMap<String, DriveRegistryEntry>;

/// Key under which a drive's `Projects` folder timestamp is tracked.
pub fn tracking_key(serial: &str) -> String {
    format!("{}_Projects", serial.trim())
}

#[derive(Debug, Clone, Default)]
pub struct RegistryCache {
    master: Arc<DriveMap>,
    backup: Arc<DriveMap>,
    project_dirs: HashMap<String, OffsetDateTime>,
    last_scanned: Option<OffsetDateTime>,
}

impl RegistryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_scanned(&self) -> Option<OffsetDateTime> {
        self.last_scanned
    }

    pub fn has_scanned(&self) -> bool {
        self.last_scanned.is_some()
    }

    pub fn master(&self) -> &Arc<DriveMap> {
        &self.master
    }

    pub fn backup(&self) -> &Arc<DriveMap> {
        &self.backup
    }

    pub fn project_dirs(&self) -> &HashMap<String, OffsetDateTime> {
        &self.project_dirs
    }

    pub fn entry(&self, drive_type: DriveType, label: &str) -> Option<&DriveRegistryEntry> {
        match drive_type {
            DriveType::Master => self.master.get(label),
            DriveType::Backup => self.backup.get(label),
        }
    }

    /// Back to empty; the next read performs a full scan.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Master/Backup view rebuilt from each entry's full project list.
    pub fn view(&self) -> ProjectView {
        ProjectView {
            master: expand(&self.master),
            backup: expand(&self.backup),
        }
    }

    /// Stores a fresh scan. Timestamps always advance; the drive maps are only
    /// replaced when [`reconcile`] reports a change. Returns whether they were.
    pub fn commit(&mut self, fresh: ScanResult, scanned_at: OffsetDateTime) -> bool {
        let changed = reconcile(self, &fresh);
        self.project_dirs = fresh.project_dirs;
        self.last_scanned = Some(scanned_at);
        if changed {
            self.master = Arc::new(fresh.master);
            self.backup = Arc::new(fresh.backup);
            tracing::info!(
                master = self.master.len(),
                backup = self.backup.len(),
                "project registry updated"
            );
        } else {
            tracing::debug!("rescan found no project changes");
        }
        changed
    }
}

fn expand(map: &DriveMap) -> BTreeMap<String, Vec<ProjectRecord>> {
    map.iter()
        .map(|(label, entry)| (label.clone(), entry.projects.clone()))
        .collect()
}

/// Per-label results of one discovery pass, before they are committed.
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    pub master: DriveMap,
    pub backup: DriveMap,
    pub project_dirs: HashMap<String, OffsetDateTime>,
}

impl ScanResult {
    fn map_mut(&mut self, drive_type: DriveType) -> &mut DriveMap {
        match drive_type {
            DriveType::Master => &mut self.master,
            DriveType::Backup => &mut self.backup,
        }
    }

    /// Appends `records` to the entry for `label`, creating it if needed.
    pub fn add_records(&mut self, drive_type: DriveType, label: &str, records: Vec<ProjectRecord>) {
        let map = self.map_mut(drive_type);
        match map.get_mut(label) {
            Some(entry) => entry.projects.extend(records),
            None => {
                if let Some(entry) = DriveRegistryEntry::from_records(records) {
                    map.insert(label.to_string(), entry);
                }
            }
        }
    }

    /// Keeps a previously cached entry for a drive that was not scanned this pass.
    pub fn carry_over(&mut self, drive_type: DriveType, label: &str, entry: DriveRegistryEntry) {
        self.map_mut(drive_type)
            .entry(label.to_string())
            .or_insert(entry);
    }

    pub fn track(&mut self, key: String, modified: OffsetDateTime) {
        self.project_dirs.insert(key, modified);
    }
}

fn identities<'a>(maps: impl IntoIterator<Item = &'a DriveMap>) -> HashSet<String> {
    maps.into_iter()
        .flat_map(|map| map.values())
        .flat_map(|entry| entry.projects.iter())
        .map(ProjectRecord::identity_key)
        .collect()
}

/// True when the fresh scan holds a different set of project identities than the cache.
pub fn reconcile(cache: &RegistryCache, fresh: &ScanResult) -> bool {
    let cached = identities([cache.master.as_ref(), cache.backup.as_ref()]);
    let scanned = identities([&fresh.master, &fresh.backup]);
    cached != scanned
}

/// Whether `cache` can be served without rescanning.
///
/// Expects the slots in `storage` to have been resolved. Unreachable drives
/// are ignored; a reachable drive whose `Projects` timestamp is missing from
/// the cache or differs from it invalidates the whole cache.
pub fn is_valid<F: FileSystem>(
    cache: &RegistryCache,
    storage: &StorageConfig,
    fs: &F,
    test_mode: bool,
) -> bool {
    if !cache.has_scanned() {
        return false;
    }
    for (key, slot) in storage.slots() {
        if !slot.is_configured() {
            continue;
        }
        let Some(root) = slot.mount_root() else {
            continue;
        };
        if !test_mode && !fs.probe(&root) {
            continue;
        }
        let projects_dir = root.join(&storage.layout.projects);
        let live = match fs.modified(&projects_dir) {
            Ok(modified) => modified,
            Err(err) => {
                tracing::debug!(slot = %key, error = %err, "projects folder not readable, cache stale");
                return false;
            }
        };
        match cache.project_dirs.get(&tracking_key(slot.serial())) {
            Some(cached) if *cached == live => {}
            _ => {
                tracing::debug!(slot = %key, "projects folder changed since last scan");
                return false;
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryFileSystem;
    use mediakeep_core::{DriveMetadata, DriveSummary, StorageGroup, StorageSlot};

    fn summary(label: &str, drive_type: DriveType) -> DriveSummary {
        DriveSummary {
            label: label.to_string(),
            drive_letter: format!("{label}:"),
            serial_number: format!("{label}-SN"),
            storage_group: "1".to_string(),
            drive_type,
            backup_id: match drive_type {
                DriveType::Master => None,
                DriveType::Backup => Some(1),
            },
            metadata: DriveMetadata::default(),
        }
    }

    fn record(label: &str, drive_type: DriveType, name: &str) -> ProjectRecord {
        ProjectRecord::new(
            summary(label, drive_type),
            name,
            format!("{label}:/Projects/{name}"),
        )
    }

    fn scan(names: &[&str]) -> ScanResult {
        let mut result = ScanResult::default();
        result.add_records(
            DriveType::Master,
            "A",
            names.iter().map(|name| record("A", DriveType::Master, name)).collect(),
        );
        result.track("A-SN_Projects".to_string(), OffsetDateTime::UNIX_EPOCH);
        result
    }

    #[test]
    fn empty_cache_is_never_valid() {
        let cache = RegistryCache::new();
        let fs = MemoryFileSystem::new();
        assert!(!is_valid(&cache, &StorageConfig::default(), &fs, true));
    }

    #[test]
    fn no_storage_is_vacuously_valid_after_a_scan() {
        let mut cache = RegistryCache::new();
        cache.commit(ScanResult::default(), OffsetDateTime::now_utc());
        let fs = MemoryFileSystem::new();
        assert!(is_valid(&cache, &StorageConfig::default(), &fs, false));
    }

    #[test]
    fn timestamp_mismatch_and_missing_entry_invalidate() {
        let fs = MemoryFileSystem::new();
        fs.add_dir("D:/Projects");
        let mut slot = StorageSlot::new("AAA", "Vol-A");
        slot.mark_mounted("D:");
        let storage = StorageConfig::default().with_group("1", StorageGroup::new(slot));

        let mut cache = RegistryCache::new();
        cache.commit(ScanResult::default(), OffsetDateTime::now_utc());
        assert!(!is_valid(&cache, &storage, &fs, false), "missing entry");

        let mut fresh = ScanResult::default();
        let stamp = fs.modified(std::path::Path::new("D:/Projects")).unwrap();
        fresh.track(tracking_key("AAA"), stamp);
        cache.commit(fresh, OffsetDateTime::now_utc());
        assert!(is_valid(&cache, &storage, &fs, false));

        fs.add_dir("D:/Projects/NewShoot");
        assert!(!is_valid(&cache, &storage, &fs, false), "mtime moved");
    }

    #[test]
    fn unreachable_drives_do_not_invalidate() {
        let fs = MemoryFileSystem::new();
        fs.add_dir("E:/Projects");
        fs.set_unreachable("E:", true);
        let mut slot = StorageSlot::new("BBB", "Vol-B");
        slot.mark_mounted("E:");
        let storage = StorageConfig::default().with_group("1", StorageGroup::new(slot));

        let mut cache = RegistryCache::new();
        cache.commit(ScanResult::default(), OffsetDateTime::now_utc());
        assert!(is_valid(&cache, &storage, &fs, false));
    }

    #[test]
    fn identical_rescan_keeps_entry_maps() {
        let mut cache = RegistryCache::new();
        assert!(cache.commit(scan(&["Trip", "Wedding"]), OffsetDateTime::UNIX_EPOCH));
        let master = Arc::clone(cache.master());
        let backup = Arc::clone(cache.backup());

        let later = OffsetDateTime::now_utc();
        assert!(!cache.commit(scan(&["Wedding", "Trip"]), later));
        assert!(Arc::ptr_eq(&master, cache.master()));
        assert!(Arc::ptr_eq(&backup, cache.backup()));
        assert_eq!(cache.last_scanned(), Some(later));
    }

    #[test]
    fn changed_rescan_swaps_entry_maps() {
        let mut cache = RegistryCache::new();
        cache.commit(scan(&["Trip"]), OffsetDateTime::UNIX_EPOCH);
        let master = Arc::clone(cache.master());
        assert!(cache.commit(scan(&["Trip", "Wedding"]), OffsetDateTime::now_utc()));
        assert!(!Arc::ptr_eq(&master, cache.master()));
        assert_eq!(cache.view().master["A"].len(), 2);
    }

    #[test]
    fn view_uses_full_project_lists() {
        let mut cache = RegistryCache::new();
        cache.commit(scan(&["One", "Two", "Three"]), OffsetDateTime::now_utc());
        let entry = cache.entry(DriveType::Master, "A").unwrap();
        assert_eq!(entry.drive.label, "A");
        let view = cache.view();
        let names: Vec<&str> = view.master["A"]
            .iter()
            .map(|record| record.name.as_str())
            .collect();
        assert_eq!(names, vec!["One", "Two", "Three"]);
    }

    #[test]
    fn clear_returns_to_empty() {
        let mut cache = RegistryCache::new();
        cache.commit(scan(&["Trip"]), OffsetDateTime::now_utc());
        cache.clear();
        assert!(!cache.has_scanned());
        assert!(cache.master().is_empty());
        assert!(cache.project_dirs().is_empty());
    }

    #[test]
    fn carry_over_does_not_replace_scanned_entries() {
        let mut result = scan(&["Fresh"]);
        let stale = DriveRegistryEntry::from_records(vec![record("A", DriveType::Master, "Stale")]).unwrap();
        result.carry_over(DriveType::Master, "A", stale);
        assert_eq!(result.master["A"].projects[0].name, "Fresh");
    }
}
