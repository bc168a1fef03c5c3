use anyhow::Result;
use mediakeep_core::{DiscoveryError, PhysicalDrive, ProjectView, StorageConfig, ValidationErrors};
use time::OffsetDateTime;

use crate::fs::{FileSystem, PassFileSystem};
use crate::registry::{is_valid, RegistryCache, ScanResult};
use crate::resolver::{confirm_storage, StorageStatus};
use crate::scanner::{DriveOutcome, Scanner};

/// Source of the physically attached drives.
pub trait StorageCatalog {
    fn list_physical_drives(&self) -> Result<Vec<PhysicalDrive>>;
}

impl<T: StorageCatalog + ?Sized> StorageCatalog for &T {
    fn list_physical_drives(&self) -> Result<Vec<PhysicalDrive>> {
        (**self).list_physical_drives()
    }
}

/// Everything discovery reads and writes between calls. One per process.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryState {
    pub storage: StorageConfig,
    pub validation: ValidationErrors,
    pub registry: RegistryCache,
}

impl DiscoveryState {
    pub fn new(storage: StorageConfig) -> Self {
        Self {
            storage,
            validation: ValidationErrors::default(),
            registry: RegistryCache::new(),
        }
    }
}

/// Drops the cached registry so the next [`Discovery::get_projects`] rescans. No I/O.
pub fn invalidate_registry(state: &mut DiscoveryState) {
    state.registry.clear();
    tracing::info!("project registry invalidated");
}

pub struct Discovery<C, F> {
    catalog: C,
    fs: F,
    test_mode: bool,
}

impl<C: StorageCatalog, F: FileSystem> Discovery<C, F> {
    pub fn new(catalog: C, fs: F) -> Self {
        Self {
            catalog,
            fs,
            test_mode: false,
        }
    }

    /// Bypasses live reachability probing of mount roots.
    pub fn test_mode(mut self, enabled: bool) -> Self {
        self.test_mode = enabled;
        self
    }

    fn list_drives(&self) -> Result<Vec<PhysicalDrive>, DiscoveryError> {
        self.catalog.list_physical_drives().map_err(|err| {
            let err = DiscoveryError::Catalog(format!("{err:#}"));
            tracing::error!(error = %err, "cannot list attached drives");
            err
        })
    }

    /// Resolves every configured slot against the live catalog.
    pub fn confirm_storage(
        &self,
        state: &mut DiscoveryState,
    ) -> Result<Vec<StorageStatus>, DiscoveryError> {
        state.storage.validate()?;
        let drives = self.list_drives()?;
        Ok(confirm_storage(
            &mut state.storage,
            &drives,
            &mut state.validation,
        ))
    }

    /// Master/Backup projects by drive label, from the cache when it is still
    /// valid and from a full scan otherwise.
    ///
    /// On error the cache is left as it was.
    pub fn get_projects(
        &self,
        state: &mut DiscoveryState,
        force_rescan: bool,
    ) -> Result<ProjectView, DiscoveryError> {
        state.storage.validate()?;
        let drives = self.list_drives()?;
        confirm_storage(&mut state.storage, &drives, &mut state.validation);

        let fs = PassFileSystem::new(&self.fs);
        if !force_rescan && is_valid(&state.registry, &state.storage, &fs, self.test_mode) {
            tracing::debug!("serving projects from registry cache");
            return Ok(state.registry.view());
        }

        let reason = if force_rescan {
            "forced"
        } else if state.registry.has_scanned() {
            "stale"
        } else {
            "empty"
        };
        tracing::info!(reason, "scanning storage for projects");
        let fresh = self.scan_all(&fs, state, &drives);
        state.registry.commit(fresh, OffsetDateTime::now_utc());
        Ok(state.registry.view())
    }

    fn scan_all(
        &self,
        fs: &impl FileSystem,
        state: &DiscoveryState,
        drives: &[PhysicalDrive],
    ) -> ScanResult {
        let scanner = Scanner::new(fs, &state.storage.layout).test_mode(self.test_mode);
        let mut result = ScanResult::default();
        for (key, slot) in state.storage.slots() {
            if !slot.is_configured() {
                continue;
            }
            let drive_type = key.drive_type();
            match scanner.scan_drive(&key, slot, &state.validation, drives) {
                DriveOutcome::Scanned { records, tracked } => {
                    if let Some((tracking, modified)) = tracked {
                        result.track(tracking, modified);
                    }
                    result.add_records(drive_type, &slot.label, records);
                }
                DriveOutcome::Skipped(reason) => {
                    if let Some(previous) = state.registry.entry(drive_type, &slot.label) {
                        tracing::debug!(slot = %key, ?reason, "keeping cached entry for skipped drive");
                        result.carry_over(drive_type, &slot.label, previous.clone());
                    }
                }
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryCatalog, MemoryFileSystem};
    use mediakeep_core::{StorageGroup, StorageSlot};

    fn drive(serial: &str, mount: &str) -> PhysicalDrive {
        PhysicalDrive {
            serial_number: serial.to_string(),
            mount_path: mount.to_string(),
            ..Default::default()
        }
    }

    fn state() -> DiscoveryState {
        DiscoveryState::new(StorageConfig::default().with_group(
            "1",
            StorageGroup::new(StorageSlot::new("AAA", "Vol-A")),
        ))
    }

    #[test]
    fn catalog_failure_aborts_and_keeps_cache() {
        let fs = MemoryFileSystem::new();
        fs.add_dir("D:/Projects/Trip");
        let catalog = MemoryCatalog::new(vec![drive("AAA", "D:")]);
        let discovery = Discovery::new(&catalog, &fs);
        let mut state = state();

        discovery.get_projects(&mut state, false).unwrap();
        let scanned_at = state.registry.last_scanned();

        catalog.set_failing(true);
        let err = discovery.get_projects(&mut state, true).unwrap_err();
        assert!(matches!(err, DiscoveryError::Catalog(_)));
        assert_eq!(state.registry.last_scanned(), scanned_at);
        assert_eq!(state.registry.view().master["Vol-A"][0].name, "Trip");
    }

    #[test]
    fn malformed_config_is_fatal() {
        let fs = MemoryFileSystem::new();
        let catalog = MemoryCatalog::new(Vec::new());
        let discovery = Discovery::new(&catalog, &fs);
        let mut state = DiscoveryState::new(
            StorageConfig::default()
                .with_group("1", StorageGroup::new(StorageSlot::new("AAA", "Same")))
                .with_group("2", StorageGroup::new(StorageSlot::new("BBB", "Same"))),
        );
        let err = discovery.get_projects(&mut state, false).unwrap_err();
        assert!(matches!(err, DiscoveryError::Config(_)));
        assert!(!state.registry.has_scanned());
        assert_eq!(catalog.listings(), 0);
    }

    #[test]
    fn invalidate_forces_next_read_to_scan() {
        let fs = MemoryFileSystem::new();
        fs.add_dir("D:/Projects/Trip");
        let catalog = MemoryCatalog::new(vec![drive("AAA", "D:")]);
        let discovery = Discovery::new(&catalog, &fs);
        let mut state = state();

        discovery.get_projects(&mut state, false).unwrap();
        let lists = fs.counters().list;
        invalidate_registry(&mut state);
        assert!(!state.registry.has_scanned());
        assert_eq!(fs.counters().list, lists);

        discovery.get_projects(&mut state, false).unwrap();
        assert_eq!(fs.counters().list, lists + 1);
    }

    #[test]
    fn stale_read_reaches_each_drive_once() {
        let fs = MemoryFileSystem::new();
        fs.add_dir("D:/Projects/Trip");
        let catalog = MemoryCatalog::new(vec![drive("AAA", "D:")]);
        let discovery = Discovery::new(&catalog, &fs);
        let mut state = state();
        discovery.get_projects(&mut state, false).unwrap();

        fs.reset_counters();
        discovery.get_projects(&mut state, false).unwrap();
        assert_eq!(fs.counters().probe, 1);
        assert_eq!(fs.counters().list, 0);

        fs.reset_counters();
        fs.touch("D:/Projects");
        discovery.get_projects(&mut state, false).unwrap();
        assert_eq!(fs.counters().probe, 1);
        assert_eq!(fs.counters().list, 1);
    }

    #[test]
    fn confirm_storage_reports_each_slot() {
        let fs = MemoryFileSystem::new();
        let catalog = MemoryCatalog::new(vec![drive("AAA", "D:")]);
        let discovery = Discovery::new(&catalog, &fs);
        let mut state = state();
        let statuses = discovery.confirm_storage(&mut state).unwrap();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].mount_path, "D:");
        assert_eq!(statuses[0].key.to_string(), "1.Master");
    }
}
