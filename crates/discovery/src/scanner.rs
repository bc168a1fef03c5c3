//! Project Discovery Scanner: lists the `Projects` folder of one resolved drive.

use std::path::Path;

use mediakeep_core::{
    drive_root, DiscoveryError, DriveMetadata, DriveSummary, ErrorPolicy, FolderLayout, PhysicalDrive,
    ProjectRecord, SlotKey, StorageSlot, ValidationErrors,
};
use time::OffsetDateTime;

use crate::fs::FileSystem;
use crate::registry::tracking_key;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Unconfigured,
    /// The resolver already recorded this required slot as missing.
    KnownMissing,
    Unmounted,
    Unreachable,
    ListingFailed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DriveOutcome {
    Scanned {
        records: Vec<ProjectRecord>,
        /// `(<serial>_Projects, mtime)` when the folder could be stat'ed.
        tracked: Option<(String, OffsetDateTime)>,
    },
    Skipped(SkipReason),
}

impl DriveOutcome {
    pub fn records(&self) -> &[ProjectRecord] {
        match self {
            DriveOutcome::Scanned { records, .. } => records,
            DriveOutcome::Skipped(_) => &[],
        }
    }
}

pub struct Scanner<'a, F> {
    fs: &'a F,
    layout: &'a FolderLayout,
    test_mode: bool,
}

impl<'a, F: FileSystem> Scanner<'a, F> {
    pub fn new(fs: &'a F, layout: &'a FolderLayout) -> Self {
        Self {
            fs,
            layout,
            test_mode: false,
        }
    }

    /// Skips the live reachability probe; every mounted slot counts as reachable.
    pub fn test_mode(mut self, enabled: bool) -> Self {
        self.test_mode = enabled;
        self
    }

    pub fn scan_drive(
        &self,
        key: &SlotKey,
        slot: &StorageSlot,
        errors: &ValidationErrors,
        drives: &[PhysicalDrive],
    ) -> DriveOutcome {
        if !slot.is_configured() {
            return DriveOutcome::Skipped(SkipReason::Unconfigured);
        }
        if !slot.optional && errors.contains(key) {
            tracing::debug!(slot = %key, "skipping drive with recorded validation error");
            return DriveOutcome::Skipped(SkipReason::KnownMissing);
        }
        let mount = slot.drive_letter.trim();
        if mount.is_empty() {
            return DriveOutcome::Skipped(SkipReason::Unmounted);
        }
        let root = drive_root(mount);
        if !self.test_mode && !self.fs.probe(&root) {
            log_failure(
                key,
                &DiscoveryError::Unreachable {
                    label: slot.label.clone(),
                    path: root,
                },
            );
            return DriveOutcome::Skipped(SkipReason::Unreachable);
        }

        let serial = slot.serial();
        let catalog_entry = drives.iter().find(|drive| drive.serial() == serial);
        let summary = DriveSummary {
            label: slot.label.clone(),
            drive_letter: mount.to_string(),
            serial_number: serial.to_string(),
            storage_group: key.group.clone(),
            drive_type: key.drive_type(),
            backup_id: key.backup_id(),
            metadata: DriveMetadata::from_catalog(catalog_entry),
        };

        let projects_dir = root.join(&self.layout.projects);
        if !self.fs.exists(&projects_dir) {
            if let Err(err) = self.fs.make_dir(&projects_dir) {
                log_failure(key, &DiscoveryError::create_dir(&projects_dir, err));
                return DriveOutcome::Scanned {
                    records: vec![ProjectRecord::placeholder(summary)],
                    tracked: None,
                };
            }
            tracing::info!(slot = %key, path = %projects_dir.display(), "created projects folder");
        }

        // Reserved folders first, so the timestamp below already reflects them.
        self.ensure_global(key, &projects_dir);

        let tracked = match self.fs.modified(&projects_dir) {
            Ok(modified) => Some((tracking_key(serial), modified)),
            Err(err) => {
                log_failure(key, &DiscoveryError::stat(&projects_dir, err));
                None
            }
        };

        let entries = match self.fs.list_subdirectories(&projects_dir) {
            Ok(entries) => entries,
            Err(err) => {
                log_failure(key, &DiscoveryError::io(&projects_dir, err));
                return DriveOutcome::Skipped(SkipReason::ListingFailed);
            }
        };

        let mut records: Vec<ProjectRecord> = entries
            .into_iter()
            .filter(|entry| !self.layout.is_global(&entry.name))
            .map(|entry| ProjectRecord::new(summary.clone(), entry.name, entry.full_path))
            .collect();
        if records.is_empty() {
            records.push(ProjectRecord::placeholder(summary));
        }

        let count = records.iter().filter(|record| !record.is_placeholder()).count();
        tracing::info!(
            outcome = "success",
            slot = %key,
            label = %slot.label,
            count,
            "drive scanned"
        );
        DriveOutcome::Scanned { records, tracked }
    }

    fn ensure_global(&self, key: &SlotKey, projects_dir: &Path) {
        let assets = projects_dir
            .join(&self.layout.global)
            .join(&self.layout.assets);
        if self.fs.exists(&assets) {
            return;
        }
        match self.fs.make_dir(&assets) {
            Ok(()) => tracing::debug!(slot = %key, path = %assets.display(), "created shared assets folder"),
            Err(err) => log_failure(key, &DiscoveryError::create_dir(&assets, err)),
        }
    }
}

pub(crate) fn log_failure(key: &SlotKey, err: &DiscoveryError) {
    match err.policy() {
        ErrorPolicy::SkipDrive => tracing::warn!(slot = %key, error = %err, "drive skipped for this pass"),
        ErrorPolicy::LogAndContinue => tracing::warn!(slot = %key, error = %err, "continuing without folder"),
        ErrorPolicy::AbortScan => tracing::error!(slot = %key, error = %err, "discovery aborted"),
    }
}
