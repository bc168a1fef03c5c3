use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::catalog::PhysicalDrive;

pub const NOT_AVAILABLE: &str = "N/A";
pub const UNKNOWN: &str = "Unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DriveType {
    Master,
    Backup,
}

impl fmt::Display for DriveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriveType::Master => f.write_str("Master"),
            DriveType::Backup => f.write_str("Backup"),
        }
    }
}

/// Descriptive drive attributes copied from the catalog at scan time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriveMetadata {
    pub manufacturer: String,
    pub model: String,
    pub filesystem: String,
    pub partition_kind: String,
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub free_bytes: u64,
    pub health_status: String,
}

impl Default for DriveMetadata {
    fn default() -> Self {
        Self {
            manufacturer: NOT_AVAILABLE.to_string(),
            model: NOT_AVAILABLE.to_string(),
            filesystem: NOT_AVAILABLE.to_string(),
            partition_kind: NOT_AVAILABLE.to_string(),
            total_bytes: 0,
            used_bytes: 0,
            free_bytes: 0,
            health_status: UNKNOWN.to_string(),
        }
    }
}

impl DriveMetadata {
    pub fn from_catalog(drive: Option<&PhysicalDrive>) -> Self {
        let Some(drive) = drive else {
            return Self::default();
        };
        let used_bytes = if drive.used_bytes > 0 {
            drive.used_bytes
        } else {
            drive.total_bytes.saturating_sub(drive.free_bytes)
        };
        Self {
            manufacturer: or_default(&drive.manufacturer, NOT_AVAILABLE),
            model: or_default(&drive.model, NOT_AVAILABLE),
            filesystem: or_default(&drive.filesystem_type, NOT_AVAILABLE),
            partition_kind: or_default(&drive.partition_kind, NOT_AVAILABLE),
            total_bytes: drive.total_bytes,
            used_bytes,
            free_bytes: drive.free_bytes,
            health_status: or_default(&drive.health_status, UNKNOWN),
        }
    }
}

fn or_default(value: &Option<String>, fallback: &str) -> String {
    match value.as_deref().map(str::trim) {
        Some(value) if !value.is_empty() => value.to_string(),
        _ => fallback.to_string(),
    }
}

/// Drive-level attributes shared by every project on one drive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriveSummary {
    pub label: String,
    pub drive_letter: String,
    pub serial_number: String,
    pub storage_group: String,
    pub drive_type: DriveType,
    pub backup_id: Option<u32>,
    pub metadata: DriveMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub name: String,
    pub path: PathBuf,
    #[serde(flatten)]
    pub drive: DriveSummary,
}

impl ProjectRecord {
    pub fn new(drive: DriveSummary, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            drive,
        }
    }

    /// Stand-in for a reachable drive with no projects, so its metadata still shows.
    pub fn placeholder(drive: DriveSummary) -> Self {
        Self {
            name: String::new(),
            path: PathBuf::new(),
            drive,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.name.is_empty()
    }

    /// `driveType|label|backupId|serialNumber|name|path`
    pub fn identity_key(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}|{}",
            self.drive.drive_type,
            self.drive.label,
            self.drive.backup_id.map(|id| id.to_string()).unwrap_or_default(),
            self.drive.serial_number,
            self.name,
            self.path.display()
        )
    }
}

/// Compact cache unit: one copy of the drive attributes plus every project on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DriveRegistryEntry {
    pub drive: DriveSummary,
    pub projects: Vec<ProjectRecord>,
}

impl DriveRegistryEntry {
    /// Takes the drive attributes from the first record; `None` for an empty list.
    pub fn from_records(projects: Vec<ProjectRecord>) -> Option<Self> {
        let drive = projects.first()?.drive.clone();
        Some(Self { drive, projects })
    }

    pub fn real_project_count(&self) -> usize {
        self.projects.iter().filter(|p| !p.is_placeholder()).count()
    }
}

/// Master and Backup projects keyed by drive label.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProjectView {
    pub master: BTreeMap<String, Vec<ProjectRecord>>,
    pub backup: BTreeMap<String, Vec<ProjectRecord>>,
}

/// A Master project that one or more Backups of its group do not hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupGap {
    pub storage_group: String,
    pub project: String,
    pub master_label: String,
    pub missing_on: Vec<String>,
}

impl ProjectView {
    pub fn records(&self) -> impl Iterator<Item = &ProjectRecord> {
        self.master.values().chain(self.backup.values()).flatten()
    }

    pub fn real_project_count(&self) -> usize {
        self.records().filter(|p| !p.is_placeholder()).count()
    }

    /// Real projects named `name` on any drive. Placeholders never match.
    pub fn find(&self, name: &str) -> Vec<&ProjectRecord> {
        if name.is_empty() {
            return Vec::new();
        }
        self.records()
            .filter(|p| !p.is_placeholder() && p.name == name)
            .collect()
    }

    pub fn labels(&self) -> Vec<&str> {
        self.master
            .keys()
            .chain(self.backup.keys())
            .map(String::as_str)
            .collect()
    }

    pub fn missing_on_backups(&self) -> Vec<BackupGap> {
        let mut backups_by_group: BTreeMap<&str, BTreeMap<&str, BTreeSet<&str>>> = BTreeMap::new();
        for (label, records) in &self.backup {
            for record in records {
                let names = backups_by_group
                    .entry(record.drive.storage_group.as_str())
                    .or_default()
                    .entry(label.as_str())
                    .or_default();
                if !record.is_placeholder() {
                    names.insert(record.name.as_str());
                }
            }
        }

        let mut gaps = Vec::new();
        for (label, records) in &self.master {
            for record in records.iter().filter(|p| !p.is_placeholder()) {
                let Some(backups) = backups_by_group.get(record.drive.storage_group.as_str()) else {
                    continue;
                };
                let missing_on: Vec<String> = backups
                    .iter()
                    .filter(|(_, names)| !names.contains(record.name.as_str()))
                    .map(|(backup_label, _)| backup_label.to_string())
                    .collect();
                if !missing_on.is_empty() {
                    gaps.push(BackupGap {
                        storage_group: record.drive.storage_group.clone(),
                        project: record.name.clone(),
                        master_label: label.clone(),
                        missing_on,
                    });
                }
            }
        }
        gaps
    }
}
