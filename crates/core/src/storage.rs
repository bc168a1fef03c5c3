//! Storage Group configuration: which physical disk plays which role.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize, Serializer};

use crate::error::DiscoveryError;
use crate::project::DriveType;

/// One physical-disk assignment within a Storage Group.
///
/// `drive_letter` and `is_available` are live state written by the resolver
/// and never read from or written to configuration files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSlot {
    #[serde(default)]
    pub serial_number: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub optional: bool,
    #[serde(skip)]
    pub drive_letter: String,
    #[serde(skip)]
    pub is_available: bool,
}

impl StorageSlot {
    pub fn new(serial_number: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            serial_number: serial_number.into(),
            label: label.into(),
            ..Default::default()
        }
    }

    pub fn optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    pub fn serial(&self) -> &str {
        self.serial_number.trim()
    }

    /// An empty serial means the slot is not configured and never validated.
    pub fn is_configured(&self) -> bool {
        !self.serial().is_empty()
    }

    /// Live mount root, if the last resolution found the device.
    pub fn mount_root(&self) -> Option<PathBuf> {
        if self.is_available && !self.drive_letter.trim().is_empty() {
            Some(drive_root(&self.drive_letter))
        } else {
            None
        }
    }

    pub fn mark_mounted(&mut self, mount_path: &str) {
        self.drive_letter = mount_path.to_string();
        self.is_available = true;
    }

    pub fn mark_missing(&mut self) {
        self.drive_letter.clear();
        self.is_available = false;
    }
}

/// Directory a mount path stands for. A bare drive prefix such as `D:` is
/// drive-relative on Windows, so it gains a separator and names the root.
pub fn drive_root(mount: &str) -> PathBuf {
    let mount = mount.trim();
    let bytes = mount.as_bytes();
    if bytes.len() == 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        PathBuf::from(format!("{mount}{}", std::path::MAIN_SEPARATOR))
    } else {
        PathBuf::from(mount)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageGroup {
    pub master: StorageSlot,
    #[serde(default)]
    pub backups: BTreeMap<u32, StorageSlot>,
}

impl StorageGroup {
    pub fn new(master: StorageSlot) -> Self {
        Self {
            master,
            backups: BTreeMap::new(),
        }
    }

    pub fn with_backup(mut self, id: u32, slot: StorageSlot) -> Self {
        self.backups.insert(id, slot);
        self
    }
}

/// Folder names used on every drive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FolderLayout {
    pub projects: String,
    pub global: String,
    pub assets: String,
}

impl Default for FolderLayout {
    fn default() -> Self {
        Self {
            projects: "Projects".to_string(),
            global: "_GLOBAL_".to_string(),
            assets: "Assets".to_string(),
        }
    }
}

impl FolderLayout {
    pub fn is_global(&self, name: &str) -> bool {
        name.eq_ignore_ascii_case(&self.global)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SlotRole {
    Master,
    Backup(u32),
}

/// Address of a slot: `<group>.Master` or `<group>.Backup.<id>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SlotKey {
    pub group: String,
    pub role: SlotRole,
}

impl SlotKey {
    pub fn master(group: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            role: SlotRole::Master,
        }
    }

    pub fn backup(group: impl Into<String>, id: u32) -> Self {
        Self {
            group: group.into(),
            role: SlotRole::Backup(id),
        }
    }

    pub fn drive_type(&self) -> DriveType {
        match self.role {
            SlotRole::Master => DriveType::Master,
            SlotRole::Backup(_) => DriveType::Backup,
        }
    }

    pub fn backup_id(&self) -> Option<u32> {
        match self.role {
            SlotRole::Master => None,
            SlotRole::Backup(id) => Some(id),
        }
    }
}

impl Serialize for SlotKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.role {
            SlotRole::Master => write!(f, "{}.Master", self.group),
            SlotRole::Backup(id) => write!(f, "{}.Backup.{}", self.group, id),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub layout: FolderLayout,
    #[serde(default)]
    pub groups: BTreeMap<String, StorageGroup>,
}

impl StorageConfig {
    pub fn with_group(mut self, id: impl Into<String>, group: StorageGroup) -> Self {
        self.groups.insert(id.into(), group);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Group ids in ascending order; numeric ids compare numerically.
    pub fn group_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.groups.keys().map(String::as_str).collect();
        ids.sort_by(|a, b| compare_group_ids(a, b));
        ids
    }

    /// Every slot, Master first then backups by id, groups in [`Self::group_ids`] order.
    pub fn slots(&self) -> Vec<(SlotKey, &StorageSlot)> {
        let mut slots = Vec::new();
        for id in self.group_ids() {
            let Some(group) = self.groups.get(id) else {
                continue;
            };
            slots.push((SlotKey::master(id), &group.master));
            for (backup_id, slot) in &group.backups {
                slots.push((SlotKey::backup(id, *backup_id), slot));
            }
        }
        slots
    }

    pub fn slot_keys(&self) -> Vec<SlotKey> {
        self.slots().into_iter().map(|(key, _)| key).collect()
    }

    pub fn slot(&self, key: &SlotKey) -> Option<&StorageSlot> {
        let group = self.groups.get(&key.group)?;
        match key.role {
            SlotRole::Master => Some(&group.master),
            SlotRole::Backup(id) => group.backups.get(&id),
        }
    }

    pub fn slot_mut(&mut self, key: &SlotKey) -> Option<&mut StorageSlot> {
        let group = self.groups.get_mut(&key.group)?;
        match key.role {
            SlotRole::Master => Some(&mut group.master),
            SlotRole::Backup(id) => group.backups.get_mut(&id),
        }
    }

    pub fn validate(&self) -> Result<(), DiscoveryError> {
        let mut labels: HashMap<&str, SlotKey> = HashMap::new();
        for (id, group) in &self.groups {
            if id.trim().is_empty() {
                return Err(DiscoveryError::Config(
                    "storage group id cannot be empty".to_string(),
                ));
            }
            if group.backups.contains_key(&0) {
                return Err(DiscoveryError::Config(format!(
                    "storage group {id}: backup ids start at 1"
                )));
            }
        }
        for (key, slot) in self.slots() {
            if !slot.is_configured() {
                continue;
            }
            let label = slot.label.trim();
            if label.is_empty() {
                return Err(DiscoveryError::Config(format!(
                    "{key}: serial {} has no label",
                    slot.serial()
                )));
            }
            if let Some(previous) = labels.insert(label, key.clone()) {
                return Err(DiscoveryError::Config(format!(
                    "label {label} is used by both {previous} and {key}"
                )));
            }
        }
        Ok(())
    }
}

fn compare_group_ids(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

/// Keyed validation failures from the last resolution pass. First message wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationErrors {
    entries: BTreeMap<String, String>,
}

impl ValidationErrors {
    /// Returns false when the key already carried a message.
    pub fn record(&mut self, key: &SlotKey, message: impl Into<String>) -> bool {
        let key = key.to_string();
        if self.entries.contains_key(&key) {
            return false;
        }
        self.entries.insert(key, message.into());
        true
    }

    pub fn contains(&self, key: &SlotKey) -> bool {
        self.entries.contains_key(&key.to_string())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(key, message)| (key.as_str(), message.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> StorageConfig {
        StorageConfig::default()
            .with_group(
                "10",
                StorageGroup::new(StorageSlot::new("CCC", "Vol-C")),
            )
            .with_group(
                "2",
                StorageGroup::new(StorageSlot::new("AAA", "Vol-A"))
                    .with_backup(3, StorageSlot::new("DDD", "Vol-D"))
                    .with_backup(1, StorageSlot::new("BBB", "Vol-B")),
            )
    }

    #[test]
    fn bare_drive_prefix_becomes_root() {
        let sep = std::path::MAIN_SEPARATOR;
        assert_eq!(drive_root("D:"), PathBuf::from(format!("D:{sep}")));
        assert_eq!(drive_root(" e: "), PathBuf::from(format!("e:{sep}")));
        assert_eq!(drive_root("/mnt/media"), PathBuf::from("/mnt/media"));
        assert_eq!(drive_root("D:\\"), PathBuf::from("D:\\"));

        let mut slot = StorageSlot::new("AAA", "Vol-A");
        slot.mark_mounted("D:");
        assert_eq!(slot.mount_root(), Some(PathBuf::from(format!("D:{sep}"))));
    }

    #[cfg(windows)]
    #[test]
    fn drive_root_joins_to_absolute_path() {
        let projects = drive_root("D:").join("Projects");
        assert!(projects.is_absolute());
        assert_eq!(projects, PathBuf::from(r"D:\Projects"));
    }

    #[test]
    fn slot_key_display() {
        assert_eq!(SlotKey::master("1").to_string(), "1.Master");
        assert_eq!(SlotKey::backup("1", 2).to_string(), "1.Backup.2");
    }

    #[test]
    fn slots_follow_numeric_group_order_then_backup_ids() {
        let config = sample();
        let keys: Vec<String> = config.slot_keys().iter().map(ToString::to_string).collect();
        assert_eq!(
            keys,
            vec!["2.Master", "2.Backup.1", "2.Backup.3", "10.Master"]
        );
    }

    #[test]
    fn validate_rejects_duplicate_labels() {
        let config = sample().with_group(
            "3",
            StorageGroup::new(StorageSlot::new("EEE", "Vol-A")),
        );
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Vol-A"));
    }

    #[test]
    fn validate_rejects_backup_zero_and_unlabeled_serials() {
        let zero = StorageConfig::default().with_group(
            "1",
            StorageGroup::new(StorageSlot::new("AAA", "Vol-A"))
                .with_backup(0, StorageSlot::new("BBB", "Vol-B")),
        );
        assert!(zero.validate().is_err());

        let unlabeled = StorageConfig::default()
            .with_group("1", StorageGroup::new(StorageSlot::new("AAA", " ")));
        assert!(unlabeled.validate().is_err());
    }

    #[test]
    fn unconfigured_slots_skip_validation() {
        let config = StorageConfig::default()
            .with_group("1", StorageGroup::new(StorageSlot::new("AAA", "Vol-A")))
            .with_group("2", StorageGroup::new(StorageSlot::new("  ", "")));
        assert!(config.validate().is_ok());
        assert!(!config.slot(&SlotKey::master("2")).unwrap().is_configured());
    }

    #[test]
    fn validation_errors_keep_first_message() {
        let mut errors = ValidationErrors::default();
        let key = SlotKey::backup("1", 1);
        assert!(errors.record(&key, "first"));
        assert!(!errors.record(&key, "second"));
        assert_eq!(errors.get("1.Backup.1"), Some("first"));
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn live_fields_are_not_serialized() {
        let mut slot = StorageSlot::new("AAA", "Vol-A");
        slot.mark_mounted("D:");
        let json = serde_json::to_string(&slot).unwrap();
        assert!(!json.contains("D:"));
        let back: StorageSlot = serde_json::from_str(&json).unwrap();
        assert!(!back.is_available);
        assert!(back.drive_letter.is_empty());
    }

    #[test]
    fn mount_root_requires_availability() {
        let mut slot = StorageSlot::new("AAA", "Vol-A");
        assert!(slot.mount_root().is_none());
        slot.mark_mounted("/mnt/a");
        assert_eq!(slot.mount_root(), Some(PathBuf::from("/mnt/a")));
        slot.mark_missing();
        assert!(slot.mount_root().is_none());
    }
}
