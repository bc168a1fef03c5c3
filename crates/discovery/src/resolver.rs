//! Storage Device Resolver: maps configured serial numbers to live mounts.

use mediakeep_core::{
    DiscoveryError, PhysicalDrive, SlotKey, StorageConfig, StorageSlot, ValidationErrors,
};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SlotState {
    /// Empty serial; never validated.
    Unconfigured,
    Mounted,
    Missing,
    /// Absent, but the slot is optional so nothing was recorded.
    MissingOptional,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageStatus {
    pub key: SlotKey,
    pub label: String,
    pub serial_number: String,
    pub mount_path: String,
    pub state: SlotState,
}

/// Looks `slot` up in `drives` by serial and updates its live fields in place.
///
/// A non-optional slot with no matching drive gets one entry in `errors`
/// under its key; an existing entry for that key is kept.
pub fn resolve_slot(
    key: &SlotKey,
    slot: &mut StorageSlot,
    drives: &[PhysicalDrive],
    errors: &mut ValidationErrors,
) -> SlotState {
    if !slot.is_configured() {
        slot.mark_missing();
        return SlotState::Unconfigured;
    }

    let serial = slot.serial().to_string();
    let found = drives
        .iter()
        .find(|drive| !drive.serial().is_empty() && drive.serial() == serial);

    match found {
        Some(drive) => {
            slot.mark_mounted(&drive.mount_path);
            tracing::debug!(slot = %key, serial = %serial, mount = %drive.mount_path, "drive resolved");
            SlotState::Mounted
        }
        None => {
            slot.mark_missing();
            if slot.optional {
                tracing::info!(slot = %key, serial = %serial, label = %slot.label, "optional drive not attached");
                return SlotState::MissingOptional;
            }
            let err = DiscoveryError::DeviceNotFound {
                key: key.to_string(),
                serial: serial.clone(),
            };
            if errors.record(key, err.to_string()) {
                tracing::warn!(slot = %key, serial = %serial, label = %slot.label, "required drive not attached");
            }
            SlotState::Missing
        }
    }
}

/// Resolves every slot in deterministic order, starting from a clean error tracker.
pub fn confirm_storage(
    storage: &mut StorageConfig,
    drives: &[PhysicalDrive],
    errors: &mut ValidationErrors,
) -> Vec<StorageStatus> {
    errors.clear();
    let mut statuses = Vec::new();
    for key in storage.slot_keys() {
        let Some(slot) = storage.slot_mut(&key) else {
            continue;
        };
        let state = resolve_slot(&key, slot, drives, errors);
        statuses.push(StorageStatus {
            label: slot.label.clone(),
            serial_number: slot.serial().to_string(),
            mount_path: slot.drive_letter.clone(),
            state,
            key,
        });
    }
    let mounted = statuses
        .iter()
        .filter(|status| status.state == SlotState::Mounted)
        .count();
    tracing::info!(mounted, slots = statuses.len(), missing = errors.len(), "storage confirmed");
    statuses
}
