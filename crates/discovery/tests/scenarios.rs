use std::path::{Path, PathBuf};
use std::sync::Arc;

use mediakeep_core::{DriveType, PhysicalDrive, StorageConfig, StorageGroup, StorageSlot};
use mediakeep_discovery::memory::{MemoryCatalog, MemoryFileSystem};
use mediakeep_discovery::{Discovery, DiscoveryState, FileSystem, SlotState};

fn drive(serial: &str, mount: &str) -> PhysicalDrive {
    PhysicalDrive {
        serial_number: serial.to_string(),
        mount_path: mount.to_string(),
        label: Some(format!("{serial}-vol")),
        total_bytes: 2_000,
        free_bytes: 500,
        ..Default::default()
    }
}

fn storage(backup_optional: bool) -> StorageConfig {
    StorageConfig::default().with_group(
        "1",
        StorageGroup::new(StorageSlot::new("AAA", "Vol-A"))
            .with_backup(1, StorageSlot::new("BBB", "Vol-B").optional(backup_optional)),
    )
}

/// Vol-A at D: holding Trip2024 and the shared folder; Vol-B at E: with an empty Projects.
fn two_drive_setup() -> (MemoryFileSystem, MemoryCatalog) {
    let fs = MemoryFileSystem::new();
    fs.add_dir(Path::new("D:").join("Projects").join("Trip2024"));
    fs.add_dir(Path::new("D:").join("Projects").join("_GLOBAL_").join("Assets"));
    fs.add_dir(Path::new("E:").join("Projects"));
    let catalog = MemoryCatalog::new(vec![drive("AAA", "D:"), drive("BBB", "E:")]);
    (fs, catalog)
}

#[test]
fn forced_scan_returns_master_projects_and_backup_placeholder() {
    let (fs, catalog) = two_drive_setup();
    let discovery = Discovery::new(&catalog, &fs);
    let mut state = DiscoveryState::new(storage(false));

    let view = discovery.get_projects(&mut state, true).unwrap();

    let master = &view.master["Vol-A"];
    assert_eq!(master.len(), 1);
    assert_eq!(master[0].name, "Trip2024");
    assert_eq!(master[0].path, Path::new("D:").join("Projects").join("Trip2024"));
    assert_eq!(master[0].drive.storage_group, "1");
    assert_eq!(master[0].drive.drive_type, DriveType::Master);
    assert_eq!(master[0].drive.backup_id, None);
    assert_eq!(master[0].drive.metadata.used_bytes, 1_500);

    let backup = &view.backup["Vol-B"];
    assert_eq!(backup.len(), 1);
    assert!(backup[0].is_placeholder());
    assert_eq!(backup[0].path, PathBuf::new());
    assert_eq!(backup[0].drive.storage_group, "1");
    assert_eq!(backup[0].drive.drive_type, DriveType::Backup);
    assert_eq!(backup[0].drive.backup_id, Some(1));

    assert!(fs.exists(&Path::new("E:").join("Projects").join("_GLOBAL_").join("Assets")));
}

#[test]
fn second_read_is_served_from_cache() {
    let (fs, catalog) = two_drive_setup();
    let discovery = Discovery::new(&catalog, &fs);
    let mut state = DiscoveryState::new(storage(false));

    discovery.get_projects(&mut state, false).unwrap();
    let scanned_at = state.registry.last_scanned();
    fs.reset_counters();

    let view = discovery.get_projects(&mut state, false).unwrap();
    let counters = fs.counters();
    assert_eq!(counters.list, 0);
    assert_eq!(counters.make_dir, 0);
    assert_eq!(state.registry.last_scanned(), scanned_at);
    assert_eq!(view.master["Vol-A"][0].name, "Trip2024");
}

#[test]
fn projects_folder_change_triggers_rescan() {
    let (fs, catalog) = two_drive_setup();
    let discovery = Discovery::new(&catalog, &fs);
    let mut state = DiscoveryState::new(storage(false));

    discovery.get_projects(&mut state, false).unwrap();
    fs.add_dir(Path::new("E:").join("Projects").join("Trip2024"));
    fs.reset_counters();

    let view = discovery.get_projects(&mut state, false).unwrap();
    assert_eq!(fs.counters().list, 2);
    assert_eq!(view.backup["Vol-B"][0].name, "Trip2024");
    assert!(view.missing_on_backups().is_empty());
}

#[test]
fn shared_folder_never_appears_as_a_project() {
    let fs = MemoryFileSystem::new();
    fs.add_dir(Path::new("D:").join("Projects").join("_global_"));
    fs.add_dir(Path::new("E:").join("Projects").join("_GLOBAL_").join("Assets"));
    let catalog = MemoryCatalog::new(vec![drive("AAA", "D:"), drive("BBB", "E:")]);
    let discovery = Discovery::new(&catalog, &fs);
    let mut state = DiscoveryState::new(storage(false));

    let view = discovery.get_projects(&mut state, true).unwrap();
    assert!(view.records().all(|record| !record.name.eq_ignore_ascii_case("_GLOBAL_")));
    for label in ["Vol-A", "Vol-B"] {
        let records = view.master.get(label).or_else(|| view.backup.get(label)).unwrap();
        assert_eq!(records.len(), 1, "{label}");
        assert!(records[0].is_placeholder());
    }
}

#[test]
fn optional_backup_absence_records_nothing() {
    let fs = MemoryFileSystem::new();
    fs.add_dir(Path::new("D:").join("Projects").join("Trip2024"));
    let catalog = MemoryCatalog::new(vec![drive("AAA", "D:")]);
    let discovery = Discovery::new(&catalog, &fs);

    let mut optional = DiscoveryState::new(storage(true));
    let statuses = discovery.confirm_storage(&mut optional).unwrap();
    assert_eq!(statuses[1].state, SlotState::MissingOptional);
    assert!(optional.validation.is_empty());

    let mut required = DiscoveryState::new(storage(false));
    discovery.get_projects(&mut required, false).unwrap();
    assert_eq!(required.validation.len(), 1);
    assert!(required.validation.get("1.Backup.1").is_some());
}

#[test]
fn identical_rescan_leaves_entries_untouched() {
    let (fs, catalog) = two_drive_setup();
    let discovery = Discovery::new(&catalog, &fs);
    let mut state = DiscoveryState::new(storage(false));

    discovery.get_projects(&mut state, true).unwrap();
    let master = Arc::clone(state.registry.master());
    let backup = Arc::clone(state.registry.backup());
    let first_scan = state.registry.last_scanned();

    discovery.get_projects(&mut state, true).unwrap();
    assert!(Arc::ptr_eq(&master, state.registry.master()));
    assert!(Arc::ptr_eq(&backup, state.registry.backup()));
    assert!(state.registry.last_scanned() >= first_scan);
}

fn master_names(state: &DiscoveryState) -> Vec<String> {
    state.registry.master()["Vol-A"]
        .projects
        .iter()
        .map(|record| record.name.clone())
        .collect()
}

#[test]
fn removed_projects_leave_the_registry() {
    let (fs, catalog) = two_drive_setup();
    fs.add_dir(Path::new("D:").join("Projects").join("Wedding"));
    let discovery = Discovery::new(&catalog, &fs);
    let mut state = DiscoveryState::new(storage(false));
    discovery.get_projects(&mut state, false).unwrap();
    assert_eq!(master_names(&state), vec!["Trip2024", "Wedding"]);
    let master = Arc::clone(state.registry.master());

    fs.remove_dir(Path::new("D:").join("Projects").join("Wedding"));
    discovery.get_projects(&mut state, false).unwrap();
    assert_eq!(master_names(&state), vec!["Trip2024"]);
    assert!(!Arc::ptr_eq(&master, state.registry.master()));

    fs.remove_dir(Path::new("D:").join("Projects").join("Trip2024"));
    let view = discovery.get_projects(&mut state, false).unwrap();
    let records = &view.master["Vol-A"];
    assert_eq!(records.len(), 1);
    assert!(records[0].is_placeholder());
}

#[test]
fn renamed_project_replaces_the_old_record() {
    let (fs, catalog) = two_drive_setup();
    let discovery = Discovery::new(&catalog, &fs);
    let mut state = DiscoveryState::new(storage(false));
    discovery.get_projects(&mut state, false).unwrap();
    let master = Arc::clone(state.registry.master());

    fs.remove_dir(Path::new("D:").join("Projects").join("Trip2024"));
    fs.add_dir(Path::new("D:").join("Projects").join("Trip2024-final"));
    let view = discovery.get_projects(&mut state, false).unwrap();

    assert_eq!(master_names(&state), vec!["Trip2024-final"]);
    assert_eq!(
        view.master["Vol-A"][0].path,
        Path::new("D:").join("Projects").join("Trip2024-final")
    );
    assert!(!Arc::ptr_eq(&master, state.registry.master()));
}

#[test]
fn drive_reattached_at_new_mount_is_rescanned() {
    let (fs, catalog) = two_drive_setup();
    fs.add_dir(Path::new("F:").join("Projects").join("Trip2024"));
    let discovery = Discovery::new(&catalog, &fs);
    let mut state = DiscoveryState::new(storage(false));
    discovery.get_projects(&mut state, false).unwrap();
    let master = Arc::clone(state.registry.master());

    catalog.detach("AAA");
    catalog.attach(drive("AAA", "F:"));
    let view = discovery.get_projects(&mut state, false).unwrap();

    let record = &view.master["Vol-A"][0];
    assert_eq!(record.name, "Trip2024");
    assert_eq!(record.drive.drive_letter, "F:");
    assert_eq!(record.path, Path::new("F:").join("Projects").join("Trip2024"));
    assert!(!Arc::ptr_eq(&master, state.registry.master()));
}

#[test]
fn touched_folder_rescans_without_replacing_entries() {
    let (fs, catalog) = two_drive_setup();
    let discovery = Discovery::new(&catalog, &fs);
    let mut state = DiscoveryState::new(storage(false));
    discovery.get_projects(&mut state, false).unwrap();
    let master = Arc::clone(state.registry.master());
    let backup = Arc::clone(state.registry.backup());
    let first_scan = state.registry.last_scanned();

    fs.touch(Path::new("D:").join("Projects"));
    fs.reset_counters();
    discovery.get_projects(&mut state, false).unwrap();
    assert_eq!(fs.counters().list, 2);
    assert!(Arc::ptr_eq(&master, state.registry.master()));
    assert!(Arc::ptr_eq(&backup, state.registry.backup()));
    assert!(state.registry.last_scanned() >= first_scan);

    fs.reset_counters();
    discovery.get_projects(&mut state, false).unwrap();
    assert_eq!(fs.counters().list, 0);
}

#[test]
fn absent_backup_is_skipped_and_master_unaffected() {
    let (fs, catalog) = two_drive_setup();
    let discovery = Discovery::new(&catalog, &fs);
    let mut state = DiscoveryState::new(storage(false));
    let before = discovery.get_projects(&mut state, true).unwrap();

    catalog.detach("BBB");
    fs.set_unreachable("E:", true);
    fs.reset_counters();

    let after = discovery.get_projects(&mut state, true).unwrap();
    let backup_slot = state.storage.groups["1"].backups[&1u32].clone();
    assert!(!backup_slot.is_available);
    assert!(backup_slot.drive_letter.is_empty());
    assert_eq!(fs.counters().list, 1);
    assert_eq!(after.master, before.master);
    assert_eq!(after.backup["Vol-B"], before.backup["Vol-B"]);
}

#[test]
fn unreachable_drive_keeps_its_cached_entry() {
    let (fs, catalog) = two_drive_setup();
    fs.add_dir(Path::new("E:").join("Projects").join("Trip2024"));
    let discovery = Discovery::new(&catalog, &fs);
    let mut state = DiscoveryState::new(storage(false));
    discovery.get_projects(&mut state, false).unwrap();

    fs.set_unreachable("E:", true);
    let view = discovery.get_projects(&mut state, true).unwrap();
    assert_eq!(view.backup["Vol-B"][0].name, "Trip2024");
    assert!(state.validation.is_empty());
}

#[test]
fn test_mode_skips_probing() {
    let (fs, catalog) = two_drive_setup();
    let discovery = Discovery::new(&catalog, &fs).test_mode(true);
    let mut state = DiscoveryState::new(storage(false));

    discovery.get_projects(&mut state, false).unwrap();
    discovery.get_projects(&mut state, false).unwrap();
    assert_eq!(fs.counters().probe, 0);
}
