use anyhow::{Context, Result};
use mediakeep_core::{CatalogSnapshot, HostInfo, PhysicalDrive};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

pub fn build_catalog() -> Result<CatalogSnapshot> {
    let host = HostInfo {
        os: "linux".to_string(),
        os_version: read_os_release(),
        machine: read_machine(),
    };
    let drives = list_physical_drives()?;
    Ok(CatalogSnapshot::new(host, drives))
}

/// One entry per physical disk with at least one mounted filesystem.
pub fn list_physical_drives() -> Result<Vec<PhysicalDrive>> {
    let mounts = parse_mounts(&fs::read_to_string("/proc/self/mounts").unwrap_or_default());
    let labels = read_labels();
    let mut drives = Vec::new();
    let entries = fs::read_dir("/sys/block").context("read /sys/block")?;
    for entry in entries {
        let entry = entry?;
        let disk_name = entry.file_name().to_string_lossy().to_string();
        if is_virtual_disk(&disk_name, entry.path()) {
            continue;
        }
        let Some((volume, mount)) = primary_mount(&disk_name, &entry.path(), &mounts)? else {
            tracing::debug!(disk = %disk_name, "no mounted filesystem, skipping");
            continue;
        };
        let udev = read_udev(&entry.path());
        let serial = udev
            .get("ID_SERIAL_SHORT")
            .cloned()
            .or_else(|| read_string(entry.path().join("device/serial")))
            .unwrap_or_default();
        if serial.trim().is_empty() {
            tracing::debug!(disk = %disk_name, "disk reports no serial number");
        }
        let (total_bytes, free_bytes) = space(&mount.mount_point).unwrap_or((0, 0));
        drives.push(PhysicalDrive {
            serial_number: serial,
            mount_path: mount.mount_point.clone(),
            label: labels.get(&volume).cloned(),
            manufacturer: udev
                .get("ID_VENDOR")
                .cloned()
                .or_else(|| read_string(entry.path().join("device/vendor"))),
            model: udev
                .get("ID_MODEL")
                .cloned()
                .or_else(|| read_string(entry.path().join("device/model"))),
            filesystem_type: Some(mount.fs_type.clone()),
            partition_kind: udev.get("ID_PART_TABLE_TYPE").cloned(),
            total_bytes,
            free_bytes,
            used_bytes: total_bytes.saturating_sub(free_bytes),
            health_status: None,
        });
    }
    tracing::debug!(count = drives.len(), "linux drives enumerated");
    Ok(drives)
}

/// Largest mounted partition of the disk, or the disk itself when it carries
/// a filesystem directly.
fn primary_mount(
    disk: &str,
    disk_path: &Path,
    mounts: &HashMap<String, Vec<MountInfo>>,
) -> Result<Option<(String, MountInfo)>> {
    let mut best: Option<(u64, String, MountInfo)> = None;
    let entries = fs::read_dir(disk_path).context("read disk entries")?;
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if !path.join("partition").exists() {
            continue;
        }
        let part_name = entry.file_name().to_string_lossy().to_string();
        let Some(info) = mounts.get(&part_name).and_then(|infos| infos.first()) else {
            continue;
        };
        let size = read_u64(path.join("size")).unwrap_or(0);
        if best.as_ref().map_or(true, |(current, _, _)| size > *current) {
            best = Some((size, part_name, info.clone()));
        }
    }
    if let Some((_, name, info)) = best {
        return Ok(Some((name, info)));
    }
    Ok(mounts
        .get(disk)
        .and_then(|infos| infos.first())
        .map(|info| (disk.to_string(), info.clone())))
}

#[cfg(unix)]
fn space(mount_point: &str) -> Option<(u64, u64)> {
    let path = std::ffi::CString::new(mount_point).ok()?;
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::statvfs(path.as_ptr(), &mut stat) };
    if rc != 0 {
        tracing::debug!(mount = mount_point, "statvfs failed");
        return None;
    }
    let block = stat.f_frsize as u64;
    Some((
        (stat.f_blocks as u64).saturating_mul(block),
        (stat.f_bavail as u64).saturating_mul(block),
    ))
}

#[cfg(not(unix))]
fn space(_mount_point: &str) -> Option<(u64, u64)> {
    None
}

fn read_udev(disk_path: &Path) -> HashMap<String, String> {
    let Some(dev) = read_string(disk_path.join("dev")) else {
        return HashMap::new();
    };
    let path = PathBuf::from(format!("/run/udev/data/b{dev}"));
    parse_udev(&fs::read_to_string(path).unwrap_or_default())
}

fn parse_udev(data: &str) -> HashMap<String, String> {
    data.lines()
        .filter_map(|line| line.strip_prefix("E:"))
        .filter_map(|pair| pair.split_once('='))
        .map(|(key, value)| (key.to_string(), value.trim().to_string()))
        .filter(|(_, value)| !value.is_empty())
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
struct MountInfo {
    mount_point: String,
    fs_type: String,
}

fn parse_mounts(data: &str) -> HashMap<String, Vec<MountInfo>> {
    let mut mounts: HashMap<String, Vec<MountInfo>> = HashMap::new();
    for line in data.lines() {
        let mut parts = line.split_whitespace();
        let (Some(device), Some(mount_point), Some(fs_type)) =
            (parts.next(), parts.next(), parts.next())
        else {
            continue;
        };
        if !device.starts_with("/dev/") {
            continue;
        }
        let name = Path::new(device)
            .file_name()
            .and_then(|value| value.to_str())
            .unwrap_or("")
            .to_string();
        if name.is_empty() {
            continue;
        }
        mounts.entry(name).or_default().push(MountInfo {
            mount_point: unescape_mount(mount_point),
            fs_type: fs_type.to_string(),
        });
    }
    mounts
}

fn read_labels() -> HashMap<String, String> {
    let mut labels = HashMap::new();
    if let Ok(entries) = fs::read_dir("/dev/disk/by-label") {
        for entry in entries.flatten() {
            if let Ok(target) = fs::read_link(entry.path()) {
                if let Some(name) = target.file_name().and_then(|v| v.to_str()) {
                    labels.insert(
                        name.to_string(),
                        unescape_mount(&entry.file_name().to_string_lossy()),
                    );
                }
            }
        }
    }
    labels
}

fn read_os_release() -> String {
    let data = fs::read_to_string("/etc/os-release").unwrap_or_default();
    let value = |key: &str| {
        data.lines()
            .find_map(|line| line.strip_prefix(key))
            .map(|rest| rest.trim().trim_matches('"').to_string())
    };
    match (value("NAME="), value("VERSION=")) {
        (Some(name), Some(version)) => format!("{} {}", name, version),
        (Some(name), None) => name,
        _ => "unknown".to_string(),
    }
}

fn read_machine() -> String {
    let vendor = read_string("/sys/devices/virtual/dmi/id/sys_vendor");
    let product = read_string("/sys/devices/virtual/dmi/id/product_name");
    match (vendor, product) {
        (Some(vendor), Some(product)) => format!("{} {}", vendor, product),
        (Some(vendor), None) => vendor,
        (None, Some(product)) => product,
        _ => read_string("/proc/sys/kernel/hostname").unwrap_or_else(|| "unknown".to_string()),
    }
}

fn read_string(path: impl AsRef<Path>) -> Option<String> {
    fs::read_to_string(path)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn read_u64(path: impl AsRef<Path>) -> Option<u64> {
    read_string(path).and_then(|value| value.parse::<u64>().ok())
}

/// Decodes the `\040`-style octal escapes used by the kernel and udev.
fn unescape_mount(value: &str) -> String {
    let mut output = String::new();
    let mut chars = value.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            output.push(ch);
            continue;
        }
        if chars.peek() == Some(&'x') {
            chars.next();
            let hex: String = chars.by_ref().take(2).collect();
            match u8::from_str_radix(&hex, 16) {
                Ok(byte) => output.push(byte as char),
                Err(_) => {
                    output.push_str("\\x");
                    output.push_str(&hex);
                }
            }
            continue;
        }
        let mut octal = String::new();
        while octal.len() < 3 {
            match chars.peek() {
                Some(next) if next.is_ascii_digit() => {
                    octal.push(*next);
                    chars.next();
                }
                _ => break,
            }
        }
        match u8::from_str_radix(&octal, 8) {
            Ok(byte) if octal.len() == 3 => output.push(byte as char),
            _ => {
                output.push('\\');
                output.push_str(&octal);
            }
        }
    }
    output
}

fn is_virtual_disk(name: &str, path: PathBuf) -> bool {
    if name.starts_with("loop") || name.starts_with("ram") || name.starts_with("zram") {
        return true;
    }
    if let Ok(target) = fs::canonicalize(path.join("device")) {
        if target.to_string_lossy().contains("/virtual/") {
            return true;
        }
    }
    false
}
