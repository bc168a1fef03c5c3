use anyhow::{anyhow, Context, Result};
use mediakeep_core::{CatalogSnapshot, PhysicalDrive};
#[cfg(target_os = "macos")]
use mediakeep_core::HostInfo;
use plist::{Dictionary, Value};

pub fn build_catalog() -> Result<CatalogSnapshot> {
    #[cfg(target_os = "macos")]
    {
        let host = HostInfo {
            os: "macos".to_string(),
            os_version: read_os_version(),
            machine: read_machine(),
        };
        let drives = list_physical_drives()?;
        Ok(CatalogSnapshot::new(host, drives))
    }

    #[cfg(not(target_os = "macos"))]
    {
        Err(anyhow!("mediakeep-host-macos requires macOS"))
    }
}

/// Mounted `/dev/disk*` volumes, described by `diskutil info -plist`.
pub fn list_physical_drives() -> Result<Vec<PhysicalDrive>> {
    #[cfg(target_os = "macos")]
    {
        let mut drives = Vec::new();
        for mount in read_mounts()? {
            if !mount.device.starts_with("/dev/disk") {
                continue;
            }
            let info = match diskutil_info(&mount.mount_point) {
                Ok(info) => info,
                Err(err) => {
                    tracing::debug!(mount = %mount.mount_point, error = %err, "diskutil info failed");
                    Dictionary::new()
                }
            };
            let mut drive = drive_from_info(&info, &mount.mount_point);
            if drive.filesystem_type.is_none() {
                drive.filesystem_type = Some(mount.fs_type.clone());
            }
            if drive.total_bytes == 0 {
                drive.total_bytes = mount.total_bytes;
                drive.free_bytes = mount.free_bytes;
                drive.used_bytes = mount.total_bytes.saturating_sub(mount.free_bytes);
            }
            drives.push(drive);
        }
        tracing::debug!(count = drives.len(), "macos drives enumerated");
        Ok(drives)
    }

    #[cfg(not(target_os = "macos"))]
    {
        Err(anyhow!("mediakeep-host-macos requires macOS"))
    }
}

pub fn parse_diskutil_info(data: &[u8]) -> Result<Dictionary> {
    let value = Value::from_reader(std::io::Cursor::new(data)).context("parse diskutil plist")?;
    value
        .into_dictionary()
        .ok_or_else(|| anyhow!("diskutil plist is not a dictionary"))
}

/// Maps a `diskutil info` dictionary onto a catalog entry. The volume UUID
/// stands in for the serial number, which diskutil does not expose.
pub fn drive_from_info(info: &Dictionary, mount_point: &str) -> PhysicalDrive {
    let text = |key: &str| {
        info.get(key)
            .and_then(Value::as_string)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };
    let number = |key: &str| info.get(key).and_then(Value::as_unsigned_integer);

    let total_bytes = number("TotalSize").or_else(|| number("Size")).unwrap_or(0);
    let free_bytes = number("APFSContainerFree")
        .or_else(|| number("FreeSpace"))
        .unwrap_or(0);
    PhysicalDrive {
        serial_number: text("VolumeUUID").or_else(|| text("DiskUUID")).unwrap_or_default(),
        mount_path: text("MountPoint").unwrap_or_else(|| mount_point.to_string()),
        label: text("VolumeName"),
        manufacturer: text("BusProtocol"),
        model: text("MediaName").or_else(|| text("IORegistryEntryName")),
        filesystem_type: text("FilesystemName").or_else(|| text("FilesystemType")),
        partition_kind: text("Content"),
        total_bytes,
        free_bytes,
        used_bytes: total_bytes.saturating_sub(free_bytes),
        health_status: text("SMARTStatus"),
    }
}

#[cfg(target_os = "macos")]
fn diskutil_info(mount_point: &str) -> Result<Dictionary> {
    let output = std::process::Command::new("diskutil")
        .args(["info", "-plist", mount_point])
        .output()
        .context("run diskutil")?;
    if !output.status.success() {
        return Err(anyhow!(
            "diskutil info failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }
    parse_diskutil_info(&output.stdout)
}

#[cfg(target_os = "macos")]
#[derive(Debug, Clone)]
struct MountEntry {
    device: String,
    mount_point: String,
    fs_type: String,
    total_bytes: u64,
    free_bytes: u64,
}

#[cfg(target_os = "macos")]
fn read_mounts() -> Result<Vec<MountEntry>> {
    use libc::{getfsstat, statfs, MNT_NOWAIT};
    use std::ffi::CStr;
    use std::mem::size_of;
    use std::ptr;

    let count = unsafe { getfsstat(ptr::null_mut(), 0, MNT_NOWAIT) };
    if count < 0 {
        return Err(anyhow!("getfsstat failed"));
    }
    let mut buf = vec![unsafe { std::mem::zeroed::<statfs>() }; count as usize];
    let res = unsafe {
        getfsstat(
            buf.as_mut_ptr(),
            (buf.len() * size_of::<statfs>()) as i32,
            MNT_NOWAIT,
        )
    };
    if res < 0 {
        return Err(anyhow!("getfsstat returned error"));
    }

    let mut entries = Vec::new();
    for entry in buf.into_iter().take(res as usize) {
        let device = unsafe { CStr::from_ptr(entry.f_mntfromname.as_ptr()) }
            .to_string_lossy()
            .to_string();
        let mount_point = unsafe { CStr::from_ptr(entry.f_mntonname.as_ptr()) }
            .to_string_lossy()
            .to_string();
        let fs_type = unsafe { CStr::from_ptr(entry.f_fstypename.as_ptr()) }
            .to_string_lossy()
            .to_string();
        let block = entry.f_bsize as u64;
        entries.push(MountEntry {
            device,
            mount_point,
            fs_type,
            total_bytes: (entry.f_blocks as u64).saturating_mul(block),
            free_bytes: (entry.f_bavail as u64).saturating_mul(block),
        });
    }
    Ok(entries)
}

#[cfg(target_os = "macos")]
fn read_os_version() -> String {
    sysctl_string("kern.osproductversion")
        .or_else(|| sysctl_string("kern.osrelease"))
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(target_os = "macos")]
fn read_machine() -> String {
    sysctl_string("hw.model")
        .or_else(|| sysctl_string("kern.hostname"))
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(target_os = "macos")]
fn sysctl_string(name: &str) -> Option<String> {
    use libc::sysctlbyname;
    use std::ffi::CString;
    use std::ptr;

    let c_name = CString::new(name).ok()?;
    let mut size = 0usize;
    let res = unsafe { sysctlbyname(c_name.as_ptr(), ptr::null_mut(), &mut size, ptr::null_mut(), 0) };
    if res != 0 || size == 0 {
        return None;
    }

    let mut buffer = vec![0u8; size];
    let res = unsafe {
        sysctlbyname(
            c_name.as_ptr(),
            buffer.as_mut_ptr() as *mut _,
            &mut size,
            ptr::null_mut(),
            0,
        )
    };
    if res != 0 {
        return None;
    }
    if let Some(0) = buffer.last().copied() {
        buffer.pop();
    }
    String::from_utf8(buffer).ok()
}
