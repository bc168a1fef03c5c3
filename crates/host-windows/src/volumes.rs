use std::ffi::c_void;

use anyhow::{anyhow, Result};
use mediakeep_core::PhysicalDrive;

use windows::core::PCWSTR;
use windows::Win32::Foundation::{CloseHandle, HANDLE};
use windows::Win32::Storage::FileSystem::{
    CreateFileW, GetDiskFreeSpaceExW, GetDriveTypeW, GetLogicalDrives, GetVolumeInformationW,
    FILE_FLAGS_AND_ATTRIBUTES, FILE_SHARE_READ, FILE_SHARE_WRITE, OPEN_EXISTING,
};
use windows::Win32::System::Ioctl::{
    PropertyStandardQuery, StorageDeviceProperty, IOCTL_STORAGE_QUERY_PROPERTY,
    IOCTL_VOLUME_GET_VOLUME_DISK_EXTENTS, STORAGE_PROPERTY_QUERY, VOLUME_DISK_EXTENTS,
};
use windows::Win32::System::IO::DeviceIoControl;

use crate::{format_volume_serial, parse_device_descriptor, DeviceIdentity};

const DRIVE_REMOVABLE: u32 = 2;
const DRIVE_FIXED: u32 = 3;
const DRIVE_RAMDISK: u32 = 6;

#[derive(Debug, Clone)]
pub struct VolumeInfo {
    pub root: String,
    pub label: Option<String>,
    pub fs: Option<String>,
    pub serial: u32,
    /// From the disk's storage descriptor; empty when the query failed.
    pub device: DeviceIdentity,
    pub drive_type: u32,
    pub total_bytes: u64,
    pub free_bytes: u64,
}

impl VolumeInfo {
    pub fn into_drive(self) -> PhysicalDrive {
        let kind = match self.drive_type {
            DRIVE_REMOVABLE => "Removable",
            DRIVE_FIXED => "Fixed",
            DRIVE_RAMDISK => "RAM disk",
            _ => "Other",
        };
        let serial_number = self
            .device
            .serial
            .unwrap_or_else(|| format_volume_serial(self.serial));
        PhysicalDrive {
            serial_number,
            mount_path: self.root.trim_end_matches('\\').to_string(),
            label: self.label,
            manufacturer: self.device.vendor,
            model: self.device.product,
            filesystem_type: self.fs,
            partition_kind: Some(kind.to_string()),
            total_bytes: self.total_bytes,
            free_bytes: self.free_bytes,
            used_bytes: self.total_bytes.saturating_sub(self.free_bytes),
            health_status: None,
        }
    }
}

fn wide(s: &str) -> Vec<u16> {
    use std::os::windows::prelude::*;
    std::ffi::OsStr::new(s)
        .encode_wide()
        .chain(std::iter::once(0))
        .collect()
}

fn list_logical_drive_letters() -> Vec<char> {
    let mask = unsafe { GetLogicalDrives() };
    ('A'..='Z')
        .enumerate()
        .filter(|(idx, _)| mask & (1u32 << idx) != 0)
        .map(|(_, letter)| letter)
        .collect()
}

fn buffer_string(buf: &[u16]) -> Option<String> {
    let value = String::from_utf16_lossy(buf)
        .trim_end_matches('\0')
        .trim()
        .to_string();
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

fn get_volume_info(root: &str) -> Result<(Option<String>, Option<String>, u32)> {
    let wroot = wide(root);
    let mut name_buf = [0u16; 256];
    let mut fs_buf = [0u16; 256];
    let mut serial = 0u32;

    unsafe {
        GetVolumeInformationW(
            PCWSTR(wroot.as_ptr()),
            Some(&mut name_buf),
            Some(&mut serial),
            None,
            None,
            Some(&mut fs_buf),
        )
    }
    .map_err(|err| anyhow!("GetVolumeInformationW failed for {}: {}", root, err))?;

    Ok((buffer_string(&name_buf), buffer_string(&fs_buf), serial))
}

fn get_volume_space(root: &str) -> Result<(u64, u64)> {
    let wroot = wide(root);
    let mut free = 0u64;
    let mut total = 0u64;
    let mut total_free = 0u64;

    unsafe {
        GetDiskFreeSpaceExW(
            PCWSTR(wroot.as_ptr()),
            Some(&mut free),
            Some(&mut total),
            Some(&mut total_free),
        )
    }
    .map_err(|err| anyhow!("GetDiskFreeSpaceExW failed for {}: {}", root, err))?;

    Ok((total, free))
}

struct DeviceHandle(HANDLE);

impl Drop for DeviceHandle {
    fn drop(&mut self) {
        unsafe {
            let _ = CloseHandle(self.0);
        }
    }
}

fn open_device(path: &str) -> Result<DeviceHandle> {
    let wpath = wide(path);
    // No access rights requested: property queries need none and work unelevated.
    let handle = unsafe {
        CreateFileW(
            PCWSTR(wpath.as_ptr()),
            0,
            FILE_SHARE_READ | FILE_SHARE_WRITE,
            None,
            OPEN_EXISTING,
            FILE_FLAGS_AND_ATTRIBUTES(0),
            HANDLE::default(),
        )
    }
    .map_err(|err| anyhow!("CreateFileW failed for {}: {}", path, err))?;
    Ok(DeviceHandle(handle))
}

fn disk_number_for_drive(letter: char) -> Result<u32> {
    let handle = open_device(&format!("\\\\.\\{}:", letter))?;
    let mut out = [0u8; 1024];
    let mut returned = 0u32;

    unsafe {
        DeviceIoControl(
            handle.0,
            IOCTL_VOLUME_GET_VOLUME_DISK_EXTENTS,
            None,
            0,
            Some(out.as_mut_ptr() as *mut c_void),
            out.len() as u32,
            Some(&mut returned),
            None,
        )
    }
    .map_err(|err| anyhow!("IOCTL_VOLUME_GET_VOLUME_DISK_EXTENTS failed for {}: {}", letter, err))?;

    let extents: VOLUME_DISK_EXTENTS =
        unsafe { std::ptr::read_unaligned(out.as_ptr() as *const _) };
    if extents.NumberOfDiskExtents == 0 {
        return Err(anyhow!("no disk extents for {}:", letter));
    }
    Ok(extents.Extents[0].DiskNumber)
}

fn query_device_identity(disk_number: u32) -> Result<DeviceIdentity> {
    let handle = open_device(&format!("\\\\.\\PhysicalDrive{}", disk_number))?;
    let query = STORAGE_PROPERTY_QUERY {
        PropertyId: StorageDeviceProperty,
        QueryType: PropertyStandardQuery,
        AdditionalParameters: [0],
    };
    let mut out = vec![0u8; 4096];
    let mut returned = 0u32;

    unsafe {
        DeviceIoControl(
            handle.0,
            IOCTL_STORAGE_QUERY_PROPERTY,
            Some(&query as *const _ as *const c_void),
            std::mem::size_of::<STORAGE_PROPERTY_QUERY>() as u32,
            Some(out.as_mut_ptr() as *mut c_void),
            out.len() as u32,
            Some(&mut returned),
            None,
        )
    }
    .map_err(|err| anyhow!("IOCTL_STORAGE_QUERY_PROPERTY failed for disk {}: {}", disk_number, err))?;

    out.truncate(returned as usize);
    Ok(parse_device_descriptor(&out))
}

fn device_identity(letter: char) -> DeviceIdentity {
    match disk_number_for_drive(letter).and_then(query_device_identity) {
        Ok(identity) => identity,
        Err(err) => {
            tracing::debug!(drive = %letter, error = %err, "no hardware identity, using volume serial");
            DeviceIdentity::default()
        }
    }
}

pub fn enumerate_volumes() -> Result<Vec<VolumeInfo>> {
    let mut volumes = Vec::new();

    for letter in list_logical_drive_letters() {
        let root = format!("{}:\\", letter);
        let wroot = wide(&root);
        let drive_type = unsafe { GetDriveTypeW(PCWSTR(wroot.as_ptr())) };
        if !matches!(drive_type, DRIVE_REMOVABLE | DRIVE_FIXED | DRIVE_RAMDISK) {
            continue;
        }

        let (label, fs, serial) = match get_volume_info(&root) {
            Ok(value) => value,
            Err(err) => {
                tracing::debug!(root = %root, error = %err, "volume not readable");
                continue;
            }
        };
        let (total_bytes, free_bytes) = get_volume_space(&root).unwrap_or((0, 0));
        let device = device_identity(letter);

        volumes.push(VolumeInfo {
            root,
            label,
            fs,
            serial,
            device,
            drive_type,
            total_bytes,
            free_bytes,
        });
    }

    Ok(volumes)
}
