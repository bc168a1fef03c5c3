use anyhow::Result;
use mediakeep_core::{CatalogSnapshot, HostInfo, PhysicalDrive};

#[cfg(windows)]
mod volumes;

pub fn build_catalog() -> Result<CatalogSnapshot> {
    let host = HostInfo {
        os: "windows".to_string(),
        os_version: std::env::var("OS").unwrap_or_else(|_| "unknown".to_string()),
        machine: std::env::var("COMPUTERNAME").unwrap_or_else(|_| "unknown".to_string()),
    };
    Ok(CatalogSnapshot::new(host, list_physical_drives()?))
}

/// Local, removable and RAM drive letters with a readable volume.
pub fn list_physical_drives() -> Result<Vec<PhysicalDrive>> {
    #[cfg(windows)]
    {
        let drives: Vec<PhysicalDrive> = volumes::enumerate_volumes()?
            .into_iter()
            .map(volumes::VolumeInfo::into_drive)
            .collect();
        tracing::debug!(count = drives.len(), "windows volumes enumerated");
        Ok(drives)
    }

    #[cfg(not(windows))]
    {
        Err(anyhow::anyhow!("mediakeep-host-windows requires Windows"))
    }
}

/// Hardware identity of the disk behind a volume.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub vendor: Option<String>,
    pub product: Option<String>,
    pub serial: Option<String>,
}

/// Reads the string fields of a `STORAGE_DEVICE_DESCRIPTOR` as returned by
/// `IOCTL_STORAGE_QUERY_PROPERTY`. Offsets pointing past the buffer are ignored.
pub fn parse_device_descriptor(buf: &[u8]) -> DeviceIdentity {
    let size = read_u32(buf, 4)
        .map(|size| (size as usize).min(buf.len()))
        .unwrap_or(buf.len());
    let buf = &buf[..size];
    DeviceIdentity {
        vendor: descriptor_string(buf, 12),
        product: descriptor_string(buf, 16),
        serial: descriptor_string(buf, 24),
    }
}

fn read_u32(buf: &[u8], at: usize) -> Option<u32> {
    let bytes = buf.get(at..at + 4)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn descriptor_string(buf: &[u8], field: usize) -> Option<String> {
    let offset = read_u32(buf, field)? as usize;
    if offset == 0 || offset >= buf.len() {
        return None;
    }
    let tail = &buf[offset..];
    let end = tail.iter().position(|b| *b == 0).unwrap_or(tail.len());
    let value = String::from_utf8_lossy(&tail[..end]).trim().to_string();
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Volume serial in the `XXXX-XXXX` form `vol` prints, without the dash.
pub fn format_volume_serial(serial: u32) -> String {
    format!("{:08X}", serial)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put(buf: &mut Vec<u8>, field: usize, value: &str) {
        let offset = buf.len() as u32;
        buf[field..field + 4].copy_from_slice(&offset.to_le_bytes());
        buf.extend_from_slice(value.as_bytes());
        buf.push(0);
    }

    fn descriptor(vendor: &str, product: &str, serial: &str) -> Vec<u8> {
        let mut buf = vec![0u8; 40];
        put(&mut buf, 12, vendor);
        put(&mut buf, 16, product);
        put(&mut buf, 24, serial);
        let size = buf.len() as u32;
        buf[4..8].copy_from_slice(&size.to_le_bytes());
        buf
    }

    #[test]
    fn descriptor_strings_are_trimmed() {
        let identity = parse_device_descriptor(&descriptor("Samsung ", "Portable SSD T7", "  S6WJNS0R812345 "));
        assert_eq!(identity.vendor.as_deref(), Some("Samsung"));
        assert_eq!(identity.product.as_deref(), Some("Portable SSD T7"));
        assert_eq!(identity.serial.as_deref(), Some("S6WJNS0R812345"));
    }

    #[test]
    fn descriptor_without_serial_yields_none() {
        let mut buf = descriptor("Acme", "Stick", "   ");
        assert_eq!(parse_device_descriptor(&buf).serial, None);

        buf[24..28].copy_from_slice(&0u32.to_le_bytes());
        let identity = parse_device_descriptor(&buf);
        assert_eq!(identity.serial, None);
        assert_eq!(identity.vendor.as_deref(), Some("Acme"));
    }

    #[test]
    fn offsets_beyond_reported_size_are_ignored() {
        let mut buf = descriptor("Acme", "Stick", "XYZ");
        buf[4..8].copy_from_slice(&30u32.to_le_bytes());
        assert_eq!(parse_device_descriptor(&buf), DeviceIdentity::default());
        assert_eq!(parse_device_descriptor(&buf[..10]), DeviceIdentity::default());
    }

    #[test]
    fn volume_serial_is_zero_padded_upper_hex() {
        assert_eq!(format_volume_serial(0x1a2b), "00001A2B");
        assert_eq!(format_volume_serial(0xDEADBEEF), "DEADBEEF");
    }
}
