use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

pub const CATALOG_SCHEMA_VERSION: &str = "1.0.0";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CatalogSnapshot {
    pub snapshot_id: Uuid,
    pub schema_version: String,
    pub host: HostInfo,
    pub drives: Vec<PhysicalDrive>,
    pub generated_at_utc: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HostInfo {
    pub os: String,        // "windows", "linux", "macos"
    pub os_version: String,
    pub machine: String,
}

/// One attached storage device as reported by the host.
///
/// Providers fill what they can; anything the host cannot tell us stays
/// `None` or zero and is degraded to a display default at scan time.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct PhysicalDrive {
    pub serial_number: String,
    pub mount_path: String,
    pub label: Option<String>,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub filesystem_type: Option<String>,
    pub partition_kind: Option<String>,
    pub total_bytes: u64,
    pub free_bytes: u64,
    pub used_bytes: u64,
    pub health_status: Option<String>,
}

impl PhysicalDrive {
    /// Serial as used for matching: trimmed, case preserved.
    pub fn serial(&self) -> &str {
        self.serial_number.trim()
    }
}

impl CatalogSnapshot {
    pub fn new(host: HostInfo, drives: Vec<PhysicalDrive>) -> Self {
        Self {
            snapshot_id: Uuid::new_v4(),
            schema_version: CATALOG_SCHEMA_VERSION.to_string(),
            host,
            drives,
            generated_at_utc: now_utc_rfc3339(),
        }
    }
}

pub fn now_utc_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}
