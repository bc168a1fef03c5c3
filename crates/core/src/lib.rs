mod catalog;
mod error;
mod project;
mod storage;

pub use catalog::{now_utc_rfc3339, CatalogSnapshot, HostInfo, PhysicalDrive, CATALOG_SCHEMA_VERSION};
pub use error::{DiscoveryError, ErrorPolicy};
pub use project::{
    BackupGap, DriveMetadata, DriveRegistryEntry, DriveSummary, DriveType, ProjectRecord, ProjectView,
    NOT_AVAILABLE, UNKNOWN,
};
pub use storage::{
    drive_root, FolderLayout, SlotKey, SlotRole, StorageConfig, StorageGroup, StorageSlot, ValidationErrors,
};
