use anyhow::Result;
use mediakeep_core::{CatalogSnapshot, PhysicalDrive};
use mediakeep_discovery::StorageCatalog;

/// Drive catalog of the machine the CLI runs on.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostCatalog;

impl StorageCatalog for HostCatalog {
    fn list_physical_drives(&self) -> Result<Vec<PhysicalDrive>> {
        list_physical_drives()
    }
}

#[cfg(windows)]
fn list_physical_drives() -> Result<Vec<PhysicalDrive>> {
    mediakeep_host_windows::list_physical_drives()
}

#[cfg(target_os = "linux")]
fn list_physical_drives() -> Result<Vec<PhysicalDrive>> {
    mediakeep_host_linux::list_physical_drives()
}

#[cfg(target_os = "macos")]
fn list_physical_drives() -> Result<Vec<PhysicalDrive>> {
    mediakeep_host_macos::list_physical_drives()
}

#[cfg(not(any(windows, target_os = "linux", target_os = "macos")))]
fn list_physical_drives() -> Result<Vec<PhysicalDrive>> {
    Err(anyhow::anyhow!("unsupported OS for drive enumeration"))
}

#[cfg(windows)]
pub fn build_catalog() -> Result<CatalogSnapshot> {
    mediakeep_host_windows::build_catalog()
}

#[cfg(target_os = "linux")]
pub fn build_catalog() -> Result<CatalogSnapshot> {
    mediakeep_host_linux::build_catalog()
}

#[cfg(target_os = "macos")]
pub fn build_catalog() -> Result<CatalogSnapshot> {
    mediakeep_host_macos::build_catalog()
}

#[cfg(not(any(windows, target_os = "linux", target_os = "macos")))]
pub fn build_catalog() -> Result<CatalogSnapshot> {
    Err(anyhow::anyhow!("unsupported OS for drive enumeration"))
}
