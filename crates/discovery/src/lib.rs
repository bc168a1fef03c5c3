//! Project discovery across Master/Backup storage slots, with an in-memory
//! registry cache validated by each drive's `Projects` folder timestamp.

pub mod fs;
pub mod memory;
mod orchestrator;
mod registry;
mod resolver;
mod scanner;
mod shared;

pub use fs::{DirEntry, FileSystem, LocalFileSystem};
pub use orchestrator::{invalidate_registry, Discovery, DiscoveryState, StorageCatalog};
pub use registry::{is_valid, reconcile, tracking_key, DriveMap, RegistryCache, ScanResult};
pub use resolver::{confirm_storage, resolve_slot, SlotState, StorageStatus};
pub use scanner::{DriveOutcome, Scanner, SkipReason};
pub use shared::SharedDiscovery;
