//! Error taxonomy for discovery and the policy applied to each kind.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// What the caller does with a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// The drive contributes nothing this pass; the rest of the scan continues.
    SkipDrive,
    /// Logged; the current drive keeps being processed.
    LogAndContinue,
    /// The whole discovery call fails and the cache is left untouched.
    AbortScan,
}

#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Missing or malformed Storage Group table
    #[error("configuration error: {0}")]
    Config(String),

    /// The host storage catalog could not be listed
    #[error("storage catalog unavailable: {0}")]
    Catalog(String),

    #[error("no attached drive with serial {serial} for {key}")]
    DeviceNotFound { key: String, serial: String },

    #[error("drive {label} at {} did not respond", path.display())]
    Unreachable { label: String, path: PathBuf },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Only the modification time is unavailable; the folder is still listed
    #[error("failed to stat {}: {source}", path.display())]
    Stat {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to create {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl DiscoveryError {
    pub fn policy(&self) -> ErrorPolicy {
        match self {
            DiscoveryError::Config(_) | DiscoveryError::Catalog(_) => ErrorPolicy::AbortScan,
            DiscoveryError::DeviceNotFound { .. }
            | DiscoveryError::Unreachable { .. }
            | DiscoveryError::Io { .. } => ErrorPolicy::SkipDrive,
            DiscoveryError::Stat { .. } | DiscoveryError::CreateDir { .. } => {
                ErrorPolicy::LogAndContinue
            }
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        DiscoveryError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn stat(path: impl Into<PathBuf>, source: io::Error) -> Self {
        DiscoveryError::Stat {
            path: path.into(),
            source,
        }
    }

    pub fn create_dir(path: impl Into<PathBuf>, source: io::Error) -> Self {
        DiscoveryError::CreateDir {
            path: path.into(),
            source,
        }
    }
}
