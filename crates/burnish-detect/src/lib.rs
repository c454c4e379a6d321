//! # Burnish Detect
//!
//! Removable volume discovery for the Burnish imaging tool.
//!
//! The [`DeviceCatalog`] enumerates currently mounted volumes and returns a
//! snapshot of the ones the OS flags as removable or ejectable. Each snapshot
//! is complete and immutable: callers refresh by asking again, there is no
//! live subscription and no incremental diffing.
//!
//! Enumeration is deliberately forgiving. If the disk-management tool is
//! missing, exits non-zero, or produces output we cannot parse, the catalog
//! returns an empty list and logs a warning; an empty device list is a
//! valid, recoverable state for any caller.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

mod catalog;

pub use catalog::{DeviceCatalog, DiskutilQuery, VolumeQuery};

/// Volume discovery errors.
///
/// These are internal to the discovery pipeline; the public catalog API
/// degrades every failure to an empty device list.
#[derive(Error, Debug)]
pub enum DetectError {
    /// The disk-management tool could not be executed.
    #[error("Command failed: {0}")]
    CommandFailed(String),

    /// The disk-management tool output could not be interpreted.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// I/O error while talking to the disk-management tool.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for volume discovery operations.
pub type Result<T> = std::result::Result<T, DetectError>;

/// Label used for volumes the OS reports without a name.
pub const UNNAMED_VOLUME_LABEL: &str = "Untitled";

/// An immutable snapshot of one mounted removable volume.
///
/// Descriptors are created by [`DeviceCatalog::list_removable_devices`] and
/// replaced wholesale on the next enumeration. The `identifier` selects one
/// underlying device for the lifetime of a refresh cycle; device node
/// assignment can change across unplug/replug, so identifiers must not be
/// held across refreshes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Device identifier of the mounted volume (e.g. `disk4s1`).
    pub identifier: String,

    /// Volume name, or [`UNNAMED_VOLUME_LABEL`] when the OS reports none.
    pub name: String,

    /// Human-readable capacity, e.g. `"28.9 GB"`.
    ///
    /// Display only. Anything that needs byte counts must re-query the
    /// device, never parse this string.
    pub capacity: String,

    /// Filesystem path the volume is mounted at (e.g. `/Volumes/UBUNTU`).
    pub mount_path: String,

    /// Whether the OS flags the volume as removable or ejectable.
    pub removable: bool,
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}, {}) at {}",
            self.name, self.identifier, self.capacity, self.mount_path
        )
    }
}

/// Format bytes into a human-readable string.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    const TB: u64 = GB * 1024;

    if bytes >= TB {
        format!("{:.1} TB", bytes as f64 / TB as f64)
    } else if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}

/// List the currently mounted removable volumes using the system tool.
///
/// Convenience wrapper over a default [`DeviceCatalog`]. Never fails:
/// enumeration errors produce an empty list.
#[must_use]
pub fn list_removable_devices() -> Vec<DeviceDescriptor> {
    DeviceCatalog::new().list_removable_devices()
}

// ============================================================================
// UNIT TESTS
// ============================================================================
