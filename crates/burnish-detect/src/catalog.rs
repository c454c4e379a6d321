//! Mounted-volume enumeration via `diskutil`.
//!
//! `diskutil list -plist` names every disk and partition; `diskutil info
//! -plist <id>` describes one of them. Rather than pulling in a plist crate
//! for two fixed shapes, the parsers below scan the XML line by line the same
//! way `diskutil` emits it.

use crate::{
    format_bytes, DetectError, DeviceDescriptor, Result, UNNAMED_VOLUME_LABEL,
};
use std::collections::HashMap;
use std::process::Command;

/// Source of raw volume-enumeration output.
///
/// The real implementation shells out to `diskutil`; tests substitute
/// captured output.
#[cfg_attr(test, mockall::automock)]
pub trait VolumeQuery {
    /// Raw output of the volume listing (`diskutil list -plist`).
    fn list(&self) -> Result<String>;

    /// Raw output of the per-volume query (`diskutil info -plist <id>`).
    fn info(&self, identifier: &str) -> Result<String>;
}

/// [`VolumeQuery`] backed by the `diskutil` command.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiskutilQuery;

impl DiskutilQuery {
    fn run(args: &[&str]) -> Result<String> {
        tracing::debug!(?args, "running diskutil");
        let output = Command::new("diskutil")
            .args(args)
            .output()
            .map_err(|e| DetectError::CommandFailed(format!("diskutil: {e}")))?;

        if !output.status.success() {
            return Err(DetectError::CommandFailed(format!(
                "diskutil {} exited with {}: {}",
                args.join(" "),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl VolumeQuery for DiskutilQuery {
    fn list(&self) -> Result<String> {
        Self::run(&["list", "-plist"])
    }

    fn info(&self, identifier: &str) -> Result<String> {
        Self::run(&["info", "-plist", identifier])
    }
}

/// Snapshot enumerator for mounted removable volumes.
pub struct DeviceCatalog {
    query: Box<dyn VolumeQuery>,
}

impl DeviceCatalog {
    /// Create a catalog backed by the system `diskutil` tool.
    #[must_use]
    pub fn new() -> Self {
        Self::with_query(Box::new(DiskutilQuery))
    }

    /// Create a catalog over a custom enumeration source.
    #[must_use]
    pub fn with_query(query: Box<dyn VolumeQuery>) -> Self {
        Self { query }
    }

    /// Enumerate the removable volumes mounted right now.
    ///
    /// Returns a finite snapshot; call again to refresh. Every failure mode
    /// degrades to an empty list, and callers treat "no devices" as a normal
    /// state, not an error.
    #[must_use]
    pub fn list_removable_devices(&self) -> Vec<DeviceDescriptor> {
        match self.enumerate() {
            Ok(devices) => devices,
            Err(e) => {
                tracing::warn!("volume enumeration failed: {e}");
                Vec::new()
            }
        }
    }

    fn enumerate(&self) -> Result<Vec<DeviceDescriptor>> {
        let listing = self.query.list()?;
        let mounted = parse_mounted_volumes(&listing)?;

        let mut devices = Vec::new();
        for identifier in mounted {
            match self.describe(&identifier) {
                Ok(Some(descriptor)) if descriptor.removable => devices.push(descriptor),
                Ok(_) => {}
                Err(e) => {
                    // One undescribable volume must not hide the rest.
                    tracing::debug!("skipping {identifier}: {e}");
                }
            }
        }

        Ok(devices)
    }

    fn describe(&self, identifier: &str) -> Result<Option<DeviceDescriptor>> {
        let plist = self.query.info(identifier)?;
        let info = parse_volume_info(&plist);
        Ok(descriptor_from_info(identifier, &info))
    }
}

impl Default for DeviceCatalog {
    fn default() -> Self {
        Self::new()
    }
}

/// Extract the device identifiers of mounted volumes from `diskutil list
/// -plist` output.
///
/// The scanner captures innermost `<dict>` entries, which in this listing are
/// exactly the per-volume records; a record counts as mounted when it carries
/// a `MountPoint`.
pub(crate) fn parse_mounted_volumes(plist: &str) -> Result<Vec<String>> {
    let mut volumes = Vec::new();

    let mut in_record = false;
    let mut record: HashMap<String, String> = HashMap::new();
    let mut current_key: Option<String> = None;

    for line in plist.lines() {
        let trimmed = line.trim();

        if trimmed == "<dict>" {
            in_record = true;
            record.clear();
            continue;
        }

        if trimmed == "</dict>" && in_record {
            if let (Some(id), Some(_)) = (record.get("DeviceIdentifier"), record.get("MountPoint"))
            {
                volumes.push(id.clone());
            }
            in_record = false;
            continue;
        }

        if in_record {
            if trimmed.starts_with("<key>") && trimmed.ends_with("</key>") {
                current_key = Some(
                    trimmed
                        .trim_start_matches("<key>")
                        .trim_end_matches("</key>")
                        .to_string(),
                );
            } else if let Some(key) = current_key.take() {
                if let Some(value) = scalar_value(trimmed) {
                    record.insert(key, value);
                }
            }
        }
    }

    if volumes.is_empty() && !plist.contains("AllDisksAndPartitions") {
        return Err(DetectError::ParseError(
            "unrecognized volume listing output".to_string(),
        ));
    }

    volumes.sort();
    volumes.dedup();
    Ok(volumes)
}

/// Parse `diskutil info -plist` output into a key/value map.
pub(crate) fn parse_volume_info(plist: &str) -> HashMap<String, String> {
    let mut info = HashMap::new();
    let mut current_key: Option<String> = None;

    for line in plist.lines() {
        let trimmed = line.trim();

        if trimmed.starts_with("<key>") && trimmed.ends_with("</key>") {
            current_key = Some(
                trimmed
                    .trim_start_matches("<key>")
                    .trim_end_matches("</key>")
                    .to_string(),
            );
        } else if let Some(key) = current_key.take() {
            if let Some(value) = scalar_value(trimmed) {
                info.insert(key, value);
            }
        }
    }

    info
}

fn scalar_value(trimmed: &str) -> Option<String> {
    if trimmed.starts_with("<string>") && trimmed.ends_with("</string>") {
        Some(
            trimmed
                .trim_start_matches("<string>")
                .trim_end_matches("</string>")
                .to_string(),
        )
    } else if trimmed.starts_with("<integer>") && trimmed.ends_with("</integer>") {
        Some(
            trimmed
                .trim_start_matches("<integer>")
                .trim_end_matches("</integer>")
                .to_string(),
        )
    } else if trimmed == "<true/>" {
        Some("true".to_string())
    } else if trimmed == "<false/>" {
        Some("false".to_string())
    } else {
        None
    }
}

/// Build a descriptor from a parsed info map, or `None` when the record is
/// not a mounted volume.
pub(crate) fn descriptor_from_info(
    identifier: &str,
    info: &HashMap<String, String>,
) -> Option<DeviceDescriptor> {
    // A volume can unmount between the listing and the info query.
    let mount_path = info.get("MountPoint").filter(|m| !m.is_empty())?.clone();

    let name = info
        .get("VolumeName")
        .filter(|n| !n.trim().is_empty())
        .cloned()
        .unwrap_or_else(|| UNNAMED_VOLUME_LABEL.to_string());

    let size = info
        .get("TotalSize")
        .or_else(|| info.get("Size"))
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0);

    let removable = info.get("RemovableMedia").map(String::as_str) == Some("true")
        || info.get("Ejectable").map(String::as_str) == Some("true");

    Some(DeviceDescriptor {
        identifier: identifier.to_string(),
        name,
        capacity: format_bytes(size),
        mount_path,
        removable,
    })
}

// ============================================================================
// UNIT TESTS
// ============================================================================
