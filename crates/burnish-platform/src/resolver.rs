//! Raw device path resolution.
//!
//! A mounted volume descriptor names a partition (`disk4s1`); imaging must
//! target the unbuffered whole-disk node (`/dev/rdisk4`). Writing through the
//! buffered node costs block-aligned throughput and risks stale buffer-cache
//! reads after the write, so resolution always lands on the `r`-prefixed
//! path.
//!
//! Resolution is two-tier because `diskutil info` intermittently fails for
//! freshly attached media:
//!
//! 1. `diskutil info <mount_path>`, scanning for the `Device Identifier:`
//!    line, stripping the trailing `s<digits>` partition suffix.
//! 2. `diskutil list`, scanning the per-disk text blocks for one that
//!    mentions the volume name. When no block matches, the last enumerated
//!    disk is used as a final resort. That heuristic is deliberately weak,
//!    so it is logged at warn level and callers are expected to confirm the
//!    resolved disk before anything destructive.

use burnish_core::{Error, RawDeviceHandle, ResolveRawPath, Result};
use burnish_detect::DeviceDescriptor;
use std::process::Command;

/// Source of disk-management tool text output.
pub trait DiskInfoSource: Send + Sync {
    /// Text output of `diskutil info <mount_path>`.
    ///
    /// # Errors
    ///
    /// [`Error::DeviceInfoUnavailable`] when the tool cannot be run or
    /// reports failure.
    fn info(&self, mount_path: &str) -> Result<String>;

    /// Text output of `diskutil list`.
    ///
    /// # Errors
    ///
    /// [`Error::DeviceInfoUnavailable`] when the tool cannot be run or
    /// reports failure.
    fn list(&self) -> Result<String>;
}

/// [`DiskInfoSource`] backed by the `diskutil` command.
#[derive(Debug, Default, Clone, Copy)]
pub struct Diskutil;

impl Diskutil {
    fn run(args: &[&str]) -> Result<String> {
        tracing::debug!(?args, "running diskutil");
        let output = Command::new("diskutil")
            .args(args)
            .output()
            .map_err(|e| Error::DeviceInfoUnavailable(format!("diskutil: {e}")))?;

        if !output.status.success() {
            return Err(Error::DeviceInfoUnavailable(format!(
                "diskutil {} exited with {}",
                args.join(" "),
                output.status
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl DiskInfoSource for Diskutil {
    fn info(&self, mount_path: &str) -> Result<String> {
        Self::run(&["info", mount_path])
    }

    fn list(&self) -> Result<String> {
        Self::run(&["list"])
    }
}

/// Resolves descriptors to unbuffered whole-disk device paths.
pub struct RawDiskResolver {
    source: Box<dyn DiskInfoSource>,
}

impl RawDiskResolver {
    /// Resolver backed by the system `diskutil` tool.
    #[must_use]
    pub fn new() -> Self {
        Self::with_source(Box::new(Diskutil))
    }

    /// Resolver over a custom tool-output source.
    #[must_use]
    pub fn with_source(source: Box<dyn DiskInfoSource>) -> Self {
        Self { source }
    }
}

impl Default for RawDiskResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ResolveRawPath for RawDiskResolver {
    fn resolve(&self, device: &DeviceDescriptor) -> Result<RawDeviceHandle> {
        match self.source.info(&device.mount_path) {
            Ok(text) => {
                if let Some(identifier) = parse_device_identifier(&text) {
                    let whole = strip_partition_suffix(&identifier);
                    return Ok(raw_handle(whole));
                }
                tracing::debug!(
                    mount_path = %device.mount_path,
                    "no device identifier in info output, falling back to listing"
                );
            }
            Err(e) => {
                tracing::debug!(
                    mount_path = %device.mount_path,
                    "device info query failed ({e}), falling back to listing"
                );
            }
        }

        let listing = self.source.list()?;
        resolve_from_listing(&listing, &device.name)
    }
}

fn raw_handle(whole_disk: &str) -> RawDeviceHandle {
    RawDeviceHandle::new(format!("/dev/r{whole_disk}"))
}

/// Scan `diskutil info` text for the `Device Identifier:` value.
pub(crate) fn parse_device_identifier(info_text: &str) -> Option<String> {
    for line in info_text.lines() {
        if let Some(rest) = line.trim().strip_prefix("Device Identifier:") {
            let identifier = rest.trim();
            if !identifier.is_empty() {
                return Some(identifier.to_string());
            }
        }
    }
    None
}

/// Strip trailing `s<digits>` partition suffixes down to the whole disk.
///
/// `disk4s1` and `disk3s1s1` both normalize to their whole disks; an
/// identifier without a suffix passes through unchanged.
pub(crate) fn strip_partition_suffix(identifier: &str) -> &str {
    let mut id = identifier;
    loop {
        let Some(pos) = id.rfind('s') else { break };
        let (head, tail) = id.split_at(pos);
        let digits = &tail[1..];
        let head_is_disk = head.ends_with(|c: char| c.is_ascii_digit());
        if head_is_disk && !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
            id = head;
        } else {
            break;
        }
    }
    id
}

/// Resolve from `diskutil list` text blocks.
fn resolve_from_listing(listing: &str, volume_name: &str) -> Result<RawDeviceHandle> {
    let blocks = parse_disk_blocks(listing);

    if let Some((identifier, _)) = blocks.iter().find(|(_, body)| body.contains(volume_name)) {
        return Ok(raw_handle(identifier));
    }

    match blocks.last() {
        // Final resort: no disk mentions the volume name. Picking the most
        // recently enumerated disk matches how freshly attached media
        // usually sorts, but it is a guess, so make it loud.
        Some((identifier, _)) => {
            tracing::warn!(
                volume = volume_name,
                disk = %identifier,
                "volume name not found in disk listing; using last enumerated disk"
            );
            Ok(raw_handle(identifier))
        }
        None if listing.contains("/dev/") => Err(Error::DeviceInfoParseFailed(
            "unrecognized disk listing output".to_string(),
        )),
        None => Err(Error::RawPathNotFound(volume_name.to_string())),
    }
}

/// Split `diskutil list` text into `(whole_disk_identifier, block_body)`
/// pairs, keyed by the `/dev/disk…` header lines.
pub(crate) fn parse_disk_blocks(listing: &str) -> Vec<(String, String)> {
    let mut blocks: Vec<(String, String)> = Vec::new();

    for line in listing.lines() {
        if line.starts_with("/dev/disk") {
            let identifier = line
                .trim_start_matches("/dev/")
                .split_whitespace()
                .next()
                .unwrap_or_default();
            let whole = strip_partition_suffix(identifier);
            if !whole.is_empty() {
                blocks.push((whole.to_string(), String::new()));
            }
        } else if let Some((_, body)) = blocks.last_mut() {
            body.push_str(line);
            body.push('\n');
        }
    }

    blocks
}

// ============================================================================
// UNIT TESTS
// ============================================================================
