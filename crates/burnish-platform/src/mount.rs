//! Mount state control via `diskutil`.
//!
//! One invocation per transition, success decided by exit status alone, no
//! retries. A write must be preceded by an unmount (writing under a mounted
//! filesystem invites corruption and OS interference), but the imaging flows
//! never remount afterwards; `mount` exists for symmetry and testing.

use burnish_core::{MountControl, Result};
use burnish_detect::DeviceDescriptor;
use std::process::Command;

/// [`MountControl`] backed by the `diskutil` command.
#[derive(Debug, Default, Clone, Copy)]
pub struct MountController;

impl MountController {
    /// Create a mount controller.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn run(verb: &str, target: &str) -> Result<bool> {
        tracing::debug!(verb, target, "running diskutil");
        let output = Command::new("diskutil").arg(verb).arg(target).output()?;

        if !output.status.success() {
            tracing::debug!(
                verb,
                target,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "diskutil reported failure"
            );
        }

        Ok(output.status.success())
    }
}

impl MountControl for MountController {
    fn unmount(&self, device: &DeviceDescriptor) -> Result<bool> {
        Self::run("unmount", &device.mount_path)
    }

    fn mount(&self, device: &DeviceDescriptor) -> Result<bool> {
        // The mount path is gone once unmounted; remount by identifier.
        Self::run("mount", &device.identifier)
    }
}
