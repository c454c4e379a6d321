//! Imaging job model: direction, lifecycle, and failure stages.

use crate::error::Error;
use burnish_detect::DeviceDescriptor;
use std::fmt;
use std::path::PathBuf;

/// Direction of an imaging operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Write an image file onto a raw device.
    WriteToDevice,
    /// Capture a raw device into an image file.
    ReadFromDevice,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::WriteToDevice => write!(f, "write to device"),
            Direction::ReadFromDevice => write!(f, "read from device"),
        }
    }
}

/// The unbuffered device node an imaging operation targets.
///
/// Derived from a [`DeviceDescriptor`] immediately before each operation and
/// discarded afterwards: device node assignment is not stable across
/// mount/unmount cycles, so a handle must never outlive the job it was
/// resolved for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDeviceHandle(String);

impl RawDeviceHandle {
    /// Wrap a raw device node path (e.g. `/dev/rdisk4`).
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// The raw device node path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RawDeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The step of an imaging flow a failure occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Deriving the raw device path from the descriptor.
    Resolve,
    /// Pre-flight read probe of the raw device.
    Probe,
    /// Checking the source image before touching mount state.
    ValidateSource,
    /// Unmounting the volume ahead of a raw write.
    Unmount,
    /// Preparing the destination file and directories.
    PrepareTarget,
    /// The block copy itself.
    Copy,
    /// Flushing written data to the device.
    Sync,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Resolve => write!(f, "resolving raw device path"),
            Stage::Probe => write!(f, "probing device access"),
            Stage::ValidateSource => write!(f, "validating source image"),
            Stage::Unmount => write!(f, "unmounting volume"),
            Stage::PrepareTarget => write!(f, "preparing destination"),
            Stage::Copy => write!(f, "copying blocks"),
            Stage::Sync => write!(f, "syncing device"),
        }
    }
}

/// Lifecycle state of an imaging job.
///
/// `Pending -> Running -> {Succeeded | Failed | Cancelled}`; the terminal
/// states are final and a job is never retried automatically.
#[derive(Debug)]
pub enum JobStatus {
    /// Created but not yet started.
    Pending,
    /// Worker is executing the flow.
    Running,
    /// The operation completed and, for writes, the device was synced.
    Succeeded,
    /// The flow aborted; no later steps were attempted.
    Failed {
        /// Step the flow aborted in.
        stage: Stage,
        /// What went wrong.
        error: Error,
    },
    /// The caller cancelled the job before completion.
    Cancelled,
}

impl JobStatus {
    /// Whether this status is a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Pending | JobStatus::Running)
    }

    /// Whether the job completed successfully.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, JobStatus::Succeeded)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Succeeded => write!(f, "succeeded"),
            JobStatus::Failed { stage, error } => {
                write!(f, "failed while {stage}: {error}")
            }
            JobStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Description of one end-to-end imaging operation.
#[derive(Debug, Clone)]
pub struct ImagingJob {
    /// Which way bytes flow.
    pub direction: Direction,
    /// The file side of the transfer: source image for a write, output image
    /// for a read.
    pub image_path: PathBuf,
    /// The device side of the transfer.
    pub device: DeviceDescriptor,
}

impl ImagingJob {
    /// Describe writing `image_path` onto `device`.
    pub fn write_to_device(image_path: impl Into<PathBuf>, device: DeviceDescriptor) -> Self {
        Self {
            direction: Direction::WriteToDevice,
            image_path: image_path.into(),
            device,
        }
    }

    /// Describe capturing `device` into `image_path`.
    pub fn read_from_device(device: DeviceDescriptor, image_path: impl Into<PathBuf>) -> Self {
        Self {
            direction: Direction::ReadFromDevice,
            image_path: image_path.into(),
            device,
        }
    }
}

impl fmt::Display for ImagingJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.direction {
            Direction::WriteToDevice => write!(
                f,
                "{} -> {}",
                self.image_path.display(),
                self.device.identifier
            ),
            Direction::ReadFromDevice => write!(
                f,
                "{} -> {}",
                self.device.identifier,
                self.image_path.display()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> DeviceDescriptor {
        DeviceDescriptor {
            identifier: "disk4s1".to_string(),
            name: "UBUNTU".to_string(),
            capacity: "28.9 GB".to_string(),
            mount_path: "/Volumes/UBUNTU".to_string(),
            removable: true,
        }
    }

    #[test]
    fn test_raw_device_handle() {
        let handle = RawDeviceHandle::new("/dev/rdisk4");
        assert_eq!(handle.path(), "/dev/rdisk4");
        assert_eq!(handle.to_string(), "/dev/rdisk4");
    }

    #[test]
    fn test_job_status_terminal() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Succeeded.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(JobStatus::Failed {
            stage: Stage::Copy,
            error: Error::Cancelled,
        }
        .is_terminal());
    }

    #[test]
    fn test_job_status_display_names_stage() {
        let status = JobStatus::Failed {
            stage: Stage::Unmount,
            error: Error::UnmountFailed("/Volumes/UBUNTU".to_string()),
        };
        let text = status.to_string();
        assert!(text.contains("unmounting volume"));
        assert!(text.contains("/Volumes/UBUNTU"));
    }

    #[test]
    fn test_imaging_job_constructors() {
        let write = ImagingJob::write_to_device("/tmp/image.iso", descriptor());
        assert_eq!(write.direction, Direction::WriteToDevice);
        assert_eq!(write.to_string(), "/tmp/image.iso -> disk4s1");

        let read = ImagingJob::read_from_device(descriptor(), "/tmp/capture.iso");
        assert_eq!(read.direction, Direction::ReadFromDevice);
        assert_eq!(read.to_string(), "disk4s1 -> /tmp/capture.iso");
    }
}
