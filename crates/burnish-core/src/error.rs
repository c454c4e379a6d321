//! Error types for the Burnish core library

use thiserror::Error;

/// Main error type for imaging operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Source image missing or unreadable.
    #[error("Source not found: {0}")]
    SourceNotFound(String),

    /// The OS could not describe the device.
    #[error("Device info unavailable: {0}")]
    DeviceInfoUnavailable(String),

    /// The OS described the device but the output made no sense.
    #[error("Device info parse failed: {0}")]
    DeviceInfoParseFailed(String),

    /// No raw device identifier could be derived for the device.
    #[error("No raw device path found for: {0}")]
    RawPathNotFound(String),

    /// The volume could not be unmounted before writing.
    #[error("Failed to unmount device: {0}")]
    UnmountFailed(String),

    /// The block copy failed partway through.
    #[error("Copy failed: {0}")]
    CopyFailed(String),

    /// Flushing written data to the device failed.
    #[error("Sync failed: {0}")]
    SyncFailed(String),

    /// Access to the raw device was denied. Distinct from [`Error::CopyFailed`]
    /// because the remedy is elevation, not a retry.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The operation was cancelled by the caller.
    #[error("Operation cancelled")]
    Cancelled,

    /// A new job was requested while one is running.
    #[error("An imaging job is already active")]
    JobAlreadyActive,

    /// Raw device access is not implemented for this OS.
    #[error("Platform not supported")]
    UnsupportedPlatform,

    /// IO error outside the copy loop.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using the Burnish error type.
pub type Result<T> = std::result::Result<T, Error>;
