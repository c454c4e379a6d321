//! # Burnish Core
//!
//! Core library for the Burnish disk imaging tool: a streaming block copy
//! engine and the orchestration that turns it into two safe end-to-end
//! operations, writing an image file onto a removable device and capturing
//! a device back into an image file.
//!
//! ## Modules
//!
//! - `copy`: block copy engine with throttled progress and cancellation
//! - `imager`: job orchestration over pluggable platform services
//! - `job`: imaging job model, lifecycle states, failure stages
//! - `error`: error types and result alias
//! - `settings`: persistent user settings from a configuration file
//!
//! ## Example
//!
//! ```ignore
//! use burnish_core::Imager;
//! use std::sync::Arc;
//!
//! let imager = Imager::new(resolver, mounts, media);
//! let handle = imager.begin_write_to_device("ubuntu.iso", &device, |p| {
//!     println!("{:3.0}% {}", p.ratio() * 100.0, p.speed_display());
//! })?;
//! let status = handle.wait();
//! println!("{status}");
//! ```

pub mod copy;
pub mod error;
pub mod imager;
pub mod job;
pub mod settings;

pub use copy::{
    format_duration, format_speed, CopyConfig, CopyEngine, CopyProgress, CopyResult,
    DEFAULT_BLOCK_SIZE, MAX_BLOCK_SIZE, MIN_BLOCK_SIZE, PROGRESS_INTERVAL,
};
pub use error::{Error, Result};
pub use imager::{Imager, JobHandle, MountControl, RawMedia, ResolveRawPath};
pub use job::{Direction, ImagingJob, JobStatus, RawDeviceHandle, Stage};
pub use settings::{Settings, SettingsError};
