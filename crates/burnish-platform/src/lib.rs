//! # Burnish Platform
//!
//! Platform services behind the imaging flows: raw device path resolution,
//! mount control, and unbuffered device I/O. Everything here implements the
//! seam traits from `burnish-core`, so the orchestrator never talks to the
//! OS directly.
//!
//! ## Safety
//!
//! This crate opens raw device nodes for writing, which can destroy data.
//! Callers are expected to pass only descriptors obtained from
//! `burnish-detect` and confirmed by the user.
//!
//! The disk-management tool is `diskutil`; its text output is parsed with
//! line scanners, and the parsing is platform-independent and fully covered
//! by fixture tests. Only the device-node I/O itself is OS-specific; on
//! platforms without raw node support those operations report
//! [`burnish_core::Error::UnsupportedPlatform`].

mod media;
mod mount;
mod resolver;

pub use media::RawDiskMedia;
pub use mount::MountController;
pub use resolver::{DiskInfoSource, Diskutil, RawDiskResolver};

/// Whether the process runs with elevated privileges.
///
/// Raw device nodes are typically root-only; callers use this to shape the
/// remedy they suggest for a permission failure.
#[must_use]
pub fn has_elevated_privileges() -> bool {
    cfg_if::cfg_if! {
        if #[cfg(unix)] {
            // SAFETY: geteuid has no preconditions and cannot fail.
            #[allow(unsafe_code)]
            unsafe { libc::geteuid() == 0 }
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_elevated_privileges_does_not_panic() {
        let _ = has_elevated_privileges();
    }
}
