//! Unbuffered device node I/O.
//!
//! Implements the orchestrator's [`RawMedia`] seam over plain file handles
//! on the raw node. Capacity comes from the device itself (ioctl where the
//! OS offers one, size probing otherwise), and the post-write sync asks the
//! drive to commit its cache rather than trusting process exit.

use burnish_core::{Error, RawDeviceHandle, RawMedia, Result};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};

/// [`RawMedia`] backed by the filesystem's device nodes.
#[derive(Debug, Default, Clone, Copy)]
pub struct RawDiskMedia;

impl RawDiskMedia {
    /// Create a raw media accessor.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl RawMedia for RawDiskMedia {
    fn probe_read(&self, handle: &RawDeviceHandle) -> Result<()> {
        let mut file = open_readable(handle.path())?;
        let mut probe = [0u8; 512];
        // An innocuous read; hitting EOF still proves the node is readable.
        let n = file
            .read(&mut probe)
            .map_err(|e| classify_access_error(handle.path(), e))?;
        tracing::trace!(path = handle.path(), bytes = n, "probe read succeeded");
        Ok(())
    }

    fn capacity(&self, handle: &RawDeviceHandle) -> Result<u64> {
        let file = open_readable(handle.path())?;
        device_capacity(&file).map_err(Error::Io)
    }

    fn open_read(&self, handle: &RawDeviceHandle) -> Result<Box<dyn Read + Send>> {
        Ok(Box::new(open_readable(handle.path())?))
    }

    fn open_write(&self, handle: &RawDeviceHandle) -> Result<Box<dyn Write + Send>> {
        let file = OpenOptions::new()
            .write(true)
            .open(handle.path())
            .map_err(|e| classify_access_error(handle.path(), e))?;
        Ok(Box::new(file))
    }

    fn sync(&self, handle: &RawDeviceHandle) -> Result<()> {
        let file = OpenOptions::new()
            .read(true)
            .open(handle.path())
            .map_err(|e| classify_access_error(handle.path(), e))?;
        flush_device(&file).map_err(|e| {
            if e.kind() == std::io::ErrorKind::Unsupported {
                Error::UnsupportedPlatform
            } else {
                Error::SyncFailed(format!("{}: {e}", handle.path()))
            }
        })
    }
}

fn open_readable(path: &str) -> Result<File> {
    File::open(path).map_err(|e| classify_access_error(path, e))
}

/// Permission failures map to their own variant; everything else surfaces
/// as plain I/O.
fn classify_access_error(path: &str, e: std::io::Error) -> Error {
    if e.kind() == std::io::ErrorKind::PermissionDenied {
        Error::PermissionDenied(format!("cannot open {path}; try running with sudo"))
    } else {
        tracing::debug!(path, "device access failed: {e}");
        Error::Io(e)
    }
}

/// Size of the device behind an open handle, in bytes.
fn device_capacity(file: &File) -> std::io::Result<u64> {
    #[cfg(target_os = "macos")]
    if let Some(size) = ioctl_capacity(file) {
        return Ok(size);
    }

    // Regular files (and some platforms' device nodes) report through
    // metadata; block devices that report zero get probed by seeking.
    let len = file.metadata()?.len();
    if len > 0 {
        return Ok(len);
    }
    file.try_clone()?.seek(SeekFrom::End(0))
}

#[cfg(target_os = "macos")]
#[allow(unsafe_code)]
fn ioctl_capacity(file: &File) -> Option<u64> {
    use std::os::unix::io::AsRawFd;

    const DKIOCGETBLOCKCOUNT: libc::c_ulong = 0x4008_6419;
    const DKIOCGETBLOCKSIZE: libc::c_ulong = 0x4004_6418;

    let fd = file.as_raw_fd();
    let mut block_count: u64 = 0;
    let mut block_size: u32 = 0;

    // SAFETY: both ioctls write a single integer through the provided
    // pointer, which outlives the call.
    let count_ok = unsafe { libc::ioctl(fd, DKIOCGETBLOCKCOUNT, &raw mut block_count) } == 0;
    let size_ok = unsafe { libc::ioctl(fd, DKIOCGETBLOCKSIZE, &raw mut block_size) } == 0;

    (count_ok && size_ok && block_count > 0 && block_size > 0)
        .then(|| block_count * u64::from(block_size))
}

cfg_if::cfg_if! {
    if #[cfg(target_os = "macos")] {
        #[allow(unsafe_code)]
        fn flush_device(file: &File) -> std::io::Result<()> {
            use std::os::unix::io::AsRawFd;

            // F_FULLFSYNC asks the drive itself to commit its cache; plain
            // fsync only promises the kernel handed the data over.
            const F_FULLFSYNC: libc::c_int = 51;

            let fd = file.as_raw_fd();
            // SAFETY: fcntl/fsync on an owned, open descriptor.
            if unsafe { libc::fcntl(fd, F_FULLFSYNC) } == 0 {
                return Ok(());
            }
            if unsafe { libc::fsync(fd) } == 0 {
                Ok(())
            } else {
                Err(std::io::Error::last_os_error())
            }
        }
    } else if #[cfg(unix)] {
        #[allow(unsafe_code)]
        fn flush_device(file: &File) -> std::io::Result<()> {
            use std::os::unix::io::AsRawFd;

            // SAFETY: fsync on an owned, open descriptor.
            if unsafe { libc::fsync(file.as_raw_fd()) } == 0 {
                Ok(())
            } else {
                Err(std::io::Error::last_os_error())
            }
        }
    } else {
        fn flush_device(_file: &File) -> std::io::Result<()> {
            Err(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "raw device sync is not supported on this platform",
            ))
        }
    }
}

// ============================================================================
// UNIT TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use tempfile::NamedTempFile;

    fn handle_for(file: &NamedTempFile) -> RawDeviceHandle {
        RawDeviceHandle::new(file.path().to_str().unwrap())
    }

    #[test]
    fn test_probe_read_readable_file() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(&[0u8; 4096]).unwrap();

        assert!(RawDiskMedia::new().probe_read(&handle_for(&temp)).is_ok());
    }

    #[test]
    fn test_probe_read_empty_file_is_still_readable() {
        let temp = NamedTempFile::new().unwrap();
        assert!(RawDiskMedia::new().probe_read(&handle_for(&temp)).is_ok());
    }

    #[test]
    fn test_probe_read_missing_node() {
        let handle = RawDeviceHandle::new("/definitely/not/a/device");
        let result = RawDiskMedia::new().probe_read(&handle);
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[test]
    fn test_capacity_matches_file_length() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(&[0u8; 8192]).unwrap();

        let capacity = RawDiskMedia::new().capacity(&handle_for(&temp)).unwrap();
        assert_eq!(capacity, 8192);
    }

    #[test]
    fn test_open_write_writes_in_place_without_truncating() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(&[0xFFu8; 4096]).unwrap();

        let media = RawDiskMedia::new();
        let mut writer = media.open_write(&handle_for(&temp)).unwrap();
        writer.write_all(b"HEAD").unwrap();
        writer.flush().unwrap();
        drop(writer);

        let contents = std::fs::read(temp.path()).unwrap();
        assert_eq!(contents.len(), 4096, "open for write must not truncate");
        assert_eq!(&contents[..4], b"HEAD");
        assert_eq!(contents[4], 0xFF);
    }

    #[test]
    fn test_read_back_what_was_written() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(&[0u8; 1024]).unwrap();

        let media = RawDiskMedia::new();
        let handle = handle_for(&temp);

        let mut writer = media.open_write(&handle).unwrap();
        writer.write_all(b"burnish payload").unwrap();
        drop(writer);

        let mut reader = media.open_read(&handle).unwrap();
        let mut buffer = vec![0u8; 15];
        reader.read_exact(&mut buffer).unwrap();
        assert_eq!(&buffer, b"burnish payload");
    }

    #[cfg(unix)]
    #[test]
    fn test_sync_regular_file() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(&[0u8; 512]).unwrap();

        assert!(RawDiskMedia::new().sync(&handle_for(&temp)).is_ok());
    }
}
