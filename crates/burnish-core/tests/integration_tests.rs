//! Integration tests for burnish-core
//!
//! These exercise the complete imaging flows against fake platform services
//! and loopback files standing in for raw devices, since physical media
//! cannot be part of an automated suite.

use burnish_core::{
    Error, Imager, JobStatus, MountControl, RawDeviceHandle, RawMedia, ResolveRawPath, Result,
    Stage, MIN_BLOCK_SIZE,
};
use burnish_detect::DeviceDescriptor;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::tempdir;

// ============================================================================
// Fakes
// ============================================================================

fn descriptor() -> DeviceDescriptor {
    DeviceDescriptor {
        identifier: "disk4s1".to_string(),
        name: "UBUNTU".to_string(),
        capacity: "28.9 GB".to_string(),
        mount_path: "/Volumes/UBUNTU".to_string(),
        removable: true,
    }
}

struct FixedResolver;

impl ResolveRawPath for FixedResolver {
    fn resolve(&self, _device: &DeviceDescriptor) -> Result<RawDeviceHandle> {
        Ok(RawDeviceHandle::new("/dev/rdisk4"))
    }
}

struct FailingResolver;

impl ResolveRawPath for FailingResolver {
    fn resolve(&self, device: &DeviceDescriptor) -> Result<RawDeviceHandle> {
        Err(Error::DeviceInfoUnavailable(device.identifier.clone()))
    }
}

/// Mount controller that counts invocations instead of shelling out.
#[derive(Default)]
struct CountingMounts {
    unmount_calls: AtomicUsize,
    mount_calls: AtomicUsize,
    refuse_unmount: bool,
}

impl CountingMounts {
    fn refusing() -> Self {
        Self {
            refuse_unmount: true,
            ..Self::default()
        }
    }

    fn unmounts(&self) -> usize {
        self.unmount_calls.load(Ordering::SeqCst)
    }
}

impl MountControl for CountingMounts {
    fn unmount(&self, _device: &DeviceDescriptor) -> Result<bool> {
        self.unmount_calls.fetch_add(1, Ordering::SeqCst);
        Ok(!self.refuse_unmount)
    }

    fn mount(&self, _device: &DeviceDescriptor) -> Result<bool> {
        self.mount_calls.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }
}

/// Raw media backed by an ordinary file, the loopback stand-in for a device.
struct FileMedia {
    path: PathBuf,
}

impl FileMedia {
    fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RawMedia for FileMedia {
    fn probe_read(&self, _handle: &RawDeviceHandle) -> Result<()> {
        Ok(())
    }

    fn capacity(&self, _handle: &RawDeviceHandle) -> Result<u64> {
        Ok(fs::metadata(&self.path)?.len())
    }

    fn open_read(&self, _handle: &RawDeviceHandle) -> Result<Box<dyn Read + Send>> {
        Ok(Box::new(File::open(&self.path)?))
    }

    fn open_write(&self, _handle: &RawDeviceHandle) -> Result<Box<dyn Write + Send>> {
        // Like a device node: write in place, never truncate.
        Ok(Box::new(
            OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(false)
                .open(&self.path)?,
        ))
    }

    fn sync(&self, _handle: &RawDeviceHandle) -> Result<()> {
        File::open(&self.path)?
            .sync_all()
            .map_err(|e| Error::SyncFailed(e.to_string()))
    }
}

/// Media whose probe refuses access, as an unprivileged open would.
struct DeniedMedia;

impl RawMedia for DeniedMedia {
    fn probe_read(&self, handle: &RawDeviceHandle) -> Result<()> {
        Err(Error::PermissionDenied(handle.path().to_string()))
    }

    fn capacity(&self, _handle: &RawDeviceHandle) -> Result<u64> {
        unreachable!("probe failure must abort the flow")
    }

    fn open_read(&self, _handle: &RawDeviceHandle) -> Result<Box<dyn Read + Send>> {
        unreachable!("probe failure must abort the flow")
    }

    fn open_write(&self, _handle: &RawDeviceHandle) -> Result<Box<dyn Write + Send>> {
        unreachable!("probe failure must abort the flow")
    }

    fn sync(&self, _handle: &RawDeviceHandle) -> Result<()> {
        unreachable!("probe failure must abort the flow")
    }
}

/// A reader that trickles zeros, to hold a job in `Running` long enough for
/// the test to interact with it.
struct SlowReader {
    remaining: u64,
    delay: Duration,
}

impl Read for SlowReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.remaining == 0 {
            return Ok(0);
        }
        std::thread::sleep(self.delay);
        let n = buf.len().min(4096).min(self.remaining as usize);
        buf[..n].fill(0);
        self.remaining -= n as u64;
        Ok(n)
    }
}

/// Media producing slow reads of a fixed-size fake device.
struct SlowMedia {
    total: u64,
    delay: Duration,
}

impl RawMedia for SlowMedia {
    fn probe_read(&self, _handle: &RawDeviceHandle) -> Result<()> {
        Ok(())
    }

    fn capacity(&self, _handle: &RawDeviceHandle) -> Result<u64> {
        Ok(self.total)
    }

    fn open_read(&self, _handle: &RawDeviceHandle) -> Result<Box<dyn Read + Send>> {
        Ok(Box::new(SlowReader {
            remaining: self.total,
            delay: self.delay,
        }))
    }

    fn open_write(&self, _handle: &RawDeviceHandle) -> Result<Box<dyn Write + Send>> {
        Err(Error::CopyFailed("slow media is read-only".to_string()))
    }

    fn sync(&self, _handle: &RawDeviceHandle) -> Result<()> {
        Ok(())
    }
}

fn imager(
    resolver: impl ResolveRawPath + 'static,
    mounts: Arc<CountingMounts>,
    media: impl RawMedia + 'static,
) -> Imager {
    Imager::new(Arc::new(resolver), mounts, Arc::new(media)).block_size(MIN_BLOCK_SIZE)
}

// ============================================================================
// Write flow
// ============================================================================

#[test]
fn test_write_then_read_round_trip() {
    let dir = tempdir().unwrap();
    let image = dir.path().join("source.iso");
    let device_file = dir.path().join("device.bin");
    let capture = dir.path().join("capture.iso");

    let payload: Vec<u8> = (0..8 * MIN_BLOCK_SIZE).map(|i| (i % 251) as u8).collect();
    fs::write(&image, &payload).unwrap();

    let mounts = Arc::new(CountingMounts::default());
    let writer = imager(
        FixedResolver,
        Arc::clone(&mounts),
        FileMedia::new(&device_file),
    );

    let status = writer
        .begin_write_to_device(&image, &descriptor(), |_| {})
        .unwrap()
        .wait();
    assert!(status.is_success(), "write failed: {status}");
    assert_eq!(mounts.unmounts(), 1);
    assert_eq!(fs::read(&device_file).unwrap(), payload);

    // Reading the same simulated device back must reproduce the bytes.
    let reader = imager(
        FixedResolver,
        Arc::new(CountingMounts::default()),
        FileMedia::new(&device_file),
    );
    let status = reader
        .begin_read_from_device(&descriptor(), &capture, |_| {})
        .unwrap()
        .wait();
    assert!(status.is_success(), "read failed: {status}");
    assert_eq!(fs::read(&capture).unwrap(), payload);
}

#[test]
fn test_missing_source_fails_before_any_unmount() {
    let dir = tempdir().unwrap();
    let mounts = Arc::new(CountingMounts::default());
    let im = imager(
        FixedResolver,
        Arc::clone(&mounts),
        FileMedia::new(dir.path().join("device.bin")),
    );

    let status = im
        .begin_write_to_device(dir.path().join("nope.iso"), &descriptor(), |_| {})
        .unwrap()
        .wait();

    assert!(matches!(
        status,
        JobStatus::Failed {
            stage: Stage::ValidateSource,
            error: Error::SourceNotFound(_),
        }
    ));
    assert_eq!(mounts.unmounts(), 0, "unmount must not run for a missing source");
}

#[test]
fn test_unmount_refusal_aborts_the_write() {
    let dir = tempdir().unwrap();
    let image = dir.path().join("source.iso");
    let device_file = dir.path().join("device.bin");
    fs::write(&image, vec![7u8; MIN_BLOCK_SIZE]).unwrap();

    let mounts = Arc::new(CountingMounts::refusing());
    let im = imager(FixedResolver, Arc::clone(&mounts), FileMedia::new(&device_file));

    let status = im
        .begin_write_to_device(&image, &descriptor(), |_| {})
        .unwrap()
        .wait();

    assert!(matches!(
        status,
        JobStatus::Failed {
            stage: Stage::Unmount,
            error: Error::UnmountFailed(_),
        }
    ));
    assert!(!device_file.exists(), "no bytes may reach the device");
}

#[test]
fn test_resolution_failure_aborts_before_everything_else() {
    let mounts = Arc::new(CountingMounts::default());
    let im = imager(FailingResolver, Arc::clone(&mounts), DeniedMedia);

    let status = im
        .begin_write_to_device("/tmp/whatever.iso", &descriptor(), |_| {})
        .unwrap()
        .wait();

    assert!(matches!(
        status,
        JobStatus::Failed {
            stage: Stage::Resolve,
            error: Error::DeviceInfoUnavailable(_),
        }
    ));
    assert_eq!(mounts.unmounts(), 0);
}

#[test]
fn test_permission_probe_precedes_unmount() {
    let dir = tempdir().unwrap();
    let image = dir.path().join("source.iso");
    fs::write(&image, vec![7u8; MIN_BLOCK_SIZE]).unwrap();

    let mounts = Arc::new(CountingMounts::default());
    let im = imager(FixedResolver, Arc::clone(&mounts), DeniedMedia);

    let status = im
        .begin_write_to_device(&image, &descriptor(), |_| {})
        .unwrap()
        .wait();

    assert!(matches!(
        status,
        JobStatus::Failed {
            stage: Stage::Probe,
            error: Error::PermissionDenied(_),
        }
    ));
    assert_eq!(mounts.unmounts(), 0);
}

#[test]
fn test_write_progress_monotone_and_terminal() {
    let dir = tempdir().unwrap();
    let image = dir.path().join("source.iso");
    fs::write(&image, vec![42u8; 16 * MIN_BLOCK_SIZE]).unwrap();

    let ratios = Arc::new(Mutex::new(Vec::new()));
    let ratios_cb = Arc::clone(&ratios);

    let im = imager(
        FixedResolver,
        Arc::new(CountingMounts::default()),
        FileMedia::new(dir.path().join("device.bin")),
    );

    let status = im
        .begin_write_to_device(&image, &descriptor(), move |p| {
            ratios_cb.lock().unwrap().push(p.ratio());
        })
        .unwrap()
        .wait();

    assert!(status.is_success());
    let ratios = ratios.lock().unwrap();
    assert!(!ratios.is_empty());
    for pair in ratios.windows(2) {
        assert!(pair[1] >= pair[0], "progress went backwards: {pair:?}");
    }
    assert_eq!(*ratios.last().unwrap(), 1.0);
}

// ============================================================================
// Read flow
// ============================================================================

#[test]
fn test_read_creates_missing_destination_directories() {
    let dir = tempdir().unwrap();
    let device_file = dir.path().join("device.bin");
    fs::write(&device_file, vec![9u8; MIN_BLOCK_SIZE]).unwrap();

    let output = dir.path().join("captures").join("nested").join("out.iso");
    let im = imager(
        FixedResolver,
        Arc::new(CountingMounts::default()),
        FileMedia::new(&device_file),
    );

    let status = im
        .begin_read_from_device(&descriptor(), &output, |_| {})
        .unwrap()
        .wait();

    assert!(status.is_success());
    assert_eq!(fs::read(&output).unwrap(), vec![9u8; MIN_BLOCK_SIZE]);
}

#[test]
fn test_read_does_not_unmount() {
    let dir = tempdir().unwrap();
    let device_file = dir.path().join("device.bin");
    fs::write(&device_file, vec![9u8; 128]).unwrap();

    let mounts = Arc::new(CountingMounts::default());
    let im = imager(FixedResolver, Arc::clone(&mounts), FileMedia::new(&device_file));

    let status = im
        .begin_read_from_device(&descriptor(), dir.path().join("out.iso"), |_| {})
        .unwrap()
        .wait();

    assert!(status.is_success());
    assert_eq!(mounts.unmounts(), 0);
}

// ============================================================================
// Concurrency and cancellation
// ============================================================================

#[test]
fn test_second_job_rejected_while_first_runs() {
    let dir = tempdir().unwrap();
    let im = imager(
        FixedResolver,
        Arc::new(CountingMounts::default()),
        SlowMedia {
            total: 64 * 1024,
            delay: Duration::from_millis(20),
        },
    );

    let first = im
        .begin_read_from_device(&descriptor(), dir.path().join("a.iso"), |_| {})
        .unwrap();
    assert!(im.has_active_job());

    let second = im.begin_read_from_device(&descriptor(), dir.path().join("b.iso"), |_| {});
    assert!(matches!(second, Err(Error::JobAlreadyActive)));

    // The rejection must not have disturbed the running job.
    let status = first.wait();
    assert!(status.is_success(), "first job was disturbed: {status}");
    assert!(!im.has_active_job());

    // With the slot free again, a new job starts normally.
    let third = im
        .begin_read_from_device(&descriptor(), dir.path().join("c.iso"), |_| {})
        .unwrap();
    assert!(third.wait().is_success());
}

#[test]
fn test_cancellation_is_a_distinct_terminal_state() {
    let dir = tempdir().unwrap();
    let emissions = Arc::new(AtomicUsize::new(0));
    let emissions_cb = Arc::clone(&emissions);

    let im = imager(
        FixedResolver,
        Arc::new(CountingMounts::default()),
        SlowMedia {
            total: 512 * 1024 * 1024,
            delay: Duration::from_millis(5),
        },
    );

    let handle = im
        .begin_read_from_device(&descriptor(), dir.path().join("out.iso"), move |_| {
            emissions_cb.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    std::thread::sleep(Duration::from_millis(50));
    handle.cancel();
    let status = handle.wait();

    assert!(matches!(status, JobStatus::Cancelled));

    // Once cancellation is acknowledged no further callback fires.
    let after_ack = emissions.load(Ordering::SeqCst);
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(emissions.load(Ordering::SeqCst), after_ack);
}

#[test]
fn test_cancel_active_reaches_the_running_job() {
    let dir = tempdir().unwrap();
    let im = imager(
        FixedResolver,
        Arc::new(CountingMounts::default()),
        SlowMedia {
            total: 512 * 1024 * 1024,
            delay: Duration::from_millis(5),
        },
    );

    let handle = im
        .begin_read_from_device(&descriptor(), dir.path().join("out.iso"), |_| {})
        .unwrap();

    std::thread::sleep(Duration::from_millis(30));
    im.cancel_active();

    assert!(matches!(handle.wait(), JobStatus::Cancelled));
    assert!(!im.has_active_job());
}
