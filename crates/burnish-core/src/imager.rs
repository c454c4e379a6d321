//! Imaging orchestration: composes raw-path resolution, mount control, and
//! the block copy engine into the two user-facing operations.
//!
//! The orchestrator owns operation ordering. For a write: resolve the raw
//! path while the volume metadata still exists, probe read access before
//! anything destructive, validate the source image before touching mount
//! state, unmount, copy, sync. For a read: resolve, prepare the destination,
//! copy. No unmount is required for reading.
//!
//! One job at a time, globally. The copy runs on a dedicated worker thread;
//! progress and the terminal status are delivered through the caller's
//! callback and the returned [`JobHandle`]. Callbacks are invoked on the
//! worker thread; marshaling to a UI context is the caller's concern.

use crate::copy::{CopyConfig, CopyEngine, CopyProgress, DEFAULT_BLOCK_SIZE};
use crate::error::{Error, Result};
use crate::job::{ImagingJob, JobStatus, RawDeviceHandle, Stage};
use burnish_detect::DeviceDescriptor;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

/// Derives the raw device path for a descriptor.
///
/// Resolution is invoked immediately before each operation and its result is
/// never cached across jobs.
pub trait ResolveRawPath: Send + Sync {
    /// Resolve the unbuffered device node for `device`.
    ///
    /// # Errors
    ///
    /// [`Error::DeviceInfoUnavailable`], [`Error::DeviceInfoParseFailed`], or
    /// [`Error::RawPathNotFound`] depending on where resolution broke down.
    fn resolve(&self, device: &DeviceDescriptor) -> Result<RawDeviceHandle>;
}

/// Changes OS mount state for a volume.
pub trait MountControl: Send + Sync {
    /// Unmount the volume. `Ok(false)` means the tool reported failure.
    ///
    /// # Errors
    ///
    /// Returns an error when the disk-management tool could not be invoked.
    fn unmount(&self, device: &DeviceDescriptor) -> Result<bool>;

    /// Mount the volume again. Exposed for symmetry; the imaging flows never
    /// remount automatically.
    ///
    /// # Errors
    ///
    /// Returns an error when the disk-management tool could not be invoked.
    fn mount(&self, device: &DeviceDescriptor) -> Result<bool>;
}

/// Raw-device I/O used by the imaging flows.
pub trait RawMedia: Send + Sync {
    /// Attempt an innocuous open/read of the raw node, distinguishing
    /// [`Error::PermissionDenied`] before anything destructive happens.
    ///
    /// # Errors
    ///
    /// [`Error::PermissionDenied`] or the underlying I/O failure.
    fn probe_read(&self, handle: &RawDeviceHandle) -> Result<()>;

    /// Queried capacity of the raw device in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error when the device cannot be opened or sized.
    fn capacity(&self, handle: &RawDeviceHandle) -> Result<u64>;

    /// Open the raw device for reading.
    ///
    /// # Errors
    ///
    /// [`Error::PermissionDenied`] or the underlying I/O failure.
    fn open_read(&self, handle: &RawDeviceHandle) -> Result<Box<dyn Read + Send>>;

    /// Open the raw device for writing.
    ///
    /// # Errors
    ///
    /// [`Error::PermissionDenied`] or the underlying I/O failure.
    fn open_write(&self, handle: &RawDeviceHandle) -> Result<Box<dyn Write + Send>>;

    /// Flush buffered writes on the raw node to the physical medium.
    ///
    /// # Errors
    ///
    /// [`Error::SyncFailed`] when the flush cannot be confirmed.
    fn sync(&self, handle: &RawDeviceHandle) -> Result<()>;
}

/// Handle to a running imaging job.
pub struct JobHandle {
    job: ImagingJob,
    cancel: Arc<AtomicBool>,
    progress_bits: Arc<AtomicU64>,
    worker: JoinHandle<JobStatus>,
}

impl JobHandle {
    /// The job description this handle tracks.
    #[must_use]
    pub fn job(&self) -> &ImagingJob {
        &self.job
    }

    /// Request cancellation. The copy stops at the next block boundary and
    /// the job terminates as [`JobStatus::Cancelled`].
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Last reported progress ratio in `[0.0, 1.0]`.
    #[must_use]
    pub fn progress(&self) -> f64 {
        f64::from_bits(self.progress_bits.load(Ordering::Relaxed))
    }

    /// Whether the worker has reached a terminal state.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Block until the job reaches a terminal state and return it.
    #[must_use]
    pub fn wait(self) -> JobStatus {
        self.worker.join().unwrap_or_else(|_| JobStatus::Failed {
            stage: Stage::Copy,
            error: Error::CopyFailed("worker thread panicked".to_string()),
        })
    }
}

/// Orchestrates imaging jobs over pluggable platform services.
pub struct Imager {
    resolver: Arc<dyn ResolveRawPath>,
    mounts: Arc<dyn MountControl>,
    media: Arc<dyn RawMedia>,
    block_size: usize,
    active: Arc<AtomicBool>,
    active_cancel: Mutex<Option<Arc<AtomicBool>>>,
}

impl Imager {
    /// Create an orchestrator over the given platform services.
    pub fn new(
        resolver: Arc<dyn ResolveRawPath>,
        mounts: Arc<dyn MountControl>,
        media: Arc<dyn RawMedia>,
    ) -> Self {
        Self {
            resolver,
            mounts,
            media,
            block_size: DEFAULT_BLOCK_SIZE,
            active: Arc::new(AtomicBool::new(false)),
            active_cancel: Mutex::new(None),
        }
    }

    /// Set the copy block size (clamped by the engine).
    #[must_use]
    pub fn block_size(mut self, size: usize) -> Self {
        self.block_size = size;
        self
    }

    /// Whether a job is currently running.
    #[must_use]
    pub fn has_active_job(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Cancel the active job, if any. Idempotent; a no-op when idle.
    pub fn cancel_active(&self) {
        if let Some(flag) = self.active_cancel.lock().expect("cancel lock").as_ref() {
            flag.store(true, Ordering::SeqCst);
        }
    }

    /// Start writing an image file onto a removable device.
    ///
    /// Returns as soon as the worker is spawned; progress arrives through
    /// `on_progress` and the terminal status through [`JobHandle::wait`].
    ///
    /// # Errors
    ///
    /// [`Error::JobAlreadyActive`] when a job is already running.
    pub fn begin_write_to_device<F>(
        &self,
        image_path: impl Into<PathBuf>,
        device: &DeviceDescriptor,
        on_progress: F,
    ) -> Result<JobHandle>
    where
        F: Fn(&CopyProgress) + Send + Sync + 'static,
    {
        let job = ImagingJob::write_to_device(image_path, device.clone());
        self.begin(job, on_progress)
    }

    /// Start capturing a removable device into an image file.
    ///
    /// # Errors
    ///
    /// [`Error::JobAlreadyActive`] when a job is already running.
    pub fn begin_read_from_device<F>(
        &self,
        device: &DeviceDescriptor,
        output_path: impl Into<PathBuf>,
        on_progress: F,
    ) -> Result<JobHandle>
    where
        F: Fn(&CopyProgress) + Send + Sync + 'static,
    {
        let job = ImagingJob::read_from_device(device.clone(), output_path);
        self.begin(job, on_progress)
    }

    fn begin<F>(&self, job: ImagingJob, on_progress: F) -> Result<JobHandle>
    where
        F: Fn(&CopyProgress) + Send + Sync + 'static,
    {
        if self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::JobAlreadyActive);
        }

        let cancel = Arc::new(AtomicBool::new(false));
        let progress_bits = Arc::new(AtomicU64::new(0.0f64.to_bits()));
        *self.active_cancel.lock().expect("cancel lock") = Some(Arc::clone(&cancel));

        let resolver = Arc::clone(&self.resolver);
        let mounts = Arc::clone(&self.mounts);
        let media = Arc::clone(&self.media);
        let block_size = self.block_size;
        let active = Arc::clone(&self.active);
        let worker_job = job.clone();
        let worker_cancel = Arc::clone(&cancel);
        let callback_bits = Arc::clone(&progress_bits);

        tracing::info!(job = %job, "starting imaging job");

        let worker = std::thread::spawn(move || {
            let _guard = ActiveGuard(active);

            let emit = move |p: &CopyProgress| {
                callback_bits.store(p.ratio().to_bits(), Ordering::Relaxed);
                on_progress(p);
            };

            let status = match worker_job.direction {
                crate::job::Direction::WriteToDevice => run_write(
                    &*resolver,
                    &*mounts,
                    &*media,
                    &worker_job,
                    &worker_cancel,
                    block_size,
                    emit,
                ),
                crate::job::Direction::ReadFromDevice => run_read(
                    &*resolver,
                    &*media,
                    &worker_job,
                    &worker_cancel,
                    block_size,
                    emit,
                ),
            };

            tracing::info!(job = %worker_job, status = %status, "imaging job finished");
            status
        });

        Ok(JobHandle {
            job,
            cancel,
            progress_bits,
            worker,
        })
    }
}

/// Clears the single-job flag when the worker exits, panics included.
struct ActiveGuard(Arc<AtomicBool>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

fn fail(job: &ImagingJob, stage: Stage, error: Error) -> JobStatus {
    tracing::error!(job = %job, %stage, %error, "imaging job failed");
    JobStatus::Failed { stage, error }
}

fn cancelled(cancel: &AtomicBool) -> bool {
    cancel.load(Ordering::SeqCst)
}

fn run_write<F>(
    resolver: &dyn ResolveRawPath,
    mounts: &dyn MountControl,
    media: &dyn RawMedia,
    job: &ImagingJob,
    cancel: &Arc<AtomicBool>,
    block_size: usize,
    emit: F,
) -> JobStatus
where
    F: Fn(&CopyProgress) + Send + Sync + 'static,
{
    let device = &job.device;

    // Resolution must precede unmount: it reads volume metadata that
    // disappears once the volume is unmounted.
    let handle = match resolver.resolve(device) {
        Ok(handle) => handle,
        Err(e) => return fail(job, Stage::Resolve, e),
    };
    tracing::debug!(device = %device.identifier, raw = %handle, "resolved raw device");

    if cancelled(cancel) {
        return JobStatus::Cancelled;
    }

    // Surface a permission problem while the device is still untouched.
    if let Err(e) = media.probe_read(&handle) {
        return fail(job, Stage::Probe, e);
    }

    // The source must be readable before mount state changes; a missing
    // image must never cost the user an unmount.
    let (source, total_bytes) = match open_source(&job.image_path) {
        Ok(opened) => opened,
        Err(e) => return fail(job, Stage::ValidateSource, e),
    };

    if cancelled(cancel) {
        return JobStatus::Cancelled;
    }

    match mounts.unmount(device) {
        Ok(true) => {}
        Ok(false) => {
            return fail(
                job,
                Stage::Unmount,
                Error::UnmountFailed(device.mount_path.clone()),
            )
        }
        Err(e) => return fail(job, Stage::Unmount, e),
    }

    let target = match media.open_write(&handle) {
        Ok(target) => target,
        Err(e) => return fail(job, Stage::Copy, e),
    };

    let mut engine = CopyEngine::with_config(CopyConfig::new().block_size(block_size))
        .cancel_flag(Arc::clone(cancel))
        .on_progress(emit);

    match engine.copy(source, target, total_bytes) {
        Ok(result) => {
            tracing::debug!(bytes = result.bytes_copied, "copy complete");
        }
        Err(Error::Cancelled) => return JobStatus::Cancelled,
        Err(e) => return fail(job, Stage::Copy, e),
    }

    // Process exit alone does not commit writes to external media.
    if let Err(e) = media.sync(&handle) {
        return fail(job, Stage::Sync, e);
    }

    JobStatus::Succeeded
}

fn run_read<F>(
    resolver: &dyn ResolveRawPath,
    media: &dyn RawMedia,
    job: &ImagingJob,
    cancel: &Arc<AtomicBool>,
    block_size: usize,
    emit: F,
) -> JobStatus
where
    F: Fn(&CopyProgress) + Send + Sync + 'static,
{
    let handle = match resolver.resolve(&job.device) {
        Ok(handle) => handle,
        Err(e) => return fail(job, Stage::Resolve, e),
    };
    tracing::debug!(device = %job.device.identifier, raw = %handle, "resolved raw device");

    if cancelled(cancel) {
        return JobStatus::Cancelled;
    }

    let target = match prepare_output(&job.image_path) {
        Ok(file) => file,
        Err(e) => return fail(job, Stage::PrepareTarget, e),
    };

    // Progress totals come from the device itself, never from a formatted
    // capacity string.
    let total_bytes = match media.capacity(&handle) {
        Ok(total) => total,
        Err(e) => return fail(job, Stage::Copy, e),
    };
    let source = match media.open_read(&handle) {
        Ok(source) => source,
        Err(e) => return fail(job, Stage::Copy, e),
    };

    let mut engine = CopyEngine::with_config(CopyConfig::new().block_size(block_size))
        .cancel_flag(Arc::clone(cancel))
        .on_progress(emit);

    match engine.copy(source, target, total_bytes) {
        Ok(result) => {
            tracing::debug!(bytes = result.bytes_copied, "capture complete");
            JobStatus::Succeeded
        }
        Err(Error::Cancelled) => JobStatus::Cancelled,
        Err(e) => fail(job, Stage::Copy, e),
    }
}

fn open_source(path: &Path) -> Result<(File, u64)> {
    let metadata = fs::metadata(path)
        .map_err(|e| Error::SourceNotFound(format!("{}: {e}", path.display())))?;
    if !metadata.is_file() {
        return Err(Error::SourceNotFound(format!(
            "{}: not a regular file",
            path.display()
        )));
    }
    let file =
        File::open(path).map_err(|e| Error::SourceNotFound(format!("{}: {e}", path.display())))?;
    Ok((file, metadata.len()))
}

fn prepare_output(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(File::create(path)?)
}

// ============================================================================
// UNIT TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_open_source_missing_file() {
        let result = open_source(Path::new("/definitely/not/here.iso"));
        assert!(matches!(result, Err(Error::SourceNotFound(_))));
    }

    #[test]
    fn test_open_source_directory_is_not_a_source() {
        let dir = tempdir().unwrap();
        let result = open_source(dir.path());
        assert!(matches!(result, Err(Error::SourceNotFound(_))));
    }

    #[test]
    fn test_open_source_reports_length() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("image.iso");
        fs::write(&path, vec![0u8; 4096]).unwrap();

        let (_file, len) = open_source(&path).unwrap();
        assert_eq!(len, 4096);
    }

    #[test]
    fn test_prepare_output_creates_missing_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("captures/today/out.iso");

        let file = prepare_output(&path).unwrap();
        drop(file);

        assert!(path.exists());
    }

    #[test]
    fn test_active_guard_clears_flag() {
        let flag = Arc::new(AtomicBool::new(true));
        {
            let _guard = ActiveGuard(Arc::clone(&flag));
        }
        assert!(!flag.load(Ordering::SeqCst));
    }
}
