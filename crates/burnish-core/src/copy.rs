//! Streaming block copy between an image file and a raw device.
//!
//! The engine moves bytes in large fixed-size blocks in either direction
//! (file to device or device to file) without ever holding the whole source
//! in memory. Progress is derived from bytes transferred against a total the
//! caller computes upfront: file length for file sources, queried device
//! capacity for device sources. The reported ratio is therefore monotone and
//! lands on exactly 1.0 when the copy completes.

use crate::error::{Error, Result};
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default block size for copy operations (1 MiB).
pub const DEFAULT_BLOCK_SIZE: usize = 1024 * 1024;

/// Minimum block size (4 KiB).
pub const MIN_BLOCK_SIZE: usize = 4 * 1024;

/// Maximum block size (64 MiB).
pub const MAX_BLOCK_SIZE: usize = 64 * 1024 * 1024;

/// Minimum interval between progress callbacks, except the terminal one.
pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

/// Copy progress information.
#[derive(Debug, Clone)]
pub struct CopyProgress {
    /// Bytes transferred so far.
    pub bytes_copied: u64,

    /// Total bytes this copy will transfer.
    pub total_bytes: u64,

    /// Smoothed transfer speed in bytes per second.
    pub speed_bps: u64,

    /// Estimated seconds remaining, when a speed estimate exists.
    pub eta_seconds: Option<u64>,

    /// Elapsed time since the copy started.
    pub elapsed: Duration,
}

impl CopyProgress {
    fn new(total_bytes: u64) -> Self {
        Self {
            bytes_copied: 0,
            total_bytes,
            speed_bps: 0,
            eta_seconds: None,
            elapsed: Duration::ZERO,
        }
    }

    /// Completion ratio in `[0.0, 1.0]`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn ratio(&self) -> f64 {
        if self.total_bytes == 0 {
            1.0
        } else {
            (self.bytes_copied as f64 / self.total_bytes as f64).min(1.0)
        }
    }

    /// Whether the copy has transferred everything it set out to.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.bytes_copied >= self.total_bytes
    }

    /// Format the current speed for display (e.g. `"45.2 MB/s"`).
    #[must_use]
    pub fn speed_display(&self) -> String {
        format_speed(self.speed_bps)
    }

    /// Format the ETA for display (e.g. `"2m 30s"`).
    #[must_use]
    pub fn eta_display(&self) -> String {
        match self.eta_seconds {
            Some(secs) if secs > 0 => format_duration(secs),
            _ => "calculating...".to_string(),
        }
    }
}

/// Progress callback type.
pub type ProgressCallback = Box<dyn Fn(&CopyProgress) + Send + Sync>;

/// Configuration for copy operations.
#[derive(Debug, Clone)]
pub struct CopyConfig {
    /// Block size for read/write operations.
    pub block_size: usize,

    /// Whether to flush the destination when the copy completes.
    pub flush_on_complete: bool,
}

impl Default for CopyConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            flush_on_complete: true,
        }
    }
}

impl CopyConfig {
    /// Create a new config with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the block size, clamped to the valid range.
    #[must_use]
    pub fn block_size(mut self, size: usize) -> Self {
        self.block_size = size.clamp(MIN_BLOCK_SIZE, MAX_BLOCK_SIZE);
        self
    }

    /// Set whether to flush the destination on completion.
    #[must_use]
    pub fn flush_on_complete(mut self, flush: bool) -> Self {
        self.flush_on_complete = flush;
        self
    }
}

/// Result of a completed copy.
#[derive(Debug, Clone)]
pub struct CopyResult {
    /// Total bytes transferred.
    pub bytes_copied: u64,

    /// Wall-clock duration of the copy.
    pub elapsed: Duration,

    /// Average speed in bytes per second.
    pub average_speed: u64,
}

impl CopyResult {
    /// Format the average speed for display.
    #[must_use]
    pub fn speed_display(&self) -> String {
        format_speed(self.average_speed)
    }
}

/// Block copy engine.
pub struct CopyEngine {
    config: CopyConfig,
    progress_callback: Option<ProgressCallback>,
    cancel_flag: Arc<AtomicBool>,
}

impl CopyEngine {
    /// Create an engine with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(CopyConfig::default())
    }

    /// Create an engine with custom configuration.
    #[must_use]
    pub fn with_config(config: CopyConfig) -> Self {
        Self {
            config,
            progress_callback: None,
            cancel_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Set a progress callback.
    ///
    /// Invoked from whatever thread runs [`CopyEngine::copy`]; marshaling to
    /// a UI context is the caller's concern.
    #[must_use]
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(&CopyProgress) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Box::new(callback));
        self
    }

    /// Share an externally owned cancellation flag.
    ///
    /// The engine never resets the flag; a flag raised before the copy even
    /// starts cancels immediately.
    #[must_use]
    pub fn cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel_flag = flag;
        self
    }

    /// Get a handle that cancels the copy when set.
    #[must_use]
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel_flag)
    }

    /// Copy `total_bytes` from `source` to `target`.
    ///
    /// Stops at `total_bytes` or at source EOF, whichever comes first. On
    /// success the terminal progress value is emitted exactly once, after the
    /// destination flush. On cancellation nothing further is emitted and the
    /// destination is left partially written.
    ///
    /// # Errors
    ///
    /// [`Error::Cancelled`] when the cancel flag is raised,
    /// [`Error::PermissionDenied`] when the OS refuses access mid-copy, and
    /// [`Error::CopyFailed`] for any other I/O failure.
    pub fn copy<R, W>(&mut self, mut source: R, mut target: W, total_bytes: u64) -> Result<CopyResult>
    where
        R: Read,
        W: Write,
    {
        let start_time = Instant::now();
        let block_size = self.config.block_size;

        let mut buffer = vec![0u8; block_size];
        let mut progress = CopyProgress::new(total_bytes);
        let mut speed_tracker = SpeedTracker::new();
        let mut last_emit: Option<Instant> = None;

        loop {
            if self.cancel_flag.load(Ordering::SeqCst) {
                return Err(Error::Cancelled);
            }

            let remaining = total_bytes.saturating_sub(progress.bytes_copied);
            if remaining == 0 {
                break;
            }
            let to_read = block_size.min(usize::try_from(remaining).unwrap_or(block_size));

            let bytes_read = read_exact_or_eof(&mut source, &mut buffer[..to_read])?;
            if bytes_read == 0 {
                break; // EOF
            }

            target
                .write_all(&buffer[..bytes_read])
                .map_err(classify_io_error)?;

            progress.bytes_copied += bytes_read as u64;
            progress.elapsed = start_time.elapsed();
            speed_tracker.update(progress.bytes_copied);
            progress.speed_bps = speed_tracker.current_speed();
            progress.eta_seconds = calculate_eta(
                progress.bytes_copied,
                progress.total_bytes,
                progress.speed_bps,
            );

            // Intermediate emissions are throttled; the terminal value is
            // reserved for the single emission after the flush.
            let due = last_emit.is_none_or(|at| at.elapsed() >= PROGRESS_INTERVAL);
            if due && !progress.is_complete() {
                self.emit(&progress);
                last_emit = Some(Instant::now());
            }
        }

        if self.config.flush_on_complete {
            target.flush().map_err(classify_io_error)?;
        }

        progress.elapsed = start_time.elapsed();
        progress.eta_seconds = Some(0);
        self.emit(&progress);

        let elapsed = start_time.elapsed();
        let average_speed = if elapsed.as_secs() > 0 {
            progress.bytes_copied / elapsed.as_secs()
        } else {
            progress.bytes_copied
        };

        Ok(CopyResult {
            bytes_copied: progress.bytes_copied,
            elapsed,
            average_speed,
        })
    }

    fn emit(&self, progress: &CopyProgress) {
        if let Some(ref callback) = self.progress_callback {
            callback(progress);
        }
    }
}

impl Default for CopyEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Speed tracking with smoothing over recent samples.
struct SpeedTracker {
    samples: Vec<(Instant, u64)>,
    max_samples: usize,
}

impl SpeedTracker {
    fn new() -> Self {
        Self {
            samples: Vec::with_capacity(10),
            max_samples: 10,
        }
    }

    fn update(&mut self, bytes_copied: u64) {
        if self.samples.len() >= self.max_samples {
            self.samples.remove(0);
        }
        self.samples.push((Instant::now(), bytes_copied));
    }

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn current_speed(&self) -> u64 {
        if self.samples.len() < 2 {
            return 0;
        }

        let first = &self.samples[0];
        let last = &self.samples[self.samples.len() - 1];

        let duration = last.0.duration_since(first.0);
        let bytes = last.1.saturating_sub(first.1);

        if duration.as_millis() > 0 {
            (bytes as f64 / duration.as_secs_f64()) as u64
        } else {
            0
        }
    }
}

/// Read exactly the buffer size or until EOF.
fn read_exact_or_eof<R: Read>(reader: &mut R, buffer: &mut [u8]) -> Result<usize> {
    let mut total_read = 0;

    while total_read < buffer.len() {
        match reader.read(&mut buffer[total_read..]) {
            Ok(0) => break, // EOF
            Ok(n) => total_read += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(classify_io_error(e)),
        }
    }

    Ok(total_read)
}

/// Map an I/O failure inside the copy loop onto the imaging error taxonomy.
fn classify_io_error(e: std::io::Error) -> Error {
    if e.kind() == std::io::ErrorKind::PermissionDenied {
        Error::PermissionDenied(e.to_string())
    } else {
        Error::CopyFailed(e.to_string())
    }
}

/// Calculate estimated seconds remaining.
fn calculate_eta(bytes_copied: u64, total_bytes: u64, speed_bps: u64) -> Option<u64> {
    if speed_bps == 0 || bytes_copied >= total_bytes {
        return None;
    }

    let remaining = total_bytes.saturating_sub(bytes_copied);
    Some(remaining / speed_bps)
}

/// Format a speed for display.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_speed(bytes_per_second: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes_per_second >= GB {
        format!("{:.1} GB/s", bytes_per_second as f64 / GB as f64)
    } else if bytes_per_second >= MB {
        format!("{:.1} MB/s", bytes_per_second as f64 / MB as f64)
    } else if bytes_per_second >= KB {
        format!("{:.1} KB/s", bytes_per_second as f64 / KB as f64)
    } else {
        format!("{bytes_per_second} B/s")
    }
}

/// Format a duration in seconds for display.
#[must_use]
pub fn format_duration(seconds: u64) -> String {
    if seconds >= 3600 {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    } else if seconds >= 60 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else {
        format!("{seconds}s")
    }
}

// ============================================================================
// UNIT TESTS
// ============================================================================
