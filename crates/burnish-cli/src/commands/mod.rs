//! CLI subcommand implementations

pub mod list;
pub mod read;
pub mod write;

use anyhow::{anyhow, bail, Context, Result};
use burnish_core::{
    CopyProgress, Imager, JobHandle, JobStatus, Settings, MAX_BLOCK_SIZE, MIN_BLOCK_SIZE,
};
use burnish_detect::DeviceDescriptor;
use burnish_platform::{MountController, RawDiskMedia, RawDiskResolver};
use console::style;
use dialoguer::Select;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Build the orchestrator over the real platform services.
pub(crate) fn imager(block_size: usize) -> Imager {
    Imager::new(
        Arc::new(RawDiskResolver::new()),
        Arc::new(MountController::new()),
        Arc::new(RawDiskMedia::new()),
    )
    .block_size(block_size)
}

/// Pick the target device: by identifier when given, interactively otherwise.
pub(crate) fn select_device(
    requested: Option<&str>,
    assume_yes: bool,
) -> Result<DeviceDescriptor> {
    let devices = burnish_detect::list_removable_devices();

    if devices.is_empty() {
        bail!("No removable devices found. Insert a USB device and try again.");
    }

    if let Some(identifier) = requested {
        return devices
            .into_iter()
            .find(|d| d.identifier == identifier)
            .ok_or_else(|| {
                anyhow!("Device {identifier} not found. Run `burnish list` to see devices.")
            });
    }

    if assume_yes {
        bail!("--yes requires --device; refusing to guess a target.");
    }

    let labels: Vec<String> = devices.iter().map(ToString::to_string).collect();
    let choice = Select::new()
        .with_prompt("Select a device")
        .items(&labels)
        .default(0)
        .interact()
        .context("device selection aborted")?;

    devices
        .into_iter()
        .nth(choice)
        .ok_or_else(|| anyhow!("selection out of range"))
}

/// Parse a block size such as `1M`, `512K`, or a plain byte count.
pub(crate) fn parse_block_size(input: &str) -> Result<usize> {
    let trimmed = input.trim();
    let (digits, multiplier) = match trimmed.chars().last() {
        Some('K' | 'k') => (&trimmed[..trimmed.len() - 1], 1024),
        Some('M' | 'm') => (&trimmed[..trimmed.len() - 1], 1024 * 1024),
        _ => (trimmed, 1),
    };

    let value: usize = digits
        .parse()
        .with_context(|| format!("invalid block size: {input}"))?;
    let bytes = value
        .checked_mul(multiplier)
        .ok_or_else(|| anyhow!("block size too large: {input}"))?;

    if !(MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&bytes) {
        bail!(
            "block size must be between {MIN_BLOCK_SIZE} and {MAX_BLOCK_SIZE} bytes, got {bytes}"
        );
    }
    Ok(bytes)
}

/// Effective block size: flag, then settings file, then default.
pub(crate) fn effective_block_size(flag: Option<&str>, settings: &Settings) -> Result<usize> {
    match flag {
        Some(text) => parse_block_size(text),
        None => Ok(settings.block_size),
    }
}

/// Build the transfer progress bar.
pub(crate) fn transfer_bar(total: u64, verb: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(&format!(
                "  {{spinner:.green}} {verb} [{{bar:40.cyan/blue}}] {{bytes}}/{{total_bytes}} ({{eta}})"
            ))
            .expect("static template")
            .progress_chars("█▓░"),
    );
    pb
}

/// Wire a progress bar to engine callbacks.
pub(crate) fn bar_updater(pb: ProgressBar) -> impl Fn(&CopyProgress) + Send + Sync + 'static {
    move |p: &CopyProgress| {
        if pb.length() != Some(p.total_bytes) {
            pb.set_length(p.total_bytes);
        }
        pb.set_position(p.bytes_copied);
    }
}

/// Watch a running job, forwarding Ctrl+C to it, and render the outcome.
pub(crate) fn supervise(
    handle: JobHandle,
    cancel_requested: &Arc<AtomicBool>,
    pb: &ProgressBar,
    success_message: &str,
) -> Result<()> {
    while !handle.is_finished() {
        if cancel_requested.load(Ordering::SeqCst) {
            handle.cancel();
        }
        std::thread::sleep(Duration::from_millis(100));
    }

    let status = handle.wait();
    match status {
        JobStatus::Succeeded => {
            pb.finish_and_clear();
            println!("{} {success_message}", style("✓").green().bold());
            Ok(())
        }
        JobStatus::Cancelled => {
            pb.finish_and_clear();
            println!("{} Cancelled", style("✗").yellow().bold());
            Ok(())
        }
        JobStatus::Failed { stage, error } => {
            pb.finish_and_clear();
            let hint = permission_hint(&error);
            Err(anyhow!("{error} (while {stage}){hint}"))
        }
        // The worker owns the terminal transition, so a handle never
        // surfaces a non-terminal state here.
        JobStatus::Pending | JobStatus::Running => unreachable!("wait() returns terminal states"),
    }
}

fn permission_hint(error: &burnish_core::Error) -> &'static str {
    if matches!(error, burnish_core::Error::PermissionDenied(_))
        && !burnish_platform::has_elevated_privileges()
    {
        "\nRaw device access usually needs elevated privileges; try again with sudo."
    } else {
        ""
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_block_size_suffixes() {
        assert_eq!(parse_block_size("1M").unwrap(), 1024 * 1024);
        assert_eq!(parse_block_size("4m").unwrap(), 4 * 1024 * 1024);
        assert_eq!(parse_block_size("512K").unwrap(), 512 * 1024);
        assert_eq!(parse_block_size("8192").unwrap(), 8192);
    }

    #[test]
    fn test_parse_block_size_rejects_garbage() {
        assert!(parse_block_size("lots").is_err());
        assert!(parse_block_size("").is_err());
        assert!(parse_block_size("12Q").is_err());
    }

    #[test]
    fn test_parse_block_size_rejects_out_of_range() {
        assert!(parse_block_size("1").is_err());
        assert!(parse_block_size("999999M").is_err());
    }

    #[test]
    fn test_effective_block_size_prefers_flag() {
        let settings = Settings::default();
        assert_eq!(
            effective_block_size(Some("2M"), &settings).unwrap(),
            2 * 1024 * 1024
        );
        assert_eq!(
            effective_block_size(None, &settings).unwrap(),
            settings.block_size
        );
    }
}
