//! Write command - image a removable device from an ISO file

use super::{bar_updater, effective_block_size, imager, select_device, supervise, transfer_bar};
use anyhow::{bail, Context, Result};
use burnish_core::{ResolveRawPath, Settings};
use burnish_detect::format_bytes;
use burnish_platform::RawDiskResolver;
use console::style;
use dialoguer::Confirm;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Arguments for the write command.
pub struct WriteArgs {
    /// Source image file.
    pub image: PathBuf,
    /// Requested device identifier, if any.
    pub device: Option<String>,
    /// Block size override from the command line.
    pub block_size: Option<String>,
    /// Skip the confirmation prompt.
    pub skip_confirm: bool,
    /// Raised by the Ctrl+C handler.
    pub cancel_requested: Arc<AtomicBool>,
}

/// Execute the write command.
pub fn execute(args: WriteArgs) -> Result<()> {
    let settings = Settings::load();
    let block_size = effective_block_size(args.block_size.as_deref(), &settings)?;

    // Coarse checks only: the image must exist and look like a disk image.
    // Anything deeper is the engine's job.
    let metadata = fs::metadata(&args.image)
        .with_context(|| format!("Source image not found: {}", args.image.display()))?;
    if !metadata.is_file() {
        bail!("Source image not found: {} is not a file", args.image.display());
    }
    warn_on_odd_extension(&args.image);

    let device = select_device(args.device.as_deref(), args.skip_confirm)?;

    // Preview the raw target so the confirmation names the exact disk that
    // is about to be erased. The orchestrator resolves again at job start;
    // this result is never reused.
    let raw_preview = RawDiskResolver::new().resolve(&device)?;

    println!(
        "About to write {} ({}) to {}",
        style(args.image.display()).white().bold(),
        format_bytes(metadata.len()),
        style(&device).white().bold(),
    );
    println!(
        "{}",
        style(format!("This will erase {raw_preview} entirely."))
            .red()
            .bold()
    );

    let skip_confirm = args.skip_confirm || settings.auto_confirm;
    if !skip_confirm {
        let proceed = Confirm::new()
            .with_prompt(format!("Erase {raw_preview} and write the image?"))
            .default(false)
            .interact()
            .context("confirmation aborted")?;
        if !proceed {
            println!("Aborted.");
            return Ok(());
        }
    }

    let pb = transfer_bar(metadata.len(), "Writing");
    let im = imager(block_size);
    tracing::debug!(image = %args.image.display(), device = %device.identifier, "starting write job");

    let handle = im.begin_write_to_device(&args.image, &device, bar_updater(pb.clone()))?;
    supervise(handle, &args.cancel_requested, &pb, "Write complete")
}

fn warn_on_odd_extension(image: &std::path::Path) {
    let ext = image
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    if !matches!(ext.as_str(), "iso" | "img" | "raw" | "dmg") {
        println!(
            "{}",
            style(format!(
                "Warning: {} does not look like a disk image",
                image.display()
            ))
            .yellow()
        );
    }
}
