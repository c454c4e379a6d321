//! Read command - capture a removable device into an image file

use super::{bar_updater, effective_block_size, imager, select_device, supervise, transfer_bar};
use anyhow::{Context, Result};
use burnish_core::Settings;
use console::style;
use dialoguer::Confirm;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Arguments for the read command.
pub struct ReadArgs {
    /// Output image file.
    pub output: PathBuf,
    /// Requested device identifier, if any.
    pub device: Option<String>,
    /// Block size override from the command line.
    pub block_size: Option<String>,
    /// Overwrite an existing output file without asking.
    pub overwrite: bool,
    /// Raised by the Ctrl+C handler.
    pub cancel_requested: Arc<AtomicBool>,
}

/// Execute the read command.
pub fn execute(args: ReadArgs) -> Result<()> {
    let settings = Settings::load();
    let block_size = effective_block_size(args.block_size.as_deref(), &settings)?;

    let device = select_device(args.device.as_deref(), args.overwrite)?;

    if args.output.exists() && !(args.overwrite || settings.auto_confirm) {
        let proceed = Confirm::new()
            .with_prompt(format!("Overwrite {}?", args.output.display()))
            .default(false)
            .interact()
            .context("confirmation aborted")?;
        if !proceed {
            println!("Aborted.");
            return Ok(());
        }
    }

    println!(
        "Capturing {} to {}",
        style(&device).white().bold(),
        style(args.output.display()).white().bold(),
    );

    // Length starts at zero and is corrected by the first progress callback,
    // which carries the queried device capacity.
    let pb = transfer_bar(0, "Reading");
    let im = imager(block_size);
    tracing::debug!(device = %device.identifier, output = %args.output.display(), "starting read job");

    let handle = im.begin_read_from_device(&device, &args.output, bar_updater(pb.clone()))?;
    supervise(handle, &args.cancel_requested, &pb, "Capture complete")
}
