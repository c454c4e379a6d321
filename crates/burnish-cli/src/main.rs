//! Burnish - write ISO images to removable USB devices
//!
//! # Usage
//!
//! ```bash
//! # List removable devices
//! burnish list
//!
//! # Write an ISO to a device (interactive selection)
//! burnish write ubuntu.iso
//!
//! # Write to a specific device without prompting
//! burnish write ubuntu.iso --device disk4s1 --yes
//!
//! # Capture a device back into an image
//! burnish read backup.iso --device disk4s1
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use console::style;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod commands;

/// Burnish - write ISO images to removable USB devices
#[derive(Parser)]
#[command(name = "burnish")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List removable devices
    List {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Write an image to a removable device
    Write {
        /// Source image file (.iso, .img)
        image: PathBuf,

        /// Target device identifier (e.g. disk4s1); interactive when omitted
        #[arg(short, long)]
        device: Option<String>,

        /// Block size for copying (e.g. 1M, 512K, 4M)
        #[arg(short, long)]
        block_size: Option<String>,

        /// Skip the confirmation prompt (use with caution!)
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Capture a removable device into an image file
    Read {
        /// Output image file
        output: PathBuf,

        /// Source device identifier (e.g. disk4s1); interactive when omitted
        #[arg(short, long)]
        device: Option<String>,

        /// Block size for copying (e.g. 1M, 512K, 4M)
        #[arg(short, long)]
        block_size: Option<String>,

        /// Overwrite an existing output file without asking
        #[arg(short = 'y', long)]
        yes: bool,
    },
}

fn main() {
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("{} {}", style("Error:").red().bold(), panic_info);
    }));

    if let Err(e) = run() {
        eprintln!("{} {e:#}", style("Error:").red().bold());
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else if cli.quiet {
        EnvFilter::new("off")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();

    // First Ctrl+C cancels the active job; the second force-exits.
    let cancel_requested = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&cancel_requested);
    ctrlc::set_handler(move || {
        if handler_flag.swap(true, Ordering::SeqCst) {
            eprintln!("\n{}", style("Forced exit").red().bold());
            std::process::exit(130);
        }
        eprintln!(
            "\n{}",
            style("Cancelling... Press Ctrl+C again to force exit").yellow()
        );
    })?;

    match cli.command {
        Commands::List { json } => commands::list::execute(json),
        Commands::Write {
            image,
            device,
            block_size,
            yes,
        } => commands::write::execute(commands::write::WriteArgs {
            image,
            device,
            block_size,
            skip_confirm: yes,
            cancel_requested,
        }),
        Commands::Read {
            output,
            device,
            block_size,
            yes,
        } => commands::read::execute(commands::read::ReadArgs {
            output,
            device,
            block_size,
            overwrite: yes,
            cancel_requested,
        }),
    }
}
