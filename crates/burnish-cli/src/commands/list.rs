//! List command - displays removable devices

use anyhow::Result;
use burnish_detect::DeviceDescriptor;
use console::style;

/// Execute the list command.
pub fn execute(json: bool) -> Result<()> {
    let devices = burnish_detect::list_removable_devices();

    // Machine-readable mode prints even an empty snapshot.
    if json {
        println!("{}", serde_json::to_string_pretty(&devices)?);
        return Ok(());
    }

    if devices.is_empty() {
        println!("No removable devices found.");
        println!(
            "{}",
            style("Tip: insert a USB device and run `burnish list` again").dim()
        );
        return Ok(());
    }

    println!(
        "{} {} removable device(s):\n",
        style("Found").green().bold(),
        devices.len()
    );

    for device in &devices {
        print_device(device);
    }

    Ok(())
}

fn print_device(device: &DeviceDescriptor) {
    println!(
        "{} {} {} ({})",
        style("✓").green().bold(),
        style(&device.identifier).white().bold(),
        style(&device.name).white(),
        device.capacity
    );
    println!("    Mounted: {}", style(&device.mount_path).dim());
    println!();
}
