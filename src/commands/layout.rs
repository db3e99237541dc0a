//! Layout command implementations

use super::format_size;
use rmicro_core::layout::{DeviceConfig, MemoryLayout};
use std::path::Path;

/// Allocate a device file's sections, printing or saving the result
pub fn cmd_allocate(device: &Path, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = DeviceConfig::from_toml_file(device)?;
    let layout = config.allocate()?;

    match output {
        Some(out) => {
            layout.to_toml_file(out)?;
            log::info!("Saved layout to {}", out.display());
        }
        None => print_layout(config.name.as_deref(), &layout),
    }

    Ok(())
}

/// Print layout information
pub fn print_layout(name: Option<&str>, layout: &MemoryLayout) {
    println!("Layout Information");
    println!("==================");

    if let Some(name) = name {
        println!("Device:      {}", name);
    }
    println!(
        "Memory:      {:#010X} + {} ({})",
        layout.base_address,
        layout.available_bytes,
        format_size(layout.available_bytes)
    );
    println!("Word size:   {}", layout.word_size);
    println!("Unallocated: {} bytes", layout.unallocated_bytes());

    println!("\nSections ({}):", layout.len());
    println!("{:<20} {:>10} {:>10} {:>10}", "Name", "Start", "End", "Size");
    println!("{:-<53}", "");

    for (name, region) in layout.iter() {
        println!(
            "{:<20} {:#010X} {:#010X} {:>10}",
            name,
            region.start,
            region.end(),
            format_size(region.size)
        );
    }
}
