//! List commands implementation

/// List all transports compiled into this binary
pub fn list_transports() {
    println!("Available transports:");
    println!();

    for info in rmicro_flash::available_transports() {
        let aliases = if info.aliases.is_empty() {
            String::new()
        } else {
            format!(" (aliases: {})", info.aliases.join(", "))
        };
        println!("  {:<11} - {}{}", info.name, info.description, aliases);
    }
}

/// List serial ports, optionally filtered by a regex
#[cfg(feature = "serial")]
pub fn list_ports(grep: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let ports = rmicro_flash::list_serial_ports(grep)?;

    if ports.is_empty() {
        println!("No serial ports found");
        return Ok(());
    }

    println!("{:<20} {:<30} {}", "Device", "Description", "Hardware ID");
    println!("{:-<80}", "");
    for port in ports {
        println!(
            "{:<20} {:<30} {}",
            port.device,
            port.description.as_deref().unwrap_or("-"),
            port.hwid.as_deref().unwrap_or("-")
        );
    }

    Ok(())
}

/// List serial ports, optionally filtered by a regex
#[cfg(not(feature = "serial"))]
pub fn list_ports(_grep: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    Err("serial support not compiled in (enable the 'serial' feature)".into())
}
