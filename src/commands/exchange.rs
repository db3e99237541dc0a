//! Exchange command implementation

use crate::cli::ExchangeArgs;
use rmicro_core::transport::{hex_dump, Session, Transport};

/// Parse a hex string like `"01 02 ff"` into bytes
pub fn parse_hex(s: &str) -> Result<Vec<u8>, String> {
    let digits: String = s.chars().filter(|c| !c.is_whitespace()).collect();
    let digits = digits.strip_prefix("0x").unwrap_or(&digits);

    if !digits.is_ascii() {
        return Err(format!("invalid hex '{}'", s));
    }
    if digits.len() % 2 != 0 {
        return Err(format!("odd number of hex digits in '{}'", s));
    }

    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .map_err(|e| format!("invalid hex '{}': {}", s, e))
        })
        .collect()
}

/// Open a transport, send bytes, and print what comes back
pub fn cmd_exchange(args: &ExchangeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let payload = args.send.as_deref().map(parse_hex).transpose()?;

    // Keeps an unpacked binary alive until the session ends
    let mut scratch = None;
    let transport = match (&args.source.transport, &args.source.binary) {
        (Some(spec), _) => rmicro_flash::create_transport(spec)?,
        (None, Some(archive)) => {
            let dir = tempfile::tempdir()?;
            let transport = flash_binary(archive, dir.path(), args.debug)?;
            scratch = Some(dir);
            transport
        }
        (None, None) => return Err("either --transport or --binary is required".into()),
    };

    let mut session = Session::open(transport)?;

    if let Some(data) = payload {
        let mut sent = 0;
        while sent < data.len() {
            let accepted = session.write(&data[sent..])?;
            if accepted == 0 {
                return Err(format!("transport accepted {} of {} bytes", sent, data.len()).into());
            }
            sent += accepted;
        }
        log::info!("Sent {} bytes", sent);
    }

    if args.read > 0 {
        let reply = session.read(args.read)?;
        println!("Received {} bytes", reply.len());
        for line in hex_dump(&reply) {
            println!("  {}", line);
        }
    }

    session.close()?;
    drop(scratch);
    Ok(())
}

#[cfg(feature = "subprocess")]
fn flash_binary(
    archive: &std::path::Path,
    dir: &std::path::Path,
    debug: bool,
) -> Result<Box<dyn Transport>, Box<dyn std::error::Error>> {
    use rmicro_core::artifact::MicroBinary;
    use rmicro_core::compiler::Flasher;

    let binary = MicroBinary::unarchive(archive, dir)?;
    let mut flasher = rmicro_flash::HostFlasher::new().debug(debug);
    Ok(flasher.flash(&binary)?)
}

#[cfg(not(feature = "subprocess"))]
fn flash_binary(
    _archive: &std::path::Path,
    _dir: &std::path::Path,
    _debug: bool,
) -> Result<Box<dyn Transport>, Box<dyn std::error::Error>> {
    Err("host binaries need the 'subprocess' feature".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex() {
        assert_eq!(parse_hex("0102ff").unwrap(), [0x01, 0x02, 0xff]);
        assert_eq!(parse_hex("0x01 02 FF").unwrap(), [0x01, 0x02, 0xff]);
        assert_eq!(parse_hex("").unwrap(), Vec::<u8>::new());
        assert!(parse_hex("123").is_err());
        assert!(parse_hex("zz").is_err());
    }
}
