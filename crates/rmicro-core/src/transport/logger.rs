//! Logging decorator for transports

use super::Transport;
use crate::error::Result;

/// Bytes per hex dump line
const BYTES_PER_LINE: usize = 16;

/// Width of the hex column: 16 pairs plus 15 separating spaces
const HEX_COLUMN_WIDTH: usize = BYTES_PER_LINE * 3 - 1;

/// Length of the `oooo  ` offset prefix
const OFFSET_PREFIX_LEN: usize = 6;

/// Format `data` as a hex dump
///
/// Each line holds 16 bytes: a 4-digit hex offset, the bytes as hex pairs
/// and an ASCII gutter where anything other than a visible ASCII
/// character (space included) shows as `.`. A dump that fits on one line
/// has no offset prefix. Empty data gives a single empty line.
pub fn hex_dump(data: &[u8]) -> Vec<String> {
    if data.is_empty() {
        return vec![String::new()];
    }

    let mut lines: Vec<String> = data
        .chunks(BYTES_PER_LINE)
        .enumerate()
        .map(|(i, chunk)| {
            let hex = chunk
                .iter()
                .map(|b| format!("{:02x}", b))
                .collect::<Vec<_>>()
                .join(" ");
            let ascii: String = chunk
                .iter()
                .map(|&b| if b.is_ascii_graphic() { b as char } else { '.' })
                .collect();
            format!(
                "{:04x}  {:<width$}  {}",
                i * BYTES_PER_LINE,
                hex,
                ascii,
                width = HEX_COLUMN_WIDTH
            )
        })
        .collect();

    if lines.len() == 1 {
        lines[0] = lines[0].split_off(OFFSET_PREFIX_LEN);
    }

    lines
}

/// Transport decorator that logs every call with a hex dump of the data
///
/// Data and errors pass through untouched.
pub struct TransportLogger<T: Transport> {
    name: String,
    child: T,
    level: log::Level,
    target: String,
}

impl<T: Transport> TransportLogger<T> {
    /// Wrap `child`, logging at info level under this module's target
    pub fn new(name: impl Into<String>, child: T) -> Self {
        Self {
            name: name.into(),
            child,
            level: log::Level::Info,
            target: module_path!().to_string(),
        }
    }

    /// Set the level log records are emitted at
    pub fn with_level(mut self, level: log::Level) -> Self {
        self.level = level;
        self
    }

    /// Set the log target records are emitted under
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    /// Get the wrapped transport
    pub fn get_ref(&self) -> &T {
        &self.child
    }

    /// Unwrap, returning the wrapped transport
    pub fn into_inner(self) -> T {
        self.child
    }

    fn log_dump(&self, header: &str, data: &[u8]) {
        let lines = hex_dump(data);
        if lines.len() > 1 {
            log::log!(target: self.target.as_str(), self.level, "{}:\n{}", header, lines.join("\n"));
        } else {
            log::log!(target: self.target.as_str(), self.level, "{}: {}", header, lines[0]);
        }
    }
}

impl<T: Transport> Transport for TransportLogger<T> {
    fn open(&mut self) -> Result<()> {
        log::log!(target: self.target.as_str(), self.level, "{}: opening transport", self.name);
        self.child.open()
    }

    fn close(&mut self) -> Result<()> {
        log::log!(target: self.target.as_str(), self.level, "{}: closing transport", self.name);
        self.child.close()
    }

    fn read(&mut self, n: usize) -> Result<Vec<u8>> {
        let data = self.child.read(n).inspect_err(|e| {
            log::log!(target: self.target.as_str(), self.level, "{} read {:4} B -> error: {}", self.name, n, e);
        })?;
        let header = format!("{} read {:4} B -> [{} B]", self.name, n, data.len());
        self.log_dump(&header, &data);
        Ok(data)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let written = self.child.write(data).inspect_err(|e| {
            log::log!(
                target: self.target.as_str(),
                self.level,
                "{} write      <- [{} B] error: {}",
                self.name,
                data.len(),
                e
            );
        })?;
        let header = format!("{} write      <- [{} B]", self.name, written);
        self.log_dump(&header, &data[..written.min(data.len())]);
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::{Mutex, Once};

    /// Transport returning canned data and failing on demand
    struct Canned {
        reply: Vec<u8>,
        accept: usize,
        fail: bool,
        closes: usize,
    }

    impl Transport for Canned {
        fn open(&mut self) -> Result<()> {
            Ok(())
        }

        fn close(&mut self) -> Result<()> {
            self.closes += 1;
            Ok(())
        }

        fn read(&mut self, n: usize) -> Result<Vec<u8>> {
            if self.fail {
                return Err(Error::NotOpen("canned".into()));
            }
            Ok(self.reply.iter().copied().take(n).collect())
        }

        fn write(&mut self, data: &[u8]) -> Result<usize> {
            if self.fail {
                return Err(Error::NotOpen("canned".into()));
            }
            Ok(data.len().min(self.accept))
        }
    }

    #[test]
    fn test_hex_dump_empty() {
        assert_eq!(hex_dump(&[]), vec![String::new()]);
    }

    #[test]
    fn test_hex_dump_single_line_drops_offset() {
        let lines = hex_dump(b"AB \x01");
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("41 42 20 01"));
        assert!(lines[0].ends_with("  AB.."));
        assert_eq!(lines[0].len(), HEX_COLUMN_WIDTH + 2 + 4);
    }

    #[test]
    fn test_hex_dump_multi_line() {
        let data: Vec<u8> = (0u8..20).map(|i| b'a' + i).collect();
        let lines = hex_dump(&data);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("0000  61 62 63"));
        assert!(lines[0].ends_with("abcdefghijklmnop"));
        assert!(lines[1].starts_with("0010  71 72 73 74 "));
        assert!(lines[1].ends_with("  qrst"));
    }

    #[test]
    fn test_logger_is_transparent() {
        let mut logged = TransportLogger::new(
            "canned",
            Canned {
                reply: b"0123456789abcdefXYZ".to_vec(),
                accept: 3,
                fail: false,
                closes: 0,
            },
        )
        .with_level(log::Level::Debug);

        assert_eq!(logged.read(18).unwrap(), b"0123456789abcdefXY");
        assert_eq!(logged.write(b"hello").unwrap(), 3);
        logged.close().unwrap();
        assert_eq!(logged.get_ref().closes, 1);
    }

    /// Records messages logged under targets starting with `capture::`
    struct Capture;

    static CAPTURED: Mutex<Vec<(String, String)>> = Mutex::new(Vec::new());

    impl log::Log for Capture {
        fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
            metadata.target().starts_with("capture::")
        }

        fn log(&self, record: &log::Record<'_>) {
            if self.enabled(record.metadata()) {
                CAPTURED
                    .lock()
                    .unwrap()
                    .push((record.target().to_string(), record.args().to_string()));
            }
        }

        fn flush(&self) {}
    }

    fn captured(target: &str) -> Vec<String> {
        static INSTALL: Once = Once::new();
        INSTALL.call_once(|| {
            let _ = log::set_logger(&Capture);
            log::set_max_level(log::LevelFilter::Trace);
        });
        CAPTURED
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _)| t == target)
            .map(|(_, msg)| msg.clone())
            .collect()
    }

    #[test]
    fn test_logger_passes_errors_through() {
        let target = "capture::errors";
        captured(target);
        let mut logged = TransportLogger::new(
            "canned",
            Canned {
                reply: Vec::new(),
                accept: 0,
                fail: true,
                closes: 0,
            },
        )
        .with_target(target);
        assert!(matches!(logged.read(1), Err(Error::NotOpen(_))));
        assert!(matches!(logged.write(b"xy"), Err(Error::NotOpen(_))));

        let messages = captured(target);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0], "canned read    1 B -> error: canned is not open");
        assert_eq!(
            messages[1],
            "canned write      <- [2 B] error: canned is not open"
        );
    }
}
