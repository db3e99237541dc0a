//! TOML device configuration
//!
//! Describes a target's memory and the sections to carve out of it:
//!
//! ```toml
//! [device]
//! name = "stm32f746xx"
//! base_address = 0x20000000
//! available_bytes = "320 KiB"
//! word_size = 4
//!
//! [[section]]
//! name = "text"
//! bytes = 7500
//!
//! [[section]]
//! name = "heap"
//! weight = 50.0
//! ```
//!
//! Sections are allocated in the order they appear in the file.

use std::fs;
use std::path::Path;

use super::allocate::allocate_with_policy;
use super::types::{AllocationPolicy, MemoryLayout, SectionConstraint};
use crate::error::{Error, Result};

/// TOML device file structure
#[derive(Debug, serde::Deserialize)]
struct TomlDeviceFile {
    device: TomlDevice,
    #[serde(default)]
    section: Vec<TomlSection>,
}

#[derive(Debug, serde::Deserialize)]
struct TomlDevice {
    name: Option<String>,
    #[serde(deserialize_with = "deserialize_size")]
    base_address: u64,
    #[serde(deserialize_with = "deserialize_size")]
    available_bytes: u64,
    #[serde(default = "default_word_size")]
    word_size: u64,
    #[serde(default)]
    reject_empty: bool,
}

#[derive(Debug, serde::Deserialize)]
struct TomlSection {
    name: String,
    #[serde(default, deserialize_with = "deserialize_opt_size")]
    bytes: Option<u64>,
    weight: Option<f64>,
}

fn default_word_size() -> u64 {
    4
}

/// Number that can be an integer, or a string holding hex or a size
#[derive(serde::Deserialize)]
#[serde(untagged)]
enum SizeOrInt {
    Int(u64),
    Str(String),
}

fn deserialize_size<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::Deserialize;

    match SizeOrInt::deserialize(deserializer)? {
        SizeOrInt::Int(n) => Ok(n),
        SizeOrInt::Str(s) => parse_size(&s).map_err(serde::de::Error::custom),
    }
}

fn deserialize_opt_size<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    deserialize_size(deserializer).map(Some)
}

/// Parse a size like `"4096"`, `"0x1000"` or `"320 KiB"`
pub fn parse_size(s: &str) -> std::result::Result<u64, String> {
    let s = s.trim();

    if let Ok(n) = s.parse::<u64>() {
        return Ok(n);
    }

    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        return u64::from_str_radix(&hex.replace('_', ""), 16)
            .map_err(|e| format!("invalid hex '{}': {}", s, e));
    }

    let lower = s.to_lowercase();
    let (num_str, multiplier) = if let Some(n) = lower.strip_suffix("mib") {
        (n.trim(), 1024 * 1024)
    } else if let Some(n) = lower.strip_suffix("kib") {
        (n.trim(), 1024)
    } else if let Some(n) = lower.strip_suffix('k') {
        (n.trim(), 1024)
    } else if let Some(n) = lower.strip_suffix('b') {
        (n.trim(), 1)
    } else {
        return Err(format!("invalid size: {}", s));
    };

    let num: u64 = num_str.parse().map_err(|_| format!("invalid size: {}", s))?;
    num.checked_mul(multiplier)
        .ok_or_else(|| format!("size overflows: {}", s))
}

/// Memory of a device and the sections to allocate in it
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceConfig {
    /// Optional device name
    pub name: Option<String>,
    /// First usable address
    pub base_address: u64,
    /// Number of usable bytes
    pub available_bytes: u64,
    /// Word size
    pub word_size: u64,
    /// Zero-byte section policy
    pub policy: AllocationPolicy,
    /// Sections in allocation order
    pub sections: Vec<SectionConstraint>,
}

impl DeviceConfig {
    /// Load a device configuration from a TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| Error::path_io(path, e))?;
        Self::from_toml_str(&content).map_err(|e| match e {
            Error::MalformedMetadata { reason, .. } => Error::MalformedMetadata {
                path: path.to_path_buf(),
                reason,
            },
            other => other,
        })
    }

    /// Parse a device configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let malformed = |reason: String| Error::MalformedMetadata {
            path: "<device config>".into(),
            reason,
        };

        let file: TomlDeviceFile = toml::from_str(content).map_err(|e| malformed(e.to_string()))?;

        let mut sections = Vec::with_capacity(file.section.len());
        for section in file.section {
            let constraint = match (section.bytes, section.weight) {
                (Some(bytes), None) => SectionConstraint::bytes(section.name, bytes),
                (None, Some(weight)) => SectionConstraint::weight(section.name, weight),
                _ => {
                    return Err(malformed(format!(
                        "section '{}' needs exactly one of 'bytes' or 'weight'",
                        section.name
                    )))
                }
            };
            sections.push(constraint);
        }

        Ok(Self {
            name: file.device.name,
            base_address: file.device.base_address,
            available_bytes: file.device.available_bytes,
            word_size: file.device.word_size,
            policy: if file.device.reject_empty {
                AllocationPolicy::RejectEmpty
            } else {
                AllocationPolicy::AllowEmpty
            },
            sections,
        })
    }

    /// Allocate this device's sections
    pub fn allocate(&self) -> Result<MemoryLayout> {
        allocate_with_policy(
            self.base_address,
            self.available_bytes,
            self.word_size,
            &self.sections,
            self.policy,
        )
    }
}

impl MemoryLayout {
    /// Save the layout to a TOML file
    pub fn to_toml_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        fs::write(path, self.to_toml_string()).map_err(|e| Error::path_io(path, e))
    }

    /// Convert the layout to a TOML string
    pub fn to_toml_string(&self) -> String {
        let mut output = String::new();

        output.push_str("[layout]\n");
        output.push_str(&format!("base_address = 0x{:08X}\n", self.base_address));
        output.push_str(&format!("available_bytes = {}\n", self.available_bytes));
        output.push_str(&format!("word_size = {}\n", self.word_size));
        output.push('\n');

        for (name, region) in self.iter() {
            output.push_str("[[region]]\n");
            output.push_str(&format!("name = {}\n", toml::Value::String(name.to_string())));
            output.push_str(&format!("start = 0x{:08X}\n", region.start));
            output.push_str(&format!("size = {}\n", region.size));
            output.push('\n');
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::Region;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("4096").unwrap(), 4096);
        assert_eq!(parse_size("0x1000").unwrap(), 4096);
        assert_eq!(parse_size("0x2000_0000").unwrap(), 0x2000_0000);
        assert_eq!(parse_size("4 KiB").unwrap(), 4096);
        assert_eq!(parse_size("320K").unwrap(), 320 * 1024);
        assert_eq!(parse_size("1MiB").unwrap(), 1024 * 1024);
        assert!(parse_size("lots").is_err());
    }

    #[test]
    fn test_parse_device() {
        let toml = r#"
[device]
name = "test-board"
base_address = 0x1000
available_bytes = 100

[[section]]
name = "fixed"
bytes = 40

[[section]]
name = "heap"
weight = 1.0

[[section]]
name = "stack"
weight = 1.0
"#;
        let config = DeviceConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.name.as_deref(), Some("test-board"));
        assert_eq!(config.word_size, 4);
        assert_eq!(config.sections.len(), 3);

        let layout = config.allocate().unwrap();
        assert_eq!(layout.get("heap"), Some(&Region { start: 0x1028, size: 28 }));

        let out = layout.to_toml_string();
        assert!(out.contains("name = \"stack\"\nstart = 0x00001044\nsize = 28\n"));
    }

    #[test]
    fn test_layout_toml_escapes_names() {
        let layout = MemoryLayout {
            base_address: 0,
            available_bytes: 16,
            word_size: 4,
            sections: vec![(r#"odd "quoted" \ name"#.to_string(), Region { start: 0, size: 8 })],
        };

        let parsed: toml::Table = toml::from_str(&layout.to_toml_string()).unwrap();
        let regions = parsed["region"].as_array().unwrap();
        assert_eq!(
            regions[0]["name"].as_str(),
            Some(r#"odd "quoted" \ name"#)
        );
        assert_eq!(regions[0]["size"].as_integer(), Some(8));
    }

    #[test]
    fn test_section_needs_one_kind() {
        let toml = r#"
[device]
base_address = 0
available_bytes = "1 KiB"

[[section]]
name = "odd"
bytes = 8
weight = 2.0
"#;
        let err = DeviceConfig::from_toml_str(toml).unwrap_err();
        assert!(err.to_string().contains("'odd'"));
    }
}
