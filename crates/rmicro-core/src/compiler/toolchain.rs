//! Cross-compiler prefix autodetection
//!
//! Maps the target CPU to the prefix of a GNU toolchain, so `gcc` becomes
//! `arm-none-eabi-gcc` for Cortex-M parts.

use super::target::Target;
use crate::error::{Error, Result};
use regex::Regex;

/// CPU pattern and the toolchain prefix it selects
///
/// Patterns are matched against the start of the CPU name.
pub const DEFAULT_TOOLCHAINS: &[(&str, &str)] =
    &[(r"cortex-[am].*", "arm-none-eabi-"), ("x86-64", "")];

/// Pick a toolchain prefix for `target` from [`DEFAULT_TOOLCHAINS`]
pub fn autodetect_toolchain_prefix(target: &Target) -> Result<String> {
    autodetect_toolchain_prefix_with(target, DEFAULT_TOOLCHAINS)
}

/// Pick a toolchain prefix for `target` from a custom table
///
/// Exactly one pattern must match the target's `-mcpu=` value.
pub fn autodetect_toolchain_prefix_with(target: &Target, table: &[(&str, &str)]) -> Result<String> {
    let cpu = target.cpu().ok_or_else(|| Error::ToolchainNotFound {
        cpu: format!("<no -mcpu in '{}'>", target),
    })?;

    let mut matches = Vec::new();
    for (pattern, prefix) in table {
        let re = Regex::new(&format!("^(?:{})", pattern))
            .map_err(|e| Error::InvalidParameter(format!("toolchain pattern '{}': {}", pattern, e)))?;
        if re.is_match(cpu) {
            matches.push(prefix.to_string());
        }
    }

    match matches.len() {
        0 => Err(Error::ToolchainNotFound {
            cpu: cpu.to_string(),
        }),
        1 => {
            let prefix = matches.remove(0);
            log::debug!("cpu '{}' uses toolchain prefix '{}'", cpu, prefix);
            Ok(prefix)
        }
        _ => Err(Error::AmbiguousToolchain {
            cpu: cpu.to_string(),
            prefixes: matches,
        }),
    }
}
