//! Code generation targets
//!
//! A target string is a kind word followed by options, for example
//! `c -mcpu=cortex-m7 -march=armv7e-m`. Generated C sources record the
//! target they were produced for in a marker comment:
//!
//! ```c
//! // tvm target: c -mcpu=cortex-m7
//! ```

use crate::error::{Error, Result};
use regex::Regex;
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Marker comment naming the target a source file was generated for
pub const TARGET_MARKER: &str = r"^// tvm target: (.*)$";

/// A parsed target string
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    kind: String,
    options: Vec<String>,
}

impl Target {
    /// Target kind, e.g. `c` or `llvm`
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Options following the kind, in order
    pub fn options(&self) -> &[String] {
        &self.options
    }

    /// Value of the `-mcpu=` option, if any
    pub fn cpu(&self) -> Option<&str> {
        self.options
            .iter()
            .find_map(|opt| opt.strip_prefix("-mcpu="))
    }

    /// Options to hand to the compiler for this target
    ///
    /// These are the machine options, i.e. those starting with `-m`.
    pub fn default_compiler_flags(&self) -> Vec<String> {
        self.options
            .iter()
            .filter(|opt| opt.starts_with("-m"))
            .cloned()
            .collect()
    }
}

impl FromStr for Target {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut words = s.split_whitespace();
        let kind = words
            .next()
            .ok_or_else(|| Error::InvalidParameter(format!("empty target string '{}'", s)))?;
        Ok(Self {
            kind: kind.to_string(),
            options: words.map(str::to_string).collect(),
        })
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        for opt in &self.options {
            write!(f, " {}", opt)?;
        }
        Ok(())
    }
}

/// Find the single target the given sources were generated for
///
/// Every marker line across all sources must name the same target string.
/// No marker at all is [`Error::TargetNotDetected`]; more than one distinct
/// string is [`Error::AmbiguousTarget`].
pub fn detect_target<P: AsRef<Path>>(sources: &[P]) -> Result<Target> {
    let marker = Regex::new(TARGET_MARKER).map_err(|e| Error::InvalidParameter(e.to_string()))?;
    let mut found = BTreeSet::new();

    for source in sources {
        let source = source.as_ref();
        let content = fs::read_to_string(source).map_err(|e| Error::path_io(source, e))?;
        for line in content.lines() {
            if let Some(caps) = marker.captures(line) {
                found.insert(caps[1].to_string());
            }
        }
    }

    let mut found = found.into_iter();
    match (found.next(), found.next()) {
        (Some(target), None) => {
            log::debug!("detected target '{}'", target);
            target.parse()
        }
        (None, _) => Err(Error::TargetNotDetected {
            sources: sources
                .iter()
                .map(|s| s.as_ref().display().to_string())
                .collect(),
        }),
        (Some(first), Some(second)) => {
            let mut targets = vec![first, second];
            targets.extend(found);
            Err(Error::AmbiguousTarget { targets })
        }
    }
}

/// Pick the target to build `sources` for
///
/// A configured target is used when the sources carry no marker. When both
/// exist they must agree.
pub fn resolve_target<P: AsRef<Path>>(configured: Option<&Target>, sources: &[P]) -> Result<Target> {
    match (detect_target(sources), configured) {
        (Ok(detected), Some(configured)) if detected != *configured => {
            Err(Error::IncompatibleTarget {
                detected: detected.to_string(),
                configured: configured.to_string(),
            })
        }
        (Ok(detected), _) => Ok(detected),
        (Err(Error::TargetNotDetected { .. }), Some(configured)) => Ok(configured.clone()),
        (Err(e), _) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn write_source(dir: &Path, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_parse_target() {
        let target: Target = "c -mcpu=cortex-m7 -march=armv7e-m -O2".parse().unwrap();
        assert_eq!(target.kind(), "c");
        assert_eq!(target.cpu(), Some("cortex-m7"));
        assert_eq!(
            target.default_compiler_flags(),
            ["-mcpu=cortex-m7", "-march=armv7e-m"]
        );
        assert_eq!(target.to_string(), "c -mcpu=cortex-m7 -march=armv7e-m -O2");
        assert!("   ".parse::<Target>().is_err());
    }

    #[test]
    fn test_detect_single_target() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_source(
            dir.path(),
            "a.c",
            "// tvm target: c -mcpu=cortex-m7\nint a;\n",
        );
        let b = write_source(
            dir.path(),
            "b.c",
            "#include <stdint.h>\n// tvm target: c -mcpu=cortex-m7\n",
        );
        let target = detect_target(&[a, b]).unwrap();
        assert_eq!(target.cpu(), Some("cortex-m7"));
    }

    #[test]
    fn test_detect_failures() {
        let dir = tempfile::tempdir().unwrap();
        let plain = write_source(dir.path(), "plain.c", "int x;\n");
        let m7 = write_source(dir.path(), "m7.c", "// tvm target: c -mcpu=cortex-m7\n");
        let host = write_source(dir.path(), "host.c", "// tvm target: c -mcpu=x86-64\n");

        let err = detect_target(&[&plain]).unwrap_err();
        assert!(matches!(err, Error::TargetNotDetected { ref sources } if sources.len() == 1));
        assert_eq!(err.kind(), ErrorKind::Resolution);

        let err = detect_target(&[&m7, &host]).unwrap_err();
        assert!(matches!(err, Error::AmbiguousTarget { ref targets } if targets.len() == 2));
    }

    #[test]
    fn test_resolve_target() {
        let dir = tempfile::tempdir().unwrap();
        let plain = write_source(dir.path(), "plain.c", "int x;\n");
        let m7 = write_source(dir.path(), "m7.c", "// tvm target: c -mcpu=cortex-m7\n");
        let configured: Target = "c -mcpu=x86-64".parse().unwrap();

        assert_eq!(resolve_target(Some(&configured), &[&plain]).unwrap(), configured);
        assert_eq!(
            resolve_target(None, &[&m7]).unwrap().cpu(),
            Some("cortex-m7")
        );
        assert!(matches!(
            resolve_target(Some(&configured), &[&m7]),
            Err(Error::IncompatibleTarget { .. })
        ));
        assert!(matches!(
            resolve_target(None, &[&plain]),
            Err(Error::TargetNotDetected { .. })
        ));
    }
}
