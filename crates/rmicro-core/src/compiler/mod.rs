//! Compiler and flasher interfaces
//!
//! A [`Compiler`] turns generated sources into a [`MicroLibrary`] and
//! links libraries into a [`MicroBinary`]. A [`Flasher`] puts a binary on
//! its execution target and hands back a [`Transport`] to talk to it.
//! Concrete backends live outside this crate.

mod target;
mod toolchain;

pub use target::{detect_target, resolve_target, Target, TARGET_MARKER};
pub use toolchain::{
    autodetect_toolchain_prefix, autodetect_toolchain_prefix_with, DEFAULT_TOOLCHAINS,
};

use crate::artifact::{MicroBinary, MicroLibrary};
use crate::error::Result;
use crate::transport::Transport;
use std::path::{Path, PathBuf};

/// Options shared by library and binary builds
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildOptions {
    /// Target to build for; detected from the sources when `None`
    pub target: Option<Target>,
    /// Extra flags for the C compiler
    pub cflags: Vec<String>,
    /// Extra flags for the C++ compiler
    pub ccflags: Vec<String>,
    /// Extra flags for the linker
    pub ldflags: Vec<String>,
    /// Include search directories
    pub include_dirs: Vec<PathBuf>,
}

impl BuildOptions {
    /// Options for an explicit target
    pub fn for_target(target: Target) -> Self {
        Self {
            target: Some(target),
            ..Self::default()
        }
    }

    /// C compiler flags: the target's machine flags, then `-I` dirs, then `cflags`
    pub fn effective_cflags(&self, target: &Target) -> Vec<String> {
        let mut flags = target.default_compiler_flags();
        flags.extend(
            self.include_dirs
                .iter()
                .map(|dir| format!("-I{}", dir.display())),
        );
        flags.extend(self.cflags.iter().cloned());
        flags
    }
}

/// Builds libraries and binaries for a target
pub trait Compiler {
    /// Compile `sources` into a library rooted at `output_dir`
    ///
    /// `output_dir` is empty on entry and becomes the artifact's base
    /// directory.
    fn library(
        &mut self,
        output_dir: &Path,
        sources: &[PathBuf],
        options: &BuildOptions,
    ) -> Result<MicroLibrary>;

    /// Statically link `libraries` into a binary rooted at `output_dir`
    fn binary(
        &mut self,
        output_dir: &Path,
        libraries: &[MicroLibrary],
        options: &BuildOptions,
    ) -> Result<MicroBinary>;
}

/// Deploys a binary to its execution target
pub trait Flasher {
    /// Deploy `binary` and return an unopened transport connected to it
    fn flash(&mut self, binary: &MicroBinary) -> Result<Box<dyn Transport>>;
}
