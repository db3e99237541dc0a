//! Typed artifacts produced by a compiler

use super::{Artifact, LabelledFiles, Metadata};
use crate::error::{Error, Result};
use std::ops::Deref;
use std::path::{Path, PathBuf};

/// Compiled library: objects or archives ready to link into a binary
#[derive(Debug, Clone, PartialEq)]
pub struct MicroLibrary(Artifact);

impl MicroLibrary {
    /// Type recorded in archives
    pub const ARTIFACT_TYPE: &'static str = "micro_library";

    /// Label holding the library's files
    pub const LIBRARY_FILES: &'static str = "library_files";

    /// Create a library from files under `base_dir`
    pub fn new(
        base_dir: impl AsRef<Path>,
        library_files: Vec<PathBuf>,
        metadata: Metadata,
    ) -> Result<Self> {
        let mut labelled = LabelledFiles::new();
        labelled.insert(Self::LIBRARY_FILES.to_string(), library_files);
        Artifact::with_type(base_dir, labelled, metadata, Self::ARTIFACT_TYPE).map(Self)
    }

    /// View a generic artifact as a library
    pub fn from_artifact(artifact: Artifact) -> Result<Self> {
        let artifact = artifact.into_typed(Self::ARTIFACT_TYPE)?;
        artifact.label(Self::LIBRARY_FILES)?;
        Ok(Self(artifact))
    }

    /// Files making up the library, relative to the base directory
    pub fn library_files(&self) -> &[PathBuf] {
        self.0
            .labelled_files
            .get(Self::LIBRARY_FILES)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Reconstruct a library from an archive
    pub fn unarchive(path: impl AsRef<Path>, dest_dir: impl AsRef<Path>) -> Result<Self> {
        Self::from_artifact(Artifact::unarchive(path, dest_dir)?)
    }

    /// Unwrap into the generic artifact
    pub fn into_artifact(self) -> Artifact {
        self.0
    }
}

impl Deref for MicroLibrary {
    type Target = Artifact;

    fn deref(&self) -> &Artifact {
        &self.0
    }
}

/// Linked binary, plus the files a debugger needs to symbolize it
#[derive(Debug, Clone, PartialEq)]
pub struct MicroBinary(Artifact);

impl MicroBinary {
    /// Type recorded in archives
    pub const ARTIFACT_TYPE: &'static str = "micro_binary";

    /// Label holding the single executable image
    pub const BINARY_FILE: &'static str = "binary_file";

    /// Label holding debug files such as an unstripped ELF
    pub const DEBUG_FILES: &'static str = "debug_files";

    /// Create a binary artifact
    pub fn new(
        base_dir: impl AsRef<Path>,
        binary_file: impl Into<PathBuf>,
        debug_files: Vec<PathBuf>,
        metadata: Metadata,
    ) -> Result<Self> {
        let mut labelled = LabelledFiles::new();
        labelled.insert(Self::BINARY_FILE.to_string(), vec![binary_file.into()]);
        if !debug_files.is_empty() {
            labelled.insert(Self::DEBUG_FILES.to_string(), debug_files);
        }
        Artifact::with_type(base_dir, labelled, metadata, Self::ARTIFACT_TYPE).map(Self)
    }

    /// View a generic artifact as a binary
    ///
    /// The artifact must carry exactly one path under `binary_file`.
    pub fn from_artifact(artifact: Artifact) -> Result<Self> {
        let artifact = artifact.into_typed(Self::ARTIFACT_TYPE)?;
        let binary = artifact.label(Self::BINARY_FILE)?;
        if binary.len() != 1 {
            return Err(Error::MalformedMetadata {
                path: artifact.base_dir.clone(),
                reason: format!(
                    "'{}' must name exactly one file, found {}",
                    Self::BINARY_FILE,
                    binary.len()
                ),
            });
        }
        Ok(Self(artifact))
    }

    /// Executable image, relative to the base directory
    pub fn binary_file(&self) -> &Path {
        self.0
            .labelled_files
            .get(Self::BINARY_FILE)
            .and_then(|paths| paths.first())
            .map(PathBuf::as_path)
            .unwrap_or_else(|| Path::new(""))
    }

    /// Absolute path of the executable image
    pub fn binary_path(&self) -> PathBuf {
        self.0.abspath(self.binary_file())
    }

    /// Debug files, empty if none were recorded
    pub fn debug_files(&self) -> &[PathBuf] {
        self.0
            .labelled_files
            .get(Self::DEBUG_FILES)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Reconstruct a binary from an archive
    pub fn unarchive(path: impl AsRef<Path>, dest_dir: impl AsRef<Path>) -> Result<Self> {
        Self::from_artifact(Artifact::unarchive(path, dest_dir)?)
    }

    /// Unwrap into the generic artifact
    pub fn into_artifact(self) -> Artifact {
        self.0
    }
}

impl Deref for MicroBinary {
    type Target = Artifact;

    fn deref(&self) -> &Artifact {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_binary_round_trip() {
        let scratch = tempfile::tempdir().unwrap();
        let base = scratch.path().join("build");
        fs::create_dir(&base).unwrap();
        fs::write(base.join("firmware.bin"), [0x7f, b'E', b'L', b'F']).unwrap();
        fs::write(base.join("firmware.elf"), b"debug").unwrap();

        let binary = MicroBinary::new(
            &base,
            "firmware.bin",
            vec!["firmware.elf".into()],
            Metadata::new(),
        )
        .unwrap();
        assert_eq!(binary.binary_path(), base.join("firmware.bin"));

        let tar_path = binary.archive(scratch.path()).unwrap();
        let restored = MicroBinary::unarchive(&tar_path, scratch.path().join("copy")).unwrap();

        assert_eq!(restored.artifact_type(), MicroBinary::ARTIFACT_TYPE);
        assert_eq!(restored.binary_file(), Path::new("firmware.bin"));
        assert_eq!(restored.debug_files(), [PathBuf::from("firmware.elf")]);
        assert_eq!(
            fs::read(restored.binary_path()).unwrap(),
            [0x7f, b'E', b'L', b'F']
        );
    }

    #[test]
    fn test_library_type_is_checked() {
        let scratch = tempfile::tempdir().unwrap();
        let base = scratch.path().join("lib");
        fs::create_dir(&base).unwrap();
        fs::write(base.join("libfoo.a"), b"").unwrap();

        let library = MicroLibrary::new(&base, vec!["libfoo.a".into()], Metadata::new()).unwrap();
        assert_eq!(library.library_files(), [PathBuf::from("libfoo.a")]);

        let tar_path = library.archive(scratch.path()).unwrap();
        let err = MicroBinary::unarchive(&tar_path, scratch.path().join("copy")).unwrap_err();
        assert!(matches!(
            err,
            Error::ArtifactTypeMismatch { ref expected, ref found }
                if expected == "micro_binary" && found == "micro_library"
        ));
    }

    #[test]
    fn test_generic_artifact_promoted() {
        let mut files = LabelledFiles::new();
        files.insert(MicroBinary::BINARY_FILE.into(), vec!["a.bin".into(), "b.bin".into()]);
        let two = Artifact::new("/tmp/x", files, Metadata::new()).unwrap();
        assert!(matches!(
            MicroBinary::from_artifact(two),
            Err(Error::MalformedMetadata { .. })
        ));

        let mut files = LabelledFiles::new();
        files.insert(MicroLibrary::LIBRARY_FILES.into(), vec!["libfoo.a".into()]);
        let generic = Artifact::new("/tmp/x", files, Metadata::new()).unwrap();
        let library = MicroLibrary::from_artifact(generic).unwrap();
        assert_eq!(library.artifact_type(), MicroLibrary::ARTIFACT_TYPE);
    }
}
