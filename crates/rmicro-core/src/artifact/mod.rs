//! Build artifacts
//!
//! An artifact is a set of files under a base directory, grouped under
//! labels, plus a free-form JSON metadata map. It can be archived into a
//! single tar file and reconstructed elsewhere without losing labels,
//! metadata or symlinks.
//!
//! ```ignore
//! let mut files = LabelledFiles::new();
//! files.insert("library_files".into(), vec!["libfoo.a".into()]);
//! let artifact = Artifact::new(build_dir.path(), files, Metadata::new())?;
//!
//! let tar_path = artifact.archive(out_dir.path())?;
//! let restored = Artifact::unarchive(&tar_path, &scratch.path().join("foo"))?;
//! assert_eq!(restored.labelled_files(), artifact.labelled_files());
//! ```
//!
//! The artifact never deletes its base directory; whoever created the
//! directory owns it.

mod archive;
mod micro;

pub use micro::{MicroBinary, MicroLibrary};

use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

/// Archive encoding version written and accepted by this implementation
pub const ENCODING_VERSION: u32 = 1;

/// Label name to paths relative to the base directory
pub type LabelledFiles = BTreeMap<String, Vec<PathBuf>>;

/// Free-form metadata carried through archive/unarchive verbatim
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Name of the version marker entry inside an archive
pub(crate) const VERSION_ENTRY: &str = "version";

/// Name of the metadata record entry inside an archive
pub(crate) const METADATA_ENTRY: &str = "metadata.json";

/// A labelled set of files with metadata
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    base_dir: PathBuf,
    labelled_files: LabelledFiles,
    metadata: Metadata,
    artifact_type: String,
}

impl Artifact {
    /// Type recorded for plain artifacts
    pub const ARTIFACT_TYPE: &'static str = "artifact";

    /// Create an artifact rooted at `base_dir`
    ///
    /// Labelled paths must be relative and stay inside `base_dir`. Their
    /// existence is checked when archiving, not here.
    pub fn new(
        base_dir: impl AsRef<Path>,
        labelled_files: LabelledFiles,
        metadata: Metadata,
    ) -> Result<Self> {
        Self::with_type(base_dir, labelled_files, metadata, Self::ARTIFACT_TYPE)
    }

    pub(crate) fn with_type(
        base_dir: impl AsRef<Path>,
        labelled_files: LabelledFiles,
        metadata: Metadata,
        artifact_type: &str,
    ) -> Result<Self> {
        let base_dir = base_dir.as_ref();
        let base_dir = std::path::absolute(base_dir).map_err(|e| Error::path_io(base_dir, e))?;

        for paths in labelled_files.values() {
            for path in paths {
                validate_relative_path(path)?;
            }
        }

        Ok(Self {
            base_dir,
            labelled_files,
            metadata,
            artifact_type: artifact_type.to_string(),
        })
    }

    /// Directory every labelled path is relative to
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// All labels and their paths
    pub fn labelled_files(&self) -> &LabelledFiles {
        &self.labelled_files
    }

    /// Metadata map
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Kind of artifact recorded in archives
    pub fn artifact_type(&self) -> &str {
        &self.artifact_type
    }

    /// Paths under a label, in order
    pub fn label(&self, name: &str) -> Result<&[PathBuf]> {
        self.labelled_files
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| Error::LabelNotFound {
                label: name.to_string(),
            })
    }

    /// Join a relative path onto the base directory
    ///
    /// Does not check that the result exists.
    pub fn abspath(&self, relative_path: impl AsRef<Path>) -> PathBuf {
        self.base_dir.join(relative_path)
    }

    /// Name of the top-level directory entries are stored under in an archive
    pub fn root_name(&self) -> Result<String> {
        self.base_dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| {
                Error::InvalidParameter(format!(
                    "artifact base directory {} has no name",
                    self.base_dir.display()
                ))
            })
    }

    pub(crate) fn into_typed(mut self, artifact_type: &str) -> Result<Self> {
        if self.artifact_type != artifact_type && self.artifact_type != Self::ARTIFACT_TYPE {
            return Err(Error::ArtifactTypeMismatch {
                expected: artifact_type.to_string(),
                found: self.artifact_type,
            });
        }
        self.artifact_type = artifact_type.to_string();
        Ok(self)
    }
}

/// Check that `path` is a non-empty relative path that cannot escape its root
pub(crate) fn validate_relative_path(path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(Error::UnsafePath(path.to_path_buf()));
    }

    for component in path.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(Error::UnsafePath(path.to_path_buf()));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files(entries: &[(&str, &[&str])]) -> LabelledFiles {
        entries
            .iter()
            .map(|(label, paths)| {
                (
                    label.to_string(),
                    paths.iter().map(PathBuf::from).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn test_label_lookup() {
        let artifact = Artifact::new(
            "/tmp/build",
            files(&[("objects", &["a.o", "b.o"])]),
            Metadata::new(),
        )
        .unwrap();

        assert_eq!(
            artifact.label("objects").unwrap(),
            [PathBuf::from("a.o"), PathBuf::from("b.o")]
        );
        assert!(matches!(
            artifact.label("missing"),
            Err(Error::LabelNotFound { ref label }) if label == "missing"
        ));
        assert_eq!(artifact.abspath("a.o"), PathBuf::from("/tmp/build/a.o"));
        assert_eq!(artifact.root_name().unwrap(), "build");
    }

    #[test]
    fn test_rejects_escaping_paths() {
        for bad in ["../secret", "/etc/passwd", "", "a/../../b"] {
            let result = Artifact::new("/tmp/build", files(&[("x", &[bad])]), Metadata::new());
            assert!(
                matches!(result, Err(Error::UnsafePath(_))),
                "{:?} should be rejected",
                bad
            );
        }
    }
}
