//! Tar encoding of artifacts
//!
//! Archive layout, with `<root>` the base directory's name:
//!
//! ```text
//! <root>/version          "1\n"
//! <root>/metadata.json    {"version", "artifact_type", "labelled_files", "metadata"}
//! <root>/<labelled path>  one entry per file, directory or symlink
//! ```
//!
//! Labelled directories are stored recursively. Symlinks are stored as
//! symlinks with their target text untouched, so relative links stay
//! relative and absolute links keep pointing at the same place.

use super::{
    validate_relative_path, Artifact, LabelledFiles, Metadata, ENCODING_VERSION, METADATA_ENTRY,
    VERSION_ENTRY,
};
use crate::error::{Error, Result};
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Component, Path, PathBuf};

/// Metadata record stored in `metadata.json`
#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct MetadataRecord {
    version: u32,
    artifact_type: String,
    labelled_files: LabelledFiles,
    metadata: Metadata,
}

fn append_bytes<W: std::io::Write>(
    builder: &mut tar::Builder<W>,
    path: &Path,
    bytes: &[u8],
) -> Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_entry_type(tar::EntryType::Regular);
    header.set_size(bytes.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(0);
    header.set_cksum();
    builder.append_data(&mut header, path, bytes)?;
    Ok(())
}

impl Artifact {
    /// Collect every path to store, relative to the base directory
    ///
    /// Directories are walked without following symlinks. The result is
    /// sorted and free of duplicates.
    fn archive_entries(&self) -> Result<BTreeSet<PathBuf>> {
        let mut entries = BTreeSet::new();

        for (label, paths) in &self.labelled_files {
            for rel in paths {
                let top = rel.components().next();
                if matches!(top, Some(Component::Normal(name)) if name == VERSION_ENTRY || name == METADATA_ENTRY)
                    && rel.components().count() == 1
                {
                    return Err(Error::InvalidParameter(format!(
                        "label '{}' uses reserved name {}",
                        label,
                        rel.display()
                    )));
                }

                let abs = self.abspath(rel);
                let meta = fs::symlink_metadata(&abs).map_err(|e| Error::path_io(&abs, e))?;

                if !meta.is_dir() {
                    entries.insert(rel.clone());
                    continue;
                }

                for entry in walkdir::WalkDir::new(&abs).follow_links(false).sort_by_file_name() {
                    let entry = entry.map_err(|e| {
                        let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| abs.clone());
                        Error::path_io(path, e.into())
                    })?;
                    let sub = entry
                        .path()
                        .strip_prefix(&self.base_dir)
                        .map_err(|_| Error::UnsafePath(entry.path().to_path_buf()))?;
                    entries.insert(sub.to_path_buf());
                }
            }
        }

        Ok(entries)
    }

    /// Write this artifact to a tar file
    ///
    /// If `dest` is an existing directory the archive is written to
    /// `dest/<root>.tar`; otherwise `dest` is the archive path. Returns the
    /// path written.
    pub fn archive(&self, dest: impl AsRef<Path>) -> Result<PathBuf> {
        let dest = dest.as_ref();
        let root = self.root_name()?;
        let archive_path = if dest.is_dir() {
            dest.join(format!("{}.tar", root))
        } else {
            dest.to_path_buf()
        };

        let entries = self.archive_entries()?;

        let record = MetadataRecord {
            version: ENCODING_VERSION,
            artifact_type: self.artifact_type.clone(),
            labelled_files: self.labelled_files.clone(),
            metadata: self.metadata.clone(),
        };
        let record_json =
            serde_json::to_vec_pretty(&record).map_err(|e| Error::MalformedMetadata {
                path: archive_path.clone(),
                reason: e.to_string(),
            })?;

        let file = File::create(&archive_path).map_err(|e| Error::path_io(&archive_path, e))?;
        if let Err(e) = self.write_entries(file, &archive_path, &root, &entries, &record_json) {
            if let Err(rm) = fs::remove_file(&archive_path) {
                log::warn!("failed to remove partial {}: {}", archive_path.display(), rm);
            }
            return Err(e);
        }

        log::debug!(
            "archived {} entries from {} to {}",
            entries.len(),
            self.base_dir.display(),
            archive_path.display()
        );

        Ok(archive_path)
    }

    fn write_entries(
        &self,
        file: File,
        archive_path: &Path,
        root: &str,
        entries: &BTreeSet<PathBuf>,
        record_json: &[u8],
    ) -> Result<()> {
        let mut builder = tar::Builder::new(file);
        builder.mode(tar::HeaderMode::Deterministic);
        builder.follow_symlinks(false);

        let root = PathBuf::from(root);
        append_bytes(
            &mut builder,
            &root.join(VERSION_ENTRY),
            format!("{}\n", ENCODING_VERSION).as_bytes(),
        )?;
        append_bytes(&mut builder, &root.join(METADATA_ENTRY), record_json)?;

        for rel in entries {
            let abs = self.abspath(rel);
            builder
                .append_path_with_name(&abs, root.join(rel))
                .map_err(|e| Error::path_io(&abs, e))?;
        }

        builder
            .into_inner()
            .and_then(|file| file.sync_all())
            .map_err(|e| Error::path_io(archive_path, e))
    }

    /// Reconstruct an artifact from `path` into `dest_dir`
    ///
    /// `dest_dir` must not exist or must be empty. The version marker and
    /// metadata are checked before anything is extracted. On failure
    /// `dest_dir` is left as it was found.
    pub fn unarchive(path: impl AsRef<Path>, dest_dir: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let dest_dir = dest_dir.as_ref();

        let (root, record) = read_header_entries(path)?;

        let existed = dest_dir.exists();
        if existed {
            let mut contents = fs::read_dir(dest_dir).map_err(|e| Error::path_io(dest_dir, e))?;
            if contents.next().is_some() {
                return Err(Error::path_io(
                    dest_dir,
                    std::io::Error::new(
                        std::io::ErrorKind::AlreadyExists,
                        "destination directory is not empty",
                    ),
                ));
            }
        }
        fs::create_dir_all(dest_dir).map_err(|e| Error::path_io(dest_dir, e))?;

        if let Err(e) = extract(path, dest_dir, &root, &record) {
            let cleaned = if existed {
                clear_dir(dest_dir)
            } else {
                fs::remove_dir_all(dest_dir)
            };
            if let Err(rm) = cleaned {
                log::warn!("failed to clean up {}: {}", dest_dir.display(), rm);
            }
            return Err(e);
        }

        log::debug!("unarchived {} to {}", path.display(), dest_dir.display());

        Artifact::with_type(
            dest_dir,
            record.labelled_files,
            record.metadata,
            &record.artifact_type,
        )
    }
}

/// Extract every entry under `root` into `dest_dir`, then check that the
/// labelled files arrived
fn extract(path: &Path, dest_dir: &Path, root: &str, record: &MetadataRecord) -> Result<()> {
    let file = File::open(path).map_err(|e| Error::path_io(path, e))?;
    let mut archive = tar::Archive::new(file);
    let mut extracted = 0usize;

    for entry in archive.entries().map_err(|e| Error::path_io(path, e))? {
        let mut entry = entry.map_err(|e| Error::path_io(path, e))?;
        let entry_path = entry
            .path()
            .map_err(|e| Error::path_io(path, e))?
            .into_owned();
        let rel = strip_root(&entry_path, root)?;

        let Some(rel) = rel else {
            continue;
        };
        if rel == Path::new(VERSION_ENTRY) || rel == Path::new(METADATA_ENTRY) {
            continue;
        }

        let entry_type = entry.header().entry_type();
        if !(entry_type.is_file() || entry_type.is_dir() || entry_type.is_symlink()) {
            return Err(Error::UnsafePath(entry_path));
        }

        if through_symlink(dest_dir, &rel) {
            return Err(Error::UnsafePath(entry_path));
        }

        let out_path = dest_dir.join(&rel);
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::path_io(parent, e))?;
        }
        entry
            .unpack(&out_path)
            .map_err(|e| Error::path_io(&out_path, e))?;
        extracted += 1;
    }

    for paths in record.labelled_files.values() {
        for rel in paths {
            let abs = dest_dir.join(rel);
            if fs::symlink_metadata(&abs).is_err() {
                return Err(Error::MalformedMetadata {
                    path: path.to_path_buf(),
                    reason: format!("labelled file {} missing from archive", rel.display()),
                });
            }
        }
    }

    log::trace!("extracted {} entries", extracted);
    Ok(())
}

/// Remove everything inside `dir`, keeping `dir` itself
fn clear_dir(dir: &Path) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            fs::remove_dir_all(entry.path())?;
        } else {
            fs::remove_file(entry.path())?;
        }
    }
    Ok(())
}

/// Split `<root>/rest` into `rest`, checking the path is safe
///
/// Returns `None` for the root directory entry itself.
fn strip_root(entry_path: &Path, root: &str) -> Result<Option<PathBuf>> {
    validate_relative_path(entry_path)?;

    let mut components = entry_path.components();
    match components.next() {
        Some(Component::Normal(first)) if first == root => {}
        _ => return Err(Error::UnsafePath(entry_path.to_path_buf())),
    }

    let rest = components.as_path();
    if rest.as_os_str().is_empty() {
        Ok(None)
    } else {
        Ok(Some(rest.to_path_buf()))
    }
}

/// Whether an already extracted symlink sits between `dest_dir` and `rel`
fn through_symlink(dest_dir: &Path, rel: &Path) -> bool {
    let mut current = dest_dir.to_path_buf();
    for component in rel.parent().into_iter().flat_map(Path::components) {
        current.push(component);
        if fs::symlink_metadata(&current).is_ok_and(|meta| meta.file_type().is_symlink()) {
            return true;
        }
    }
    false
}

/// Read and check the version marker and metadata record
fn read_header_entries(path: &Path) -> Result<(String, MetadataRecord)> {
    let malformed = |reason: String| Error::MalformedMetadata {
        path: path.to_path_buf(),
        reason,
    };

    let file = File::open(path).map_err(|e| Error::path_io(path, e))?;
    let mut archive = tar::Archive::new(file);

    let mut root: Option<String> = None;
    let mut version: Option<String> = None;
    let mut record: Option<Vec<u8>> = None;

    for entry in archive.entries().map_err(|e| Error::path_io(path, e))? {
        let mut entry = entry.map_err(|e| Error::path_io(path, e))?;
        let entry_path = entry
            .path()
            .map_err(|e| Error::path_io(path, e))?
            .into_owned();

        let mut components = entry_path.components();
        let (Some(Component::Normal(first)), Some(Component::Normal(name)), None) =
            (components.next(), components.next(), components.next())
        else {
            continue;
        };

        let is_version = name == VERSION_ENTRY;
        if !is_version && name != METADATA_ENTRY {
            continue;
        }

        let first = first.to_string_lossy().into_owned();
        match &root {
            Some(existing) if *existing != first => {
                return Err(malformed(format!(
                    "entries stored under both '{}' and '{}'",
                    existing, first
                )))
            }
            Some(_) => {}
            None => root = Some(first),
        }

        let mut buf = Vec::new();
        entry
            .read_to_end(&mut buf)
            .map_err(|e| Error::path_io(path, e))?;
        if is_version {
            version = Some(String::from_utf8_lossy(&buf).into_owned());
        } else {
            record = Some(buf);
        }
    }

    let version = version.ok_or_else(|| malformed("no version marker".into()))?;
    if version.trim() != ENCODING_VERSION.to_string() {
        return Err(Error::VersionMismatch {
            expected: ENCODING_VERSION,
            found: version.trim().to_string(),
        });
    }

    let record = record.ok_or_else(|| malformed("no metadata record".into()))?;
    let record: MetadataRecord =
        serde_json::from_slice(&record).map_err(|e| malformed(e.to_string()))?;
    if record.version != ENCODING_VERSION {
        return Err(Error::VersionMismatch {
            expected: ENCODING_VERSION,
            found: record.version.to_string(),
        });
    }

    let root = root.ok_or_else(|| malformed("no root directory".into()))?;
    Ok((root, record))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn build_tree(base: &Path) {
        fs::create_dir_all(base.join("include/detail")).unwrap();
        fs::write(base.join("libfoo.a"), b"!<arch>\n").unwrap();
        fs::write(base.join("include/foo.h"), b"int foo(void);\n").unwrap();
        fs::write(base.join("include/detail/impl.h"), b"#pragma once\n").unwrap();
    }

    fn sample(base: &Path) -> Artifact {
        let mut files = LabelledFiles::new();
        files.insert("library_files".into(), vec!["libfoo.a".into()]);
        files.insert("include".into(), vec!["include".into()]);
        let mut metadata = Metadata::new();
        metadata.insert("target".into(), serde_json::json!("c -mcpu=cortex-m7"));
        metadata.insert("flags".into(), serde_json::json!(["-O2", "-g"]));
        Artifact::new(base, files, metadata).unwrap()
    }

    #[test]
    fn test_round_trip() {
        let scratch = tempfile::tempdir().unwrap();
        let base = scratch.path().join("foo");
        build_tree(&base);
        let artifact = sample(&base);

        let out = scratch.path().join("out");
        fs::create_dir(&out).unwrap();
        let tar_path = artifact.archive(&out).unwrap();
        assert_eq!(tar_path, out.join("foo.tar"));

        let dest = scratch.path().join("restored");
        let restored = Artifact::unarchive(&tar_path, &dest).unwrap();

        assert_eq!(restored.base_dir(), dest.as_path());
        assert_eq!(restored.labelled_files(), artifact.labelled_files());
        assert_eq!(restored.metadata(), artifact.metadata());
        assert_eq!(restored.artifact_type(), Artifact::ARTIFACT_TYPE);
        assert_eq!(
            fs::read(dest.join("include/detail/impl.h")).unwrap(),
            b"#pragma once\n"
        );
        assert_eq!(fs::read(dest.join("libfoo.a")).unwrap(), b"!<arch>\n");
        assert!(!dest.join(VERSION_ENTRY).exists());
        assert!(!dest.join(METADATA_ENTRY).exists());
    }

    #[test]
    fn test_archive_layout() {
        let scratch = tempfile::tempdir().unwrap();
        let base = scratch.path().join("foo");
        build_tree(&base);
        let tar_path = sample(&base).archive(scratch.path().join("x.tar")).unwrap();

        let mut archive = tar::Archive::new(File::open(&tar_path).unwrap());
        let mut names = Vec::new();
        let mut version = String::new();
        for entry in archive.entries().unwrap() {
            let mut entry = entry.unwrap();
            let name = entry.path().unwrap().to_string_lossy().into_owned();
            if name == "foo/version" {
                entry.read_to_string(&mut version).unwrap();
            }
            names.push(name.trim_end_matches('/').to_string());
        }

        assert_eq!(version, "1\n");
        assert_eq!(names[0], "foo/version");
        assert_eq!(names[1], "foo/metadata.json");
        assert!(names.contains(&"foo/include/detail/impl.h".to_string()));
        assert!(names.contains(&"foo/libfoo.a".to_string()));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_preserved() {
        use std::os::unix::fs::symlink;

        let scratch = tempfile::tempdir().unwrap();
        let base = scratch.path().join("foo");
        build_tree(&base);
        symlink("include/foo.h", base.join("rel_link")).unwrap();
        symlink("/etc/hostname", base.join("abs_link")).unwrap();

        let mut files = LabelledFiles::new();
        files.insert(
            "links".into(),
            vec!["rel_link".into(), "abs_link".into(), "include".into()],
        );
        let artifact = Artifact::new(&base, files, Metadata::new()).unwrap();
        let tar_path = artifact.archive(scratch.path().join("foo.tar")).unwrap();

        let dest = scratch.path().join("restored");
        Artifact::unarchive(&tar_path, &dest).unwrap();

        assert_eq!(
            fs::read_link(dest.join("rel_link")).unwrap(),
            PathBuf::from("include/foo.h")
        );
        assert_eq!(
            fs::read_link(dest.join("abs_link")).unwrap(),
            PathBuf::from("/etc/hostname")
        );
        assert_eq!(
            fs::read(dest.join("rel_link")).unwrap(),
            b"int foo(void);\n"
        );
    }

    #[test]
    fn test_version_mismatch() {
        let scratch = tempfile::tempdir().unwrap();
        let tar_path = scratch.path().join("future.tar");
        let mut builder = tar::Builder::new(File::create(&tar_path).unwrap());
        append_bytes(&mut builder, Path::new("foo/version"), b"2\n").unwrap();
        append_bytes(&mut builder, Path::new("foo/metadata.json"), b"{}").unwrap();
        builder.into_inner().unwrap();

        let dest = scratch.path().join("restored");
        let err = Artifact::unarchive(&tar_path, &dest).unwrap_err();
        assert!(matches!(
            err,
            Error::VersionMismatch { expected: 1, ref found } if found == "2"
        ));
        assert_eq!(err.kind(), ErrorKind::Format);
        assert!(!dest.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_entry_below_symlink_rejected() {
        let scratch = tempfile::tempdir().unwrap();
        let outside = scratch.path().join("outside");
        fs::create_dir(&outside).unwrap();

        let tar_path = scratch.path().join("evil.tar");
        let mut builder = tar::Builder::new(File::create(&tar_path).unwrap());
        append_bytes(&mut builder, Path::new("foo/version"), b"1\n").unwrap();
        let record = br#"{"version":1,"artifact_type":"artifact","labelled_files":{},"metadata":{}}"#;
        append_bytes(&mut builder, Path::new("foo/metadata.json"), record).unwrap();
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Symlink);
        header.set_size(0);
        builder
            .append_link(&mut header, "foo/link", &outside)
            .unwrap();
        append_bytes(&mut builder, Path::new("foo/link/planted"), b"x").unwrap();
        builder.into_inner().unwrap();

        let err = Artifact::unarchive(&tar_path, scratch.path().join("restored")).unwrap_err();
        assert!(matches!(err, Error::UnsafePath(_)));
        assert!(!outside.join("planted").exists());
        assert!(!scratch.path().join("restored").exists());
    }

    /// Archive whose metadata names a file it does not carry
    fn archive_missing_label(tar_path: &Path) {
        let mut builder = tar::Builder::new(File::create(tar_path).unwrap());
        append_bytes(&mut builder, Path::new("foo/version"), b"1\n").unwrap();
        let record = br#"{"version":1,"artifact_type":"artifact","labelled_files":{"objects":["gone.o"]},"metadata":{}}"#;
        append_bytes(&mut builder, Path::new("foo/metadata.json"), record).unwrap();
        append_bytes(&mut builder, Path::new("foo/sub/other.o"), b"obj").unwrap();
        builder.into_inner().unwrap();
    }

    #[test]
    fn test_failed_unarchive_removes_extracted_files() {
        let scratch = tempfile::tempdir().unwrap();
        let tar_path = scratch.path().join("foo.tar");
        archive_missing_label(&tar_path);

        let fresh = scratch.path().join("fresh");
        let err = Artifact::unarchive(&tar_path, &fresh).unwrap_err();
        assert!(matches!(err, Error::MalformedMetadata { .. }));
        assert!(!fresh.exists());

        let empty = scratch.path().join("empty");
        fs::create_dir(&empty).unwrap();
        assert!(Artifact::unarchive(&tar_path, &empty).is_err());
        assert!(empty.is_dir());
        assert_eq!(fs::read_dir(&empty).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_archive_removes_partial_file() {
        let scratch = tempfile::tempdir().unwrap();
        let base = scratch.path().join("foo");
        build_tree(&base);
        let _socket = std::os::unix::net::UnixListener::bind(base.join("gdb.sock")).unwrap();

        let mut files = LabelledFiles::new();
        files.insert("objects".into(), vec!["libfoo.a".into(), "gdb.sock".into()]);
        let artifact = Artifact::new(&base, files, Metadata::new()).unwrap();

        let tar_path = scratch.path().join("foo.tar");
        assert!(artifact.archive(&tar_path).is_err());
        assert!(!tar_path.exists());
    }

    #[test]
    fn test_unarchive_needs_empty_dest() {
        let scratch = tempfile::tempdir().unwrap();
        let base = scratch.path().join("foo");
        build_tree(&base);
        let tar_path = sample(&base).archive(scratch.path().join("foo.tar")).unwrap();

        let dest = scratch.path().join("busy");
        fs::create_dir(&dest).unwrap();
        fs::write(dest.join("stale"), b"").unwrap();
        let err = Artifact::unarchive(&tar_path, &dest).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn test_missing_labelled_file() {
        let scratch = tempfile::tempdir().unwrap();
        let base = scratch.path().join("foo");
        fs::create_dir(&base).unwrap();
        let mut files = LabelledFiles::new();
        files.insert("objects".into(), vec!["gone.o".into()]);
        let artifact = Artifact::new(&base, files, Metadata::new()).unwrap();

        let err = artifact.archive(scratch.path().join("foo.tar")).unwrap_err();
        assert!(matches!(err, Error::PathIo { ref path, .. } if path.ends_with("gone.o")));
    }

    #[test]
    fn test_reserved_names_rejected() {
        let scratch = tempfile::tempdir().unwrap();
        let base = scratch.path().join("foo");
        fs::create_dir(&base).unwrap();
        fs::write(base.join(METADATA_ENTRY), b"{}").unwrap();
        let mut files = LabelledFiles::new();
        files.insert("meta".into(), vec![METADATA_ENTRY.into()]);
        let artifact = Artifact::new(&base, files, Metadata::new()).unwrap();

        assert!(matches!(
            artifact.archive(scratch.path().join("foo.tar")),
            Err(Error::InvalidParameter(_))
        ));
    }
}
