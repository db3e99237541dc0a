//! Artifact command implementations

use rmicro_core::artifact::{Artifact, LabelledFiles, Metadata, MicroBinary, MicroLibrary};
use std::path::{Path, PathBuf};

/// Archive labelled files under `base_dir`
pub fn cmd_pack(
    base_dir: &Path,
    labels: &[(String, String)],
    meta: &[(String, String)],
    artifact_type: &str,
    output: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut labelled = LabelledFiles::new();
    for (label, paths) in labels {
        labelled
            .entry(label.clone())
            .or_default()
            .extend(paths.split(',').filter(|p| !p.is_empty()).map(PathBuf::from));
    }

    let mut metadata = Metadata::new();
    for (key, json) in meta {
        let value = serde_json::from_str(json)
            .map_err(|e| format!("metadata '{}' is not valid JSON: {}", key, e))?;
        metadata.insert(key.clone(), value);
    }

    let artifact = Artifact::new(base_dir, labelled, metadata)?;
    let artifact = match artifact_type {
        Artifact::ARTIFACT_TYPE => artifact,
        MicroLibrary::ARTIFACT_TYPE => MicroLibrary::from_artifact(artifact)?.into_artifact(),
        MicroBinary::ARTIFACT_TYPE => MicroBinary::from_artifact(artifact)?.into_artifact(),
        other => return Err(format!("unknown artifact type '{}'", other).into()),
    };

    let written = artifact.archive(output)?;
    println!("Wrote {}", written.display());
    Ok(())
}

/// Print an archive's type, labels and metadata
pub fn cmd_show(archive: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let scratch = tempfile::tempdir()?;
    let artifact = Artifact::unarchive(archive, scratch.path())?;
    print_artifact(&artifact)
}

/// Extract an archive into `dest`
pub fn cmd_unpack(archive: &Path, dest: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let artifact = Artifact::unarchive(archive, dest)?;
    log::info!("Unpacked {} into {}", archive.display(), dest.display());
    print_artifact(&artifact)
}

fn print_artifact(artifact: &Artifact) -> Result<(), Box<dyn std::error::Error>> {
    println!("Type: {}", artifact.artifact_type());
    println!("\nLabels:");
    for (label, paths) in artifact.labelled_files() {
        println!("  {}:", label);
        for path in paths {
            println!("    {}", path.display());
        }
    }

    if !artifact.metadata().is_empty() {
        println!("\nMetadata:");
        println!("{}", serde_json::to_string_pretty(artifact.metadata())?);
    }
    Ok(())
}
