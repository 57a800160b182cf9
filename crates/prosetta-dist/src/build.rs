use crate::descriptor::{DistMode, DistSpec};
use crate::DistError;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Runtime directories the folder artifact ships empty. The single-file
/// launcher re-creates them at startup instead, since archive extraction
/// does not guarantee empty directories survive.
const RUNTIME_DIRS: &[&str] = &["uploads", "translations", "logs"];

#[derive(Debug)]
pub struct BuildReport {
    pub mode: DistMode,
    pub artifact: PathBuf,
    pub staged_files: usize,
}

/// Run the full packaging pipeline for one descriptor.
///
/// Order matters: the entry-binary precondition and the asset manifest are
/// both checked before any side effect, so a failed build never leaves a
/// half-written artifact behind.
pub fn build(spec: &DistSpec) -> Result<BuildReport, DistError> {
    if !spec.entry.is_file() {
        return Err(DistError::Precondition(format!(
            "entry binary {} does not exist or is not a regular file",
            spec.entry.display()
        )));
    }
    validate_manifest(spec)?;

    // Stale state from an aborted run must not leak into this artifact.
    if spec.build_dir.exists() {
        fs::remove_dir_all(&spec.build_dir)?;
    }
    let staging = spec.build_dir.join(&spec.name);
    fs::create_dir_all(&staging)?;

    let mut staged_files = 0;
    let entry_name = spec
        .entry
        .file_name()
        .ok_or_else(|| DistError::Precondition("entry path has no filename".to_owned()))?;
    fs::copy(&spec.entry, staging.join(entry_name))?;
    staged_files += 1;

    for asset in &spec.assets {
        staged_files += stage_tree(&asset.source, &staging.join(&asset.dest), &spec.exclude)?;
    }
    if spec.mode == DistMode::Folder {
        for dir in RUNTIME_DIRS {
            fs::create_dir_all(staging.join(dir))?;
        }
    }
    debug!("staged {staged_files} files into {}", staging.display());

    fs::create_dir_all(&spec.dist_dir)?;
    let artifact = match spec.mode {
        DistMode::Folder => {
            let target = spec.dist_dir.join(&spec.name);
            if target.exists() {
                fs::remove_dir_all(&target)?;
            }
            move_tree(&staging, &target)?;
            target
        }
        DistMode::SingleFile => {
            let target = spec.dist_dir.join(format!("{}.tar.gz", spec.name));
            pack_archive(&staging, &spec.name, &target)?;
            target
        }
    };

    fs::remove_dir_all(&spec.build_dir)?;
    info!(
        "built {} artifact: {} ({staged_files} files)",
        spec.mode,
        artifact.display()
    );
    Ok(BuildReport {
        mode: spec.mode,
        artifact,
        staged_files,
    })
}

/// Every asset source must exist before anything is staged. A missing
/// source is a manifest error, not a quietly thinner artifact.
fn validate_manifest(spec: &DistSpec) -> Result<(), DistError> {
    let missing: Vec<String> = spec
        .assets
        .iter()
        .filter(|a| !a.source.exists())
        .map(|a| a.source.display().to_string())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(DistError::Manifest(format!(
            "missing asset sources: {}",
            missing.join(", ")
        )))
    }
}

fn excluded(name: &str, exclude: &[String]) -> bool {
    exclude.iter().any(|suffix| name.ends_with(suffix.as_str()))
}

/// Copy a file or directory tree, applying exclusion suffixes. Returns the
/// number of files copied.
fn stage_tree(source: &Path, dest: &Path, exclude: &[String]) -> Result<usize, DistError> {
    if source.is_file() {
        let name = source
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        if excluded(name, exclude) {
            return Ok(0);
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(source, dest)?;
        return Ok(1);
    }

    fs::create_dir_all(dest)?;
    let mut copied = 0;
    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let name = entry.file_name();
        let child_dest = dest.join(&name);
        copied += stage_tree(&entry.path(), &child_dest, exclude)?;
    }
    Ok(copied)
}

/// Rename where possible, fall back to copy for cross-device moves.
fn move_tree(from: &Path, to: &Path) -> Result<(), DistError> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    stage_tree(from, to, &[])?;
    fs::remove_dir_all(from)?;
    Ok(())
}

fn pack_archive(staging: &Path, name: &str, target: &Path) -> Result<(), DistError> {
    let file = fs::File::create(target)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut ar = tar::Builder::new(encoder);
    ar.append_dir_all(name, staging)
        .map_err(|e| DistError::Packaging(format!("tar staging failed: {e}")))?;
    let encoder = ar
        .into_inner()
        .map_err(|e| DistError::Packaging(format!("tar finish failed: {e}")))?;
    encoder
        .finish()
        .map_err(|e| DistError::Packaging(format!("gzip finish failed: {e}")))?;
    Ok(())
}
