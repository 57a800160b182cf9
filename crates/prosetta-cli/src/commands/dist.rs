use super::{json_pretty, spin_fail, spin_ok, spinner, EXIT_SUCCESS};
use clap::Subcommand;
use prosetta_dist::{ContainerSpec, DistError, DistMode, DistSpec, DEFAULT_DESCRIPTOR};
use std::path::PathBuf;

#[derive(Debug, Subcommand)]
pub enum DistAction {
    /// Stage and package a release from the descriptor.
    Build {
        /// Path to the distribution descriptor TOML.
        #[arg(long, default_value = DEFAULT_DESCRIPTOR)]
        descriptor: PathBuf,
        /// Override the packaging mode ("folder" or "single-file").
        #[arg(long)]
        mode: Option<DistMode>,
    },
    /// Write a container build file for the server image.
    Container {
        /// Output path for the generated file.
        #[arg(long, default_value = "Dockerfile")]
        out: PathBuf,
        /// Port baked into the image.
        #[arg(long)]
        port: Option<u16>,
        /// Overwrite an existing file.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
}

pub fn run(action: &DistAction, json: bool) -> Result<u8, String> {
    match action {
        DistAction::Build { descriptor, mode } => build(descriptor, *mode, json),
        DistAction::Container { out, port, force } => container(out, *port, *force, json),
    }
}

fn build(descriptor: &std::path::Path, mode: Option<DistMode>, json: bool) -> Result<u8, String> {
    let mut spec = DistSpec::load(descriptor).map_err(dist_err)?;
    if let Some(mode) = mode {
        spec.mode = mode;
    }

    let pb = if json {
        None
    } else {
        Some(spinner("packaging release..."))
    };
    let report = match prosetta_dist::build(&spec) {
        Ok(report) => {
            if let Some(ref pb) = pb {
                spin_ok(pb, "release packaged");
            }
            report
        }
        Err(e) => {
            if let Some(ref pb) = pb {
                spin_fail(pb, "packaging failed");
            }
            return Err(dist_err(e));
        }
    };

    if json {
        let payload = serde_json::json!({
            "mode": report.mode.as_str(),
            "artifact": report.artifact,
            "staged_files": report.staged_files,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!(
            "packaged {} files ({} mode)",
            report.staged_files,
            report.mode.as_str()
        );
        println!("artifact: {}", report.artifact.display());
    }
    Ok(EXIT_SUCCESS)
}

fn container(
    out: &std::path::Path,
    port: Option<u16>,
    force: bool,
    json: bool,
) -> Result<u8, String> {
    let mut spec = ContainerSpec::default();
    if let Some(port) = port {
        spec.port = port;
    }
    prosetta_dist::write_dockerfile(out, &spec, force).map_err(dist_err)?;

    if json {
        let payload = serde_json::json!({
            "path": out,
            "port": spec.port,
            "binary": spec.binary,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!("wrote {}", out.display());
    }
    Ok(EXIT_SUCCESS)
}

/// Prefix errors so the exit code mapping in main can tell the dist
/// failure classes apart.
fn dist_err(e: DistError) -> String {
    match e {
        DistError::Precondition(msg) => format!("dist precondition: {msg}"),
        DistError::Manifest(msg) | DistError::Descriptor(msg) => format!("dist manifest: {msg}"),
        DistError::Packaging(msg) => format!("packaging failed: {msg}"),
        DistError::Io(e) => format!("packaging failed: {e}"),
    }
}
