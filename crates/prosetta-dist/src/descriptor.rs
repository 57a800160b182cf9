use crate::DistError;
use serde::Deserialize;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

/// Descriptor filename looked up in the working directory by default.
pub const DEFAULT_DESCRIPTOR: &str = "prosetta-dist.toml";

/// Packaging mode. Both modes stage the same tree and must produce
/// behavior-identical applications; they differ only in the final shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DistMode {
    /// A ready-to-run directory under `dist_dir/{name}/`.
    Folder,
    /// One gzip tar at `dist_dir/{name}.tar.gz`.
    SingleFile,
}

impl DistMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Folder => "folder",
            Self::SingleFile => "single-file",
        }
    }
}

impl fmt::Display for DistMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DistMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "folder" => Ok(Self::Folder),
            "single-file" | "onefile" => Ok(Self::SingleFile),
            other => Err(format!("unknown mode '{other}', expected folder or single-file")),
        }
    }
}

/// One asset mapping: a file or directory copied into the staged tree.
#[derive(Debug, Clone, Deserialize)]
pub struct Asset {
    pub source: PathBuf,
    pub dest: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DistSpec {
    pub name: String,
    pub mode: DistMode,
    /// The launcher binary shipped at the artifact root.
    pub entry: PathBuf,
    #[serde(default)]
    pub assets: Vec<Asset>,
    /// Filename suffixes dropped while staging.
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default = "default_build_dir")]
    pub build_dir: PathBuf,
    #[serde(default = "default_dist_dir")]
    pub dist_dir: PathBuf,
}

fn default_build_dir() -> PathBuf {
    PathBuf::from("build")
}

fn default_dist_dir() -> PathBuf {
    PathBuf::from("dist")
}

impl DistSpec {
    pub fn load(path: &Path) -> Result<Self, DistError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DistError::Descriptor(format!("cannot read {}: {e}", path.display()))
        })?;
        let spec: Self = toml::from_str(&content)
            .map_err(|e| DistError::Descriptor(format!("{}: {e}", path.display())))?;
        spec.validate()?;
        Ok(spec)
    }

    pub fn validate(&self) -> Result<(), DistError> {
        if self.name.is_empty()
            || !self
                .name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return Err(DistError::Descriptor(format!(
                "artifact name '{}' must be non-empty and match [a-zA-Z0-9._-]",
                self.name
            )));
        }
        for asset in &self.assets {
            if !is_relative_clean(&asset.dest) {
                return Err(DistError::Descriptor(format!(
                    "asset dest '{}' must be a clean relative path",
                    asset.dest.display()
                )));
            }
        }
        Ok(())
    }
}

/// Reject absolute destinations and anything containing `..`.
fn is_relative_clean(path: &Path) -> bool {
    !path.as_os_str().is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
}
