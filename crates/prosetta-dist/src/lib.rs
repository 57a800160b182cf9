//! Packaging pipeline for Prosetta release artifacts.
//!
//! One descriptor (`prosetta-dist.toml`) drives three independent outputs:
//! a folder artifact, a single-file gzip tar, and a container build
//! descriptor. The build stages into a transient directory and only
//! `dist_dir` survives; artifacts are superseded, never mutated in place.

pub mod build;
pub mod container;
pub mod descriptor;

pub use build::{build, BuildReport};
pub use container::{dockerfile, write_dockerfile, ContainerSpec};
pub use descriptor::{Asset, DistMode, DistSpec, DEFAULT_DESCRIPTOR};

use thiserror::Error;

/// Failure classes of the packaging pipeline. Each maps to its own CLI
/// exit code, so scripts can tell a missing binary from a broken asset
/// manifest.
#[derive(Debug, Error)]
pub enum DistError {
    #[error("precondition failed: {0}")]
    Precondition(String),
    #[error("asset manifest invalid: {0}")]
    Manifest(String),
    #[error("packaging failed: {0}")]
    Packaging(String),
    #[error("invalid descriptor: {0}")]
    Descriptor(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
