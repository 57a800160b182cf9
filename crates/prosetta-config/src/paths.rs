//! Data-directory layout.
//!
//! Single-file distributions extract to a fresh temporary directory on every
//! launch, so empty runtime directories are not guaranteed to exist.
//! [`Paths::ensure_dirs`] re-creates them on startup instead of assuming they
//! survived packaging.

use crate::ConfigError;
use std::fs;
use std::path::{Path, PathBuf};

/// Filesystem layout rooted at the Prosetta data directory.
#[derive(Debug, Clone)]
pub struct Paths {
    root: PathBuf,
    /// Directory holding the bundled web UI, if any.
    pub static_dir: Option<PathBuf>,
}

impl Paths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            static_dir: None,
        }
    }

    #[must_use]
    pub fn with_static_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.static_dir = dir;
        self
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[inline]
    pub fn uploads_dir(&self) -> PathBuf {
        self.root.join("uploads")
    }

    #[inline]
    pub fn translations_dir(&self) -> PathBuf {
        self.root.join("translations")
    }

    #[inline]
    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    #[inline]
    pub fn store_dir(&self) -> PathBuf {
        self.root.join("store")
    }

    /// Create every writable runtime directory that is not guaranteed to exist.
    pub fn ensure_dirs(&self) -> Result<(), ConfigError> {
        for dir in [
            self.uploads_dir(),
            self.translations_dir(),
            self.logs_dir(),
            self.store_dir(),
        ] {
            fs::create_dir_all(&dir)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_dirs_creates_all_runtime_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = Paths::new(tmp.path().join("data"));
        paths.ensure_dirs().unwrap();

        assert!(paths.uploads_dir().is_dir());
        assert!(paths.translations_dir().is_dir());
        assert!(paths.logs_dir().is_dir());
        assert!(paths.store_dir().is_dir());
    }

    #[test]
    fn ensure_dirs_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = Paths::new(tmp.path());
        paths.ensure_dirs().unwrap();
        paths.ensure_dirs().unwrap();
    }

    #[test]
    fn ensure_dirs_recreates_deleted_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = Paths::new(tmp.path());
        paths.ensure_dirs().unwrap();
        fs::remove_dir_all(paths.uploads_dir()).unwrap();
        paths.ensure_dirs().unwrap();
        assert!(paths.uploads_dir().is_dir());
    }
}
