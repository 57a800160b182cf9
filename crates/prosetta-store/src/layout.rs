use crate::StoreError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Current store format version. Incremented on incompatible layout changes.
pub const STORE_FORMAT_VERSION: u32 = 1;
const VERSION_FILE: &str = "version";

/// Directory layout for the Prosetta store.
///
/// Cache entries and job records each live in their own subdirectory; a
/// version marker guards against opening a store written by an incompatible
/// release. Subdirectories are created by [`initialize`](Self::initialize).
#[derive(Debug, Clone)]
pub struct StoreLayout {
    root: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreVersion {
    format_version: u32,
}

impl StoreLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[inline]
    pub fn cache_dir(&self) -> PathBuf {
        self.root.join("cache")
    }

    #[inline]
    pub fn jobs_dir(&self) -> PathBuf {
        self.root.join("jobs")
    }

    #[inline]
    pub fn lock_file(&self) -> PathBuf {
        self.root.join(".lock")
    }

    fn version_file(&self) -> PathBuf {
        self.root.join(VERSION_FILE)
    }

    /// Create the directory tree and version marker, then verify the version.
    /// Safe to call on every startup.
    pub fn initialize(&self) -> Result<(), StoreError> {
        fs::create_dir_all(self.cache_dir())?;
        fs::create_dir_all(self.jobs_dir())?;

        if !self.version_file().exists() {
            let content = serde_json::to_string_pretty(&StoreVersion {
                format_version: STORE_FORMAT_VERSION,
            })?;
            let mut tmp = NamedTempFile::new_in(&self.root)?;
            tmp.write_all(content.as_bytes())?;
            tmp.as_file().sync_all()?;
            tmp.persist(self.version_file())
                .map_err(|e| StoreError::Io(e.error))?;
            crate::fsync_dir(&self.root)?;
        }
        self.verify_version()
    }

    pub fn verify_version(&self) -> Result<(), StoreError> {
        let content = fs::read_to_string(self.version_file())?;
        let version: StoreVersion = serde_json::from_str(&content)?;
        if version.format_version != STORE_FORMAT_VERSION {
            return Err(StoreError::VersionMismatch {
                expected: STORE_FORMAT_VERSION,
                found: version.format_version,
            });
        }
        Ok(())
    }
}
