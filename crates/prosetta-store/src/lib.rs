//! File-backed storage for Prosetta.
//!
//! Everything shared between worker processes lives in plain files under the
//! store directory: a blake3-keyed translation cache and per-job JSON
//! records. Writes are atomic (temp file + rename + parent-dir fsync), so
//! independent server workers and CLI invocations can share one store
//! without coordination beyond the advisory maintenance lock.

pub mod cache;
pub mod jobs;
pub mod layout;
pub mod lock;

pub use cache::{CacheEntry, CacheStats, CacheStore};
pub use jobs::{JobId, JobRecord, JobStats, JobStatus, JobStore};
pub use layout::{StoreLayout, STORE_FORMAT_VERSION};
pub use lock::StoreLock;

use std::path::Path;
use thiserror::Error;

/// Current time in the timestamp format used by every store record.
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Fsync a directory to ensure that a preceding `rename()` is durable.
///
/// On Linux with ext4 `data=ordered` (the default), renames are usually
/// durable without an explicit dir fsync, but POSIX does not guarantee this.
pub(crate) fn fsync_dir(dir: &Path) -> Result<(), std::io::Error> {
    let f = std::fs::File::open(dir)?;
    f.sync_all()
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("job not found: {0}")]
    JobNotFound(String),
    #[error("ambiguous job id prefix '{prefix}': matches {count} jobs")]
    AmbiguousJobId { prefix: String, count: usize },
    #[error("job {0} is already in a terminal state")]
    JobFinished(String),
    #[error("store format version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
    #[error("lock acquisition failed: {0}")]
    LockFailed(String),
    #[error("invalid timestamp in record: {0}")]
    BadTimestamp(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_job_not_found() {
        let e = StoreError::JobNotFound("abc123".to_owned());
        assert!(e.to_string().contains("abc123"));
    }

    #[test]
    fn error_display_version_mismatch() {
        let e = StoreError::VersionMismatch {
            expected: 1,
            found: 2,
        };
        let msg = e.to_string();
        assert!(msg.contains('1'));
        assert!(msg.contains('2'));
    }

    #[test]
    fn error_display_ambiguous_prefix() {
        let e = StoreError::AmbiguousJobId {
            prefix: "ab".to_owned(),
            count: 3,
        };
        assert!(e.to_string().contains("'ab'"));
    }
}
