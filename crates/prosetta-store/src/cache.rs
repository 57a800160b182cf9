use crate::layout::StoreLayout;
use crate::{fsync_dir, StoreError};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// A cached chunk translation.
///
/// `draft_translation` holds the stage-1 output even for stage-2 entries, so
/// a hit can serve either stage of the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheEntry {
    pub source_lang: String,
    pub target_lang: String,
    pub original_text: String,
    pub translated_text: String,
    pub draft_translation: String,
    pub model: String,
    pub created_at: String,
    pub last_used: String,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub entries_last_24h: usize,
}

/// Translation cache keyed by blake3 over the full request identity:
/// chunk text, language pair, model (with stage suffix), and the context
/// hash of the preceding chunk. One JSON file per entry.
pub struct CacheStore {
    layout: StoreLayout,
}

impl CacheStore {
    pub fn new(layout: StoreLayout) -> Self {
        Self { layout }
    }

    /// Compute the cache key for a request. The `\x1f` separator keeps
    /// adjacent fields from aliasing each other.
    pub fn key(
        text: &str,
        source_lang: &str,
        target_lang: &str,
        model: &str,
        context_hash: &str,
    ) -> String {
        let mut hasher = blake3::Hasher::new();
        for part in [text, source_lang, target_lang, model, context_hash] {
            hasher.update(part.as_bytes());
            hasher.update(&[0x1f]);
        }
        hasher.finalize().to_hex().to_string()
    }

    /// Look up an entry and bump its `last_used` timestamp.
    pub fn get(&self, key: &str) -> Result<Option<CacheEntry>, StoreError> {
        let path = self.layout.cache_dir().join(key);
        if !path.exists() {
            debug!("cache miss: {}", &key[..16.min(key.len())]);
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        let mut entry: CacheEntry = match serde_json::from_str(&content) {
            Ok(e) => e,
            Err(e) => {
                warn!("removing corrupt cache entry {key}: {e}");
                let _ = fs::remove_file(&path);
                return Ok(None);
            }
        };

        entry.last_used = Utc::now().to_rfc3339();
        // Best-effort bump; a failed rewrite must not turn a hit into an error.
        if let Err(e) = self.write_entry(key, &entry) {
            warn!("failed to bump last_used for {key}: {e}");
        }

        debug!("cache hit: {}", &key[..16.min(key.len())]);
        Ok(Some(entry))
    }

    /// Insert or overwrite an entry atomically.
    pub fn put(&self, key: &str, entry: &CacheEntry) -> Result<(), StoreError> {
        self.write_entry(key, entry)
    }

    fn write_entry(&self, key: &str, entry: &CacheEntry) -> Result<(), StoreError> {
        let dir = self.layout.cache_dir();
        let content = serde_json::to_string_pretty(entry)?;
        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(dir.join(key)).map_err(|e| StoreError::Io(e.error))?;
        fsync_dir(&dir)?;
        Ok(())
    }

    /// Delete entries whose `last_used` is older than `max_age_days`.
    /// Returns the number of entries removed. Unparseable entries are
    /// removed as well.
    pub fn cleanup(&self, max_age_days: u32) -> Result<usize, StoreError> {
        let cutoff = Utc::now() - Duration::days(i64::from(max_age_days));
        let mut removed = 0;

        for entry in fs::read_dir(self.layout.cache_dir())? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let stale = match self.read_last_used(&path) {
                Some(last_used) => last_used < cutoff,
                None => true,
            };
            if stale {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
        if removed > 0 {
            debug!("cache cleanup removed {removed} entries");
        }
        Ok(removed)
    }

    /// Remove every entry. Returns the number removed.
    pub fn clear(&self) -> Result<usize, StoreError> {
        let mut removed = 0;
        for entry in fs::read_dir(self.layout.cache_dir())? {
            let path = entry?.path();
            if path.is_file() {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    pub fn stats(&self) -> Result<CacheStats, StoreError> {
        let day_ago = Utc::now() - Duration::hours(24);
        let mut total = 0;
        let mut recent = 0;

        for entry in fs::read_dir(self.layout.cache_dir())? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            total += 1;
            if let Some(last_used) = self.read_last_used(&path) {
                if last_used > day_ago {
                    recent += 1;
                }
            }
        }
        Ok(CacheStats {
            total_entries: total,
            entries_last_24h: recent,
        })
    }

    fn read_last_used(&self, path: &std::path::Path) -> Option<DateTime<Utc>> {
        let content = fs::read_to_string(path).ok()?;
        let entry: CacheEntry = serde_json::from_str(&content).ok()?;
        DateTime::parse_from_rfc3339(&entry.last_used)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }
}
