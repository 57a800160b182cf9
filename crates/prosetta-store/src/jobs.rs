use crate::layout::StoreLayout;
use crate::{fsync_dir, StoreError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::Write;
use tempfile::NamedTempFile;
use tracing::debug;

/// Number of leading hex characters shown in listings and accepted as a
/// unique prefix.
pub const SHORT_ID_LEN: usize = 12;

/// Identifier of a translation job. A 64-character blake3 hex digest, so
/// ids are safe as filenames and can be abbreviated unambiguously.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Derive a fresh id from the upload identity plus the current clock.
    pub fn generate(filename: &str) -> Self {
        let now = Utc::now();
        let mut hasher = blake3::Hasher::new();
        hasher.update(filename.as_bytes());
        hasher.update(&[0x1f]);
        hasher.update(now.to_rfc3339().as_bytes());
        hasher.update(&now.timestamp_subsec_nanos().to_le_bytes());
        hasher.update(&std::process::id().to_le_bytes());
        Self(hasher.finalize().to_hex().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn short(&self) -> &str {
        &self.0[..SHORT_ID_LEN]
    }

    /// Parse a full 64-hex id. Prefixes go through [`JobStore::resolve`].
    pub fn parse(s: &str) -> Option<Self> {
        if s.len() == 64 && s.chars().all(|c| c.is_ascii_hexdigit()) {
            Some(Self(s.to_ascii_lowercase()))
        } else {
            None
        }
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One translation job, stored as `jobs/{id}.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: JobId,
    pub filename: String,
    pub source_lang: String,
    pub target_lang: String,
    pub model: String,
    pub status: JobStatus,
    /// 0 to 100.
    pub progress: u8,
    /// Human-readable description of the current pipeline stage.
    pub stage: String,
    pub original_text: String,
    pub draft_translation: String,
    pub translated_text: String,
    pub error_message: Option<String>,
    pub translated_filename: Option<String>,
    pub file_size: u64,
    pub chunk_count: Option<usize>,
    pub processing_time_secs: Option<f64>,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
}

impl JobRecord {
    pub fn new(
        filename: &str,
        source_lang: &str,
        target_lang: &str,
        model: &str,
        original_text: String,
    ) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            job_id: JobId::generate(filename),
            filename: filename.to_owned(),
            source_lang: source_lang.to_owned(),
            target_lang: target_lang.to_owned(),
            model: model.to_owned(),
            status: JobStatus::Pending,
            progress: 0,
            stage: "queued".to_owned(),
            file_size: original_text.len() as u64,
            original_text,
            draft_translation: String::new(),
            translated_text: String::new(),
            error_message: None,
            translated_filename: None,
            chunk_count: None,
            processing_time_secs: None,
            created_at: now.clone(),
            updated_at: now,
            completed_at: None,
        }
    }

    fn created(&self) -> Result<DateTime<Utc>, StoreError> {
        DateTime::parse_from_rfc3339(&self.created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| StoreError::BadTimestamp(self.created_at.clone()))
    }
}

/// Aggregate job counts for `prosetta jobs stats` and
/// `/api/translations/stats`.
#[derive(Debug, Clone, Serialize)]
pub struct JobStats {
    pub total: usize,
    pub by_status: BTreeMap<String, usize>,
    pub average_processing_time_secs: Option<f64>,
}

/// File-backed job repository. Every mutation rewrites the whole record
/// atomically; readers in other processes see either the old or the new
/// version, never a torn one.
pub struct JobStore {
    layout: StoreLayout,
}

impl JobStore {
    pub fn new(layout: StoreLayout) -> Self {
        Self { layout }
    }

    fn record_path(&self, id: &JobId) -> std::path::PathBuf {
        self.layout.jobs_dir().join(format!("{id}.json"))
    }

    pub fn create(&self, record: &JobRecord) -> Result<(), StoreError> {
        self.write_record(record)?;
        debug!("created job {}", record.job_id.short());
        Ok(())
    }

    pub fn get(&self, id: &JobId) -> Result<JobRecord, StoreError> {
        let path = self.record_path(id);
        if !path.exists() {
            return Err(StoreError::JobNotFound(id.short().to_owned()));
        }
        let content = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Resolve a (possibly abbreviated) hex id to a full job id.
    pub fn resolve(&self, prefix: &str) -> Result<JobId, StoreError> {
        if let Some(id) = JobId::parse(prefix) {
            if self.record_path(&id).exists() {
                return Ok(id);
            }
            return Err(StoreError::JobNotFound(prefix.to_owned()));
        }

        let needle = prefix.to_ascii_lowercase();
        let mut matches = Vec::new();
        for entry in fs::read_dir(self.layout.jobs_dir())? {
            let name = entry?.file_name();
            let Some(stem) = name.to_str().and_then(|n| n.strip_suffix(".json")) else {
                continue;
            };
            if stem.starts_with(&needle) {
                if let Some(id) = JobId::parse(stem) {
                    matches.push(id);
                }
            }
        }
        match matches.len() {
            0 => Err(StoreError::JobNotFound(prefix.to_owned())),
            1 => Ok(matches.remove(0)),
            n => Err(StoreError::AmbiguousJobId {
                prefix: prefix.to_owned(),
                count: n,
            }),
        }
    }

    /// List jobs newest-first, optionally filtered by status.
    pub fn list(
        &self,
        status: Option<JobStatus>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<JobRecord>, StoreError> {
        let mut records = self.load_all()?;
        if let Some(want) = status {
            records.retain(|r| r.status == want);
        }
        let mut keyed = Vec::with_capacity(records.len());
        for record in records {
            keyed.push((record.created()?, record));
        }
        keyed.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(keyed
            .into_iter()
            .map(|(_, r)| r)
            .skip(offset)
            .take(limit)
            .collect())
    }

    /// Record per-chunk progress on a running job. Moves a pending job to
    /// processing; refuses to touch a job that already finished.
    pub fn update_progress(
        &self,
        id: &JobId,
        progress: u8,
        stage: &str,
        draft_translation: Option<&str>,
        translated_text: Option<&str>,
    ) -> Result<JobRecord, StoreError> {
        let mut record = self.get(id)?;
        if record.status.is_terminal() {
            return Err(StoreError::JobFinished(id.short().to_owned()));
        }
        record.status = JobStatus::Processing;
        record.progress = progress.min(100);
        record.stage = stage.to_owned();
        if let Some(draft) = draft_translation {
            record.draft_translation = draft.to_owned();
        }
        if let Some(translated) = translated_text {
            record.translated_text = translated.to_owned();
        }
        record.updated_at = Utc::now().to_rfc3339();
        self.write_record(&record)?;
        Ok(record)
    }

    pub fn mark_completed(
        &self,
        id: &JobId,
        translated_text: &str,
        translated_filename: &str,
        chunk_count: usize,
        processing_time_secs: f64,
    ) -> Result<JobRecord, StoreError> {
        self.finish(id, |record| {
            record.status = JobStatus::Completed;
            record.progress = 100;
            record.stage = "completed".to_owned();
            record.translated_text = translated_text.to_owned();
            record.translated_filename = Some(translated_filename.to_owned());
            record.chunk_count = Some(chunk_count);
            record.processing_time_secs = Some(processing_time_secs);
        })
    }

    pub fn mark_failed(&self, id: &JobId, error: &str) -> Result<JobRecord, StoreError> {
        self.finish(id, |record| {
            record.status = JobStatus::Failed;
            record.stage = "failed".to_owned();
            record.error_message = Some(error.to_owned());
        })
    }

    pub fn mark_cancelled(&self, id: &JobId) -> Result<JobRecord, StoreError> {
        self.finish(id, |record| {
            record.status = JobStatus::Cancelled;
            record.stage = "cancelled".to_owned();
        })
    }

    fn finish(
        &self,
        id: &JobId,
        apply: impl FnOnce(&mut JobRecord),
    ) -> Result<JobRecord, StoreError> {
        let mut record = self.get(id)?;
        if record.status.is_terminal() {
            return Err(StoreError::JobFinished(id.short().to_owned()));
        }
        apply(&mut record);
        let now = Utc::now().to_rfc3339();
        record.updated_at = now.clone();
        record.completed_at = Some(now);
        self.write_record(&record)?;
        debug!("job {} -> {}", id.short(), record.status);
        Ok(record)
    }

    pub fn delete(&self, id: &JobId) -> Result<(), StoreError> {
        let path = self.record_path(id);
        if !path.exists() {
            return Err(StoreError::JobNotFound(id.short().to_owned()));
        }
        fs::remove_file(path)?;
        Ok(())
    }

    pub fn stats(&self) -> Result<JobStats, StoreError> {
        let records = self.load_all()?;
        let mut by_status = BTreeMap::new();
        let mut time_total = 0.0;
        let mut time_count = 0u32;
        for record in &records {
            *by_status.entry(record.status.as_str().to_owned()).or_insert(0) += 1;
            if let Some(secs) = record.processing_time_secs {
                time_total += secs;
                time_count += 1;
            }
        }
        Ok(JobStats {
            total: records.len(),
            by_status,
            average_processing_time_secs: (time_count > 0)
                .then(|| time_total / f64::from(time_count)),
        })
    }

    fn load_all(&self) -> Result<Vec<JobRecord>, StoreError> {
        let mut records = Vec::new();
        for entry in fs::read_dir(self.layout.jobs_dir())? {
            let path = entry?.path();
            if path.extension().is_some_and(|e| e == "json") {
                let content = fs::read_to_string(&path)?;
                records.push(serde_json::from_str(&content)?);
            }
        }
        Ok(records)
    }

    fn write_record(&self, record: &JobRecord) -> Result<(), StoreError> {
        let dir = self.layout.jobs_dir();
        let content = serde_json::to_string_pretty(record)?;
        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.record_path(&record.job_id))
            .map_err(|e| StoreError::Io(e.error))?;
        fsync_dir(&dir)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> (tempfile::TempDir, JobStore) {
        let tmp = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(tmp.path());
        layout.initialize().unwrap();
        (tmp, JobStore::new(layout))
    }

    fn record(filename: &str) -> JobRecord {
        JobRecord::new(filename, "en", "es", "llama3", "Some text.".to_owned())
    }

    #[test]
    fn job_id_shape() {
        let id = JobId::generate("book.txt");
        assert_eq!(id.as_str().len(), 64);
        assert_eq!(id.short().len(), SHORT_ID_LEN);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn job_ids_are_unique() {
        let a = JobId::generate("book.txt");
        let b = JobId::generate("book.txt");
        assert_ne!(a, b);
    }

    #[test]
    fn parse_rejects_bad_ids() {
        assert!(JobId::parse("abc").is_none());
        assert!(JobId::parse(&"z".repeat(64)).is_none());
        assert!(JobId::parse(&"a".repeat(64)).is_some());
    }

    #[test]
    fn create_and_get() {
        let (_tmp, store) = test_store();
        let rec = record("book.txt");
        store.create(&rec).unwrap();

        let got = store.get(&rec.job_id).unwrap();
        assert_eq!(got.filename, "book.txt");
        assert_eq!(got.status, JobStatus::Pending);
        assert_eq!(got.progress, 0);
    }

    #[test]
    fn get_missing_job_fails() {
        let (_tmp, store) = test_store();
        let err = store.get(&JobId::generate("x")).unwrap_err();
        assert!(matches!(err, StoreError::JobNotFound(_)));
    }

    #[test]
    fn resolve_short_prefix() {
        let (_tmp, store) = test_store();
        let rec = record("book.txt");
        store.create(&rec).unwrap();

        let resolved = store.resolve(rec.job_id.short()).unwrap();
        assert_eq!(resolved, rec.job_id);
    }

    #[test]
    fn resolve_ambiguous_prefix_fails() {
        let (_tmp, store) = test_store();
        // Force two jobs sharing a one-character prefix.
        let mut ids: Vec<String> = Vec::new();
        while ids.len() < 2 {
            let rec = record("a.txt");
            if ids.is_empty() || rec.job_id.as_str().starts_with(&ids[0][..1]) {
                ids.push(rec.job_id.as_str().to_owned());
                store.create(&rec).unwrap();
            }
        }
        let err = store.resolve(&ids[0][..1]).unwrap_err();
        assert!(matches!(err, StoreError::AmbiguousJobId { count: 2, .. }));
    }

    #[test]
    fn update_progress_moves_to_processing() {
        let (_tmp, store) = test_store();
        let rec = record("book.txt");
        store.create(&rec).unwrap();

        let updated = store
            .update_progress(&rec.job_id, 25, "stage 1: chunk 1/2", Some("draft"), None)
            .unwrap();
        assert_eq!(updated.status, JobStatus::Processing);
        assert_eq!(updated.progress, 25);
        assert_eq!(updated.draft_translation, "draft");
    }

    #[test]
    fn progress_is_clamped() {
        let (_tmp, store) = test_store();
        let rec = record("book.txt");
        store.create(&rec).unwrap();
        let updated = store
            .update_progress(&rec.job_id, 250, "stage", None, None)
            .unwrap();
        assert_eq!(updated.progress, 100);
    }

    #[test]
    fn terminal_jobs_reject_updates() {
        let (_tmp, store) = test_store();
        let rec = record("book.txt");
        store.create(&rec).unwrap();
        store
            .mark_completed(&rec.job_id, "done", "book_es.txt", 3, 12.5)
            .unwrap();

        let err = store
            .update_progress(&rec.job_id, 50, "stage", None, None)
            .unwrap_err();
        assert!(matches!(err, StoreError::JobFinished(_)));
        let err = store.mark_cancelled(&rec.job_id).unwrap_err();
        assert!(matches!(err, StoreError::JobFinished(_)));
    }

    #[test]
    fn mark_completed_fills_result_fields() {
        let (_tmp, store) = test_store();
        let rec = record("book.txt");
        store.create(&rec).unwrap();
        let done = store
            .mark_completed(&rec.job_id, "hola", "book_es.txt", 4, 9.0)
            .unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.progress, 100);
        assert_eq!(done.translated_text, "hola");
        assert_eq!(done.translated_filename.as_deref(), Some("book_es.txt"));
        assert_eq!(done.chunk_count, Some(4));
        assert!(done.completed_at.is_some());
    }

    #[test]
    fn mark_failed_records_error() {
        let (_tmp, store) = test_store();
        let rec = record("book.txt");
        store.create(&rec).unwrap();
        let failed = store.mark_failed(&rec.job_id, "model unavailable").unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.error_message.as_deref(), Some("model unavailable"));
    }

    #[test]
    fn list_newest_first_with_filter() {
        let (_tmp, store) = test_store();
        let mut first = record("a.txt");
        first.created_at = "2024-01-01T00:00:00+00:00".to_owned();
        let mut second = record("b.txt");
        second.created_at = "2024-06-01T00:00:00+00:00".to_owned();
        store.create(&first).unwrap();
        store.create(&second).unwrap();
        store.mark_failed(&first.job_id, "boom").unwrap();

        let all = store.list(None, 10, 0).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].filename, "b.txt");

        let failed = store.list(Some(JobStatus::Failed), 10, 0).unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].filename, "a.txt");
    }

    #[test]
    fn list_applies_limit_and_offset() {
        let (_tmp, store) = test_store();
        for (i, name) in ["a.txt", "b.txt", "c.txt"].iter().enumerate() {
            let mut rec = record(name);
            rec.created_at = format!("2024-0{}-01T00:00:00+00:00", i + 1);
            store.create(&rec).unwrap();
        }
        let page = store.list(None, 1, 1).unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].filename, "b.txt");
    }

    #[test]
    fn delete_removes_record() {
        let (_tmp, store) = test_store();
        let rec = record("book.txt");
        store.create(&rec).unwrap();
        store.delete(&rec.job_id).unwrap();
        assert!(matches!(
            store.get(&rec.job_id),
            Err(StoreError::JobNotFound(_))
        ));
    }

    #[test]
    fn stats_counts_by_status() {
        let (_tmp, store) = test_store();
        let a = record("a.txt");
        let b = record("b.txt");
        let c = record("c.txt");
        store.create(&a).unwrap();
        store.create(&b).unwrap();
        store.create(&c).unwrap();
        store.mark_completed(&a.job_id, "x", "a_es.txt", 2, 10.0).unwrap();
        store.mark_completed(&b.job_id, "y", "b_es.txt", 2, 20.0).unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.by_status.get("completed"), Some(&2));
        assert_eq!(stats.by_status.get("pending"), Some(&1));
        assert_eq!(stats.average_processing_time_secs, Some(15.0));
    }

    #[test]
    fn status_parse_roundtrip() {
        for s in ["pending", "processing", "completed", "failed", "cancelled"] {
            assert_eq!(JobStatus::parse(s).unwrap().as_str(), s);
        }
        assert!(JobStatus::parse("bogus").is_none());
    }
}
