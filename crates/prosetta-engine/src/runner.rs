use crate::pipeline::{Stage, Translator};
use crate::EngineError;
use prosetta_config::sanitize_filename;
use prosetta_store::{JobId, JobRecord, JobStore, StoreError};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

/// Drives a stored job through the translation pipeline, persisting
/// progress after every chunk so any process can observe it.
pub struct JobRunner<'a> {
    jobs: &'a JobStore,
    translations_dir: PathBuf,
}

impl<'a> JobRunner<'a> {
    pub fn new(jobs: &'a JobStore, translations_dir: impl Into<PathBuf>) -> Self {
        Self {
            jobs,
            translations_dir: translations_dir.into(),
        }
    }

    /// Output filename for a completed job.
    pub fn output_filename(upload_filename: &str, target_lang: &str) -> String {
        let safe = sanitize_filename(upload_filename).unwrap_or_else(|| "translation".to_owned());
        let stem = Path::new(&safe)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("translation");
        format!("{stem}_{target_lang}.txt")
    }

    /// Run a pending job to a terminal state. Pipeline failures are
    /// recorded on the job rather than bubbled up; only store errors
    /// propagate.
    pub fn run(
        &self,
        translator: &mut Translator<'_>,
        job_id: &JobId,
    ) -> Result<JobRecord, EngineError> {
        let record = self.jobs.get(job_id)?;
        if record.status.is_terminal() {
            return Ok(record);
        }

        let started = Instant::now();
        self.jobs
            .update_progress(job_id, 0, "starting", None, None)?;

        let jobs = self.jobs;
        let mut externally_cancelled = false;
        let result = translator.translate(
            &record.original_text,
            &record.source_lang,
            &record.target_lang,
            &mut |progress| {
                let stage = match progress.stage {
                    Stage::Primary => format!(
                        "stage 1: chunk {}/{}",
                        progress.current_chunk, progress.total_chunks
                    ),
                    Stage::Refinement => format!(
                        "stage 2: chunk {}/{}",
                        progress.current_chunk, progress.total_chunks
                    ),
                    Stage::Completed => "finishing".to_owned(),
                };
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let pct = progress.percent.round() as u8;
                match jobs.update_progress(
                    job_id,
                    pct,
                    &stage,
                    Some(progress.draft),
                    Some(progress.translated),
                ) {
                    Ok(_) => true,
                    // A DELETE on the API moved the job to cancelled.
                    Err(StoreError::JobFinished(_)) => {
                        externally_cancelled = true;
                        false
                    }
                    Err(e) => {
                        warn!("failed to persist progress: {e}");
                        true
                    }
                }
            },
        );

        match result {
            Ok(outcome) => {
                if outcome.chunk_count > 0 && outcome.failed_chunks == outcome.chunk_count {
                    let record = self
                        .jobs
                        .mark_failed(job_id, "no chunk produced a valid translation")?;
                    return Ok(record);
                }

                let filename = Self::output_filename(&record.filename, &record.target_lang);
                std::fs::create_dir_all(&self.translations_dir)?;
                std::fs::write(self.translations_dir.join(&filename), &outcome.text)?;

                let elapsed = started.elapsed().as_secs_f64();
                let record = self.jobs.mark_completed(
                    job_id,
                    &outcome.text,
                    &filename,
                    outcome.chunk_count,
                    elapsed,
                )?;
                info!(
                    "job {} completed: {} chunks in {elapsed:.1}s",
                    job_id.short(),
                    outcome.chunk_count
                );
                Ok(record)
            }
            Err(EngineError::Cancelled) => {
                if externally_cancelled {
                    return Ok(self.jobs.get(job_id)?);
                }
                match self.jobs.mark_cancelled(job_id) {
                    Ok(record) => Ok(record),
                    Err(StoreError::JobFinished(_)) => Ok(self.jobs.get(job_id)?),
                    Err(e) => Err(e.into()),
                }
            }
            Err(e) => {
                warn!("job {} failed: {e}", job_id.short());
                let record = self.jobs.mark_failed(job_id, &e.to_string())?;
                Ok(record)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Llm;
    use prosetta_config::{CacheConfig, TranslationConfig};
    use prosetta_ollama::OllamaError;
    use prosetta_store::{JobStatus, StoreLayout};
    use std::cell::RefCell;
    use std::collections::VecDeque;

    const ENGLISH_CHUNK: &str = "The old man walked slowly through the quiet village square, \
        and he did not want to speak with anyone about the things that he had seen on the road.";
    const SPANISH_DRAFT: &str = "El viejo caminaba despacio por la plaza tranquila del pueblo, \
        y no quería hablar con nadie sobre las cosas que había visto en el camino.";
    const SPANISH_FINAL: &str = "El anciano caminaba despacio por la plaza tranquila del pueblo, \
        y no quería hablar con nadie de las cosas que había visto en el camino.";

    struct ScriptedLlm(RefCell<VecDeque<Result<String, String>>>);

    impl ScriptedLlm {
        fn new(responses: Vec<Result<&str, &str>>) -> Self {
            Self(RefCell::new(
                responses
                    .into_iter()
                    .map(|r| r.map(str::to_owned).map_err(str::to_owned))
                    .collect(),
            ))
        }
    }

    impl Llm for ScriptedLlm {
        fn generate(&self, _prompt: &str, _model: &str) -> Result<String, OllamaError> {
            match self.0.borrow_mut().pop_front() {
                Some(Ok(text)) => Ok(text),
                Some(Err(e)) => Err(OllamaError::Http(e)),
                None => Err(OllamaError::Http("script exhausted".to_owned())),
            }
        }
    }

    fn translator(llm: &ScriptedLlm) -> Translator<'_> {
        Translator::new(
            llm,
            "testmodel",
            TranslationConfig {
                max_chunk_chars: 4000,
                max_retries: 1,
                retry_delay_secs: 0.0,
                chunk_delay_secs: 0.0,
                similarity_threshold: 0.65,
                min_translation_length: 50,
            },
            CacheConfig {
                enabled: false,
                context_hash_length: 32,
                max_age_days: 30,
            },
            None,
        )
    }

    fn setup() -> (tempfile::TempDir, JobStore, PathBuf) {
        let tmp = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(tmp.path().join("store"));
        layout.initialize().unwrap();
        let translations = tmp.path().join("translations");
        (tmp, JobStore::new(layout), translations)
    }

    fn pending_job(jobs: &JobStore) -> JobRecord {
        let record = JobRecord::new(
            "book.txt",
            "en",
            "es",
            "testmodel",
            ENGLISH_CHUNK.to_owned(),
        );
        jobs.create(&record).unwrap();
        record
    }

    #[test]
    fn output_filename_is_sanitized() {
        assert_eq!(JobRunner::output_filename("book.txt", "es"), "book_es.txt");
        assert_eq!(
            JobRunner::output_filename("../../etc/passwd", "es"),
            "passwd_es.txt"
        );
    }

    #[test]
    fn successful_run_completes_job_and_writes_output() {
        let (_tmp, jobs, translations) = setup();
        let record = pending_job(&jobs);
        let llm = ScriptedLlm::new(vec![Ok(SPANISH_DRAFT), Ok(SPANISH_FINAL)]);

        let runner = JobRunner::new(&jobs, &translations);
        let done = runner.run(&mut translator(&llm), &record.job_id).unwrap();

        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.progress, 100);
        assert_eq!(done.translated_text, SPANISH_FINAL);
        assert_eq!(done.translated_filename.as_deref(), Some("book_es.txt"));
        assert_eq!(done.chunk_count, Some(1));
        assert!(done.processing_time_secs.is_some());

        let written = std::fs::read_to_string(translations.join("book_es.txt")).unwrap();
        assert_eq!(written, SPANISH_FINAL);
    }

    #[test]
    fn all_chunks_failing_marks_job_failed() {
        let (_tmp, jobs, translations) = setup();
        let record = pending_job(&jobs);
        let llm = ScriptedLlm::new(vec![Err("model down")]);

        let runner = JobRunner::new(&jobs, &translations);
        let done = runner.run(&mut translator(&llm), &record.job_id).unwrap();

        assert_eq!(done.status, JobStatus::Failed);
        assert!(done.error_message.is_some());
        assert!(!translations.join("book_es.txt").exists());
    }

    #[test]
    fn terminal_job_is_left_untouched() {
        let (_tmp, jobs, translations) = setup();
        let record = pending_job(&jobs);
        jobs.mark_cancelled(&record.job_id).unwrap();

        let llm = ScriptedLlm::new(vec![]);
        let runner = JobRunner::new(&jobs, &translations);
        let done = runner.run(&mut translator(&llm), &record.job_id).unwrap();
        assert_eq!(done.status, JobStatus::Cancelled);
    }

    #[test]
    fn unsupported_language_fails_the_job() {
        let (_tmp, jobs, translations) = setup();
        let record = JobRecord::new(
            "book.txt",
            "en",
            "tlh",
            "testmodel",
            ENGLISH_CHUNK.to_owned(),
        );
        jobs.create(&record).unwrap();

        let llm = ScriptedLlm::new(vec![]);
        let runner = JobRunner::new(&jobs, &translations);
        let done = runner.run(&mut translator(&llm), &record.job_id).unwrap();
        assert_eq!(done.status, JobStatus::Failed);
        assert!(done.error_message.as_deref().unwrap().contains("tlh"));
    }
}
