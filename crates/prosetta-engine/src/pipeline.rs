use crate::{prompts, EngineError};
use prosetta_config::{is_supported_language, CacheConfig, TranslationConfig};
use prosetta_ollama::{OllamaClient, OllamaError};
use prosetta_store::{CacheEntry, CacheStore};
use prosetta_text::{
    clean_response, detect_language, is_likely_translated, normalize, split_chunks,
    TerminologyManager,
};
use tracing::{debug, info, warn};

/// Prefix marking a chunk whose stage-1 translation never validated.
/// Such chunks are kept in the output so the reader sees the gap, but are
/// never cached and never refined.
pub const FAILURE_PREFIX: &str = "[translation failed";

/// Terms carried into each stage-1 prompt.
const PROMPT_TERMS: usize = 10;

/// Abstraction over the LLM backend so the pipeline can be exercised
/// without a live model.
pub trait Llm {
    fn generate(&self, prompt: &str, model: &str) -> Result<String, OllamaError>;
}

impl Llm for OllamaClient {
    fn generate(&self, prompt: &str, model: &str) -> Result<String, OllamaError> {
        OllamaClient::generate(self, prompt, model).map(|g| g.text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Primary,
    Refinement,
    Completed,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary_translation",
            Self::Refinement => "reflection_improvement",
            Self::Completed => "completed",
        }
    }
}

/// Snapshot handed to the progress callback after every chunk. Chunk
/// numbering runs over both stages, so `total_chunks` is twice the split
/// count.
pub struct Progress<'a> {
    pub percent: f64,
    pub stage: Stage,
    pub current_chunk: usize,
    pub total_chunks: usize,
    pub draft: &'a str,
    pub translated: &'a str,
}

#[derive(Debug)]
pub struct TranslationOutcome {
    pub text: String,
    pub draft: String,
    pub chunk_count: usize,
    pub failed_chunks: usize,
}

/// Two-stage chunk translator.
pub struct Translator<'a> {
    llm: &'a dyn Llm,
    model: String,
    translation: TranslationConfig,
    cache_cfg: CacheConfig,
    cache: Option<&'a CacheStore>,
    terminology: TerminologyManager,
}

impl<'a> Translator<'a> {
    pub fn new(
        llm: &'a dyn Llm,
        model: impl Into<String>,
        translation: TranslationConfig,
        cache_cfg: CacheConfig,
        cache: Option<&'a CacheStore>,
    ) -> Self {
        let cache = if cache_cfg.enabled { cache } else { None };
        Self {
            llm,
            model: model.into(),
            translation,
            cache_cfg,
            cache,
            terminology: TerminologyManager::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Resolve `auto` to a detected source language, defaulting to English
    /// when detection finds nothing.
    pub fn resolve_source(text: &str, source_lang: &str) -> String {
        if source_lang != "auto" {
            return source_lang.to_owned();
        }
        match detect_language(text) {
            Some((lang, confidence)) => {
                info!("detected source language {lang} (confidence {confidence:.2})");
                lang.to_owned()
            }
            None => {
                warn!("language detection inconclusive, assuming en");
                "en".to_owned()
            }
        }
    }

    /// Translate `text` from `source_lang` to `target_lang`.
    ///
    /// `on_progress` runs after every chunk of both stages; returning
    /// `false` cancels the run between chunks, as does a pending shutdown
    /// signal.
    pub fn translate(
        &mut self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
        on_progress: &mut dyn FnMut(&Progress<'_>) -> bool,
    ) -> Result<TranslationOutcome, EngineError> {
        if !is_supported_language(target_lang) {
            return Err(EngineError::UnsupportedLanguage(target_lang.to_owned()));
        }
        let source_lang = &Self::resolve_source(text, source_lang);

        let text = normalize(text);
        let chunks = split_chunks(&text, self.translation.max_chunk_chars);
        let total = chunks.len();
        info!("translating {total} chunks, {source_lang} -> {target_lang}");

        // Stage 1: primary translation.
        let mut drafts: Vec<String> = Vec::with_capacity(total);
        let mut failed_chunks = 0;
        for (i, chunk) in chunks.iter().enumerate() {
            self.check_cancelled()?;
            let previous = drafts.last().map_or("", String::as_str);
            let context_hash = self.context_hash(previous);

            let draft = match self.cached(chunk, source_lang, target_lang, "_stage1", &context_hash)
            {
                Some(hit) => hit,
                None => {
                    let draft = self.stage1_chunk(chunk, source_lang, target_lang, previous);
                    if draft.starts_with(FAILURE_PREFIX) {
                        failed_chunks += 1;
                    } else {
                        self.store(
                            chunk,
                            &draft,
                            &draft,
                            source_lang,
                            target_lang,
                            "_stage1",
                            &context_hash,
                        );
                        self.terminology.extract_proper_nouns(chunk);
                    }
                    draft
                }
            };
            drafts.push(draft);

            let joined = drafts.join("\n\n");
            let progress = Progress {
                percent: percent(i + 1, total),
                stage: Stage::Primary,
                current_chunk: i + 1,
                total_chunks: total * 2,
                draft: &joined,
                translated: "",
            };
            if !on_progress(&progress) {
                return Err(EngineError::Cancelled);
            }
            self.pause();
        }

        // Stage 2: editing pass.
        let mut finals: Vec<String> = Vec::with_capacity(total);
        for (i, (chunk, draft)) in chunks.iter().zip(&drafts).enumerate() {
            self.check_cancelled()?;
            let previous = finals.last().map_or("", String::as_str);
            let context_hash = self.context_hash(previous);

            let refined = if draft.starts_with(FAILURE_PREFIX) {
                debug!("chunk {}: stage 1 failed, skipping refinement", i + 1);
                draft.clone()
            } else {
                match self.cached(chunk, source_lang, target_lang, "_stage2", &context_hash) {
                    Some(hit) => hit,
                    None => {
                        let refined =
                            self.stage2_chunk(chunk, draft, source_lang, target_lang);
                        self.store(
                            chunk,
                            &refined,
                            draft,
                            source_lang,
                            target_lang,
                            "_stage2",
                            &context_hash,
                        );
                        refined
                    }
                }
            };
            finals.push(refined);

            let joined_draft = drafts.join("\n\n");
            let joined_final = finals.join("\n\n");
            let progress = Progress {
                percent: percent(total + i + 1, total),
                stage: Stage::Refinement,
                current_chunk: total + i + 1,
                total_chunks: total * 2,
                draft: &joined_draft,
                translated: &joined_final,
            };
            if !on_progress(&progress) {
                return Err(EngineError::Cancelled);
            }
            self.pause();
        }

        let draft = drafts.join("\n\n");
        let final_text = finals.join("\n\n");
        info!(
            "translation complete: {total} chunks, {} -> {} chars",
            text.len(),
            final_text.len()
        );
        let progress = Progress {
            percent: 100.0,
            stage: Stage::Completed,
            current_chunk: total * 2,
            total_chunks: total * 2,
            draft: &draft,
            translated: &final_text,
        };
        if !on_progress(&progress) {
            return Err(EngineError::Cancelled);
        }

        Ok(TranslationOutcome {
            text: final_text,
            draft,
            chunk_count: total,
            failed_chunks,
        })
    }

    /// One stage-1 chunk with retries. Exhaustion yields the failure
    /// placeholder rather than an error, so one bad chunk cannot sink a
    /// whole book.
    fn stage1_chunk(
        &self,
        chunk: &str,
        source_lang: &str,
        target_lang: &str,
        previous_draft: &str,
    ) -> String {
        let terminology_block = self.terminology.prompt_context(PROMPT_TERMS);
        let prompt = prompts::stage1(
            chunk,
            source_lang,
            target_lang,
            previous_draft,
            &terminology_block,
        );

        for attempt in 0..self.translation.max_retries {
            match self.llm.generate(&prompt, &self.model) {
                Ok(raw) => {
                    let cleaned = clean_response(&raw, previous_draft);
                    if is_likely_translated(
                        chunk,
                        &cleaned,
                        source_lang,
                        target_lang,
                        self.translation.similarity_threshold,
                    ) {
                        return cleaned;
                    }
                    warn!("stage 1 validation failed (attempt {})", attempt + 1);
                }
                Err(e) => warn!("stage 1 generation failed (attempt {}): {e}", attempt + 1),
            }
            if attempt + 1 < self.translation.max_retries {
                std::thread::sleep(self.translation.retry_delay(attempt));
            }
        }
        failure_placeholder(chunk)
    }

    /// One stage-2 chunk. Any failure falls back to the draft.
    fn stage2_chunk(
        &self,
        original: &str,
        draft: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> String {
        let prompt = prompts::stage2(original, draft, source_lang, target_lang);

        for attempt in 0..self.translation.max_retries {
            match self.llm.generate(&prompt, &self.model) {
                Ok(raw) => {
                    let cleaned = clean_response(&raw, "");
                    if is_likely_translated(
                        original,
                        &cleaned,
                        source_lang,
                        target_lang,
                        self.translation.similarity_threshold,
                    ) {
                        return cleaned;
                    }
                    warn!("stage 2 validation failed, keeping draft");
                    return draft.to_owned();
                }
                Err(e) => warn!("stage 2 generation failed (attempt {}): {e}", attempt + 1),
            }
            if attempt + 1 < self.translation.max_retries {
                std::thread::sleep(self.translation.retry_delay(attempt));
            }
        }
        draft.to_owned()
    }

    /// Cache key context: a truncated hash of the previous accepted chunk,
    /// so an identical sentence in a different position misses.
    fn context_hash(&self, previous: &str) -> String {
        if previous.is_empty() {
            return String::new();
        }
        let hex = blake3::hash(previous.as_bytes()).to_hex().to_string();
        let len = self.cache_cfg.context_hash_length.min(hex.len());
        hex[..len].to_owned()
    }

    /// Cache lookup with revalidation. Stale validator rules or a poisoned
    /// entry must not resurface, so every hit is re-checked.
    fn cached(
        &self,
        chunk: &str,
        source_lang: &str,
        target_lang: &str,
        stage_suffix: &str,
        context_hash: &str,
    ) -> Option<String> {
        let cache = self.cache?;
        let key = CacheStore::key(
            chunk,
            source_lang,
            target_lang,
            &format!("{}{stage_suffix}", self.model),
            context_hash,
        );
        let entry = match cache.get(&key) {
            Ok(hit) => hit?,
            Err(e) => {
                warn!("cache lookup failed: {e}");
                return None;
            }
        };
        let text = if stage_suffix == "_stage1" && !entry.draft_translation.is_empty() {
            entry.draft_translation
        } else {
            entry.translated_text
        };
        if text.starts_with(FAILURE_PREFIX) {
            return None;
        }
        if !is_likely_translated(
            chunk,
            &text,
            source_lang,
            target_lang,
            self.translation.similarity_threshold,
        ) {
            return None;
        }
        debug!("cache hit for chunk ({} chars)", text.len());
        Some(text)
    }

    fn store(
        &self,
        chunk: &str,
        translated: &str,
        draft: &str,
        source_lang: &str,
        target_lang: &str,
        stage_suffix: &str,
        context_hash: &str,
    ) {
        let Some(cache) = self.cache else { return };
        let model = format!("{}{stage_suffix}", self.model);
        let key = CacheStore::key(chunk, source_lang, target_lang, &model, context_hash);
        let now = prosetta_store::now_rfc3339();
        let entry = CacheEntry {
            source_lang: source_lang.to_owned(),
            target_lang: target_lang.to_owned(),
            original_text: chunk.to_owned(),
            translated_text: translated.to_owned(),
            draft_translation: draft.to_owned(),
            model,
            created_at: now.clone(),
            last_used: now,
        };
        if let Err(e) = cache.put(&key, &entry) {
            warn!("cache write failed: {e}");
        }
    }

    fn check_cancelled(&self) -> Result<(), EngineError> {
        if crate::shutdown_requested() {
            return Err(EngineError::Cancelled);
        }
        Ok(())
    }

    fn pause(&self) {
        if let Some(delay) = self.translation.chunk_delay() {
            std::thread::sleep(delay);
        }
    }
}

fn percent(done: usize, total: usize) -> f64 {
    if total == 0 {
        return 100.0;
    }
    (done as f64 / (total * 2) as f64) * 100.0
}

fn failure_placeholder(chunk: &str) -> String {
    let preview: String = chunk.chars().take(50).collect();
    format!("{FAILURE_PREFIX}: {preview}...]")
}
