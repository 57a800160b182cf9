//! Two-stage translation pipeline.
//!
//! Stage 1 produces a primary translation chunk by chunk; stage 2 runs an
//! editing pass over each draft. Both stages go through the cache and the
//! marker-based validator, so a flaky model never silently corrupts output.

pub mod concurrency;
pub mod pipeline;
pub mod prompts;
pub mod runner;

pub use concurrency::{install_signal_handler, shutdown_requested};
pub use pipeline::{Llm, Progress, Stage, TranslationOutcome, Translator};
pub use runner::JobRunner;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Ollama(#[from] prosetta_ollama::OllamaError),
    #[error(transparent)]
    Store(#[from] prosetta_store::StoreError),
    #[error(transparent)]
    Config(#[from] prosetta_config::ConfigError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("translation cancelled")]
    Cancelled,
    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),
}
