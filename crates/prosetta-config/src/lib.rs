//! Configuration layer for Prosetta.
//!
//! All runtime-tunable values come from environment variables with documented
//! defaults; nothing is baked into the binary. `Config::from_env()` reads the
//! process environment, `Config::from_lookup()` takes an arbitrary lookup
//! function so tests never have to mutate global env state.

pub mod languages;
pub mod paths;
pub mod settings;

pub use languages::{is_supported_language, language_name, SUPPORTED_LANGUAGES};
pub use paths::Paths;
pub use settings::{
    CacheConfig, Config, FileConfig, OllamaConfig, ServerConfig, TranslationConfig,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Validate an Ollama model name: alphanumeric plus `.`, `_`, `:`, `-`.
pub fn validate_model_name(name: &str) -> Result<(), ConfigError> {
    if name.is_empty() {
        return Err(ConfigError::Invalid("model name must not be empty".to_owned()));
    }
    if !name
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b':' | b'-'))
    {
        return Err(ConfigError::Invalid(format!(
            "model name '{name}' must match [a-zA-Z0-9._:-]"
        )));
    }
    Ok(())
}

/// Sanitize an uploaded filename down to its final path component, with only
/// conservative characters. Returns `None` when nothing safe remains.
pub fn sanitize_filename(raw: &str) -> Option<String> {
    let base = raw.rsplit(['/', '\\']).next()?;
    let cleaned: String = base
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | ' '))
        .collect();
    let cleaned = cleaned.trim().replace(' ', "_");
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        None
    } else {
        Some(cleaned)
    }
}
