//! Typed configuration sections populated from environment variables.
//!
//! Malformed values fall back to the documented default rather than aborting;
//! structurally invalid combinations (e.g. a zero chunk length) are caught by
//! [`Config::validate`].

use crate::ConfigError;
use serde::Serialize;
use std::time::Duration;

/// Lookup seam so tests can supply variables without touching process env.
pub type EnvLookup<'a> = &'a dyn Fn(&str) -> Option<String>;

fn get_str(lookup: EnvLookup<'_>, key: &str, default: &str) -> String {
    lookup(key).unwrap_or_else(|| default.to_owned())
}

fn get_bool(lookup: EnvLookup<'_>, key: &str, default: bool) -> bool {
    match lookup(key).as_deref().map(str::to_ascii_lowercase).as_deref() {
        Some("true" | "1" | "yes" | "on") => true,
        Some("false" | "0" | "no" | "off") => false,
        _ => default,
    }
}

fn get_u64(lookup: EnvLookup<'_>, key: &str, default: u64) -> u64 {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn get_f64(lookup: EnvLookup<'_>, key: &str, default: f64) -> f64 {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: usize,
    /// Empty string disables API-key auth.
    #[serde(skip_serializing)]
    pub api_key: String,
}

impl ServerConfig {
    fn from_lookup(lookup: EnvLookup<'_>) -> Self {
        Self {
            host: get_str(lookup, "PROSETTA_HOST", "127.0.0.1"),
            port: get_u64(lookup, "PROSETTA_PORT", 5001) as u16,
            workers: get_u64(lookup, "PROSETTA_WORKERS", 4) as usize,
            api_key: get_str(lookup, "PROSETTA_API_KEY", ""),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Upstream Ollama inference server settings.
#[derive(Debug, Clone, Serialize)]
pub struct OllamaConfig {
    pub base_url: String,
    pub default_model: String,
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
    pub health_timeout_secs: u64,
    pub temperature: f64,
    pub top_p: f64,
}

impl OllamaConfig {
    fn from_lookup(lookup: EnvLookup<'_>) -> Self {
        Self {
            base_url: get_str(lookup, "OLLAMA_BASE_URL", "http://localhost:11434")
                .trim_end_matches('/')
                .to_owned(),
            default_model: get_str(lookup, "OLLAMA_DEFAULT_MODEL", "llama3.3:70b-instruct-q2_K"),
            connect_timeout_secs: get_u64(lookup, "OLLAMA_CONNECT_TIMEOUT", 30),
            read_timeout_secs: get_u64(lookup, "OLLAMA_READ_TIMEOUT", 300),
            health_timeout_secs: get_u64(lookup, "OLLAMA_HEALTH_TIMEOUT", 5),
            temperature: get_f64(lookup, "OLLAMA_TEMPERATURE", 0.3),
            top_p: get_f64(lookup, "OLLAMA_TOP_P", 0.9),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_secs(self.health_timeout_secs)
    }
}

/// Translation pipeline tuning.
#[derive(Debug, Clone, Serialize)]
pub struct TranslationConfig {
    /// Maximum characters per chunk sent to the model.
    pub max_chunk_chars: usize,
    pub max_retries: u32,
    pub retry_delay_secs: f64,
    /// Pause between chunks; zero disables.
    pub chunk_delay_secs: f64,
    /// Word-overlap ratio above which output is considered untranslated.
    pub similarity_threshold: f64,
    pub min_translation_length: usize,
}

impl TranslationConfig {
    fn from_lookup(lookup: EnvLookup<'_>) -> Self {
        Self {
            max_chunk_chars: get_u64(lookup, "MAX_PROMPT_LENGTH", 4000) as usize,
            max_retries: get_u64(lookup, "MAX_RETRIES", 3) as u32,
            retry_delay_secs: get_f64(lookup, "RETRY_DELAY", 1.0),
            chunk_delay_secs: get_f64(lookup, "CHUNK_DELAY", 0.3),
            similarity_threshold: get_f64(lookup, "SIMILARITY_THRESHOLD", 0.65),
            min_translation_length: get_u64(lookup, "MIN_TRANSLATION_LENGTH", 50) as usize,
        }
    }

    pub fn retry_delay(&self, attempt: u32) -> Duration {
        Duration::from_secs_f64(self.retry_delay_secs * f64::from(attempt + 1))
    }

    pub fn chunk_delay(&self) -> Option<Duration> {
        if self.chunk_delay_secs > 0.0 {
            Some(Duration::from_secs_f64(self.chunk_delay_secs))
        } else {
            None
        }
    }
}

/// Translation cache settings.
#[derive(Debug, Clone, Serialize)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Hex chars of the previous-chunk hash mixed into cache keys.
    pub context_hash_length: usize,
    pub max_age_days: u32,
}

impl CacheConfig {
    fn from_lookup(lookup: EnvLookup<'_>) -> Self {
        Self {
            enabled: get_bool(lookup, "CACHE_ENABLED", true),
            context_hash_length: get_u64(lookup, "CACHE_CONTEXT_HASH_LENGTH", 32) as usize,
            max_age_days: get_u64(lookup, "CACHE_MAX_AGE_DAYS", 30) as u32,
        }
    }
}

/// Upload limits.
#[derive(Debug, Clone, Serialize)]
pub struct FileConfig {
    pub max_file_size_mb: u64,
    pub allowed_extensions: Vec<String>,
}

impl FileConfig {
    fn from_lookup(lookup: EnvLookup<'_>) -> Self {
        Self {
            max_file_size_mb: get_u64(lookup, "MAX_FILE_SIZE_MB", 10),
            allowed_extensions: vec![".txt".to_owned()],
        }
    }

    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb * 1024 * 1024
    }

    pub fn extension_allowed(&self, filename: &str) -> bool {
        let lower = filename.to_ascii_lowercase();
        self.allowed_extensions.iter().any(|ext| lower.ends_with(ext))
    }
}

/// Aggregated application configuration.
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub ollama: OllamaConfig,
    pub translation: TranslationConfig,
    pub cache: CacheConfig,
    pub file: FileConfig,
}

impl Config {
    /// Build from the process environment and validate.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: EnvLookup<'_>) -> Result<Self, ConfigError> {
        let config = Self {
            server: ServerConfig::from_lookup(lookup),
            ollama: OllamaConfig::from_lookup(lookup),
            translation: TranslationConfig::from_lookup(lookup),
            cache: CacheConfig::from_lookup(lookup),
            file: FileConfig::from_lookup(lookup),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.translation.max_chunk_chars < 100 {
            return Err(ConfigError::Invalid(
                "MAX_PROMPT_LENGTH must be at least 100".to_owned(),
            ));
        }
        if !(0.0..=1.0).contains(&self.translation.similarity_threshold) {
            return Err(ConfigError::Invalid(
                "SIMILARITY_THRESHOLD must be between 0 and 1".to_owned(),
            ));
        }
        if self.file.max_file_size_mb < 1 {
            return Err(ConfigError::Invalid(
                "MAX_FILE_SIZE_MB must be at least 1".to_owned(),
            ));
        }
        if self.server.workers == 0 {
            return Err(ConfigError::Invalid(
                "PROSETTA_WORKERS must be at least 1".to_owned(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    fn config_with(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map = lookup_from(pairs);
        Config::from_lookup(&|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = config_with(&[]).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 5001);
        assert_eq!(config.ollama.base_url, "http://localhost:11434");
        assert_eq!(config.translation.max_chunk_chars, 4000);
        assert_eq!(config.translation.max_retries, 3);
        assert!(config.cache.enabled);
        assert_eq!(config.cache.max_age_days, 30);
        assert_eq!(config.file.max_file_size_mb, 10);
    }

    #[test]
    fn env_overrides_apply() {
        let config = config_with(&[
            ("PROSETTA_HOST", "0.0.0.0"),
            ("PROSETTA_PORT", "8080"),
            ("OLLAMA_BASE_URL", "http://gpu-box:11434/"),
            ("CACHE_ENABLED", "off"),
        ])
        .unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        // trailing slash stripped
        assert_eq!(config.ollama.base_url, "http://gpu-box:11434");
        assert!(!config.cache.enabled);
    }

    #[test]
    fn malformed_values_fall_back_to_defaults() {
        let config = config_with(&[
            ("PROSETTA_PORT", "not-a-port"),
            ("OLLAMA_TEMPERATURE", "hot"),
            ("CACHE_ENABLED", "maybe"),
        ])
        .unwrap();
        assert_eq!(config.server.port, 5001);
        assert!((config.ollama.temperature - 0.3).abs() < f64::EPSILON);
        assert!(config.cache.enabled);
    }

    #[test]
    fn validation_rejects_tiny_chunks() {
        let err = config_with(&[("MAX_PROMPT_LENGTH", "10")]).unwrap_err();
        assert!(err.to_string().contains("MAX_PROMPT_LENGTH"));
    }

    #[test]
    fn validation_rejects_out_of_range_threshold() {
        assert!(config_with(&[("SIMILARITY_THRESHOLD", "1.5")]).is_err());
    }

    #[test]
    fn retry_delay_scales_linearly() {
        let config = config_with(&[]).unwrap();
        assert_eq!(config.translation.retry_delay(0), Duration::from_secs(1));
        assert_eq!(config.translation.retry_delay(2), Duration::from_secs(3));
    }

    #[test]
    fn zero_chunk_delay_disables_pause() {
        let config = config_with(&[("CHUNK_DELAY", "0")]).unwrap();
        assert!(config.translation.chunk_delay().is_none());
    }

    #[test]
    fn extension_check_is_case_insensitive() {
        let config = config_with(&[]).unwrap();
        assert!(config.file.extension_allowed("Book.TXT"));
        assert!(!config.file.extension_allowed("book.pdf"));
    }
}
