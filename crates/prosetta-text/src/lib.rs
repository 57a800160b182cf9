//! Text processing for the translation pipeline.
//!
//! Pure functions only: normalization and chunk splitting, scrubbing of LLM
//! response artifacts, marker-based language detection with translation
//! validation, and cross-chunk terminology consistency.

pub mod chunk;
pub mod clean;
pub mod detect;
pub mod terminology;

pub use chunk::{count_words, normalize, split_chunks};
pub use clean::clean_response;
pub use detect::{count_markers, detect_language, is_likely_translated};
pub use terminology::TerminologyManager;
