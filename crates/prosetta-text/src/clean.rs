//! Scrubbing of LLM response artifacts.
//!
//! Models routinely echo instructions, prepend "Here is the translation:",
//! wrap output in quotes, or emit `<think>` reasoning blocks. The pipeline
//! demands translation text only, so everything recognizable as chatter is
//! stripped before validation.

use regex::Regex;
use std::sync::LazyLock;

static THINK_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<think>.*?</think>").expect("valid regex"));

static UNWANTED_PREFIXES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?im)^\s*here is the translation:?\s*\n*",
        r"(?im)^\s*here's the translation:?\s*\n*",
        r"(?im)^\s*translation:?\s*\n*",
        r"(?im)^\s*translated text:?\s*\n*",
        r"(?im)^\s*\*\*translation:?\*\*\s*\n*",
        r"(?im)^\s*improved translation:?\s*\n*",
        r"(?im)^\s*final translation:?\s*\n*",
        r"(?im)^\s*---+\s*\n*",
        r"(?im)^\s*TEXT TO TRANSLATE:.*\n*",
        r"(?im)^\s*OUTPUT \(.*\):\s*\n*",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid regex"))
    .collect()
});

fn strip_wrapping_quotes(text: &str) -> &str {
    for (open, close) in [('"', '"'), ('\'', '\''), ('\u{201c}', '\u{201d}')] {
        if text.len() >= 2 && text.starts_with(open) && text.ends_with(close) {
            return &text[open.len_utf8()..text.len() - close.len_utf8()];
        }
    }
    text
}

/// Clean a raw model response down to translation text.
///
/// `previous_tail` is the already-translated previous chunk; when the model
/// re-emits its ending (a common continuity failure), the repetition is cut.
pub fn clean_response(raw: &str, previous_tail: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }

    let mut text = THINK_BLOCK.replace_all(raw.trim(), "").trim().to_owned();

    for pattern in UNWANTED_PREFIXES.iter() {
        text = pattern.replace_all(&text, "").into_owned();
    }
    let mut text = strip_wrapping_quotes(text.trim()).trim().to_owned();

    if previous_tail.len() > 50 {
        let tail_start = previous_tail.len().saturating_sub(100);
        // Slice on a char boundary near the 100-char tail window.
        let mut start = tail_start;
        while !previous_tail.is_char_boundary(start) {
            start += 1;
        }
        let tail = previous_tail[start..].trim();
        if !tail.is_empty() {
            if let Some(rest) = text.strip_prefix(tail) {
                text = rest.trim().to_owned();
            }
        }
    }

    text
}
