//! Normalization and chunk splitting.

use regex::Regex;
use std::sync::LazyLock;

static EXCESS_BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

static SENTENCE_BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)(.*?[.!?])\s+").expect("valid regex"));

/// Normalize line endings to LF, collapse runs of 3+ newlines to a blank line,
/// and trim surrounding whitespace.
pub fn normalize(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");
    EXCESS_BLANK_LINES
        .replace_all(&unified, "\n\n")
        .trim()
        .to_owned()
}

pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Split a paragraph that exceeds `max_chars` on sentence boundaries,
/// packing sentences greedily.
fn split_long_paragraph(paragraph: &str, max_chars: usize, chunks: &mut Vec<String>) {
    let mut sentences: Vec<&str> = Vec::new();
    let mut last_end = 0;
    for cap in SENTENCE_BOUNDARY.captures_iter(paragraph) {
        let m = cap.get(1).expect("group 1 always present");
        sentences.push(m.as_str());
        last_end = cap.get(0).expect("whole match").end();
    }
    if last_end < paragraph.len() {
        sentences.push(&paragraph[last_end..]);
    }

    let mut current: Vec<&str> = Vec::new();
    let mut len = 0;
    for sentence in sentences {
        if len + sentence.len() > max_chars && !current.is_empty() {
            chunks.push(current.join(" "));
            current.clear();
            len = 0;
        }
        len += sentence.len() + 1;
        current.push(sentence);
    }
    if !current.is_empty() {
        chunks.push(current.join(" "));
    }
}

/// Split text into chunks of at most `max_chars` characters, preferring
/// paragraph boundaries and falling back to sentence boundaries for oversized
/// paragraphs. Never returns an empty list for non-empty input.
pub fn split_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut len = 0;

    for paragraph in text.split("\n\n") {
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }

        if paragraph.len() > max_chars {
            if !current.is_empty() {
                chunks.push(current.join("\n\n"));
                current.clear();
                len = 0;
            }
            split_long_paragraph(paragraph, max_chars, &mut chunks);
            continue;
        }

        if len + paragraph.len() + 2 > max_chars && !current.is_empty() {
            chunks.push(current.join("\n\n"));
            current.clear();
            len = 0;
        }
        len += paragraph.len() + 2;
        current.push(paragraph);
    }

    if !current.is_empty() {
        chunks.push(current.join("\n\n"));
    }
    if chunks.is_empty() && !text.is_empty() {
        chunks.push(text.to_owned());
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_unifies_line_endings() {
        assert_eq!(normalize("a\r\nb\rc"), "a\nb\nc");
    }

    #[test]
    fn normalize_collapses_blank_runs() {
        assert_eq!(normalize("a\n\n\n\n\nb"), "a\n\nb");
    }

    #[test]
    fn normalize_trims() {
        assert_eq!(normalize("  text  \n"), "text");
    }

    #[test]
    fn short_text_is_one_chunk() {
        let chunks = split_chunks("Hello world.", 1000);
        assert_eq!(chunks, vec!["Hello world."]);
    }

    #[test]
    fn paragraphs_pack_up_to_limit() {
        let text = "First paragraph here.\n\nSecond paragraph here.\n\nThird paragraph here.";
        let chunks = split_chunks(text, 50);
        assert!(chunks.len() >= 2);
        for chunk in &chunks {
            assert!(chunk.len() <= 50, "chunk over limit: {chunk:?}");
        }
    }

    #[test]
    fn oversized_paragraph_splits_on_sentences() {
        let paragraph = "One sentence goes here. Another sentence follows it. \
                         A third sentence ends the paragraph.";
        let chunks = split_chunks(paragraph, 60);
        assert!(chunks.len() >= 2);
        assert!(chunks[0].starts_with("One sentence"));
    }

    #[test]
    fn blank_paragraphs_are_skipped() {
        let chunks = split_chunks("a\n\n\n\nb", 1000);
        assert_eq!(chunks, vec!["a\n\nb"]);
    }

    #[test]
    fn chunk_boundaries_preserve_all_words() {
        let text = "Alpha beta gamma. Delta epsilon zeta. Eta theta iota.";
        let chunks = split_chunks(text, 25);
        let rejoined = chunks.join(" ");
        for word in ["Alpha", "zeta.", "iota."] {
            assert!(rejoined.contains(word), "lost {word:?} in {chunks:?}");
        }
    }

    #[test]
    fn count_words_handles_whitespace() {
        assert_eq!(count_words("one  two\nthree"), 3);
        assert_eq!(count_words(""), 0);
    }
}
