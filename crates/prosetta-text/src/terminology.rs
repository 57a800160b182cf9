//! Cross-chunk terminology consistency.
//!
//! Per-book state: once a proper noun or recurring term has been translated
//! one way, later chunks must reuse that rendering. The manager records
//! original→translated pairs in first-seen order and exposes a prompt block
//! of the most recent terms.

use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

static CAPITALIZED_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z][a-z]+(?:\s+[A-Z][a-z]+)*\b").expect("valid regex"));

#[derive(Debug, Default)]
pub struct TerminologyManager {
    /// Insertion-ordered (original, translated) pairs.
    terms: Vec<(String, String)>,
    index: HashMap<String, usize>,
    proper_nouns: HashSet<String>,
}

impl TerminologyManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extract capitalized words and multi-word runs that do not open a
    /// sentence. Regex lookbehind is unsupported, so sentence starts are
    /// filtered by inspecting the preceding characters per match.
    pub fn extract_proper_nouns(&mut self, text: &str) -> Vec<String> {
        let mut found = Vec::new();
        for m in CAPITALIZED_RUN.find_iter(text) {
            if at_sentence_start(text, m.start()) {
                continue;
            }
            let noun = m.as_str().to_owned();
            if self.proper_nouns.insert(noun.clone()) {
                found.push(noun);
            }
        }
        found
    }

    pub fn add_term(&mut self, original: &str, translated: &str) {
        if let Some(&i) = self.index.get(original) {
            self.terms[i].1 = translated.to_owned();
        } else {
            self.index.insert(original.to_owned(), self.terms.len());
            self.terms.push((original.to_owned(), translated.to_owned()));
        }
    }

    pub fn get_term(&self, original: &str) -> Option<&str> {
        self.index
            .get(original)
            .map(|&i| self.terms[i].1.as_str())
    }

    /// Rewrite `text` so terms already in the glossary keep their established
    /// translation; unseen terms from `chunk_terms` are recorded.
    pub fn ensure_consistency(
        &mut self,
        text: &str,
        chunk_terms: &[(String, String)],
    ) -> String {
        let mut result = text.to_owned();
        for (original, translated) in chunk_terms {
            match self.get_term(original) {
                Some(established) if established != translated => {
                    let established = established.to_owned();
                    result = result.replace(translated.as_str(), &established);
                }
                Some(_) => {}
                None => self.add_term(original, translated),
            }
        }
        result
    }

    pub fn glossary(&self) -> &[(String, String)] {
        &self.terms
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn clear(&mut self) {
        self.terms.clear();
        self.index.clear();
        self.proper_nouns.clear();
    }

    /// Format the most recent `max_terms` pairs for inclusion in a prompt.
    /// Empty string when no terms are recorded.
    pub fn prompt_context(&self, max_terms: usize) -> String {
        if self.terms.is_empty() {
            return String::new();
        }
        let start = self.terms.len().saturating_sub(max_terms);
        let mut lines = vec!["TERMINOLOGY (use these translations consistently):".to_owned()];
        for (original, translated) in &self.terms[start..] {
            lines.push(format!("  - {original} -> {translated}"));
        }
        lines.join("\n")
    }
}

fn at_sentence_start(text: &str, pos: usize) -> bool {
    let before: Vec<char> = text[..pos]
        .chars()
        .rev()
        .take_while(|c| !c.is_alphanumeric())
        .collect();
    if text[..pos].chars().all(|c| !c.is_alphanumeric()) {
        // Nothing but whitespace/punctuation before: start of text.
        return true;
    }
    before.iter().any(|c| matches!(c, '.' | '!' | '?' | '\n'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_mid_sentence_proper_nouns() {
        let mut tm = TerminologyManager::new();
        let nouns = tm.extract_proper_nouns("He walked with Elizabeth Bennet to Meryton.");
        assert!(nouns.contains(&"Elizabeth Bennet".to_owned()));
        assert!(nouns.contains(&"Meryton".to_owned()));
    }

    #[test]
    fn skips_sentence_initial_words() {
        let mut tm = TerminologyManager::new();
        let nouns = tm.extract_proper_nouns("Darkness fell over the town of Avonlea.");
        assert!(!nouns.contains(&"Darkness".to_owned()));
        assert!(nouns.contains(&"Avonlea".to_owned()));
    }

    #[test]
    fn duplicate_nouns_reported_once() {
        let mut tm = TerminologyManager::new();
        tm.extract_proper_nouns("They met Gandalf near the gate.");
        let second = tm.extract_proper_nouns("Later, Gandalf spoke again.");
        assert!(second.is_empty());
    }

    #[test]
    fn consistency_prefers_established_translation() {
        let mut tm = TerminologyManager::new();
        tm.add_term("Shire", "la Comarca");
        let out = tm.ensure_consistency(
            "Volvieron a el Condado al amanecer.",
            &[("Shire".to_owned(), "el Condado".to_owned())],
        );
        assert_eq!(out, "Volvieron a la Comarca al amanecer.");
    }

    #[test]
    fn new_terms_are_recorded() {
        let mut tm = TerminologyManager::new();
        tm.ensure_consistency(
            "text",
            &[("Rivendell".to_owned(), "Rivendel".to_owned())],
        );
        assert_eq!(tm.get_term("Rivendell"), Some("Rivendel"));
    }

    #[test]
    fn prompt_context_limits_to_recent_terms() {
        let mut tm = TerminologyManager::new();
        for i in 0..30 {
            tm.add_term(&format!("term{i}"), &format!("trans{i}"));
        }
        let ctx = tm.prompt_context(20);
        assert!(!ctx.contains("term9 ->"));
        assert!(ctx.contains("term29 -> trans29"));
        assert!(ctx.starts_with("TERMINOLOGY"));
    }

    #[test]
    fn empty_manager_yields_empty_context() {
        let tm = TerminologyManager::new();
        assert_eq!(tm.prompt_context(20), "");
    }

    #[test]
    fn clear_resets_everything() {
        let mut tm = TerminologyManager::new();
        tm.add_term("a", "b");
        tm.extract_proper_nouns("With Frodo onward.");
        tm.clear();
        assert!(tm.is_empty());
        assert!(tm.get_term("a").is_none());
    }
}
