//! Supported translation languages.

/// Language codes and display names the pipeline accepts as targets.
/// Sources additionally accept `auto` (marker-based detection).
pub const SUPPORTED_LANGUAGES: &[(&str, &str)] = &[
    ("en", "English"),
    ("es", "Spanish"),
    ("fr", "French"),
    ("de", "German"),
    ("it", "Italian"),
    ("pt", "Portuguese"),
    ("ru", "Russian"),
    ("zh", "Chinese"),
    ("ja", "Japanese"),
    ("ko", "Korean"),
];

pub fn is_supported_language(code: &str) -> bool {
    SUPPORTED_LANGUAGES.iter().any(|(c, _)| *c == code)
}

pub fn language_name(code: &str) -> Option<&'static str> {
    SUPPORTED_LANGUAGES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_resolve() {
        assert!(is_supported_language("es"));
        assert_eq!(language_name("ja"), Some("Japanese"));
    }

    #[test]
    fn unknown_codes_rejected() {
        assert!(!is_supported_language("tlh"));
        assert!(language_name("auto").is_none());
    }
}
