//! Marker-based language detection and translation validation.
//!
//! A local model will sometimes return the source text unchanged, answer in
//! the wrong language, or echo the prompt. Rather than trusting the model,
//! each output is checked against small per-language marker tables: frequent
//! function words for space-separated scripts, frequent characters for
//! zh/ja/ko.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerKind {
    /// Space-padded word markers; matched against ` text `.
    Word,
    /// Character/particle markers for scripts without word spacing.
    Character,
}

pub struct MarkerTable {
    pub lang: &'static str,
    pub kind: MarkerKind,
    pub markers: &'static [&'static str],
    /// Minimum hits before a detection counts.
    pub min_markers: usize,
}

#[rustfmt::skip]
pub const MARKER_TABLES: &[MarkerTable] = &[
    MarkerTable {
        lang: "en", kind: MarkerKind::Word, min_markers: 3,
        markers: &[
            " the ", " a ", " an ", " this ", " that ", " these ", " those ",
            " i ", " you ", " he ", " she ", " it ", " we ", " they ",
            " is ", " are ", " was ", " were ", " be ", " been ",
            " have ", " has ", " had ", " do ", " does ", " did ",
            " will ", " would ", " should ", " can ", " could ",
            " said ", " went ", " came ", " thought ", " looked ",
            " in ", " on ", " at ", " by ", " for ", " with ", " from ",
            " and ", " but ", " or ", " because ", " while ", " when ",
            " not ", " very ", " just ", " also ", " there ", " here ",
            " of the ", " to the ", " in the ", " and the ",
        ],
    },
    MarkerTable {
        lang: "es", kind: MarkerKind::Word, min_markers: 3,
        markers: &[
            " el ", " la ", " los ", " las ", " un ", " una ", " unos ", " unas ",
            " de ", " del ", " al ", " en ", " con ", " por ", " para ", " sin ",
            " yo ", " él ", " ella ", " usted ", " nosotros ", " ellos ",
            " que ", " quien ", " donde ", " como ", " cuando ",
            " es ", " son ", " era ", " fue ", " ser ", " está ", " están ",
            " ha ", " han ", " había ", " tiene ", " tenía ",
            " y ", " o ", " pero ", " sino ", " aunque ", " porque ",
            " no ", " sí ", " muy ", " más ", " menos ",
            " de la ", " de los ", " en el ", " en la ",
        ],
    },
    MarkerTable {
        lang: "fr", kind: MarkerKind::Word, min_markers: 3,
        markers: &[
            " le ", " la ", " les ", " un ", " une ", " des ", " du ",
            " l'", " d'", " n'", " s'", " c'", " j'", " qu'",
            " de ", " à ", " en ", " dans ", " sur ", " avec ", " sans ",
            " je ", " tu ", " il ", " elle ", " nous ", " vous ", " ils ",
            " est ", " sont ", " était ", " être ", " été ",
            " et ", " ou ", " mais ", " donc ", " car ",
            " ne ", " pas ", " plus ", " jamais ",
        ],
    },
    MarkerTable {
        lang: "de", kind: MarkerKind::Word, min_markers: 3,
        markers: &[
            " der ", " die ", " das ", " den ", " dem ", " des ",
            " ein ", " eine ", " einen ", " einem ", " einer ",
            " in ", " an ", " auf ", " für ", " mit ", " von ", " zu ",
            " ich ", " du ", " er ", " sie ", " es ", " wir ", " ihr ",
            " ist ", " sind ", " war ", " waren ", " sein ",
            " hat ", " haben ", " hatte ", " hatten ",
            " und ", " oder ", " aber ", " weil ", " dass ",
            " nicht ", " auch ", " nur ", " noch ", " sehr ",
        ],
    },
    MarkerTable {
        lang: "it", kind: MarkerKind::Word, min_markers: 3,
        markers: &[
            " il ", " lo ", " la ", " i ", " gli ", " le ",
            " un ", " uno ", " una ", " del ", " della ",
            " l'", " d'", " c'",
            " di ", " da ", " in ", " con ", " su ", " per ", " tra ",
            " io ", " tu ", " lui ", " lei ", " noi ", " voi ", " loro ",
            " è ", " sono ", " era ", " erano ", " essere ", " stato ",
            " e ", " o ", " ma ", " però ", " perché ", " quando ",
            " non ", " molto ", " più ", " meno ",
        ],
    },
    MarkerTable {
        lang: "pt", kind: MarkerKind::Word, min_markers: 3,
        markers: &[
            " o ", " a ", " os ", " as ", " um ", " uma ",
            " do ", " da ", " dos ", " das ", " no ", " na ",
            " de ", " em ", " com ", " por ", " para ", " sem ",
            " eu ", " ele ", " ela ", " você ", " nós ", " eles ",
            " é ", " são ", " era ", " foi ", " ser ", " sido ",
            " e ", " ou ", " mas ", " porém ", " porque ",
            " não ", " sim ", " muito ", " mais ", " menos ",
        ],
    },
    MarkerTable {
        lang: "ru", kind: MarkerKind::Word, min_markers: 3,
        markers: &[
            " в ", " на ", " с ", " к ", " у ", " о ", " за ", " из ", " по ",
            " я ", " ты ", " он ", " она ", " оно ", " мы ", " вы ", " они ",
            " это ", " этот ", " эта ", " эти ", " тот ",
            " был ", " была ", " было ", " были ", " есть ", " будет ",
            " и ", " а ", " но ", " или ", " да ", " же ", " ли ",
            " не ", " ещё ", " уже ", " очень ", " так ", " как ",
        ],
    },
    MarkerTable {
        lang: "zh", kind: MarkerKind::Character, min_markers: 5,
        markers: &[
            "的", "了", "是", "在", "有", "和", "与", "或", "但", "而",
            "我", "你", "他", "她", "它", "们", "这", "那",
            "不", "也", "都", "就", "还", "很", "着", "过",
            "因为", "所以", "但是", "如果",
        ],
    },
    MarkerTable {
        lang: "ja", kind: MarkerKind::Character, min_markers: 5,
        markers: &[
            "の", "は", "が", "を", "に", "で", "と", "も", "や", "か",
            "です", "ます", "でした", "ました", "である",
            "ない", "ある", "いる", "いた",
            "この", "その", "あの", "これ", "それ",
            "という", "として", "について",
        ],
    },
    MarkerTable {
        lang: "ko", kind: MarkerKind::Character, min_markers: 5,
        markers: &[
            "은", "는", "이", "가", "을", "를", "의", "에", "에서", "로",
            "이다", "입니다", "예요", "였다",
            "하다", "합니다", "했다", "하는",
            "있다", "있습니다", "없다",
            "그리고", "그러나", "하지만", "그래서",
        ],
    },
];

fn table_for(lang: &str) -> Option<&'static MarkerTable> {
    MARKER_TABLES.iter().find(|t| t.lang == lang)
}

fn is_cjk(lang: &str) -> bool {
    matches!(lang, "zh" | "ja" | "ko")
}

fn count_occurrences(haystack: &str, needle: &str) -> usize {
    haystack.matches(needle).count()
}

/// Count marker occurrences of `lang` in `text`.
/// Returns `(count, ratio)` where ratio is hits per word (or per char for
/// character-marker languages). Unknown languages count zero.
pub fn count_markers(text: &str, lang: &str) -> (usize, f64) {
    let Some(table) = table_for(lang) else {
        return (0, 0.0);
    };

    let lower = text.to_lowercase();
    let padded;
    let subject = match table.kind {
        MarkerKind::Word => {
            padded = format!(" {lower} ");
            padded.as_str()
        }
        MarkerKind::Character => lower.as_str(),
    };

    let count: usize = table
        .markers
        .iter()
        .map(|m| count_occurrences(subject, m))
        .sum();

    let denominator = match table.kind {
        MarkerKind::Word => text.split_whitespace().count(),
        MarkerKind::Character => text.chars().count(),
    };
    let ratio = count as f64 / denominator.max(1) as f64;
    (count, ratio)
}

/// Detect the most likely language of `text` among the supported set.
/// Returns `(language, confidence)` with confidence in `[0, 1]`, or `None`
/// when no language reaches its marker floor.
pub fn detect_language(text: &str) -> Option<(&'static str, f64)> {
    let mut best: Option<(&'static str, f64)> = None;
    for table in MARKER_TABLES {
        let (count, ratio) = count_markers(text, table.lang);
        if count < table.min_markers {
            continue;
        }
        let score = count as f64 * (1.0 + ratio);
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((table.lang, score));
        }
    }
    best.map(|(lang, score)| (lang, (score / 50.0).min(1.0)))
}

/// Decide whether `translated` plausibly is a translation of `original`.
///
/// Heuristic, biased towards acceptance: same-language requests and very
/// short outputs pass unconditionally. Rejection happens when the output is
/// the input verbatim, shares too many words with it, still reads as the
/// source language, or shows no trace of the target language.
pub fn is_likely_translated(
    original: &str,
    translated: &str,
    source_lang: &str,
    target_lang: &str,
    similarity_threshold: f64,
) -> bool {
    if original.is_empty() || translated.is_empty() {
        return false;
    }
    if source_lang == target_lang {
        return true;
    }
    if translated.len() < 50 {
        return true;
    }

    let orig_norm = original.to_lowercase();
    let orig_norm = orig_norm.split_whitespace().collect::<Vec<_>>().join(" ");
    let trans_norm = translated.to_lowercase();
    let trans_norm = trans_norm.split_whitespace().collect::<Vec<_>>().join(" ");
    if orig_norm == trans_norm {
        return false;
    }

    if !is_cjk(source_lang) {
        let orig_words: std::collections::HashSet<&str> = orig_norm.split(' ').collect();
        let trans_words: std::collections::HashSet<&str> = trans_norm.split(' ').collect();
        if !orig_words.is_empty() {
            let common = orig_words.intersection(&trans_words).count();
            let similarity = common as f64 / orig_words.len() as f64;
            if similarity > similarity_threshold {
                return false;
            }
        }
    }

    // Residual source-language markers in the output mean the model likely
    // copied instead of translating.
    if let Some(table) = table_for(source_lang) {
        let (source_count, _) = count_markers(translated, source_lang);
        let unit_count = match table.kind {
            MarkerKind::Word => translated.split_whitespace().count(),
            MarkerKind::Character => translated.chars().count(),
        };
        let threshold = match table.kind {
            MarkerKind::Word => (table.min_markers + 3).max((unit_count / 12).min(10)),
            MarkerKind::Character => (table.min_markers + 4).max((unit_count / 25).min(15)),
        };
        if source_count > threshold {
            return false;
        }
    }

    if let Some(table) = table_for(target_lang) {
        let (target_count, _) = count_markers(translated, target_lang);
        if target_count < table.min_markers && translated.len() > 100 {
            return false;
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENGLISH: &str = "It was the best of times, it was the worst of times, it was the \
        age of wisdom, it was the age of foolishness, and we had everything before us.";

    const SPANISH: &str = "Era el mejor de los tiempos, era el peor de los tiempos, la edad \
        de la sabiduría y también de la locura, y teníamos todo por delante en la vida.";

    #[test]
    fn detects_english() {
        let (lang, confidence) = detect_language(ENGLISH).unwrap();
        assert_eq!(lang, "en");
        assert!(confidence > 0.0);
    }

    #[test]
    fn detects_spanish() {
        let (lang, _) = detect_language(SPANISH).unwrap();
        assert_eq!(lang, "es");
    }

    #[test]
    fn detects_japanese_characters() {
        let text = "これはテストです。猫は家の中にいます。それは良いことだと思います。";
        let (lang, _) = detect_language(text).unwrap();
        assert_eq!(lang, "ja");
    }

    #[test]
    fn no_detection_for_marker_free_text() {
        assert!(detect_language("zzz qqq xxx").is_none());
    }

    #[test]
    fn accepts_real_translation() {
        assert!(is_likely_translated(ENGLISH, SPANISH, "en", "es", 0.65));
    }

    #[test]
    fn rejects_unchanged_output() {
        assert!(!is_likely_translated(ENGLISH, ENGLISH, "en", "es", 0.65));
    }

    #[test]
    fn rejects_output_still_in_source_language() {
        let still_english = "And then the man said that he would go to the house because \
            it was the only place where they could find what was needed for the journey.";
        assert!(!is_likely_translated(ENGLISH, still_english, "en", "es", 0.65));
    }

    #[test]
    fn accepts_short_outputs_unconditionally() {
        assert!(is_likely_translated("Hello there.", "Hola.", "en", "es", 0.65));
    }

    #[test]
    fn same_language_request_always_passes() {
        assert!(is_likely_translated(ENGLISH, ENGLISH, "en", "en", 0.65));
    }

    #[test]
    fn rejects_empty_output() {
        assert!(!is_likely_translated(ENGLISH, "", "en", "es", 0.65));
    }

    #[test]
    fn marker_count_is_zero_for_unknown_language() {
        assert_eq!(count_markers(ENGLISH, "tlh"), (0, 0.0));
    }
}
