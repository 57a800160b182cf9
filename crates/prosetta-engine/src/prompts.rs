//! Prompt construction for both pipeline stages.
//!
//! The wording is deliberately rigid: local models follow numbered rules
//! far more reliably than prose instructions, and the "OUTPUT" trailer cuts
//! down on chatty preambles that the response cleaner would otherwise have
//! to strip.

use prosetta_config::language_name;

/// Longest tail of the previous draft carried into the next prompt.
pub const CONTEXT_TAIL_CHARS: usize = 200;

fn display(lang: &str) -> &str {
    language_name(lang).unwrap_or(lang)
}

/// Take the last `max` characters of `text` on a char boundary.
pub fn context_tail(text: &str, max: usize) -> &str {
    if text.chars().count() <= max {
        return text;
    }
    let start = text
        .char_indices()
        .rev()
        .nth(max - 1)
        .map_or(0, |(i, _)| i);
    &text[start..]
}

/// Stage 1: primary translation. Carries the tail of the previous draft for
/// continuity and the current terminology block.
pub fn stage1(
    text: &str,
    source_lang: &str,
    target_lang: &str,
    previous_draft: &str,
    terminology_block: &str,
) -> String {
    let mut context_section = String::new();
    if !previous_draft.is_empty() {
        let tail = context_tail(previous_draft, CONTEXT_TAIL_CHARS);
        context_section = format!(
            "\nCONTEXT (for continuity only - do NOT include in output):\n{tail}\n---\n"
        );
    }
    let mut terminology_section = String::new();
    if !terminology_block.is_empty() {
        terminology_section = format!("\n{terminology_block}\n");
    }

    format!(
        "You are a professional literary translator. Translate the following {source} text to {target}.\n\
         \n\
         CRITICAL RULES:\n\
         1. Output ONLY the translated text - nothing else\n\
         2. PRESERVE all original formatting: paragraphs, line breaks, dialogue formatting, indentation\n\
         3. Do NOT add notes, explanations, comments, or headers\n\
         4. Do NOT repeat the prompt or instructions\n\
         5. Do NOT include \"Translation:\", \"Here is:\", or similar prefixes\n\
         6. Do NOT add [brackets] or markers of any kind\n\
         7. Maintain the author's style, tone, and voice exactly\n\
         8. Keep proper nouns and names consistent\n\
         {terminology_section}{context_section}\n\
         TEXT TO TRANSLATE:\n\
         {text}\n\
         \n\
         OUTPUT (translated text only, preserving all formatting):",
        source = display(source_lang),
        target = display(target_lang),
    )
}

/// Stage 2: editing pass over a stage-1 draft.
pub fn stage2(original: &str, draft: &str, source_lang: &str, target_lang: &str) -> String {
    format!(
        "You are a professional literary editor. Review and improve this {target} translation.\n\
         \n\
         ORIGINAL ({source}):\n\
         {original}\n\
         \n\
         DRAFT TRANSLATION ({target}):\n\
         {draft}\n\
         \n\
         TASK: Review for accuracy, fluency, style preservation, and consistency.\n\
         \n\
         CRITICAL RULES:\n\
         1. Output ONLY the improved translated text - nothing else\n\
         2. PRESERVE all original formatting: paragraphs, line breaks, dialogue formatting\n\
         3. Do NOT add notes, explanations, or comments\n\
         4. Do NOT include prefixes like \"Improved translation:\" or similar\n\
         5. If the draft is already good, return it unchanged\n\
         \n\
         OUTPUT (final translation only):",
        source = display(source_lang),
        target = display(target_lang),
    )
}
