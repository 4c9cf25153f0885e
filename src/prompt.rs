//! Prompt construction and cleanup of the generated commit message.

/// Maximum characters for the subject line.
pub const MAX_SUBJECT_CHARS: usize = 72;

/// Language codes the instructions spell out by name.
const LANG_NAMES: [(&str, &str); 7] = [
    ("en", "English"),
    ("fi", "Finnish"),
    ("sv", "Swedish"),
    ("et", "Estonian"),
    ("de", "German"),
    ("fr", "French"),
    ("es", "Spanish"),
];

/// Human-readable name for a language code, if it is one we know.
pub fn language_name(code: &str) -> Option<&'static str> {
    let code = code.trim().to_ascii_lowercase();
    LANG_NAMES
        .iter()
        .find(|(known, _)| *known == code)
        .map(|(_, name)| *name)
}

/// Build the prompt sent to every provider.
///
/// `context` must already be redacted; it is embedded verbatim.
pub fn build_prompt(language: &str, context: &str) -> String {
    let language_line = match language_name(language) {
        Some(name) => format!("Write the commit message in {name}."),
        None => format!("Write the commit message in language code '{}'.", language.trim()),
    };

    format!(
        r#"You write excellent git commit messages.

{language_line}
Rules:
- Output ONLY the commit message text (no quotes, no code fences, no commentary).
- First line: concise summary <= {MAX_SUBJECT_CHARS} characters.
- If useful, add a blank line then a short body (bullets allowed).
- Describe WHAT changed and WHY.
- Do not mention AI, LLMs, prompts, or tooling.

## Changes
{context}"#,
        context = context.trim_end(),
    )
}

/// Clean a raw completion into a commit message.
///
/// Strips a surrounding code fence and wrapping quotes, then clamps the
/// subject to [`MAX_SUBJECT_CHARS`] at a word boundary. Returns an empty
/// string when nothing is left.
pub fn normalize_message(raw: &str) -> String {
    let text = strip_code_fence(raw.trim());
    let text = text
        .trim()
        .trim_matches('"')
        .trim_matches('\'')
        .trim();

    let mut lines = text.lines();
    let Some(first) = lines.next() else {
        return String::new();
    };

    let subject = clamp_subject(first.trim());
    let body = lines.collect::<Vec<_>>().join("\n");
    let body = body.trim_end();

    if body.is_empty() {
        subject
    } else {
        format!("{subject}\n{body}")
    }
}

/// Remove an opening "```lang" line and a closing "```" line, if present.
fn strip_code_fence(text: &str) -> &str {
    let mut text = text;
    if text.starts_with("```") {
        text = match text.find('\n') {
            Some(newline) => &text[newline + 1..],
            None => "",
        };
    }
    let trimmed = text.trim_end();
    if let Some(stripped) = trimmed.strip_suffix("```") {
        if stripped.is_empty() || stripped.ends_with('\n') {
            return stripped;
        }
    }
    text
}

fn clamp_subject(subject: &str) -> String {
    if subject.chars().count() <= MAX_SUBJECT_CHARS {
        return subject.to_string();
    }

    let cut: String = subject.chars().take(MAX_SUBJECT_CHARS).collect();
    let cut = match cut.rfind(' ') {
        Some(space) => &cut[..space],
        None => cut.as_str(),
    };
    cut.trim_end_matches([' ', ',', ';', ':', '-']).to_string()
}
