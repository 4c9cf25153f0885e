//! Secret redaction for change text before it leaves the process.
//!
//! Every rule is matched against the text and overlapping matches are merged
//! into one masked span, so a secret is masked whenever any rule covers it.
//! Passes repeat until no rule finds anything outside a placeholder. A pass
//! only fires on spans holding non-placeholder text, so the loop terminates
//! and its output is a fixed point of every rule.

use std::sync::LazyLock;

use regex_lite::Regex;

/// Replacement for every masked span.
pub const PLACEHOLDER: &str = "[REDACTED]";

struct Rule {
    name: &'static str,
    regex: Regex,
    /// Capture group to mask; 0 masks the whole match.
    group: usize,
}

impl Rule {
    fn new(name: &'static str, pattern: &str, group: usize) -> Self {
        Self {
            name,
            regex: Regex::new(pattern).expect("redaction patterns are valid"),
            group,
        }
    }
}

static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        Rule::new(
            "private_key",
            r"(?s)-----BEGIN (?:RSA |EC |OPENSSH |DSA )?PRIVATE KEY-----.*?-----END [A-Z ]*PRIVATE KEY-----",
            0,
        ),
        Rule::new("aws_access_key", r"\b(?:AKIA|ASIA)[0-9A-Z]{16}\b", 0),
        Rule::new("openai_key", r"\bsk-[A-Za-z0-9_-]{20,}", 0),
        Rule::new(
            "github_token",
            r"\b(?:ghp_[A-Za-z0-9]{20,}|github_pat_[A-Za-z0-9_]{20,})\b",
            0,
        ),
        Rule::new("google_api_key", r"\bAIza[0-9A-Za-z_-]{30,}", 0),
        Rule::new(
            "secret_assignment",
            r#"(?i)(?:api[_-]?key|secret|token|password)['"]?\s*[:=]\s*['"]([^'"\n]{6,})['"]"#,
            1,
        ),
    ]
});

/// Result of a redaction pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redaction {
    pub text: String,
    /// Rule name for each masked span, in text order within each pass.
    pub rules: Vec<&'static str>,
}

impl Redaction {
    pub fn count(&self) -> usize {
        self.rules.len()
    }
}

/// Mask recognized secrets in `text`.
///
/// Pure and deterministic. The output has the same number of lines as the
/// input, and `redact(&redact(x)) == redact(x)`.
pub fn redact(text: &str) -> String {
    redact_with_report(text).text
}

/// Like [`redact`], also reporting which rules fired.
pub fn redact_with_report(text: &str) -> Redaction {
    let mut current = text.to_string();
    let mut rules = Vec::new();

    loop {
        let spans = merged_spans(&current);
        if spans.is_empty() {
            break;
        }
        current = mask_spans(&current, &spans);
        rules.extend(spans.into_iter().map(|span| span.rule));
    }

    Redaction { text: current, rules }
}

/// A region to mask, named after the highest-priority rule that covers it.
struct Span {
    start: usize,
    end: usize,
    priority: usize,
    rule: &'static str,
}

/// True when `text` holds nothing but placeholders and whitespace.
fn is_masked(text: &str) -> bool {
    text.replace(PLACEHOLDER, "").trim().is_empty()
}

/// All rule matches in `text`, with overlapping ones merged.
fn merged_spans(text: &str) -> Vec<Span> {
    let mut found: Vec<Span> = Vec::new();
    for (priority, rule) in RULES.iter().enumerate() {
        for caps in rule.regex.captures_iter(text) {
            let Some(m) = caps.get(rule.group) else {
                continue;
            };
            if is_masked(m.as_str()) {
                continue;
            }
            found.push(Span {
                start: m.start(),
                end: m.end(),
                priority,
                rule: rule.name,
            });
        }
    }

    found.sort_by_key(|span| (span.start, span.priority));

    let mut merged: Vec<Span> = Vec::with_capacity(found.len());
    for span in found {
        match merged.last_mut() {
            Some(last) if span.start < last.end => {
                last.end = last.end.max(span.end);
                if span.priority < last.priority {
                    last.priority = span.priority;
                    last.rule = span.rule;
                }
            }
            _ => merged.push(span),
        }
    }
    merged
}

/// Replace each span with the placeholder, keeping its newlines.
fn mask_spans(text: &str, spans: &[Span]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for span in spans {
        out.push_str(&text[cursor..span.start]);
        out.push_str(PLACEHOLDER);
        let newlines = text[span.start..span.end].matches('\n').count();
        out.extend(std::iter::repeat_n('\n', newlines));
        cursor = span.end;
    }
    out.push_str(&text[cursor..]);
    out
}
