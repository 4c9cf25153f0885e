//! Built-in settings used when no other source provides a value.

use crate::provider::ProviderKind;

pub const PROVIDER_ORDER: &str = "ollama,openai";
pub const LANGUAGE: &str = "en";
pub const MAX_ATTEMPTS: u32 = crate::pipeline::MAX_ATTEMPTS;
pub const MAX_DIFF_CHARS: usize = 14_000;
pub const TIMEOUT_SECS: u64 = 25;

pub fn endpoint(kind: ProviderKind) -> &'static str {
    match kind {
        ProviderKind::Ollama => "http://localhost:11434",
        ProviderKind::OpenAi => "https://api.openai.com",
        ProviderKind::Gemini => "https://generativelanguage.googleapis.com",
    }
}

pub fn model(kind: ProviderKind) -> &'static str {
    match kind {
        ProviderKind::Ollama => "qwen3:8b",
        ProviderKind::OpenAi => "gpt-5-mini",
        ProviderKind::Gemini => "gemini-2.5-flash",
    }
}
