//! Flat `key -> value` configuration layers and the sources that build them.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::config::defaults;
use crate::error::ConfigError;
use crate::provider::ProviderKind;

/// File name of the per-repository config, looked up at the repository root.
pub const PROJECT_CONFIG_FILE: &str = ".llmcommit.json";

/// Global keys. Provider keys are `<provider>.<field>`.
const GLOBAL_KEYS: [&str; 4] = ["providers", "language", "max_attempts", "max_diff_chars"];
const PROVIDER_FIELDS: [&str; 5] = ["endpoint", "model", "timeout", "api_key", "enabled"];

/// Environment variables and the keys they set.
const ENV_KEYS: [(&str, &str); 15] = [
    ("LLMCOMMIT_PROVIDERS", "providers"),
    ("LLMCOMMIT_LANG", "language"),
    ("LLMCOMMIT_MAX_ATTEMPTS", "max_attempts"),
    ("LLMCOMMIT_MAX_DIFF_CHARS", "max_diff_chars"),
    ("OLLAMA_HOST", "ollama.endpoint"),
    ("OLLAMA_MODEL", "ollama.model"),
    ("OLLAMA_TIMEOUT", "ollama.timeout"),
    ("OPENAI_API_KEY", "openai.api_key"),
    ("OPENAI_MODEL", "openai.model"),
    ("OPENAI_BASE_URL", "openai.endpoint"),
    ("OPENAI_TIMEOUT", "openai.timeout"),
    ("GEMINI_API_KEY", "gemini.api_key"),
    ("GEMINI_MODEL", "gemini.model"),
    ("GEMINI_BASE_URL", "gemini.endpoint"),
    ("GEMINI_TIMEOUT", "gemini.timeout"),
];

/// One configuration source.
///
/// Blank values are not stored. The one exception is an explicit empty
/// `providers` list from a config file, which must still fail validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigLayer {
    values: BTreeMap<String, String>,
}

impl ConfigLayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key`, ignoring blank values.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let value = value.into();
        if value.trim().is_empty() {
            return;
        }
        self.values.insert(key.into(), value);
    }

    /// Builder form of [`ConfigLayer::set`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Built-in defaults, the lowest-precedence layer.
    pub fn defaults() -> Self {
        let mut layer = Self::new()
            .with("providers", defaults::PROVIDER_ORDER)
            .with("language", defaults::LANGUAGE)
            .with("max_attempts", defaults::MAX_ATTEMPTS.to_string())
            .with("max_diff_chars", defaults::MAX_DIFF_CHARS.to_string());

        for kind in ProviderKind::ALL {
            layer.set(format!("{kind}.endpoint"), defaults::endpoint(kind));
            layer.set(format!("{kind}.model"), defaults::model(kind));
            layer.set(format!("{kind}.timeout"), defaults::TIMEOUT_SECS.to_string());
            layer.set(format!("{kind}.enabled"), "true");
        }
        layer
    }

    /// Layer from the process environment.
    pub fn from_env() -> Self {
        Self::from_env_vars(std::env::vars())
    }

    /// Layer from `(name, value)` pairs; unrelated names are ignored.
    pub fn from_env_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut layer = Self::new();
        for (name, value) in vars {
            if let Some((_, key)) = ENV_KEYS.iter().find(|(env, _)| *env == name.as_ref()) {
                layer.set(*key, value);
            }
        }
        layer
    }

    /// Flatten a JSON config document into a layer.
    ///
    /// ```json
    /// { "providers": ["ollama", "openai"], "openai": { "model": "gpt-4o-mini", "timeout": 30 } }
    /// ```
    ///
    /// `origin` names the source in error messages.
    pub fn from_json_str(origin: &str, json: &str) -> Result<Self, ConfigError> {
        let malformed = |reason: String| ConfigError::Malformed {
            origin: origin.to_string(),
            reason,
        };

        let root: Value = serde_json::from_str(json).map_err(|e| malformed(e.to_string()))?;
        let Value::Object(entries) = root else {
            return Err(malformed("top level must be an object".to_string()));
        };

        let mut layer = Self::new();
        for (key, value) in entries {
            match value {
                Value::Array(items) if key == "providers" => {
                    let names = items
                        .into_iter()
                        .map(|item| match item {
                            Value::String(name) => Ok(name),
                            other => Err(malformed(format!("providers entries must be strings, got {other}"))),
                        })
                        .collect::<Result<Vec<_>, _>>()?;
                    // An explicit empty list stays visible to order validation.
                    layer.values.insert(key, names.join(","));
                }
                value if GLOBAL_KEYS.contains(&key.as_str()) => {
                    if let Some(text) = scalar(&key, value).map_err(malformed)? {
                        layer.set(key, text);
                    }
                }
                Value::Object(fields) => {
                    if ProviderKind::from_name(&key).is_none() {
                        warn!("Ignoring unknown section '{}' in {}", key, origin);
                        continue;
                    }
                    for (field, value) in fields {
                        let full_key = format!("{key}.{field}");
                        if !PROVIDER_FIELDS.contains(&field.as_str()) {
                            warn!("Ignoring unknown key '{}' in {}", full_key, origin);
                            continue;
                        }
                        if let Some(text) = scalar(&full_key, value).map_err(malformed)? {
                            layer.set(full_key, text);
                        }
                    }
                }
                _ => warn!("Ignoring unknown key '{}' in {}", key, origin),
            }
        }
        Ok(layer)
    }
}

/// Render a JSON scalar as config text; `null` means unset.
fn scalar(key: &str, value: Value) -> Result<Option<String>, String> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Bool(b) => Ok(Some(b.to_string())),
        Value::Array(_) | Value::Object(_) => Err(format!("'{key}' must be a string, number or boolean")),
    }
}

/// Read a JSON config file. A missing file is an empty layer.
pub fn load_layer(path: &Path) -> Result<ConfigLayer, ConfigError> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("No config file at {}", path.display());
            return Ok(ConfigLayer::new());
        }
        Err(source) => {
            return Err(ConfigError::ReadFailed {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let layer = ConfigLayer::from_json_str(&path.display().to_string(), &text)?;
    debug!("Loaded {} setting(s) from {}", layer.len(), path.display());
    Ok(layer)
}

/// `.llmcommit.json` at the repository root.
pub fn project_config_path(repo_root: &Path) -> PathBuf {
    repo_root.join(PROJECT_CONFIG_FILE)
}

/// `<config_dir>/llmcommit/config.json`, when the platform has a config dir.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("llmcommit").join("config.json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_ignores_blank_values() {
        let mut layer = ConfigLayer::new();
        layer.set("openai.api_key", "   ");
        layer.set("language", "");
        assert!(layer.is_empty());
    }

    #[test]
    fn test_env_vars_map_to_keys() {
        let layer = ConfigLayer::from_env_vars([
            ("OLLAMA_HOST", "http://gpu-box:11434"),
            ("OPENAI_API_KEY", "sk-env"),
            ("GEMINI_TIMEOUT", "40"),
            ("LLMCOMMIT_PROVIDERS", "gemini,ollama"),
            ("PATH", "/usr/bin"),
            ("OPENAI_MODEL", ""),
        ]);
        assert_eq!(layer.get("ollama.endpoint"), Some("http://gpu-box:11434"));
        assert_eq!(layer.get("openai.api_key"), Some("sk-env"));
        assert_eq!(layer.get("gemini.timeout"), Some("40"));
        assert_eq!(layer.get("providers"), Some("gemini,ollama"));
        assert_eq!(layer.get("openai.model"), None);
        assert_eq!(layer.len(), 4);
    }

    #[test]
    fn test_json_flattens_sections() {
        let layer = ConfigLayer::from_json_str(
            "test",
            r#"{
                "providers": ["openai", "ollama"],
                "language": "fi",
                "max_attempts": 2,
                "openai": { "model": "gpt-4o-mini", "timeout": 30, "enabled": false },
                "ollama": { "endpoint": null }
            }"#,
        )
        .unwrap();

        assert_eq!(layer.get("providers"), Some("openai,ollama"));
        assert_eq!(layer.get("language"), Some("fi"));
        assert_eq!(layer.get("max_attempts"), Some("2"));
        assert_eq!(layer.get("openai.model"), Some("gpt-4o-mini"));
        assert_eq!(layer.get("openai.timeout"), Some("30"));
        assert_eq!(layer.get("openai.enabled"), Some("false"));
        assert_eq!(layer.get("ollama.endpoint"), None);
    }

    #[test]
    fn test_json_providers_as_string() {
        let layer = ConfigLayer::from_json_str("test", r#"{"providers": "ollama, gemini"}"#).unwrap();
        assert_eq!(layer.get("providers"), Some("ollama, gemini"));
    }

    #[test]
    fn test_json_unknown_keys_are_ignored() {
        let layer = ConfigLayer::from_json_str(
            "test",
            r#"{"colour": "blue", "claude": {"model": "x"}, "openai": {"temperature": 1}}"#,
        )
        .unwrap();
        assert!(layer.is_empty());
    }

    #[test]
    fn test_json_malformed_inputs() {
        for bad in [
            "not json",
            "[1, 2]",
            r#"{"providers": [1]}"#,
            r#"{"openai": {"model": ["a"]}}"#,
            r#"{"language": {"code": "en"}}"#,
        ] {
            let err = ConfigLayer::from_json_str("test.json", bad).unwrap_err();
            assert!(
                matches!(&err, ConfigError::Malformed { origin, .. } if origin == "test.json"),
                "{bad}: {err:?}"
            );
        }
    }

    #[test]
    fn test_defaults_cover_every_provider() {
        let layer = ConfigLayer::defaults();
        assert_eq!(layer.get("providers"), Some("ollama,openai"));
        assert_eq!(layer.get("ollama.model"), Some("qwen3:8b"));
        for kind in ProviderKind::ALL {
            assert!(layer.get(&format!("{kind}.endpoint")).is_some());
            assert_eq!(layer.get(&format!("{kind}.timeout")), Some("25"));
            assert_eq!(layer.get(&format!("{kind}.api_key")), None);
        }
    }

    #[test]
    fn test_user_config_path_shape() {
        if let Some(path) = user_config_path() {
            assert!(path.ends_with("llmcommit/config.json"));
        }
        assert_eq!(
            project_config_path(Path::new("/repo")),
            PathBuf::from("/repo/.llmcommit.json")
        );
    }
}
