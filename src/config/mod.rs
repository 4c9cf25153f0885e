//! Configuration resolution.
//!
//! Every setting is looked up across five layers, highest precedence first:
//! CLI flags, environment, project file (`.llmcommit.json`), user file
//! (`<config_dir>/llmcommit/config.json`), built-in defaults. The result is an
//! immutable [`EffectiveConfig`] built once per invocation.

pub mod defaults;
pub mod layer;

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::ConfigError;
use crate::provider::{ProviderKind, ProviderSpec};

pub use layer::{ConfigLayer, PROJECT_CONFIG_FILE, load_layer, project_config_path, user_config_path};

/// Resolved, read-only settings for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveConfig {
    order: Vec<ProviderKind>,
    providers: BTreeMap<ProviderKind, ProviderSpec>,
    language: String,
    max_attempts: u32,
    max_diff_chars: usize,
}

impl EffectiveConfig {
    /// Provider order, de-duplicated, known backends only.
    pub fn order(&self) -> &[ProviderKind] {
        &self.order
    }

    /// Settings for `kind`, if it is part of the order.
    pub fn provider(&self, kind: ProviderKind) -> Option<&ProviderSpec> {
        self.providers.get(&kind)
    }

    /// Provider settings in dispatch order.
    pub fn ordered_providers(&self) -> impl Iterator<Item = &ProviderSpec> {
        self.order.iter().filter_map(|kind| self.providers.get(kind))
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn max_diff_chars(&self) -> usize {
        self.max_diff_chars
    }

    /// Resolve against the real environment and config files.
    ///
    /// `repo_root` locates the project file; the user file comes from the
    /// platform config directory.
    pub fn load(cli: &ConfigLayer, repo_root: &Path) -> Result<Self, ConfigError> {
        let env = ConfigLayer::from_env();
        let project = load_layer(&project_config_path(repo_root))?;
        let user = match user_config_path() {
            Some(path) => load_layer(&path)?,
            None => ConfigLayer::new(),
        };
        resolve(cli, &env, &project, &user, &ConfigLayer::defaults())
    }
}

/// Merge the layers into an [`EffectiveConfig`].
///
/// Only structurally invalid values are errors. Anything no layer sets falls
/// back to the built-in default.
pub fn resolve(
    cli: &ConfigLayer,
    env: &ConfigLayer,
    project: &ConfigLayer,
    user: &ConfigLayer,
    defaults: &ConfigLayer,
) -> Result<EffectiveConfig, ConfigError> {
    let chain = Chain([cli, env, project, user, defaults]);

    let order_value = chain.get("providers").unwrap_or(defaults::PROVIDER_ORDER);
    let order = parse_provider_order(order_value)?;

    let mut providers = BTreeMap::new();
    for &kind in &order {
        providers.insert(kind, resolve_provider(&chain, kind)?);
    }

    let language = chain
        .get("language")
        .map(|lang| lang.trim().to_string())
        .unwrap_or_else(|| defaults::LANGUAGE.to_string());

    let max_attempts = match chain.get("max_attempts") {
        Some(value) => parse_positive::<u32>("max_attempts", value)?,
        None => defaults::MAX_ATTEMPTS,
    };
    let max_diff_chars = match chain.get("max_diff_chars") {
        Some(value) => parse_positive::<usize>("max_diff_chars", value)?,
        None => defaults::MAX_DIFF_CHARS,
    };

    let config = EffectiveConfig {
        order,
        providers,
        language,
        max_attempts,
        max_diff_chars,
    };
    debug!("Resolved configuration: {:?}", config);
    Ok(config)
}

/// Layers in precedence order.
struct Chain<'a>([&'a ConfigLayer; 5]);

impl Chain<'_> {
    /// First value any layer sets for `key`.
    fn get(&self, key: &str) -> Option<&str> {
        self.0.iter().find_map(|layer| layer.get(key))
    }
}

fn resolve_provider(chain: &Chain<'_>, kind: ProviderKind) -> Result<ProviderSpec, ConfigError> {
    let key = |field: &str| format!("{kind}.{field}");

    let endpoint_key = key("endpoint");
    let endpoint = chain
        .get(&endpoint_key)
        .unwrap_or(defaults::endpoint(kind))
        .trim()
        .to_string();
    validate_endpoint(&endpoint_key, &endpoint)?;

    let model = chain
        .get(&key("model"))
        .unwrap_or(defaults::model(kind))
        .trim()
        .to_string();

    let timeout_key = key("timeout");
    let timeout = match chain.get(&timeout_key) {
        Some(value) => parse_timeout(&timeout_key, value)?,
        None => Duration::from_secs(defaults::TIMEOUT_SECS),
    };

    let enabled_key = key("enabled");
    let enabled = match chain.get(&enabled_key) {
        Some(value) => parse_bool(&enabled_key, value)?,
        None => true,
    };

    let credential = chain.get(&key("api_key")).map(|c| c.trim().to_string());

    Ok(ProviderSpec {
        kind,
        endpoint,
        model,
        timeout,
        credential,
        enabled,
    })
}

/// Parse `a, b, c` into known backends, first occurrence wins.
///
/// Unknown but well-formed names are dropped with a warning.
pub fn parse_provider_order(value: &str) -> Result<Vec<ProviderKind>, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidProviderOrder {
        value: value.to_string(),
        reason,
    };

    if value.trim().is_empty() {
        return Err(invalid("the list is empty".to_string()));
    }

    let mut order = Vec::new();
    for entry in value.split(',') {
        let name = entry.trim().to_lowercase();
        if name.is_empty() {
            return Err(invalid("contains an empty entry".to_string()));
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
        {
            return Err(invalid(format!("'{name}' is not a valid provider name")));
        }

        match ProviderKind::from_name(&name) {
            Some(kind) if !order.contains(&kind) => order.push(kind),
            Some(_) => debug!("Ignoring duplicate provider '{}'", name),
            None => warn!("Ignoring unknown provider '{}'", name),
        }
    }

    if order.is_empty() {
        return Err(ConfigError::NoKnownProviders(value.to_string()));
    }
    Ok(order)
}

fn parse_timeout(key: &str, value: &str) -> Result<Duration, ConfigError> {
    match value.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(ConfigError::InvalidTimeout {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

fn parse_positive<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    match value.trim().parse::<T>() {
        Ok(n) if n > T::default() => Ok(n),
        _ => Err(ConfigError::InvalidNumber {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

fn validate_endpoint(key: &str, value: &str) -> Result<(), ConfigError> {
    let valid = reqwest::Url::parse(value)
        .map(|url| matches!(url.scheme(), "http" | "https") && url.has_host())
        .unwrap_or(false);
    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidEndpoint {
            key: key.to_string(),
            value: value.to_string(),
        })
    }
}
