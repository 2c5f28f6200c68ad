use anyhow::{Context, bail};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use tracing::debug;

use crate::provider::ProviderProfile;
use crate::runner::DEFAULT_MAX_STEPS_PER_TURN;

/// toolbridge configuration
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, JsonSchema)]
pub struct Config {
    /// Case runner settings
    #[serde(default)]
    pub runner: RunnerConfig,
    /// Provider profiles by name
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderProfile>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, JsonSchema)]
pub struct RunnerConfig {
    /// Maximum number of test cases in flight (unlimited when unset)
    #[serde(default)]
    pub max_parallel_cases: Option<usize>,
    /// Model steps allowed per user turn when tool results are fed back
    #[serde(default = "default_max_steps_per_turn")]
    pub max_steps_per_turn: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_parallel_cases: None,
            max_steps_per_turn: default_max_steps_per_turn(),
        }
    }
}

fn default_max_steps_per_turn() -> usize {
    DEFAULT_MAX_STEPS_PER_TURN
}

impl Config {
    /// Config written by `toolbridge init`
    pub fn default_config() -> Self {
        Self {
            runner: RunnerConfig {
                max_parallel_cases: Some(4),
                ..RunnerConfig::default()
            },
            providers: BTreeMap::from([
                ("openrouter".to_string(), ProviderProfile::openai_router()),
                ("local".to_string(), ProviderProfile::session_server()),
            ]),
        }
    }

    /// Load a TOML config, applying `key.path=value` overrides first
    pub fn load(path: &str, overrides: &[String]) -> anyhow::Result<Self> {
        let content =
            fs::read_to_string(path).with_context(|| format!("Failed to read config {}", path))?;
        Self::parse(&content, overrides).with_context(|| format!("Invalid config {}", path))
    }

    pub fn parse(content: &str, overrides: &[String]) -> anyhow::Result<Self> {
        let mut table: toml::Table = toml::from_str(content).context("Failed to parse TOML")?;
        for entry in overrides {
            apply_override(&mut table, entry)?;
        }
        let config = toml::Value::Table(table)
            .try_into()
            .context("Config does not match the expected schema")?;
        Ok(config)
    }

    pub fn to_toml(&self) -> anyhow::Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }

    pub fn provider(&self, name: &str) -> anyhow::Result<&ProviderProfile> {
        self.providers.get(name).with_context(|| {
            let known: Vec<&str> = self.providers.keys().map(String::as_str).collect();
            format!("Unknown provider '{}' (configured: {})", name, known.join(", "))
        })
    }

    /// The provider named `name`, or the only/first configured one
    pub fn select_provider<'a>(
        &'a self,
        name: Option<&'a str>,
    ) -> anyhow::Result<(&'a str, &'a ProviderProfile)> {
        match name {
            Some(name) => Ok((name, self.provider(name)?)),
            None => self
                .providers
                .iter()
                .next()
                .map(|(name, profile)| (name.as_str(), profile))
                .context("No providers configured"),
        }
    }
}

/// Set `a.b.c=value` in a TOML table; the value is parsed as TOML, falling back to a string
fn apply_override(table: &mut toml::Table, entry: &str) -> anyhow::Result<()> {
    let Some((key_path, raw)) = entry.split_once('=') else {
        bail!("Override '{}' must look like key.path=value", entry);
    };
    let keys: Vec<&str> = key_path.trim().split('.').collect();
    if keys.iter().any(|key| key.is_empty()) {
        bail!("Override '{}' has an empty key segment", entry);
    }

    let value = parse_value(raw.trim());
    debug!("Config override: {} = {}", key_path.trim(), value);

    let (last, parents) = keys.split_last().context("Empty override key")?;
    let mut current = table;
    for key in parents {
        let next = current
            .entry(key.to_string())
            .or_insert(toml::Value::Table(toml::Table::new()));
        current = match next {
            toml::Value::Table(inner) => inner,
            _ => bail!("Cannot override '{}': '{}' is not a table", key_path, key),
        };
    }
    current.insert(last.to_string(), value);
    Ok(())
}

fn parse_value(raw: &str) -> toml::Value {
    format!("value = {}", raw)
        .parse::<toml::Table>()
        .ok()
        .and_then(|mut parsed| parsed.remove("value"))
        .unwrap_or_else(|| toml::Value::String(raw.to_string()))
}
