use anyhow::{anyhow, Context, Result};
use mediakeep_core::StorageConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_ENV: &str = "MEDIAKEEP_CONFIG";
pub const TEST_MODE_ENV: &str = "MEDIAKEEP_TEST_MODE";
pub const DEFAULT_CONFIG_FILE: &str = "mediakeep.yaml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub test_mode: bool,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Json,
}

impl ConfigFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "yaml" | "yml" => Ok(ConfigFormat::Yaml),
            "json" => Ok(ConfigFormat::Json),
            _ => Err(anyhow!(
                "unsupported config file type: {} (expected .yaml, .yml or .json)",
                path.display()
            )),
        }
    }
}

pub fn parse_app_config(data: &str, format: ConfigFormat) -> Result<AppConfig> {
    let config: AppConfig = match format {
        ConfigFormat::Yaml => serde_yaml::from_str(data)?,
        ConfigFormat::Json => serde_json::from_str(data)?,
    };
    config.storage.validate()?;
    Ok(config)
}

/// Reads, parses and validates `path`, then applies environment overrides.
pub fn load_app_config(path: impl AsRef<Path>) -> Result<AppConfig> {
    let path = path.as_ref();
    let format = ConfigFormat::from_path(path)?;
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    let mut config = parse_app_config(&data, format)
        .with_context(|| format!("invalid config file: {}", path.display()))?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    tracing::debug!(
        path = %path.display(),
        groups = config.storage.groups.len(),
        test_mode = config.test_mode,
        "configuration loaded"
    );
    Ok(config)
}

pub fn save_app_config(path: impl AsRef<Path>, config: &AppConfig) -> Result<()> {
    let path = path.as_ref();
    let data = match ConfigFormat::from_path(path)? {
        ConfigFormat::Yaml => serde_yaml::to_string(config)?,
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
    };
    std::fs::write(path, data)
        .with_context(|| format!("failed to write config file: {}", path.display()))?;
    Ok(())
}

/// `MEDIAKEEP_CONFIG` when set, else `mediakeep.yaml` in the working directory.
pub fn default_config_path() -> PathBuf {
    std::env::var_os(CONFIG_ENV)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}

pub fn parse_bool_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn apply_env_overrides(config: &mut AppConfig, lookup: impl Fn(&str) -> Option<String>) {
    let Some(raw) = lookup(TEST_MODE_ENV) else {
        return;
    };
    match parse_bool_flag(&raw) {
        Some(enabled) => config.test_mode = enabled,
        None => tracing::warn!(var = TEST_MODE_ENV, value = %raw, "ignoring invalid boolean"),
    }
}
