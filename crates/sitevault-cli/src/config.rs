use std::{
    fs,
    path::{Path, PathBuf},
};

use color_eyre::{eyre::bail, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use sitevault_airtable::AirtableConfig;
use sitevault_core::envelope::DEFAULT_ITERATIONS;
use sitevault_storage::passcode::DEFAULT_PASSCODE_VAR;

const AIRTABLE_KEY_VAR: &str = "AIRTABLE_KEY";
const AIRTABLE_BASE_VAR: &str = "AIRTABLE_BASE_ID";

/// User-level configuration loaded from `~/.config/sitevault/config.toml` (platform-specific).
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct Config {
    /// Override for the directory holding `.enc` records and bundles.
    pub data_dir: Option<PathBuf>,
    #[serde(default)]
    pub backend: Backend,
    /// PBKDF2 rounds; never below the default.
    pub kdf_iterations: Option<u32>,
    #[serde(default)]
    pub passcode: PasscodeConfig,
    #[serde(default)]
    pub server: ServerConfig,
    pub airtable: Option<AirtableConfig>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    File,
    Airtable,
    Memory,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PasscodeSource {
    #[default]
    Env,
    Keyring,
}

/// Where the passcode comes from. The passcode itself never lives in this file.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct PasscodeConfig {
    #[serde(default)]
    pub source: PasscodeSource,
    pub env_var: Option<String>,
}

impl PasscodeConfig {
    pub fn env_var(&self) -> &str {
        self.env_var.as_deref().unwrap_or(DEFAULT_PASSCODE_VAR)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5000
}

impl Config {
    pub fn kdf_iterations(&self) -> u32 {
        self.kdf_iterations.unwrap_or(DEFAULT_ITERATIONS)
    }

    pub fn validate(&self) -> Result<()> {
        if self.kdf_iterations() < DEFAULT_ITERATIONS {
            bail!(
                "kdf_iterations must be at least {DEFAULT_ITERATIONS}, got {}",
                self.kdf_iterations()
            );
        }
        if self.backend == Backend::Airtable && self.airtable.is_none() {
            bail!("airtable backend selected but no credentials configured (set {AIRTABLE_KEY_VAR} and {AIRTABLE_BASE_VAR})");
        }
        Ok(())
    }

    /// Apply Airtable credentials from the environment on top of the file.
    pub fn with_airtable_env(mut self, api_key: Option<String>, base_id: Option<String>) -> Self {
        match (self.airtable.as_mut(), api_key, base_id) {
            (Some(cfg), key, base) => {
                if let Some(key) = key {
                    cfg.api_key = key;
                }
                if let Some(base) = base {
                    cfg.base_id = base;
                }
            }
            (None, Some(key), Some(base)) => self.airtable = Some(AirtableConfig::new(key, base)),
            (None, _, _) => {}
        }
        self
    }
}

/// Load config from the default path, apply env overrides, and validate.
pub fn load() -> Result<Config> {
    let path = default_path()?;
    let cfg = load_from_path(path)?.with_airtable_env(
        non_empty_var(AIRTABLE_KEY_VAR),
        non_empty_var(AIRTABLE_BASE_VAR),
    );
    cfg.validate()?;
    Ok(cfg)
}

/// Load config from a given path; if missing or empty, return defaults.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Config::default());
    }
    let contents = fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Ok(Config::default());
    }
    let cfg: Config = toml::from_str(&contents)?;
    Ok(cfg)
}

/// Resolve the default config path (platform aware).
pub fn default_path() -> Result<PathBuf> {
    let base = config_dir().ok_or_else(|| color_eyre::eyre::eyre!("no config dir available"))?;
    Ok(base.join("sitevault").join("config.toml"))
}

/// Write a default config to the default path unless a file is already there.
/// Environment overrides are never written back.
pub fn write_default_if_missing() -> Result<PathBuf> {
    write_default_at(&default_path()?)
}

fn write_default_at(path: &Path) -> Result<PathBuf> {
    write_if_missing(&Config::default(), path)
}

fn write_if_missing(config: &Config, path: &Path) -> Result<PathBuf> {
    if path.exists() {
        return Ok(path.to_path_buf());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let body = toml::to_string_pretty(config)?;
    fs::write(path, body)?;
    Ok(path.to_path_buf())
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}
