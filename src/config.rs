// Runtime configuration
//
// Resolution order: built-in defaults, then the TOML file (if any), then
// RELIEF_DESK_* environment variables.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::filter::DEFAULT_PAGE_SIZE;

pub const DEFAULT_CONFIG_FILE: &str = "relief-desk.toml";
pub const CONFIG_PATH_VAR: &str = "RELIEF_DESK_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// SQLite database file
    pub database_path: PathBuf,

    /// Address the REST server binds to
    pub bind_addr: String,

    pub page_size: usize,

    /// Actor recorded on persisted audit events
    pub actor: String,

    /// Seed demonstration records when the store starts empty
    pub seed_mock_data: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            database_path: PathBuf::from("relief-desk.db"),
            bind_addr: "0.0.0.0:3000".to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            actor: "operator".to_string(),
            seed_mock_data: true,
        }
    }
}

impl AppConfig {
    /// Load from `$RELIEF_DESK_CONFIG` or `./relief-desk.toml`, then apply
    /// environment overrides. A missing default file is not an error.
    pub fn load() -> Result<Self> {
        let explicit = std::env::var(CONFIG_PATH_VAR).ok().map(PathBuf::from);

        let mut config = match &explicit {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => AppConfig::default(),
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a key lookup (the environment in production).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("RELIEF_DESK_DB") {
            self.database_path = PathBuf::from(path);
        }
        if let Some(addr) = lookup("RELIEF_DESK_ADDR") {
            self.bind_addr = addr;
        }
        if let Some(size) = lookup("RELIEF_DESK_PAGE_SIZE") {
            self.page_size = size
                .trim()
                .parse()
                .with_context(|| format!("RELIEF_DESK_PAGE_SIZE is not a number: {}", size))?;
        }
        if let Some(actor) = lookup("RELIEF_DESK_ACTOR") {
            self.actor = actor;
        }
        if let Some(flag) = lookup("RELIEF_DESK_SEED_MOCK") {
            self.seed_mock_data = parse_flag(&flag)
                .with_context(|| format!("RELIEF_DESK_SEED_MOCK is not a boolean: {}", flag))?;
        }

        self.validate()
    }

    fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            anyhow::bail!("page_size must be at least 1");
        }
        if self.actor.trim().is_empty() {
            anyhow::bail!("actor must not be empty");
        }
        Ok(())
    }
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("unrecognized flag value '{}'", other),
    }
}
