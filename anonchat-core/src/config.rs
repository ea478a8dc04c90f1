// ABOUTME: Configuration parsing from TOML file with environment variable overrides
// ABOUTME: Validates the bot token and parses admin and oversight identifiers once at startup
use crate::paths;
use crate::traits::ChatId;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub oversight: OversightConfig,
    #[serde(default)]
    pub health: HealthConfig,
}

// ─── TelegramConfig ─────────────────────────────────────────────

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    /// Privileged user ids. Parsed and validated but not consulted by any
    /// operation yet.
    #[serde(default)]
    pub admin_ids: Vec<i64>,
}

// Custom Debug impl to redact bot_token
impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &"[REDACTED]")
            .field("admin_ids", &self.admin_ids)
            .finish()
    }
}

// ─── OversightConfig ────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OversightConfig {
    /// Destination for mirrored traffic and lifecycle notices. Unset disables oversight.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spectator_group_id: Option<i64>,
}

impl OversightConfig {
    pub fn destination(&self) -> Option<ChatId> {
        self.spectator_group_id.map(ChatId)
    }
}

// ─── HealthConfig ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    #[serde(default = "default_health_port")]
    pub port: u16,
    #[serde(default = "default_health_host")]
    pub host: String,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            port: default_health_port(),
            host: default_health_host(),
        }
    }
}

fn default_health_port() -> u16 {
    5000
}

fn default_health_host() -> String {
    "0.0.0.0".to_string()
}

/// Parse a comma-separated list of numeric ids, skipping blank entries
pub fn parse_id_list(raw: &str) -> Result<Vec<i64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>()
                .with_context(|| format!("Invalid id '{}': expected an integer", s))
        })
        .collect()
}

impl Config {
    /// Find the config file, checking multiple locations in order:
    /// 1. ANONCHAT_CONFIG_PATH env var (if set)
    /// 2. ./config.toml
    /// 3. ~/.config/anonchat/config.toml
    fn find_config_file() -> Option<PathBuf> {
        if let Ok(env_path) = std::env::var("ANONCHAT_CONFIG_PATH") {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                return Some(path);
            }
            tracing::warn!(path = %env_path, "ANONCHAT_CONFIG_PATH does not exist, ignoring");
        }

        let local_config = PathBuf::from("config.toml");
        if local_config.exists() {
            return Some(local_config);
        }

        let xdg_config = paths::config_file();
        if xdg_config.exists() {
            return Some(xdg_config);
        }

        None
    }

    /// Parse a TOML document without applying environment overrides
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str::<Config>(content).context("Failed to parse configuration TOML")
    }

    /// Load configuration from config.toml with environment variable overrides
    pub fn load() -> Result<Self> {
        let mut config = if let Some(config_path) = Self::find_config_file() {
            tracing::info!(
                path = %config_path.display(),
                "Loading configuration from file"
            );
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read {}", config_path.display()))?;
            toml::from_str::<Config>(&content)
                .with_context(|| format!("Failed to parse {}", config_path.display()))?
        } else {
            tracing::info!("No config file found, using environment variables and defaults");
            Config::default()
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment lookup. Recognized keys:
    /// BOT_TOKEN, ADMIN_IDS, SPECTATOR_GROUP_ID, PORT, BIND_ADDRESS.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("BOT_TOKEN") {
            self.telegram.bot_token = val;
        }
        if let Some(val) = lookup("ADMIN_IDS") {
            self.telegram.admin_ids =
                parse_id_list(&val).context("ADMIN_IDS must be a comma-separated list of ids")?;
        }
        if let Some(val) = lookup("SPECTATOR_GROUP_ID") {
            let trimmed = val.trim();
            self.oversight.spectator_group_id = if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.parse().with_context(|| {
                    format!("SPECTATOR_GROUP_ID must be a valid chat id, got: {}", val)
                })?)
            };
        }
        if let Some(val) = lookup("PORT") {
            self.health.port = val.trim().parse().with_context(|| {
                format!("PORT must be a valid port number, got: {}", val)
            })?;
        }
        if let Some(val) = lookup("BIND_ADDRESS") {
            self.health.host = val;
        }
        Ok(())
    }

    /// Check required fields
    pub fn validate(&self) -> Result<()> {
        if self.telegram.bot_token.trim().is_empty() {
            anyhow::bail!("telegram.bot_token is required (set in config.toml or BOT_TOKEN env var)");
        }
        if self.health.host.trim().is_empty() {
            anyhow::bail!("health.host must not be empty");
        }
        Ok(())
    }
}
