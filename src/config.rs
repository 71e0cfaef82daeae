//! Configuration loading for Duesbot.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Environment variable holding the Telegram bot token.
pub const TOKEN_ENV: &str = "TELEGRAM_BOT_TOKEN";

/// Get the Duesbot home directory (~/.duesbot).
pub fn get_home_dir() -> Result<PathBuf> {
    let home = directories::UserDirs::new()
        .ok_or_else(|| Error::Config("Could not determine home directory".to_string()))?;

    Ok(home.home_dir().join(".duesbot"))
}

/// Get the default settings file path.
pub fn get_settings_path() -> Result<PathBuf> {
    Ok(get_home_dir()?.join("settings.json"))
}

/// Load settings from `path`, or from ~/.duesbot/settings.json.
///
/// A missing file yields defaults; a present but malformed or invalid file
/// is an error. `TELEGRAM_BOT_TOKEN` overrides the token from the file.
pub fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => get_settings_path()?,
    };

    let mut settings = if path.exists() {
        let content = std::fs::read_to_string(&path)?;
        let settings: Settings = serde_json::from_str(&content)?;
        tracing::debug!("Loaded settings from {}", path.display());
        settings
    } else {
        tracing::debug!("No settings file at {}, using defaults", path.display());
        Settings::default()
    };

    if let Ok(token) = std::env::var(TOKEN_ENV) {
        if !token.trim().is_empty() {
            settings.telegram.bot_token = Some(token);
        }
    }

    validate_settings(&settings)?;
    Ok(settings)
}

fn validate_settings(settings: &Settings) -> Result<()> {
    crate::digest::DigestSchedule::daily(&settings.digest.time, &settings.digest.timezone)?;

    if settings.confirmation.clear_timeout_secs == 0 {
        return Err(Error::Config(
            "confirmation.clear_timeout_secs must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

/// Telegram configuration.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct TelegramConfig {
    pub bot_token: Option<String>,
}

/// Database configuration.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct DatabaseConfig {
    pub path: Option<PathBuf>,
}

/// Daily digest configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct DigestConfig {
    #[serde(default = "default_digest_enabled")]
    pub enabled: bool,
    /// Local fire time, HH:MM.
    #[serde(default = "default_digest_time")]
    pub time: String,
    /// IANA timezone name the fire time is anchored to.
    #[serde(default = "default_digest_timezone")]
    pub timezone: String,
}

fn default_digest_enabled() -> bool {
    true
}

fn default_digest_time() -> String {
    "09:00".to_string()
}

fn default_digest_timezone() -> String {
    "America/Chicago".to_string()
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            enabled: default_digest_enabled(),
            time: default_digest_time(),
            timezone: default_digest_timezone(),
        }
    }
}

/// Confirmation window configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ConfirmationConfig {
    #[serde(default = "default_clear_timeout_secs")]
    pub clear_timeout_secs: u64,
}

fn default_clear_timeout_secs() -> u64 {
    30
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            clear_timeout_secs: default_clear_timeout_secs(),
        }
    }
}

/// Duesbot settings.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct Settings {
    #[serde(default)]
    pub telegram: TelegramConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub digest: DigestConfig,

    #[serde(default)]
    pub confirmation: ConfirmationConfig,
}

impl Settings {
    /// Database file path: configured path or ~/.duesbot/duesbot.db.
    pub fn database_path(&self) -> Result<PathBuf> {
        match &self.database.path {
            Some(path) => Ok(path.clone()),
            None => Ok(get_home_dir()?.join("duesbot.db")),
        }
    }

    pub fn clear_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.confirmation.clear_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let settings = load_settings(Some(&dir.path().join("nope.json"))).unwrap();
        assert_eq!(settings.digest.time, "09:00");
        assert_eq!(settings.digest.timezone, "America/Chicago");
        assert_eq!(settings.confirmation.clear_timeout_secs, 30);
        assert!(settings.digest.enabled);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"database": {"path": "/tmp/x.db"}, "digest": {"time": "18:30"}}"#,
        )
        .unwrap();

        let settings = load_settings(Some(&path)).unwrap();
        assert_eq!(settings.database_path().unwrap(), PathBuf::from("/tmp/x.db"));
        assert_eq!(settings.digest.time, "18:30");
        assert_eq!(settings.digest.timezone, "America/Chicago");
    }

    #[test]
    fn rejects_bad_timezone() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"digest": {"timezone": "Mars/Olympus"}}"#).unwrap();
        assert!(matches!(load_settings(Some(&path)), Err(Error::Config(_))));
    }

    #[test]
    fn rejects_zero_timeout() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"confirmation": {"clear_timeout_secs": 0}}"#).unwrap();
        assert!(matches!(load_settings(Some(&path)), Err(Error::Config(_))));
    }
}
