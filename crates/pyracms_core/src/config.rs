use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_LOCALE: &str = "en_GB";
pub const DEFAULT_LOG_FILTER: &str = "warn";
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_PASSWORD_ROUNDS: u32 = 25_000;

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct CmsConfig {
    #[serde(default)]
    pub database: DatabaseSection,
    #[serde(default)]
    pub defaults: DefaultsSection,
    #[serde(default)]
    pub security: SecuritySection,
    #[serde(default)]
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct DatabaseSection {
    pub busy_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct DefaultsSection {
    pub locale: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct SecuritySection {
    pub password_rounds: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct LoggingSection {
    pub filter: Option<String>,
}

impl CmsConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(
            self.database
                .busy_timeout_ms
                .unwrap_or(DEFAULT_BUSY_TIMEOUT_MS),
        )
    }

    pub fn default_locale(&self) -> &str {
        self.defaults.locale.as_deref().unwrap_or(DEFAULT_LOCALE)
    }

    /// Resolve PBKDF2 rounds: env PYRACMS_PASSWORD_ROUNDS > config > DEFAULT_PASSWORD_ROUNDS.
    pub fn password_rounds(&self) -> u32 {
        if let Ok(value) = env::var("PYRACMS_PASSWORD_ROUNDS")
            && let Ok(rounds) = value.trim().parse::<u32>()
            && rounds > 0
        {
            return rounds;
        }
        self.security
            .password_rounds
            .filter(|rounds| *rounds > 0)
            .unwrap_or(DEFAULT_PASSWORD_ROUNDS)
    }

    /// Resolve the log filter directive: env PYRACMS_LOG > config > DEFAULT_LOG_FILTER.
    pub fn log_filter(&self) -> String {
        if let Ok(value) = env::var("PYRACMS_LOG") {
            let trimmed = value.trim().to_string();
            if !trimmed.is_empty() {
                return trimmed;
            }
        }
        self.logging
            .filter
            .clone()
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string())
    }
}

/// Load and parse a CmsConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<CmsConfig> {
    if !config_path.exists() {
        return Ok(CmsConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: CmsConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn load_config_returns_default_for_missing_file() {
        let config = load_config(Path::new("/nonexistent/config.toml")).expect("load config");
        assert_eq!(config, CmsConfig::default());
        assert_eq!(config.default_locale(), "en_GB");
        assert_eq!(config.busy_timeout(), Duration::from_millis(5_000));
    }

    #[test]
    fn load_config_parses_sections() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("config.toml");
        fs::write(
            &config_path,
            r#"
[database]
busy_timeout_ms = 250

[defaults]
locale = "fr_FR"

[security]
password_rounds = 1000

[logging]
filter = "pyracms_core=debug"
"#,
        )
        .expect("write config");

        let config = load_config(&config_path).expect("load config");
        assert_eq!(config.busy_timeout(), Duration::from_millis(250));
        assert_eq!(config.default_locale(), "fr_FR");
        assert_eq!(config.security.password_rounds, Some(1000));
        assert_eq!(config.logging.filter.as_deref(), Some("pyracms_core=debug"));
    }

    #[test]
    fn load_config_tolerates_partial_toml() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("config.toml");
        fs::write(&config_path, "[defaults]\nlocale = \"de_DE\"\n").expect("write config");

        let config = load_config(&config_path).expect("load config");
        assert_eq!(config.default_locale(), "de_DE");
        assert!(config.database.busy_timeout_ms.is_none());
    }

    #[test]
    fn load_config_returns_error_for_invalid_toml() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("config.toml");
        fs::write(&config_path, "[database\nbusy_timeout_ms = 1").expect("write config");
        let error = load_config(&config_path).expect_err("must fail");
        assert!(error.to_string().contains("failed to parse"));
    }

    #[test]
    fn zero_password_rounds_fall_back_to_default() {
        let config = CmsConfig {
            security: SecuritySection {
                password_rounds: Some(0),
            },
            ..CmsConfig::default()
        };
        if env::var("PYRACMS_PASSWORD_ROUNDS").is_err() {
            assert_eq!(config.password_rounds(), DEFAULT_PASSWORD_ROUNDS);
        }
    }
}
