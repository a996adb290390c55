//! Layered configuration loading.
//!
//! Sources are applied in order, later ones winning:
//!
//! 1. built-in defaults
//! 2. a TOML or JSON file (or string)
//! 3. variables from a `.env` file
//! 4. process environment variables
//!
//! Environment keys have the form `PREFIX__SECTION__KEY`, e.g.
//! `JANUS__CACHE__DEFAULT_TIMEOUT=30s` or
//! `JANUS__TELEMETRY__LOGGING__LEVEL=debug`.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;

use janus_core::Ttl;
use janus_telemetry::LogFormat;

use crate::{ConfigError, JanusConfig};

/// Prefix used when none is given.
pub const DEFAULT_ENV_PREFIX: &str = "JANUS";

/// Builds a [`JanusConfig`] from layered sources.
///
/// # Example
///
/// ```no_run
/// use janus_config::ConfigLoader;
///
/// # fn main() -> Result<(), janus_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_optional_file("janus.toml")?
///     .with_dotenv()?
///     .with_env_prefix("JANUS")
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConfigLoader {
    config: JanusConfig,
    env_prefix: Option<String>,
    dotenv: BTreeMap<String, String>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Creates a loader holding the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: JanusConfig::default(),
            env_prefix: None,
            dotenv: BTreeMap::new(),
        }
    }

    /// Resets to the default configuration.
    #[must_use]
    pub fn with_defaults(mut self) -> Self {
        self.config = JanusConfig::default();
        self
    }

    /// Starts from [`JanusConfig::development`].
    #[must_use]
    pub fn with_development(mut self) -> Self {
        self.config = JanusConfig::development();
        self
    }

    /// Starts from [`JanusConfig::production`].
    #[must_use]
    pub fn with_production(mut self) -> Self {
        self.config = JanusConfig::production();
        self
    }

    /// Loads a `.toml` or `.json` file, chosen by extension.
    ///
    /// Sections present in the file replace the loaded ones; keys missing
    /// from a section take their defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file is missing, unreadable, malformed,
    /// or contains unknown keys.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;
        let format = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();
        self.config = parse(&content, &format).map_err(|e| match e {
            ConfigError::ValidationError(_) => ConfigError::validation_error(format!(
                "unsupported configuration file format: {}",
                path.display()
            )),
            other => other,
        })?;
        Ok(self)
    }

    /// Like [`with_file`](Self::with_file), but a missing file is skipped.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file exists but cannot be loaded.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Loads configuration text in the given format (`"toml"` or `"json"`).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the format is unsupported or parsing fails.
    ///
    /// # Example
    ///
    /// ```
    /// use janus_config::ConfigLoader;
    /// use janus_core::Ttl;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string("[cache]\ndefault_timeout = \"5m\"", "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(config.cache.default_timeout, Ttl::from_secs(300));
    /// ```
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        self.config = parse(content, &format.to_lowercase())?;
        Ok(self)
    }

    /// Reads environment overrides with keys of the form `PREFIX__SECTION__KEY`.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Reads `.env` from the working directory if it exists.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file exists but is malformed.
    pub fn with_dotenv(self) -> Result<Self, ConfigError> {
        if Path::new(".env").exists() {
            self.with_dotenv_file(".env")
        } else {
            Ok(self)
        }
    }

    /// Reads variables from a dotenv file.
    ///
    /// The variables are kept by the loader rather than exported to the
    /// process environment. They apply only under the env prefix, and real
    /// environment variables take precedence over them.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be read or parsed.
    pub fn with_dotenv_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let entries =
            dotenvy::from_path_iter(path).map_err(|e| ConfigError::dotenv_error(path, e))?;
        for entry in entries {
            let (key, value) = entry.map_err(|e| ConfigError::dotenv_error(path, e))?;
            self.dotenv.insert(key, value);
        }
        Ok(self)
    }

    /// Applies environment overrides and validates the result.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if an override is malformed or validation fails.
    pub fn load(self) -> Result<JanusConfig, ConfigError> {
        let config = self.resolve()?;
        config.validate()?;
        Ok(config)
    }

    /// Applies environment overrides without validating.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if an override is malformed.
    pub fn load_unvalidated(self) -> Result<JanusConfig, ConfigError> {
        self.resolve()
    }

    fn resolve(mut self) -> Result<JanusConfig, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            let dotenv = std::mem::take(&mut self.dotenv);
            let process: BTreeMap<String, String> = env::vars()
                .filter(|(key, _)| key.starts_with(&prefix))
                .collect();

            for (key, value) in dotenv.iter().filter(|(key, _)| key.starts_with(&prefix)) {
                if !process.contains_key(key) {
                    self.apply_env_var(key, value, &prefix)?;
                }
            }
            for (key, value) in &process {
                self.apply_env_var(key, value, &prefix)?;
            }
        }
        Ok(self.config)
    }

    fn apply_env_var(&mut self, key: &str, value: &str, prefix: &str) -> Result<(), ConfigError> {
        let Some(rest) = key.strip_prefix(prefix).and_then(|k| k.strip_prefix("__")) else {
            // Shares the prefix text but is not one of ours (e.g. JANUSX_...).
            return Ok(());
        };
        let parts: Vec<&str> = rest.split("__").collect();
        let config = &mut self.config;

        match parts.as_slice() {
            ["CACHE", "DEFAULT_TIMEOUT"] => {
                config.cache.default_timeout = parse_ttl(key, value)?;
            }
            ["CACHE", "MAX_TIMEOUT"] => {
                config.cache.max_timeout = parse_optional_ttl(key, value)?;
            }

            ["INTROSPECTION", "ENABLED"] => {
                config.introspection.enabled = bool_var(key, value)?;
            }
            ["INTROSPECTION", "ENDPOINT"] => {
                config.introspection.endpoint = non_empty(value);
            }
            ["INTROSPECTION", "CLIENT_ID"] => {
                config.introspection.client_id = value.to_string();
            }
            ["INTROSPECTION", "CLIENT_SECRET"] => {
                config.introspection.client_secret = value.to_string();
            }
            ["INTROSPECTION", "REQUIRED_SCOPES"] => {
                config.introspection.required_scopes = value
                    .split(|c: char| c == ',' || c.is_whitespace())
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect();
            }
            ["INTROSPECTION", "REALM"] => {
                config.introspection.realm = value.to_string();
            }
            ["INTROSPECTION", "CACHE_MAX_TIMEOUT"] => {
                config.introspection.cache_max_timeout = parse_optional_ttl(key, value)?;
            }

            ["TIMER", "ENABLED"] => {
                config.timer.enabled = bool_var(key, value)?;
            }
            ["TIMER", "NAME"] => {
                config.timer.name = value.to_string();
            }

            ["TELEMETRY", "SERVICE_NAME"] => {
                config.telemetry.service_name = value.to_string();
            }
            ["TELEMETRY", "LOGGING", "ENABLED"] => {
                config.telemetry.logging.enabled = bool_var(key, value)?;
            }
            ["TELEMETRY", "LOGGING", "LEVEL"] => {
                config.telemetry.logging.level = value.to_string();
            }
            ["TELEMETRY", "LOGGING", "FORMAT"] => {
                config.telemetry.logging.format = match value.to_lowercase().as_str() {
                    "json" => LogFormat::Json,
                    "pretty" => LogFormat::Pretty,
                    _ => {
                        return Err(ConfigError::env_parse_error(
                            key,
                            "expected 'json' or 'pretty'",
                        ))
                    }
                };
            }
            ["TELEMETRY", "METRICS", "ENABLED"] => {
                config.telemetry.metrics.enabled = bool_var(key, value)?;
            }
            ["TELEMETRY", "METRICS", "ADDR"] => {
                config.telemetry.metrics.addr = value.to_string();
            }

            [section, .., field] => {
                return Err(ConfigError::unknown_field(*field, *section));
            }
            _ => return Err(ConfigError::env_parse_error(key, "expected SECTION__KEY")),
        }

        Ok(())
    }
}

fn parse(content: &str, format: &str) -> Result<JanusConfig, ConfigError> {
    match format {
        "toml" => Ok(toml::from_str(content)?),
        "json" => Ok(serde_json::from_str(content)?),
        other => Err(ConfigError::validation_error(format!(
            "unsupported configuration format: {other}"
        ))),
    }
}

fn parse_ttl(key: &str, value: &str) -> Result<Ttl, ConfigError> {
    value
        .parse()
        .map_err(|e: janus_core::ParseTtlError| ConfigError::env_parse_error(key, e.to_string()))
}

// "none" and empty clear the setting; everywhere else "none" would read as a zero TTL.
fn parse_optional_ttl(key: &str, value: &str) -> Result<Option<Ttl>, ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
        Ok(None)
    } else {
        parse_ttl(key, trimmed).map(Some)
    }
}

fn bool_var(key: &str, value: &str) -> Result<bool, ConfigError> {
    parse_bool(value).ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Parses `true/1/yes/on` and `false/0/no/off`, case-insensitively.
#[must_use]
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
