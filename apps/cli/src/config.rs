use std::time::Duration;
use std::{env, fmt, fs, path};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;
use watchdog::notify::MailgunConfig;
use watchdog::probe::DEFAULT_TIMEOUT;
use watchdog::runner::DEFAULT_MAX_WORKERS;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read {0}: {1}")]
    ReadFailed(path::PathBuf, #[source] std::io::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(path::PathBuf, #[source] std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(path::PathBuf, #[source] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    SerializeFailed(#[from] toml::ser::Error),
    #[error("neither XDG_CONFIG_HOME nor a home directory is available")]
    ConfigPathUnavailable,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub runner: Runner,
    pub notify: Notify,
    pub mailgun: Mailgun,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Runner {
    pub max_workers: usize,
    pub timeout_seconds: u64,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Notify {
    pub enabled: bool,
    /// Also mail passing tests
    pub on_success: bool,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Mailgun {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
}

impl Default for Runner {
    fn default() -> Self {
        Self { max_workers: DEFAULT_MAX_WORKERS, timeout_seconds: DEFAULT_TIMEOUT.as_secs() }
    }
}

impl Runner {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Mailgun {
    /// Complete Mailgun settings, if every field is present
    pub fn resolved(&self) -> Option<MailgunConfig> {
        Some(MailgunConfig {
            api_url: self.api_url.clone()?,
            api_token: self.api_token.clone()?,
            from: self.from.clone()?,
        })
    }
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/api-watchdog/config.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, Error> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(Error::ConfigPathUnavailable);
    };

    Ok(path.join("api-watchdog/config.toml"))
}

fn mask(secret: &Option<String>) -> &'static str {
    if secret.is_some() { "********" } else { "<unset>" }
}

fn or_unset(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("<unset>")
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_1 = write_indented(1);

        writeln!(f, "Current Watchdog Configuration:")?;
        write_title_1(f, "Runner")?;
        write_1(f, "Max Workers", &self.runner.max_workers)?;
        write_1(f, "Timeout (s)", &self.runner.timeout_seconds)?;
        write_title_1(f, "Notify")?;
        write_1(f, "Enabled", &self.notify.enabled)?;
        write_1(f, "On Success", &self.notify.on_success)?;
        write_title_1(f, "Mailgun")?;
        write_1(f, "API URL", &or_unset(&self.mailgun.api_url))?;
        write_1(f, "API Token", &mask(&self.mailgun.api_token))?;
        write_1(f, "From", &or_unset(&self.mailgun.from))?;

        Ok(())
    }
}

impl Config {
    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/api-watchdog/config.toml
    /// or the specified path if one does not exist. When that file cannot be
    /// written the defaults are still used.
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, Error> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            match default_config_path() {
                Ok(path) => path,
                Err(err) => {
                    warn!("Using default configuration: {}", err);
                    return Ok(Self::default());
                }
            }
        };

        if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path)
                .map_err(|err| Error::ReadFailed(config_path.clone(), err))?;
            toml::from_str(raw_string.as_str())
                .map_err(|err| Error::ParseFailed(config_path.clone(), err))
        } else {
            let config = Self::default();
            if let Err(err) = config.write_config(&config_path) {
                warn!("Using default configuration: {}", err);
            }
            Ok(config)
        }
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &path::Path) -> Result<(), Error> {
        let config_str: String = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| Error::WriteFailed(path.to_path_buf(), err))?;
        }

        fs::write(path, config_str).map_err(|err| Error::WriteFailed(path.to_path_buf(), err))
    }

    /// Fill unset Mailgun fields from `MAILGUN_API_URL`, `MAILGUN_API_TOKEN`
    /// and `MAILGUN_FROM`
    pub fn with_env(self) -> Self {
        self.with_lookup(|name| env::var(name).ok())
    }

    fn with_lookup(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |name: &str| lookup(name).filter(|value| !value.is_empty());
        let mailgun = &mut self.mailgun;

        if mailgun.api_url.is_none() {
            mailgun.api_url = get("MAILGUN_API_URL");
        }
        if mailgun.api_token.is_none() {
            mailgun.api_token = get("MAILGUN_API_TOKEN");
        }
        if mailgun.from.is_none() {
            mailgun.from = get("MAILGUN_FROM");
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/config.toml");

        let config = Config::from_config(Some(&path)).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.runner.max_workers, 16);
        assert_eq!(config.runner.timeout(), Duration::from_secs(120));
        assert!(path.exists());

        let reread = Config::from_config(Some(&path)).unwrap();
        assert_eq!(reread, config);
    }

    #[test]
    fn test_unwritable_path_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "a file, not a directory").unwrap();
        let path = blocker.join("config.toml");

        assert!(matches!(
            Config::default().write_config(&path),
            Err(Error::WriteFailed(..))
        ));

        let config = Config::from_config(Some(&path)).unwrap();
        assert_eq!(config, Config::default());
        assert!(!path.exists());
    }

    #[test]
    fn test_path_is_normalized_to_toml() {
        let dir = tempfile::tempdir().unwrap();
        Config::from_config(Some(dir.path().join("watchdog"))).unwrap();
        assert!(dir.path().join("watchdog.toml").exists());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[runner]\nmax_workers = 4\n\n[notify]\nenabled = true\n").unwrap();

        let config = Config::from_config(Some(&path)).unwrap();
        assert_eq!(config.runner.max_workers, 4);
        assert_eq!(config.runner.timeout_seconds, 120);
        assert!(config.notify.enabled);
        assert!(!config.notify.on_success);
        assert_eq!(config.mailgun.resolved(), None);
    }

    #[test]
    fn test_invalid_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[runner\n").unwrap();

        assert!(matches!(Config::from_config(Some(&path)), Err(Error::ParseFailed(..))));
    }

    #[test]
    fn test_env_fills_only_missing_mailgun_fields() {
        let mut config = Config::default();
        config.mailgun.from = Some("ops@example.com".into());

        let config = config.with_lookup(|name| match name {
            "MAILGUN_API_URL" => Some("https://api.mailgun.net/v3/example.com/messages".into()),
            "MAILGUN_API_TOKEN" => Some("key-123".into()),
            "MAILGUN_FROM" => Some("other@example.com".into()),
            _ => None,
        });

        let resolved = config.mailgun.resolved().unwrap();
        assert_eq!(resolved.from, "ops@example.com");
        assert_eq!(resolved.api_token, "key-123");
    }

    #[test]
    fn test_display_masks_token() {
        let mut config = Config::default();
        config.mailgun.api_token = Some("key-123".into());

        let shown = config.to_string();
        assert!(shown.contains("Max Workers: 16"));
        assert!(shown.contains("API Token: ********"));
        assert!(shown.contains("From: <unset>"));
        assert!(!shown.contains("key-123"));
    }
}
