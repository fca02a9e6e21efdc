//! Configuration loading for switchwatch.
//!
//! Values are resolved in increasing precedence from built-in defaults, an
//! optional TOML file, and environment variables:
//!
//! ```toml
//! [slack]
//! token = "${SLACK_TOKEN}"
//! channel = "#door"
//! verification_token = "${SLACK_VERIFICATION_TOKEN}"
//! timeout_secs = 5
//!
//! [gpio]
//! pin = 17
//!
//! [http]
//! listen = "0.0.0.0:8080"
//!
//! [log]
//! dir = "logs"
//! compaction_interval_secs = 3600
//! retention_secs = 86400
//!
//! [monitor]
//! poll_interval_ms = 100
//! ```
//!
//! The Slack token, channel, and verification token are required; everything
//! else has a default.

mod file;

pub use file::{
    FileConfig, GpioSection, HttpSection, LogSection, MonitorSection, SlackSection,
    expand_env_vars,
};

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs, io};

use switchwatch_types::SecretString;
use thiserror::Error;
use toml::de;

pub const DEFAULT_SLACK_API_BASE: &str = "https://slack.com/api";
pub const DEFAULT_SLACK_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_GPIO_PIN: u32 = 17;
pub const DEFAULT_SYSFS_GPIO_ROOT: &str = "/sys/class/gpio";
pub const DEFAULT_LISTEN: &str = "0.0.0.0:8080";
pub const DEFAULT_LOG_DIR: &str = "logs";
pub const DEFAULT_LOG_FILE: &str = "switchwatch.log";
pub const DEFAULT_COMPACTION_INTERVAL: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "SWITCHWATCH_CONFIG";

pub const ENV_SLACK_TOKEN: &str = "SLACK_TOKEN";
pub const ENV_SLACK_CHANNEL: &str = "SLACK_CHANNEL";
pub const ENV_SLACK_VERIFICATION_TOKEN: &str = "SLACK_VERIFICATION_TOKEN";
pub const ENV_SLACK_API_BASE: &str = "SLACK_API_BASE";
pub const ENV_GPIO_PIN: &str = "SWITCHWATCH_GPIO_PIN";
pub const ENV_LISTEN: &str = "SWITCHWATCH_LISTEN";
pub const ENV_LOG_DIR: &str = "SWITCHWATCH_LOG_DIR";
pub const ENV_LOG_STDERR: &str = "SWITCHWATCH_LOG_STDERR";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: io::Error,
    },
    #[error("failed to parse config at {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: de::Error,
    },
    #[error("missing required setting {key} (set {env} or add it to the config file)")]
    Missing { key: &'static str, env: &'static str },
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Fully resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct SwitchwatchConfig {
    pub slack: SlackConfig,
    pub gpio: GpioConfig,
    pub http: HttpConfig,
    pub log: LogConfig,
    pub monitor: MonitorConfig,
}

#[derive(Debug, Clone)]
pub struct SlackConfig {
    /// Bot token used for `chat.postMessage`.
    pub token: SecretString,
    /// Channel that receives transition notifications.
    pub channel: String,
    /// Shared secret that opt-in requests must present.
    pub verification_token: SecretString,
    pub api_base: String,
    /// Upper bound on one delivery attempt.
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct GpioConfig {
    pub pin: u32,
    pub sysfs_root: PathBuf,
}

#[derive(Debug, Clone, Copy)]
pub struct HttpConfig {
    pub listen: SocketAddr,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub dir: PathBuf,
    pub file_name: String,
    /// Mirror log output to stderr in addition to the log file.
    pub stderr: bool,
    pub compaction_interval: Duration,
    pub retention: Duration,
}

impl LogConfig {
    #[must_use]
    pub fn file_path(&self) -> PathBuf {
        self.dir.join(&self.file_name)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MonitorConfig {
    pub poll_interval: Duration,
}

impl SwitchwatchConfig {
    /// Load from the config file (if any) and the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let file = match config_path() {
            Some(path) => FileConfig::load(&path)?,
            None => None,
        };
        Self::resolve(file.unwrap_or_default(), |key| env::var(key).ok())
    }

    /// Merge a parsed file with an environment lookup.
    ///
    /// `lookup` is used both for direct overrides and for `${VAR}` expansion
    /// inside file values, so tests can supply a fixed environment.
    pub fn resolve<F>(file: FileConfig, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env_value = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let file_value = |value: Option<String>| {
            value
                .map(|v| expand_env_vars(&v, &lookup))
                .filter(|v| !v.trim().is_empty())
        };

        let slack_file = file.slack.unwrap_or_default();
        let gpio_file = file.gpio.unwrap_or_default();
        let http_file = file.http.unwrap_or_default();
        let log_file = file.log.unwrap_or_default();
        let monitor_file = file.monitor.unwrap_or_default();

        let token = env_value(ENV_SLACK_TOKEN)
            .or_else(|| file_value(slack_file.token))
            .ok_or(ConfigError::Missing {
                key: "slack.token",
                env: ENV_SLACK_TOKEN,
            })?;
        let channel = env_value(ENV_SLACK_CHANNEL)
            .or_else(|| file_value(slack_file.channel))
            .ok_or(ConfigError::Missing {
                key: "slack.channel",
                env: ENV_SLACK_CHANNEL,
            })?;
        let verification_token = env_value(ENV_SLACK_VERIFICATION_TOKEN)
            .or_else(|| file_value(slack_file.verification_token))
            .ok_or(ConfigError::Missing {
                key: "slack.verification_token",
                env: ENV_SLACK_VERIFICATION_TOKEN,
            })?;
        let api_base = env_value(ENV_SLACK_API_BASE)
            .or_else(|| file_value(slack_file.api_base))
            .unwrap_or_else(|| DEFAULT_SLACK_API_BASE.to_string());
        let timeout = seconds(
            "slack.timeout_secs",
            slack_file.timeout_secs,
            DEFAULT_SLACK_TIMEOUT,
        )?;

        let pin = match env_value(ENV_GPIO_PIN) {
            Some(raw) => raw.trim().parse::<u32>().map_err(|e| ConfigError::Invalid {
                key: "gpio.pin",
                reason: format!("{raw:?} is not a pin number ({e})"),
            })?,
            None => gpio_file.pin.unwrap_or(DEFAULT_GPIO_PIN),
        };
        let sysfs_root = file_value(gpio_file.sysfs_root)
            .map_or_else(|| PathBuf::from(DEFAULT_SYSFS_GPIO_ROOT), PathBuf::from);

        let listen_raw = env_value(ENV_LISTEN)
            .or_else(|| file_value(http_file.listen))
            .unwrap_or_else(|| DEFAULT_LISTEN.to_string());
        let listen = listen_raw
            .trim()
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::Invalid {
                key: "http.listen",
                reason: format!("{listen_raw:?} is not a socket address ({e})"),
            })?;

        let dir = env_value(ENV_LOG_DIR)
            .or_else(|| file_value(log_file.dir))
            .map_or_else(|| PathBuf::from(DEFAULT_LOG_DIR), PathBuf::from);
        let file_name =
            file_value(log_file.file_name).unwrap_or_else(|| DEFAULT_LOG_FILE.to_string());
        if Path::new(&file_name).components().count() != 1 {
            return Err(ConfigError::Invalid {
                key: "log.file_name",
                reason: format!("{file_name:?} must be a bare file name"),
            });
        }
        let stderr = match env_value(ENV_LOG_STDERR) {
            Some(raw) => parse_bool("log.stderr", &raw)?,
            None => log_file.stderr.unwrap_or(false),
        };
        let compaction_interval = seconds(
            "log.compaction_interval_secs",
            log_file.compaction_interval_secs,
            DEFAULT_COMPACTION_INTERVAL,
        )?;
        let retention = seconds(
            "log.retention_secs",
            log_file.retention_secs,
            DEFAULT_RETENTION,
        )?;

        let poll_interval = match monitor_file.poll_interval_ms {
            Some(0) => {
                return Err(ConfigError::Invalid {
                    key: "monitor.poll_interval_ms",
                    reason: "must be greater than zero".to_string(),
                });
            }
            Some(ms) => Duration::from_millis(ms),
            None => DEFAULT_POLL_INTERVAL,
        };

        Ok(Self {
            slack: SlackConfig {
                token: SecretString::new(token),
                channel,
                verification_token: SecretString::new(verification_token),
                api_base: api_base.trim_end_matches('/').to_string(),
                timeout,
            },
            gpio: GpioConfig { pin, sysfs_root },
            http: HttpConfig { listen },
            log: LogConfig {
                dir,
                file_name,
                stderr,
                compaction_interval,
                retention,
            },
            monitor: MonitorConfig { poll_interval },
        })
    }
}

fn seconds(
    key: &'static str,
    value: Option<u64>,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match value {
        Some(0) => Err(ConfigError::Invalid {
            key,
            reason: "must be greater than zero".to_string(),
        }),
        Some(secs) => Ok(Duration::from_secs(secs)),
        None => Ok(default),
    }
}

fn parse_bool(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::Invalid {
            key,
            reason: format!("{other:?} is not a boolean"),
        }),
    }
}

/// Location of the optional config file.
///
/// `$SWITCHWATCH_CONFIG` wins; otherwise `~/.switchwatch/config.toml`.
#[must_use]
pub fn config_path() -> Option<PathBuf> {
    if let Ok(explicit) = env::var(CONFIG_PATH_ENV)
        && !explicit.trim().is_empty()
    {
        return Some(PathBuf::from(explicit));
    }
    dirs::home_dir().map(|home| home.join(".switchwatch").join("config.toml"))
}

impl FileConfig {
    /// Read and parse `path`. A missing file is not an error.
    pub fn load(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file; using environment only");
            return Ok(None);
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&content)
            .map(Some)
            .map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })
    }
}
