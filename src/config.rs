//! Service configuration from environment variables

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be a positive whole number, got {value:?}")]
    InvalidNumber { name: &'static str, value: String },
    #[error("USSD_SESSION_BACKEND must be \"memory\" or \"sqlite\", got {0:?}")]
    UnknownBackend(String),
    #[error("SMS_API_URL is set but {0} is missing")]
    IncompleteSms(&'static str),
}

/// Where sessions are kept
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionBackend {
    Memory,
    Sqlite { path: PathBuf },
}

/// Outbound SMS gateway credentials
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmsConfig {
    pub api_url: String,
    pub api_key: String,
    pub username: String,
    pub sender_id: Option<String>,
}

/// Learning platform REST backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformConfig {
    pub base_url: String,
    pub token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub port: u16,
    pub session_timeout: Duration,
    pub sweep_interval: Duration,
    pub backend: SessionBackend,
    pub max_screen_chars: usize,
    pub service_code: String,
    pub external_url: String,
    /// Platform backend; the fixture file is used when absent
    pub platform: Option<PlatformConfig>,
    pub fixture_path: PathBuf,
    /// SMS gateway; messages are only logged when absent
    pub sms: Option<SmsConfig>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source; blank values count as unset
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let backend = match var("USSD_SESSION_BACKEND").as_deref() {
            None | Some("memory") => SessionBackend::Memory,
            Some("sqlite") => SessionBackend::Sqlite {
                path: var("USSD_SESSION_DB_PATH").map_or_else(default_db_path, PathBuf::from),
            },
            Some(other) => return Err(ConfigError::UnknownBackend(other.to_string())),
        };

        let platform = var("PLATFORM_API_URL").map(|base_url| PlatformConfig {
            base_url,
            token: var("PLATFORM_API_TOKEN"),
        });

        let sms = match var("SMS_API_URL") {
            Some(api_url) => Some(SmsConfig {
                api_url,
                api_key: var("SMS_API_KEY").ok_or(ConfigError::IncompleteSms("SMS_API_KEY"))?,
                username: var("SMS_USERNAME").ok_or(ConfigError::IncompleteSms("SMS_USERNAME"))?,
                sender_id: var("SMS_SENDER_ID"),
            }),
            None => None,
        };

        Ok(Self {
            port: number(&var, "USSD_PORT", 8000)?,
            session_timeout: Duration::from_secs(number(&var, "USSD_SESSION_TIMEOUT_SECS", 300)?),
            sweep_interval: Duration::from_secs(number(&var, "USSD_SWEEP_INTERVAL_SECS", 60)?),
            backend,
            max_screen_chars: number(&var, "USSD_MAX_SCREEN_CHARS", 182)?,
            service_code: var("USSD_SERVICE_CODE").unwrap_or_else(|| "*384#".to_string()),
            external_url: var("USSD_EXTERNAL_URL")
                .unwrap_or_else(|| "the training web portal".to_string()),
            platform,
            fixture_path: var("USSD_FIXTURE_PATH")
                .map_or_else(|| PathBuf::from("data/demo.json"), PathBuf::from),
            sms,
        })
    }

    /// Human form of the session timeout for the status endpoint
    pub fn timeout_label(&self) -> String {
        let secs = self.session_timeout.as_secs();
        match (secs / 60, secs % 60) {
            (1, 0) => "1 minute".to_string(),
            (minutes, 0) => format!("{minutes} minutes"),
            (0, 1) => "1 second".to_string(),
            _ => format!("{secs} seconds"),
        }
    }
}

fn default_db_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(format!("{home}/.ussd-dialogue/sessions.db"))
}

/// Parse a positive number, falling back to `default` when unset
fn number<T: std::str::FromStr + PartialOrd + Default>(
    var: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    let Some(raw) = var(name) else {
        return Ok(default);
    };
    match raw.trim().parse::<T>() {
        Ok(value) if value > T::default() => Ok(value),
        _ => Err(ConfigError::InvalidNumber { name, value: raw }),
    }
}
