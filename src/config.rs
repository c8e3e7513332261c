//! Runtime configuration from the process environment.
//! Defaults: 2 s refresh, 1000-row history, timestamps shown in Asia/Kolkata.

use crate::services::live::RefreshInterval;
use chrono_tz::Tz;
use core::fmt;
use log::warn;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::num::NonZeroU32;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_REFRESH_SECS: u64 = 2;
pub const DEFAULT_HISTORY_LIMIT: u32 = 1000;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_DISPLAY_TZ: &str = "Asia/Kolkata";

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum View {
    Live,
    History,
    Forecast,
}

impl FromStr for View {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "l" | "live" | "current" => Ok(View::Live),
            "h" | "history" | "stored" => Ok(View::History),
            "f" | "forecast" | "future" => Ok(View::Forecast),
            other => Err(format!("unknown view {:?} (expected live, history or forecast)", other)),
        }
    }
}

impl Display for View {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            View::Live => "live",
            View::History => "history",
            View::Forecast => "forecast",
        };
        f.write_str(name)
    }
}

/// Where readings are fetched from.
#[derive(Clone, PartialEq, Eq)]
pub enum StoreConfig {
    Postgres { database_url: String },
    Rest { url: String, api_key: String },
    Fake,
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            StoreConfig::Postgres { .. } => f.write_str("Postgres { database_url: <redacted> }"),
            StoreConfig::Rest { url, .. } => write!(f, "Rest {{ url: {:?}, api_key: <redacted> }}", url),
            StoreConfig::Fake => f.write_str("Fake"),
        }
    }
}

impl StoreConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            StoreConfig::Postgres { .. } => "postgres",
            StoreConfig::Rest { .. } => "rest",
            StoreConfig::Fake => "fake",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub store: StoreConfig,
    /// Live view refresh cadence, already clamped to its allowed range.
    pub refresh_interval: RefreshInterval,
    /// Rows fetched when the historical view is opened.
    pub history_limit: NonZeroU32,
    /// Upper bound for a single round trip to the store.
    pub request_timeout: Duration,
    /// IANA zone every timestamp is shown in.
    pub display_tz: Tz,
    pub default_view: View,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid { key: &'static str, reason: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "missing configuration: {}", key),
            ConfigError::Invalid { key, reason } => write!(f, "invalid {}: {}", key, reason),
        }
    }
}

impl Error for ConfigError {}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let fake = get("FAKE_DATA")
            .map(|s| matches!(s.as_str(), "1" | "true" | "TRUE" | "yes"))
            .unwrap_or(false);
        let store = if fake {
            StoreConfig::Fake
        } else if let Some(database_url) = get("DATABASE_URL") {
            StoreConfig::Postgres { database_url }
        } else {
            let url = get("SUPABASE_URL").ok_or(ConfigError::Missing("SUPABASE_URL (or DATABASE_URL / FAKE_DATA)"))?;
            let api_key = get("SUPABASE_KEY").ok_or(ConfigError::Missing("SUPABASE_KEY"))?;
            StoreConfig::Rest { url, api_key }
        };

        let refresh_secs = parse_number(get("REFRESH_INTERVAL_SECS"), "REFRESH_INTERVAL_SECS", DEFAULT_REFRESH_SECS)?;
        let refresh_interval = RefreshInterval::clamped(refresh_secs);
        if refresh_interval.as_duration().as_secs() != refresh_secs {
            warn!(
                "REFRESH_INTERVAL_SECS={} is outside {}..={}s; using {}s",
                refresh_secs,
                RefreshInterval::MIN.as_secs(),
                RefreshInterval::MAX.as_secs(),
                refresh_interval.as_duration().as_secs()
            );
        }

        let history_limit = parse_number(get("HISTORY_LIMIT"), "HISTORY_LIMIT", DEFAULT_HISTORY_LIMIT)?;
        let history_limit = NonZeroU32::new(history_limit).ok_or_else(|| ConfigError::Invalid {
            key: "HISTORY_LIMIT",
            reason: "must be positive".to_string(),
        })?;

        let timeout_secs = parse_number(get("REQUEST_TIMEOUT_SECS"), "REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS)?;
        if timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "REQUEST_TIMEOUT_SECS",
                reason: "must be positive".to_string(),
            });
        }

        let display_tz = get("DISPLAY_TZ")
            .as_deref()
            .unwrap_or(DEFAULT_DISPLAY_TZ)
            .parse::<Tz>()
            .map_err(|e| ConfigError::Invalid {
                key: "DISPLAY_TZ",
                reason: e.to_string(),
            })?;

        let default_view = match get("DEFAULT_VIEW") {
            Some(s) => s.parse().map_err(|reason| ConfigError::Invalid {
                key: "DEFAULT_VIEW",
                reason,
            })?,
            None => View::Live,
        };

        Ok(Config {
            store,
            refresh_interval,
            history_limit,
            request_timeout: Duration::from_secs(timeout_secs),
            display_tz,
            default_view,
        })
    }
}

fn parse_number<T: FromStr>(raw: Option<String>, key: &'static str, default: T) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(s) => s.parse().map_err(|_| ConfigError::Invalid {
            key,
            reason: format!("{:?} is not a non-negative integer", s),
        }),
    }
}
