//! Runtime configuration from environment variables.
//!
//! Every key has a default except `JWT_SECRET`, which is required unless
//! `DEV_MODE=true`. Values that are present but malformed fail startup.

use std::path::PathBuf;

use chrono::{Duration, NaiveTime};
use thiserror::Error;
use url::Url;

use crate::task::LifecyclePolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key} is required")]
    Missing { key: &'static str },

    #[error("invalid {key}={value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    /// Relay endpoints, tried in order.
    pub relay_urls: Vec<Url>,
    pub from: String,
    pub api_key: Option<String>,
}

impl MailConfig {
    pub fn enabled(&self) -> bool {
        !self.relay_urls.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: PathBuf,
    pub blob_dir: PathBuf,
    /// Base URL under which stored blobs are served.
    pub public_base_url: Url,
    pub jwt_secret: Option<String>,
    /// Skip authentication and act as admin on every request.
    pub dev_mode: bool,
    pub assignment_sla: Duration,
    /// UTC wall-clock time of the daily overdue scan.
    pub overdue_scan_at: NaiveTime,
    pub allow_late_submission: bool,
    pub dispatch_timeout: std::time::Duration,
    pub mail: MailConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let host = get("HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let port = parse(&get, "PORT", 3000u16)?;
        let dev_mode = parse_bool(&get, "DEV_MODE", false)?;

        let public_base_url = match get("PUBLIC_BASE_URL") {
            Some(raw) => Url::parse(&raw).map_err(|e| invalid("PUBLIC_BASE_URL", &raw, e))?,
            None => {
                let raw = format!("http://{}:{}/files", host, port);
                Url::parse(&raw).map_err(|e| invalid("HOST", &host, e))?
            }
        };

        let jwt_secret = get("JWT_SECRET");
        if jwt_secret.is_none() && !dev_mode {
            return Err(ConfigError::Missing { key: "JWT_SECRET" });
        }

        let sla_hours = parse(&get, "ASSIGNMENT_SLA_HOURS", 48i64)?;
        if sla_hours <= 0 {
            return Err(invalid(
                "ASSIGNMENT_SLA_HOURS",
                &sla_hours.to_string(),
                "must be positive",
            ));
        }

        let overdue_scan_at = match get("OVERDUE_SCAN_AT") {
            Some(raw) => NaiveTime::parse_from_str(&raw, "%H:%M")
                .map_err(|e| invalid("OVERDUE_SCAN_AT", &raw, e))?,
            None => NaiveTime::MIN,
        };

        let relay_urls = match get("MAIL_RELAY_URLS") {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| Url::parse(s).map_err(|e| invalid("MAIL_RELAY_URLS", s, e)))
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };

        Ok(Self {
            database_path: get("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data/fieldcheck.sqlite")),
            blob_dir: get("BLOB_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data/blobs")),
            public_base_url,
            jwt_secret,
            dev_mode,
            assignment_sla: Duration::hours(sla_hours),
            overdue_scan_at,
            allow_late_submission: parse_bool(&get, "ALLOW_LATE_SUBMISSION", true)?,
            dispatch_timeout: std::time::Duration::from_secs(parse(
                &get,
                "DISPATCH_TIMEOUT_SECS",
                15u64,
            )?),
            mail: MailConfig {
                relay_urls,
                from: get("MAIL_FROM").unwrap_or_else(|| "no-reply@fieldcheck.local".to_string()),
                api_key: get("MAIL_API_KEY"),
            },
            host,
            port,
        })
    }

    pub fn policy(&self) -> LifecyclePolicy {
        LifecyclePolicy {
            sla: self.assignment_sla,
            allow_late_submission: self.allow_late_submission,
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn invalid(key: &'static str, value: &str, reason: impl ToString) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse<T>(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: ToString,
{
    match get(key) {
        Some(raw) => raw.parse().map_err(|e: T::Err| invalid(key, &raw, e)),
        None => Ok(default),
    }
}

fn parse_bool(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: bool,
) -> Result<bool, ConfigError> {
    match get(key) {
        Some(raw) => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(invalid(key, &raw, "expected true or false")),
        },
        None => Ok(default),
    }
}
