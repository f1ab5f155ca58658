use crate::infrastructure::error::InfraError;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

const APP_JSON: &str = "app.json";
const SUPPORTED_SCHEMA: u64 = 1;
const DEFAULT_CALENDAR_ID: &str = "primary";
const DEFAULT_FALLBACK_TIMEZONE: &str = "UTC";
const DEFAULT_ACCESS_TOKEN_ENV: &str = "DAYCAL_ACCESS_TOKEN";
const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    pub schema: u8,
    #[serde(default = "default_calendar_id")]
    pub calendar_id: String,
    #[serde(default = "default_fallback_timezone")]
    pub fallback_timezone: String,
    #[serde(default = "default_access_token_env")]
    pub access_token_env: String,
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            schema: SUPPORTED_SCHEMA as u8,
            calendar_id: default_calendar_id(),
            fallback_timezone: default_fallback_timezone(),
            access_token_env: default_access_token_env(),
            request_timeout_seconds: default_request_timeout_seconds(),
        }
    }
}

impl AppConfig {
    pub fn fallback_zone(&self) -> Result<Tz, InfraError> {
        parse_zone(&self.fallback_timezone)
    }
}

fn default_calendar_id() -> String {
    DEFAULT_CALENDAR_ID.to_string()
}

fn default_fallback_timezone() -> String {
    DEFAULT_FALLBACK_TIMEZONE.to_string()
}

fn default_access_token_env() -> String {
    DEFAULT_ACCESS_TOKEN_ENV.to_string()
}

fn default_request_timeout_seconds() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECONDS
}

pub fn parse_zone(value: &str) -> Result<Tz, InfraError> {
    value
        .trim()
        .parse::<Tz>()
        .map_err(|error| InfraError::InvalidTimezone(format!("'{value}': {error}")))
}

/// The machine's IANA zone, when the OS reports one chrono-tz knows.
pub fn detect_machine_zone() -> Option<Tz> {
    let name = match iana_time_zone::get_timezone() {
        Ok(name) => name,
        Err(error) => {
            tracing::warn!(%error, "could not read the machine timezone");
            return None;
        }
    };
    match parse_zone(&name) {
        Ok(zone) => Some(zone),
        Err(error) => {
            tracing::warn!(%error, "machine timezone is not a known IANA zone");
            None
        }
    }
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), InfraError> {
    let path = config_dir.join(APP_JSON);
    if !path.exists() {
        let formatted = serde_json::to_string_pretty(&AppConfig::default())?;
        fs::write(path, format!("{formatted}\n"))?;
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != SUPPORTED_SCHEMA {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

pub fn load_app_config(config_dir: &Path) -> Result<AppConfig, InfraError> {
    let path = config_dir.join(APP_JSON);
    let mut config: AppConfig = serde_json::from_value(read_config(&path)?)?;

    config.calendar_id = config.calendar_id.trim().to_string();
    if config.calendar_id.is_empty() {
        return Err(InfraError::InvalidConfig(format!(
            "calendarId must not be empty in {}",
            path.display()
        )));
    }
    if config.access_token_env.trim().is_empty() {
        return Err(InfraError::InvalidConfig(format!(
            "accessTokenEnv must not be empty in {}",
            path.display()
        )));
    }
    if config.request_timeout_seconds == 0 {
        return Err(InfraError::InvalidConfig(format!(
            "requestTimeoutSeconds must be positive in {}",
            path.display()
        )));
    }
    config.fallback_zone().map_err(|error| {
        InfraError::InvalidConfig(format!("fallbackTimezone in {}: {error}", path.display()))
    })?;
    Ok(config)
}
