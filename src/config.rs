//! Startup configuration, read once from the process environment.
//!
//! A `.env` file in the working directory is loaded first (if present) so
//! local development doesn't need exported variables.

use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_WEATHER_URL: &str = "https://api.openweathermap.org/data/2.5/weather";
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("DISCORD_TOKEN environment variable not set")]
    MissingToken,
    #[error("HTTP_TIMEOUT_SECS must be a positive integer, got {0:?}")]
    InvalidTimeout(String),
}

#[derive(Clone)]
pub struct Config {
    pub discord_token: String,
    /// Absent keys are not fatal; the weather provider rejects the request.
    pub weather_api_key: Option<String>,
    pub weather_url: String,
    /// Upper bound for every outbound REST and weather request.
    pub http_timeout: Duration,
}

impl Config {
    /// Load `.env` (if any) and read the configuration from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let discord_token = non_empty("DISCORD_TOKEN")
            .or_else(|| non_empty("TOKEN"))
            .ok_or(ConfigError::MissingToken)?;

        let http_timeout = match non_empty("HTTP_TIMEOUT_SECS") {
            None => DEFAULT_HTTP_TIMEOUT,
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => return Err(ConfigError::InvalidTimeout(raw)),
            },
        };

        Ok(Self {
            discord_token,
            weather_api_key: non_empty("WEATHER_API"),
            weather_url: non_empty("WEATHER_API_URL")
                .unwrap_or_else(|| DEFAULT_WEATHER_URL.to_string()),
            http_timeout,
        })
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("discord_token", &"<redacted>")
            .field(
                "weather_api_key",
                &self.weather_api_key.as_ref().map(|_| "<redacted>"),
            )
            .field("weather_url", &self.weather_url)
            .field("http_timeout", &self.http_timeout)
            .finish()
    }
}
