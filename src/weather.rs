//! Client for the OpenWeatherMap "current weather" endpoint.
//!
//! Only the description and temperature are decoded. Errors are split by who
//! should see them: transport and status failures go back to the channel,
//! payload-shape failures only reach the operator log.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WeatherError {
    #[error("{0}")]
    Transport(String),
    /// Non-200 reply; carries the status line, e.g. `404 Not Found`.
    #[error("{0}")]
    Status(String),
    #[error("failed to decode weather response: {0}")]
    Decode(String),
    #[error("weather response has no description")]
    MissingDescription,
}

impl WeatherError {
    /// Whether the failure should be reported back to the channel.
    pub fn is_user_visible(&self) -> bool {
        matches!(self, WeatherError::Transport(_) | WeatherError::Status(_))
    }
}

/// Current conditions for one city.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherReport {
    pub description: String,
    /// Degrees Celsius.
    pub temperature: f64,
}

/// Anything that can look up the current weather for a city.
#[async_trait]
pub trait WeatherApi: Send + Sync {
    async fn current(&self, city: &str) -> Result<WeatherReport, WeatherError>;
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CurrentWeather {
    weather: Vec<Condition>,
    main: MainReadings,
}

#[derive(Debug, Deserialize)]
struct Condition {
    description: String,
}

#[derive(Debug, Deserialize)]
struct MainReadings {
    temp: f64,
}

/// Decode a provider response body into a [`WeatherReport`].
pub fn parse_report(body: &[u8]) -> Result<WeatherReport, WeatherError> {
    let data: CurrentWeather =
        serde_json::from_slice(body).map_err(|e| WeatherError::Decode(e.to_string()))?;

    let description = data
        .weather
        .into_iter()
        .next()
        .ok_or(WeatherError::MissingDescription)?
        .description;

    Ok(WeatherReport {
        description,
        temperature: data.main.temp,
    })
}

// ---------------------------------------------------------------------------
// WeatherClient
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct WeatherClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl WeatherClient {
    /// A missing key is sent as an empty `appid`; the provider answers 401,
    /// which the user then sees as a status error.
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, WeatherError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WeatherError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.unwrap_or_default(),
        })
    }

    /// Build the GET request for `city`. The query string is percent-encoded
    /// by reqwest.
    fn build_request(&self, city: &str) -> Result<reqwest::Request, WeatherError> {
        self.client
            .get(&self.base_url)
            .query(&[
                ("q", city),
                ("appid", self.api_key.as_str()),
                ("units", "metric"),
            ])
            .build()
            .map_err(|e| WeatherError::Transport(e.to_string()))
    }
}

#[async_trait]
impl WeatherApi for WeatherClient {
    async fn current(&self, city: &str) -> Result<WeatherReport, WeatherError> {
        let request = self.build_request(city)?;

        let resp = self
            .client
            .execute(request)
            .await
            .map_err(|e| WeatherError::Transport(e.to_string()))?;

        let status = resp.status();
        if status != StatusCode::OK {
            return Err(WeatherError::Status(status.to_string()));
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| WeatherError::Decode(e.to_string()))?;

        parse_report(&body)
    }
}

impl std::fmt::Debug for WeatherClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeatherClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}
