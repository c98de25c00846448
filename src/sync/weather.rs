use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::appsettings::WeatherSettings;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("weather API key not configured")]
    NotConfigured,

    #[error("city name cannot be empty")]
    EmptyCity,

    #[error("failed to fetch weather data for {city}: {source}")]
    Transport {
        city: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("city '{0}' not found")]
    CityNotFound(String),

    #[error("weather API returned status {status} for city {city}")]
    UnexpectedStatus { status: u16, city: String },

    #[error("failed to parse weather data for {city}: {source}")]
    Decode {
        city: String,
        #[source]
        source: reqwest::Error,
    },
}

impl FetchError {
    /// Errors that would fail for every city alike. They abort a whole sync.
    pub fn is_fatal(&self) -> bool {
        matches!(self, FetchError::NotConfigured)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeatherData {
    pub location: String,
    pub country: String,
    pub temperature: f64,
    pub feels_like: f64,
    pub description: String,
    pub humidity: i64,
    pub pressure: i64,
    pub wind_speed: f64,
    pub wind_deg: i64,
    pub visibility: i64,
    pub clouds: i64,
    pub icon: String,
    pub timestamp: DateTime<Utc>,
    pub sunrise: DateTime<Utc>,
    pub sunset: DateTime<Utc>,
}

#[async_trait]
pub trait WeatherFetcher: Send + Sync + 'static {
    async fn fetch(&self, city: &str) -> Result<WeatherData, FetchError>;
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct OpenWeatherSys {
    country: String,
    sunrise: i64,
    sunset: i64,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct OpenWeatherMain {
    temp: f64,
    feels_like: f64,
    humidity: i64,
    pressure: i64,
}

#[derive(Deserialize)]
struct OpenWeatherCondition {
    description: String,
    icon: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct OpenWeatherWind {
    speed: f64,
    deg: i64,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct OpenWeatherClouds {
    all: i64,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct OpenWeatherResponse {
    name: String,
    sys: OpenWeatherSys,
    main: OpenWeatherMain,
    weather: Vec<OpenWeatherCondition>,
    wind: OpenWeatherWind,
    visibility: i64,
    clouds: OpenWeatherClouds,
    dt: i64,
}

impl From<OpenWeatherResponse> for WeatherData {
    fn from(value: OpenWeatherResponse) -> Self {
        let (description, icon) = match value.weather.into_iter().next() {
            Some(condition) => (title_case(&condition.description), condition.icon),
            None => ("Clear".to_owned(), "01d".to_owned()),
        };

        Self {
            location: value.name,
            country: value.sys.country,
            temperature: value.main.temp,
            feels_like: value.main.feels_like,
            description,
            humidity: value.main.humidity,
            pressure: value.main.pressure,
            wind_speed: value.wind.speed,
            wind_deg: value.wind.deg,
            visibility: value.visibility,
            clouds: value.clouds.all,
            icon,
            timestamp: from_unix(value.dt),
            sunrise: from_unix(value.sys.sunrise),
            sunset: from_unix(value.sys.sunset),
        }
    }
}

fn from_unix(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

fn title_case(text: &str) -> String {
    text.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Current conditions from the OpenWeatherMap `weather` endpoint, metric units.
pub struct OpenWeatherClient {
    http: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
}

impl OpenWeatherClient {
    pub fn new(api_key: Option<String>, base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.filter(|key| !key.is_empty()),
            base_url: base_url.trim_end_matches('/').to_owned(),
        }
    }

    pub fn from_settings(settings: &WeatherSettings) -> Self {
        Self::new(settings.api_key.clone(), &settings.base_url)
    }
}

#[async_trait]
impl WeatherFetcher for OpenWeatherClient {
    async fn fetch(&self, city: &str) -> Result<WeatherData, FetchError> {
        let api_key = self.api_key.as_deref().ok_or(FetchError::NotConfigured)?;
        let city = city.trim();
        if city.is_empty() {
            return Err(FetchError::EmptyCity);
        }

        let response = self
            .http
            .get(format!("{}/weather", self.base_url))
            .query(&[("q", city), ("appid", api_key), ("units", "metric")])
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|source| FetchError::Transport {
                city: city.to_owned(),
                source,
            })?;

        match response.status().as_u16() {
            200 => {}
            404 => return Err(FetchError::CityNotFound(city.to_owned())),
            status => {
                return Err(FetchError::UnexpectedStatus {
                    status,
                    city: city.to_owned(),
                });
            }
        }

        let body: OpenWeatherResponse =
            response.json().await.map_err(|source| FetchError::Decode {
                city: city.to_owned(),
                source,
            })?;

        Ok(body.into())
    }
}
