use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Deserialize, Debug, Default, Clone)]
pub struct DatabaseSettings {
    /// e.g. `sqlite://taskflow.db`. Without it everything lives in memory.
    pub url: Option<String>,
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct PushSettings {
    pub project_id: Option<String>,
    pub access_token: Option<String>,
    pub endpoint: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct WeatherSettings {
    pub api_key: Option<String>,
    pub base_url: String,
    pub cities: Vec<String>,
    pub request_delay_ms: u64,
}

impl Default for WeatherSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openweathermap.org/data/2.5".to_owned(),
            cities: [
                "Jakarta",
                "Bandung",
                "Surabaya",
                "Medan",
                "Semarang",
                "Yogyakarta",
                "Denpasar",
            ]
            .map(str::to_owned)
            .to_vec(),
            request_delay_ms: 100,
        }
    }
}

impl WeatherSettings {
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ReminderSettings {
    pub send_delay_ms: u64,
}

impl Default for ReminderSettings {
    fn default() -> Self {
        Self { send_delay_ms: 100 }
    }
}

impl ReminderSettings {
    pub fn send_delay(&self) -> Duration {
        Duration::from_millis(self.send_delay_ms)
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct SchedulerSettings {
    pub reminder_period_secs: u64,
    pub sync_period_secs: u64,
    pub sync_on_start: bool,
    pub drain_timeout_secs: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            reminder_period_secs: 60,
            sync_period_secs: 30 * 60,
            sync_on_start: true,
            drain_timeout_secs: 30,
        }
    }
}

impl SchedulerSettings {
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(default)]
pub struct AppSettings {
    pub database: DatabaseSettings,
    pub push: PushSettings,
    pub weather: WeatherSettings,
    pub reminders: ReminderSettings,
    pub scheduler: SchedulerSettings,
}

impl AppSettings {
    /// `appsettings.*` then `appsettings.local.*`, then `APP__SECTION__KEY` variables.
    pub fn load() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name("appsettings").required(false))
            .add_source(File::with_name("appsettings.local").required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("weather.cities")
                    .try_parsing(true),
            )
            .build()?;

        settings.try_deserialize()
    }
}
