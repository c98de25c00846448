//! Periodic pull of external data, with a per-source status record.

pub mod weather;

pub use weather::{FetchError, OpenWeatherClient, WeatherData, WeatherFetcher};

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::models::SyncRecord;
use crate::scheduling::PeriodicJob;
use crate::storage::{StorageError, SyncRecordStore};

pub const WEATHER_SOURCE: &str = "weather";

#[derive(Debug, Clone)]
pub struct SyncOutcome {
    /// The record as saved at the end of the run.
    pub record: SyncRecord,
    pub data: HashMap<String, WeatherData>,
}

pub struct SyncEngine {
    source: String,
    cities: Vec<String>,
    fetcher: Arc<dyn WeatherFetcher>,
    records: Arc<dyn SyncRecordStore>,
    request_delay: Duration,
    run_lock: Mutex<()>,
}

impl SyncEngine {
    pub fn new(
        fetcher: Arc<dyn WeatherFetcher>,
        records: Arc<dyn SyncRecordStore>,
        cities: Vec<String>,
        request_delay: Duration,
    ) -> Self {
        Self {
            source: WEATHER_SOURCE.to_owned(),
            cities,
            fetcher,
            records,
            request_delay,
            run_lock: Mutex::new(()),
        }
    }

    /// Runs one sync right away and waits for it. Waits behind a scheduled run
    /// of the same engine if one is in progress.
    pub async fn manual_sync(&self) -> Result<SyncOutcome, StorageError> {
        log::info!("[SYNC] Manual sync requested. [source = {}]", self.source);
        self.run_sync().await
    }

    pub async fn run_sync(&self) -> Result<SyncOutcome, StorageError> {
        let _guard = self.run_lock.lock().await;
        self.run_sync_at(Utc::now()).await
    }

    async fn run_sync_at(&self, started_at: DateTime<Utc>) -> Result<SyncOutcome, StorageError> {
        let mut record = self.records.find_or_create(&self.source).await?;
        record.mark_pending();
        self.records.save(&record).await?;

        log::info!("[SYNC] Starting sync. [source = {}]", self.source);

        let data = match self.fetch_all().await {
            Ok(data) => data,
            Err(e) => {
                log::error!("[SYNC] Sync failed. [source = {}, error = {}]", self.source, e);
                record.mark_failed(&e);
                self.records.save(&record).await?;
                return Ok(SyncOutcome {
                    record,
                    data: HashMap::new(),
                });
            }
        };

        let synced = u32::try_from(data.len()).unwrap_or(u32::MAX);
        record.mark_succeeded(started_at.max(Utc::now()), synced);
        self.records.save(&record).await?;

        log::info!(
            "[SYNC] Sync completed. [source = {}, records_synced = {}]",
            self.source,
            synced
        );

        Ok(SyncOutcome { record, data })
    }

    /// Fetches every configured city. Per-city errors are logged and the city is
    /// left out; a fatal error aborts the whole run.
    async fn fetch_all(&self) -> Result<HashMap<String, WeatherData>, FetchError> {
        let mut data = HashMap::new();
        let cities: Vec<&str> = self
            .cities
            .iter()
            .map(|city| city.trim())
            .filter(|city| !city.is_empty())
            .collect();

        for (index, city) in cities.iter().enumerate() {
            if index > 0 && !self.request_delay.is_zero() {
                tokio::time::sleep(self.request_delay).await;
            }

            match self.fetcher.fetch(city).await {
                Ok(weather) => {
                    data.insert((*city).to_owned(), weather);
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    log::warn!("[SYNC] Failed to fetch weather. [city = {city}, error = {e}]");
                }
            }
        }

        Ok(data)
    }
}

#[async_trait]
impl PeriodicJob for SyncEngine {
    fn name(&self) -> &'static str {
        "weather_sync"
    }

    async fn run(&self) {
        if let Err(e) = self.run_sync().await {
            log::error!(
                "[SYNC] Could not update sync record. [source = {}, error = {}]",
                self.source,
                e
            );
        }
    }
}
