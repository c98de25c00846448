use std::sync::Arc;

use anyhow::Context;
use taskflow_worker::{
    appsettings::{AppSettings, DatabaseSettings},
    delivery::{self, TaskNotifier},
    reminders::ReminderEngine,
    scheduling::{SchedulerDriver, TriggerState},
    storage::{InMemoryStore, SqliteStore, SyncRecordStore, TaskStore},
    sync::{OpenWeatherClient, SyncEngine},
};

struct Storage {
    tasks: Arc<dyn TaskStore>,
    sync_records: Arc<dyn SyncRecordStore>,
    sqlite: Option<Arc<SqliteStore>>,
}

async fn open_storage(settings: &DatabaseSettings) -> anyhow::Result<Storage> {
    let Some(url) = settings.url.as_deref().filter(|url| !url.is_empty()) else {
        log::warn!("No database configured, using in-memory storage");
        let store = Arc::new(InMemoryStore::new());
        return Ok(Storage {
            tasks: store.clone(),
            sync_records: store,
            sqlite: None,
        });
    };

    let store = SqliteStore::connect(url)
        .await
        .with_context(|| format!("Could not connect to database {url}"))?;
    store
        .ensure_schema()
        .await
        .context("Could not create database schema")?;
    log::info!("Connected to database. [url = {url}]");

    let store = Arc::new(store);
    Ok(Storage {
        tasks: store.clone(),
        sync_records: store.clone(),
        sqlite: Some(store),
    })
}

fn init_logging() {
    let mut builder = pretty_env_logger::formatted_timed_builder();
    builder.filter_level(log::LevelFilter::Info);
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    builder.init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_logging();

    let settings = AppSettings::load().context("Could not load settings")?;
    let storage = open_storage(&settings.database).await?;

    let notifier = TaskNotifier::new(delivery::sender_from_settings(&settings.push));
    let reminders = Arc::new(ReminderEngine::new(
        storage.tasks.clone(),
        notifier,
        settings.reminders.send_delay(),
    ));
    let sync = Arc::new(SyncEngine::new(
        Arc::new(OpenWeatherClient::from_settings(&settings.weather)),
        storage.sync_records.clone(),
        settings.weather.cities.clone(),
        settings.weather.request_delay(),
    ));

    let mut driver = SchedulerDriver::from_settings(&settings.scheduler, reminders, sync);
    driver.start();

    let status = driver.status();
    let healthy = status
        .iter()
        .all(|(_, state)| *state == TriggerState::Running);
    for (job, state) in &status {
        log::info!("[SCHEDULER] Job status. [job = {job}, state = {state}]");
    }
    if healthy {
        log::info!("Worker started");
    } else {
        log::error!("Worker started with failed jobs");
    }

    tokio::signal::ctrl_c()
        .await
        .context("Could not listen for shutdown signal")?;
    log::info!("Shutdown requested, stopping scheduler");

    driver.stop().await;
    if let Some(sqlite) = storage.sqlite {
        sqlite.close().await;
    }

    log::info!("Worker stopped");
    Ok(())
}
