//! Background worker for a task tracker: pushes deadline reminders for tasks
//! that are due soon and periodically syncs weather data.

pub mod appsettings;
pub mod delivery;
pub mod models;
pub mod reminders;
pub mod scheduling;
pub mod storage;
pub mod sync;
