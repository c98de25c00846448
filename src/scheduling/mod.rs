mod driver;
mod periodic;

pub use driver::{SchedulerDriver, TriggerState};
pub use periodic::{PeriodicTask, Trigger, TriggerError};

use async_trait::async_trait;

/// Work run on a timer. `run` handles its own errors; the scheduler only
/// decides when it runs.
#[async_trait]
pub trait PeriodicJob: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    async fn run(&self);
}
