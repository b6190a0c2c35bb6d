//! Background job scheduler.
//!
//! Registers the recurring expired-alert sweep for the `run` command. The
//! sweep is the store-level safety net for alert keys that never re-trigger,
//! complementing the lazy expiry inside the partition alert engines.

use std::sync::Arc;

use chrono::{Duration, Utc};
use sqlx::PgPool;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

/// Builds and starts the background job scheduler.
///
/// Returns the running [`JobScheduler`] handle, which must be kept alive for
/// the lifetime of the process. Dropping it shuts down all scheduled jobs.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised, the
/// sweep job cannot be registered, or the scheduler fails to start.
pub async fn build_scheduler(
    pool: PgPool,
    schedule: &str,
    cooldown_secs: i64,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;
    register_sweep_job(&scheduler, pool, schedule, cooldown_secs).await?;
    scheduler.start().await?;
    Ok(scheduler)
}

async fn register_sweep_job(
    scheduler: &JobScheduler,
    pool: PgPool,
    schedule: &str,
    cooldown_secs: i64,
) -> Result<(), JobSchedulerError> {
    let pool = Arc::new(pool);

    let job = Job::new_async(schedule, move |_uuid, _lock| {
        let pool = Arc::clone(&pool);

        Box::pin(async move {
            let now = Utc::now();
            let cutoff = now - Duration::seconds(cooldown_secs);
            match trustwatch_db::resolve_expired_alerts(&pool, cutoff, now).await {
                Ok(0) => tracing::debug!("sweep: no expired open alerts"),
                Ok(resolved) => {
                    tracing::info!(resolved, "sweep: auto-resolved expired alerts");
                }
                Err(e) => tracing::error!(error = %e, "sweep: failed to resolve expired alerts"),
            }
        })
    })?;

    scheduler.add(job).await?;
    Ok(())
}
