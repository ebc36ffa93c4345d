//! Periodic reconciliation passes.

use std::sync::Arc;

use feedsync_engine::FeedService;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

/// Builds and starts the scheduler with the sync job registered.
///
/// The returned handle must be kept alive; dropping it stops the jobs.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the cron expression is invalid or the
/// scheduler cannot start.
pub async fn build_scheduler(
    service: Arc<FeedService>,
    schedule: &str,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;
    register_sync_job(&scheduler, service, schedule).await?;
    scheduler.start().await?;
    Ok(scheduler)
}

async fn register_sync_job(
    scheduler: &JobScheduler,
    service: Arc<FeedService>,
    schedule: &str,
) -> Result<(), JobSchedulerError> {
    let job = Job::new_async(schedule, move |_uuid, _lock| {
        let service = Arc::clone(&service);

        Box::pin(async move {
            tracing::debug!("scheduler: starting sync pass");
            run_sync_pass(&service).await;
        })
    })?;

    scheduler.add(job).await?;
    tracing::info!(schedule, "scheduler: sync job registered");
    Ok(())
}

async fn run_sync_pass(service: &FeedService) {
    match service.on_service_requested().await {
        Ok(report) => {
            let sent: usize = report.synced.values().map(|s| s.sent).sum();
            tracing::info!(
                registered = report.registered.len(),
                unregistered = report.unregistered.len(),
                stores = report.synced.len(),
                sent,
                skipped = report.skipped.len(),
                "scheduler: sync pass complete"
            );
        }
        Err(e) => tracing::warn!(error = %e, "scheduler: sync pass not run"),
    }
}
