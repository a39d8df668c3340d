use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{JobBuilder, JobScheduler};
use uuid::Uuid;

use super::service::PurgeService;
use crate::config::PurgeConfig;

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Invalid cron expression: {0}")]
    InvalidCron(String),

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("Scheduler error: {0}")]
    Scheduler(String),
}

/// Runs the vector store purge on a cron schedule
pub struct PurgeScheduler {
    scheduler: Mutex<JobScheduler>,
    service: Arc<PurgeService>,
}

impl PurgeScheduler {
    pub async fn new(service: Arc<PurgeService>) -> Result<Self, SchedulerError> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| SchedulerError::Scheduler(e.to_string()))?;

        Ok(Self {
            scheduler: Mutex::new(scheduler),
            service,
        })
    }

    /// Register the purge job described by `config`
    pub async fn schedule(&self, config: &PurgeConfig) -> Result<Uuid, SchedulerError> {
        let timezone: chrono_tz::Tz = config
            .timezone
            .parse()
            .map_err(|_| SchedulerError::InvalidTimezone(config.timezone.clone()))?;

        tracing::info!(
            cron = %config.cron,
            timezone = %config.timezone,
            ttl_minutes = config.ttl_minutes,
            "Scheduling vector store purge"
        );

        let service = Arc::clone(&self.service);
        let job = JobBuilder::new()
            .with_timezone(timezone)
            .with_cron_job_type()
            .with_schedule(&config.cron)
            .map_err(|e| SchedulerError::InvalidCron(e.to_string()))?
            .with_run_async(Box::new(move |_uuid, _lock| {
                let service = Arc::clone(&service);
                Box::pin(async move {
                    if let Err(e) = service.run().await {
                        tracing::error!(error = %e, "Scheduled vector store purge failed");
                    }
                })
            }))
            .build()
            .map_err(|e| SchedulerError::Scheduler(e.to_string()))?;

        self.scheduler
            .lock()
            .await
            .add(job)
            .await
            .map_err(|e| SchedulerError::Scheduler(e.to_string()))
    }

    pub async fn start(&self) -> Result<(), SchedulerError> {
        tracing::info!("Starting purge scheduler");
        self.scheduler
            .lock()
            .await
            .start()
            .await
            .map_err(|e| SchedulerError::Scheduler(e.to_string()))
    }

    pub async fn shutdown(&self) -> Result<(), SchedulerError> {
        self.scheduler
            .lock()
            .await
            .shutdown()
            .await
            .map_err(|e| SchedulerError::Scheduler(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use reqwest::Client;

    async fn scheduler() -> PurgeScheduler {
        let config = test_config("http://127.0.0.1:9");
        let service = Arc::new(PurgeService::new(
            Client::new(),
            &config.openai,
            &config.purge,
        ));
        PurgeScheduler::new(service).await.unwrap()
    }

    #[tokio::test]
    async fn test_schedule_default_config() {
        let scheduler = scheduler().await;
        let config = test_config("http://127.0.0.1:9");
        assert!(scheduler.schedule(&config.purge).await.is_ok());
    }

    #[tokio::test]
    async fn test_invalid_cron_rejected() {
        let scheduler = scheduler().await;
        let mut config = test_config("http://127.0.0.1:9").purge;
        config.cron = "every now and then".to_string();
        assert!(matches!(
            scheduler.schedule(&config).await,
            Err(SchedulerError::InvalidCron(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_timezone_rejected() {
        let scheduler = scheduler().await;
        let mut config = test_config("http://127.0.0.1:9").purge;
        config.timezone = "Nowhere/Special".to_string();
        assert!(matches!(
            scheduler.schedule(&config).await,
            Err(SchedulerError::InvalidTimezone(_))
        ));
    }
}
