use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::time::{sleep, Instant};
use tracing::{error, info, warn};

use crate::{
    jobs::{
        mark_job_failed, mark_job_succeeded, requeue_stale_jobs, reserve_job, retry_job_after,
        JobQueueError, STALE_PROCESSING_AFTER,
    },
    models::Job,
    state::AppState,
};

pub mod notify;

#[derive(Debug)]
pub enum JobExecution {
    Success,
    Retry { delay: Duration, error: String },
    Failed { error: String },
}

#[async_trait]
pub trait JobHandler: Send + Sync {
    fn job_type(&self) -> &'static str;
    async fn handle(&self, state: Arc<AppState>, job: Job) -> JobExecution;
}

pub struct Worker {
    state: Arc<AppState>,
    handlers: HashMap<&'static str, Arc<dyn JobHandler>>,
    poll_interval: Duration,
}

impl Worker {
    pub fn new(
        state: Arc<AppState>,
        handlers: Vec<Arc<dyn JobHandler>>,
        poll_interval: Duration,
    ) -> Self {
        let map = handlers
            .into_iter()
            .map(|handler| (handler.job_type(), handler))
            .collect();
        Self {
            state,
            handlers: map,
            poll_interval,
        }
    }

    pub async fn run(&self) {
        info!(job_types = ?self.job_types(), "notification worker started");
        let mut last_sweep = Instant::now();
        self.recover_stale_jobs();
        loop {
            if last_sweep.elapsed() >= STALE_PROCESSING_AFTER {
                self.recover_stale_jobs();
                last_sweep = Instant::now();
            }
            match self.run_once().await {
                Ok(true) => {}
                Ok(false) => sleep(self.poll_interval).await,
                Err(err) => {
                    error!(error = %err, "worker tick failed");
                    sleep(self.poll_interval).await;
                }
            }
        }
    }

    /// Requeues jobs left `processing` by a worker that stopped mid-job.
    pub fn recover_stale_jobs(&self) -> usize {
        let job_types = self.job_types();
        let recovered = self.state.db().map_err(|err| format!("{err:?}")).and_then(|mut conn| {
            requeue_stale_jobs(&mut conn, &job_types, STALE_PROCESSING_AFTER)
                .map_err(|err| err.to_string())
        });
        match recovered {
            Ok(0) => 0,
            Ok(count) => {
                warn!(count, "requeued jobs abandoned while processing");
                count
            }
            Err(error) => {
                error!(%error, "stale job sweep failed");
                0
            }
        }
    }

    fn job_types(&self) -> Vec<&'static str> {
        let mut job_types: Vec<&'static str> = self.handlers.keys().copied().collect();
        job_types.sort_unstable();
        job_types
    }

    /// Processes at most one queued job. Returns whether a job was found.
    pub async fn run_once(&self) -> Result<bool, JobQueueError> {
        let job_types = self.job_types();
        if job_types.is_empty() {
            return Ok(false);
        }

        let reserved = match self.state.db() {
            Ok(mut conn) => reserve_job(&mut conn, &job_types)?,
            Err(err) => {
                error!(?err, "worker could not obtain a database connection");
                return Ok(false);
            }
        };
        let Some(job) = reserved else {
            return Ok(false);
        };

        let outcome = match self.handlers.get(job.job_type.as_str()) {
            Some(handler) => handler.handle(self.state.clone(), job.clone()).await,
            None => JobExecution::Failed {
                error: format!("no handler registered for job type {}", job.job_type),
            },
        };

        self.settle(&job, outcome)?;
        Ok(true)
    }

    /// Records the handler outcome on the job row.
    fn settle(&self, job: &Job, outcome: JobExecution) -> Result<(), JobQueueError> {
        let mut conn = match self.state.db() {
            Ok(conn) => conn,
            Err(err) => {
                error!(job_id = %job.id, ?err, "job outcome lost: no database connection");
                return Ok(());
            }
        };

        match outcome {
            JobExecution::Success => {
                mark_job_succeeded(&mut conn, job.id)?;
                info!(job_id = %job.id, job_type = %job.job_type, "job completed");
            }
            JobExecution::Retry { delay, error } => {
                warn!(
                    job_id = %job.id,
                    job_type = %job.job_type,
                    attempts = job.attempts,
                    retry_in_secs = delay.as_secs(),
                    %error,
                    "job will retry"
                );
                retry_job_after(&mut conn, job.id, delay, &error)?;
            }
            JobExecution::Failed { error } => {
                error!(job_id = %job.id, job_type = %job.job_type, %error, "job failed");
                mark_job_failed(&mut conn, job.id, &error)?;
            }
        }
        Ok(())
    }
}

pub fn default_handlers() -> Vec<Arc<dyn JobHandler>> {
    vec![
        Arc::new(notify::NotifyJob::access_request()),
        Arc::new(notify::NotifyJob::request_decision()),
    ]
}
