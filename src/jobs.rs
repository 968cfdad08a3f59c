//! Postgres-backed outbox for work that must not block a request, currently
//! the notification emails of the access-request workflow.

use std::time::Duration;

use chrono::{Duration as ChronoDuration, NaiveDateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde_json::{json, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Job, NewJob};
use crate::schema::jobs;

pub const STATUS_QUEUED: &str = "queued";
pub const STATUS_PROCESSING: &str = "processing";
pub const STATUS_SUCCEEDED: &str = "succeeded";
pub const STATUS_FAILED: &str = "failed";

pub const JOB_NOTIFY_ACCESS_REQUEST: &str = "notify-access-request";
pub const JOB_NOTIFY_REQUEST_DECISION: &str = "notify-request-decision";

pub const NOTIFICATION_JOB_TYPES: &[&str] =
    &[JOB_NOTIFY_ACCESS_REQUEST, JOB_NOTIFY_REQUEST_DECISION];

const FALLBACK_RETRY_DELAY_SECS: i64 = 30;

/// A `processing` row untouched for this long belongs to a worker that died
/// before recording the outcome.
pub const STALE_PROCESSING_AFTER: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Error)]
pub enum JobQueueError {
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
}

pub type JobQueueResult<T> = Result<T, JobQueueError>;

pub fn enqueue_job(
    conn: &mut PgConnection,
    job_type: &str,
    payload: Value,
    run_after: Option<NaiveDateTime>,
) -> JobQueueResult<Job> {
    let job = diesel::insert_into(jobs::table)
        .values(&NewJob {
            id: Uuid::new_v4(),
            job_type: job_type.to_string(),
            payload,
            status: STATUS_QUEUED.to_string(),
            run_after: run_after.unwrap_or_else(now),
        })
        .get_result(conn)?;
    Ok(job)
}

/// Queues an email about the given access request.
pub fn enqueue_notification(
    conn: &mut PgConnection,
    job_type: &str,
    request_id: Uuid,
) -> JobQueueResult<Job> {
    enqueue_job(conn, job_type, json!({ "request_id": request_id }), None)
}

/// Claims the oldest due job of the given types. Rows locked by another
/// worker are skipped, so several workers can poll the same table.
pub fn reserve_job(conn: &mut PgConnection, job_types: &[&str]) -> JobQueueResult<Option<Job>> {
    let started = now();

    let reserved = conn.transaction::<_, diesel::result::Error, _>(|conn| {
        let Some(candidate) = jobs::table
            .filter(jobs::status.eq(STATUS_QUEUED))
            .filter(jobs::run_after.le(started))
            .filter(jobs::job_type.eq_any(job_types))
            .order(jobs::run_after.asc())
            .for_update()
            .skip_locked()
            .first::<Job>(conn)
            .optional()?
        else {
            return Ok(None);
        };

        let claimed = diesel::update(jobs::table.find(candidate.id))
            .set((
                jobs::status.eq(STATUS_PROCESSING),
                jobs::attempts.eq(candidate.attempts + 1),
                jobs::updated_at.eq(started),
            ))
            .get_result::<Job>(conn)?;
        Ok(Some(claimed))
    })?;

    Ok(reserved)
}

pub fn mark_job_succeeded(conn: &mut PgConnection, job_id: Uuid) -> JobQueueResult<()> {
    finish_job(conn, job_id, STATUS_SUCCEEDED, None)
}

pub fn mark_job_failed(
    conn: &mut PgConnection,
    job_id: Uuid,
    error_message: &str,
) -> JobQueueResult<()> {
    finish_job(conn, job_id, STATUS_FAILED, Some(error_message))
}

/// Returns the job to the queue, due again after `delay`.
pub fn retry_job_after(
    conn: &mut PgConnection,
    job_id: Uuid,
    delay: Duration,
    error_message: &str,
) -> JobQueueResult<()> {
    let delay = ChronoDuration::from_std(delay)
        .unwrap_or_else(|_| ChronoDuration::seconds(FALLBACK_RETRY_DELAY_SECS));
    let updated_at = now();

    diesel::update(jobs::table.find(job_id))
        .set((
            jobs::status.eq(STATUS_QUEUED),
            jobs::run_after.eq(updated_at + delay),
            jobs::last_error.eq(Some(error_message)),
            jobs::updated_at.eq(updated_at),
        ))
        .execute(conn)?;
    Ok(())
}

/// Puts failed jobs of the given types back in the queue with a fresh attempt budget.
pub fn requeue_failed_jobs(conn: &mut PgConnection, job_types: &[&str]) -> JobQueueResult<usize> {
    let requeued_at = now();
    let updated = diesel::update(
        jobs::table
            .filter(jobs::status.eq(STATUS_FAILED))
            .filter(jobs::job_type.eq_any(job_types)),
    )
    .set((
        jobs::status.eq(STATUS_QUEUED),
        jobs::attempts.eq(0),
        jobs::run_after.eq(requeued_at),
        jobs::updated_at.eq(requeued_at),
    ))
    .execute(conn)?;
    Ok(updated)
}

/// Returns `processing` jobs not updated within `older_than` to the queue.
/// The claimed attempt stays counted.
pub fn requeue_stale_jobs(
    conn: &mut PgConnection,
    job_types: &[&str],
    older_than: Duration,
) -> JobQueueResult<usize> {
    let requeued_at = now();
    let cutoff = requeued_at
        - ChronoDuration::from_std(older_than).unwrap_or_else(|_| ChronoDuration::zero());
    let updated = diesel::update(
        jobs::table
            .filter(jobs::status.eq(STATUS_PROCESSING))
            .filter(jobs::updated_at.lt(cutoff))
            .filter(jobs::job_type.eq_any(job_types)),
    )
    .set((
        jobs::status.eq(STATUS_QUEUED),
        jobs::run_after.eq(requeued_at),
        jobs::last_error.eq(Some("worker stopped before recording the outcome")),
        jobs::updated_at.eq(requeued_at),
    ))
    .execute(conn)?;
    Ok(updated)
}

fn finish_job(
    conn: &mut PgConnection,
    job_id: Uuid,
    status: &str,
    error_message: Option<&str>,
) -> JobQueueResult<()> {
    diesel::update(jobs::table.find(job_id))
        .set((
            jobs::status.eq(status),
            jobs::last_error.eq(error_message),
            jobs::updated_at.eq(now()),
        ))
        .execute(conn)?;
    Ok(())
}

fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}
