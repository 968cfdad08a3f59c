use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use diesel::prelude::*;
use serde::Deserialize;
use tokio::task;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    access::AccessStatus,
    jobs::{JOB_NOTIFY_ACCESS_REQUEST, JOB_NOTIFY_REQUEST_DECISION},
    mailer::MailMessage,
    models::{DocumentAccessRequest, Job, User},
    schema::{document_access_requests, users},
    state::AppState,
};

use super::{JobExecution, JobHandler};

pub const MAX_NOTIFICATION_ATTEMPTS: i32 = 5;
const RETRY_DELAY: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct NotifyPayload {
    request_id: Uuid,
}

/// Who receives the email for a given job type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Audience {
    Owner,
    Requester,
}

pub struct NotifyJob {
    job_type: &'static str,
    audience: Audience,
}

impl NotifyJob {
    pub fn access_request() -> Self {
        Self {
            job_type: JOB_NOTIFY_ACCESS_REQUEST,
            audience: Audience::Owner,
        }
    }

    pub fn request_decision() -> Self {
        Self {
            job_type: JOB_NOTIFY_REQUEST_DECISION,
            audience: Audience::Requester,
        }
    }
}

enum Loaded {
    Ready(DocumentAccessRequest, User),
    Missing(String),
}

#[async_trait]
impl JobHandler for NotifyJob {
    fn job_type(&self) -> &'static str {
        self.job_type
    }

    async fn handle(&self, state: Arc<AppState>, job: Job) -> JobExecution {
        let payload: NotifyPayload = match serde_json::from_value(job.payload.clone()) {
            Ok(payload) => payload,
            Err(err) => {
                return JobExecution::Failed {
                    error: format!("invalid notification payload: {err}"),
                }
            }
        };

        let audience = self.audience;
        let state_clone = state.clone();
        let loaded = match task::spawn_blocking(move || {
            load_recipient(&state_clone, payload.request_id, audience)
        })
        .await
        {
            Ok(Ok(loaded)) => loaded,
            Ok(Err(err)) => {
                warn!(job_id = %job.id, error = %err, "notification lookup failed");
                return retry_or_give_up(job.attempts, err);
            }
            Err(join_err) => {
                error!(job_id = %job.id, error = %join_err, "notification lookup panicked");
                return retry_or_give_up(job.attempts, format!("worker panicked: {join_err}"));
            }
        };

        let (request, recipient) = match loaded {
            Loaded::Ready(request, recipient) => (request, recipient),
            Loaded::Missing(error) => return JobExecution::Failed { error },
        };

        let message = match audience {
            Audience::Owner => access_request_message(&recipient, &request),
            Audience::Requester => match request.status.parse::<AccessStatus>() {
                Ok(status) if status.is_decision() => {
                    decision_message(&recipient, &request, status)
                }
                Ok(_) => {
                    info!(request_id = %request.id, "request back to pending; decision email skipped");
                    return JobExecution::Success;
                }
                Err(err) => return JobExecution::Failed { error: err },
            },
        };

        match state.mailer.send(&message).await {
            Ok(()) => JobExecution::Success,
            Err(err) => retry_or_give_up(job.attempts, format!("{err:#}")),
        }
    }
}

/// Retries a transient failure until the job has used its attempt budget.
fn retry_or_give_up(attempts: i32, error: String) -> JobExecution {
    if attempts >= MAX_NOTIFICATION_ATTEMPTS {
        JobExecution::Failed {
            error: format!("giving up after {attempts} attempts: {error}"),
        }
    } else {
        JobExecution::Retry {
            delay: RETRY_DELAY,
            error,
        }
    }
}

fn load_recipient(
    state: &AppState,
    request_id: Uuid,
    audience: Audience,
) -> Result<Loaded, String> {
    let mut conn = state.db().map_err(|err| format!("{err:?}"))?;

    let request: Option<DocumentAccessRequest> = document_access_requests::table
        .find(request_id)
        .first(&mut conn)
        .optional()
        .map_err(|err| format!("{err:?}"))?;
    let Some(request) = request else {
        return Ok(Loaded::Missing(format!("access request {request_id} not found")));
    };

    let recipient_aadhar = match audience {
        Audience::Owner => request.owner_aadhar.clone(),
        Audience::Requester => request.requester_aadhar.clone(),
    };

    let recipient: Option<User> = users::table
        .filter(users::aadhar.eq(&recipient_aadhar))
        .first(&mut conn)
        .optional()
        .map_err(|err| format!("{err:?}"))?;

    Ok(match recipient {
        Some(user) => Loaded::Ready(request, user),
        None => Loaded::Missing(format!("no registered user for Aadhar {recipient_aadhar}")),
    })
}

pub fn access_request_message(owner: &User, request: &DocumentAccessRequest) -> MailMessage {
    MailMessage {
        to: owner.email.clone(),
        subject: format!("Access requested for \"{}\"", request.document_name),
        body: format!(
            "Hello {},\n\n{} (Aadhar {}) has requested access to your document \"{}\".\n\
             Open your request history to approve or reject it.\n",
            owner.full_name, request.request_name, request.requester_aadhar, request.document_name
        ),
    }
}

pub fn decision_message(
    requester: &User,
    request: &DocumentAccessRequest,
    status: AccessStatus,
) -> MailMessage {
    MailMessage {
        to: requester.email.clone(),
        subject: format!("Your access request was {status}"),
        body: format!(
            "Hello {},\n\nYour request to access \"{}\" was {} by its owner.\n",
            requester.full_name, request.document_name, status
        ),
    }
}
