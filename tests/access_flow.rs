mod common;

use anyhow::{Context, Result};
use axum::http::StatusCode;
use common::{acquire_db_lock, ensure_status, TestApp};
use chrono::{Duration as ChronoDuration, Utc};
use diesel::prelude::*;
use docshare::jobs::{
    requeue_failed_jobs, requeue_stale_jobs, reserve_job, JOB_NOTIFY_ACCESS_REQUEST,
    JOB_NOTIFY_REQUEST_DECISION, NOTIFICATION_JOB_TYPES, STALE_PROCESSING_AFTER, STATUS_FAILED,
    STATUS_PROCESSING, STATUS_QUEUED, STATUS_SUCCEEDED,
};
use docshare::schema::jobs;
use docshare::workers::notify::MAX_NOTIFICATION_ATTEMPTS;
use serde_json::{json, Value};
use uuid::Uuid;

const OWNER: &str = "123456789012";
const REQUESTER: &str = "210987654321";

async fn seed(app: &TestApp) -> Result<String> {
    app.register("Asha Rao", "asha@example.in", OWNER).await?;
    app.register("Ravi Kumar", "ravi@example.in", REQUESTER).await?;
    let uploaded = app.upload(OWNER, "lease.pdf", b"%PDF-1.7 lease").await?;
    uploaded["id"]
        .as_str()
        .map(str::to_string)
        .context("upload response missing id")
}

async fn request_access(app: &TestApp, document_id: &str) -> Result<String> {
    let response = app
        .post_json(
            "/requestAccess",
            &json!({
                "requesterAadhar": REQUESTER,
                "documentId": document_id,
                "ownerAadhar": OWNER,
                "requestName": "Ravi Kumar",
                "documentName": "lease.pdf",
            }),
            None,
        )
        .await?;
    let body = ensure_status(response, StatusCode::OK).await?;
    assert_eq!(body["success"], true);
    body["id"]
        .as_str()
        .map(str::to_string)
        .context("request response missing id")
}

#[tokio::test]
async fn access_request_lands_in_owner_history() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::new().await? else {
        return Ok(());
    };

    let document_id = seed(&app).await?;
    let request_id = request_access(&app, &document_id).await?;

    let history: Vec<Value> = app.get_json(&format!("/getRequestHistory/{OWNER}")).await?;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["id"], request_id.as_str());
    assert_eq!(history[0]["documentId"], document_id.as_str());
    assert_eq!(history[0]["requesterAadhar"], REQUESTER);
    assert_eq!(history[0]["requestName"], "Ravi Kumar");
    assert_eq!(history[0]["documentName"], "lease.pdf");
    assert_eq!(history[0]["status"], "pending");

    let requester_history: Vec<Value> = app
        .get_json(&format!("/getRequestHistory/{REQUESTER}"))
        .await?;
    assert!(requester_history.is_empty());

    let jobs = app.jobs_by_type(JOB_NOTIFY_ACCESS_REQUEST).await?;
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].payload["request_id"], request_id.as_str());

    assert_eq!(app.drain_jobs().await?, 1);
    let sent = app.mailer.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "asha@example.in");
    assert!(sent[0].body.contains("Ravi Kumar"));

    let jobs = app.jobs_by_type(JOB_NOTIFY_ACCESS_REQUEST).await?;
    assert_eq!(jobs[0].status, STATUS_SUCCEEDED);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn approved_document_becomes_visible_to_requester() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::new().await? else {
        return Ok(());
    };

    let document_id = seed(&app).await?;
    let request_id = request_access(&app, &document_id).await?;

    let response = app
        .patch_json(
            &format!("/updateRequestStatus/{request_id}"),
            &json!({ "status": "approved" }),
            None,
        )
        .await?;
    ensure_status(response, StatusCode::OK).await?;

    let response = app
        .post_json(
            "/storeApprovedRequest",
            &json!({ "requesterAadhar": REQUESTER, "documentId": document_id }),
            None,
        )
        .await?;
    ensure_status(response, StatusCode::OK).await?;

    let approved: Vec<Value> = app
        .get_json(&format!("/getApprovedDocuments?requesterAadhar={REQUESTER}"))
        .await?;
    assert_eq!(approved.len(), 1);
    assert_eq!(approved[0]["documentId"], document_id.as_str());
    assert_eq!(approved[0]["document"]["name"], "lease.pdf");
    assert_eq!(approved[0]["document"]["aadhar"], OWNER);

    let for_owner: Vec<Value> = app
        .get_json(&format!("/getApprovedDocuments?requesterAadhar={OWNER}"))
        .await?;
    assert!(for_owner.is_empty());

    let history: Vec<Value> = app.get_json(&format!("/getRequestHistory/{OWNER}")).await?;
    assert_eq!(history[0]["status"], "approved");

    assert_eq!(app.jobs_by_type(JOB_NOTIFY_REQUEST_DECISION).await?.len(), 1);
    assert_eq!(app.drain_jobs().await?, 2);
    let sent = app.mailer.sent().await;
    let decision = sent
        .iter()
        .find(|message| message.to == "ravi@example.in")
        .context("decision email not sent")?;
    assert_eq!(decision.subject, "Your access request was approved");

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn status_updates_are_validated() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::new().await? else {
        return Ok(());
    };

    let document_id = seed(&app).await?;
    let request_id = request_access(&app, &document_id).await?;

    let response = app
        .patch_json(
            &format!("/updateRequestStatus/{request_id}"),
            &json!({ "status": "revoked" }),
            None,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .patch_json(
            &format!("/updateRequestStatus/{}", Uuid::new_v4()),
            &json!({ "status": "rejected" }),
            None,
        )
        .await?;
    let body = ensure_status(response, StatusCode::NOT_FOUND).await?;
    assert_eq!(body["error"], "Request not found");

    let response = app
        .patch_json(
            &format!("/updateRequestStatus/{request_id}"),
            &json!({ "status": "Pending" }),
            None,
        )
        .await?;
    ensure_status(response, StatusCode::OK).await?;
    assert!(app.jobs_by_type(JOB_NOTIFY_REQUEST_DECISION).await?.is_empty());

    let response = app
        .patch_json(
            "/updateRequestStatus/not-a-uuid",
            &json!({ "status": "approved" }),
            None,
        )
        .await?;
    let body = ensure_status(response, StatusCode::BAD_REQUEST).await?;
    assert!(body["error"].is_string());

    let response = app
        .post_json("/requestAccess", &json!({ "requesterAadhar": REQUESTER }), None)
        .await?;
    let body = ensure_status(response, StatusCode::UNPROCESSABLE_ENTITY).await?;
    assert!(body["error"]
        .as_str()
        .is_some_and(|message| message.contains("missing field")));

    let response = app
        .post_json(
            "/requestAccess",
            &json!({
                "requesterAadhar": REQUESTER,
                "documentId": "not-a-document",
                "ownerAadhar": OWNER,
                "requestName": "Ravi Kumar",
                "documentName": "lease.pdf",
            }),
            None,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    for (field, limit_error) in [
        ("requestName", "requestName must be at most 255 characters"),
        ("documentName", "documentName must be at most 255 characters"),
    ] {
        let mut payload = json!({
            "requesterAadhar": REQUESTER,
            "documentId": document_id,
            "ownerAadhar": OWNER,
            "requestName": "Ravi Kumar",
            "documentName": "lease.pdf",
        });
        payload[field] = json!("n".repeat(256));
        let response = app.post_json("/requestAccess", &payload, None).await?;
        let body = ensure_status(response, StatusCode::BAD_REQUEST).await?;
        assert_eq!(body["error"], limit_error);
    }
    assert_eq!(app.jobs_by_type(JOB_NOTIFY_ACCESS_REQUEST).await?.len(), 1);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn approvals_for_unknown_documents_are_listed_without_document() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::new().await? else {
        return Ok(());
    };

    let missing = Uuid::new_v4().to_string();
    for _ in 0..2 {
        let response = app
            .post_json(
                "/storeApprovedRequest",
                &json!({ "requesterAadhar": REQUESTER, "documentId": missing }),
                None,
            )
            .await?;
        ensure_status(response, StatusCode::OK).await?;
    }

    let approved: Vec<Value> = app.get_json("/getApprovedDocuments").await?;
    assert_eq!(approved.len(), 2);
    assert!(approved.iter().all(|item| item["document"].is_null()));

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn failed_mail_delivery_is_retried() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::new().await? else {
        return Ok(());
    };

    let document_id = seed(&app).await?;
    request_access(&app, &document_id).await?;

    app.mailer.fail_next_calls(true);
    assert_eq!(app.drain_jobs().await?, 1);

    let jobs = app.jobs_by_type(JOB_NOTIFY_ACCESS_REQUEST).await?;
    assert_eq!(jobs[0].status, STATUS_QUEUED);
    assert_eq!(jobs[0].attempts, 1);
    assert!(jobs[0].last_error.is_some());
    assert!(app.mailer.sent().await.is_empty());

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn unknown_recipient_fails_the_job_until_requeued() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::new().await? else {
        return Ok(());
    };

    let response = app
        .post_json(
            "/requestAccess",
            &json!({
                "requesterAadhar": REQUESTER,
                "documentId": Uuid::new_v4(),
                "ownerAadhar": OWNER,
                "requestName": "Ravi Kumar",
                "documentName": "lease.pdf",
            }),
            None,
        )
        .await?;
    ensure_status(response, StatusCode::OK).await?;

    assert_eq!(app.drain_jobs().await?, 1);
    let jobs = app.jobs_by_type(JOB_NOTIFY_ACCESS_REQUEST).await?;
    assert_eq!(jobs[0].status, STATUS_FAILED);

    let requeued = app
        .with_conn(|conn| Ok(requeue_failed_jobs(conn, NOTIFICATION_JOB_TYPES)?))
        .await?;
    assert_eq!(requeued, 1);

    app.register("Asha Rao", "asha@example.in", OWNER).await?;
    assert_eq!(app.drain_jobs().await?, 1);
    let jobs = app.jobs_by_type(JOB_NOTIFY_ACCESS_REQUEST).await?;
    assert_eq!(jobs[0].status, STATUS_SUCCEEDED);
    assert_eq!(app.mailer.sent().await.len(), 1);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn abandoned_processing_job_is_recovered() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::new().await? else {
        return Ok(());
    };

    let document_id = seed(&app).await?;
    request_access(&app, &document_id).await?;

    // Claim the job and never record an outcome, as a killed worker would.
    let claimed = app
        .with_conn(|conn| Ok(reserve_job(conn, NOTIFICATION_JOB_TYPES)?))
        .await?
        .context("job should be claimable")?;
    assert_eq!(claimed.status, STATUS_PROCESSING);
    assert_eq!(app.drain_jobs().await?, 0);

    let fresh = app
        .with_conn(|conn| {
            Ok(requeue_stale_jobs(
                conn,
                NOTIFICATION_JOB_TYPES,
                STALE_PROCESSING_AFTER,
            )?)
        })
        .await?;
    assert_eq!(fresh, 0, "a recently claimed job is still owned by its worker");

    let claimed_id = claimed.id;
    app.with_conn(move |conn| {
        let long_ago = Utc::now().naive_utc() - ChronoDuration::hours(1);
        diesel::update(jobs::table.find(claimed_id))
            .set(jobs::updated_at.eq(long_ago))
            .execute(conn)?;
        Ok(())
    })
    .await?;

    let recovered = app
        .with_conn(|conn| {
            Ok(requeue_stale_jobs(
                conn,
                NOTIFICATION_JOB_TYPES,
                STALE_PROCESSING_AFTER,
            )?)
        })
        .await?;
    assert_eq!(recovered, 1);

    assert_eq!(app.drain_jobs().await?, 1);
    let jobs = app.jobs_by_type(JOB_NOTIFY_ACCESS_REQUEST).await?;
    assert_eq!(jobs[0].status, STATUS_SUCCEEDED);
    assert_eq!(jobs[0].attempts, 2);
    assert_eq!(app.mailer.sent().await.len(), 1);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn mail_delivery_gives_up_after_the_last_attempt() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::new().await? else {
        return Ok(());
    };

    let document_id = seed(&app).await?;
    request_access(&app, &document_id).await?;

    // Four attempts already spent; the next claim is the fifth.
    app.with_conn(|conn| {
        diesel::update(jobs::table.filter(jobs::job_type.eq(JOB_NOTIFY_ACCESS_REQUEST)))
            .set(jobs::attempts.eq(MAX_NOTIFICATION_ATTEMPTS - 1))
            .execute(conn)?;
        Ok(())
    })
    .await?;

    app.mailer.fail_next_calls(true);
    assert_eq!(app.drain_jobs().await?, 1);

    let jobs = app.jobs_by_type(JOB_NOTIFY_ACCESS_REQUEST).await?;
    assert_eq!(jobs[0].status, STATUS_FAILED);
    assert_eq!(jobs[0].attempts, MAX_NOTIFICATION_ATTEMPTS);
    let last_error = jobs[0].last_error.as_deref().unwrap_or_default();
    assert!(
        last_error.starts_with("giving up after 5 attempts"),
        "unexpected last_error: {last_error}"
    );
    assert!(app.mailer.sent().await.is_empty());

    app.cleanup().await?;
    Ok(())
}
