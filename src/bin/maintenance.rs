use std::env;

use anyhow::{Context, Result};
use diesel::dsl::count_star;
use diesel::prelude::*;
use uuid::Uuid;

use docshare::{
    config::AppConfig,
    db,
    jobs::{
        requeue_failed_jobs, requeue_stale_jobs, NOTIFICATION_JOB_TYPES, STALE_PROCESSING_AFTER,
    },
    schema::{approved_requests, document_access_requests, document_paths},
    telemetry,
};

const USAGE: &str = "Usage: maintenance <audit-references|requeue-failed>";

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    telemetry::init_tracing("info");

    let mut args = env::args().skip(1);
    match args.next().as_deref() {
        Some("audit-references") => audit_references()?,
        Some("requeue-failed") => requeue_failed()?,
        Some(cmd) => {
            eprintln!("Unknown command: {cmd}\n{USAGE}");
            std::process::exit(1);
        }
        None => {
            eprintln!("{USAGE}");
            std::process::exit(1);
        }
    }

    Ok(())
}

fn connect() -> Result<db::PgPool> {
    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "maintenance",
        database_url = %config.redacted_database_url(),
        "loaded docshare configuration"
    );
    db::init_pool(&config.database_url)
}

/// Reports references the registry does not enforce: requests and approvals
/// naming unknown documents, and repeated approvals for the same pair.
fn audit_references() -> Result<()> {
    let pool = connect()?;
    let mut conn = pool.get().context("failed to get database connection")?;

    let orphan_requests: Vec<(Uuid, Uuid, String)> = document_access_requests::table
        .left_join(
            document_paths::table
                .on(document_paths::id.eq(document_access_requests::document_id)),
        )
        .filter(document_paths::id.nullable().is_null())
        .select((
            document_access_requests::id,
            document_access_requests::document_id,
            document_access_requests::requester_aadhar,
        ))
        .load(&mut conn)
        .context("failed to load access requests")?;

    let orphan_approvals: Vec<(Uuid, Uuid, String)> = approved_requests::table
        .left_join(document_paths::table.on(document_paths::id.eq(approved_requests::document_id)))
        .filter(document_paths::id.nullable().is_null())
        .select((
            approved_requests::id,
            approved_requests::document_id,
            approved_requests::requester_aadhar,
        ))
        .load(&mut conn)
        .context("failed to load approvals")?;

    let duplicate_approvals: Vec<(String, Uuid, i64)> = approved_requests::table
        .group_by((approved_requests::requester_aadhar, approved_requests::document_id))
        .having(count_star().gt(1))
        .select((
            approved_requests::requester_aadhar,
            approved_requests::document_id,
            count_star(),
        ))
        .load(&mut conn)
        .context("failed to count approvals")?;

    for (id, document_id, requester) in &orphan_requests {
        println!("request {id}: document {document_id} (requested by {requester}) is not registered");
    }
    for (id, document_id, requester) in &orphan_approvals {
        println!("approval {id}: document {document_id} (granted to {requester}) is not registered");
    }
    for (requester, document_id, count) in &duplicate_approvals {
        println!("approval for {requester} on document {document_id} stored {count} times");
    }

    println!(
        "{} orphaned requests, {} orphaned approvals, {} duplicated approvals",
        orphan_requests.len(),
        orphan_approvals.len(),
        duplicate_approvals.len()
    );
    Ok(())
}

fn requeue_failed() -> Result<()> {
    let pool = connect()?;
    let mut conn = pool.get().context("failed to get database connection")?;

    let requeued = requeue_failed_jobs(&mut conn, NOTIFICATION_JOB_TYPES)
        .context("failed to requeue notification jobs")?;
    let stale = requeue_stale_jobs(&mut conn, NOTIFICATION_JOB_TYPES, STALE_PROCESSING_AFTER)
        .context("failed to requeue stale notification jobs")?;

    println!("Requeued {requeued} failed and {stale} stale notification jobs.");
    Ok(())
}
