use chrono::NaiveDateTime;
use diesel::prelude::*;
use uuid::Uuid;

use crate::schema::*;

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub telephone: String,
    pub aadhar: String,
    pub password_hash: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub telephone: String,
    pub aadhar: String,
    pub password_hash: String,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = document_paths)]
pub struct DocumentPath {
    pub id: Uuid,
    pub aadhar: String,
    pub name: String,
    pub ipfs_path: String,
    pub size_bytes: i64,
    pub checksum: String,
    pub ledger_tx: Option<String>,
    pub uploaded_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = document_paths)]
pub struct NewDocumentPath {
    pub id: Uuid,
    pub aadhar: String,
    pub name: String,
    pub ipfs_path: String,
    pub size_bytes: i64,
    pub checksum: String,
    pub ledger_tx: Option<String>,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = document_access_requests)]
pub struct DocumentAccessRequest {
    pub id: Uuid,
    pub requester_aadhar: String,
    pub document_id: Uuid,
    pub owner_aadhar: String,
    pub request_name: String,
    pub document_name: String,
    pub status: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = document_access_requests)]
pub struct NewDocumentAccessRequest {
    pub id: Uuid,
    pub requester_aadhar: String,
    pub document_id: Uuid,
    pub owner_aadhar: String,
    pub request_name: String,
    pub document_name: String,
    pub status: String,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = approved_requests)]
pub struct ApprovedRequest {
    pub id: Uuid,
    pub requester_aadhar: String,
    pub document_id: Uuid,
    pub approval_date: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = approved_requests)]
pub struct NewApprovedRequest {
    pub id: Uuid,
    pub requester_aadhar: String,
    pub document_id: Uuid,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = jobs)]
pub struct Job {
    pub id: Uuid,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub attempts: i32,
    pub run_after: NaiveDateTime,
    pub last_error: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = jobs)]
pub struct NewJob {
    pub id: Uuid,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub run_after: NaiveDateTime,
}
