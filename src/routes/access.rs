use axum::{extract::State, Json};
use chrono::Utc;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::{
    documents::DocumentPathResponse,
    extract::{JsonBody, PathParam, QueryParams},
    to_iso, SuccessResponse,
};
use crate::{
    access::{AccessStatus, STATUS_PENDING},
    error::{AppError, AppResult},
    jobs::{enqueue_notification, JOB_NOTIFY_ACCESS_REQUEST, JOB_NOTIFY_REQUEST_DECISION},
    models::{
        ApprovedRequest, DocumentAccessRequest, DocumentPath, NewApprovedRequest,
        NewDocumentAccessRequest,
    },
    schema::{approved_requests, document_access_requests, document_paths},
    state::AppState,
    validation,
};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestAccessRequest {
    pub requester_aadhar: String,
    pub document_id: String,
    pub owner_aadhar: String,
    pub request_name: String,
    pub document_name: String,
}

#[derive(Serialize)]
pub struct RequestAccessResponse {
    pub success: bool,
    pub id: Uuid,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreApprovalRequest {
    pub requester_aadhar: String,
    pub document_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovedDocumentsQuery {
    pub requester_aadhar: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessRequestResponse {
    pub id: Uuid,
    pub requester_aadhar: String,
    pub document_id: Uuid,
    pub owner_aadhar: String,
    pub request_name: String,
    pub document_name: String,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<DocumentAccessRequest> for AccessRequestResponse {
    fn from(request: DocumentAccessRequest) -> Self {
        Self {
            id: request.id,
            requester_aadhar: request.requester_aadhar,
            document_id: request.document_id,
            owner_aadhar: request.owner_aadhar,
            request_name: request.request_name,
            document_name: request.document_name,
            status: request.status,
            created_at: to_iso(request.created_at),
            updated_at: to_iso(request.updated_at),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovedDocumentResponse {
    pub id: Uuid,
    pub requester_aadhar: String,
    pub document_id: Uuid,
    pub approval_date: String,
    /// `None` when the approval points at a document that is not registered.
    pub document: Option<DocumentPathResponse>,
}

/// Records a pending request and queues an email to the document owner.
pub async fn request_access(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<RequestAccessRequest>,
) -> AppResult<Json<RequestAccessResponse>> {
    let requester_aadhar = payload.requester_aadhar.trim().to_string();
    let owner_aadhar = payload.owner_aadhar.trim().to_string();
    let request_name = payload.request_name.trim().to_string();
    let document_name = payload.document_name.trim().to_string();

    validation::validate_aadhar(&requester_aadhar)?;
    validation::validate_aadhar(&owner_aadhar)?;
    validation::require_text("requestName", &request_name)?;
    validation::require_text("documentName", &document_name)?;
    let document_id = parse_document_id(&payload.document_id)?;

    let new_request = NewDocumentAccessRequest {
        id: Uuid::new_v4(),
        requester_aadhar,
        document_id,
        owner_aadhar,
        request_name,
        document_name,
        status: STATUS_PENDING.to_string(),
    };

    let mut conn = state.db()?;
    conn.transaction::<_, AppError, _>(|conn| {
        diesel::insert_into(document_access_requests::table)
            .values(&new_request)
            .execute(conn)?;

        enqueue_notification(conn, JOB_NOTIFY_ACCESS_REQUEST, new_request.id).map_err(
            |err| AppError::internal(format!("failed to enqueue notification job: {err}")),
        )?;
        Ok(())
    })?;

    info!(
        request_id = %new_request.id,
        document_id = %new_request.document_id,
        requester = %new_request.requester_aadhar,
        owner = %new_request.owner_aadhar,
        "access requested"
    );

    Ok(Json(RequestAccessResponse {
        success: true,
        id: new_request.id,
    }))
}

/// Requests addressed to the given owner, newest first.
pub async fn get_request_history(
    State(state): State<AppState>,
    PathParam(owner_aadhar): PathParam<String>,
) -> AppResult<Json<Vec<AccessRequestResponse>>> {
    let mut conn = state.db()?;

    let requests: Vec<DocumentAccessRequest> = document_access_requests::table
        .filter(document_access_requests::owner_aadhar.eq(owner_aadhar.trim()))
        .order(document_access_requests::created_at.desc())
        .load(&mut conn)?;

    Ok(Json(requests.into_iter().map(Into::into).collect()))
}

pub async fn update_request_status(
    State(state): State<AppState>,
    PathParam(request_id): PathParam<Uuid>,
    JsonBody(payload): JsonBody<UpdateStatusRequest>,
) -> AppResult<Json<SuccessResponse>> {
    let status: AccessStatus = payload.status.parse().map_err(AppError::bad_request)?;

    let mut conn = state.db()?;
    conn.transaction::<_, AppError, _>(|conn| {
        let updated = diesel::update(document_access_requests::table.find(request_id))
            .set((
                document_access_requests::status.eq(status.as_str()),
                document_access_requests::updated_at.eq(Utc::now().naive_utc()),
            ))
            .execute(conn)?;

        if updated == 0 {
            return Err(AppError::not_found_with("Request not found"));
        }

        if status.is_decision() {
            enqueue_notification(conn, JOB_NOTIFY_REQUEST_DECISION, request_id).map_err(
                |err| AppError::internal(format!("failed to enqueue notification job: {err}")),
            )?;
        }
        Ok(())
    })?;

    info!(%request_id, %status, "access request status updated");
    Ok(Json(SuccessResponse::ok()))
}

/// Grants the requester visibility of the document. Not deduplicated.
pub async fn store_approved_request(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<StoreApprovalRequest>,
) -> AppResult<Json<SuccessResponse>> {
    let requester_aadhar = payload.requester_aadhar.trim().to_string();
    validation::validate_aadhar(&requester_aadhar)?;
    let document_id = parse_document_id(&payload.document_id)?;

    let approval = NewApprovedRequest {
        id: Uuid::new_v4(),
        requester_aadhar,
        document_id,
    };

    let mut conn = state.db()?;
    diesel::insert_into(approved_requests::table)
        .values(&approval)
        .execute(&mut conn)?;

    info!(
        approval_id = %approval.id,
        requester = %approval.requester_aadhar,
        %document_id,
        "approval stored"
    );
    Ok(Json(SuccessResponse::ok()))
}

pub async fn get_approved_documents(
    State(state): State<AppState>,
    QueryParams(query): QueryParams<ApprovedDocumentsQuery>,
) -> AppResult<Json<Vec<ApprovedDocumentResponse>>> {
    let mut conn = state.db()?;

    let mut statement = approved_requests::table
        .left_join(document_paths::table.on(document_paths::id.eq(approved_requests::document_id)))
        .order(approved_requests::approval_date.desc())
        .into_boxed();

    if let Some(requester) = query
        .requester_aadhar
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        statement = statement.filter(approved_requests::requester_aadhar.eq(requester.to_string()));
    }

    let rows: Vec<(ApprovedRequest, Option<DocumentPath>)> = statement.load(&mut conn)?;

    let items = rows
        .into_iter()
        .map(|(approval, document)| ApprovedDocumentResponse {
            id: approval.id,
            requester_aadhar: approval.requester_aadhar,
            document_id: approval.document_id,
            approval_date: to_iso(approval.approval_date),
            document: document.map(Into::into),
        })
        .collect();

    Ok(Json(items))
}

fn parse_document_id(raw: &str) -> AppResult<Uuid> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| AppError::bad_request("documentId must be a valid document id"))
}
