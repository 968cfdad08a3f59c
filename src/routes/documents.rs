use axum::{extract::State, Json};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, error, info};
use uuid::Uuid;

use super::{
    extract::{JsonBody, PathParam},
    to_iso,
};
use crate::error::{AppError, AppResult};
use crate::models::{DocumentPath, NewDocumentPath};
use crate::schema::document_paths;
use crate::state::AppState;
use crate::validation;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    /// Base64 payload, optionally as a `data:` URL.
    pub file_content: String,
    pub file_name: String,
    pub user_aadhar: String,
    /// Size reported by the client; the stored size is measured server-side.
    #[serde(default, rename = "fileSizeKB")]
    pub file_size_kb: Option<f64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub id: Uuid,
    pub ipfs_path: String,
    pub cid: String,
    pub ledger_tx: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentPathResponse {
    pub id: Uuid,
    pub aadhar: String,
    pub name: String,
    pub ipfs_path: String,
    #[serde(rename = "fileSizeKB")]
    pub file_size_kb: f64,
    pub size_bytes: i64,
    pub checksum: String,
    pub ledger_tx: Option<String>,
    pub uploaded_at: String,
}

impl From<DocumentPath> for DocumentPathResponse {
    fn from(doc: DocumentPath) -> Self {
        Self {
            id: doc.id,
            file_size_kb: size_in_kb(doc.size_bytes),
            aadhar: doc.aadhar,
            name: doc.name,
            ipfs_path: doc.ipfs_path,
            size_bytes: doc.size_bytes,
            checksum: doc.checksum,
            ledger_tx: doc.ledger_tx,
            uploaded_at: to_iso(doc.uploaded_at),
        }
    }
}

/// Pins the file, anchors it on the ledger when configured, then records it.
///
/// The local record is written last, so a content-store or ledger failure
/// leaves nothing behind in the registry.
pub async fn upload_to_ipfs(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<UploadRequest>,
) -> AppResult<Json<UploadResponse>> {
    let aadhar = payload.user_aadhar.trim().to_string();
    let file_name = payload.file_name.trim().to_string();
    validation::validate_aadhar(&aadhar)?;
    validation::require_text("fileName", &file_name)?;

    let bytes = decode_file_content(&payload.file_content)?;
    let size_bytes = bytes.len() as i64;
    let checksum = hex::encode(Sha256::digest(&bytes));
    debug!(
        %aadhar,
        file_name = %file_name,
        size_bytes,
        reported_kb = ?payload.file_size_kb,
        "received upload"
    );

    let stored = state.content.add(bytes).await.map_err(|err| {
        error!(error = %err, %aadhar, file_name = %file_name, "failed to pin content");
        AppError::internal(format!("failed to upload to ipfs: {err:#}"))
    })?;

    let ledger_tx = match state.ledger.as_ref() {
        Some(ledger) => {
            let receipt = ledger
                .store_document(&aadhar, &file_name, &stored.path)
                .await
                .map_err(|err| {
                    error!(error = %err, %aadhar, ipfs_path = %stored.path, "ledger write failed");
                    AppError::internal(format!("failed to anchor document: {err}"))
                })?;
            Some(receipt.transaction_hash)
        }
        None => None,
    };

    let new_doc = NewDocumentPath {
        id: Uuid::new_v4(),
        aadhar,
        name: file_name,
        ipfs_path: stored.path.clone(),
        size_bytes,
        checksum,
        ledger_tx: ledger_tx.clone(),
    };

    let mut conn = state.db()?;
    diesel::insert_into(document_paths::table)
        .values(&new_doc)
        .execute(&mut conn)?;

    info!(
        document_id = %new_doc.id,
        aadhar = %new_doc.aadhar,
        ipfs_path = %new_doc.ipfs_path,
        anchored = ledger_tx.is_some(),
        "document registered"
    );

    Ok(Json(UploadResponse {
        id: new_doc.id,
        ipfs_path: stored.path,
        cid: stored.cid,
        ledger_tx,
    }))
}

pub async fn get_documents(
    State(state): State<AppState>,
    PathParam(aadhar): PathParam<String>,
) -> AppResult<Json<Vec<DocumentPathResponse>>> {
    let mut conn = state.db()?;

    let docs: Vec<DocumentPath> = document_paths::table
        .filter(document_paths::aadhar.eq(aadhar.trim()))
        .order(document_paths::uploaded_at.desc())
        .load(&mut conn)?;

    Ok(Json(docs.into_iter().map(Into::into).collect()))
}

pub async fn list_document_paths(
    State(state): State<AppState>,
) -> AppResult<Json<Vec<DocumentPathResponse>>> {
    let mut conn = state.db()?;

    let docs: Vec<DocumentPath> = document_paths::table
        .order(document_paths::uploaded_at.desc())
        .load(&mut conn)?;

    Ok(Json(docs.into_iter().map(Into::into).collect()))
}

fn decode_file_content(raw: &str) -> AppResult<Vec<u8>> {
    let encoded = match raw.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => raw,
    };

    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|err| AppError::bad_request(format!("fileContent must be base64: {err}")))?;

    if bytes.is_empty() {
        return Err(AppError::bad_request("fileContent must not be empty"));
    }

    Ok(bytes)
}

pub(crate) fn size_in_kb(size_bytes: i64) -> f64 {
    (size_bytes as f64 / 1024.0 * 100.0).round() / 100.0
}
