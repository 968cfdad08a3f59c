use axum::http::HeaderValue;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, patch, post},
    Router,
};
use chrono::NaiveDateTime;
use serde::Serialize;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::state::AppState;

pub mod access;
pub mod auth;
pub mod documents;
pub mod extract;
pub mod health;
pub mod users;

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

impl SuccessResponse {
    pub fn ok() -> Self {
        Self { success: true }
    }
}

/// Timestamps are stored as UTC without offset; the API renders them as RFC 3339.
pub(crate) fn to_iso(value: NaiveDateTime) -> String {
    value.and_utc().to_rfc3339()
}

pub fn create_router(state: AppState) -> Router<()> {
    let cors = build_cors(state.config.cors_allowed_origin.as_deref());
    let body_limit = state.config.max_upload_bytes;

    let account_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/change-password", post(auth::change_password))
        .route("/verifyPassword", post(auth::verify_password))
        .route("/me", get(auth::me))
        .route("/users", get(users::list_users));

    let document_routes = Router::new()
        .route("/uploadToIpfs", post(documents::upload_to_ipfs))
        .route("/getDocuments/:aadhar", get(documents::get_documents))
        .route("/documentPaths", get(documents::list_document_paths));

    let access_routes = Router::new()
        .route("/requestAccess", post(access::request_access))
        .route("/getRequestHistory/:aadhar", get(access::get_request_history))
        .route(
            "/updateRequestStatus/:id",
            patch(access::update_request_status),
        )
        .route("/storeApprovedRequest", post(access::store_approved_request))
        .route("/getApprovedDocuments", get(access::get_approved_documents));

    Router::new()
        .merge(account_routes)
        .merge(document_routes)
        .merge(access_routes)
        .route("/health", get(health::health_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(DefaultBodyLimit::max(body_limit))
}

fn build_cors(allowed: Option<&str>) -> CorsLayer {
    let allow_origin = match allowed {
        Some(origins) => {
            let headers: Vec<HeaderValue> = origins
                .split(',')
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .filter_map(|value| match value.parse::<HeaderValue>() {
                    Ok(header) => Some(header),
                    Err(_) => {
                        warn!(origin = %value, "ignoring invalid CORS origin");
                        None
                    }
                })
                .collect();
            AllowOrigin::list(headers)
        }
        None => AllowOrigin::mirror_request(),
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}
