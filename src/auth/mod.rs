pub mod jwt;
pub mod password;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use axum_extra::headers::{authorization::Bearer, Authorization};
use axum_extra::TypedHeader;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::AppError, state::AppState};

use self::jwt::Claims;

/// The account behind a valid bearer token. Handlers that take this
/// argument reject anonymous requests with 401.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub aadhar: String,
    pub full_name: String,
}

impl From<Claims> for AuthenticatedUser {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.sub,
            aadhar: claims.aadhar,
            full_name: claims.full_name,
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, AppError> {
        let header = TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state).await;
        let Ok(TypedHeader(Authorization(bearer))) = header else {
            return Err(AppError::unauthorized_with("Missing bearer token"));
        };

        state
            .jwt
            .verify_token(bearer.token())
            .map(AuthenticatedUser::from)
            .map_err(|err| {
                tracing::debug!(error = %err, "rejected bearer token");
                AppError::unauthorized_with("Invalid or expired token")
            })
    }
}
