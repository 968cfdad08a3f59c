use axum::{extract::State, Json};
use chrono::Utc;
use diesel::prelude::*;
use diesel::PgConnection;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use super::{extract::JsonBody, SuccessResponse};
use crate::{
    auth::{password, AuthenticatedUser},
    error::{AppError, AppResult},
    models::{NewUser, User},
    schema::users,
    state::AppState,
    validation,
};

#[derive(Deserialize)]
pub struct RegisterRequest {
    #[serde(rename = "fullName")]
    pub full_name: String,
    #[serde(rename = "Email")]
    pub email: String,
    #[serde(rename = "Telephone")]
    pub telephone: String,
    #[serde(rename = "Aadhar")]
    pub aadhar: String,
    #[serde(rename = "Password")]
    pub password: String,
}

#[derive(Deserialize)]
pub struct CredentialsRequest {
    #[serde(rename = "Aadhar")]
    pub aadhar: String,
    #[serde(rename = "Password")]
    pub password: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    #[serde(rename = "Aadhar")]
    pub aadhar: String,
    pub old_password: String,
    pub new_password: String,
}

#[derive(Serialize)]
pub struct UserProfile {
    pub id: Uuid,
    #[serde(rename = "fullName")]
    pub full_name: String,
    #[serde(rename = "Email")]
    pub email: String,
    #[serde(rename = "Telephone")]
    pub telephone: String,
    #[serde(rename = "Aadhar")]
    pub aadhar: String,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            full_name: user.full_name,
            email: user.email,
            telephone: user.telephone,
            aadhar: user.aadhar,
        }
    }
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub success: bool,
    pub user: UserProfile,
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

pub async fn register(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<RegisterRequest>,
) -> AppResult<Json<SuccessResponse>> {
    let full_name = payload.full_name.trim().to_string();
    let email = payload.email.trim().to_string();
    let telephone = payload.telephone.trim().to_string();
    let aadhar = payload.aadhar.trim().to_string();

    validation::validate_full_name(&full_name)?;
    validation::validate_email(&email)?;
    validation::validate_telephone(&telephone)?;
    validation::validate_aadhar(&aadhar)?;
    validation::validate_password(&payload.password)?;

    let password_hash = password::hash_password(&payload.password)?;
    let new_user = NewUser {
        id: Uuid::new_v4(),
        full_name,
        email,
        telephone,
        aadhar,
        password_hash,
    };

    let mut conn = state.db()?;
    match diesel::insert_into(users::table)
        .values(&new_user)
        .execute(&mut conn)
    {
        Ok(_) => {}
        Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
            warn!(aadhar = %new_user.aadhar, "registration rejected: duplicate identity number");
            return Err(AppError::conflict("User with this Aadhar already exists"));
        }
        Err(err) => return Err(AppError::from(err)),
    }

    info!(user_id = %new_user.id, aadhar = %new_user.aadhar, "user registered");
    Ok(Json(SuccessResponse::ok()))
}

pub async fn login(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<CredentialsRequest>,
) -> AppResult<Json<LoginResponse>> {
    let mut conn = state.db()?;
    let user = find_user(&mut conn, &payload.aadhar)?.ok_or_else(AppError::unauthorized)?;
    drop(conn);

    let valid = password::verify_password(&payload.password, &user.password_hash)
        .map_err(|_| AppError::unauthorized())?;
    if !valid {
        warn!(aadhar = %user.aadhar, "login rejected: password mismatch");
        return Err(AppError::unauthorized());
    }

    let access_token = state
        .jwt
        .generate_token(user.id, &user.aadhar, &user.full_name)
        .map_err(AppError::from)?;

    Ok(Json(LoginResponse {
        success: true,
        access_token,
        token_type: "Bearer".to_string(),
        expires_in: state.jwt.expires_in_seconds(),
        user: user.into(),
    }))
}

pub async fn change_password(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<ChangePasswordRequest>,
) -> AppResult<Json<SuccessResponse>> {
    let mut conn = state.db()?;
    let user = find_user(&mut conn, &payload.aadhar)?
        .ok_or_else(|| AppError::not_found_with("User not found"))?;

    let valid = password::verify_password(&payload.old_password, &user.password_hash)
        .map_err(|_| AppError::unauthorized_with("Invalid old password"))?;
    if !valid {
        return Err(AppError::unauthorized_with("Invalid old password"));
    }

    validation::validate_password(&payload.new_password)?;
    let new_hash = password::hash_password(&payload.new_password)?;

    diesel::update(users::table.find(user.id))
        .set((
            users::password_hash.eq(new_hash),
            users::updated_at.eq(Utc::now().naive_utc()),
        ))
        .execute(&mut conn)?;

    info!(user_id = %user.id, "password changed");
    Ok(Json(SuccessResponse::ok()))
}

pub async fn verify_password(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<CredentialsRequest>,
) -> AppResult<Json<SuccessResponse>> {
    let mut conn = state.db()?;
    let user = find_user(&mut conn, &payload.aadhar)?
        .ok_or_else(|| AppError::not_found_with("User not found"))?;

    let valid = password::verify_password(&payload.password, &user.password_hash)
        .map_err(|_| AppError::unauthorized())?;
    if !valid {
        return Err(AppError::unauthorized());
    }

    Ok(Json(SuccessResponse::ok()))
}

pub async fn me(user: AuthenticatedUser) -> Json<AuthenticatedUser> {
    Json(user)
}

fn find_user(conn: &mut PgConnection, aadhar: &str) -> AppResult<Option<User>> {
    let user = users::table
        .filter(users::aadhar.eq(aadhar.trim()))
        .first::<User>(conn)
        .optional()?;
    Ok(user)
}
