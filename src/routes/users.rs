use axum::{extract::State, Json};
use diesel::prelude::*;
use serde::Serialize;
use uuid::Uuid;

use crate::{error::AppResult, schema::users, state::AppState};

/// Directory entry; contact details and hashes stay private.
#[derive(Serialize)]
pub struct UserSummary {
    pub id: Uuid,
    #[serde(rename = "Aadhar")]
    pub aadhar: String,
    #[serde(rename = "fullName")]
    pub full_name: String,
}

pub async fn list_users(State(state): State<AppState>) -> AppResult<Json<Vec<UserSummary>>> {
    let mut conn = state.db()?;

    let rows: Vec<(Uuid, String, String)> = users::table
        .order(users::full_name.asc())
        .select((users::id, users::aadhar, users::full_name))
        .load(&mut conn)?;

    let response = rows
        .into_iter()
        .map(|(id, aadhar, full_name)| UserSummary {
            id,
            aadhar,
            full_name,
        })
        .collect();

    Ok(Json(response))
}
