use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::auth;
use crate::api::error::ApiError;
use crate::api::state::AppState;

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub region: String,
}

#[derive(Serialize)]
pub struct RegisterResponse {
    pub account_id: String,
    pub username: String,
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>, ApiError> {
    if req.username.len() < 3 || req.username.len() > 32 {
        return Err(ApiError::BadRequest("Username must be 3-32 characters".into()));
    }
    if req.password.len() < 8 {
        return Err(ApiError::BadRequest("Password must be at least 8 characters".into()));
    }

    let password_hash = auth::hash_password(&req.password).map_err(|e| ApiError::Internal(format!("{e:#}")))?;
    let account_id = Uuid::new_v4().to_string();

    let inner = state.inner.read().await;
    let db = inner.db.lock().await;

    let existing: Option<String> = db
        .query_row("SELECT id FROM users WHERE username = ?1", [&req.username], |row| row.get(0))
        .ok();
    if existing.is_some() {
        return Err(ApiError::Conflict("Username already taken".into()));
    }

    db.execute(
        "INSERT INTO users (id, username, password_hash, nickname, kyc_state) VALUES (?1, ?2, ?3, ?2, 'none')",
        rusqlite::params![account_id, req.username, password_hash],
    )
    .map_err(|e| ApiError::Internal(format!("db insert: {e}")))?;

    Ok(Json(RegisterResponse { account_id, username: req.username }))
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub account_id: String,
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let inner = state.inner.read().await;
    let db = inner.db.lock().await;

    let row: Option<(String, String)> = db
        .query_row(
            "SELECT id, password_hash FROM users WHERE username = ?1",
            [&req.username],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .ok();

    let (account_id, password_hash) = row.ok_or_else(|| ApiError::Unauthorized("Invalid username or password".into()))?;

    if !auth::verify_password(&req.password, &password_hash) {
        return Err(ApiError::Unauthorized("Invalid username or password".into()));
    }

    let token = auth::create_jwt(&account_id, &inner.auth_secret).map_err(|e| ApiError::Internal(format!("{e:#}")))?;

    Ok(Json(LoginResponse { token, account_id }))
}
