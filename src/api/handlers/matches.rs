use axum::Json;
use axum::extract::{Path, State};
use serde::Serialize;

use crate::api::error::ApiError;
use crate::api::state::AppState;
use crate::rng;

#[derive(Serialize)]
pub struct VerifyResponse {
    pub commit_hex: String,
    pub seed_hex: String,
    pub nonce_hex: String,
    pub algorithm: &'static str,
    pub verified: bool,
}

/// Only populated once the match has settled — `seed`/`nonce` are withheld
/// from clients until `ended_at` is set.
pub async fn verify(
    State(state): State<AppState>,
    Path(match_id): Path<String>,
) -> Result<Json<VerifyResponse>, ApiError> {
    let controller = state.inner.read().await.controller.clone();
    let record = controller.load_match(&match_id).await?;

    if record.ended_at.is_none() {
        return Err(ApiError::Conflict("match has not been settled yet".into()));
    }

    let verified = rng::verify(&record.seed_hex, &record.nonce_hex, &record.commit_hex)?;

    Ok(Json(VerifyResponse {
        commit_hex: record.commit_hex,
        seed_hex: record.seed_hex,
        nonce_hex: record.nonce_hex,
        algorithm: "SHA-256(seed || nonce)",
        verified,
    }))
}
