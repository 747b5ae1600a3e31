use axum::Json;
use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::middleware::AuthUser;
use crate::api::state::AppState;
use crate::model::lobby::{Lobby, LobbyMode};
use crate::model::payout::PayoutModel;

#[derive(Deserialize)]
pub struct CreateLobbyRequest {
    pub mode: String,
    pub buy_in: i64,
    pub payout_model: String,
    pub rake_bps: u32,
    #[serde(default)]
    pub rake_cap: Option<i64>,
}

#[derive(Serialize)]
pub struct CreateLobbyResponse {
    pub lobby_id: String,
}

fn parse_mode(s: &str) -> Result<LobbyMode, ApiError> {
    match s {
        "solo" => Ok(LobbyMode::Solo),
        "duo" => Ok(LobbyMode::Duo),
        "squad" => Ok(LobbyMode::Squad),
        _ => Err(ApiError::BadRequest(format!("unknown lobby mode '{s}'"))),
    }
}

fn parse_payout_model(s: &str) -> Result<PayoutModel, ApiError> {
    match s {
        "winner_take_all" => Ok(PayoutModel::WinnerTakeAll),
        "top3_ladder" => Ok(PayoutModel::Top3Ladder),
        "proportional" => Ok(PayoutModel::Proportional),
        _ => Err(ApiError::BadRequest(format!("unknown payout model '{s}'"))),
    }
}

pub async fn create(
    State(state): State<AppState>,
    Json(req): Json<CreateLobbyRequest>,
) -> Result<Json<CreateLobbyResponse>, ApiError> {
    if req.buy_in <= 0 {
        return Err(ApiError::BadRequest("buy_in must be positive".into()));
    }
    if req.rake_bps > 10_000 {
        return Err(ApiError::BadRequest("rake_bps must be 0..=10000".into()));
    }

    let mode = parse_mode(&req.mode)?;
    let payout_model = parse_payout_model(&req.payout_model)?;

    let controller = state.inner.read().await.controller.clone();
    let lobby_id = controller
        .create_lobby(mode, req.buy_in, payout_model, req.rake_bps, req.rake_cap)
        .await?;

    Ok(Json(CreateLobbyResponse { lobby_id }))
}

#[derive(Serialize)]
pub struct OkResponse {
    pub ok: bool,
}

#[derive(Serialize)]
pub struct JoinResponse {
    pub ok: bool,
    /// Set when this join filled the lobby and promoted it to a match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_id: Option<String>,
}

pub async fn get(
    State(state): State<AppState>,
    Path(lobby_id): Path<String>,
) -> Result<Json<Lobby>, ApiError> {
    let controller = state.inner.read().await.controller.clone();
    let lobby = controller.lobby(&lobby_id).await?;
    Ok(Json(lobby))
}

pub async fn join(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(lobby_id): Path<String>,
) -> Result<Json<JoinResponse>, ApiError> {
    let (controller, rate_limiter) = {
        let inner = state.inner.read().await;
        (inner.controller.clone(), inner.rate_limiter.clone())
    };

    if let Err(retry_after) = rate_limiter.check(&auth.account_id).await {
        return Err(ApiError::RateLimited(format!("retry after {retry_after}s")));
    }

    let promoted = controller.join(&lobby_id, &auth.account_id, 0).await?;
    Ok(Json(JoinResponse { ok: true, match_id: promoted.map(|record| record.id) }))
}

pub async fn leave(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(lobby_id): Path<String>,
) -> Result<Json<OkResponse>, ApiError> {
    let controller = state.inner.read().await.controller.clone();
    controller.leave(&lobby_id, &auth.account_id).await?;
    Ok(Json(OkResponse { ok: true }))
}
