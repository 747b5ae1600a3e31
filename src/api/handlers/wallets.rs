use axum::Json;
use axum::extract::{Path, Query, State};
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::middleware::AuthUser;
use crate::api::state::AppState;

#[derive(Serialize)]
pub struct WalletDto {
    pub account_id: String,
    pub available: i64,
    pub escrow: i64,
}

pub async fn get(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(account_id): Path<String>,
) -> Result<Json<WalletDto>, ApiError> {
    let ledger = state.inner.read().await.ledger.clone();
    let wallet = ledger.wallet(&account_id).await?;
    Ok(Json(WalletDto { account_id: wallet.account_id, available: wallet.available, escrow: wallet.escrow }))
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    50
}

pub async fn history(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(account_id): Path<String>,
    Query(q): Query<HistoryQuery>,
) -> Result<Json<Vec<crate::model::ledger_entry::LedgerEntry>>, ApiError> {
    let ledger = state.inner.read().await.ledger.clone();
    let entries = ledger.history(&account_id, q.limit).await?;
    Ok(Json(entries))
}

#[derive(Deserialize)]
pub struct WithdrawRequest {
    pub amount: i64,
    pub method: String,
}

#[derive(Serialize)]
pub struct WithdrawResponse {
    pub ledger_id: String,
}

fn parse_kyc_state(s: &str) -> crate::model::account::KycState {
    use crate::model::account::KycState;
    match s {
        "pending" => KycState::Pending,
        "approved" => KycState::Approved,
        "rejected" => KycState::Rejected,
        _ => KycState::None,
    }
}

pub async fn withdraw(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(account_id): Path<String>,
    Json(req): Json<WithdrawRequest>,
) -> Result<Json<WithdrawResponse>, ApiError> {
    if auth.account_id != account_id {
        return Err(ApiError::Unauthorized("cannot withdraw from another account".into()));
    }
    if req.amount <= 0 {
        return Err(ApiError::BadRequest("amount must be positive".into()));
    }

    let (ledger, db) = {
        let inner = state.inner.read().await;
        (inner.ledger.clone(), inner.db.clone())
    };

    let kyc_state = {
        let conn = db.lock().await;
        let raw: String = conn
            .query_row("SELECT kyc_state FROM users WHERE id = ?1", [&account_id], |row| row.get(0))
            .map_err(|_| ApiError::NotFound("account not found".into()))?;
        parse_kyc_state(&raw)
    };

    let ledger_id = ledger.withdraw(&account_id, req.amount, kyc_state, &req.method, None).await?;
    Ok(Json(WithdrawResponse { ledger_id }))
}
