//! Dashboard API route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<GameHandle>`.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::engine::session::{GameHandle, GameStatus};
use crate::types::{GameError, RoundId, RoundReport, StakeId, StakeRequest};

pub type AppState = Arc<GameHandle>;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StartRequest {
    #[serde(default)]
    pub one: StakeRequest,
    #[serde(default)]
    pub two: StakeRequest,
}

#[derive(Debug, Clone, Serialize)]
pub struct StartResponse {
    pub round_id: RoundId,
    pub balance: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct CashOutResponse {
    pub stake: u8,
    /// Zero when the request was not eligible.
    pub winnings: Decimal,
    pub balance: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// HTTP view of a [`GameError`].
pub struct ApiError(GameError);

impl From<GameError> for ApiError {
    fn from(e: GameError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            GameError::InvalidStake(_) | GameError::InsufficientBalance { .. } => {
                StatusCode::BAD_REQUEST
            }
            GameError::InvalidState { .. } => StatusCode::CONFLICT,
        };
        (status, Json(ErrorResponse { error: self.0.to_string() })).into_response()
    }
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /api/status
pub async fn get_status(State(game): State<AppState>) -> Json<GameStatus> {
    Json(game.status().await)
}

/// GET /api/history
pub async fn get_history(State(game): State<AppState>) -> Json<Vec<Decimal>> {
    Json(game.history().await)
}

/// GET /api/last-round
pub async fn get_last_round(
    State(game): State<AppState>,
) -> Result<Json<RoundReport>, StatusCode> {
    game.last_report().await.map(Json).ok_or(StatusCode::NOT_FOUND)
}

/// POST /api/start
pub async fn post_start(
    State(game): State<AppState>,
    Json(req): Json<StartRequest>,
) -> Result<Json<StartResponse>, ApiError> {
    let round_id = game.start(req.one, req.two).await?;
    Ok(Json(StartResponse {
        round_id,
        balance: game.balance().await,
    }))
}

/// POST /api/cash-out/:stake
///
/// Never fails: an unknown slot number settles nothing and reports zero.
pub async fn post_cash_out(
    State(game): State<AppState>,
    Path(stake): Path<u8>,
) -> Json<CashOutResponse> {
    let winnings = match StakeId::from_number(stake) {
        Some(id) => game.request_cash_out(id).await,
        None => Decimal::ZERO,
    };
    Json(CashOutResponse {
        stake,
        winnings,
        balance: game.balance().await,
    })
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
