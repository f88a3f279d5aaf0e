use crate::{error::AppError, AppState};
use axum::{
    extract::{Path, State},
    Json,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use supervisor::{BotDetail, BotEdit, NewBotRequest, Overview};
use uuid::Uuid;

/// GET /api/overview
pub async fn overview(State(state): State<Arc<AppState>>) -> Result<Json<Overview>, AppError> {
    Ok(Json(state.supervisor.overview().await?))
}

/// GET /api/bot/:id
pub async fn bot_detail(
    Path(id): Path<Uuid>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<BotDetail>, AppError> {
    Ok(Json(state.supervisor.bot_detail(id).await?))
}

/// POST /api/bot
pub async fn create_bot(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewBotRequest>,
) -> Result<Json<core_types::BotConfig>, AppError> {
    Ok(Json(state.supervisor.create_bot(req).await?))
}

/// PATCH /api/bot/:id
pub async fn update_bot(
    Path(id): Path<Uuid>,
    State(state): State<Arc<AppState>>,
    Json(edit): Json<BotEdit>,
) -> Result<Json<core_types::BotConfig>, AppError> {
    Ok(Json(state.supervisor.update_bot(id, edit).await?))
}

/// DELETE /api/bot/:id
pub async fn delete_bot(
    Path(id): Path<Uuid>,
    State(state): State<Arc<AppState>>,
) -> Result<(), AppError> {
    state.supervisor.delete_bot(id).await?;
    Ok(())
}

/// POST /api/bot/:id/start
pub async fn start_bot(
    Path(id): Path<Uuid>,
    State(state): State<Arc<AppState>>,
) -> Result<(), AppError> {
    state.supervisor.start(id).await?;
    Ok(())
}

/// POST /api/bot/:id/stop
pub async fn stop_bot(
    Path(id): Path<Uuid>,
    State(state): State<Arc<AppState>>,
) -> Result<(), AppError> {
    state.supervisor.stop(id).await?;
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct AddFundsRequest {
    pub amount: Decimal,
}

/// POST /api/bot/:id/add-funds
pub async fn add_funds(
    Path(id): Path<Uuid>,
    State(state): State<Arc<AppState>>,
    Json(req): Json<AddFundsRequest>,
) -> Result<Json<core_types::BotConfig>, AppError> {
    Ok(Json(state.supervisor.add_funds(id, req.amount).await?))
}
