use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use supervisor::SupervisorError;
use thiserror::Error;

/// Translates every `SupervisorError` into the dashboard's HTTP
/// contract (spec §6); this crate adds no error kinds of its own.
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let AppError::Supervisor(err) = self;

        let status = match &err {
            SupervisorError::NotFound(_) => StatusCode::NOT_FOUND,
            SupervisorError::AlreadyRunning(_)
            | SupervisorError::NotRunning(_)
            | SupervisorError::EditWhileRunning { .. }
            | SupervisorError::NotStoppedAndFlat(_) => StatusCode::CONFLICT,
            SupervisorError::OverAllocation(_)
            | SupervisorError::InvalidRiskParams(_)
            | SupervisorError::Risk(_) => StatusCode::UNPROCESSABLE_ENTITY,
            SupervisorError::Registry(_)
            | SupervisorError::PositionStore(_)
            | SupervisorError::Exchange(_)
            | SupervisorError::TradingLoop { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %err, "dashboard request failed");
        }

        (status, Json(json!({ "error": err.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use uuid::Uuid;

    async fn status_for(err: SupervisorError) -> StatusCode {
        AppError::from(err).into_response().status()
    }

    #[tokio::test]
    async fn not_found_maps_to_404() {
        assert_eq!(status_for(SupervisorError::NotFound(Uuid::new_v4())).await, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn lifecycle_conflicts_map_to_409() {
        assert_eq!(status_for(SupervisorError::AlreadyRunning(Uuid::new_v4())).await, StatusCode::CONFLICT);
        assert_eq!(status_for(SupervisorError::NotRunning(Uuid::new_v4())).await, StatusCode::CONFLICT);
        assert_eq!(
            status_for(SupervisorError::EditWhileRunning { bot_id: Uuid::new_v4(), field: "symbol" }).await,
            StatusCode::CONFLICT
        );
        assert_eq!(status_for(SupervisorError::NotStoppedAndFlat(Uuid::new_v4())).await, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn overallocation_maps_to_422_with_error_body() {
        let err = SupervisorError::OverAllocation(accounting::AccountingError::OverAllocation {
            requested: rust_decimal::Decimal::from(10),
            would_be_total: rust_decimal::Decimal::from(1000),
            available: rust_decimal::Decimal::from(5),
        });
        let response = AppError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(parsed["error"].as_str().unwrap().contains("over-allocat") || parsed["error"].as_str().unwrap().len() > 0);
    }

    #[tokio::test]
    async fn registry_error_maps_to_500() {
        assert_eq!(status_for(SupervisorError::Registry("disk full".to_string())).await, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
