use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::services::providers::ProviderError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("認証が必要です")]
    Unauthorized,

    #[error("設定エラー: {0}")]
    Configuration(String),

    #[error("未対応のプラットフォーム: {0}")]
    UnknownPlatform(String),

    #[error("データベースエラー")]
    Database(#[from] sqlx::Error),

    #[error("内部エラー")]
    Internal(#[from] anyhow::Error),
}

impl From<ProviderError> for AppError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::Configuration(detail) => Self::Configuration(detail.to_string()),
            other => Self::Internal(anyhow::Error::new(other)),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            Self::Configuration(detail) => {
                tracing::error!(detail = %detail, "プロバイダー設定エラー");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "API credentials not configured".to_string(),
                )
            }
            Self::UnknownPlatform(platform) => {
                tracing::debug!(platform = %platform, "未対応のプラットフォーム");
                (StatusCode::NOT_FOUND, "Unknown platform".to_string())
            }
            Self::Database(e) => {
                tracing::error!(error = ?e, "データベースエラー");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            Self::Internal(e) => {
                tracing::error!(error = ?e, "内部エラー");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}
