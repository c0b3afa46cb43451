use axum::{extract::FromRequestParts, http::request::Parts};

use crate::error::AppError;
use crate::models::User;
use crate::state::AppState;

/// 認証済みユーザー（未認証なら 401）
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        state
            .session_service
            .authenticate(&parts.headers)
            .await
            .map(CurrentUser)
    }
}
