//! ソーシャル連携ハンドラー
//!
//! `GET /api/connections/{platform}` は code / error の有無で
//! 認可開始とコールバックを切り替える。
//!
//! # Security
//! - アクセストークンはレスポンス・ログに含めない
//! - コールバックの失敗理由は分類コードのみ UI に返す

use axum::{
    Json,
    extract::{Path, Query, State, rejection::QueryRejection},
    http::{HeaderMap, StatusCode, header},
    response::{Html, IntoResponse, Redirect, Response},
};
use serde::Serialize;
use time::OffsetDateTime;

use crate::config::Config;
use crate::error::AppError;
use crate::handlers::extract::CurrentUser;
use crate::models::Platform;
use crate::services::{CallbackFailure, CallbackOutcome, CallbackParams, ConnectionDirectory};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct DisconnectResponse {
    pub success: bool,
}

fn parse_platform(slug: &str) -> Result<Platform, AppError> {
    Platform::from_slug(slug).ok_or_else(|| AppError::UnknownPlatform(slug.to_string()))
}

/// 認可開始 / コールバック
///
/// GET /api/connections/{platform}
pub async fn connect(
    State(state): State<AppState>,
    Path(platform): Path<String>,
    query: Result<Query<CallbackParams>, QueryRejection>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let platform = parse_platform(&platform)?;

    // 解釈できないクエリはプロバイダーからの不正な戻りとして扱う
    let params = match query {
        Ok(Query(params)) => params,
        Err(rejection) => {
            tracing::warn!(platform = %platform, error = %rejection, "コールバックのクエリが不正");
            let failure = CallbackFailure {
                code: CallbackFailure::AUTH_FAILED,
                detail: None,
            };
            return Ok(error_redirect(&state.config, &failure));
        }
    };

    if !params.is_callback() {
        let initiator = if state.connection_service.requires_initiator(platform) {
            Some(state.session_service.authenticate(&headers).await?)
        } else {
            None
        };
        let url = state
            .connection_service
            .initiate(platform, initiator.as_ref())
            .await?;
        return Ok(Redirect::temporary(url.as_str()).into_response());
    }

    let user = state.session_service.authenticate(&headers).await?;

    let response = match state
        .connection_service
        .handle_callback(&user, platform, params)
        .await
    {
        CallbackOutcome::Connected(_) => client_redirect(&state.config, "success=true"),
        CallbackOutcome::Failed(failure) if failure.is_server_error() => {
            client_redirect(&state.config, "error=server_error")
        }
        CallbackOutcome::Failed(failure) => error_redirect(&state.config, &failure),
    };

    Ok(response)
}

/// 失敗時は連携画面へ 302 リダイレクト
fn error_redirect(config: &Config, failure: &CallbackFailure) -> Response {
    let mut location = format!("{}?error={}", config.connections_ui_url(), failure.code);

    if config.expose_provider_error_details {
        if let Some(detail) = &failure.detail {
            location.push_str("&details=");
            location.push_str(&urlencoding::encode(detail));
        }
    }

    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

/// クライアント側で連携画面へ遷移させる HTML
///
/// プロバイダー経由のリダイレクト直後は 30x より確実に遷移できるため、
/// 成功時と server_error はこちらを使う
fn client_redirect(config: &Config, indicator: &str) -> Response {
    let timestamp = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    let body = format!(
        r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <title>Redirecting...</title>
  <script>
    window.location.replace("{}?{}&t={}");
  </script>
</head>
<body>
</body>
</html>"#,
        config.connections_ui_path, indicator, timestamp
    );

    (
        [
            (header::CACHE_CONTROL, "no-store, private"),
            (header::PRAGMA, "no-cache"),
        ],
        Html(body),
    )
        .into_response()
}

/// 連携解除
///
/// DELETE /api/connections/{platform}
pub async fn disconnect(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(platform): Path<String>,
) -> Result<Json<DisconnectResponse>, AppError> {
    let platform = parse_platform(&platform)?;

    state
        .connection_service
        .disconnect(user.id, platform)
        .await?;

    Ok(Json(DisconnectResponse { success: true }))
}

/// CORS プリフライト
///
/// OPTIONS /api/connections/{platform}
pub async fn preflight(Path(platform): Path<String>) -> Result<impl IntoResponse, AppError> {
    parse_platform(&platform)?;
    Ok((
        StatusCode::NO_CONTENT,
        [(header::ACCESS_CONTROL_MAX_AGE, "86400")],
    ))
}

/// 連携状態の一覧
///
/// GET /api/connections
pub async fn list_connections(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<ConnectionDirectory>, AppError> {
    let directory = state.directory_service.list(user.id).await?;
    Ok(Json(directory))
}
