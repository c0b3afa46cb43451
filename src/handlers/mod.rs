pub mod connections;
pub mod extract;
pub mod health;

use axum::{
    Router,
    routing::{delete, get},
};
use http::{HeaderValue, header};
use tower_http::set_header::SetResponseHeaderLayer;

use crate::state::AppState;

pub use connections::{connect, disconnect, list_connections, preflight};
pub use health::health_check;

/// API ルーティング
///
/// - 連携一覧はキャッシュ禁止ヘッダーを常に付与
/// - 連携解除とプリフライトは CORS ヘッダーを付与
pub fn router(state: AppState) -> Router {
    let list = get(list_connections).layer((
        SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store, no-cache, must-revalidate, proxy-revalidate"),
        ),
        SetResponseHeaderLayer::overriding(header::PRAGMA, HeaderValue::from_static("no-cache")),
        SetResponseHeaderLayer::overriding(header::EXPIRES, HeaderValue::from_static("0")),
    ));

    let cors = delete(disconnect).options(preflight).layer((
        SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ),
        SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("GET, POST, PUT, DELETE, OPTIONS"),
        ),
        SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Content-Type, Authorization"),
        ),
    ));

    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/connections", list)
        .route("/api/connections/{platform}", get(connect).merge(cors))
        .with_state(state)
}
