use std::sync::Arc;
use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;

use crate::config::Config;
use crate::error::AppError;
use crate::repositories::{OAuthStateRepository, SessionRepository, SocialConnectionRepository};
use crate::services::providers::ProviderRegistry;
use crate::services::{ConnectionService, DirectoryService, SessionService, TokenCipher};

/// アプリケーション共有状態
///
/// axum の State として全ハンドラーで共有される。
/// Clone は必須（axum が内部で clone するため）。
#[derive(Clone)]
pub struct AppState {
    /// アプリケーション設定（Arc で共有）
    pub config: Arc<Config>,
    /// 認可開始・コールバック・連携解除
    pub connection_service: ConnectionService,
    /// 連携状態の一覧
    pub directory_service: DirectoryService,
    /// セッションからのユーザー解決
    pub session_service: SessionService,
}

impl AppState {
    /// 新しい AppState を作成
    pub fn new(db_pool: PgPool, config: Config) -> Result<Self, AppError> {
        let config = Arc::new(config);

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .user_agent(concat!("socialhub/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                tracing::error!(error = ?e, "HTTP クライアントの構築に失敗");
                AppError::Internal(anyhow::anyhow!("http client build error"))
            })?;

        let providers = Arc::new(ProviderRegistry::from_config(&config, &http_client));
        let token_cipher = TokenCipher::from_base64(config.encryption_key.expose_secret())?;

        let connections = Arc::new(SocialConnectionRepository::new(db_pool.clone()));
        let oauth_states = Arc::new(OAuthStateRepository::new(db_pool.clone()));
        let sessions = Arc::new(SessionRepository::new(db_pool));

        let connection_service = ConnectionService::new(
            providers,
            connections.clone(),
            oauth_states,
            token_cipher,
            time::Duration::seconds(config.oauth_state_ttl_secs),
        );
        let directory_service = DirectoryService::new(connections);
        let session_service = SessionService::new(sessions, config.session_cookie_name.clone());

        Ok(Self {
            config,
            connection_service,
            directory_service,
            session_service,
        })
    }
}
