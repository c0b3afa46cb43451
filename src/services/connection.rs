//! 連携ライフサイクル（認可開始 → コールバック → 保存、連携解除）

use std::sync::Arc;

use reqwest::Url;
use serde::Deserialize;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{ConnectionFields, Platform, SocialConnection, User};
use crate::repositories::{ConnectionStore, OAuthStateStore};
use crate::services::TokenCipher;
use crate::services::providers::{
    LongLivedExchange, ProviderAdapter, ProviderError, ProviderIdentity, ProviderRegistry,
    generate_state,
};

/// コールバックのクエリパラメータ
#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
    pub state: Option<String>,
}

impl CallbackParams {
    /// code または error があればプロバイダーからの戻り
    pub fn is_callback(&self) -> bool {
        self.code.is_some() || self.error.is_some()
    }
}

/// 連携失敗の分類（UI へは code のみ返す）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackFailure {
    pub code: &'static str,
    /// プロバイダーの生のエラー本文（デバッグ用）
    pub detail: Option<String>,
}

impl CallbackFailure {
    pub const AUTH_FAILED: &'static str = "auth_failed";
    pub const CONFIG_ERROR: &'static str = "config_error";
    pub const INVALID_STATE: &'static str = "invalid_state";
    pub const SERVER_ERROR: &'static str = "server_error";

    fn new(code: &'static str) -> Self {
        Self { code, detail: None }
    }

    pub fn is_server_error(&self) -> bool {
        self.code == Self::SERVER_ERROR
    }
}

impl From<ProviderError> for CallbackFailure {
    fn from(e: ProviderError) -> Self {
        Self {
            code: e.code(),
            detail: e.detail().map(str::to_string),
        }
    }
}

#[derive(Debug)]
pub enum CallbackOutcome {
    Connected(SocialConnection),
    Failed(CallbackFailure),
}

/// 認可済みアカウントと保存する最終トークン
struct AuthorizedAccount {
    identity: ProviderIdentity,
    access_token: String,
}

#[derive(Clone)]
pub struct ConnectionService {
    providers: Arc<ProviderRegistry>,
    connections: Arc<dyn ConnectionStore>,
    oauth_states: Arc<dyn OAuthStateStore>,
    token_cipher: TokenCipher,
    state_ttl: Duration,
}

impl ConnectionService {
    pub fn new(
        providers: Arc<ProviderRegistry>,
        connections: Arc<dyn ConnectionStore>,
        oauth_states: Arc<dyn OAuthStateStore>,
        token_cipher: TokenCipher,
        state_ttl: Duration,
    ) -> Self {
        Self {
            providers,
            connections,
            oauth_states,
            token_cipher,
            state_ttl,
        }
    }

    fn adapter(&self, platform: Platform) -> Result<Arc<dyn ProviderAdapter>, AppError> {
        self.providers.get(platform).ok_or_else(|| {
            AppError::Configuration(format!("{} credentials are not configured", platform))
        })
    }

    /// 認可開始に認証済みユーザーが必要か
    ///
    /// state ノンスは発行したユーザーに紐付けるため、state を使うプラットフォームでは必須
    pub fn requires_initiator(&self, platform: Platform) -> bool {
        self.providers
            .get(platform)
            .is_some_and(|adapter| adapter.requires_state())
    }

    /// 認可 URL を生成
    ///
    /// state が必要なプラットフォームはノンスを発行し、開始ユーザーに紐付けて保存する
    pub async fn initiate(
        &self,
        platform: Platform,
        initiator: Option<&User>,
    ) -> Result<Url, AppError> {
        let adapter = self.adapter(platform)?;

        let state = if adapter.requires_state() {
            let user = initiator.ok_or(AppError::Unauthorized)?;

            let purged = self.oauth_states.delete_expired().await?;
            if purged > 0 {
                tracing::debug!(purged, "期限切れ state を削除");
            }

            let state = generate_state();
            let expires_at = OffsetDateTime::now_utc() + self.state_ttl;
            self.oauth_states
                .create(&state, platform, user.id, expires_at)
                .await?;
            Some(state)
        } else {
            None
        };

        let url = adapter.authorization_url(state.as_deref())?;
        tracing::info!(platform = %platform, "認可リクエスト開始");
        Ok(url)
    }

    /// プロバイダーからのコールバックを処理
    ///
    /// 失敗はすべて分類コードに変換され、エラーとしては返らない
    pub async fn handle_callback(
        &self,
        user: &User,
        platform: Platform,
        params: CallbackParams,
    ) -> CallbackOutcome {
        match self.complete(user, platform, params).await {
            Ok(connection) => CallbackOutcome::Connected(connection),
            Err(failure) => {
                tracing::warn!(
                    platform = %platform,
                    user_id = %user.id,
                    error_code = failure.code,
                    "連携失敗"
                );
                CallbackOutcome::Failed(failure)
            }
        }
    }

    async fn complete(
        &self,
        user: &User,
        platform: Platform,
        params: CallbackParams,
    ) -> Result<SocialConnection, CallbackFailure> {
        if let Some(error) = params.error.as_deref() {
            tracing::warn!(
                platform = %platform,
                error = %error,
                error_description = ?params.error_description,
                "プロバイダーが認可エラーを返却"
            );
            return Err(CallbackFailure::new(CallbackFailure::AUTH_FAILED));
        }

        let Some(code) = params.code.as_deref().filter(|c| !c.is_empty()) else {
            return Err(CallbackFailure::new(CallbackFailure::AUTH_FAILED));
        };

        let adapter = self.providers.get(platform).ok_or_else(|| {
            tracing::error!(platform = %platform, "連携未設定のプラットフォームへのコールバック");
            CallbackFailure::new(CallbackFailure::CONFIG_ERROR)
        })?;
        adapter.credentials().client_secret()?;

        if adapter.requires_state() {
            self.verify_state(user, platform, params.state.as_deref()).await?;
        }

        let account = self.authorize(adapter.as_ref(), code).await?;

        let access_token_encrypted = self
            .token_cipher
            .encrypt(&account.access_token)
            .map_err(|_| CallbackFailure::new(CallbackFailure::SERVER_ERROR))?;

        let fields = ConnectionFields {
            access_token_encrypted,
            platform_user_id: account.identity.platform_user_id,
            platform_user_name: account.identity.display_name,
            platform_user_avatar: account.identity.avatar_url,
        };

        let connection = self
            .connections
            .upsert(user.id, platform, fields)
            .await
            .map_err(|e| {
                tracing::error!(error = ?e, platform = %platform, "連携の保存に失敗");
                CallbackFailure::new(CallbackFailure::SERVER_ERROR)
            })?;

        tracing::info!(
            platform = %platform,
            user_id = %user.id,
            platform_user_id = %connection.platform_user_id,
            "連携完了"
        );
        Ok(connection)
    }

    async fn verify_state(
        &self,
        user: &User,
        platform: Platform,
        state: Option<&str>,
    ) -> Result<(), CallbackFailure> {
        let Some(state) = state.filter(|s| !s.is_empty()) else {
            tracing::warn!(platform = %platform, "state パラメータなし");
            return Err(CallbackFailure::new(CallbackFailure::INVALID_STATE));
        };

        let consumed = self
            .oauth_states
            .consume(state, platform, user.id)
            .await
            .map_err(|e| {
                tracing::error!(error = ?e, "state の検証に失敗");
                CallbackFailure::new(CallbackFailure::SERVER_ERROR)
            })?;

        if !consumed {
            tracing::warn!(
                platform = %platform,
                user_id = %user.id,
                "不明・期限切れ・他ユーザー発行の state（CSRF の可能性）"
            );
            return Err(CallbackFailure::new(CallbackFailure::INVALID_STATE));
        }

        Ok(())
    }

    /// 認可コード交換 → 長期トークン交換 → アカウント情報取得
    async fn authorize(
        &self,
        adapter: &dyn ProviderAdapter,
        code: &str,
    ) -> Result<AuthorizedAccount, ProviderError> {
        let grant = adapter.exchange_code(code).await?;
        let mut access_token = grant.access_token.clone();

        if adapter.long_lived_exchange() == LongLivedExchange::BeforeIdentity {
            access_token = adapter.exchange_long_lived_token(&access_token).await?;
        }

        let mut identity = adapter.fetch_identity(&access_token, &grant).await?;

        // 連携対象が固有トークンを持つ場合はそちらを保存する
        if let Some(target_token) = identity.access_token.take() {
            access_token = target_token;
        }

        if adapter.long_lived_exchange() == LongLivedExchange::AfterIdentity {
            access_token = adapter.exchange_long_lived_token(&access_token).await?;
        }

        Ok(AuthorizedAccount {
            identity,
            access_token,
        })
    }

    /// 連携を解除（未連携でも成功）
    ///
    /// # Note
    /// プロバイダー側のトークン失効 API は呼ばない（有効期限切れに任せる）
    pub async fn disconnect(&self, user_id: Uuid, platform: Platform) -> Result<bool, AppError> {
        let existing = self
            .connections
            .find_by_user_and_platform(user_id, platform)
            .await?;

        if let Some(connection) = &existing {
            tracing::debug!(
                platform = %platform,
                platform_user_id = %connection.platform_user_id,
                "リモートトークンは失効させずに連携を削除"
            );
        }

        let deleted = self
            .connections
            .delete_by_user_and_platform(user_id, platform)
            .await?;

        tracing::info!(platform = %platform, user_id = %user_id, deleted, "連携解除");
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::repositories::memory::{
        FailingConnectionStore, MemoryConnectionStore, MemoryOAuthStateStore,
    };
    use crate::services::providers::facebook::FacebookEndpoints;
    use crate::services::providers::instagram::InstagramEndpoints;
    use crate::services::providers::tiktok::TikTokEndpoints;
    use crate::services::providers::{
        FacebookAdapter, InstagramAdapter, PlatformCredentials, TikTokAdapter,
    };
    use crate::services::token_cipher::test_cipher;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn credentials(platform: Platform) -> PlatformCredentials {
        PlatformCredentials {
            client_id: format!("{}-app", platform.slug()),
            client_secret: Some(Arc::new("secret".to_string())),
            redirect_uri: format!("https://app.test/api/connections/{}", platform.slug()),
        }
    }

    fn user() -> User {
        User {
            id: Uuid::new_v4(),
            email: "owner@example.com".to_string(),
        }
    }

    fn callback(code: &str) -> CallbackParams {
        CallbackParams {
            code: Some(code.to_string()),
            ..Default::default()
        }
    }

    struct Fixture {
        service: ConnectionService,
        connections: Arc<MemoryConnectionStore>,
        states: Arc<MemoryOAuthStateStore>,
    }

    fn fixture(server: &MockServer) -> Fixture {
        fixture_with_client(server, reqwest::Client::new())
    }

    fn fixture_with_client(server: &MockServer, client: reqwest::Client) -> Fixture {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(FacebookAdapter::with_endpoints(
            credentials(Platform::Facebook),
            client.clone(),
            FacebookEndpoints {
                authorize_url: format!("{}/dialog/oauth", server.uri()),
                graph_base_url: format!("{}/fb", server.uri()),
            },
        )));
        registry.register(Arc::new(InstagramAdapter::with_endpoints(
            credentials(Platform::Instagram),
            client.clone(),
            InstagramEndpoints {
                authorize_url: format!("{}/ig/authorize", server.uri()),
                token_url: format!("{}/ig/oauth/access_token", server.uri()),
                graph_base_url: format!("{}/ig-graph", server.uri()),
            },
        )));
        registry.register(Arc::new(TikTokAdapter::with_endpoints(
            credentials(Platform::Tiktok),
            client,
            TikTokEndpoints {
                authorize_url: format!("{}/tt/authorize/", server.uri()),
                api_base_url: format!("{}/tt", server.uri()),
            },
        )));

        let connections = Arc::new(MemoryConnectionStore::default());
        let states = Arc::new(MemoryOAuthStateStore::default());
        let service = ConnectionService::new(
            Arc::new(registry),
            connections.clone(),
            states.clone(),
            test_cipher(),
            Duration::minutes(10),
        );

        Fixture {
            service,
            connections,
            states,
        }
    }

    async fn mount_facebook(server: &MockServer, pages: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path("/fb/oauth/access_token"))
            .and(query_param("code", "fb-code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "short"})))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/fb/me"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "u1", "name": "U"})))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/fb/me/accounts"))
            .and(query_param("access_token", "short"))
            .respond_with(ResponseTemplate::new(200).set_body_json(pages))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_facebook_connects_first_page_with_long_lived_token() {
        let server = MockServer::start().await;
        mount_facebook(
            &server,
            json!({"data": [{"id": "77", "name": "My Page", "access_token": "pagetok"}]}),
        )
        .await;
        Mock::given(method("GET"))
            .and(path("/fb/oauth/access_token"))
            .and(query_param("fb_exchange_token", "pagetok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "long"})))
            .mount(&server)
            .await;

        let f = fixture(&server);
        let user = user();
        let outcome = f
            .service
            .handle_callback(&user, Platform::Facebook, callback("fb-code"))
            .await;

        let CallbackOutcome::Connected(connection) = outcome else {
            panic!("expected connected");
        };
        assert_eq!(connection.platform, "FACEBOOK");
        assert_eq!(connection.platform_user_id, "77");
        assert_eq!(connection.platform_user_name.as_deref(), Some("My Page"));
        assert_eq!(
            test_cipher()
                .decrypt(&connection.access_token_encrypted)
                .unwrap(),
            "long"
        );
        assert_eq!(f.connections.count_for(user.id, Platform::Facebook), 1);
    }

    #[tokio::test]
    async fn test_facebook_without_pages_writes_nothing() {
        let server = MockServer::start().await;
        mount_facebook(&server, json!({"data": []})).await;

        let f = fixture(&server);
        let outcome = f
            .service
            .handle_callback(&user(), Platform::Facebook, callback("fb-code"))
            .await;

        let CallbackOutcome::Failed(failure) = outcome else {
            panic!("expected failure");
        };
        assert_eq!(failure.code, "no_pages");
        assert_eq!(f.connections.count(), 0);
    }

    #[tokio::test]
    async fn test_instagram_long_lived_failure_writes_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ig/oauth/access_token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"access_token": "short", "user_id": "ig-1"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/ig-graph/access_token"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad token"))
            .mount(&server)
            .await;

        let f = fixture(&server);
        let outcome = f
            .service
            .handle_callback(&user(), Platform::Instagram, callback("ig-code"))
            .await;

        let CallbackOutcome::Failed(failure) = outcome else {
            panic!("expected failure");
        };
        assert_eq!(failure.code, "long_lived_token");
        assert_eq!(failure.detail.as_deref(), Some("bad token"));
        assert_eq!(f.connections.count(), 0);
    }

    #[tokio::test]
    async fn test_provider_error_param_is_auth_failed() {
        let server = MockServer::start().await;
        let f = fixture(&server);

        let params = CallbackParams {
            error: Some("access_denied".to_string()),
            error_description: Some("user cancelled".to_string()),
            ..Default::default()
        };
        let outcome = f
            .service
            .handle_callback(&user(), Platform::Instagram, params)
            .await;

        assert!(matches!(
            outcome,
            CallbackOutcome::Failed(CallbackFailure { code: "auth_failed", .. })
        ));
        assert!(server.received_requests().await.unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn test_unconfigured_platform_is_config_error() {
        let server = MockServer::start().await;
        let f = fixture(&server);

        let outcome = f
            .service
            .handle_callback(&user(), Platform::Threads, callback("code"))
            .await;
        assert!(matches!(
            outcome,
            CallbackOutcome::Failed(CallbackFailure { code: "config_error", .. })
        ));

        let err = f.service.initiate(Platform::Threads, None).await.unwrap_err();
        assert!(matches!(err, AppError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_missing_secret_is_config_error() {
        let server = MockServer::start().await;
        let mut registry = ProviderRegistry::new();
        let mut creds = credentials(Platform::Instagram);
        creds.client_secret = None;
        registry.register(Arc::new(InstagramAdapter::new(creds, reqwest::Client::new())));
        let service = ConnectionService::new(
            Arc::new(registry),
            Arc::new(MemoryConnectionStore::default()),
            Arc::new(MemoryOAuthStateStore::default()),
            test_cipher(),
            Duration::minutes(10),
        );

        // 認可開始はシークレットなしでも可能
        assert!(service.initiate(Platform::Instagram, None).await.is_ok());

        let outcome = service
            .handle_callback(&user(), Platform::Instagram, callback("code"))
            .await;
        assert!(matches!(
            outcome,
            CallbackOutcome::Failed(CallbackFailure { code: "config_error", .. })
        ));
        assert!(server.received_requests().await.unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn test_tiktok_state_roundtrip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tt/oauth/token/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"access_token": "act", "open_id": "oid"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/tt/user/info/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"user": {"open_id": "oid", "display_name": "dancer", "avatar_url": "https://cdn.test/a.png"}}
            })))
            .mount(&server)
            .await;

        let f = fixture(&server);
        let user = user();
        let url = f.service.initiate(Platform::Tiktok, Some(&user)).await.unwrap();
        let state = url
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .unwrap();
        assert!(f.states.contains(&state));

        let params = CallbackParams {
            code: Some("tt-code".to_string()),
            state: Some(state.clone()),
            ..Default::default()
        };
        let outcome = f
            .service
            .handle_callback(&user, Platform::Tiktok, params)
            .await;
        let CallbackOutcome::Connected(connection) = outcome else {
            panic!("expected connected");
        };
        assert_eq!(connection.platform_user_id, "oid");
        assert_eq!(connection.platform_user_name.as_deref(), Some("dancer"));
        assert!(!f.states.contains(&state));

        // 同じ state の再利用は拒否
        let replay = CallbackParams {
            code: Some("tt-code".to_string()),
            state: Some(state),
            ..Default::default()
        };
        let outcome = f
            .service
            .handle_callback(&user, Platform::Tiktok, replay)
            .await;
        assert!(matches!(
            outcome,
            CallbackOutcome::Failed(CallbackFailure { code: "invalid_state", .. })
        ));
    }

    #[tokio::test]
    async fn test_initiate_purges_expired_states() {
        let server = MockServer::start().await;
        let f = fixture(&server);
        let past = OffsetDateTime::now_utc() - Duration::minutes(1);
        let user = user();
        f.states
            .create("stale", Platform::Tiktok, user.id, past)
            .await
            .unwrap();

        f.service
            .initiate(Platform::Tiktok, Some(&user))
            .await
            .unwrap();

        assert_eq!(f.states.len(), 1);
        assert!(!f.states.contains("stale"));
    }

    #[tokio::test]
    async fn test_tiktok_expired_or_foreign_state_rejected() {
        let server = MockServer::start().await;
        let f = fixture(&server);
        let past = OffsetDateTime::now_utc() - Duration::minutes(1);
        let future = OffsetDateTime::now_utc() + Duration::minutes(5);
        let user = user();
        f.states
            .create("expired", Platform::Tiktok, user.id, past)
            .await
            .unwrap();
        f.states
            .create("for-threads", Platform::Threads, user.id, future)
            .await
            .unwrap();

        for state in ["expired", "for-threads", "unknown"] {
            let params = CallbackParams {
                code: Some("tt-code".to_string()),
                state: Some(state.to_string()),
                ..Default::default()
            };
            let outcome = f
                .service
                .handle_callback(&user, Platform::Tiktok, params)
                .await;
            assert!(matches!(
                outcome,
                CallbackOutcome::Failed(CallbackFailure { code: "invalid_state", .. })
            ));
        }
        assert!(server.received_requests().await.unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn test_tiktok_state_issued_to_another_user_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tt/oauth/token/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"access_token": "act", "open_id": "attacker"})),
            )
            .mount(&server)
            .await;

        let f = fixture(&server);
        let initiator = user();
        let other = user();
        let url = f
            .service
            .initiate(Platform::Tiktok, Some(&initiator))
            .await
            .unwrap();
        let state = url
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .unwrap();

        let params = CallbackParams {
            code: Some("attacker-code".to_string()),
            state: Some(state.clone()),
            ..Default::default()
        };
        let outcome = f
            .service
            .handle_callback(&other, Platform::Tiktok, params)
            .await;

        assert!(matches!(
            outcome,
            CallbackOutcome::Failed(CallbackFailure { code: "invalid_state", .. })
        ));
        assert_eq!(f.connections.count(), 0);
        assert!(server.received_requests().await.unwrap_or_default().is_empty());
        // 発行者自身のフローは引き続き有効
        assert!(f.states.contains(&state));
    }

    #[tokio::test]
    async fn test_tiktok_initiate_requires_user() {
        let server = MockServer::start().await;
        let f = fixture(&server);

        assert!(f.service.requires_initiator(Platform::Tiktok));
        assert!(!f.service.requires_initiator(Platform::Facebook));
        assert!(!f.service.requires_initiator(Platform::Threads));

        let err = f.service.initiate(Platform::Tiktok, None).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized));
        assert_eq!(f.states.len(), 0);
    }

    #[tokio::test]
    async fn test_facebook_page_token_exchange_failure_writes_nothing() {
        let server = MockServer::start().await;
        mount_facebook(
            &server,
            json!({"data": [{"id": "77", "name": "My Page", "access_token": "pagetok"}]}),
        )
        .await;
        Mock::given(method("GET"))
            .and(path("/fb/oauth/access_token"))
            .and(query_param("fb_exchange_token", "pagetok"))
            .respond_with(ResponseTemplate::new(400).set_body_string("expired page token"))
            .mount(&server)
            .await;

        let f = fixture(&server);
        let outcome = f
            .service
            .handle_callback(&user(), Platform::Facebook, callback("fb-code"))
            .await;

        let CallbackOutcome::Failed(failure) = outcome else {
            panic!("expected failure");
        };
        assert_eq!(failure.code, "long_lived_token");
        assert_eq!(failure.detail.as_deref(), Some("expired page token"));
        assert_eq!(f.connections.count(), 0);
    }

    #[tokio::test]
    async fn test_token_exchange_timeout_is_stage_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ig/oauth/access_token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"access_token": "short", "user_id": "ig-1"}))
                    .set_delay(std::time::Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(200))
            .build()
            .unwrap();
        let f = fixture_with_client(&server, client);
        let outcome = f
            .service
            .handle_callback(&user(), Platform::Instagram, callback("ig-code"))
            .await;

        let CallbackOutcome::Failed(failure) = outcome else {
            panic!("expected failure");
        };
        assert_eq!(failure.code, "token_exchange");
        assert_eq!(f.connections.count(), 0);
    }

    #[tokio::test]
    async fn test_user_info_timeout_is_stage_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/fb/oauth/access_token"))
            .and(query_param("code", "fb-code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "short"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/fb/me"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"id": "u1", "name": "U"}))
                    .set_delay(std::time::Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(200))
            .build()
            .unwrap();
        let f = fixture_with_client(&server, client);
        let outcome = f
            .service
            .handle_callback(&user(), Platform::Facebook, callback("fb-code"))
            .await;

        let CallbackOutcome::Failed(failure) = outcome else {
            panic!("expected failure");
        };
        assert_eq!(failure.code, "user_info");
        assert_eq!(f.connections.count(), 0);
    }

    #[tokio::test]
    async fn test_tiktok_missing_state_skips_token_exchange() {
        let server = MockServer::start().await;
        let f = fixture(&server);

        let outcome = f
            .service
            .handle_callback(&user(), Platform::Tiktok, callback("tt-code"))
            .await;
        assert!(matches!(
            outcome,
            CallbackOutcome::Failed(CallbackFailure { code: "invalid_state", .. })
        ));
        assert!(server.received_requests().await.unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn test_repository_failure_is_server_error() {
        let server = MockServer::start().await;
        mount_facebook(
            &server,
            json!({"data": [{"id": "77", "name": "My Page", "access_token": "pagetok"}]}),
        )
        .await;
        Mock::given(method("GET"))
            .and(path("/fb/oauth/access_token"))
            .and(query_param("fb_exchange_token", "pagetok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "long"})))
            .mount(&server)
            .await;

        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(FacebookAdapter::with_endpoints(
            credentials(Platform::Facebook),
            reqwest::Client::new(),
            FacebookEndpoints {
                authorize_url: format!("{}/dialog/oauth", server.uri()),
                graph_base_url: format!("{}/fb", server.uri()),
            },
        )));
        let service = ConnectionService::new(
            Arc::new(registry),
            Arc::new(FailingConnectionStore),
            Arc::new(MemoryOAuthStateStore::default()),
            test_cipher(),
            Duration::minutes(10),
        );

        let outcome = service
            .handle_callback(&user(), Platform::Facebook, callback("fb-code"))
            .await;
        let CallbackOutcome::Failed(failure) = outcome else {
            panic!("expected failure");
        };
        assert!(failure.is_server_error());
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let server = MockServer::start().await;
        let f = fixture(&server);
        let user = user();

        assert!(!f.service.disconnect(user.id, Platform::Tiktok).await.unwrap());
        assert_eq!(f.connections.count(), 0);
    }
}
