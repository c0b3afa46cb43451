use async_trait::async_trait;
use reqwest::Url;

use super::{
    PlatformCredentials, ProviderAdapter, ProviderError, ProviderIdentity, Stage, TokenGrant,
    authorize_url, fetch_json, form_body, id_field, placeholder_avatar, request_url,
    require_access_token, text_field,
};
use crate::models::Platform;

const SCOPE: &str = "user.info.basic,video.list";
const USER_FIELDS: &str = "open_id,avatar_url,display_name";

/// TikTok Login Kit v2 エンドポイント
#[derive(Debug, Clone)]
pub struct TikTokEndpoints {
    pub authorize_url: String,
    /// Open API v2 のベース URL
    pub api_base_url: String,
}

impl Default for TikTokEndpoints {
    fn default() -> Self {
        Self {
            authorize_url: "https://www.tiktok.com/v2/auth/authorize/".to_string(),
            api_base_url: "https://open.tiktokapis.com/v2".to_string(),
        }
    }
}

/// TikTok アカウント連携
///
/// # Security
/// - 認可リクエストごとに 16 バイトの state ノンスを発行し、コールバックで検証する
pub struct TikTokAdapter {
    credentials: PlatformCredentials,
    endpoints: TikTokEndpoints,
    http_client: reqwest::Client,
}

impl TikTokAdapter {
    pub fn new(credentials: PlatformCredentials, http_client: reqwest::Client) -> Self {
        Self::with_endpoints(credentials, http_client, TikTokEndpoints::default())
    }

    pub fn with_endpoints(
        credentials: PlatformCredentials,
        http_client: reqwest::Client,
        endpoints: TikTokEndpoints,
    ) -> Self {
        Self {
            credentials,
            endpoints,
            http_client,
        }
    }
}

#[async_trait]
impl ProviderAdapter for TikTokAdapter {
    fn platform(&self) -> Platform {
        Platform::Tiktok
    }

    fn credentials(&self) -> &PlatformCredentials {
        &self.credentials
    }

    fn requires_state(&self) -> bool {
        true
    }

    fn authorization_url(&self, state: Option<&str>) -> Result<Url, ProviderError> {
        let state = state.ok_or(ProviderError::Configuration("state nonce is required"))?;
        authorize_url(
            &self.endpoints.authorize_url,
            &[
                ("client_key", self.credentials.client_id.as_str()),
                ("scope", SCOPE),
                ("response_type", "code"),
                ("redirect_uri", self.credentials.redirect_uri.as_str()),
                ("state", state),
            ],
        )
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, ProviderError> {
        let body = form_body(&[
            ("client_key", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret()?),
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", self.credentials.redirect_uri.as_str()),
        ]);

        let request = self
            .http_client
            .post(format!("{}/oauth/token/", self.endpoints.api_base_url))
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body);
        let response = fetch_json(Platform::Tiktok, Stage::TokenExchange, request).await?;

        Ok(TokenGrant {
            access_token: require_access_token(Platform::Tiktok, &response)?,
            platform_user_id: id_field(&response, "open_id"),
        })
    }

    async fn fetch_identity(
        &self,
        access_token: &str,
        grant: &TokenGrant,
    ) -> Result<ProviderIdentity, ProviderError> {
        let url = request_url(
            &format!("{}/user/info/", self.endpoints.api_base_url),
            &[("fields", USER_FIELDS)],
            Stage::UserInfo,
        )?;

        let response = fetch_json(
            Platform::Tiktok,
            Stage::UserInfo,
            self.http_client.get(url).bearer_auth(access_token),
        )
        .await?;

        let Some(user) = response.pointer("/data/user").filter(|u| u.is_object()) else {
            tracing::error!(body = %response, "TikTok ユーザー情報レスポンスに data.user がない");
            return Err(ProviderError::failed(Stage::UserInfo, response.to_string()));
        };

        let platform_user_id = grant
            .platform_user_id
            .clone()
            .or_else(|| id_field(user, "open_id"))
            .ok_or_else(|| ProviderError::failed(Stage::UserInfo, "open_id is missing"))?;

        let display_name = text_field(user, "display_name")
            .or_else(|| text_field(user, "username"))
            .unwrap_or_else(|| platform_user_id.clone());

        let avatar_url = text_field(user, "avatar_url")
            .unwrap_or_else(|| placeholder_avatar(&display_name, Platform::Tiktok));

        Ok(ProviderIdentity {
            platform_user_id,
            display_name,
            avatar_url,
            access_token: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn credentials() -> PlatformCredentials {
        PlatformCredentials {
            client_id: "tt-key".to_string(),
            client_secret: Some(Arc::new("tt-secret".to_string())),
            redirect_uri: "https://app.test/api/connections/tiktok".to_string(),
        }
    }

    fn adapter(server: &MockServer) -> TikTokAdapter {
        TikTokAdapter::with_endpoints(
            credentials(),
            reqwest::Client::new(),
            TikTokEndpoints {
                authorize_url: format!("{}/auth/authorize/", server.uri()),
                api_base_url: server.uri(),
            },
        )
    }

    #[test]
    fn test_authorization_url_carries_state() {
        let adapter = TikTokAdapter::new(credentials(), reqwest::Client::new());
        let url = adapter.authorization_url(Some("abc123")).unwrap();

        assert!(
            url.as_str()
                .starts_with("https://www.tiktok.com/v2/auth/authorize/?")
        );
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("client_key".to_string(), "tt-key".to_string())));
        assert!(pairs.contains(&("scope".to_string(), SCOPE.to_string())));
        assert!(pairs.contains(&("state".to_string(), "abc123".to_string())));
    }

    #[test]
    fn test_authorization_url_requires_state() {
        let adapter = TikTokAdapter::new(credentials(), reqwest::Client::new());
        assert!(adapter.requires_state());
        assert!(adapter.authorization_url(None).is_err());
    }

    #[tokio::test]
    async fn test_exchange_code_reads_open_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token/"))
            .and(body_string_contains("client_key=tt-key"))
            .and(body_string_contains("code=abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "act.1",
                "open_id": "oid-1",
                "refresh_token": "rft.1",
                "expires_in": 86400
            })))
            .mount(&server)
            .await;

        let grant = adapter(&server).exchange_code("abc").await.unwrap();
        assert_eq!(grant.access_token, "act.1");
        assert_eq!(grant.platform_user_id.as_deref(), Some("oid-1"));
    }

    #[tokio::test]
    async fn test_exchange_code_without_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "error": "invalid_grant",
                "error_description": "Authorization code is expired."
            })))
            .mount(&server)
            .await;

        let err = adapter(&server).exchange_code("abc").await.unwrap_err();
        assert_eq!(err.code(), "invalid_token");
        assert!(err.detail().is_some_and(|d| d.contains("invalid_grant")));
    }

    #[tokio::test]
    async fn test_fetch_identity_name_fallback() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user/info/"))
            .and(query_param("fields", USER_FIELDS))
            .and(header("authorization", "Bearer act.1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"user": {"open_id": "oid-1", "display_name": ""}},
                "error": {"code": "ok"}
            })))
            .mount(&server)
            .await;

        let grant = TokenGrant {
            access_token: "act.1".to_string(),
            platform_user_id: Some("oid-1".to_string()),
        };
        let identity = adapter(&server)
            .fetch_identity("act.1", &grant)
            .await
            .unwrap();

        assert_eq!(identity.platform_user_id, "oid-1");
        assert_eq!(identity.display_name, "oid-1");
        assert_eq!(
            identity.avatar_url,
            "https://ui-avatars.com/api/?name=oid-1&size=150&background=000000&color=fff"
        );
    }

    #[tokio::test]
    async fn test_fetch_identity_without_user() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user/info/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {}})))
            .mount(&server)
            .await;

        let grant = TokenGrant {
            access_token: "act.1".to_string(),
            platform_user_id: Some("oid-1".to_string()),
        };
        let err = adapter(&server)
            .fetch_identity("act.1", &grant)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "user_info");
    }
}
