use async_trait::async_trait;
use reqwest::Url;
use serde_json::Value;

use super::{
    LongLivedExchange, PlatformCredentials, ProviderAdapter, ProviderError, ProviderIdentity,
    Stage, TokenGrant, authorize_url, fetch_json, form_body, id_field, placeholder_avatar,
    request_url, require_access_token, text_field,
};
use crate::models::Platform;

const SCOPES: [&str; 4] = [
    "instagram_business_basic",
    "instagram_business_content_publish",
    "instagram_business_manage_messages",
    "instagram_business_manage_comments",
];

const PROFILE_FIELDS: &str = "id,username,account_type,profile_picture_url";

/// Instagram API エンドポイント
#[derive(Debug, Clone)]
pub struct InstagramEndpoints {
    pub authorize_url: String,
    pub token_url: String,
    /// 長期トークン交換とプロフィール取得のベース URL
    pub graph_base_url: String,
}

impl Default for InstagramEndpoints {
    fn default() -> Self {
        Self {
            authorize_url: "https://api.instagram.com/oauth/authorize".to_string(),
            token_url: "https://api.instagram.com/oauth/access_token".to_string(),
            graph_base_url: "https://graph.instagram.com".to_string(),
        }
    }
}

/// Instagram ビジネスアカウント連携
///
/// 短期トークンを長期トークンに交換してからプロフィールを取得する
pub struct InstagramAdapter {
    credentials: PlatformCredentials,
    endpoints: InstagramEndpoints,
    http_client: reqwest::Client,
}

impl InstagramAdapter {
    pub fn new(credentials: PlatformCredentials, http_client: reqwest::Client) -> Self {
        Self::with_endpoints(credentials, http_client, InstagramEndpoints::default())
    }

    pub fn with_endpoints(
        credentials: PlatformCredentials,
        http_client: reqwest::Client,
        endpoints: InstagramEndpoints,
    ) -> Self {
        Self {
            credentials,
            endpoints,
            http_client,
        }
    }
}

#[async_trait]
impl ProviderAdapter for InstagramAdapter {
    fn platform(&self) -> Platform {
        Platform::Instagram
    }

    fn credentials(&self) -> &PlatformCredentials {
        &self.credentials
    }

    fn long_lived_exchange(&self) -> LongLivedExchange {
        LongLivedExchange::BeforeIdentity
    }

    fn authorization_url(&self, _state: Option<&str>) -> Result<Url, ProviderError> {
        let scope = SCOPES.join(",");
        authorize_url(
            &self.endpoints.authorize_url,
            &[
                ("client_id", self.credentials.client_id.as_str()),
                ("redirect_uri", self.credentials.redirect_uri.as_str()),
                ("scope", scope.as_str()),
                ("response_type", "code"),
            ],
        )
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, ProviderError> {
        let body = form_body(&[
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret()?),
            ("grant_type", "authorization_code"),
            ("redirect_uri", self.credentials.redirect_uri.as_str()),
            ("code", code),
        ]);

        let request = self
            .http_client
            .post(&self.endpoints.token_url)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body);
        let response = fetch_json(Platform::Instagram, Stage::TokenExchange, request).await?;

        Ok(TokenGrant {
            access_token: require_access_token(Platform::Instagram, &response)?,
            platform_user_id: id_field(&response, "user_id"),
        })
    }

    async fn exchange_long_lived_token(&self, token: &str) -> Result<String, ProviderError> {
        let url = request_url(
            &format!("{}/access_token", self.endpoints.graph_base_url),
            &[
                ("grant_type", "ig_exchange_token"),
                ("client_secret", self.credentials.client_secret()?),
                ("access_token", token),
            ],
            Stage::LongLivedToken,
        )?;

        let response = fetch_json(
            Platform::Instagram,
            Stage::LongLivedToken,
            self.http_client.get(url),
        )
        .await?;

        text_field(&response, "access_token").ok_or_else(|| {
            tracing::error!("長期トークンレスポンスに access_token がない");
            ProviderError::failed(Stage::LongLivedToken, response.to_string())
        })
    }

    async fn fetch_identity(
        &self,
        access_token: &str,
        grant: &TokenGrant,
    ) -> Result<ProviderIdentity, ProviderError> {
        let url = request_url(
            &format!("{}/me", self.endpoints.graph_base_url),
            &[("fields", PROFILE_FIELDS), ("access_token", access_token)],
            Stage::UserInfo,
        )?;

        let profile: Value =
            fetch_json(Platform::Instagram, Stage::UserInfo, self.http_client.get(url)).await?;

        let platform_user_id = grant
            .platform_user_id
            .clone()
            .or_else(|| id_field(&profile, "id"))
            .ok_or_else(|| ProviderError::failed(Stage::UserInfo, profile.to_string()))?;

        let display_name =
            text_field(&profile, "username").unwrap_or_else(|| platform_user_id.clone());

        let avatar_url = text_field(&profile, "profile_picture_url")
            .unwrap_or_else(|| placeholder_avatar(&display_name, Platform::Instagram));

        Ok(ProviderIdentity {
            platform_user_id,
            display_name,
            avatar_url,
            access_token: None,
        })
    }
}
