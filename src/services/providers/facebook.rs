use async_trait::async_trait;
use reqwest::Url;
use serde_json::Value;

use super::{
    LongLivedExchange, PlatformCredentials, ProviderAdapter, ProviderError, ProviderIdentity,
    Stage, TokenGrant, authorize_url, fetch_json, id_field, placeholder_avatar, request_url,
    require_access_token, text_field,
};
use crate::models::Platform;

const SCOPES: [&str; 7] = [
    "pages_show_list",
    "pages_read_engagement",
    "pages_manage_metadata",
    "pages_manage_posts",
    "pages_manage_engagement",
    "pages_messaging",
    "public_profile",
];

/// 認可リクエストに付与する固定 state（検証はしない）
pub const FACEBOOK_STATE: &str = "facebook_page_connection";

/// Facebook Graph API エンドポイント
#[derive(Debug, Clone)]
pub struct FacebookEndpoints {
    pub authorize_url: String,
    /// バージョン付きの Graph API ベース URL
    pub graph_base_url: String,
}

impl Default for FacebookEndpoints {
    fn default() -> Self {
        Self {
            authorize_url: "https://www.facebook.com/v18.0/dialog/oauth".to_string(),
            graph_base_url: "https://graph.facebook.com/v18.0".to_string(),
        }
    }
}

/// Facebook ページ連携
///
/// ユーザートークンで管理ページ一覧を取得し、先頭ページのページトークンを
/// 長期トークンに交換して保存する
pub struct FacebookAdapter {
    credentials: PlatformCredentials,
    endpoints: FacebookEndpoints,
    http_client: reqwest::Client,
}

impl FacebookAdapter {
    pub fn new(credentials: PlatformCredentials, http_client: reqwest::Client) -> Self {
        Self::with_endpoints(credentials, http_client, FacebookEndpoints::default())
    }

    pub fn with_endpoints(
        credentials: PlatformCredentials,
        http_client: reqwest::Client,
        endpoints: FacebookEndpoints,
    ) -> Self {
        Self {
            credentials,
            endpoints,
            http_client,
        }
    }

    fn token_url(&self) -> String {
        format!("{}/oauth/access_token", self.endpoints.graph_base_url)
    }

    async fn graph_get(
        &self,
        path: &str,
        fields: &str,
        access_token: &str,
        stage: Stage,
    ) -> Result<Value, ProviderError> {
        let url = request_url(
            &format!("{}{}", self.endpoints.graph_base_url, path),
            &[("fields", fields), ("access_token", access_token)],
            stage,
        )?;
        fetch_json(Platform::Facebook, stage, self.http_client.get(url)).await
    }
}

#[async_trait]
impl ProviderAdapter for FacebookAdapter {
    fn platform(&self) -> Platform {
        Platform::Facebook
    }

    fn credentials(&self) -> &PlatformCredentials {
        &self.credentials
    }

    fn long_lived_exchange(&self) -> LongLivedExchange {
        LongLivedExchange::AfterIdentity
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
                ("state", FACEBOOK_STATE),
            ],
        )
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, ProviderError> {
        let url = request_url(
            &self.token_url(),
            &[
                ("client_id", self.credentials.client_id.as_str()),
                ("redirect_uri", self.credentials.redirect_uri.as_str()),
                ("client_secret", self.credentials.client_secret()?),
                ("code", code),
            ],
            Stage::TokenExchange,
        )?;

        let response = fetch_json(
            Platform::Facebook,
            Stage::TokenExchange,
            self.http_client.get(url),
        )
        .await?;

        Ok(TokenGrant {
            access_token: require_access_token(Platform::Facebook, &response)?,
            platform_user_id: None,
        })
    }

    async fn exchange_long_lived_token(&self, token: &str) -> Result<String, ProviderError> {
        let url = request_url(
            &self.token_url(),
            &[
                ("grant_type", "fb_exchange_token"),
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret()?),
                ("fb_exchange_token", token),
            ],
            Stage::LongLivedToken,
        )?;

        let response = fetch_json(
            Platform::Facebook,
            Stage::LongLivedToken,
            self.http_client.get(url),
        )
        .await?;

        text_field(&response, "access_token").ok_or_else(|| {
            tracing::error!("長期ページトークンレスポンスに access_token がない");
            ProviderError::failed(Stage::LongLivedToken, response.to_string())
        })
    }

    async fn fetch_identity(
        &self,
        access_token: &str,
        _grant: &TokenGrant,
    ) -> Result<ProviderIdentity, ProviderError> {
        // ユーザートークンが有効であることの確認
        let profile = self
            .graph_get("/me", "id,name,picture", access_token, Stage::UserInfo)
            .await?;
        tracing::debug!(
            facebook_user_id = ?id_field(&profile, "id"),
            "Facebook ユーザー情報取得成功"
        );

        let pages = self
            .graph_get(
                "/me/accounts",
                "id,name,picture,access_token",
                access_token,
                Stage::PagesInfo,
            )
            .await?;

        let page_count = pages
            .get("data")
            .and_then(Value::as_array)
            .map_or(0, Vec::len);

        // 複数ページを管理していても先頭ページのみ連携する
        let Some(page) = pages
            .get("data")
            .and_then(Value::as_array)
            .and_then(|data| data.first())
        else {
            tracing::warn!("管理しているFacebookページがない");
            return Err(ProviderError::NoPages);
        };

        if page_count > 1 {
            tracing::info!(page_count, "複数ページのうち先頭ページを連携");
        }

        let page_id = id_field(page, "id")
            .ok_or_else(|| ProviderError::failed(Stage::PagesInfo, "page id is missing"))?;
        let page_token = text_field(page, "access_token")
            .ok_or_else(|| ProviderError::failed(Stage::PagesInfo, "page access_token is missing"))?;
        let display_name = text_field(page, "name").unwrap_or_else(|| page_id.clone());

        let avatar_url = page
            .pointer("/picture/data/url")
            .and_then(Value::as_str)
            .filter(|url| !url.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| placeholder_avatar(&display_name, Platform::Facebook));

        Ok(ProviderIdentity {
            platform_user_id: page_id,
            display_name,
            avatar_url,
            access_token: Some(page_token),
        })
    }
}
