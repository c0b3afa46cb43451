use async_trait::async_trait;
use reqwest::Url;

use super::{
    PlatformCredentials, ProviderAdapter, ProviderError, ProviderIdentity, Stage, TokenGrant,
    authorize_url, fetch_json, form_body, id_field, placeholder_avatar, request_url,
    require_access_token, text_field,
};
use crate::models::Platform;

const SCOPES: [&str; 5] = [
    "threads_basic",
    "threads_content_publish",
    "threads_manage_insights",
    "threads_manage_replies",
    "threads_read_replies",
];

const PROFILE_FIELDS: &str = "id,username,name,threads_profile_picture_url,threads_biography";

#[derive(Debug, Clone)]
pub struct ThreadsEndpoints {
    pub authorize_url: String,
    pub graph_base_url: String,
}

impl Default for ThreadsEndpoints {
    fn default() -> Self {
        Self {
            authorize_url: "https://www.threads.net/oauth/authorize".to_string(),
            graph_base_url: "https://graph.threads.net".to_string(),
        }
    }
}

/// Threads アカウント連携（短期トークンをそのまま保存）
pub struct ThreadsAdapter {
    credentials: PlatformCredentials,
    endpoints: ThreadsEndpoints,
    http_client: reqwest::Client,
}

impl ThreadsAdapter {
    pub fn new(credentials: PlatformCredentials, http_client: reqwest::Client) -> Self {
        Self::with_endpoints(credentials, http_client, ThreadsEndpoints::default())
    }

    pub fn with_endpoints(
        credentials: PlatformCredentials,
        http_client: reqwest::Client,
        endpoints: ThreadsEndpoints,
    ) -> Self {
        Self {
            credentials,
            endpoints,
            http_client,
        }
    }
}

#[async_trait]
impl ProviderAdapter for ThreadsAdapter {
    fn platform(&self) -> Platform {
        Platform::Threads
    }

    fn credentials(&self) -> &PlatformCredentials {
        &self.credentials
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
            .post(format!("{}/oauth/access_token", self.endpoints.graph_base_url))
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body);
        let response = fetch_json(Platform::Threads, Stage::TokenExchange, request).await?;

        Ok(TokenGrant {
            access_token: require_access_token(Platform::Threads, &response)?,
            platform_user_id: id_field(&response, "user_id"),
        })
    }

    async fn fetch_identity(
        &self,
        access_token: &str,
        grant: &TokenGrant,
    ) -> Result<ProviderIdentity, ProviderError> {
        let url = request_url(
            &format!("{}/v1.0/me", self.endpoints.graph_base_url),
            &[("fields", PROFILE_FIELDS), ("access_token", access_token)],
            Stage::UserInfo,
        )?;

        let profile =
            fetch_json(Platform::Threads, Stage::UserInfo, self.http_client.get(url)).await?;

        let platform_user_id = grant
            .platform_user_id
            .clone()
            .or_else(|| id_field(&profile, "id"))
            .ok_or_else(|| ProviderError::failed(Stage::UserInfo, profile.to_string()))?;

        let username = text_field(&profile, "username");
        let display_name = username.clone().unwrap_or_else(|| platform_user_id.clone());

        // プレースホルダーはプロフィール名を優先
        let avatar_url = text_field(&profile, "threads_profile_picture_url").unwrap_or_else(|| {
            let label = text_field(&profile, "name")
                .or(username)
                .unwrap_or_else(|| display_name.clone());
            placeholder_avatar(&label, Platform::Threads)
        });

        Ok(ProviderIdentity {
            platform_user_id,
            display_name,
            avatar_url,
            access_token: None,
        })
    }
}
