use std::sync::Arc;

use secrecy::{ExposeSecret, SecretBox};
use serde::Deserialize;

use crate::models::Platform;
use crate::services::providers::PlatformCredentials;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub database_url: SecretBox<String>,
    /// 公開ベース URL（例: https://app.example.com）
    pub app_base_url: String,
    #[serde(default = "default_connections_ui_path")]
    pub connections_ui_path: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,

    /// AES-256暗号化キー（Base64エンコード、32バイト）
    pub encryption_key: SecretBox<String>,

    #[serde(default = "default_session_cookie_name")]
    pub session_cookie_name: String,
    /// 外部 API 呼び出し1回あたりのタイムアウト
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    #[serde(default = "default_oauth_state_ttl_secs")]
    pub oauth_state_ttl_secs: i64,
    /// デバッグ用: プロバイダーのエラー本文をリダイレクトの details に含める
    #[serde(default)]
    pub expose_provider_error_details: bool,

    // Instagram（オプション）
    #[serde(default)]
    pub instagram_app_id: Option<String>,
    pub instagram_app_secret: Option<SecretBox<String>>,
    #[serde(default)]
    pub instagram_redirect_uri: Option<String>,

    // Facebook（オプション）
    #[serde(default)]
    pub facebook_app_id: Option<String>,
    pub facebook_app_secret: Option<SecretBox<String>>,
    #[serde(default)]
    pub facebook_redirect_uri: Option<String>,

    // TikTok（オプション）
    #[serde(default)]
    pub tiktok_client_key: Option<String>,
    pub tiktok_client_secret: Option<SecretBox<String>>,
    #[serde(default)]
    pub tiktok_redirect_uri: Option<String>,

    // Threads（オプション）
    #[serde(default)]
    pub threads_app_id: Option<String>,
    pub threads_app_secret: Option<SecretBox<String>>,
    #[serde(default)]
    pub threads_redirect_uri: Option<String>,
}

const DEFAULT_CONNECTIONS_UI_PATH: &str = "/dashboard/connections";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_SESSION_COOKIE_NAME: &str = "session_token";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;
const DEFAULT_OAUTH_STATE_TTL_SECS: i64 = 600;

fn default_connections_ui_path() -> String {
    DEFAULT_CONNECTIONS_UI_PATH.to_string()
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_session_cookie_name() -> String {
    DEFAULT_SESSION_COOKIE_NAME.to_string()
}

fn default_http_timeout_secs() -> u64 {
    DEFAULT_HTTP_TIMEOUT_SECS
}

fn default_oauth_state_ttl_secs() -> i64 {
    DEFAULT_OAUTH_STATE_TTL_SECS
}

impl Config {
    pub fn load() -> Result<Self, envy::Error> {
        envy::from_env()
    }

    fn base_url(&self) -> &str {
        self.app_base_url.trim_end_matches('/')
    }

    /// 連携画面の絶対 URL
    pub fn connections_ui_url(&self) -> String {
        format!("{}{}", self.base_url(), self.connections_ui_path)
    }

    /// リダイレクト URI 未設定時の既定値
    pub fn default_redirect_uri(&self, platform: Platform) -> String {
        format!("{}/api/connections/{}", self.base_url(), platform.slug())
    }

    /// プラットフォームの認証情報
    ///
    /// App ID / Client Key が未設定なら None（未設定プラットフォーム）
    pub fn credentials_for(&self, platform: Platform) -> Option<PlatformCredentials> {
        let (client_id, client_secret, redirect_uri) = match platform {
            Platform::Instagram => (
                &self.instagram_app_id,
                &self.instagram_app_secret,
                &self.instagram_redirect_uri,
            ),
            Platform::Facebook => (
                &self.facebook_app_id,
                &self.facebook_app_secret,
                &self.facebook_redirect_uri,
            ),
            Platform::Tiktok => (
                &self.tiktok_client_key,
                &self.tiktok_client_secret,
                &self.tiktok_redirect_uri,
            ),
            Platform::Threads => (
                &self.threads_app_id,
                &self.threads_app_secret,
                &self.threads_redirect_uri,
            ),
        };

        let client_id = client_id.as_deref().filter(|id| !id.trim().is_empty())?;

        Some(PlatformCredentials {
            client_id: client_id.to_string(),
            client_secret: client_secret
                .as_ref()
                .map(|secret| secret.expose_secret())
                .filter(|secret| !secret.is_empty())
                .map(|secret| Arc::new(secret.clone())),
            redirect_uri: redirect_uri
                .clone()
                .filter(|uri| !uri.trim().is_empty())
                .unwrap_or_else(|| self.default_redirect_uri(platform)),
        })
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    use base64::{Engine as _, engine::general_purpose::STANDARD};

    Config {
        database_url: SecretBox::new(Box::new("postgres://localhost/test".to_string())),
        app_base_url: "https://app.test".to_string(),
        connections_ui_path: default_connections_ui_path(),
        host: default_host(),
        port: default_port(),
        encryption_key: SecretBox::new(Box::new(STANDARD.encode([7u8; 32]))),
        session_cookie_name: default_session_cookie_name(),
        http_timeout_secs: default_http_timeout_secs(),
        oauth_state_ttl_secs: default_oauth_state_ttl_secs(),
        expose_provider_error_details: false,
        instagram_app_id: None,
        instagram_app_secret: None,
        instagram_redirect_uri: None,
        facebook_app_id: None,
        facebook_app_secret: None,
        facebook_redirect_uri: None,
        tiktok_client_key: None,
        tiktok_client_secret: None,
        tiktok_redirect_uri: None,
        threads_app_id: None,
        threads_app_secret: None,
        threads_redirect_uri: None,
    }
}
