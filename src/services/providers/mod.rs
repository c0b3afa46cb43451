//! ソーシャルプラットフォームごとの OAuth アダプター
//!
//! 各プラットフォームは認可 URL・トークン交換・長期トークン交換・アカウント情報取得の
//! 方言が異なる。[`ProviderAdapter`] でその差異を吸収し、連携サービス側は
//! プラットフォームに依存しない処理だけを持つ。
//!
//! # Security
//! - client_secret・アクセストークンはログに出力しない
//! - プロバイダーのエラーレスポンス本文はログにのみ残し、ブラウザには分類コードだけ返す

pub mod facebook;
pub mod instagram;
pub mod threads;
pub mod tiktok;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use data_encoding::HEXLOWER;
use rand::RngCore;
use reqwest::Url;
use serde_json::Value;

use crate::config::Config;
use crate::models::Platform;

pub use facebook::FacebookAdapter;
pub use instagram::InstagramAdapter;
pub use threads::ThreadsAdapter;
pub use tiktok::TikTokAdapter;

/// プラットフォームのアプリ認証情報
#[derive(Clone)]
pub struct PlatformCredentials {
    /// App ID / Client Key
    pub client_id: String,
    /// クライアントシークレット（機密情報 - ログ出力禁止）
    pub client_secret: Option<Arc<String>>,
    pub redirect_uri: String,
}

impl PlatformCredentials {
    /// コールバック処理に必須のシークレットを取得
    pub fn client_secret(&self) -> Result<&str, ProviderError> {
        self.client_secret
            .as_deref()
            .map(String::as_str)
            .ok_or(ProviderError::Configuration("client secret is not configured"))
    }
}

/// 外部呼び出しの段階
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    TokenExchange,
    LongLivedToken,
    UserInfo,
    PagesInfo,
}

impl Stage {
    /// UI へ返す分類コード
    pub fn code(&self) -> &'static str {
        match self {
            Self::TokenExchange => "token_exchange",
            Self::LongLivedToken => "long_lived_token",
            Self::UserInfo => "user_info",
            Self::PagesInfo => "pages_info",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("プロバイダー設定が不足しています: {0}")]
    Configuration(&'static str),

    #[error("{stage} に失敗: {detail}")]
    Failed { stage: Stage, detail: String },

    #[error("トークンレスポンスに access_token がありません")]
    MissingAccessToken { body: String },

    #[error("管理しているページがありません")]
    NoPages,
}

impl ProviderError {
    pub fn failed(stage: Stage, detail: impl Into<String>) -> Self {
        Self::Failed {
            stage,
            detail: detail.into(),
        }
    }

    /// リダイレクトの error パラメータに載せる分類コード
    pub fn code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "config_error",
            Self::Failed { stage, .. } => stage.code(),
            Self::MissingAccessToken { .. } => "invalid_token",
            Self::NoPages => "no_pages",
        }
    }

    /// プロバイダーから返された生のエラー内容（デバッグ用）
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::Failed { detail, .. } => Some(detail),
            Self::MissingAccessToken { body } => Some(body),
            Self::Configuration(_) | Self::NoPages => None,
        }
    }
}

/// 長期トークン交換を行うタイミング
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LongLivedExchange {
    /// 交換しない（短期トークンをそのまま保存）
    Skip,
    /// アカウント情報取得の前に、認可コード交換で得たトークンを交換
    BeforeIdentity,
    /// アカウント情報取得の後に、アカウント情報が返したトークンを交換
    AfterIdentity,
}

/// 認可コード交換の結果
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: String,
    /// トークンレスポンスにユーザー ID が含まれる場合（Instagram / Threads / TikTok）
    pub platform_user_id: Option<String>,
}

/// 正規化済みの連携先アカウント情報
#[derive(Debug, Clone)]
pub struct ProviderIdentity {
    pub platform_user_id: String,
    pub display_name: String,
    /// プロバイダーが返さない場合はプレースホルダー URL
    pub avatar_url: String,
    /// 連携対象が別トークンを持つ場合（Facebook ページトークン）
    pub access_token: Option<String>,
}

/// プラットフォーム固有の OAuth 方言
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn platform(&self) -> Platform;

    fn credentials(&self) -> &PlatformCredentials;

    /// 認可リクエストごとに state ノンスを発行し、コールバックで検証するか
    fn requires_state(&self) -> bool {
        false
    }

    fn long_lived_exchange(&self) -> LongLivedExchange {
        LongLivedExchange::Skip
    }

    /// 認可 URL を生成
    fn authorization_url(&self, state: Option<&str>) -> Result<Url, ProviderError>;

    /// 認可コードをアクセストークンに交換
    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, ProviderError>;

    /// 長期トークンに交換（対応しないプラットフォームはそのまま返す）
    async fn exchange_long_lived_token(&self, token: &str) -> Result<String, ProviderError> {
        Ok(token.to_string())
    }

    /// 連携先アカウント情報を取得
    async fn fetch_identity(
        &self,
        access_token: &str,
        grant: &TokenGrant,
    ) -> Result<ProviderIdentity, ProviderError>;
}

/// 設定済みアダプターの一覧
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    adapters: HashMap<Platform, Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 設定からアダプターを構築
    ///
    /// App ID が未設定のプラットフォームは登録しない（起動は継続）
    pub fn from_config(config: &Config, http_client: &reqwest::Client) -> Self {
        let mut registry = Self::new();

        for platform in Platform::ALL {
            let Some(credentials) = config.credentials_for(platform) else {
                tracing::info!(platform = %platform, "連携未設定（スキップ）");
                continue;
            };

            if credentials.client_secret.is_none() {
                tracing::warn!(
                    platform = %platform,
                    "クライアントシークレット未設定（コールバックは config_error になる）"
                );
            }

            let client = http_client.clone();
            let adapter: Arc<dyn ProviderAdapter> = match platform {
                Platform::Instagram => Arc::new(InstagramAdapter::new(credentials, client)),
                Platform::Facebook => Arc::new(FacebookAdapter::new(credentials, client)),
                Platform::Tiktok => Arc::new(TikTokAdapter::new(credentials, client)),
                Platform::Threads => Arc::new(ThreadsAdapter::new(credentials, client)),
            };

            tracing::info!(platform = %platform, "連携アダプターを初期化");
            registry.register(adapter);
        }

        registry
    }

    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.insert(adapter.platform(), adapter);
    }

    pub fn get(&self, platform: Platform) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(&platform).cloned()
    }
}

/// 16 バイトのランダム state ノンスを生成し、16 進文字列で返す
pub fn generate_state() -> String {
    let mut bytes = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    HEXLOWER.encode(&bytes)
}

/// ui-avatars.com のプレースホルダー URL を生成
pub fn placeholder_avatar(name: &str, platform: Platform) -> String {
    format!(
        "https://ui-avatars.com/api/?name={}&size=150&background={}&color=fff",
        urlencoding::encode(name),
        platform.avatar_background()
    )
}

/// 認可 URL を生成（パラメータは URL エンコードされる）
pub(crate) fn authorize_url(base: &str, params: &[(&str, &str)]) -> Result<Url, ProviderError> {
    Url::parse_with_params(base, params).map_err(|e| {
        tracing::error!(error = ?e, base = %base, "認可URL生成エラー");
        ProviderError::Configuration("invalid authorization endpoint")
    })
}

/// API リクエスト URL を生成
pub(crate) fn request_url(
    base: &str,
    params: &[(&str, &str)],
    stage: Stage,
) -> Result<Url, ProviderError> {
    Url::parse_with_params(base, params).map_err(|e| {
        tracing::error!(error = ?e, base = %base, stage = %stage, "リクエストURL生成エラー");
        ProviderError::failed(stage, "invalid endpoint url")
    })
}

/// application/x-www-form-urlencoded 形式の body を構築
pub(crate) fn form_body(params: &[(&str, &str)]) -> String {
    params
        .iter()
        .map(|(key, value)| {
            format!(
                "{}={}",
                urlencoding::encode(key),
                urlencoding::encode(value)
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// リクエストを送信し、成功レスポンスを JSON として返す
///
/// 通信エラー・タイムアウト・非 2xx・JSON でない本文はすべて `stage` の失敗として扱う
pub(crate) async fn fetch_json(
    platform: Platform,
    stage: Stage,
    request: reqwest::RequestBuilder,
) -> Result<Value, ProviderError> {
    let response = request.send().await.map_err(|e| {
        tracing::error!(
            platform = %platform,
            stage = %stage,
            timeout = e.is_timeout(),
            error = %e,
            "プロバイダー通信エラー"
        );
        ProviderError::failed(stage, e.to_string())
    })?;

    let status = response.status();
    let body = response.text().await.map_err(|e| {
        tracing::error!(platform = %platform, stage = %stage, error = %e, "レスポンス読み取りエラー");
        ProviderError::failed(stage, e.to_string())
    })?;

    if !status.is_success() {
        tracing::error!(
            platform = %platform,
            stage = %stage,
            status = %status,
            body = %body,
            "プロバイダーがエラーを返却"
        );
        return Err(ProviderError::failed(stage, body));
    }

    serde_json::from_str(&body).map_err(|e| {
        tracing::error!(platform = %platform, stage = %stage, error = %e, "レスポンスのパースエラー");
        ProviderError::failed(stage, format!("invalid json: {}", e))
    })
}

/// トークンレスポンスから access_token を取り出す
pub(crate) fn require_access_token(
    platform: Platform,
    body: &Value,
) -> Result<String, ProviderError> {
    match body.get("access_token").and_then(Value::as_str) {
        Some(token) if !token.is_empty() => Ok(token.to_string()),
        _ => {
            tracing::error!(
                platform = %platform,
                keys = ?body.as_object().map(|o| o.keys().cloned().collect::<Vec<_>>()),
                "トークンレスポンスに access_token がない"
            );
            Err(ProviderError::MissingAccessToken {
                body: body.to_string(),
            })
        }
    }
}

/// 文字列または数値の ID を文字列として取り出す
pub(crate) fn id_field(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// 空文字でない文字列フィールドを取り出す
pub(crate) fn text_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
}
