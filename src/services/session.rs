use std::sync::Arc;

use axum::http::{HeaderMap, header};
use sha2::{Digest, Sha256};

use crate::error::AppError;
use crate::models::User;
use crate::repositories::SessionStore;

/// 認証済みユーザーの解決
///
/// セッショントークンは Cookie または `Authorization: Bearer` で受け取り、
/// SHA-256 ハッシュでセッションストアと照合する
#[derive(Clone)]
pub struct SessionService {
    store: Arc<dyn SessionStore>,
    cookie_name: String,
}

impl SessionService {
    pub fn new(store: Arc<dyn SessionStore>, cookie_name: String) -> Self {
        Self { store, cookie_name }
    }

    /// リクエストヘッダーからユーザーを解決（見つからなければ Unauthorized）
    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<User, AppError> {
        let Some(token) = self.session_token(headers) else {
            tracing::debug!("セッショントークンなし");
            return Err(AppError::Unauthorized);
        };

        match self.store.find_user_by_token_hash(&hash_token(&token)).await? {
            Some(user) => Ok(user),
            None => {
                tracing::debug!("無効または期限切れのセッション");
                Err(AppError::Unauthorized)
            }
        }
    }

    fn session_token(&self, headers: &HeaderMap) -> Option<String> {
        let from_cookie = headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == self.cookie_name)
            .map(|(_, value)| value.trim().to_string());

        from_cookie
            .or_else(|| {
                headers
                    .get(header::AUTHORIZATION)
                    .and_then(|value| value.to_str().ok())
                    .and_then(|value| value.strip_prefix("Bearer "))
                    .map(|token| token.trim().to_string())
            })
            .filter(|token| !token.is_empty())
    }
}

/// トークンをSHA256でハッシュ化
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}
