use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use super::Platform;

/// ユーザーとプラットフォームアカウントの紐付け
///
/// (user_id, platform) ごとに最大1件。再認可時は上書きされる。
#[derive(Debug, Clone, FromRow)]
pub struct SocialConnection {
    pub id: Uuid,
    pub user_id: Uuid,
    pub platform: String,
    /// AES-256-GCM で暗号化されたアクセストークン（クライアントへ返却禁止）
    pub access_token_encrypted: Vec<u8>,
    pub platform_user_id: String,
    pub platform_user_name: Option<String>,
    pub platform_user_avatar: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl SocialConnection {
    /// 保存されているプラットフォーム名を列挙型に変換
    pub fn platform(&self) -> Option<Platform> {
        self.platform.parse().ok()
    }
}

/// upsert 時に丸ごと置き換えるフィールド群
#[derive(Debug, Clone)]
pub struct ConnectionFields {
    pub access_token_encrypted: Vec<u8>,
    pub platform_user_id: String,
    pub platform_user_name: String,
    pub platform_user_avatar: String,
}
