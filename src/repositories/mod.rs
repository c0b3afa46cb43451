pub mod oauth_state;
pub mod session;
pub mod social_connection;

#[cfg(test)]
pub(crate) mod memory;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::models::{ConnectionFields, Platform, SocialConnection, User};

pub use oauth_state::OAuthStateRepository;
pub use session::SessionRepository;
pub use social_connection::SocialConnectionRepository;

/// ソーシャル連携の永続化境界
///
/// 本番は [`SocialConnectionRepository`]（PostgreSQL）が実装する
#[async_trait]
pub trait ConnectionStore: Send + Sync {
    async fn find_by_user_and_platform(
        &self,
        user_id: Uuid,
        platform: Platform,
    ) -> Result<Option<SocialConnection>, sqlx::Error>;

    /// (user_id, platform) が存在すれば全フィールドを置き換え、なければ作成
    async fn upsert(
        &self,
        user_id: Uuid,
        platform: Platform,
        fields: ConnectionFields,
    ) -> Result<SocialConnection, sqlx::Error>;

    /// 削除した場合 true
    async fn delete_by_user_and_platform(
        &self,
        user_id: Uuid,
        platform: Platform,
    ) -> Result<bool, sqlx::Error>;

    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<SocialConnection>, sqlx::Error>;
}

/// 認可フロー中の state ノンス保存先
#[async_trait]
pub trait OAuthStateStore: Send + Sync {
    async fn create(
        &self,
        state: &str,
        platform: Platform,
        user_id: Uuid,
        expires_at: OffsetDateTime,
    ) -> Result<(), sqlx::Error>;

    /// 有効な state を消費する（同じユーザーが発行し期限内なら削除して true）
    async fn consume(
        &self,
        state: &str,
        platform: Platform,
        user_id: Uuid,
    ) -> Result<bool, sqlx::Error>;

    /// 期限切れ state を削除し、削除件数を返す
    async fn delete_expired(&self) -> Result<u64, sqlx::Error>;
}

/// セッショントークン（ハッシュ）からユーザーを解決する
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn find_user_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<User>, sqlx::Error>;
}
