use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::ConnectionStore;
use crate::models::{ConnectionFields, Platform, SocialConnection};

#[derive(Clone)]
pub struct SocialConnectionRepository {
    pool: PgPool,
}

impl SocialConnectionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConnectionStore for SocialConnectionRepository {
    async fn find_by_user_and_platform(
        &self,
        user_id: Uuid,
        platform: Platform,
    ) -> Result<Option<SocialConnection>, sqlx::Error> {
        sqlx::query_as::<_, SocialConnection>(
            r#"
            SELECT id, user_id, platform, access_token_encrypted, platform_user_id,
                   platform_user_name, platform_user_avatar, created_at, updated_at
            FROM social_connections
            WHERE user_id = $1 AND platform = $2
            "#,
        )
        .bind(user_id)
        .bind(platform.as_str())
        .fetch_optional(&self.pool)
        .await
    }

    /// 連携情報を upsert
    ///
    /// # Note
    /// 単一の INSERT ... ON CONFLICT 文で実行するため、同一 (user_id, platform) への
    /// 同時コールバックでも行は1件のまま（最後の書き込みが全フィールドを置き換える）
    async fn upsert(
        &self,
        user_id: Uuid,
        platform: Platform,
        fields: ConnectionFields,
    ) -> Result<SocialConnection, sqlx::Error> {
        sqlx::query_as::<_, SocialConnection>(
            r#"
            INSERT INTO social_connections
                (user_id, platform, access_token_encrypted, platform_user_id,
                 platform_user_name, platform_user_avatar)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT ON CONSTRAINT social_connections_user_platform_key
            DO UPDATE SET
                access_token_encrypted = EXCLUDED.access_token_encrypted,
                platform_user_id = EXCLUDED.platform_user_id,
                platform_user_name = EXCLUDED.platform_user_name,
                platform_user_avatar = EXCLUDED.platform_user_avatar,
                updated_at = NOW()
            RETURNING id, user_id, platform, access_token_encrypted, platform_user_id,
                      platform_user_name, platform_user_avatar, created_at, updated_at
            "#,
        )
        .bind(user_id)
        .bind(platform.as_str())
        .bind(&fields.access_token_encrypted)
        .bind(&fields.platform_user_id)
        .bind(&fields.platform_user_name)
        .bind(&fields.platform_user_avatar)
        .fetch_one(&self.pool)
        .await
    }

    async fn delete_by_user_and_platform(
        &self,
        user_id: Uuid,
        platform: Platform,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            DELETE FROM social_connections
            WHERE user_id = $1 AND platform = $2
            "#,
        )
        .bind(user_id)
        .bind(platform.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<SocialConnection>, sqlx::Error> {
        sqlx::query_as::<_, SocialConnection>(
            r#"
            SELECT id, user_id, platform, access_token_encrypted, platform_user_id,
                   platform_user_name, platform_user_avatar, created_at, updated_at
            FROM social_connections
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }
}
