use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use super::OAuthStateStore;
use crate::models::Platform;

#[derive(Clone)]
pub struct OAuthStateRepository {
    pool: PgPool,
}

impl OAuthStateRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OAuthStateStore for OAuthStateRepository {
    async fn create(
        &self,
        state: &str,
        platform: Platform,
        user_id: Uuid,
        expires_at: OffsetDateTime,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO oauth_states (state, platform, user_id, expires_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(state)
        .bind(platform.as_str())
        .bind(user_id)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// state を消費
    ///
    /// # Note
    /// DELETE ... RETURNING で検証と削除を同時に行うため、同じ state は一度しか通らない。
    /// 発行したユーザー以外のセッションからは消費できない
    async fn consume(
        &self,
        state: &str,
        platform: Platform,
        user_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let consumed: Option<String> = sqlx::query_scalar(
            r#"
            DELETE FROM oauth_states
            WHERE state = $1 AND platform = $2 AND user_id = $3 AND expires_at > NOW()
            RETURNING state
            "#,
        )
        .bind(state)
        .bind(platform.as_str())
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(consumed.is_some())
    }

    async fn delete_expired(&self) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            DELETE FROM oauth_states
            WHERE expires_at <= NOW()
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
