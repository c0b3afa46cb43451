//! テスト用のインメモリ実装

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use super::{ConnectionStore, OAuthStateStore, SessionStore};
use crate::models::{ConnectionFields, Platform, SocialConnection, User};

#[derive(Default)]
pub struct MemoryConnectionStore {
    rows: Mutex<HashMap<(Uuid, Platform), SocialConnection>>,
}

impl MemoryConnectionStore {
    pub fn count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn count_for(&self, user_id: Uuid, platform: Platform) -> usize {
        self.rows
            .lock()
            .unwrap()
            .values()
            .filter(|row| row.user_id == user_id && row.platform == platform.as_str())
            .count()
    }
}

#[async_trait]
impl ConnectionStore for MemoryConnectionStore {
    async fn find_by_user_and_platform(
        &self,
        user_id: Uuid,
        platform: Platform,
    ) -> Result<Option<SocialConnection>, sqlx::Error> {
        Ok(self.rows.lock().unwrap().get(&(user_id, platform)).cloned())
    }

    async fn upsert(
        &self,
        user_id: Uuid,
        platform: Platform,
        fields: ConnectionFields,
    ) -> Result<SocialConnection, sqlx::Error> {
        let now = OffsetDateTime::now_utc();
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .entry((user_id, platform))
            .and_modify(|row| {
                row.access_token_encrypted = fields.access_token_encrypted.clone();
                row.platform_user_id = fields.platform_user_id.clone();
                row.platform_user_name = Some(fields.platform_user_name.clone());
                row.platform_user_avatar = Some(fields.platform_user_avatar.clone());
                row.updated_at = now;
            })
            .or_insert_with(|| SocialConnection {
                id: Uuid::new_v4(),
                user_id,
                platform: platform.as_str().to_string(),
                access_token_encrypted: fields.access_token_encrypted.clone(),
                platform_user_id: fields.platform_user_id.clone(),
                platform_user_name: Some(fields.platform_user_name.clone()),
                platform_user_avatar: Some(fields.platform_user_avatar.clone()),
                created_at: now,
                updated_at: now,
            });
        Ok(row.clone())
    }

    async fn delete_by_user_and_platform(
        &self,
        user_id: Uuid,
        platform: Platform,
    ) -> Result<bool, sqlx::Error> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .remove(&(user_id, platform))
            .is_some())
    }

    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<SocialConnection>, sqlx::Error> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|row| row.user_id == user_id)
            .cloned()
            .collect())
    }
}

/// 常に失敗する永続化層（server_error 経路の検証用）
pub struct FailingConnectionStore;

#[async_trait]
impl ConnectionStore for FailingConnectionStore {
    async fn find_by_user_and_platform(
        &self,
        _user_id: Uuid,
        _platform: Platform,
    ) -> Result<Option<SocialConnection>, sqlx::Error> {
        Err(sqlx::Error::PoolTimedOut)
    }

    async fn upsert(
        &self,
        _user_id: Uuid,
        _platform: Platform,
        _fields: ConnectionFields,
    ) -> Result<SocialConnection, sqlx::Error> {
        Err(sqlx::Error::PoolTimedOut)
    }

    async fn delete_by_user_and_platform(
        &self,
        _user_id: Uuid,
        _platform: Platform,
    ) -> Result<bool, sqlx::Error> {
        Err(sqlx::Error::PoolTimedOut)
    }

    async fn list_by_user(&self, _user_id: Uuid) -> Result<Vec<SocialConnection>, sqlx::Error> {
        Err(sqlx::Error::PoolTimedOut)
    }
}

#[derive(Default)]
pub struct MemoryOAuthStateStore {
    states: Mutex<HashMap<String, (Platform, Uuid, OffsetDateTime)>>,
}

impl MemoryOAuthStateStore {
    pub fn contains(&self, state: &str) -> bool {
        self.states.lock().unwrap().contains_key(state)
    }

    pub fn len(&self) -> usize {
        self.states.lock().unwrap().len()
    }
}

#[async_trait]
impl OAuthStateStore for MemoryOAuthStateStore {
    async fn create(
        &self,
        state: &str,
        platform: Platform,
        user_id: Uuid,
        expires_at: OffsetDateTime,
    ) -> Result<(), sqlx::Error> {
        self.states
            .lock()
            .unwrap()
            .insert(state.to_string(), (platform, user_id, expires_at));
        Ok(())
    }

    async fn consume(
        &self,
        state: &str,
        platform: Platform,
        user_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let now = OffsetDateTime::now_utc();
        let mut states = self.states.lock().unwrap();
        let valid = matches!(
            states.get(state),
            Some((stored, owner, expires_at))
                if *stored == platform && *owner == user_id && *expires_at > now
        );
        if valid {
            states.remove(state);
        }
        Ok(valid)
    }

    async fn delete_expired(&self) -> Result<u64, sqlx::Error> {
        let now = OffsetDateTime::now_utc();
        let mut states = self.states.lock().unwrap();
        let before = states.len();
        states.retain(|_, (_, _, expires_at)| *expires_at > now);
        Ok((before - states.len()) as u64)
    }
}

#[derive(Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<String, User>>,
}

impl MemorySessionStore {
    pub fn insert(&self, token_hash: String, user: User) {
        self.sessions.lock().unwrap().insert(token_hash, user);
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn find_user_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<User>, sqlx::Error> {
        Ok(self.sessions.lock().unwrap().get(token_hash).cloned())
    }
}
