use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{Platform, SocialConnection};
use crate::repositories::ConnectionStore;

/// 連携済みアカウントの表示用情報（トークンは含まない）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSummary {
    pub platform_user_id: String,
    pub platform_user_name: Option<String>,
    pub platform_user_avatar: Option<String>,
}

impl From<SocialConnection> for ConnectionSummary {
    fn from(connection: SocialConnection) -> Self {
        Self {
            platform_user_id: connection.platform_user_id,
            platform_user_name: connection.platform_user_name,
            platform_user_avatar: connection.platform_user_avatar,
        }
    }
}

/// 全プラットフォームの連携状態（未連携は null）
#[derive(Debug, Default, Serialize)]
pub struct ConnectionDirectory {
    pub instagram: Option<ConnectionSummary>,
    pub facebook: Option<ConnectionSummary>,
    pub tiktok: Option<ConnectionSummary>,
    pub threads: Option<ConnectionSummary>,
}

impl ConnectionDirectory {
    fn slot(&mut self, platform: Platform) -> &mut Option<ConnectionSummary> {
        match platform {
            Platform::Instagram => &mut self.instagram,
            Platform::Facebook => &mut self.facebook,
            Platform::Tiktok => &mut self.tiktok,
            Platform::Threads => &mut self.threads,
        }
    }
}

#[derive(Clone)]
pub struct DirectoryService {
    connections: Arc<dyn ConnectionStore>,
}

impl DirectoryService {
    pub fn new(connections: Arc<dyn ConnectionStore>) -> Self {
        Self { connections }
    }

    pub async fn list(&self, user_id: Uuid) -> Result<ConnectionDirectory, AppError> {
        let mut directory = ConnectionDirectory::default();

        for connection in self.connections.list_by_user(user_id).await? {
            let Some(platform) = connection.platform() else {
                tracing::warn!(platform = %connection.platform, "未知のプラットフォームの連携をスキップ");
                continue;
            };
            *directory.slot(platform) = Some(connection.into());
        }

        Ok(directory)
    }
}
