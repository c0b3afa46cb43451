use sqlx::FromRow;
use uuid::Uuid;

/// セッションから解決された認証済みユーザー
///
/// 認証の仕組み自体は外部に委ねており、ここでは ID とメールアドレスのみ参照する
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
}
