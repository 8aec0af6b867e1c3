use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// ログイン試行の結果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "login_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LoginStatus {
    Success,
    Failure,
}

/// ログイン履歴行（成功・失敗を問わず毎回追記）
#[derive(Debug, FromRow, Serialize)]
pub struct LoginHistory {
    pub id: Uuid,
    /// 認証前失敗では None
    pub principal_id: Option<Uuid>,
    pub email: Option<String>,
    pub ip_address: String,
    pub user_agent: Option<String>,
    pub status: LoginStatus,
    /// SHA-256(IP + User-Agent) の先頭16バイトをBase64化した端末識別子
    pub device_fingerprint: String,
    pub created_at: OffsetDateTime,
}
