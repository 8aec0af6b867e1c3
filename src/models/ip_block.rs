use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// 一時的なIPブロック行
///
/// ブルートフォースガードが失敗閾値の超過時に作成する。
/// 有効期限はタイムスタンプ比較で自然失効する（明示削除は不要）。
#[derive(Debug, FromRow, Serialize)]
pub struct IpBlock {
    pub id: Uuid,
    pub address: String,
    pub reason: String,
    pub expires_at: OffsetDateTime,
    /// ブロックを発行した主体（自動ブロックは "brute_force_guard"）
    pub blocked_by: String,
    pub created_at: OffsetDateTime,
}
