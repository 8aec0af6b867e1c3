use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// プリンシパルのロール
///
/// user/role テーブル自体は周辺アプリケーション所有。
/// このサブシステムは「昇格済みか」の判定にのみ使用する。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::Type)]
#[sqlx(type_name = "principal_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Member,
    Provider,
    Admin,
}

impl Role {
    /// 昇格済みプリンシパルか（メールコード発行・ファクターリセットに必要）
    pub fn is_elevated(&self) -> bool {
        matches!(self, Self::Admin)
    }
}

/// 認証済み主体（周辺アプリ所有テーブルの読み取りビュー）
#[derive(Debug, FromRow, Serialize)]
pub struct Principal {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
    #[serde(skip)]
    pub password_hash: String,
    pub created_at: OffsetDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_admin_is_elevated() {
        assert!(Role::Admin.is_elevated());
        assert!(!Role::Member.is_elevated());
        assert!(!Role::Provider.is_elevated());
    }
}
