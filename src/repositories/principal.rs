use sqlx::PgPool;
use uuid::Uuid;

use crate::models::Principal;

const ALL_COLUMNS: &str = "id, email, role, password_hash, created_at";

/// プリンシパル（周辺アプリ所有テーブル）の読み取りビュー
///
/// このサブシステムが書き込むのはパスワード変更確定時の
/// `password_hash` のみ（トランザクション内）。
#[derive(Clone)]
pub struct PrincipalRepository {
    pool: PgPool,
}

impl PrincipalRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// ベアラートークンでプリンシパルを検索
    ///
    /// # Note
    /// トークンは SHA-256 ハッシュで保存・照合される（平文カラムなし）
    pub async fn find_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<Principal>, sqlx::Error> {
        sqlx::query_as::<_, Principal>(&format!(
            "SELECT {ALL_COLUMNS} FROM principals WHERE api_token_hash = $1"
        ))
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await
    }

    /// IDでプリンシパルを検索
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Principal>, sqlx::Error> {
        sqlx::query_as::<_, Principal>(&format!(
            "SELECT {ALL_COLUMNS} FROM principals WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    /// パスワードハッシュを更新（パスワード変更トランザクションに参加）
    ///
    /// # Note
    /// password_hash はログに出力しないこと
    pub async fn update_password<'e>(
        &self,
        executor: impl sqlx::PgExecutor<'e>,
        principal_id: Uuid,
        new_password_hash: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE principals
            SET password_hash = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(principal_id)
        .bind(new_password_hash)
        .execute(executor)
        .await?;

        Ok(())
    }
}
