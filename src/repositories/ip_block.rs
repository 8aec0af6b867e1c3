use sqlx::PgPool;
use time::OffsetDateTime;

use crate::models::IpBlock;

#[derive(Clone)]
pub struct IpBlockRepository {
    pool: PgPool,
}

impl IpBlockRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 有効（未失効）なブロックをIPアドレスで検索
    pub async fn find_active(&self, address: &str) -> Result<Option<IpBlock>, sqlx::Error> {
        sqlx::query_as::<_, IpBlock>(
            r#"
            SELECT id, address, reason, expires_at, blocked_by, created_at
            FROM ip_blocks
            WHERE address = $1 AND expires_at > NOW()
            ORDER BY expires_at DESC
            LIMIT 1
            "#,
        )
        .bind(address)
        .fetch_optional(&self.pool)
        .await
    }

    /// 新しいIPブロックを作成
    pub async fn create(
        &self,
        address: &str,
        reason: &str,
        expires_at: OffsetDateTime,
        blocked_by: &str,
    ) -> Result<IpBlock, sqlx::Error> {
        sqlx::query_as::<_, IpBlock>(
            r#"
            INSERT INTO ip_blocks (address, reason, expires_at, blocked_by)
            VALUES ($1, $2, $3, $4)
            RETURNING id, address, reason, expires_at, blocked_by, created_at
            "#,
        )
        .bind(address)
        .bind(reason)
        .bind(expires_at)
        .bind(blocked_by)
        .fetch_one(&self.pool)
        .await
    }

    /// 失効済みブロックの掃除（任意の定期処理から呼ばれる）
    pub async fn prune_expired(&self) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM ip_blocks WHERE expires_at <= NOW()")
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
