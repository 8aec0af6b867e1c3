use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{LoginHistory, LoginStatus};

#[derive(Clone)]
pub struct LoginHistoryRepository {
    pool: PgPool,
}

impl LoginHistoryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// ログイン履歴行を追記
    pub async fn create(
        &self,
        principal_id: Option<Uuid>,
        email: Option<&str>,
        ip_address: &str,
        user_agent: Option<&str>,
        status: LoginStatus,
        device_fingerprint: &str,
    ) -> Result<LoginHistory, sqlx::Error> {
        sqlx::query_as::<_, LoginHistory>(
            r#"
            INSERT INTO login_history
                (principal_id, email, ip_address, user_agent, status, device_fingerprint)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, principal_id, email, ip_address, user_agent, status,
                      device_fingerprint, created_at
            "#,
        )
        .bind(principal_id)
        .bind(email)
        .bind(ip_address)
        .bind(user_agent)
        .bind(status)
        .bind(device_fingerprint)
        .fetch_one(&self.pool)
        .await
    }

    /// このプリンシパルがこのIPから成功ログインした履歴があるか
    pub async fn has_success_from_ip(
        &self,
        principal_id: Uuid,
        ip_address: &str,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM login_history
                WHERE principal_id = $1 AND ip_address = $2 AND status = 'success'
            )
            "#,
        )
        .bind(principal_id)
        .bind(ip_address)
        .fetch_one(&self.pool)
        .await
    }

    /// このプリンシパルに成功ログイン履歴が1件でもあるか（IPを問わない）
    pub async fn has_any_success(&self, principal_id: Uuid) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM login_history
                WHERE principal_id = $1 AND status = 'success'
            )
            "#,
        )
        .bind(principal_id)
        .fetch_one(&self.pool)
        .await
    }
}
