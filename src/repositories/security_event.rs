use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{EventType, SecurityEvent, Severity};

/// 監査ログストアのインターフェース
///
/// `security_events` は追記専用。UPDATE/DELETE 操作はこのサブシステムに
/// 存在しない。インメモリ実装でイベント発行を伴うポリシーをテストする。
#[async_trait]
pub trait SecurityEventStore: Send + Sync {
    /// セキュリティイベントを追記し、作成された行を返す
    async fn append(
        &self,
        principal_id: Option<Uuid>,
        event_type: EventType,
        severity: Severity,
        details: serde_json::Value,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<SecurityEvent, sqlx::Error>;
}

/// 監査ログリポジトリ（Postgres実装）
#[derive(Clone)]
pub struct SecurityEventRepository {
    pool: PgPool,
}

impl SecurityEventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SecurityEventStore for SecurityEventRepository {
    async fn append(
        &self,
        principal_id: Option<Uuid>,
        event_type: EventType,
        severity: Severity,
        details: serde_json::Value,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<SecurityEvent, sqlx::Error> {
        sqlx::query_as::<_, SecurityEvent>(
            r#"
            INSERT INTO security_events
                (principal_id, event_type, severity, details, ip_address, user_agent)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, principal_id, event_type, severity, details,
                      ip_address, user_agent, created_at
            "#,
        )
        .bind(principal_id)
        .bind(event_type.as_str())
        .bind(severity.as_str())
        .bind(details)
        .bind(ip_address)
        .bind(user_agent)
        .fetch_one(&self.pool)
        .await
    }
}
