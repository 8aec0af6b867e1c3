use std::sync::Arc;

use uuid::Uuid;

use crate::config::Config;
use crate::error::AppError;
use crate::models::{EventType, Severity};
use crate::repositories::SecurityEventStore;
use crate::services::AlertService;

/// アラートを発報する深刻度の下限
const ALERT_THRESHOLD: Severity = Severity::High;

/// 監査ログサービス
///
/// 追記専用のイベントログへの書き込みと、
/// 閾値以上の深刻度に対するアラート発報（ファンアウト）を担う。
#[derive(Clone)]
pub struct AuditService {
    event_store: Arc<dyn SecurityEventStore>,
    alert_service: AlertService,
    config: Arc<Config>,
}

/// この深刻度でアラートを発報すべきか
pub fn should_alert(severity: Severity) -> bool {
    severity >= ALERT_THRESHOLD
}

impl AuditService {
    /// 新しい AuditService を作成
    pub fn new(
        event_store: Arc<dyn SecurityEventStore>,
        alert_service: AlertService,
        config: Arc<Config>,
    ) -> Self {
        Self {
            event_store,
            alert_service,
            config,
        }
    }

    /// イベントを追記し、閾値以上ならアラートを発報
    ///
    /// 追記の失敗はエラーとして返すが、アラート配送の失敗は
    /// ログに残すだけで成功扱いにする（fire-and-forget）。
    pub async fn record(
        &self,
        principal_id: Option<Uuid>,
        event_type: EventType,
        severity: Severity,
        details: serde_json::Value,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<(), AppError> {
        self.event_store
            .append(
                principal_id,
                event_type,
                severity,
                details.clone(),
                ip_address,
                user_agent,
            )
            .await?;

        if should_alert(severity) {
            if let Some(destination) = &self.config.security_alert_to {
                let delivered = self
                    .alert_service
                    .send_alert(event_type, severity, destination, &details)
                    .await;
                if !delivered {
                    tracing::warn!(
                        event_type = event_type.as_str(),
                        "アラート配送に失敗（操作は継続）"
                    );
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_threshold() {
        assert!(!should_alert(Severity::Low));
        assert!(!should_alert(Severity::Medium));
        assert!(should_alert(Severity::High));
        assert!(should_alert(Severity::Critical));
    }
}
