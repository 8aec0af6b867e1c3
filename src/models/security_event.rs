use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// セキュリティイベント種別（閉じた列挙）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    LoginFailure,
    IpBlocked,
    SuspiciousActivity,
    PasswordChange,
    AccountLocked,
    InvalidCode,
    FactorEnrolled,
    FactorReset,
    ForbiddenAction,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LoginFailure => "login_failure",
            Self::IpBlocked => "ip_blocked",
            Self::SuspiciousActivity => "suspicious_activity",
            Self::PasswordChange => "password_change",
            Self::AccountLocked => "account_locked",
            Self::InvalidCode => "invalid_code",
            Self::FactorEnrolled => "factor_enrolled",
            Self::FactorReset => "factor_reset",
            Self::ForbiddenAction => "forbidden_action",
        }
    }
}

/// イベント深刻度
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// 監査ログ行（追記専用 - このサブシステムは更新・削除しない）
#[derive(Debug, FromRow, Serialize)]
pub struct SecurityEvent {
    pub id: Uuid,
    /// 匿名・認証前イベントでは None
    pub principal_id: Option<Uuid>,
    pub event_type: String,
    pub severity: String,
    pub details: serde_json::Value,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: OffsetDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        // アラート閾値判定は Ord に依存する
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::Low < Severity::Medium);
    }

    #[test]
    fn test_event_type_as_str() {
        assert_eq!(EventType::IpBlocked.as_str(), "ip_blocked");
        assert_eq!(EventType::SuspiciousActivity.as_str(), "suspicious_activity");
        assert_eq!(EventType::PasswordChange.as_str(), "password_change");
    }
}
