use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// 二要素認証ファクターの状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::Type)]
#[sqlx(type_name = "factor_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum FactorStatus {
    Disabled,
    Pending,
    Enabled,
}

/// プリンシパル毎のセキュリティ設定行
///
/// TOTPシークレットは AES-256-GCM で暗号化されて保存される。
/// 平文シークレットは初回登録時の表示以降、呼び出し元へ返却禁止・ログ出力禁止。
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct SecuritySettings {
    pub principal_id: Uuid,
    #[serde(skip)]
    pub secret_encrypted: Option<Vec<u8>>,
    pub factor_status: FactorStatus,
    /// メール配送される短命の数値コード（6桁）
    #[serde(skip)]
    pub otp_code: Option<String>,
    pub otp_expires_at: Option<OffsetDateTime>,
    pub attempt_count: i32,
    pub locked_until: Option<OffsetDateTime>,
    pub last_successful_auth: Option<OffsetDateTime>,
    pub password_changed_at: Option<OffsetDateTime>,
    pub must_change_password: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl SecuritySettings {
    /// ロック中なら残り秒数を返す
    pub fn lock_remaining_secs(&self, now: OffsetDateTime) -> Option<i64> {
        self.locked_until.and_then(|until| {
            let remaining = (until - now).whole_seconds();
            (remaining > 0).then_some(remaining)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn settings(locked_until: Option<OffsetDateTime>) -> SecuritySettings {
        let now = OffsetDateTime::now_utc();
        SecuritySettings {
            principal_id: Uuid::new_v4(),
            secret_encrypted: None,
            factor_status: FactorStatus::Disabled,
            otp_code: None,
            otp_expires_at: None,
            attempt_count: 0,
            locked_until,
            last_successful_auth: None,
            password_changed_at: None,
            must_change_password: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_lock_remaining_future() {
        let now = OffsetDateTime::now_utc();
        let s = settings(Some(now + Duration::minutes(15)));
        let remaining = s.lock_remaining_secs(now).unwrap();
        assert!(remaining > 14 * 60 && remaining <= 15 * 60);
    }

    #[test]
    fn test_lock_remaining_past_is_none() {
        let now = OffsetDateTime::now_utc();
        let s = settings(Some(now - Duration::minutes(1)));
        assert!(s.lock_remaining_secs(now).is_none());
    }

    #[test]
    fn test_lock_remaining_unlocked_is_none() {
        let now = OffsetDateTime::now_utc();
        assert!(settings(None).lock_remaining_secs(now).is_none());
    }
}
