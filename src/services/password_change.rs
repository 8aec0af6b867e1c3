use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use time::OffsetDateTime;

use crate::error::AppError;
use crate::models::{EventType, Principal, Severity};
use crate::repositories::{PrincipalRepository, SecuritySettingsRepository, SecuritySettingsStore};
use crate::services::auth::hash_password;
use crate::services::factor::RequestContext;
use crate::services::{AuditService, FactorService, password_policy};

/// パスワード変更の再認証に使うファクター種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactorType {
    Totp,
    EmailOtp,
}

/// パスワード変更オーケストレーター
///
/// 状態機械: Authenticated → VerificationPending → {Applied | Rejected}。
/// 確定ステップは単一トランザクションで行い、資格情報と
/// セキュリティフィールドの部分適用を防ぐ。
#[derive(Clone)]
pub struct PasswordChangeService {
    pool: PgPool,
    principal_repo: PrincipalRepository,
    settings_repo: SecuritySettingsRepository,
    factor_service: FactorService,
    audit_service: AuditService,
}

impl PasswordChangeService {
    /// 新しい PasswordChangeService を作成
    pub fn new(
        pool: PgPool,
        principal_repo: PrincipalRepository,
        settings_repo: SecuritySettingsRepository,
        factor_service: FactorService,
        audit_service: AuditService,
    ) -> Self {
        Self {
            pool,
            principal_repo,
            settings_repo,
            factor_service,
            audit_service,
        }
    }

    /// パスワードを変更（OTP/TOTPによる再認証付き）
    ///
    /// # Security
    /// - 新パスワード・コード値はログに出力しない
    /// - 検証失敗は `login_failure` イベントとして監査ログへ残す
    pub async fn change_password(
        &self,
        principal: &Principal,
        new_password: &str,
        code: &str,
        factor_type: FactorType,
        ctx: RequestContext<'_>,
    ) -> Result<(), AppError> {
        // 1. ポリシーのハードゲート（違反規則を明示して拒否）
        let validation = password_policy::validate(new_password);
        if let Some(message) = password_policy::violation_message(&validation) {
            return Err(AppError::Validation(message));
        }

        // 2. ロック中は検証を試みず残り時間付きで拒否
        let settings = self
            .settings_repo
            .find_by_principal_id(principal.id)
            .await?
            .ok_or(AppError::NotConfigured)?;
        let now = OffsetDateTime::now_utc();
        if let Some(remaining) = settings.lock_remaining_secs(now) {
            return Err(AppError::LockedOut {
                retry_after_secs: Some(remaining),
            });
        }

        // 3. 選択されたファクターで再認証
        let verified = match factor_type {
            FactorType::Totp => {
                self.factor_service
                    .verify_totp(principal, code, false, ctx)
                    .await
            }
            FactorType::EmailOtp => {
                self.factor_service
                    .verify_email_otp(principal, code, ctx)
                    .await
            }
        };

        if let Err(error) = verified {
            self.audit_service
                .record(
                    Some(principal.id),
                    EventType::LoginFailure,
                    Severity::Medium,
                    json!({ "reason": "password_change_verification_failed" }),
                    ctx.ip_address,
                    ctx.user_agent,
                )
                .await?;
            // エンジンのエラーをそのまま返す（試行回数以上の詳細は出さない）
            return Err(error);
        }

        // 4. 確定: 資格情報更新とセキュリティフィールドのクリアを
        //    単一トランザクションで行う（部分適用の禁止）
        let password_hash = hash_password(new_password)?;

        let mut tx = self.pool.begin().await?;
        self.principal_repo
            .update_password(&mut *tx, principal.id, &password_hash)
            .await?;
        self.settings_repo
            .apply_password_change(&mut *tx, principal.id)
            .await?;
        tx.commit().await?;

        self.audit_service
            .record(
                Some(principal.id),
                EventType::PasswordChange,
                Severity::Low,
                json!({ "factor": match factor_type {
                    FactorType::Totp => "totp",
                    FactorType::EmailOtp => "email_otp",
                } }),
                ctx.ip_address,
                ctx.user_agent,
            )
            .await?;

        tracing::info!(principal_id = %principal.id, "パスワード変更完了");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factor_type_deserializes_snake_case() {
        let totp: FactorType = serde_json::from_str(r#""totp""#).unwrap();
        assert_eq!(totp, FactorType::Totp);
        let email: FactorType = serde_json::from_str(r#""email_otp""#).unwrap();
        assert_eq!(email, FactorType::EmailOtp);
    }

    #[test]
    fn test_factor_type_rejects_unknown() {
        assert!(serde_json::from_str::<FactorType>(r#""sms""#).is_err());
    }
}
