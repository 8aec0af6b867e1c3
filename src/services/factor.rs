use std::sync::Arc;

use serde_json::json;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{EventType, FactorStatus, Principal, SecuritySettings, Severity};
use crate::repositories::SecuritySettingsStore;
use crate::services::{AlertService, AuditService, TotpService, otp};

/// 検証試行の上限（TOTP・メールOTP共通）
pub const MAX_VERIFY_ATTEMPTS: i32 = 5;
/// TOTPロックアウトの期間
pub const LOCK_DURATION: Duration = Duration::minutes(15);

/// ファクター登録の結果
#[derive(Debug)]
pub enum EnrollOutcome {
    /// 登録開始（または pending 中の再取得 - 同一シークレットを返す）
    Enrolled {
        secret: String,
        provisioning_uri: String,
    },
    /// 登録済み - シークレットは返さない
    AlreadyEnrolled,
}

/// リクエスト元のコンテキスト（監査ログ用）
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestContext<'a> {
    pub ip_address: Option<&'a str>,
    pub user_agent: Option<&'a str>,
}

/// 二要素認証ファクターサービス
///
/// TOTPエンジン・メールOTPエンジンと資格情報ストア
/// （security_settings 行）のオーケストレーションを担う。
/// パスワード変更オーケストレーターからも再利用される。
#[derive(Clone)]
pub struct FactorService {
    settings_repo: Arc<dyn SecuritySettingsStore>,
    totp_service: TotpService,
    alert_service: AlertService,
    audit_service: AuditService,
}

impl FactorService {
    /// 新しい FactorService を作成
    pub fn new(
        settings_repo: Arc<dyn SecuritySettingsStore>,
        totp_service: TotpService,
        alert_service: AlertService,
        audit_service: AuditService,
    ) -> Self {
        Self {
            settings_repo,
            totp_service,
            alert_service,
            audit_service,
        }
    }

    /// TOTPファクターを登録
    ///
    /// - `pending` 中の再呼び出しは同じシークレットを返す（冪等なセットアップ）
    /// - `enabled` 済みならシークレットを公開せず AlreadyEnrolled を返す
    pub async fn enroll(
        &self,
        principal: &Principal,
        ctx: RequestContext<'_>,
    ) -> Result<EnrollOutcome, AppError> {
        let settings = self
            .settings_repo
            .find_by_principal_id(principal.id)
            .await?;

        if let Some(settings) = &settings {
            match settings.factor_status {
                FactorStatus::Enabled => {
                    tracing::info!(principal_id = %principal.id, "登録済みファクターへの再登録要求");
                    return Ok(EnrollOutcome::AlreadyEnrolled);
                }
                FactorStatus::Pending => {
                    // シークレット発行済みの pending は同一シークレットを再表示
                    if let Some(encrypted) = &settings.secret_encrypted {
                        let secret = self.totp_service.decrypt_secret(encrypted)?;
                        let provisioning_uri =
                            self.totp_service.provisioning_uri(&principal.email, &secret);
                        return Ok(EnrollOutcome::Enrolled {
                            secret,
                            provisioning_uri,
                        });
                    }
                }
                FactorStatus::Disabled => {}
            }
        }

        // 新規シークレット生成（20バイト → Base32）
        let secret = TotpService::generate_secret();
        let encrypted = self.totp_service.encrypt_secret(&secret)?;
        self.settings_repo
            .store_pending_secret(principal.id, &encrypted)
            .await?;

        self.audit_service
            .record(
                Some(principal.id),
                EventType::FactorEnrolled,
                Severity::Low,
                json!({ "factor": "totp", "status": "pending" }),
                ctx.ip_address,
                ctx.user_agent,
            )
            .await?;

        tracing::info!(principal_id = %principal.id, "TOTP登録開始");

        let provisioning_uri = self.totp_service.provisioning_uri(&principal.email, &secret);
        Ok(EnrollOutcome::Enrolled {
            secret,
            provisioning_uri,
        })
    }

    /// TOTPコードを検証
    ///
    /// 失敗ポリシー: 失敗ごとに attempt_count をインクリメントし、
    /// 5回目で15分のロック（attempt_count は0にリセット）。
    /// ロック中はHMAC計算を行わず残り時間付きで即時拒否する。
    pub async fn verify_totp(
        &self,
        principal: &Principal,
        code: &str,
        is_setup_flow: bool,
        ctx: RequestContext<'_>,
    ) -> Result<(), AppError> {
        let settings = self.load_settings(principal.id).await?;
        let encrypted = settings
            .secret_encrypted
            .as_deref()
            .ok_or(AppError::NotConfigured)?;

        self.reject_if_locked(&settings, ctx).await?;

        validate_code_shape(code)?;

        let secret = self.totp_service.decrypt_secret(encrypted)?;
        if self.totp_service.verify_code(&secret, code)? {
            // pending 中の成功で enabled へ遷移、last_successful_auth 打刻、
            // attempt_count リセット
            self.settings_repo.mark_verified(principal.id).await?;

            if is_setup_flow && settings.factor_status == FactorStatus::Pending {
                self.audit_service
                    .record(
                        Some(principal.id),
                        EventType::FactorEnrolled,
                        Severity::Low,
                        json!({ "factor": "totp", "status": "enabled" }),
                        ctx.ip_address,
                        ctx.user_agent,
                    )
                    .await?;
                tracing::info!(principal_id = %principal.id, "TOTP有効化完了");
            }

            return Ok(());
        }

        self.register_failure(principal.id, "totp", ctx).await
    }

    /// メールOTPコードを発行（昇格済みプリンシパル向け機能）
    ///
    /// 再発行は前の未使用コードを上書き無効化する。
    ///
    /// # Returns
    /// マスク済みの送信先メールアドレス
    pub async fn issue_email_code(
        &self,
        principal: &Principal,
        ctx: RequestContext<'_>,
    ) -> Result<String, AppError> {
        let code = otp::generate_code();
        let expires_at = OffsetDateTime::now_utc() + otp::OTP_EXPIRY;

        self.settings_repo
            .store_otp(principal.id, &code, expires_at)
            .await?;

        // 配送はベストエフォート（失敗しても発行自体は成立）
        let delivered = self
            .alert_service
            .send_otp_email(&principal.email, &code)
            .await;
        if !delivered {
            tracing::warn!(principal_id = %principal.id, "OTPメール配送に失敗");
        }

        self.audit_service
            .record(
                Some(principal.id),
                EventType::FactorEnrolled,
                Severity::Low,
                json!({ "factor": "email_otp", "status": "pending" }),
                ctx.ip_address,
                ctx.user_agent,
            )
            .await?;

        tracing::info!(principal_id = %principal.id, "メールOTP発行");

        Ok(otp::mask_email(&principal.email))
    }

    /// メールOTPコードを検証
    ///
    /// 検証順序（仕様で固定）:
    /// 1. 未発行 → NotConfigured
    /// 2. 期限切れ → Expired（サイレント削除しない）
    /// 3. 試行上限到達 → LockedOut（比較せず「新しいコードを」）
    /// 4. compare の前に increment（並行リクエストの只乗り防止）
    pub async fn verify_email_otp(
        &self,
        principal: &Principal,
        code: &str,
        ctx: RequestContext<'_>,
    ) -> Result<(), AppError> {
        validate_code_shape(code)?;

        let settings = self.load_settings(principal.id).await?;
        let pending_code = settings.otp_code.as_deref().ok_or(AppError::NotConfigured)?;

        let now = OffsetDateTime::now_utc();
        if let Some(expires_at) = settings.otp_expires_at {
            if now > expires_at {
                return Err(AppError::Expired);
            }
        }

        if settings.attempt_count >= MAX_VERIFY_ATTEMPTS {
            // 上限到達は不一致ではなくロックアウトとして監査に残す
            self.audit_service
                .record(
                    Some(principal.id),
                    EventType::AccountLocked,
                    Severity::Medium,
                    json!({ "factor": "email_otp", "reason": "attempt_ceiling" }),
                    ctx.ip_address,
                    ctx.user_agent,
                )
                .await?;
            return Err(AppError::LockedOut {
                retry_after_secs: None,
            });
        }

        // increment-before-compare
        let attempt_count = self.settings_repo.increment_attempts(principal.id).await?;

        if pending_code == code {
            self.settings_repo.mark_verified(principal.id).await?;
            tracing::info!(principal_id = %principal.id, "メールOTP検証成功");
            return Ok(());
        }

        let remaining = (MAX_VERIFY_ATTEMPTS - attempt_count).max(0) as u32;
        self.record_invalid_code(principal.id, "email_otp", remaining, ctx)
            .await?;
        Err(AppError::InvalidCode {
            remaining_attempts: remaining,
        })
    }

    /// ファクターを初期状態へリセット（特権操作）
    ///
    /// シークレット・状態・OTP・ロックフィールドをすべてクリアする。
    pub async fn reset_factor(
        &self,
        target_principal_id: Uuid,
        acting_principal: &Principal,
        ctx: RequestContext<'_>,
    ) -> Result<(), AppError> {
        if !acting_principal.role.is_elevated() {
            self.audit_service
                .record(
                    Some(acting_principal.id),
                    EventType::ForbiddenAction,
                    Severity::Medium,
                    json!({
                        "action": "reset_factor",
                        "target_principal_id": target_principal_id,
                    }),
                    ctx.ip_address,
                    ctx.user_agent,
                )
                .await?;
            return Err(AppError::Forbidden);
        }

        self.settings_repo.reset_factor(target_principal_id).await?;

        self.audit_service
            .record(
                Some(target_principal_id),
                EventType::FactorReset,
                Severity::Medium,
                json!({ "reset_by": acting_principal.id }),
                ctx.ip_address,
                ctx.user_agent,
            )
            .await?;

        tracing::info!(
            target = %target_principal_id,
            acting = %acting_principal.id,
            "ファクターリセット完了"
        );

        Ok(())
    }

    /// セキュリティ設定行をロード（未登録なら NotConfigured）
    async fn load_settings(&self, principal_id: Uuid) -> Result<SecuritySettings, AppError> {
        self.settings_repo
            .find_by_principal_id(principal_id)
            .await?
            .ok_or(AppError::NotConfigured)
    }

    /// ロック中なら残り時間付きで拒否
    async fn reject_if_locked(
        &self,
        settings: &SecuritySettings,
        ctx: RequestContext<'_>,
    ) -> Result<(), AppError> {
        let now = OffsetDateTime::now_utc();
        if let Some(remaining) = settings.lock_remaining_secs(now) {
            self.audit_service
                .record(
                    Some(settings.principal_id),
                    EventType::LoginFailure,
                    Severity::Low,
                    json!({ "reason": "attempt_while_locked" }),
                    ctx.ip_address,
                    ctx.user_agent,
                )
                .await?;
            return Err(AppError::LockedOut {
                retry_after_secs: Some(remaining),
            });
        }
        Ok(())
    }

    /// TOTP検証失敗を記録し、閾値到達ならロックする
    async fn register_failure(
        &self,
        principal_id: Uuid,
        factor: &str,
        ctx: RequestContext<'_>,
    ) -> Result<(), AppError> {
        let attempt_count = self.settings_repo.increment_attempts(principal_id).await?;

        if attempt_count >= MAX_VERIFY_ATTEMPTS {
            let locked_until = OffsetDateTime::now_utc() + LOCK_DURATION;
            // ロック時に attempt_count は0へリセットされる（不変条件）
            self.settings_repo.lock(principal_id, locked_until).await?;

            self.audit_service
                .record(
                    Some(principal_id),
                    EventType::AccountLocked,
                    Severity::High,
                    json!({
                        "factor": factor,
                        "lock_minutes": LOCK_DURATION.whole_minutes(),
                    }),
                    ctx.ip_address,
                    ctx.user_agent,
                )
                .await?;

            tracing::warn!(principal_id = %principal_id, "検証失敗上限到達によりロック");

            return Err(AppError::LockedOut {
                retry_after_secs: Some(LOCK_DURATION.whole_seconds()),
            });
        }

        let remaining = (MAX_VERIFY_ATTEMPTS - attempt_count).max(0) as u32;
        self.record_invalid_code(principal_id, factor, remaining, ctx)
            .await?;
        Err(AppError::InvalidCode {
            remaining_attempts: remaining,
        })
    }

    /// 不一致コードの監査イベントを記録
    async fn record_invalid_code(
        &self,
        principal_id: Uuid,
        factor: &str,
        remaining: u32,
        ctx: RequestContext<'_>,
    ) -> Result<(), AppError> {
        self.audit_service
            .record(
                Some(principal_id),
                EventType::InvalidCode,
                Severity::Medium,
                json!({ "factor": factor, "remaining_attempts": remaining }),
                ctx.ip_address,
                ctx.user_agent,
            )
            .await
    }
}

/// コード形状チェック: 6桁のASCII数字
fn validate_code_shape(code: &str) -> Result<(), AppError> {
    if code.len() != 6 || !code.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::Validation(
            "認証コードは6桁の数字で入力してください".to_string(),
        ));
    }
    Ok(())
}
