use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::models::SecuritySettings;

const ALL_COLUMNS: &str = "principal_id, secret_encrypted, factor_status, otp_code, \
     otp_expires_at, attempt_count, locked_until, last_successful_auth, \
     password_changed_at, must_change_password, created_at, updated_at";

/// セキュリティ設定ストアのインターフェース
///
/// ロックアウト・試行カウントの判定ロジックをPostgresから切り離し、
/// インメモリ実装でポリシーをテストできるようにする。
/// トランザクション参加が必要な操作（`apply_password_change`）は
/// executor を取るため、具象リポジトリ側にのみ存在する。
#[async_trait]
pub trait SecuritySettingsStore: Send + Sync {
    /// プリンシパルIDでセキュリティ設定を検索
    async fn find_by_principal_id(
        &self,
        principal_id: Uuid,
    ) -> Result<Option<SecuritySettings>, sqlx::Error>;

    /// TOTPシークレットを保存（登録開始: factor_status = pending）
    async fn store_pending_secret(
        &self,
        principal_id: Uuid,
        secret_encrypted: &[u8],
    ) -> Result<(), sqlx::Error>;

    /// メールOTPコードを発行（再発行時は前のコードを上書き）
    async fn store_otp(
        &self,
        principal_id: Uuid,
        code: &str,
        expires_at: OffsetDateTime,
    ) -> Result<(), sqlx::Error>;

    /// 試行回数をインクリメントし、更新後の値を返す
    async fn increment_attempts(&self, principal_id: Uuid) -> Result<i32, sqlx::Error>;

    /// アカウントをロック（attempt_count は不変条件によりリセット）
    async fn lock(
        &self,
        principal_id: Uuid,
        locked_until: OffsetDateTime,
    ) -> Result<(), sqlx::Error>;

    /// 検証成功を記録
    async fn mark_verified(&self, principal_id: Uuid) -> Result<(), sqlx::Error>;

    /// ファクターを初期状態へリセット（特権操作）
    async fn reset_factor(&self, principal_id: Uuid) -> Result<(), sqlx::Error>;
}

#[derive(Clone)]
pub struct SecuritySettingsRepository {
    pool: PgPool,
}

impl SecuritySettingsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// パスワード変更の確定（トランザクション内で principals 更新と同時に実行）
    ///
    /// OTP・ロック関連フィールドのクリアと password_changed_at の打刻。
    /// 部分適用を防ぐため、呼び出し側のトランザクションに参加する。
    pub async fn apply_password_change<'e>(
        &self,
        executor: impl sqlx::PgExecutor<'e>,
        principal_id: Uuid,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE security_settings
            SET otp_code = NULL,
                otp_expires_at = NULL,
                attempt_count = 0,
                locked_until = NULL,
                password_changed_at = NOW(),
                must_change_password = FALSE,
                updated_at = NOW()
            WHERE principal_id = $1
            "#,
        )
        .bind(principal_id)
        .execute(executor)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl SecuritySettingsStore for SecuritySettingsRepository {
    async fn find_by_principal_id(
        &self,
        principal_id: Uuid,
    ) -> Result<Option<SecuritySettings>, sqlx::Error> {
        sqlx::query_as::<_, SecuritySettings>(&format!(
            "SELECT {ALL_COLUMNS} FROM security_settings WHERE principal_id = $1"
        ))
        .bind(principal_id)
        .fetch_optional(&self.pool)
        .await
    }

    // pending 中の再登録は呼び出し側が既存シークレットを返すため、
    // ここに来るのは未登録または disabled の行のみ
    async fn store_pending_secret(
        &self,
        principal_id: Uuid,
        secret_encrypted: &[u8],
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO security_settings (principal_id, secret_encrypted, factor_status)
            VALUES ($1, $2, 'pending')
            ON CONFLICT (principal_id) DO UPDATE
            SET secret_encrypted = EXCLUDED.secret_encrypted,
                factor_status = 'pending',
                attempt_count = 0,
                updated_at = NOW()
            "#,
        )
        .bind(principal_id)
        .bind(secret_encrypted)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn store_otp(
        &self,
        principal_id: Uuid,
        code: &str,
        expires_at: OffsetDateTime,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO security_settings (principal_id, otp_code, otp_expires_at, factor_status)
            VALUES ($1, $2, $3, 'pending')
            ON CONFLICT (principal_id) DO UPDATE
            SET otp_code = EXCLUDED.otp_code,
                otp_expires_at = EXCLUDED.otp_expires_at,
                attempt_count = 0,
                factor_status = 'pending',
                updated_at = NOW()
            "#,
        )
        .bind(principal_id)
        .bind(code)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // 並行する検証リクエストがカウントを失わないよう、
    // 行アトミックな `UPDATE ... RETURNING` で行う（compare前にincrement）
    async fn increment_attempts(&self, principal_id: Uuid) -> Result<i32, sqlx::Error> {
        sqlx::query_scalar::<_, i32>(
            r#"
            UPDATE security_settings
            SET attempt_count = attempt_count + 1, updated_at = NOW()
            WHERE principal_id = $1
            RETURNING attempt_count
            "#,
        )
        .bind(principal_id)
        .fetch_one(&self.pool)
        .await
    }

    async fn lock(
        &self,
        principal_id: Uuid,
        locked_until: OffsetDateTime,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE security_settings
            SET locked_until = $2, attempt_count = 0, updated_at = NOW()
            WHERE principal_id = $1
            "#,
        )
        .bind(principal_id)
        .bind(locked_until)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // attempt_count リセット・OTPクリア・enabled 遷移・
    // last_successful_auth 打刻を1回のUPDATEで行う
    async fn mark_verified(&self, principal_id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE security_settings
            SET factor_status = 'enabled',
                attempt_count = 0,
                otp_code = NULL,
                otp_expires_at = NULL,
                locked_until = NULL,
                last_successful_auth = NOW(),
                updated_at = NOW()
            WHERE principal_id = $1
            "#,
        )
        .bind(principal_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn reset_factor(&self, principal_id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE security_settings
            SET secret_encrypted = NULL,
                factor_status = 'disabled',
                otp_code = NULL,
                otp_expires_at = NULL,
                attempt_count = 0,
                locked_until = NULL,
                updated_at = NOW()
            WHERE principal_id = $1
            "#,
        )
        .bind(principal_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
