use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use crate::error::AppError;
use crate::repositories::{
    IpBlockRepository, LoginHistoryRepository, PrincipalRepository, SecurityEventRepository,
    SecuritySettingsRepository,
};
use crate::services::{
    AlertService, AuditService, BruteForceGuard, FactorService, InMemoryFailureCounter,
    PasswordChangeService, TotpService,
};
use secrecy::ExposeSecret;

/// アプリケーション共有状態
///
/// axum の State として全ハンドラーで共有される。
/// Clone は必須（axum が内部で clone するため）。
#[derive(Clone)]
pub struct AppState {
    /// PostgreSQL コネクションプール
    pub db_pool: PgPool,
    /// アプリケーション設定（Arc で共有）
    pub config: Arc<Config>,
    /// プリンシパルリポジトリ（ベアラー認証に使用）
    pub principal_repo: PrincipalRepository,
    /// 二要素認証ファクターサービス
    pub factor_service: FactorService,
    /// パスワード変更オーケストレーター
    pub password_change_service: PasswordChangeService,
    /// ブルートフォースガード
    pub brute_force_guard: BruteForceGuard,
}

impl AppState {
    /// 新しい AppState を作成
    pub fn new(db_pool: PgPool, config: Config) -> Result<Self, AppError> {
        let config = Arc::new(config);

        let principal_repo = PrincipalRepository::new(db_pool.clone());
        let settings_repo = SecuritySettingsRepository::new(db_pool.clone());
        let event_repo = SecurityEventRepository::new(db_pool.clone());
        let history_repo = LoginHistoryRepository::new(db_pool.clone());
        let ip_block_repo = IpBlockRepository::new(db_pool.clone());

        let alert_service = AlertService::new(config.clone());
        let audit_service =
            AuditService::new(Arc::new(event_repo), alert_service.clone(), config.clone());

        let totp_service = TotpService::new(
            config.totp_issuer.clone(),
            config.encryption_key.expose_secret(),
        )?;

        let factor_service = FactorService::new(
            Arc::new(settings_repo.clone()),
            totp_service,
            alert_service.clone(),
            audit_service.clone(),
        );

        let password_change_service = PasswordChangeService::new(
            db_pool.clone(),
            principal_repo.clone(),
            settings_repo,
            factor_service.clone(),
            audit_service.clone(),
        );

        // 失敗カウンターは単一インスタンス構成向けのインメモリ実装。
        // マルチインスタンス構成では共有ストア実装に差し替える。
        let failure_counter = Arc::new(InMemoryFailureCounter::default());

        let brute_force_guard = BruteForceGuard::new(
            history_repo,
            ip_block_repo,
            principal_repo.clone(),
            audit_service,
            alert_service,
            failure_counter,
        );

        Ok(Self {
            db_pool,
            config,
            principal_repo,
            factor_service,
            password_change_service,
            brute_force_guard,
        })
    }
}
