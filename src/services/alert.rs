use std::sync::Arc;

use crate::config::Config;
use crate::models::{EventType, Severity};

/// アラート・メール配送サービス（開発環境: スタブ実装）
///
/// 配送は常にベストエフォート。失敗はログに残すだけで、
/// 呼び出し元の操作（検証・ロックアウト・ログイン記録）を失敗させない。
#[derive(Clone)]
pub struct AlertService {
    config: Arc<Config>,
}

impl AlertService {
    /// 新しい AlertService を作成
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// セキュリティアラートを送信
    ///
    /// # Returns
    /// 配送できたかどうか（呼び出し元はこの値でエラーにしてはならない）
    pub async fn send_alert(
        &self,
        event_type: EventType,
        severity: Severity,
        destination: &str,
        details: &serde_json::Value,
    ) -> bool {
        // 開発モード: メール送信せずログ出力のみ
        tracing::info!(
            event_type = event_type.as_str(),
            severity = severity.as_str(),
            destination = %destination,
            details = %details,
            "セキュリティアラート送信（開発モード）"
        );

        // 本番環境では lettre を使用してメール送信
        // SMTP設定が存在するか確認
        let _smtp_configured = self.config.smtp_host.is_some()
            && self.config.smtp_username.is_some()
            && self.config.smtp_password.is_some()
            && self.config.smtp_from_address.is_some();

        // TODO: 本番実装時は以下のような形式で lettre を使用
        // if smtp_configured {
        //     let mailer = SmtpTransport::relay(host)?.build();
        //     mailer.send(&email)?;
        // }

        true
    }

    /// メールOTPコードを送信
    ///
    /// 開発モードではログ出力がそのまま配送手段になる
    pub async fn send_otp_email(&self, to: &str, code: &str) -> bool {
        tracing::info!(to = %to, "認証コードメール送信（開発モード）");
        tracing::info!("認証コード: {}", code);

        let _smtp_configured = self.config.smtp_host.is_some();

        true
    }
}
