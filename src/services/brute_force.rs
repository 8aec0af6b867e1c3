use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde_json::json;
use sha2::{Digest, Sha256};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{EventType, LoginStatus, Severity};
use crate::repositories::{IpBlockRepository, LoginHistoryRepository, PrincipalRepository};
use crate::services::{AlertService, AuditService};

/// 失敗カウントの対象ウィンドウ
pub const FAILURE_WINDOW: Duration = Duration::minutes(30);
/// ウィンドウ内でブロックに至る失敗回数
pub const FAILURE_THRESHOLD: usize = 5;
/// IPブロックの有効期間
pub const BLOCK_DURATION: Duration = Duration::hours(24);

/// 自動ブロックの発行主体名
const BLOCKED_BY: &str = "brute_force_guard";

/// ローリングウィンドウの失敗カウンター
///
/// プロセス内マップの直書きではなくインターフェースとして注入し、
/// マルチインスタンス構成では共有ストア実装に差し替え可能にする。
/// カウンターは短命・有界で、再起動で失われてよい。
pub trait FailureCounter: Send + Sync {
    /// 失敗を記録し、ウィンドウ内の件数（今回を含む）を返す
    fn record(&self, key: &str, now: OffsetDateTime) -> usize;
    /// キーのカウントを破棄する（ログイン成功時）
    fn clear(&self, key: &str);
}

/// 単一インスタンス向けのインメモリ実装
pub struct InMemoryFailureCounter {
    window: Duration,
    entries: Mutex<HashMap<String, Vec<OffsetDateTime>>>,
}

impl InMemoryFailureCounter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryFailureCounter {
    fn default() -> Self {
        Self::new(FAILURE_WINDOW)
    }
}

impl FailureCounter for InMemoryFailureCounter {
    fn record(&self, key: &str, now: OffsetDateTime) -> usize {
        let cutoff = now - self.window;
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        // 失敗のみで終わったキーは clear が呼ばれないため、
        // 記録のたびにウィンドウ外しか残っていないキーを破棄して有界に保つ
        entries.retain(|_, timestamps| timestamps.last().is_some_and(|&t| t > cutoff));
        let timestamps = entries.entry(key.to_string()).or_default();
        timestamps.retain(|&t| t > cutoff);
        timestamps.push(now);
        timestamps.len()
    }

    fn clear(&self, key: &str) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.remove(key);
    }
}

/// 端末フィンガープリントを生成
///
/// SHA-256(IP + "|" + User-Agent) の先頭16バイトをBase64化した
/// 切り詰めハッシュ（生のUAをそのまま識別子に使わない）
pub fn device_fingerprint(ip_address: &str, user_agent: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(ip_address.as_bytes());
    hasher.update(b"|");
    hasher.update(user_agent.unwrap_or("").as_bytes());
    let digest = hasher.finalize();
    URL_SAFE_NO_PAD.encode(&digest[..16])
}

/// ブルートフォースガード
///
/// すべてのログイン結果（成功・失敗）で呼ばれ、
/// IP・メール単位の失敗集計と一時IPブロックの発行、
/// 新規端末ログインの検知を行う。
#[derive(Clone)]
pub struct BruteForceGuard {
    history_repo: LoginHistoryRepository,
    ip_block_repo: IpBlockRepository,
    principal_repo: PrincipalRepository,
    audit_service: AuditService,
    alert_service: AlertService,
    counter: Arc<dyn FailureCounter>,
}

impl BruteForceGuard {
    /// 新しい BruteForceGuard を作成
    pub fn new(
        history_repo: LoginHistoryRepository,
        ip_block_repo: IpBlockRepository,
        principal_repo: PrincipalRepository,
        audit_service: AuditService,
        alert_service: AlertService,
        counter: Arc<dyn FailureCounter>,
    ) -> Self {
        Self {
            history_repo,
            ip_block_repo,
            principal_repo,
            audit_service,
            alert_service,
            counter,
        }
    }

    /// IPが現在ブロック中かの事前チェック
    pub async fn is_blocked(&self, ip_address: &str) -> Result<bool, AppError> {
        Ok(self.ip_block_repo.find_active(ip_address).await?.is_some())
    }

    /// ログイン結果を記録し、ブロック状態を返す
    ///
    /// # Returns
    /// `true` ならこのIPはブロック中（今回の記録で到達した場合を含む）
    pub async fn report_outcome(
        &self,
        principal_id: Option<Uuid>,
        email: Option<&str>,
        ip_address: &str,
        user_agent: Option<&str>,
        status: LoginStatus,
    ) -> Result<bool, AppError> {
        // 事前チェック: ブロック中なら標準の履歴行だけを残して短絡する
        // （ガード自身の失敗カウント・再ブロックは行わない）
        if self.is_blocked(ip_address).await? {
            let fingerprint = device_fingerprint(ip_address, user_agent);
            self.history_repo
                .create(
                    principal_id,
                    email,
                    ip_address,
                    user_agent,
                    status,
                    &fingerprint,
                )
                .await?;
            tracing::info!(ip = %ip_address, "ブロック中IPからの試行を短絡");
            return Ok(true);
        }

        match status {
            LoginStatus::Failure => self.record_failure(principal_id, email, ip_address, user_agent).await,
            LoginStatus::Success => {
                self.record_success(principal_id, email, ip_address, user_agent)
                    .await?;
                Ok(false)
            }
        }
    }

    /// 失敗を記録し、閾値到達ならIPブロックを発行
    async fn record_failure(
        &self,
        principal_id: Option<Uuid>,
        email: Option<&str>,
        ip_address: &str,
        user_agent: Option<&str>,
    ) -> Result<bool, AppError> {
        let fingerprint = device_fingerprint(ip_address, user_agent);
        self.history_repo
            .create(
                principal_id,
                email,
                ip_address,
                user_agent,
                LoginStatus::Failure,
                &fingerprint,
            )
            .await?;

        // IPとメールそれぞれのキーで集計し、多い方で判定
        let now = OffsetDateTime::now_utc();
        let ip_count = self.counter.record(&format!("ip:{ip_address}"), now);
        let email_count = email
            .map(|e| self.counter.record(&format!("email:{e}"), now))
            .unwrap_or(0);

        if ip_count.max(email_count) < FAILURE_THRESHOLD {
            return Ok(false);
        }

        let expires_at = now + BLOCK_DURATION;
        self.ip_block_repo
            .create(
                ip_address,
                "ログイン失敗の繰り返し",
                expires_at,
                BLOCKED_BY,
            )
            .await?;

        // high severity は AuditService がアラートまでファンアウトする
        self.audit_service
            .record(
                principal_id,
                EventType::IpBlocked,
                Severity::High,
                json!({
                    "ip_address": ip_address,
                    "failure_count": ip_count.max(email_count),
                    "block_hours": BLOCK_DURATION.whole_hours(),
                }),
                Some(ip_address),
                user_agent,
            )
            .await?;

        tracing::warn!(ip = %ip_address, "失敗閾値到達によりIPブロック発行");

        Ok(true)
    }

    /// 成功を記録し、新規端末ログインを検知
    async fn record_success(
        &self,
        principal_id: Option<Uuid>,
        email: Option<&str>,
        ip_address: &str,
        user_agent: Option<&str>,
    ) -> Result<(), AppError> {
        // 新規端末判定は今回の行を入れる前の履歴に対して行う
        let new_device = match principal_id {
            Some(id) => {
                !self.history_repo.has_success_from_ip(id, ip_address).await?
                    && self.history_repo.has_any_success(id).await?
            }
            None => false,
        };

        let fingerprint = device_fingerprint(ip_address, user_agent);
        self.history_repo
            .create(
                principal_id,
                email,
                ip_address,
                user_agent,
                LoginStatus::Success,
                &fingerprint,
            )
            .await?;

        // 成功でウィンドウカウンターを破棄
        self.counter.clear(&format!("ip:{ip_address}"));
        if let Some(e) = email {
            self.counter.clear(&format!("email:{e}"));
        }

        if new_device {
            // 誤検知は許容する設計（初回の別IPでも通知する）
            self.audit_service
                .record(
                    principal_id,
                    EventType::SuspiciousActivity,
                    Severity::Medium,
                    json!({ "reason": "new_device_login", "ip_address": ip_address }),
                    Some(ip_address),
                    user_agent,
                )
                .await?;

            if let Some(id) = principal_id {
                if let Some(principal) = self.principal_repo.find_by_id(id).await? {
                    let delivered = self
                        .alert_service
                        .send_alert(
                            EventType::SuspiciousActivity,
                            Severity::Medium,
                            &principal.email,
                            &json!({ "reason": "new_device_login" }),
                        )
                        .await;
                    if !delivered {
                        tracing::warn!(principal_id = %id, "新規端末アラート配送に失敗");
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_counter_reaches_threshold_at_five() {
        let counter = InMemoryFailureCounter::default();
        let now = datetime!(2026-01-15 12:00 UTC);
        for i in 1..=4 {
            assert_eq!(counter.record("ip:203.0.113.7", now), i);
        }
        assert_eq!(counter.record("ip:203.0.113.7", now), FAILURE_THRESHOLD);
    }

    #[test]
    fn test_counter_prunes_outside_window() {
        let counter = InMemoryFailureCounter::default();
        let start = datetime!(2026-01-15 12:00 UTC);
        for _ in 0..4 {
            counter.record("ip:203.0.113.7", start);
        }
        // 31分後: 過去4件はウィンドウ外
        let later = start + Duration::minutes(31);
        assert_eq!(counter.record("ip:203.0.113.7", later), 1);
    }

    #[test]
    fn test_counter_keys_are_independent() {
        let counter = InMemoryFailureCounter::default();
        let now = datetime!(2026-01-15 12:00 UTC);
        counter.record("ip:203.0.113.7", now);
        assert_eq!(counter.record("email:taro@example.com", now), 1);
    }

    #[test]
    fn test_counter_clear() {
        let counter = InMemoryFailureCounter::default();
        let now = datetime!(2026-01-15 12:00 UTC);
        counter.record("ip:203.0.113.7", now);
        counter.record("ip:203.0.113.7", now);
        counter.clear("ip:203.0.113.7");
        assert_eq!(counter.record("ip:203.0.113.7", now), 1);
    }

    #[test]
    fn test_counter_evicts_stale_keys() {
        // 失敗だけを残して去った送信元のキーがマップに溜まらないこと
        let counter = InMemoryFailureCounter::default();
        let start = datetime!(2026-01-15 12:00 UTC);
        for i in 0..100 {
            counter.record(&format!("ip:203.0.113.{i}"), start);
        }
        let later = start + Duration::minutes(31);
        counter.record("ip:198.51.100.1", later);

        let entries = counter.entries.lock().unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries.contains_key("ip:198.51.100.1"));
    }

    #[test]
    fn test_device_fingerprint_is_stable_and_truncated() {
        let a = device_fingerprint("203.0.113.7", Some("Mozilla/5.0"));
        let b = device_fingerprint("203.0.113.7", Some("Mozilla/5.0"));
        assert_eq!(a, b);
        // 16バイト → Base64(URL-safe, パディングなし) 22文字
        assert_eq!(a.len(), 22);
    }

    #[test]
    fn test_device_fingerprint_differs_by_agent() {
        let a = device_fingerprint("203.0.113.7", Some("Mozilla/5.0"));
        let b = device_fingerprint("203.0.113.7", Some("curl/8.0"));
        let c = device_fingerprint("203.0.113.7", None);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }
}
