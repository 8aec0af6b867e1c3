use time::{Duration, OffsetDateTime};

/// セッションの絶対上限（活動の有無によらない）
pub const HARD_LIMIT: Duration = Duration::hours(3);
/// 無操作上限（最後の活動シグナルから）
pub const IDLE_LIMIT: Duration = Duration::minutes(15);

/// 時計の抽象化
///
/// タイマーの発火判定を実時間から切り離し、決定的にテストする。
pub trait Clock {
    fn now(&self) -> OffsetDateTime;
}

/// 実時間の時計
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// セッション失効の理由（ユーザー向け表示で区別する）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionExpiry {
    /// セッション開始から3時間経過
    Hard,
    /// 15分間の無操作
    Idle,
}

impl SessionExpiry {
    /// ユーザーに表示する失効通知
    pub fn notice(&self) -> &'static str {
        match self {
            Self::Hard => "セッションの有効期限（3時間）が切れました。再度サインインしてください",
            Self::Idle => "一定時間操作がなかったためサインアウトしました",
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Timers {
    session_start: OffsetDateTime,
    last_activity: OffsetDateTime,
}

/// セッションタイムアウトモニター（クライアント常駐）
///
/// ハードタイマーとアイドルタイマーの2状態を明示的に持つ。
/// 両タイマーはサインイン成功で同時に開始し、サインアウトで
/// 同時に破棄される。どちらかの発火で強制サインアウト。
///
/// コールバックのネストではなく `check`/`remaining` を
/// イベントループ側から呼ぶ設計（単一スレッド協調前提）。
pub struct SessionTimeoutMonitor<C: Clock> {
    clock: C,
    timers: Option<Timers>,
}

impl<C: Clock> SessionTimeoutMonitor<C> {
    /// 新しいモニターを作成（タイマー停止状態）
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            timers: None,
        }
    }

    /// サインイン成功時: 両タイマーを開始
    pub fn start(&mut self) {
        let now = self.clock.now();
        self.timers = Some(Timers {
            session_start: now,
            last_activity: now,
        });
    }

    /// ユーザー活動シグナル（ポインタ・キーボード・タッチ・スクロール）
    ///
    /// アイドルタイマーのみリセットする。停止中は何もしない。
    pub fn record_activity(&mut self) {
        if let Some(timers) = &mut self.timers {
            timers.last_activity = self.clock.now();
        }
    }

    /// サインアウト・コンポーネント破棄時: 両タイマーを破棄
    ///
    /// サインアウト後に生き残るタイマーを作らない。
    pub fn stop(&mut self) {
        self.timers = None;
    }

    /// タイマーが動作中か
    pub fn is_running(&self) -> bool {
        self.timers.is_some()
    }

    /// 発火判定
    ///
    /// 失効していれば理由を返し、タイマーを破棄する（強制サインアウト）。
    /// 両方失効している場合はハード側を理由とする。
    pub fn check(&mut self) -> Option<SessionExpiry> {
        let timers = self.timers?;
        let now = self.clock.now();

        let expiry = if now - timers.session_start >= HARD_LIMIT {
            Some(SessionExpiry::Hard)
        } else if now - timers.last_activity >= IDLE_LIMIT {
            Some(SessionExpiry::Idle)
        } else {
            None
        };

        if expiry.is_some() {
            self.timers = None;
        }
        expiry
    }

    /// 残り時間 (ハード, アイドル)
    ///
    /// 次の発火タイミングのスケジューリングに使う。停止中は None。
    pub fn remaining(&self) -> Option<(Duration, Duration)> {
        let timers = self.timers?;
        let now = self.clock.now();
        let hard = HARD_LIMIT - (now - timers.session_start);
        let idle = IDLE_LIMIT - (now - timers.last_activity);
        Some((hard.max(Duration::ZERO), idle.max(Duration::ZERO)))
    }

    /// ページ再読み込み時: 永続化されたマーカーから経過時間を再構成
    ///
    /// - ハード経過が3時間を超えていれば即サインアウト（Hard）
    /// - アイドル経過が15分を超えていれば即サインアウト（Idle）
    /// - それ以外は残り時間を正しく減らした状態で両タイマーを再開する
    ///   （再読み込みでゼロから再スタートしない）
    pub fn resume(
        &mut self,
        session_start: OffsetDateTime,
        last_activity: OffsetDateTime,
    ) -> Result<(), SessionExpiry> {
        let now = self.clock.now();

        if now - session_start >= HARD_LIMIT {
            self.timers = None;
            return Err(SessionExpiry::Hard);
        }
        if now - last_activity >= IDLE_LIMIT {
            self.timers = None;
            return Err(SessionExpiry::Idle);
        }

        self.timers = Some(Timers {
            session_start,
            last_activity,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;
    use time::macros::datetime;

    /// テスト用の手動時計
    #[derive(Clone)]
    struct ManualClock(Rc<Cell<OffsetDateTime>>);

    impl ManualClock {
        fn at(start: OffsetDateTime) -> Self {
            Self(Rc::new(Cell::new(start)))
        }

        fn advance(&self, duration: Duration) {
            self.0.set(self.0.get() + duration);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> OffsetDateTime {
            self.0.get()
        }
    }

    const T0: OffsetDateTime = datetime!(2026-01-15 09:00 UTC);

    #[test]
    fn test_fresh_session_does_not_expire() {
        let clock = ManualClock::at(T0);
        let mut monitor = SessionTimeoutMonitor::new(clock.clone());
        monitor.start();

        clock.advance(Duration::minutes(14));
        assert_eq!(monitor.check(), None);
        assert!(monitor.is_running());
    }

    #[test]
    fn test_idle_timer_fires_at_15_minutes() {
        let clock = ManualClock::at(T0);
        let mut monitor = SessionTimeoutMonitor::new(clock.clone());
        monitor.start();

        clock.advance(Duration::minutes(15));
        assert_eq!(monitor.check(), Some(SessionExpiry::Idle));
        // 発火後はタイマー破棄済み
        assert!(!monitor.is_running());
    }

    #[test]
    fn test_activity_resets_idle_timer() {
        let clock = ManualClock::at(T0);
        let mut monitor = SessionTimeoutMonitor::new(clock.clone());
        monitor.start();

        for _ in 0..10 {
            clock.advance(Duration::minutes(14));
            assert_eq!(monitor.check(), None);
            monitor.record_activity();
        }
    }

    #[test]
    fn test_hard_timer_fires_despite_activity() {
        let clock = ManualClock::at(T0);
        let mut monitor = SessionTimeoutMonitor::new(clock.clone());
        monitor.start();

        // 10分ごとに活動し続けても3時間で発火する
        for _ in 0..17 {
            clock.advance(Duration::minutes(10));
            assert_eq!(monitor.check(), None);
            monitor.record_activity();
        }
        clock.advance(Duration::minutes(10));
        assert_eq!(monitor.check(), Some(SessionExpiry::Hard));
    }

    #[test]
    fn test_hard_takes_precedence_when_both_expired() {
        let clock = ManualClock::at(T0);
        let mut monitor = SessionTimeoutMonitor::new(clock.clone());
        monitor.start();

        clock.advance(Duration::hours(4));
        assert_eq!(monitor.check(), Some(SessionExpiry::Hard));
    }

    #[test]
    fn test_stop_clears_timers() {
        let clock = ManualClock::at(T0);
        let mut monitor = SessionTimeoutMonitor::new(clock.clone());
        monitor.start();
        monitor.stop();

        clock.advance(Duration::hours(5));
        assert_eq!(monitor.check(), None);
        assert!(!monitor.is_running());
    }

    #[test]
    fn test_resume_179_minutes_with_recent_activity() {
        // 開始179分・最終活動10分前 → どちらも未発火で再開
        let clock = ManualClock::at(T0);
        let mut monitor = SessionTimeoutMonitor::new(clock.clone());
        let result = monitor.resume(T0 - Duration::minutes(179), T0 - Duration::minutes(10));
        assert!(result.is_ok());

        // 残り時間はゼロから再スタートせず正しく減っている
        let (hard, idle) = monitor.remaining().unwrap();
        assert_eq!(hard, Duration::minutes(1));
        assert_eq!(idle, Duration::minutes(5));
    }

    #[test]
    fn test_resume_idle_elapsed_forces_idle_logout() {
        let clock = ManualClock::at(T0);
        let mut monitor = SessionTimeoutMonitor::new(clock);
        let result = monitor.resume(T0 - Duration::minutes(179), T0 - Duration::minutes(15));
        assert_eq!(result.unwrap_err(), SessionExpiry::Idle);
        assert!(!monitor.is_running());
    }

    #[test]
    fn test_resume_181_minutes_forces_hard_logout() {
        let clock = ManualClock::at(T0);
        let mut monitor = SessionTimeoutMonitor::new(clock);
        // ハード超過はアイドル状態に関わらず hard 理由
        let result = monitor.resume(T0 - Duration::minutes(181), T0 - Duration::minutes(1));
        assert_eq!(result.unwrap_err(), SessionExpiry::Hard);
        assert!(!monitor.is_running());
    }

    #[test]
    fn test_expiry_notices_are_distinct() {
        assert_ne!(SessionExpiry::Hard.notice(), SessionExpiry::Idle.notice());
    }
}
