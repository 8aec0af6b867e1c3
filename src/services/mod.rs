pub mod alert;
pub mod audit;
pub mod auth;
pub mod base32;
pub mod brute_force;
pub mod factor;
pub mod otp;
pub mod password_change;
pub mod password_policy;
pub mod session;
pub mod totp;

pub use alert::AlertService;
pub use audit::AuditService;
pub use auth::AuthService;
pub use brute_force::{BruteForceGuard, FailureCounter, InMemoryFailureCounter};
pub use factor::FactorService;
pub use password_change::PasswordChangeService;
pub use session::{SessionExpiry, SessionTimeoutMonitor, SystemClock};
pub use totp::TotpService;
