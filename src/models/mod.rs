pub mod ip_block;
pub mod login_history;
pub mod principal;
pub mod security_event;
pub mod security_settings;

pub use ip_block::IpBlock;
pub use login_history::{LoginHistory, LoginStatus};
pub use principal::{Principal, Role};
pub use security_event::{EventType, SecurityEvent, Severity};
pub use security_settings::{FactorStatus, SecuritySettings};
