pub mod ip_block;
pub mod login_history;
pub mod principal;
pub mod security_event;
pub mod security_settings;

pub use ip_block::IpBlockRepository;
pub use login_history::LoginHistoryRepository;
pub use principal::PrincipalRepository;
pub use security_event::{SecurityEventRepository, SecurityEventStore};
pub use security_settings::{SecuritySettingsRepository, SecuritySettingsStore};
