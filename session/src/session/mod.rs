pub mod manager;
pub mod scheduler;
pub mod store;

pub use manager::{DeviceTokens, SessionManager};
pub use scheduler::{evaluate, Freshness, Margins, RefreshScheduler};
pub use store::{ExpiringToken, Session, TokenStore};
