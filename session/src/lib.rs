//! Client-side session management for the CohortFlow API: login, background
//! token renewal, credential headers and logout for one device.

pub mod api;
pub mod clock;
pub mod config;
pub mod guard;
pub mod session;
pub mod state;
pub mod utils;

pub use api::{AuthError, LoginRequest, User};
pub use config::SessionConfig;
pub use session::{RefreshScheduler, SessionManager};
pub use state::{AuthEvent, LogoutReason};
