pub mod auth;

pub use auth::{AuthContext, AuthEvent, AuthState, LogoutReason};
