use reqwest::header::HeaderMap;

use crate::api::User;

/// Snapshot of the session as UI code sees it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthState {
    pub user: Option<User>,
    pub is_authenticated: bool,
    pub is_refreshing: bool,
}

/// Everything a data service needs before issuing a request.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user: Option<User>,
    pub headers: HeaderMap,
    pub is_authenticated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutReason {
    UserRequested,
    RefreshFailed,
    RefreshExpired,
}

/// Process-wide "auth changed" notifications.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthEvent {
    LoggedIn { user: User },
    Refreshed,
    LoggedOut { reason: LogoutReason },
    /// The host should tear down and rebuild from persisted state.
    ReloadRequested,
}

impl AuthEvent {
    pub fn is_logged_in(&self) -> bool {
        matches!(self, AuthEvent::LoggedIn { .. } | AuthEvent::Refreshed)
    }
}
