use crate::{api::User, session::SessionManager};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    RedirectToLogin,
    Unauthorized,
}

/// Decides whether a protected view may render.
///
/// An unauthenticated caller gets one refresh attempt before being sent to
/// login. With `roles`, the user's role must be one of them.
pub async fn authorize(session: &SessionManager, roles: Option<&[&str]>) -> GuardDecision {
    if !session.is_authenticated() && !session.refresh().await {
        return GuardDecision::RedirectToLogin;
    }
    let Some(user) = session.authenticated_user() else {
        return GuardDecision::RedirectToLogin;
    };
    match roles {
        Some(roles) if !has_any_role(Some(&user), roles) => {
            tracing::debug!(role = %user.role, "Guard rejected user role");
            GuardDecision::Unauthorized
        }
        _ => GuardDecision::Allow,
    }
}

pub fn has_any_role(user: Option<&User>, roles: &[&str]) -> bool {
    user.map(|u| roles.iter().any(|role| u.role.eq_ignore_ascii_case(role)))
        .unwrap_or(false)
}
