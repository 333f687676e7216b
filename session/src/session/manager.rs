use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};

use super::{
    scheduler::{evaluate, Freshness, Margins, RefreshScheduler},
    store::{Session, TokenStore},
};
use crate::{
    api::{
        json_headers, ApiClient, AuthError, ChangePasswordRequest, DeviceInfo,
        DeviceTokenRequest, ForgotPasswordRequest, LoginRequest, MessageResponse,
        ResetPasswordRequest, User,
    },
    clock::{Clock, SystemClock},
    config::SessionConfig,
    state::auth::{AuthContext, AuthEvent, AuthState, LogoutReason},
    utils::storage::KeyValueStore,
};

const EVENT_CAPACITY: usize = 32;

/// Token strings as they stand after a freshness check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceTokens {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

/// The authenticated-session context.
///
/// Built once at startup and cloned into whatever needs credentials; clones
/// share one token store, one refresh gate and one event channel.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

struct Inner {
    api: ApiClient,
    store: TokenStore,
    margins: Margins,
    refresh_interval: Duration,
    user_agent: String,
    /// Serializes refreshes, logins and logouts. Holds the number of
    /// completed refresh attempts.
    refresh_gate: Mutex<u64>,
    completed_refreshes: AtomicU64,
    last_refresh_ok: AtomicBool,
    refreshing: AtomicBool,
    events: broadcast::Sender<AuthEvent>,
}

/// Clears the in-progress flag however the refresh future ends.
struct RefreshFlag<'a>(&'a AtomicBool);

impl<'a> RefreshFlag<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for RefreshFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl SessionManager {
    pub fn new(config: &SessionConfig, storage: Arc<dyn KeyValueStore>) -> anyhow::Result<Self> {
        let api = ApiClient::new(config)?;
        Ok(Self::with_parts(api, storage, Arc::new(SystemClock), config))
    }

    pub fn with_parts(
        api: ApiClient,
        storage: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        config: &SessionConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let store = TokenStore::new(storage, clock, config.refresh_window_millis());
        Self {
            inner: Arc::new(Inner {
                api,
                store,
                margins: Margins {
                    access_millis: config.access_token_margin_millis(),
                    refresh_millis: config.refresh_token_margin_millis(),
                },
                refresh_interval: config.refresh_interval(),
                user_agent: config.user_agent.clone(),
                refresh_gate: Mutex::new(0),
                completed_refreshes: AtomicU64::new(0),
                last_refresh_ok: AtomicBool::new(false),
                refreshing: AtomicBool::new(false),
                events,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.inner.events.subscribe()
    }

    pub fn start_refresh_scheduler(&self) -> RefreshScheduler {
        RefreshScheduler::start(self.clone(), self.inner.refresh_interval)
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner
            .store
            .snapshot()
            .is_authenticated_at(self.inner.store.now_millis())
    }

    pub fn authenticated_user(&self) -> Option<User> {
        let session = self.inner.store.snapshot();
        if !session.is_authenticated_at(self.inner.store.now_millis()) {
            return None;
        }
        session.user.filter(|user| !user.id.trim().is_empty())
    }

    pub fn is_refreshing(&self) -> bool {
        self.inner.refreshing.load(Ordering::SeqCst)
    }

    pub fn auth_state(&self) -> AuthState {
        let user = self.authenticated_user();
        AuthState {
            is_authenticated: user.is_some(),
            user,
            is_refreshing: self.is_refreshing(),
        }
    }

    pub fn auth_context(&self, require_auth: bool) -> AuthContext {
        AuthContext {
            user: self.authenticated_user(),
            headers: self.get_headers(require_auth),
            is_authenticated: self.is_authenticated(),
        }
    }

    pub fn session_snapshot(&self) -> Session {
        self.inner.store.snapshot()
    }

    pub fn freshness(&self) -> Freshness {
        evaluate(
            &self.inner.store.snapshot(),
            self.inner.store.now_millis(),
            self.inner.margins,
        )
    }

    pub fn device_id(&self) -> Result<String, AuthError> {
        Ok(self.inner.store.device_id()?)
    }

    /// Re-reads the persisted session, as a freshly started process would.
    pub fn reload_from_storage(&self) -> Session {
        self.inner.store.load()
    }

    /// JSON headers, plus a bearer token when `require_auth` is set and the
    /// access token is valid right now.
    ///
    /// A missing or expired access token kicks off a background freshness
    /// check and the headers go out without credentials; use
    /// [`SessionManager::authorized_headers`] to wait for renewal instead.
    pub fn get_headers(&self, require_auth: bool) -> HeaderMap {
        let (headers, access_valid) = self.headers(require_auth);
        if !access_valid {
            self.spawn_freshness_check();
        }
        headers
    }

    pub async fn authorized_headers(&self) -> HeaderMap {
        self.ensure_fresh().await;
        self.headers(true).0
    }

    pub async fn current_device_tokens(&self) -> DeviceTokens {
        self.ensure_fresh().await;
        let session = self.inner.store.snapshot();
        DeviceTokens {
            access_token: session.access.map(|access| access.token),
            refresh_token: session.refresh.map(|refresh| refresh.token),
        }
    }

    fn headers(&self, require_auth: bool) -> (HeaderMap, bool) {
        let mut headers = json_headers();
        let now = self.inner.store.now_millis();
        let session = self.inner.store.snapshot();
        let Some(access) = session.access.filter(|access| access.is_valid_at(now)) else {
            return (headers, false);
        };
        if require_auth {
            match HeaderValue::from_str(&format!("Bearer {}", access.token)) {
                Ok(mut value) => {
                    value.set_sensitive(true);
                    headers.insert(AUTHORIZATION, value);
                }
                Err(_) => tracing::warn!("Access token is not a valid header value"),
            }
        }
        (headers, true)
    }

    fn spawn_freshness_check(&self) {
        if self.freshness() == Freshness::SignedOut {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let session = self.clone();
                handle.spawn(async move {
                    session.check_token_expiry().await;
                });
            }
            Err(_) => tracing::debug!("No async runtime; skipping background freshness check"),
        }
    }

    /// One scheduler cycle: leave fresh sessions alone, renew stale ones,
    /// end sessions whose refresh token has run out.
    pub async fn check_token_expiry(&self) -> Freshness {
        let freshness = self.freshness();
        tracing::debug!(?freshness, "Checked token freshness");
        if matches!(freshness, Freshness::NeedsRefresh | Freshness::Expired) {
            self.ensure_fresh().await;
        }
        freshness
    }

    /// Waits for any in-flight refresh and renews the access token only if
    /// it still needs it. Returns whether a usable access token is held
    /// afterwards.
    pub async fn ensure_fresh(&self) -> bool {
        match self.freshness() {
            Freshness::Fresh => return true,
            Freshness::SignedOut => return false,
            Freshness::NeedsRefresh | Freshness::Expired => {}
        }

        let mut completed = self.inner.refresh_gate.lock().await;
        // a refresh that finished while we waited has already done the work
        match self.freshness() {
            Freshness::Fresh => true,
            Freshness::SignedOut => false,
            Freshness::Expired => {
                self.force_logout(LogoutReason::RefreshExpired);
                false
            }
            Freshness::NeedsRefresh => self.refresh_locked(&mut completed).await,
        }
    }

    /// Renews the token pair. Concurrent callers share a single network
    /// call. Failure ends the session instead of returning an error.
    pub async fn refresh(&self) -> bool {
        let observed = self.inner.completed_refreshes.load(Ordering::SeqCst);
        let mut completed = self.inner.refresh_gate.lock().await;
        if *completed != observed {
            return self.inner.last_refresh_ok.load(Ordering::SeqCst);
        }
        self.refresh_locked(&mut completed).await
    }

    async fn refresh_locked(&self, completed: &mut u64) -> bool {
        let session = self.inner.store.snapshot();
        let Some(refresh) = session.refresh else {
            return self.finish_refresh(completed, false);
        };

        if !refresh.is_valid_at(self.inner.store.now_millis()) {
            tracing::info!("Refresh token expired; ending session without renewal");
            self.force_logout(LogoutReason::RefreshExpired);
            return self.finish_refresh(completed, false);
        }

        let device_id = match self.inner.store.device_id() {
            Ok(device_id) => device_id,
            Err(err) => {
                tracing::warn!(error = %err, "Could not resolve device id for refresh");
                self.force_logout(LogoutReason::RefreshFailed);
                return self.finish_refresh(completed, false);
            }
        };

        let request = DeviceTokenRequest {
            refresh_token: refresh.token,
            device_id,
        };
        let result = {
            let _flag = RefreshFlag::raise(&self.inner.refreshing);
            tracing::debug!("Refreshing access token");
            self.inner
                .api
                .refresh_token(&request, self.headers(true).0)
                .await
        };

        let ok = match result {
            Ok(response) => match self.inner.store.save(&response) {
                Ok(_) => {
                    tracing::info!(user_id = %response.user.id, "Access token refreshed");
                    self.emit(AuthEvent::Refreshed);
                    true
                }
                Err(err) => {
                    tracing::warn!(error = %err, "Failed to persist refreshed session");
                    self.force_logout(LogoutReason::RefreshFailed);
                    false
                }
            },
            Err(err) => {
                tracing::warn!(kind = err.kind(), error = %err, "Token refresh failed");
                self.force_logout(LogoutReason::RefreshFailed);
                false
            }
        };
        self.finish_refresh(completed, ok)
    }

    fn finish_refresh(&self, completed: &mut u64, ok: bool) -> bool {
        *completed += 1;
        self.inner.last_refresh_ok.store(ok, Ordering::SeqCst);
        self.inner
            .completed_refreshes
            .store(*completed, Ordering::SeqCst);
        ok
    }

    fn force_logout(&self, reason: LogoutReason) {
        if let Err(err) = self.inner.store.clear() {
            tracing::warn!(error = %err, "Failed to clear persisted session");
        }
        tracing::info!(?reason, "Session ended");
        self.emit(AuthEvent::LoggedOut { reason });
    }

    fn emit(&self, event: AuthEvent) {
        // no subscribers is fine
        let _ = self.inner.events.send(event);
    }

    pub async fn login(&self, request: LoginRequest) -> Result<User, AuthError> {
        let device_info = DeviceInfo {
            device_id: self.inner.store.device_id()?,
            user_agent: self.inner.user_agent.clone(),
        };
        let _gate = self.inner.refresh_gate.lock().await;

        let response = match self.inner.api.login(&request, device_info).await {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(kind = err.kind(), error = %err, "Login failed");
                return Err(err);
            }
        };
        self.inner.store.save(&response)?;

        tracing::info!(user_id = %response.user.id, role = %response.user.role, "Logged in");
        self.emit(AuthEvent::LoggedIn {
            user: response.user.clone(),
        });
        Ok(response.user)
    }

    /// Resumes the stored session, logging in with `credentials` when it
    /// cannot be kept fresh, and returns an event receiver opened afterwards.
    ///
    /// Events raised while resuming (a stale session being ended) are not
    /// delivered to the returned receiver.
    pub async fn resume_or_login<F>(
        &self,
        credentials: F,
    ) -> anyhow::Result<broadcast::Receiver<AuthEvent>>
    where
        F: FnOnce() -> anyhow::Result<LoginRequest>,
    {
        if !self.ensure_fresh().await {
            let request = credentials()?;
            self.login(request).await?;
        }
        Ok(self.subscribe())
    }

    /// Ends the session. The server is told on a best-effort basis; local
    /// state, including the device id, is cleared regardless.
    pub async fn logout(&self, force_reload: bool) {
        let _gate = self.inner.refresh_gate.lock().await;
        let session = self.inner.store.snapshot();
        let now = self.inner.store.now_millis();

        // lapsed refresh tokens are not sent
        if let Some(refresh) = session.refresh.filter(|refresh| refresh.is_valid_at(now)) {
            match self.inner.store.device_id() {
                Ok(device_id) => {
                    let request = DeviceTokenRequest {
                        refresh_token: refresh.token,
                        device_id,
                    };
                    if let Err(err) = self.inner.api.logout(&request, self.headers(true).0).await {
                        tracing::warn!(error = %err, "Logout notification failed; clearing local session anyway");
                    }
                }
                Err(err) => {
                    tracing::warn!(error = %err, "Could not resolve device id for logout")
                }
            }
        }

        if let Err(err) = self.inner.store.clear() {
            tracing::warn!(error = %err, "Failed to clear persisted session");
        }
        if let Err(err) = self.inner.store.clear_device_id() {
            tracing::warn!(error = %err, "Failed to clear device id");
        }
        tracing::info!(force_reload, "Logged out");

        self.emit(if force_reload {
            AuthEvent::ReloadRequested
        } else {
            AuthEvent::LoggedOut {
                reason: LogoutReason::UserRequested,
            }
        });
    }

    pub async fn forgot_password(
        &self,
        email: impl Into<String>,
    ) -> Result<MessageResponse, AuthError> {
        let request = ForgotPasswordRequest {
            email: email.into(),
        };
        self.inner
            .api
            .forgot_password(&request, json_headers())
            .await
    }

    pub async fn reset_password(
        &self,
        mut request: ResetPasswordRequest,
    ) -> Result<MessageResponse, AuthError> {
        if request.confirm_new_password.is_empty() {
            request.confirm_new_password = request.new_password.clone();
        }
        self.inner
            .api
            .reset_password(&request, json_headers())
            .await
    }

    /// Does not end or renew the current session.
    pub async fn change_password(
        &self,
        request: ChangePasswordRequest,
    ) -> Result<MessageResponse, AuthError> {
        let headers = self.authorized_headers().await;
        self.inner.api.change_password(&request, headers).await
    }
}
