use std::time::Duration;
use tokio::{
    sync::oneshot,
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};

use super::{manager::SessionManager, store::Session};

/// Outcome of one freshness evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// No tokens held; nothing to keep alive.
    SignedOut,
    Fresh,
    NeedsRefresh,
    /// The refresh token is gone or about to lapse; the session must end.
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Margins {
    pub access_millis: i64,
    pub refresh_millis: i64,
}

impl Default for Margins {
    fn default() -> Self {
        Self {
            access_millis: 60_000,
            refresh_millis: 60_000,
        }
    }
}

pub fn evaluate(session: &Session, now: i64, margins: Margins) -> Freshness {
    if session.access.is_none() && session.refresh.is_none() {
        return Freshness::SignedOut;
    }
    if let Some(access) = &session.access {
        if !access.expires_within(now, margins.access_millis) {
            return Freshness::Fresh;
        }
    }
    match &session.refresh {
        Some(refresh) if !refresh.expires_within(now, margins.refresh_millis) => {
            Freshness::NeedsRefresh
        }
        _ => Freshness::Expired,
    }
}

/// Background task that runs the session's freshness check on a fixed interval.
pub struct RefreshScheduler {
    stop: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl RefreshScheduler {
    pub fn start(session: SessionManager, interval: Duration) -> Self {
        let (stop, mut stopped) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // the first tick completes immediately; the first check runs one interval in
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = &mut stopped => break,
                    _ = ticker.tick() => {
                        let freshness = session.check_token_expiry().await;
                        tracing::trace!(?freshness, "Refresh scheduler tick");
                    }
                }
            }
            tracing::debug!("Refresh scheduler stopped");
        });
        tracing::debug!(interval_ms = interval.as_millis() as u64, "Refresh scheduler started");
        Self {
            stop: Some(stop),
            handle: Some(handle),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Stops the loop, letting an in-flight check finish first.
    pub async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            if let Err(err) = handle.await {
                tracing::warn!(error = %err, "Refresh scheduler task ended abnormally");
            }
        }
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
