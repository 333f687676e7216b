use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, RwLock};
use uuid::Uuid;

use crate::{
    api::{LoginResponse, User},
    clock::Clock,
    utils::storage::{KeyValueStore, StorageError},
};

pub const ACCESS_TOKEN_KEY: &str = "accessToken";
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";
pub const ACCESS_EXPIRY_KEY: &str = "tokenExpiry";
pub const REFRESH_EXPIRY_KEY: &str = "refreshTokenExpiry";
pub const USER_KEY: &str = "user";
pub const DEVICE_ID_KEY: &str = "deviceId";

const SESSION_KEYS: [&str; 5] = [
    ACCESS_TOKEN_KEY,
    REFRESH_TOKEN_KEY,
    ACCESS_EXPIRY_KEY,
    REFRESH_EXPIRY_KEY,
    USER_KEY,
];

/// A credential together with the epoch millisecond it stops being valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpiringToken {
    pub token: String,
    pub expires_at: i64,
}

impl ExpiringToken {
    pub fn is_valid_at(&self, now: i64) -> bool {
        now < self.expires_at
    }

    /// True once `now` is within `margin` milliseconds of expiry.
    pub fn expires_within(&self, now: i64, margin: i64) -> bool {
        now >= self.expires_at.saturating_sub(margin)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    pub access: Option<ExpiringToken>,
    pub refresh: Option<ExpiringToken>,
    pub user: Option<User>,
}

impl Session {
    pub fn is_empty(&self) -> bool {
        self.access.is_none() && self.refresh.is_none() && self.user.is_none()
    }

    pub fn is_authenticated_at(&self, now: i64) -> bool {
        self.access
            .as_ref()
            .map(|access| access.is_valid_at(now))
            .unwrap_or(false)
    }
}

/// Durable home of the session fields plus an in-memory mirror for
/// synchronous reads.
pub struct TokenStore {
    storage: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    refresh_window_millis: i64,
    session: RwLock<Session>,
    device_id: Mutex<Option<String>>,
}

impl TokenStore {
    pub fn new(
        storage: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        refresh_window_millis: i64,
    ) -> Self {
        let store = Self {
            storage,
            clock,
            refresh_window_millis,
            session: RwLock::new(Session::default()),
            device_id: Mutex::new(None),
        };
        store.load();
        store
    }

    /// Rebuilds the in-memory mirror from storage. Anything missing or
    /// malformed leaves the affected part of the session logged out.
    pub fn load(&self) -> Session {
        let read = |key: &str| match self.storage.get_item(key) {
            Ok(value) => value.filter(|v| !v.trim().is_empty()),
            Err(err) => {
                tracing::warn!(key, error = %err, "Failed to read session entry");
                None
            }
        };
        let pair = |token_key: &str, expiry_key: &str| -> Option<ExpiringToken> {
            let token = read(token_key)?;
            let expires_at = read(expiry_key)?.trim().parse::<i64>().ok()?;
            Some(ExpiringToken { token, expires_at })
        };

        let user = read(USER_KEY)
            .and_then(|raw| serde_json::from_str::<User>(&raw).ok())
            .filter(|user| !user.id.trim().is_empty());
        let mut access = pair(ACCESS_TOKEN_KEY, ACCESS_EXPIRY_KEY);
        if user.is_none() {
            access = None;
        }
        let refresh = pair(REFRESH_TOKEN_KEY, REFRESH_EXPIRY_KEY);
        let user = if access.is_some() || refresh.is_some() {
            user
        } else {
            None
        };

        let session = Session {
            access,
            refresh,
            user,
        };
        *self.session.write().unwrap_or_else(|p| p.into_inner()) = session.clone();
        *self.device_id.lock().unwrap_or_else(|p| p.into_inner()) = read(DEVICE_ID_KEY);
        session
    }

    /// Stores the token triple from a login or refresh response.
    ///
    /// Storage is written in one batch before the mirror is swapped; on a
    /// storage failure neither changes.
    pub fn save(&self, response: &LoginResponse) -> Result<Session, StorageError> {
        let now = self.clock.now_millis();
        let expires_in = i64::try_from(response.expires_in).unwrap_or(i64::MAX);
        let access_expiry = now.saturating_add(expires_in.saturating_mul(1_000));
        let refresh_expiry = now.saturating_add(self.refresh_window_millis);
        let user_json = serde_json::to_string(&response.user)?;

        self.storage.set_items(&[
            (ACCESS_TOKEN_KEY, response.access_token.clone()),
            (REFRESH_TOKEN_KEY, response.refresh_token.clone()),
            (ACCESS_EXPIRY_KEY, access_expiry.to_string()),
            (REFRESH_EXPIRY_KEY, refresh_expiry.to_string()),
            (USER_KEY, user_json),
        ])?;

        let session = Session {
            access: Some(ExpiringToken {
                token: response.access_token.clone(),
                expires_at: access_expiry,
            }),
            refresh: Some(ExpiringToken {
                token: response.refresh_token.clone(),
                expires_at: refresh_expiry,
            }),
            user: Some(response.user.clone()),
        };
        *self.session.write().unwrap_or_else(|p| p.into_inner()) = session.clone();
        Ok(session)
    }

    /// Drops every session field from storage, then from memory. The device
    /// id stays. On a storage failure the mirror keeps matching storage.
    pub fn clear(&self) -> Result<(), StorageError> {
        self.storage.remove_items(&SESSION_KEYS)?;
        *self.session.write().unwrap_or_else(|p| p.into_inner()) = Session::default();
        Ok(())
    }

    pub fn snapshot(&self) -> Session {
        self.session
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub fn now_millis(&self) -> i64 {
        self.clock.now_millis()
    }

    /// Returns the persisted device id, minting `device-<random>` on first use.
    pub fn device_id(&self) -> Result<String, StorageError> {
        let mut slot = self.device_id.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(existing) = slot.as_ref() {
            return Ok(existing.clone());
        }
        if let Some(stored) = self
            .storage
            .get_item(DEVICE_ID_KEY)?
            .filter(|id| !id.trim().is_empty())
        {
            *slot = Some(stored.clone());
            return Ok(stored);
        }
        let minted = format!("device-{}", Uuid::new_v4().simple());
        self.storage.set_item(DEVICE_ID_KEY, &minted)?;
        *slot = Some(minted.clone());
        Ok(minted)
    }

    pub fn clear_device_id(&self) -> Result<(), StorageError> {
        *self.device_id.lock().unwrap_or_else(|p| p.into_inner()) = None;
        self.storage.remove_item(DEVICE_ID_KEY)
    }
}
