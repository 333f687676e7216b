use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_API_BASE_URL: &str = "http://localhost:3000/api/v1";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub api_base_url: String,
    pub refresh_interval_secs: u64,
    pub access_token_margin_secs: u64,
    pub refresh_token_margin_secs: u64,
    pub refresh_token_expiration_days: u64,
    pub request_timeout_secs: u64,
    pub storage_path: PathBuf,
    pub user_agent: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            refresh_interval_secs: 30,
            access_token_margin_secs: 60,
            refresh_token_margin_secs: 60,
            refresh_token_expiration_days: 7,
            request_timeout_secs: 15,
            storage_path: PathBuf::from(".cohortflow/session.json"),
            user_agent: default_user_agent(),
        }
    }
}

fn default_user_agent() -> String {
    format!("cohortflow-session/{}", env!("CARGO_PKG_VERSION"))
}

impl SessionConfig {
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from an arbitrary variable source, falling back to
    /// defaults for anything absent or unparsable.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let number = |key: &str, fallback: u64| -> u64 {
            lookup(key)
                .and_then(|value| value.trim().parse().ok())
                .unwrap_or(fallback)
        };

        let api_base_url = lookup("API_BASE_URL")
            .unwrap_or_else(|| defaults.api_base_url.clone())
            .trim()
            .trim_end_matches('/')
            .to_string();
        if api_base_url.is_empty() {
            return Err(anyhow!("API_BASE_URL must not be empty"));
        }

        Ok(Self {
            api_base_url,
            refresh_interval_secs: number("REFRESH_INTERVAL_SECS", defaults.refresh_interval_secs)
                .max(1),
            access_token_margin_secs: number(
                "ACCESS_TOKEN_MARGIN_SECS",
                defaults.access_token_margin_secs,
            ),
            refresh_token_margin_secs: number(
                "REFRESH_TOKEN_MARGIN_SECS",
                defaults.refresh_token_margin_secs,
            ),
            refresh_token_expiration_days: number(
                "REFRESH_TOKEN_EXPIRATION_DAYS",
                defaults.refresh_token_expiration_days,
            ),
            request_timeout_secs: number("REQUEST_TIMEOUT_SECS", defaults.request_timeout_secs)
                .max(1),
            storage_path: lookup("SESSION_STORE_PATH")
                .filter(|path| !path.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.storage_path),
            user_agent: lookup("SESSION_USER_AGENT")
                .filter(|agent| !agent.trim().is_empty())
                .unwrap_or(defaults.user_agent),
        })
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn access_token_margin_millis(&self) -> i64 {
        self.access_token_margin_secs as i64 * 1_000
    }

    pub fn refresh_token_margin_millis(&self) -> i64 {
        self.refresh_token_margin_secs as i64 * 1_000
    }

    pub fn refresh_window_millis(&self) -> i64 {
        self.refresh_token_expiration_days as i64 * 86_400_000
    }
}
