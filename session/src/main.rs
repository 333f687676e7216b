use anyhow::Context;
use std::{env, sync::Arc};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cohortflow_session::{
    utils::storage::FileStorage, AuthEvent, LoginRequest, SessionConfig, SessionManager,
};

fn mask_email(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) => {
            let prefix = local.chars().take(2).collect::<String>();
            format!("{}***@{}", prefix, domain)
        }
        None => "<invalid>".into(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cohortflow_session=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = SessionConfig::load()?;
    tracing::info!(
        api_base_url = %config.api_base_url,
        refresh_interval_secs = config.refresh_interval_secs,
        access_token_margin_secs = config.access_token_margin_secs,
        refresh_token_margin_secs = config.refresh_token_margin_secs,
        refresh_token_expiration_days = config.refresh_token_expiration_days,
        storage_path = %config.storage_path.display(),
        "Loaded configuration from environment/.env"
    );

    let storage = FileStorage::open(&config.storage_path)
        .with_context(|| format!("opening {}", config.storage_path.display()))?;
    let session = SessionManager::new(&config, Arc::new(storage))?;
    let mut events = session
        .resume_or_login(|| {
            let email = env::var("COHORTFLOW_EMAIL")
                .context("no stored session and COHORTFLOW_EMAIL is not set")?;
            let password = env::var("COHORTFLOW_PASSWORD")
                .context("no stored session and COHORTFLOW_PASSWORD is not set")?;
            tracing::info!(email = %mask_email(&email), "Logging in");
            Ok(LoginRequest { email, password })
        })
        .await?;
    if let Some(user) = session.authenticated_user() {
        tracing::info!(user_id = %user.id, name = %user.name, role = %user.role, "Session active");
    }

    let scheduler = session.start_refresh_scheduler();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted; stopping refresh scheduler");
                break;
            }
            event = events.recv() => match event {
                Ok(AuthEvent::ReloadRequested) => {
                    let restored = session.reload_from_storage();
                    tracing::info!(signed_in = !restored.is_empty(), "Reloaded session from storage");
                    if restored.is_empty() {
                        break;
                    }
                }
                Ok(AuthEvent::LoggedOut { reason }) => {
                    tracing::info!(?reason, "Session ended; sign in again to continue");
                    break;
                }
                Ok(event) => tracing::debug!(?event, "Auth event"),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Dropped auth events");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    scheduler.shutdown().await;
    Ok(())
}
