use cohortflow_session::{
    guard::{authorize, GuardDecision},
    session::{store::ACCESS_TOKEN_KEY, Freshness},
    utils::storage::{KeyValueStore, MemoryStorage},
    AuthEvent, LogoutReason, RefreshScheduler,
};
use httpmock::prelude::*;
use serde_json::json;
use std::{sync::Arc, time::Duration};

mod support;
use support::*;

const TICK: Duration = Duration::from_millis(50);

#[tokio::test]
async fn scheduler_renews_stale_token_once_then_ends_lapsed_session() {
    let server = MockServer::start_async().await;
    let h = harness_with_storage(
        &server,
        seeded_storage(NOW + HOUR_MILLIS, NOW + WEEK_MILLIS, "admin"),
    );
    let refresh = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/v1/users/refresh-token")
                .header("authorization", "Bearer access-1");
            then.status(200)
                .json_body(session_json("access-2", "refresh-2", 3600));
        })
        .await;
    let mut events = h.session.subscribe();
    let scheduler = RefreshScheduler::start(h.session.clone(), TICK);
    assert!(scheduler.is_running());

    // inside the access margin but not yet expired, so the bearer still goes out
    h.clock.advance(Duration::from_millis((HOUR_MILLIS - 30_000) as u64));
    assert_eq!(next_event(&mut events).await, AuthEvent::Refreshed);
    assert_eq!(h.session.freshness(), Freshness::Fresh);

    tokio::time::sleep(TICK * 4).await;
    refresh.assert_hits_async(1).await;

    h.clock.advance(Duration::from_millis(WEEK_MILLIS as u64));
    assert_eq!(
        next_event(&mut events).await,
        AuthEvent::LoggedOut {
            reason: LogoutReason::RefreshExpired
        }
    );
    assert_eq!(h.storage.get_item(ACCESS_TOKEN_KEY).unwrap(), None);
    refresh.assert_hits_async(1).await;

    scheduler.shutdown().await;
}

#[tokio::test]
async fn stopped_scheduler_no_longer_checks() {
    let server = MockServer::start_async().await;
    let h = harness_with_storage(
        &server,
        seeded_storage(NOW + HOUR_MILLIS, NOW + WEEK_MILLIS, "admin"),
    );
    let refresh = server
        .mock_async(|when, then| {
            when.method(POST).path("/api/v1/users/refresh-token");
            then.status(200)
                .json_body(session_json("access-2", "refresh-2", 3600));
        })
        .await;
    let scheduler = h.session.start_refresh_scheduler();

    scheduler.shutdown().await;
    h.clock.advance(Duration::from_millis(HOUR_MILLIS as u64));
    tokio::time::sleep(TICK * 4).await;

    refresh.assert_hits_async(0).await;
    assert_eq!(h.session.freshness(), Freshness::NeedsRefresh);
}

#[tokio::test]
async fn guard_allows_matching_role_and_rejects_others() {
    let server = MockServer::start_async().await;
    let admin = harness_with_storage(
        &server,
        seeded_storage(NOW + HOUR_MILLIS, NOW + WEEK_MILLIS, "admin"),
    );
    let learner = harness_with_storage(
        &server,
        seeded_storage(NOW + HOUR_MILLIS, NOW + WEEK_MILLIS, "learner"),
    );

    assert_eq!(authorize(&admin.session, None).await, GuardDecision::Allow);
    assert_eq!(
        authorize(&admin.session, Some(&["admin", "instructor"][..])).await,
        GuardDecision::Allow
    );
    assert_eq!(
        authorize(&learner.session, Some(&["admin"][..])).await,
        GuardDecision::Unauthorized
    );
}

#[tokio::test]
async fn guard_redirects_signed_out_users_without_network() {
    let server = MockServer::start_async().await;
    let h = harness_with_storage(&server, Arc::new(MemoryStorage::new()));
    let refresh = server
        .mock_async(|when, then| {
            when.method(POST).path("/api/v1/users/refresh-token");
            then.status(200)
                .json_body(session_json("access-2", "refresh-2", 3600));
        })
        .await;

    assert_eq!(
        authorize(&h.session, Some(&["admin"][..])).await,
        GuardDecision::RedirectToLogin
    );
    refresh.assert_hits_async(0).await;
}

#[tokio::test]
async fn guard_renews_expired_access_before_deciding() {
    let server = MockServer::start_async().await;
    let h = harness_with_storage(&server, seeded_storage(NOW - 1, NOW + WEEK_MILLIS, "admin"));
    let refresh = server
        .mock_async(|when, then| {
            when.method(POST).path("/api/v1/users/refresh-token");
            then.status(200)
                .json_body(session_json("access-2", "refresh-2", 3600));
        })
        .await;

    assert_eq!(authorize(&h.session, Some(&["admin"][..])).await, GuardDecision::Allow);
    refresh.assert_hits_async(1).await;
}

#[tokio::test]
async fn guard_redirects_when_renewal_is_rejected() {
    let server = MockServer::start_async().await;
    let h = harness_with_storage(&server, seeded_storage(NOW - 1, NOW + WEEK_MILLIS, "admin"));
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/v1/users/refresh-token");
            then.status(401).json_body(json!({ "message": "Session revoked" }));
        })
        .await;
    let mut events = h.session.subscribe();

    assert_eq!(authorize(&h.session, None).await, GuardDecision::RedirectToLogin);
    assert_eq!(
        next_event(&mut events).await,
        AuthEvent::LoggedOut {
            reason: LogoutReason::RefreshFailed
        }
    );
}
