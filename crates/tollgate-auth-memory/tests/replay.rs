//! Nonce and JTI replay protection.

use std::sync::Arc;

use time::Duration;
use tokio::task::JoinSet;
use tollgate_auth::config::ReplayConfig;
use tollgate_auth::services::ReplayGuard;
use tollgate_auth::types::ReplayStatus;
use tollgate_auth::{Clock, ManualClock};
use tollgate_auth_memory::InMemoryAuthStorage;

fn setup() -> (Arc<ManualClock>, Arc<InMemoryAuthStorage>, ReplayGuard) {
    let clock = Arc::new(ManualClock::starting_now());
    let storage = Arc::new(InMemoryAuthStorage::with_clock(clock.clone()));
    let guard = ReplayGuard::new(storage.clone(), storage.clone(), &ReplayConfig::default());
    (clock, storage, guard)
}

#[tokio::test]
async fn test_nonce_consumed_once() {
    let (_clock, storage, guard) = setup();
    let nonce = guard.issue_nonce("access-token-1").await.unwrap();

    guard.consume_nonce("access-token-1", &nonce).await.unwrap();
    let err = guard
        .consume_nonce("access-token-1", &nonce)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(storage.nonce_count().await, 0);
}

#[tokio::test]
async fn test_nonce_bound_to_token() {
    let (_clock, _storage, guard) = setup();
    let nonce = guard.issue_nonce("access-token-1").await.unwrap();

    let err = guard
        .consume_nonce("access-token-2", &nonce)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    guard.consume_nonce("access-token-1", &nonce).await.unwrap();
}

#[tokio::test]
async fn test_expired_nonce_is_removed() {
    let (clock, storage, guard) = setup();
    let nonce = guard
        .issue_nonce_with_ttl("access-token-1", Duration::seconds(30))
        .await
        .unwrap();

    clock.advance(Duration::seconds(30));
    let err = guard
        .consume_nonce("access-token-1", &nonce)
        .await
        .unwrap_err();
    assert!(err.is_expired());
    assert_eq!(storage.nonce_count().await, 0);

    let err = guard
        .consume_nonce("access-token-1", &nonce)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_jti_window() {
    let (clock, _storage, guard) = setup();
    let expires_at = clock.now() + Duration::minutes(5);

    assert_eq!(guard.check_assertion("jti-1").await.unwrap(), ReplayStatus::Free);
    guard.record_assertion("jti-1", expires_at).await.unwrap();
    assert_eq!(guard.check_assertion("jti-1").await.unwrap(), ReplayStatus::Known);

    let err = guard.record_assertion("jti-1", expires_at).await.unwrap_err();
    assert!(err.is_replay());

    clock.advance(Duration::minutes(5));
    assert_eq!(guard.check_assertion("jti-1").await.unwrap(), ReplayStatus::Free);

    // Past its window the same JTI may be recorded again.
    guard
        .record_assertion("jti-1", clock.now() + Duration::minutes(5))
        .await
        .unwrap();
    assert!(guard.check_assertion("jti-1").await.unwrap().is_known());
}

#[tokio::test]
async fn test_purge_expired() {
    let (clock, storage, guard) = setup();
    guard
        .issue_nonce_with_ttl("t", Duration::seconds(10))
        .await
        .unwrap();
    let keep = guard
        .issue_nonce_with_ttl("t", Duration::hours(1))
        .await
        .unwrap();
    guard
        .record_assertion("old", clock.now() + Duration::seconds(10))
        .await
        .unwrap();
    guard
        .record_assertion("new", clock.now() + Duration::hours(1))
        .await
        .unwrap();

    clock.advance(Duration::minutes(1));
    let report = guard.purge_expired().await.unwrap();
    assert_eq!(report.nonces, 1);
    assert_eq!(report.assertions, 1);
    assert_eq!(storage.nonce_count().await, 1);

    guard.consume_nonce("t", &keep).await.unwrap();
    assert!(guard.check_assertion("new").await.unwrap().is_known());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_nonce_consumption() {
    let (_clock, storage, guard) = setup();
    let guard = Arc::new(guard);
    let nonce = guard.issue_nonce("access-token-1").await.unwrap();

    let mut tasks = JoinSet::new();
    for _ in 0..16 {
        let guard = guard.clone();
        let nonce = nonce.clone();
        tasks.spawn(async move { guard.consume_nonce("access-token-1", &nonce).await });
    }

    let mut consumed = 0;
    while let Some(result) = tasks.join_next().await {
        match result.unwrap() {
            Ok(()) => consumed += 1,
            Err(e) => assert!(e.is_not_found(), "unexpected error: {e}"),
        }
    }
    assert_eq!(consumed, 1);
    assert_eq!(storage.nonce_count().await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_assertion_recording() {
    let (clock, _storage, guard) = setup();
    let guard = Arc::new(guard);
    let expires_at = clock.now() + Duration::minutes(5);

    let mut tasks = JoinSet::new();
    for _ in 0..16 {
        let guard = guard.clone();
        tasks.spawn(async move { guard.record_assertion("jti-race", expires_at).await });
    }

    let mut recorded = 0;
    while let Some(result) = tasks.join_next().await {
        match result.unwrap() {
            Ok(()) => recorded += 1,
            Err(e) => assert!(e.is_replay(), "unexpected error: {e}"),
        }
    }
    assert_eq!(recorded, 1);
    assert_eq!(
        guard.check_assertion("jti-race").await.unwrap(),
        ReplayStatus::Known
    );
}
