//! Artifact lifecycle against the in-memory backend.

use std::sync::Arc;

use time::Duration;
use tollgate_auth::types::{PushedRequestDetails, TokenKind};
use tollgate_auth::{
    Artifact, ArtifactKind, ArtifactStorage, Client, ClientStorage, Clock, ManualClock, Session,
};
use tollgate_auth_memory::InMemoryAuthStorage;

fn setup() -> (Arc<ManualClock>, Arc<InMemoryAuthStorage>) {
    let clock = Arc::new(ManualClock::starting_now());
    let storage = Arc::new(InMemoryAuthStorage::with_clock(clock.clone()));
    (clock, storage)
}

fn code_artifact(clock: &ManualClock, key: &str) -> Artifact {
    let mut artifact = Artifact::new(ArtifactKind::AuthorizationCode, "req-1", key, clock.now());
    artifact.client_id = Some("app".into());
    artifact.requested_scopes = vec!["openid".into(), "profile".into(), "openid".into()];
    artifact.granted_scopes = vec!["openid".into()];
    artifact
        .form
        .insert("redirect_uri".into(), vec!["https://app.test/cb".into()]);
    artifact
}

#[tokio::test]
async fn test_create_and_find_active() {
    let (clock, storage) = setup();
    storage.insert_client(&Client::new("app")).await.unwrap();

    let mut session = Session::new("app", "alice");
    session.set_expires_at(TokenKind::AuthorizeCode, time::OffsetDateTime::now_utc());
    let artifact = code_artifact(&clock, "sig-1");
    storage.create(&artifact, Some(&session)).await.unwrap();

    let lookup = storage
        .find_by_key(ArtifactKind::AuthorizationCode, "sig-1")
        .await
        .unwrap();
    assert!(!lookup.is_invalidated());

    let stored = lookup.into_active().unwrap();
    assert_eq!(stored.artifact.request_id, "req-1");
    assert_eq!(stored.artifact.session_id, Some(session.id));
    // Scope lists come back exactly as stored, duplicates included.
    assert_eq!(
        stored.artifact.requested_scopes,
        vec!["openid", "profile", "openid"]
    );
    assert_eq!(stored.client.map(|c| c.client_id), Some("app".to_string()));
    assert_eq!(stored.session.map(|s| s.subject), Some("alice".to_string()));
    assert!(stored.user.is_none());
}

#[tokio::test]
async fn test_duplicate_key_conflicts() {
    let (clock, storage) = setup();
    let artifact = code_artifact(&clock, "sig-1");
    storage.create(&artifact, None).await.unwrap();

    let err = storage.create(&artifact, None).await.unwrap_err();
    assert!(err.is_conflict());

    // Same key under another kind is a different record.
    let mut token = artifact.clone();
    token.kind = ArtifactKind::AccessToken;
    storage.create(&token, None).await.unwrap();
}

#[tokio::test]
async fn test_invalidate_keeps_record() {
    let (clock, storage) = setup();
    storage
        .create(&code_artifact(&clock, "sig-1"), None)
        .await
        .unwrap();

    storage
        .invalidate(ArtifactKind::AuthorizationCode, "sig-1")
        .await
        .unwrap();
    storage
        .invalidate(ArtifactKind::AuthorizationCode, "sig-1")
        .await
        .unwrap();

    let lookup = storage
        .find_by_key(ArtifactKind::AuthorizationCode, "sig-1")
        .await
        .unwrap();
    assert!(lookup.is_invalidated());
    assert_eq!(lookup.record().artifact.request_id, "req-1");
    assert!(lookup.into_active().unwrap_err().is_invalidated());
}

#[tokio::test]
async fn test_missing_and_soft_deleted_are_not_found() {
    let (clock, storage) = setup();
    let err = storage
        .find_by_key(ArtifactKind::RefreshToken, "nope")
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(
        storage
            .invalidate(ArtifactKind::RefreshToken, "nope")
            .await
            .unwrap_err()
            .is_not_found()
    );

    storage
        .create(&code_artifact(&clock, "sig-1"), None)
        .await
        .unwrap();
    assert!(
        storage
            .soft_delete_artifact(ArtifactKind::AuthorizationCode, "sig-1")
            .await
    );
    let err = storage
        .find_by_key(ArtifactKind::AuthorizationCode, "sig-1")
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    // A soft-deleted key still blocks reuse.
    let err = storage
        .create(&code_artifact(&clock, "sig-1"), None)
        .await
        .unwrap_err();
    assert!(err.is_conflict());
}

#[tokio::test]
async fn test_delete_removes_artifact_and_session() {
    let (clock, storage) = setup();
    let session = Session::new("app", "alice");
    storage
        .create(&code_artifact(&clock, "sig-1"), Some(&session))
        .await
        .unwrap();
    assert_eq!(storage.session_count().await, 1);

    storage
        .delete(ArtifactKind::AuthorizationCode, "sig-1")
        .await
        .unwrap();
    assert_eq!(storage.session_count().await, 0);
    assert!(
        storage
            .find_by_key(ArtifactKind::AuthorizationCode, "sig-1")
            .await
            .unwrap_err()
            .is_not_found()
    );

    // Deleting again is a no-op.
    storage
        .delete(ArtifactKind::AuthorizationCode, "sig-1")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_delete_keeps_session_shared_with_other_artifacts() {
    let (clock, storage) = setup();
    let session = Session::new("app", "alice");
    let access = Artifact::new(ArtifactKind::AccessToken, "req-1", "at-1", clock.now());
    let refresh = Artifact::new(ArtifactKind::RefreshToken, "req-1", "rt-1", clock.now());
    storage.create(&access, Some(&session)).await.unwrap();
    storage.create(&refresh, Some(&session)).await.unwrap();
    assert_eq!(storage.session_count().await, 1);

    storage.delete(ArtifactKind::AccessToken, "at-1").await.unwrap();
    assert_eq!(storage.session_count().await, 1);
    let stored = storage
        .find_by_key(ArtifactKind::RefreshToken, "rt-1")
        .await
        .unwrap()
        .into_active()
        .unwrap();
    assert_eq!(stored.session.map(|s| s.id), Some(session.id));

    // A soft-deleted artifact no longer keeps the session alive.
    let oidc = Artifact::new(ArtifactKind::OpenIdConnect, "req-1", "oidc-1", clock.now());
    storage.create(&oidc, Some(&session)).await.unwrap();
    assert!(
        storage
            .soft_delete_artifact(ArtifactKind::OpenIdConnect, "oidc-1")
            .await
    );
    storage.delete(ArtifactKind::RefreshToken, "rt-1").await.unwrap();
    assert_eq!(storage.session_count().await, 0);
}

#[tokio::test]
async fn test_revoke_by_request_id() {
    let (clock, storage) = setup();
    for key in ["at-1", "at-2"] {
        let artifact = Artifact::new(ArtifactKind::AccessToken, "req-7", key, clock.now());
        storage.create(&artifact, None).await.unwrap();
    }
    let other = Artifact::new(ArtifactKind::AccessToken, "req-8", "at-3", clock.now());
    storage.create(&other, None).await.unwrap();

    let revoked = storage
        .revoke_by_request_id(ArtifactKind::AccessToken, "req-7")
        .await
        .unwrap();
    assert_eq!(revoked, 2);

    for key in ["at-1", "at-2"] {
        let lookup = storage
            .find_by_key(ArtifactKind::AccessToken, key)
            .await
            .unwrap();
        assert!(lookup.is_invalidated());
    }
    let untouched = storage
        .find_by_key(ArtifactKind::AccessToken, "at-3")
        .await
        .unwrap();
    assert!(!untouched.is_invalidated());

    let err = storage
        .revoke_by_request_id(ArtifactKind::RefreshToken, "req-7")
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_pushed_request_expiry_and_use() {
    let (clock, storage) = setup();
    let mut par = Artifact::new(
        ArtifactKind::PushedRequest,
        "req-par",
        "urn:ietf:params:oauth:request_uri:abc",
        clock.now(),
    );
    par.expires_at = Some(clock.now() + Duration::seconds(60));
    par.pushed = Some(PushedRequestDetails {
        redirect_uri: "https://app.test/cb".into(),
        response_mode: None,
        used: false,
    });
    storage.create(&par, None).await.unwrap();

    let lookup = storage
        .find_by_key(ArtifactKind::PushedRequest, &par.key)
        .await
        .unwrap();
    assert!(!lookup.is_invalidated());

    storage
        .invalidate(ArtifactKind::PushedRequest, &par.key)
        .await
        .unwrap();
    let lookup = storage
        .find_by_key(ArtifactKind::PushedRequest, &par.key)
        .await
        .unwrap();
    assert!(lookup.is_invalidated());
    assert!(lookup.record().artifact.pushed.as_ref().unwrap().used);

    clock.advance(Duration::seconds(61));
    let err = storage
        .find_by_key(ArtifactKind::PushedRequest, &par.key)
        .await
        .unwrap_err();
    assert!(err.is_expired());
}
