//! Registration, verification codes and account promotion.

use std::sync::Arc;

use async_trait::async_trait;
use time::Duration;
use tokio::sync::mpsc;
use tokio_test::{assert_err, assert_ok};
use tollgate_auth::config::{AccountsConfig, VerificationConfig};
use tollgate_auth::services::{
    FixedCodeGenerator, PromotionService, RegistrationRequest, RegistrationService,
    UserAuthenticator, VerificationService,
};
use tollgate_auth::types::{PlannedTarget, PromotionOutcome, TemporaryAccount};
use tollgate_auth::validation::ALLOWED_ROLES;
use tollgate_auth::{
    AccountStorage, AuthError, AuthResult, Clock, ManualClock, SubjectKind, SubjectRef,
    VerificationMailer, VerificationMessage,
};
use tollgate_auth_memory::InMemoryAuthStorage;
use uuid::Uuid;

const CODE: &str = "042613";

/// Forwards every message to a channel.
struct ChannelMailer(mpsc::UnboundedSender<VerificationMessage>);

#[async_trait]
impl VerificationMailer for ChannelMailer {
    async fn send_verification(&self, message: &VerificationMessage) -> AuthResult<()> {
        let _ = self.0.send(message.clone());
        Ok(())
    }
}

struct Harness {
    clock: Arc<ManualClock>,
    storage: Arc<InMemoryAuthStorage>,
    verification: Arc<VerificationService>,
    registration: RegistrationService,
    promotion: PromotionService,
    outbox: mpsc::UnboundedReceiver<VerificationMessage>,
}

fn harness() -> Harness {
    let clock = Arc::new(ManualClock::starting_now());
    let storage = Arc::new(InMemoryAuthStorage::with_clock(clock.clone()));
    let (tx, outbox) = mpsc::unbounded_channel();

    let verification = Arc::new(
        VerificationService::new(
            storage.clone(),
            storage.clone(),
            Arc::new(ChannelMailer(tx)),
            clock.clone(),
            &VerificationConfig::default(),
        )
        .with_generator(Arc::new(FixedCodeGenerator(CODE.to_string()))),
    );
    let registration = RegistrationService::new(storage.clone(), verification.clone(), clock.clone());
    let promotion = PromotionService::new(
        storage.clone(),
        verification.clone(),
        AccountsConfig::default(),
        clock.clone(),
    );

    Harness {
        clock,
        storage,
        verification,
        registration,
        promotion,
        outbox,
    }
}

fn request(kind: SubjectKind, username: &str) -> RegistrationRequest {
    RegistrationRequest {
        kind,
        username: username.to_string(),
        email: format!("{username}@school.test"),
        password: "Str0ng!pass".to_string(),
        subject_name: (kind == SubjectKind::TeacherTemp).then(|| "Mathematics".to_string()),
    }
}

async fn next_message(outbox: &mut mpsc::UnboundedReceiver<VerificationMessage>) -> VerificationMessage {
    tokio::time::timeout(std::time::Duration::from_secs(5), outbox.recv())
        .await
        .expect("mail not sent in time")
        .expect("mailer dropped")
}

#[tokio::test]
async fn test_student_registration_and_promotion() {
    let mut h = harness();
    let registration = h
        .registration
        .register(request(SubjectKind::StudentTemp, "alice"))
        .await
        .unwrap();
    assert!(!registration.refreshed);
    assert_eq!(registration.code.plain, CODE);
    assert_ne!(registration.code.record.code_hash, CODE);
    assert_eq!(h.storage.temporary_count(SubjectKind::StudentTemp).await, 1);

    let mail = next_message(&mut h.outbox).await;
    assert_eq!(mail.to, "alice@school.test");
    assert_eq!(mail.code, CODE);
    assert_eq!(mail.kind, SubjectKind::StudentTemp);

    let verified = h
        .promotion
        .verify_and_promote(SubjectKind::StudentTemp, registration.account.id, CODE)
        .await
        .unwrap();
    assert!(!verified.cleanup_pending);

    let Some(PromotionOutcome::Account { user, image }) = verified.outcome else {
        panic!("expected a permanent account");
    };
    assert_eq!(user.username, "alice");
    assert_eq!(user.role_name, "student");
    assert_eq!(user.password_hash, registration.account.password_hash);
    assert_eq!(image.user_id, user.id);
    assert_eq!(image.url, AccountsConfig::default().default_image_url());

    assert_eq!(h.storage.users().await.len(), 1);
    assert_eq!(h.storage.temporary_count(SubjectKind::StudentTemp).await, 0);
    let role = h.storage.role("student").await.unwrap();
    assert_eq!(role.id, user.role_id);

    // The temporary record and its code are gone.
    let err = h
        .promotion
        .verify_and_promote(SubjectKind::StudentTemp, registration.account.id, CODE)
        .await
        .unwrap_err();
    assert!(err.is_not_code());
}

#[tokio::test]
async fn test_expired_code_cannot_promote() {
    let h = harness();
    let registration = h
        .registration
        .register(request(SubjectKind::StudentTemp, "alice"))
        .await
        .unwrap();

    h.clock.advance(Duration::hours(1) + Duration::seconds(1));
    let err = h
        .promotion
        .verify_and_promote(SubjectKind::StudentTemp, registration.account.id, CODE)
        .await
        .unwrap_err();
    assert!(err.is_expired());
    assert!(err.allows_resend());
    assert!(h.storage.users().await.is_empty());
    assert_eq!(h.storage.temporary_count(SubjectKind::StudentTemp).await, 1);
}

#[tokio::test]
async fn test_wrong_code() {
    let h = harness();
    let registration = h
        .registration
        .register(request(SubjectKind::StudentTemp, "alice"))
        .await
        .unwrap();

    let err = h
        .promotion
        .verify_and_promote(SubjectKind::StudentTemp, registration.account.id, "000000")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::NotCode));
    assert!(!err.allows_resend());
}

#[tokio::test]
async fn test_wrong_code_against_expired_code() {
    let h = harness();
    let registration = h
        .registration
        .register(request(SubjectKind::StudentTemp, "alice"))
        .await
        .unwrap();

    h.clock.advance(Duration::hours(2));
    let err = h
        .promotion
        .verify_and_promote(SubjectKind::StudentTemp, registration.account.id, "000000")
        .await
        .unwrap_err();
    assert!(err.is_not_code(), "got {err:?}");

    // The right code still reports the expiry.
    let err = h
        .verification
        .verify(registration.account.subject(), CODE)
        .await
        .unwrap_err();
    assert!(err.is_expired());
}

#[tokio::test]
async fn test_wrong_code_against_used_code() {
    let h = harness();
    let registration = h
        .registration
        .register(request(SubjectKind::AdminTemp, "root"))
        .await
        .unwrap();
    let subject = registration.account.subject();

    let code = h.verification.verify(subject, CODE).await.unwrap();
    h.verification.mark_used(&code).await.unwrap();

    let err = h.verification.verify(subject, "000000").await.unwrap_err();
    assert!(err.is_not_code(), "got {err:?}");
    let err = h
        .promotion
        .verify_and_promote(SubjectKind::AdminTemp, registration.account.id, "000000")
        .await
        .unwrap_err();
    assert!(err.is_not_code(), "got {err:?}");
}

#[tokio::test]
async fn test_mark_used_once() {
    let h = harness();
    let registration = h
        .registration
        .register(request(SubjectKind::AdminTemp, "root"))
        .await
        .unwrap();
    let subject = registration.account.subject();

    let code = h.verification.verify(subject, CODE).await.unwrap();
    h.verification.mark_used(&code).await.unwrap();

    let err = h.verification.mark_used(&code).await.unwrap_err();
    assert!(err.is_already_used());
    let err = h.verification.verify(subject, CODE).await.unwrap_err();
    assert!(err.is_already_used());

    // Validation still finds the used code.
    let found = h.verification.validate(subject, CODE).await.unwrap();
    assert!(found.is_used());
}

#[tokio::test]
async fn test_reissue_resets_code() {
    let mut h = harness();
    let registration = h
        .registration
        .register(request(SubjectKind::StudentTemp, "alice"))
        .await
        .unwrap();
    next_message(&mut h.outbox).await;

    h.clock.advance(Duration::hours(2));
    let reissued = h
        .verification
        .reissue_for_username(SubjectKind::StudentTemp, "alice")
        .await
        .unwrap();
    assert_eq!(reissued.record.id, registration.code.record.id);
    assert!(reissued.record.expires_at > registration.code.record.expires_at);
    assert!(reissued.record.used_at.is_none());
    assert_eq!(next_message(&mut h.outbox).await.to, "alice@school.test");

    h.promotion
        .verify_and_promote(SubjectKind::StudentTemp, registration.account.id, CODE)
        .await
        .unwrap();

    let err = h
        .verification
        .reissue(SubjectKind::StudentTemp, Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_teacher_waits_for_approval() {
    let h = harness();
    let registration = h
        .registration
        .register(request(SubjectKind::TeacherTemp, "bob"))
        .await
        .unwrap();

    let verified = h
        .promotion
        .verify_and_promote(SubjectKind::TeacherTemp, registration.account.id, CODE)
        .await
        .unwrap();
    let Some(PromotionOutcome::AwaitingApproval(waiting)) = verified.outcome else {
        panic!("expected a waiting teacher");
    };
    assert_eq!(waiting.subject_name.as_deref(), Some("Mathematics"));
    assert_eq!(h.storage.teachers_waiting().await.len(), 1);
    assert!(h.storage.users().await.is_empty());
    assert_eq!(h.storage.temporary_count(SubjectKind::TeacherTemp).await, 0);
}

#[tokio::test]
async fn test_failed_cleanup_keeps_account() {
    let h = harness();
    h.storage.fail_points().fail_temporary_delete(true);
    let registration = h
        .registration
        .register(request(SubjectKind::StudentTemp, "carol"))
        .await
        .unwrap();

    let verified = h
        .promotion
        .verify_and_promote(SubjectKind::StudentTemp, registration.account.id, CODE)
        .await
        .unwrap();
    assert!(verified.cleanup_pending);
    assert!(verified.outcome.is_none());

    let users = h.storage.users().await;
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].id, verified.account_id);
    assert_eq!(h.storage.temporary_count(SubjectKind::StudentTemp).await, 1);

    // The code was consumed with the promotion.
    let err = h
        .verification
        .verify(registration.account.subject(), CODE)
        .await
        .unwrap_err();
    assert!(err.is_already_used());
}

#[tokio::test]
async fn test_storage_promote_reports_destroy() {
    let h = harness();
    h.storage.fail_points().fail_temporary_delete(true);
    let registration = h
        .registration
        .register(request(SubjectKind::StudentTemp, "dave"))
        .await
        .unwrap();

    let err = h
        .promotion
        .promote(registration.account.clone(), &registration.code.record)
        .await
        .unwrap_err();
    let AuthError::Destroy { temporary_id, .. } = &err else {
        panic!("expected destroy, got {err:?}");
    };
    assert_eq!(*temporary_id, registration.account.id);
    assert!(err.is_non_fatal());
}

#[tokio::test]
async fn test_scope_link_failure_does_not_block_promotion() {
    let h = harness();
    h.storage.fail_points().fail_scope_link(true);
    let registration = h
        .registration
        .register(request(SubjectKind::StudentTemp, "erin"))
        .await
        .unwrap();

    h.promotion
        .verify_and_promote(SubjectKind::StudentTemp, registration.account.id, CODE)
        .await
        .unwrap();
    let role = h.storage.role("student").await.unwrap();
    assert!(role.scopes.is_empty());
    assert_eq!(h.storage.users().await.len(), 1);
}

#[tokio::test]
async fn test_reregistration_refreshes_pending_account() {
    let h = harness();
    let first = h
        .registration
        .register(request(SubjectKind::StudentTemp, "alice"))
        .await
        .unwrap();

    let mut again = request(SubjectKind::StudentTemp, "alice");
    again.email = "alice.new@school.test".into();
    let second = h.registration.register(again).await.unwrap();
    assert!(second.refreshed);
    assert_eq!(second.account.id, first.account.id);

    let stored = h
        .storage
        .find_temporary(SubjectKind::StudentTemp, first.account.id)
        .await
        .unwrap();
    assert_eq!(stored.email, "alice.new@school.test");
    assert_eq!(h.storage.temporary_count(SubjectKind::StudentTemp).await, 1);
}

#[tokio::test]
async fn test_registration_conflicts_with_permanent_account() {
    let h = harness();
    let registration = h
        .registration
        .register(request(SubjectKind::StudentTemp, "alice"))
        .await
        .unwrap();
    h.promotion
        .verify_and_promote(SubjectKind::StudentTemp, registration.account.id, CODE)
        .await
        .unwrap();

    let err = h
        .registration
        .register(request(SubjectKind::TeacherTemp, "alice"))
        .await
        .unwrap_err();
    assert!(err.is_conflict());
}

#[tokio::test]
async fn test_permanent_user_reverification() {
    let h = harness();
    let registration = h
        .registration
        .register(request(SubjectKind::StudentTemp, "alice"))
        .await
        .unwrap();
    let verified = h
        .promotion
        .verify_and_promote(SubjectKind::StudentTemp, registration.account.id, CODE)
        .await
        .unwrap();

    let user_ref = SubjectRef::new(SubjectKind::User, verified.account_id);
    h.verification.issue(user_ref).await.unwrap();
    let again = h
        .promotion
        .verify_and_promote(SubjectKind::User, verified.account_id, CODE)
        .await
        .unwrap();
    assert_eq!(again.account_id, verified.account_id);
    assert!(again.outcome.is_none());
    assert_eq!(h.storage.users().await.len(), 1);

    let err = h.verification.verify(user_ref, CODE).await.unwrap_err();
    assert!(err.is_already_used());
}

#[tokio::test]
async fn test_promote_rejects_taken_username() {
    let h = harness();
    let clock_now = h.clock.now();
    let temporary = TemporaryAccount {
        id: Uuid::new_v4(),
        kind: SubjectKind::StudentTemp,
        username: "frank".into(),
        email: "frank@school.test".into(),
        password_hash: "hash".into(),
        subject_name: None,
        created_at: clock_now,
        updated_at: clock_now,
    };
    h.storage.create_temporary(&temporary).await.unwrap();
    let issued = h.verification.issue(temporary.subject()).await.unwrap();

    let mut twin = temporary.clone();
    twin.id = Uuid::new_v4();
    twin.kind = SubjectKind::AdminTemp;
    h.storage.create_temporary(&twin).await.unwrap();
    let twin_code = h.verification.issue(twin.subject()).await.unwrap();
    h.promotion
        .promote(twin.clone(), &twin_code.record)
        .await
        .unwrap();

    let err = h
        .promotion
        .promote(temporary.clone(), &issued.record)
        .await
        .unwrap_err();
    assert!(err.is_conflict());
    // Nothing was consumed by the failed attempt.
    assert!(!h
        .verification
        .validate(temporary.subject(), CODE)
        .await
        .unwrap()
        .is_used());
}

#[tokio::test]
async fn test_failed_code_write_leaves_no_pending_account() {
    let mut h = harness();
    h.storage.fail_points().fail_code_upsert(true);

    let err = assert_err!(
        h.registration
            .register(request(SubjectKind::StudentTemp, "alice"))
            .await
    );
    assert!(err.is_server_error());
    assert_eq!(h.storage.temporary_count(SubjectKind::StudentTemp).await, 0);
    assert!(h.outbox.try_recv().is_err());

    h.storage.fail_points().fail_code_upsert(false);
    let registration = assert_ok!(
        h.registration
            .register(request(SubjectKind::StudentTemp, "alice"))
            .await
    );
    assert!(!registration.refreshed);
}

#[tokio::test]
async fn test_failed_code_write_keeps_previous_registration() {
    let mut h = harness();
    let first = h
        .registration
        .register(request(SubjectKind::StudentTemp, "alice"))
        .await
        .unwrap();
    next_message(&mut h.outbox).await;

    h.storage.fail_points().fail_code_upsert(true);
    let mut again = request(SubjectKind::StudentTemp, "alice");
    again.email = "alice.new@school.test".into();
    assert_err!(h.registration.register(again).await);
    h.storage.fail_points().fail_code_upsert(false);

    let stored = h
        .storage
        .find_temporary(SubjectKind::StudentTemp, first.account.id)
        .await
        .unwrap();
    assert_eq!(stored.email, "alice@school.test");
    assert_eq!(stored.password_hash, first.account.password_hash);
    let code = assert_ok!(h.verification.verify(first.account.subject(), CODE).await);
    assert_eq!(code.id, first.code.record.id);
}

#[tokio::test]
async fn test_save_registration_rejects_concurrently_taken_username() {
    let h = harness();
    let registration = h
        .registration
        .register(request(SubjectKind::StudentTemp, "alice"))
        .await
        .unwrap();
    h.promotion
        .verify_and_promote(SubjectKind::StudentTemp, registration.account.id, CODE)
        .await
        .unwrap();

    // A registration that passed its availability check before the promotion.
    let now = h.clock.now();
    let late = TemporaryAccount {
        id: Uuid::new_v4(),
        kind: SubjectKind::TeacherTemp,
        username: "alice".into(),
        email: "other@school.test".into(),
        password_hash: "hash".into(),
        subject_name: Some("History".into()),
        created_at: now,
        updated_at: now,
    };
    let err = assert_err!(
        h.storage
            .save_registration(&late, false, "digest", now + Duration::hours(1))
            .await
    );
    assert!(err.is_conflict());
    assert_eq!(h.storage.temporary_count(SubjectKind::TeacherTemp).await, 0);
}

#[tokio::test]
async fn test_password_authentication() {
    let h = harness();
    let registration = h
        .registration
        .register(request(SubjectKind::StudentTemp, "alice"))
        .await
        .unwrap();
    let verified = h
        .promotion
        .verify_and_promote(SubjectKind::StudentTemp, registration.account.id, CODE)
        .await
        .unwrap();
    h.registration
        .register(request(SubjectKind::StudentTemp, "pending"))
        .await
        .unwrap();

    let authenticator = UserAuthenticator::new(h.storage.clone());
    let user = assert_ok!(authenticator.authenticate("alice", "Str0ng!pass").await);
    assert_eq!(user.id, verified.account_id);
    assert_eq!(user.role_name, "student");

    let wrong_password = assert_err!(authenticator.authenticate("alice", "Wr0ng!pass").await);
    assert!(wrong_password.is_unauthenticated());
    let unknown = assert_err!(authenticator.authenticate("nobody", "Str0ng!pass").await);
    assert!(unknown.is_unauthenticated());
    assert_eq!(wrong_password.to_string(), unknown.to_string());

    // Pending registrations cannot sign in.
    let pending = assert_err!(authenticator.authenticate("pending", "Str0ng!pass").await);
    assert!(pending.is_unauthenticated());
}

#[tokio::test]
async fn test_plan_uses_allowed_roles() {
    let h = harness();
    for (kind, expected) in [
        (SubjectKind::StudentTemp, "student"),
        (SubjectKind::AdminTemp, "admin"),
    ] {
        let registration = h
            .registration
            .register(request(kind, &format!("{expected}-1")))
            .await
            .unwrap();
        let plan = h
            .promotion
            .plan(registration.account, &registration.code.record)
            .unwrap();
        let PlannedTarget::User { role, .. } = plan.target else {
            panic!("expected a permanent account target");
        };
        assert_eq!(role.name, expected);
        assert!(ALLOWED_ROLES.contains(&role.name.as_str()));
        assert_eq!(role.scopes, AccountsConfig::default().scopes_for_role(expected));
    }
}
