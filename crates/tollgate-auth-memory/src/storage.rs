use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use time::OffsetDateTime;
use tokio::sync::RwLock;
use tollgate_auth::clock::{SharedClock, SystemClock};
use tollgate_auth::types::{ArtifactKind, Role, SubjectKind, TeacherWaiting, User};

use crate::state::State;

/// Failures that tests can switch on to exercise partial-failure paths.
#[derive(Debug, Default)]
pub struct FailPoints {
    fail_temporary_delete: AtomicBool,
    fail_scope_link: AtomicBool,
    fail_code_upsert: AtomicBool,
}

impl FailPoints {
    /// Makes the final delete step of a promotion fail.
    pub fn fail_temporary_delete(&self, on: bool) {
        self.fail_temporary_delete.store(on, Ordering::SeqCst);
    }

    /// Makes the role scope backfill during promotion fail.
    pub fn fail_scope_link(&self, on: bool) {
        self.fail_scope_link.store(on, Ordering::SeqCst);
    }

    /// Makes every verification code write fail, including the one made
    /// while saving a registration.
    pub fn fail_code_upsert(&self, on: bool) {
        self.fail_code_upsert.store(on, Ordering::SeqCst);
    }

    pub(crate) fn temporary_delete_fails(&self) -> bool {
        self.fail_temporary_delete.load(Ordering::SeqCst)
    }

    pub(crate) fn scope_link_fails(&self) -> bool {
        self.fail_scope_link.load(Ordering::SeqCst)
    }

    pub(crate) fn code_upsert_fails(&self) -> bool {
        self.fail_code_upsert.load(Ordering::SeqCst)
    }
}

/// In-memory implementation of every tollgate-auth storage trait.
#[derive(Debug)]
pub struct InMemoryAuthStorage {
    pub(crate) state: RwLock<State>,
    pub(crate) clock: SharedClock,
    pub(crate) fail_points: FailPoints,
}

impl Default for InMemoryAuthStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryAuthStorage {
    /// Creates an empty store on the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    #[must_use]
    pub fn with_clock(clock: SharedClock) -> Self {
        Self {
            state: RwLock::new(State::default()),
            clock,
            fail_points: FailPoints::default(),
        }
    }

    #[must_use]
    pub fn fail_points(&self) -> &FailPoints {
        &self.fail_points
    }

    pub(crate) fn now(&self) -> OffsetDateTime {
        self.clock.now()
    }

    // =========================================================================
    // Inspection helpers
    // =========================================================================

    pub async fn users(&self) -> Vec<User> {
        self.state.read().await.users.values().cloned().collect()
    }

    pub async fn teachers_waiting(&self) -> Vec<TeacherWaiting> {
        self.state.read().await.waiting.values().cloned().collect()
    }

    pub async fn temporary_count(&self, kind: SubjectKind) -> usize {
        self.state
            .read()
            .await
            .temporaries
            .keys()
            .filter(|(k, _)| *k == kind)
            .count()
    }

    pub async fn role(&self, name: &str) -> Option<Role> {
        self.state.read().await.roles.get(name).cloned()
    }

    pub async fn image_count(&self) -> usize {
        self.state.read().await.images.len()
    }

    pub async fn session_count(&self) -> usize {
        self.state.read().await.sessions.len()
    }

    pub async fn nonce_count(&self) -> usize {
        self.state.read().await.nonces.len()
    }

    /// Stamps `deleted_at` on an artifact, as an external cleanup job would.
    /// Returns `false` if the key is unknown.
    pub async fn soft_delete_artifact(&self, kind: ArtifactKind, key: &str) -> bool {
        let now = self.now();
        let mut state = self.state.write().await;
        match state.artifacts.get_mut(&(kind, key.to_string())) {
            Some(row) => {
                row.deleted_at = Some(now);
                true
            }
            None => false,
        }
    }
}
