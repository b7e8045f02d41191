use async_trait::async_trait;
use tollgate_auth::types::{Artifact, ArtifactKind, ArtifactLookup, Session, StoredArtifact};
use tollgate_auth::{AuthError, AuthResult, storage::ArtifactStorage};

use crate::state::ArtifactRow;
use crate::storage::InMemoryAuthStorage;

#[async_trait]
impl ArtifactStorage for InMemoryAuthStorage {
    async fn create(&self, artifact: &Artifact, session: Option<&Session>) -> AuthResult<()> {
        let mut state = self.state.write().await;
        let key = (artifact.kind, artifact.key.clone());
        if state.artifacts.contains_key(&key) {
            return Err(AuthError::conflict(format!(
                "{} already exists",
                artifact.kind
            )));
        }

        let mut artifact = artifact.clone();
        if let Some(session) = session {
            artifact.session_id = Some(session.id);
            state.sessions.insert(session.id, session.clone());
        }
        state.artifacts.insert(
            key,
            ArtifactRow {
                artifact,
                deleted_at: None,
            },
        );
        Ok(())
    }

    async fn find_by_key(&self, kind: ArtifactKind, key: &str) -> AuthResult<ArtifactLookup> {
        let now = self.now();
        let state = self.state.read().await;
        let row = state
            .artifacts
            .get(&(kind, key.to_string()))
            .filter(|row| row.deleted_at.is_none())
            .ok_or_else(|| AuthError::not_found(kind.as_str()))?;

        if kind == ArtifactKind::PushedRequest && row.artifact.is_expired(now) {
            return Err(AuthError::expired(kind.as_str()));
        }

        let session = row
            .artifact
            .session_id
            .and_then(|id| state.sessions.get(&id).cloned());
        let client = row
            .artifact
            .client_id
            .as_ref()
            .and_then(|id| state.clients.get(id).cloned());
        let user = session
            .as_ref()
            .and_then(|s| s.user_id)
            .and_then(|id| state.users.get(&id).cloned());

        Ok(ArtifactLookup::from_stored(StoredArtifact {
            artifact: row.artifact.clone(),
            client,
            session,
            user,
        }))
    }

    async fn invalidate(&self, kind: ArtifactKind, key: &str) -> AuthResult<()> {
        let mut state = self.state.write().await;
        let row = state
            .artifacts
            .get_mut(&(kind, key.to_string()))
            .ok_or_else(|| AuthError::not_found(kind.as_str()))?;
        row.artifact.active = Some(false);
        if let Some(pushed) = row.artifact.pushed.as_mut() {
            pushed.used = true;
        }
        Ok(())
    }

    async fn delete(&self, kind: ArtifactKind, key: &str) -> AuthResult<()> {
        let mut state = self.state.write().await;
        let Some(session_id) = state
            .artifacts
            .remove(&(kind, key.to_string()))
            .and_then(|row| row.artifact.session_id)
        else {
            return Ok(());
        };
        let shared = state
            .artifacts
            .values()
            .any(|row| row.deleted_at.is_none() && row.artifact.session_id == Some(session_id));
        if !shared {
            state.sessions.remove(&session_id);
        }
        Ok(())
    }

    async fn revoke_by_request_id(&self, kind: ArtifactKind, request_id: &str) -> AuthResult<u64> {
        let mut state = self.state.write().await;
        let mut revoked = 0;
        for ((row_kind, _), row) in state.artifacts.iter_mut() {
            if *row_kind == kind
                && row.deleted_at.is_none()
                && row.artifact.request_id == request_id
            {
                row.artifact.active = Some(false);
                revoked += 1;
            }
        }
        if revoked == 0 {
            return Err(AuthError::not_found(format!(
                "{kind} for request {request_id}"
            )));
        }
        Ok(revoked)
    }
}
