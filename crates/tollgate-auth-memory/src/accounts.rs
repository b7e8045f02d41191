use async_trait::async_trait;
use time::OffsetDateTime;
use tollgate_auth::storage::{AccountStorage, RoleStorage, SubjectDirectory};
use tollgate_auth::types::{
    Image, PlannedTarget, PromotionOutcome, PromotionPlan, Role, Scope, SubjectContact,
    SubjectKind, SubjectRef, TeacherWaiting, TemporaryAccount, User, VerificationCode,
};
use tollgate_auth::{AuthError, AuthResult};
use uuid::Uuid;

use crate::storage::InMemoryAuthStorage;

#[async_trait]
impl SubjectDirectory for InMemoryAuthStorage {
    async fn resolve(&self, subject: SubjectRef) -> AuthResult<SubjectContact> {
        let state = self.state.read().await;
        let found = match subject.kind {
            SubjectKind::User => state
                .users
                .get(&subject.id)
                .map(|u| (u.username.clone(), u.email.clone())),
            kind => state
                .temporaries
                .get(&(kind, subject.id))
                .map(|t| (t.username.clone(), t.email.clone())),
        };
        let (username, email) = found.ok_or_else(|| AuthError::not_found(subject.to_string()))?;
        Ok(SubjectContact {
            subject,
            username,
            email,
        })
    }

    async fn find_by_username(&self, kind: SubjectKind, username: &str) -> AuthResult<SubjectRef> {
        let state = self.state.read().await;
        let id = match kind {
            SubjectKind::User => state
                .users
                .values()
                .find(|u| u.username == username)
                .map(|u| u.id),
            kind => state
                .temporaries
                .values()
                .find(|t| t.kind == kind && t.username == username)
                .map(|t| t.id),
        };
        id.map(|id| SubjectRef::new(kind, id))
            .ok_or_else(|| AuthError::not_found(format!("{kind} {username}")))
    }
}

#[async_trait]
impl AccountStorage for InMemoryAuthStorage {
    async fn create_temporary(&self, account: &TemporaryAccount) -> AuthResult<()> {
        let mut state = self.state.write().await;
        if state.has_pending(account.kind, &account.username) {
            return Err(AuthError::conflict(format!(
                "{} {} already exists",
                account.kind, account.username
            )));
        }
        state
            .temporaries
            .insert((account.kind, account.id), account.clone());
        Ok(())
    }

    async fn save_registration(
        &self,
        account: &TemporaryAccount,
        refresh: bool,
        code_hash: &str,
        expires_at: OffsetDateTime,
    ) -> AuthResult<VerificationCode> {
        let now = self.now();
        let mut state = self.state.write().await;

        if state.is_taken(&account.username, &account.email) {
            return Err(AuthError::conflict(format!(
                "username or email already registered: {}",
                account.username
            )));
        }
        let key = (account.kind, account.id);
        if refresh {
            if !state.temporaries.contains_key(&key) {
                return Err(AuthError::not_found(account.subject().to_string()));
            }
        } else if state.has_pending(account.kind, &account.username) {
            return Err(AuthError::conflict(format!(
                "{} {} already exists",
                account.kind, account.username
            )));
        }
        if self.fail_points.code_upsert_fails() {
            return Err(AuthError::storage("verification code upsert failed"));
        }

        if !refresh {
            state.temporaries.insert(key, account.clone());
        } else if let Some(existing) = state.temporaries.get_mut(&key) {
            existing.email = account.email.clone();
            existing.password_hash = account.password_hash.clone();
            existing.subject_name = account.subject_name.clone();
            existing.updated_at = account.updated_at;
        }
        Ok(state.upsert_code(account.subject(), code_hash, expires_at, now))
    }

    async fn find_temporary(&self, kind: SubjectKind, id: Uuid) -> AuthResult<TemporaryAccount> {
        self.state
            .read()
            .await
            .temporaries
            .get(&(kind, id))
            .cloned()
            .ok_or_else(|| AuthError::not_found(SubjectRef::new(kind, id).to_string()))
    }

    async fn find_temporary_by_username(
        &self,
        kind: SubjectKind,
        username: &str,
    ) -> AuthResult<Option<TemporaryAccount>> {
        Ok(self
            .state
            .read()
            .await
            .temporaries
            .values()
            .find(|t| t.kind == kind && t.username == username)
            .cloned())
    }

    async fn is_taken(&self, username: &str, email: &str) -> AuthResult<bool> {
        Ok(self.state.read().await.is_taken(username, email))
    }

    async fn find_user_by_username(&self, username: &str) -> AuthResult<Option<User>> {
        Ok(self
            .state
            .read()
            .await
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn create_user(&self, user: &User, image: &Image) -> AuthResult<()> {
        let mut state = self.state.write().await;
        if state.is_taken(&user.username, &user.email) {
            return Err(AuthError::conflict(format!(
                "user {} already exists",
                user.username
            )));
        }
        state.users.insert(user.id, user.clone());
        state.images.insert(image.id, image.clone());
        Ok(())
    }

    async fn promote(&self, plan: &PromotionPlan) -> AuthResult<PromotionOutcome> {
        let temporary = &plan.temporary;
        let mut state = self.state.write().await;

        // Every check runs before the first write, so a failure leaves nothing behind.
        let code_used = state
            .codes
            .values()
            .find(|c| c.id == plan.code_id)
            .map(|c| c.used_at.is_some())
            .ok_or_else(|| AuthError::not_found("verification code"))?;
        if code_used {
            return Err(AuthError::AlreadyUsed);
        }
        if !state
            .temporaries
            .contains_key(&(temporary.kind, temporary.id))
        {
            return Err(AuthError::not_found(temporary.subject().to_string()));
        }
        if state.is_taken(&temporary.username, &temporary.email) {
            return Err(AuthError::conflict(format!(
                "username or email already registered: {}",
                temporary.username
            )));
        }

        if let Some(code) = state.codes.values_mut().find(|c| c.id == plan.code_id) {
            code.used_at = Some(plan.promoted_at);
        }

        let outcome = match &plan.target {
            PlannedTarget::User { role, image } => {
                let role = match state.roles.get(&role.name) {
                    Some(existing) => existing.clone(),
                    None => {
                        let created = Role {
                            scopes: Vec::new(),
                            ..role.clone()
                        };
                        state.roles.insert(created.name.clone(), created.clone());
                        if self.fail_points.scope_link_fails() {
                            tracing::warn!(role = %created.name, "Failed to link default scopes to role");
                        } else {
                            state.link_scopes(&created.name, &role.scopes);
                        }
                        created
                    }
                };

                let user = User {
                    id: Uuid::new_v4(),
                    username: temporary.username.clone(),
                    email: temporary.email.clone(),
                    password_hash: temporary.password_hash.clone(),
                    role_id: role.id,
                    role_name: role.name.clone(),
                    created_at: plan.promoted_at,
                };
                let image = Image {
                    id: Uuid::new_v4(),
                    user_id: user.id,
                    file_name: image.file_name.clone(),
                    url: image.url.clone(),
                };
                state.users.insert(user.id, user.clone());
                state.images.insert(image.id, image.clone());
                PromotionOutcome::Account { user, image }
            }
            PlannedTarget::TeacherWaiting => {
                let waiting = TeacherWaiting {
                    id: Uuid::new_v4(),
                    username: temporary.username.clone(),
                    email: temporary.email.clone(),
                    password_hash: temporary.password_hash.clone(),
                    subject_name: temporary.subject_name.clone(),
                    created_at: plan.promoted_at,
                };
                state.waiting.insert(waiting.id, waiting.clone());
                PromotionOutcome::AwaitingApproval(waiting)
            }
        };

        if self.fail_points.temporary_delete_fails() {
            return Err(AuthError::destroy(
                outcome.account_id(),
                temporary.id,
                "temporary record delete failed",
            ));
        }
        state.temporaries.remove(&(temporary.kind, temporary.id));
        state.codes.remove(&temporary.subject());

        Ok(outcome)
    }
}

#[async_trait]
impl RoleStorage for InMemoryAuthStorage {
    async fn find_or_create_role(&self, role: &Role) -> AuthResult<Role> {
        let mut state = self.state.write().await;
        Ok(state
            .roles
            .entry(role.name.clone())
            .or_insert_with(|| Role {
                scopes: Vec::new(),
                ..role.clone()
            })
            .clone())
    }

    async fn find_role(&self, name: &str) -> AuthResult<Option<Role>> {
        Ok(self.state.read().await.roles.get(name).cloned())
    }

    async fn upsert_scope(&self, scope: &Scope) -> AuthResult<bool> {
        let mut state = self.state.write().await;
        if state.scopes.contains_key(&scope.name) {
            return Ok(false);
        }
        state.scopes.insert(scope.name.clone(), scope.clone());
        Ok(true)
    }

    async fn link_scopes(&self, role_id: Uuid, scopes: &[String]) -> AuthResult<()> {
        let mut state = self.state.write().await;
        let name = state
            .roles
            .values()
            .find(|r| r.id == role_id)
            .map(|r| r.name.clone())
            .ok_or_else(|| AuthError::not_found(format!("role {role_id}")))?;
        state.link_scopes(&name, scopes);
        Ok(())
    }
}
