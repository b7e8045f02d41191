use std::collections::{BTreeMap, HashMap};

use time::OffsetDateTime;
use tollgate_auth::types::{
    Artifact, ArtifactKind, AssertionRecord, Client, ClientKey, Image, Nonce, Role, Scope, Session,
    SubjectKind, SubjectRef, TeacherWaiting, TemporaryAccount, User, VerificationCode,
};
use uuid::Uuid;

pub(crate) type ArtifactKey = (ArtifactKind, String);

#[derive(Debug, Clone)]
pub(crate) struct ArtifactRow {
    pub artifact: Artifact,
    pub deleted_at: Option<OffsetDateTime>,
}

/// Everything the backend holds.
#[derive(Debug, Default)]
pub(crate) struct State {
    pub sessions: HashMap<Uuid, Session>,
    pub artifacts: HashMap<ArtifactKey, ArtifactRow>,
    pub clients: HashMap<String, Client>,
    pub keys: Vec<ClientKey>,
    pub nonces: HashMap<(String, String), Nonce>,
    pub assertions: HashMap<String, AssertionRecord>,
    pub codes: HashMap<SubjectRef, VerificationCode>,
    pub temporaries: HashMap<(SubjectKind, Uuid), TemporaryAccount>,
    pub users: HashMap<Uuid, User>,
    pub images: HashMap<Uuid, Image>,
    pub waiting: HashMap<Uuid, TeacherWaiting>,
    pub roles: HashMap<String, Role>,
    pub scopes: BTreeMap<String, Scope>,
}

impl State {
    pub fn is_taken(&self, username: &str, email: &str) -> bool {
        self.users
            .values()
            .any(|u| u.username == username || u.email == email)
            || self
                .waiting
                .values()
                .any(|w| w.username == username || w.email == email)
    }

    pub fn has_pending(&self, kind: SubjectKind, username: &str) -> bool {
        self.temporaries
            .values()
            .any(|t| t.kind == kind && t.username == username)
    }

    /// Creates the subject's code or overwrites it, clearing `used_at`.
    pub fn upsert_code(
        &mut self,
        subject: SubjectRef,
        code_hash: &str,
        expires_at: OffsetDateTime,
        now: OffsetDateTime,
    ) -> VerificationCode {
        self.codes
            .entry(subject)
            .and_modify(|code| {
                code.code_hash = code_hash.to_string();
                code.expires_at = expires_at;
                code.used_at = None;
            })
            .or_insert_with(|| VerificationCode {
                id: Uuid::new_v4(),
                subject,
                code_hash: code_hash.to_string(),
                expires_at,
                used_at: None,
                created_at: now,
            })
            .clone()
    }

    pub fn link_scopes(&mut self, role_name: &str, scopes: &[String]) {
        let known: Vec<String> = scopes
            .iter()
            .filter(|s| self.scopes.contains_key(*s))
            .cloned()
            .collect();
        if let Some(role) = self.roles.get_mut(role_name) {
            for scope in known {
                if !role.scopes.contains(&scope) {
                    role.scopes.push(scope);
                }
            }
        }
    }
}
