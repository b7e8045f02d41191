//! Accounts, roles and the temporary records awaiting verification.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::AuthError;

// =============================================================================
// Subject kinds
// =============================================================================

/// What a verification code belongs to.
///
/// The discriminator doubles as the registry key used to resolve a subject
/// to its storage table, so no runtime type inspection is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectKind {
    StudentTemp,
    TeacherTemp,
    AdminTemp,
    /// A permanent user re-verifying their email.
    User,
}

/// Where a verified subject ends up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromotionTarget {
    /// A permanent user with the named role.
    User { role: &'static str },
    /// A teacher waiting for admin approval.
    TeacherWaiting,
    /// Already permanent; nothing to promote.
    None,
}

impl SubjectKind {
    pub const TEMPORARY: [SubjectKind; 3] = [Self::StudentTemp, Self::TeacherTemp, Self::AdminTemp];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StudentTemp => "student_temp",
            Self::TeacherTemp => "teacher_temp",
            Self::AdminTemp => "admin_temp",
            Self::User => "user",
        }
    }

    #[must_use]
    pub fn table_name(&self) -> &'static str {
        match self {
            Self::StudentTemp => "student_temps",
            Self::TeacherTemp => "teacher_temps",
            Self::AdminTemp => "admin_temps",
            Self::User => "users",
        }
    }

    /// Resolves the discriminator carried by resend requests.
    #[must_use]
    pub fn from_table_name(table: &str) -> Option<Self> {
        [Self::StudentTemp, Self::TeacherTemp, Self::AdminTemp, Self::User]
            .into_iter()
            .find(|kind| kind.table_name() == table)
    }

    #[must_use]
    pub fn is_temporary(&self) -> bool {
        !matches!(self, Self::User)
    }

    #[must_use]
    pub fn promotion_target(&self) -> PromotionTarget {
        match self {
            Self::StudentTemp => PromotionTarget::User { role: "student" },
            Self::AdminTemp => PromotionTarget::User { role: "admin" },
            Self::TeacherTemp => PromotionTarget::TeacherWaiting,
            Self::User => PromotionTarget::None,
        }
    }
}

impl fmt::Display for SubjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubjectKind {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student_temp" => Ok(Self::StudentTemp),
            "teacher_temp" => Ok(Self::TeacherTemp),
            "admin_temp" => Ok(Self::AdminTemp),
            "user" => Ok(Self::User),
            other => Self::from_table_name(other)
                .ok_or_else(|| AuthError::invalid_field("subject_type", format!("unknown subject type: {other}"))),
        }
    }
}

/// Polymorphic reference to the owner of a verification code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubjectRef {
    pub kind: SubjectKind,
    pub id: Uuid,
}

impl SubjectRef {
    #[must_use]
    pub fn new(kind: SubjectKind, id: Uuid) -> Self {
        Self { kind, id }
    }
}

impl fmt::Display for SubjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

/// Where to send a verification email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectContact {
    pub subject: SubjectRef,
    pub username: String,
    pub email: String,
}

// =============================================================================
// Roles and permanent accounts
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Scopes linked to the role.
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl Role {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: String::new(),
            scopes: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn with_scopes(mut self, scopes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }
}

/// A named permission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// A permanent account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    /// Argon2 PHC hash.
    pub password_hash: String,
    pub role_id: Uuid,
    pub role_name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// A user's profile image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub id: Uuid,
    pub user_id: Uuid,
    pub file_name: String,
    pub url: String,
}

/// A teacher whose email is verified, pending admin approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeacherWaiting {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    #[serde(default)]
    pub subject_name: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

// =============================================================================
// Temporary accounts
// =============================================================================

/// A registration awaiting email verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemporaryAccount {
    pub id: Uuid,
    pub kind: SubjectKind,
    pub username: String,
    pub email: String,
    /// Argon2 PHC hash.
    pub password_hash: String,
    /// Teaching subject, teachers only.
    #[serde(default)]
    pub subject_name: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl TemporaryAccount {
    #[must_use]
    pub fn subject(&self) -> SubjectRef {
        SubjectRef::new(self.kind, self.id)
    }

    #[must_use]
    pub fn contact(&self) -> SubjectContact {
        SubjectContact {
            subject: self.subject(),
            username: self.username.clone(),
            email: self.email.clone(),
        }
    }
}

// =============================================================================
// Promotion
// =============================================================================

/// Default image attached to promoted accounts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSpec {
    pub file_name: String,
    pub url: String,
}

/// Everything a backend needs to promote a temporary account in one transaction.
#[derive(Debug, Clone)]
pub struct PromotionPlan {
    pub temporary: TemporaryAccount,
    /// The verification code consumed by this promotion.
    pub code_id: Uuid,
    pub target: PlannedTarget,
    pub promoted_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub enum PlannedTarget {
    /// Look up or create `role`, then create the user and its image.
    User { role: Role, image: ImageSpec },
    TeacherWaiting,
}

/// What a promotion produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromotionOutcome {
    Account { user: User, image: Image },
    AwaitingApproval(TeacherWaiting),
}

impl PromotionOutcome {
    /// ID of the permanent record created.
    #[must_use]
    pub fn account_id(&self) -> Uuid {
        match self {
            Self::Account { user, .. } => user.id,
            Self::AwaitingApproval(waiting) => waiting.id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_kind_registry() {
        for kind in [
            SubjectKind::StudentTemp,
            SubjectKind::TeacherTemp,
            SubjectKind::AdminTemp,
            SubjectKind::User,
        ] {
            assert_eq!(SubjectKind::from_table_name(kind.table_name()), Some(kind));
            assert_eq!(kind.as_str().parse::<SubjectKind>().unwrap(), kind);
        }
        assert_eq!(SubjectKind::from_table_name("sessions"), None);
        assert_eq!("teacher_temps".parse::<SubjectKind>().unwrap(), SubjectKind::TeacherTemp);
        assert!("guest".parse::<SubjectKind>().is_err());
    }

    #[test]
    fn test_promotion_targets() {
        assert_eq!(
            SubjectKind::StudentTemp.promotion_target(),
            PromotionTarget::User { role: "student" }
        );
        assert_eq!(
            SubjectKind::TeacherTemp.promotion_target(),
            PromotionTarget::TeacherWaiting
        );
        assert_eq!(SubjectKind::User.promotion_target(), PromotionTarget::None);
        assert!(!SubjectKind::User.is_temporary());
    }
}
