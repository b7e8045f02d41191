//! Domain types shared by the storage traits and services.

pub mod account;
pub mod artifact;
pub mod client;
pub mod client_key;
pub mod replay;
pub mod session;
pub mod verification;

pub use account::{
    Image, ImageSpec, PlannedTarget, PromotionOutcome, PromotionPlan, PromotionTarget, Role,
    Scope, SubjectContact, SubjectKind, SubjectRef, TeacherWaiting, TemporaryAccount, User,
};
pub use artifact::{Artifact, ArtifactKind, ArtifactLookup, PushedRequestDetails, StoredArtifact};
pub use client::{Client, GrantType, TokenEndpointAuthMethod};
pub use client_key::ClientKey;
pub use replay::{AssertionRecord, Nonce, ReplayStatus};
pub use session::{Session, TokenKind};
pub use verification::{IssuedCode, VerificationCode};
