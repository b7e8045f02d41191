//! Storage traits for artifacts, replay caches, keys and accounts.
//!
//! # Implementations
//!
//! - `tollgate-auth-postgres` - PostgreSQL storage backend
//! - `tollgate-auth-memory` - in-memory backend with an injectable clock

pub mod account;
pub mod artifact;
pub mod client;
pub mod client_key;
pub mod replay;
pub mod verification;

pub use account::{AccountStorage, RoleStorage, SubjectDirectory};
pub use artifact::ArtifactStorage;
pub use client::ClientStorage;
pub use client_key::ClientKeyStorage;
pub use replay::{JtiStorage, NonceStorage};
pub use verification::VerificationCodeStorage;
