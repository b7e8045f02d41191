//! In-memory storage backend for tollgate-auth.
//!
//! All state sits behind one async lock, so every trait method (promotion
//! included) is atomic with respect to every other. Time comes from an
//! injected [`Clock`](tollgate_auth::Clock), which makes expiry testable
//! without sleeping.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tollgate_auth::{ArtifactStorage, ManualClock};
//! use tollgate_auth_memory::InMemoryAuthStorage;
//!
//! let clock = Arc::new(ManualClock::starting_now());
//! let storage = Arc::new(InMemoryAuthStorage::with_clock(clock.clone()));
//! let artifacts: Arc<dyn ArtifactStorage> = storage.clone();
//! ```

mod accounts;
mod artifacts;
mod clients;
mod replay;
mod state;
mod storage;
mod verification;

pub use storage::{FailPoints, InMemoryAuthStorage};
