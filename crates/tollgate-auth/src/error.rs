//! Error types for artifact storage, replay protection and account verification.
//!
//! Every storage backend converts its own failures into [`AuthError`] at the
//! trait boundary, so callers (the protocol engine and the HTTP layer) only
//! ever match on this taxonomy.

use std::fmt;

use uuid::Uuid;

use crate::validation::ValidationErrors;

/// Errors surfaced by the artifact store, replay guard and verification services.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The lookup key is absent (or the row was soft-deleted).
    #[error("Not found: {message}")]
    NotFound {
        /// What was looked up.
        message: String,
    },

    /// A unique key already exists.
    #[error("Conflict: {message}")]
    Conflict {
        /// Which key collided.
        message: String,
    },

    /// The artifact exists but has been flagged inactive.
    #[error("Invalidated: {message}")]
    Invalidated {
        /// Which artifact was invalidated.
        message: String,
    },

    /// Time-based invalidity, detected at read time.
    #[error("Expired: {message}")]
    Expired {
        /// What expired.
        message: String,
    },

    /// The verification code was already consumed.
    #[error("Verification code already used")]
    AlreadyUsed,

    /// A nonce or assertion identifier was presented twice.
    #[error("Replay detected: {message}")]
    ReplayDetected {
        /// The replayed value's description.
        message: String,
    },

    /// No verification code matches the presented value for this subject.
    #[error("Invalid verification code")]
    NotCode,

    /// Username and password do not identify a permanent user.
    ///
    /// Unknown usernames and wrong passwords both map here.
    #[error("Invalid username or password")]
    Unauthenticated,

    /// The permanent account was created but the temporary record could not be removed.
    ///
    /// Non-fatal: the primary effect is durable and the temporary row is
    /// left behind for a later cleanup pass.
    #[error("Account {account_id} created but temporary record {temporary_id} was not removed: {message}")]
    Destroy {
        /// The permanent account that now exists.
        account_id: Uuid,
        /// The temporary record left behind.
        temporary_id: Uuid,
        /// Underlying failure.
        message: String,
    },

    /// Input failed field validation.
    #[error("Invalid input: {errors}")]
    InvalidInput {
        /// Per-field problems.
        errors: ValidationErrors,
    },

    /// An error occurred while reading or writing the backing store.
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage error.
        message: String,
    },

    /// The configuration is invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    /// An unexpected internal error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl AuthError {
    /// Creates a new `NotFound` error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Creates a new `Conflict` error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Creates a new `Invalidated` error.
    #[must_use]
    pub fn invalidated(message: impl Into<String>) -> Self {
        Self::Invalidated {
            message: message.into(),
        }
    }

    /// Creates a new `Expired` error.
    #[must_use]
    pub fn expired(message: impl Into<String>) -> Self {
        Self::Expired {
            message: message.into(),
        }
    }

    /// Creates a new `ReplayDetected` error.
    #[must_use]
    pub fn replay_detected(message: impl Into<String>) -> Self {
        Self::ReplayDetected {
            message: message.into(),
        }
    }

    /// Creates a new `Destroy` error.
    #[must_use]
    pub fn destroy(account_id: Uuid, temporary_id: Uuid, message: impl Into<String>) -> Self {
        Self::Destroy {
            account_id,
            temporary_id,
            message: message.into(),
        }
    }

    /// Creates a new `InvalidInput` error.
    #[must_use]
    pub fn invalid_input(errors: ValidationErrors) -> Self {
        Self::InvalidInput { errors }
    }

    /// Creates an `InvalidInput` error for a single field.
    #[must_use]
    pub fn invalid_field(field: &'static str, message: impl Into<String>) -> Self {
        let mut errors = ValidationErrors::new();
        errors.push(field, message);
        Self::InvalidInput { errors }
    }

    /// Creates a new `Storage` error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    #[must_use]
    pub fn is_invalidated(&self) -> bool {
        matches!(self, Self::Invalidated { .. })
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        matches!(self, Self::Expired { .. })
    }

    #[must_use]
    pub fn is_already_used(&self) -> bool {
        matches!(self, Self::AlreadyUsed)
    }

    #[must_use]
    pub fn is_replay(&self) -> bool {
        matches!(self, Self::ReplayDetected { .. })
    }

    #[must_use]
    pub fn is_not_code(&self) -> bool {
        matches!(self, Self::NotCode)
    }

    #[must_use]
    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, Self::Unauthenticated)
    }

    #[must_use]
    pub fn is_destroy(&self) -> bool {
        matches!(self, Self::Destroy { .. })
    }

    /// Returns `true` if the primary effect succeeded and only cleanup failed.
    #[must_use]
    pub fn is_non_fatal(&self) -> bool {
        self.is_destroy()
    }

    /// Returns `true` if this is a client error (4xx category).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. }
                | Self::Conflict { .. }
                | Self::Invalidated { .. }
                | Self::Expired { .. }
                | Self::AlreadyUsed
                | Self::ReplayDetected { .. }
                | Self::NotCode
                | Self::Unauthenticated
                | Self::InvalidInput { .. }
        )
    }

    /// Returns `true` if this is a server error (5xx category).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::Storage { .. } | Self::Configuration { .. } | Self::Internal { .. }
        )
    }

    /// Returns `true` when the caller may offer to resend a verification code.
    ///
    /// A wrong code is a bad request; an expired or used one is a request
    /// that came too late.
    #[must_use]
    pub fn allows_resend(&self) -> bool {
        matches!(self, Self::Expired { .. } | Self::AlreadyUsed)
    }

    /// Returns the error category for logging purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound { .. } | Self::NotCode => ErrorCategory::Lookup,
            Self::Conflict { .. } => ErrorCategory::Conflict,
            Self::Invalidated { .. } | Self::Expired { .. } | Self::AlreadyUsed => {
                ErrorCategory::Lifecycle
            }
            Self::ReplayDetected { .. } => ErrorCategory::Replay,
            Self::Unauthenticated => ErrorCategory::Authentication,
            Self::Destroy { .. } => ErrorCategory::Cleanup,
            Self::InvalidInput { .. } => ErrorCategory::Validation,
            Self::Storage { .. } => ErrorCategory::Infrastructure,
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }
}

/// Categories of errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Key or code did not match anything.
    Lookup,
    /// Unique key collision.
    Conflict,
    /// Record exists but is no longer usable.
    Lifecycle,
    /// Single-use value presented twice.
    Replay,
    /// Credentials rejected.
    Authentication,
    /// Cleanup debt after a successful primary effect.
    Cleanup,
    /// Request validation errors.
    Validation,
    /// Infrastructure/storage errors.
    Infrastructure,
    /// Configuration errors.
    Configuration,
    /// Internal errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lookup => write!(f, "lookup"),
            Self::Conflict => write!(f, "conflict"),
            Self::Lifecycle => write!(f, "lifecycle"),
            Self::Replay => write!(f, "replay"),
            Self::Authentication => write!(f, "authentication"),
            Self::Cleanup => write!(f, "cleanup"),
            Self::Validation => write!(f, "validation"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Configuration => write!(f, "configuration"),
            Self::Internal => write!(f, "internal"),
        }
    }
}
