use thiserror::Error;
use tollgate_auth::AuthError;

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Template not found: {0}")]
    TemplateNotFound(String),
}

impl From<NotificationError> for AuthError {
    fn from(err: NotificationError) -> Self {
        match err {
            NotificationError::InvalidConfig(_) => AuthError::configuration(err.to_string()),
            _ => AuthError::internal(err.to_string()),
        }
    }
}
