//! Verification email delivery.
//!
//! [`mailer_from_config`] picks the mailer for a [`MailConfig`]: an SMTP
//! relay when mail is enabled, otherwise [`DisabledMailer`], which only logs.

pub mod email;
pub mod error;
pub mod templates;

use std::sync::Arc;

use tollgate_auth::config::MailConfig;
use tollgate_auth::{DisabledMailer, VerificationMailer};

pub use email::SmtpMailer;
pub use error::NotificationError;
pub use templates::{RenderedContent, Template, TemplateRenderer};

pub fn mailer_from_config(
    config: &MailConfig,
) -> Result<Arc<dyn VerificationMailer>, NotificationError> {
    if !config.enabled {
        tracing::info!("Mail disabled");
        return Ok(Arc::new(DisabledMailer));
    }

    let mailer = SmtpMailer::new(config)?;
    tracing::info!(
        host = %config.smtp_host,
        port = config.smtp_port,
        tls = config.smtp_tls,
        "SMTP mailer configured"
    );
    Ok(Arc::new(mailer))
}
