use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, MultiPart},
    transport::smtp::authentication::Credentials,
};
use tollgate_auth::config::MailConfig;
use tollgate_auth::{AuthResult, VerificationMailer, VerificationMessage};

use crate::error::NotificationError;
use crate::templates::TemplateRenderer;

/// Sends verification emails through an SMTP relay.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    renderer: TemplateRenderer,
}

impl SmtpMailer {
    pub fn new(config: &MailConfig) -> Result<Self, NotificationError> {
        if config.smtp_host.trim().is_empty() {
            return Err(NotificationError::InvalidConfig("Missing smtp_host".into()));
        }

        let address = config.from_address.parse().map_err(|e| {
            NotificationError::InvalidAddress(format!("{}: {}", config.from_address, e))
        })?;
        let from = Mailbox::new(Some(config.from_name.clone()), address);

        let mut builder = if config.smtp_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
                .map_err(|e| NotificationError::InvalidConfig(e.to_string()))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_host)
        };
        builder = builder
            .port(config.smtp_port)
            .timeout(Some(config.send_timeout));

        match (&config.smtp_username, &config.smtp_password) {
            (Some(username), Some(password)) => {
                builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
            }
            (Some(_), None) | (None, Some(_)) => {
                return Err(NotificationError::InvalidConfig(
                    "smtp_username and smtp_password must be set together".into(),
                ));
            }
            (None, None) => {}
        }

        Ok(Self {
            transport: builder.build(),
            from,
            renderer: TemplateRenderer::with_defaults(),
        })
    }

    pub fn with_renderer(mut self, renderer: TemplateRenderer) -> Self {
        self.renderer = renderer;
        self
    }

    pub(crate) fn build_message(
        &self,
        message: &VerificationMessage,
    ) -> Result<Message, NotificationError> {
        let content = self.renderer.render_verification(message)?;
        let to: Mailbox = message
            .to
            .parse()
            .map_err(|e| NotificationError::InvalidAddress(format!("{}: {}", message.to, e)))?;

        let builder = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(content.subject);

        let email = match content.html_body {
            Some(html) => builder.multipart(MultiPart::alternative_plain_html(content.body, html)),
            None => builder.body(content.body),
        };
        email.map_err(|e| NotificationError::SendFailed(e.to_string()))
    }

    async fn send(&self, message: &VerificationMessage) -> Result<(), NotificationError> {
        let email = self.build_message(message)?;
        self.transport
            .send(email)
            .await
            .map_err(|e| NotificationError::SendFailed(e.to_string()))?;
        Ok(())
    }
}

impl std::fmt::Debug for SmtpMailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpMailer")
            .field("from", &self.from.to_string())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl VerificationMailer for SmtpMailer {
    async fn send_verification(&self, message: &VerificationMessage) -> AuthResult<()> {
        match self.send(message).await {
            Ok(()) => {
                tracing::info!(to = %message.to, kind = %message.kind, "Verification email sent");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(to = %message.to, error = %e, "Failed to send verification email");
                Err(e.into())
            }
        }
    }
}
