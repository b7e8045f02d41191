use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tollgate_auth::clock::system_clock;
use tollgate_auth::services::VerificationService;
use tollgate_auth::{AuthConfig, AuthResult, SubjectKind, VerificationMailer, VerificationMessage};
use tollgate_auth_postgres::PostgresAuthStorage;
use tollgate_notifications::mailer_from_config;

use crate::cli::ResendArgs;
use crate::output::{print_success, print_warning};

/// Reports delivery of the email the service dispatches in the background,
/// so the process does not exit before it is sent.
struct DeliveryTracker {
    inner: Arc<dyn VerificationMailer>,
    delivered: mpsc::UnboundedSender<bool>,
}

#[async_trait]
impl VerificationMailer for DeliveryTracker {
    async fn send_verification(&self, message: &VerificationMessage) -> AuthResult<()> {
        let result = self.inner.send_verification(message).await;
        let _ = self.delivered.send(result.is_ok());
        result
    }
}

pub async fn run(
    storage: Arc<PostgresAuthStorage>,
    config: &AuthConfig,
    args: &ResendArgs,
) -> Result<()> {
    let Some(kind) = SubjectKind::from_table_name(&args.subject_type) else {
        bail!(
            "Unknown subject type: {}. Valid types: student_temps, teacher_temps, admin_temps, users",
            args.subject_type
        );
    };

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mailer = DeliveryTracker {
        inner: mailer_from_config(&config.mail)?,
        delivered: tx,
    };
    let verification = VerificationService::new(
        storage.clone(),
        storage,
        Arc::new(mailer),
        system_clock(),
        &config.verification,
    );

    let issued = match (&args.id, &args.username) {
        (Some(id), _) => verification.reissue(kind, *id).await,
        (None, Some(username)) => verification.reissue_for_username(kind, username).await,
        (None, None) => bail!("Either --id or --username is required"),
    }
    .context("failed to issue verification code")?;

    if !config.mail.enabled {
        print_warning(&format!(
            "Mail disabled; code regenerated for {} without sending",
            issued.record.subject
        ));
        return Ok(());
    }

    let wait = config.mail.send_timeout + Duration::from_secs(5);
    match tokio::time::timeout(wait, rx.recv()).await {
        Ok(Some(true)) => print_success(&format!(
            "Verification code sent to {} (expires {})",
            issued.record.subject, issued.record.expires_at
        )),
        Ok(_) => bail!("Verification code was stored but the email could not be sent"),
        Err(_) => print_warning("Verification code stored; email delivery did not finish in time"),
    }
    Ok(())
}
