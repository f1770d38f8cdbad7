//! Account flows that do not need a signed-in identity.

use std::sync::Arc;

use tracing::{info, warn};
use url::Url;

use crate::{
    client::ApiClient,
    forms::{NgoApplication, PasswordReset, Registration},
    local_store::LocalStore,
    notify::Notifier,
    Error, Result,
};

/// Key under which the address awaiting an OTP is kept.
const RESET_EMAIL: &str = "resetEmail";
const NO_RESET_EMAIL: &str = "Email not found. Please go back and enter your email.";
const RESET_EMAIL_NOT_SAVED: &str =
    "OTP sent, but your email could not be saved on this device. Please try again.";

pub struct AuthFlows {
    client: ApiClient,
    store: LocalStore,
    notifier: Arc<dyn Notifier>,
}

impl AuthFlows {
    pub fn new(client: ApiClient, store: LocalStore, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            client,
            store,
            notifier,
        }
    }

    pub async fn register(&self, registration: &Registration) -> Result<()> {
        let attempt = async {
            registration.check()?;
            self.client.register(registration).await
        };
        let ack = self.notifier.outcome(
            attempt.await,
            |ack| ack.message_or("Registration successful"),
            "Registration failed",
        )?;
        info!(email = %registration.email, msg = ?ack.message(), "registered");
        Ok(())
    }

    /// Where to send the browser for Google sign-in. Completion is
    /// [`SessionStore::complete_oauth`](crate::session::SessionStore::complete_oauth).
    pub fn oauth_url(&self) -> Result<Url> {
        self.client.oauth_url()
    }

    /// Ask for a reset OTP and remember the address for the next step.
    pub async fn forgot_password(&self, email: &str) -> Result<()> {
        let email = email.trim();
        let attempt = async {
            if email.is_empty() {
                return Err(Error::validation("Please enter your email"));
            }
            self.client.send_otp(email).await
        };
        self.notifier.outcome(
            attempt.await,
            |ack| ack.message_or("OTP sent to your email"),
            "Failed to send OTP",
        )?;

        // The OTP is already out; a failure here is local only.
        self.store.set(RESET_EMAIL, email).await.inspect_err(|e| {
            warn!("failed to remember reset email: {e:#}");
            self.notifier.error(RESET_EMAIL_NOT_SAVED);
        })
    }

    pub async fn resend_otp(&self) -> Result<()> {
        let attempt = async {
            let email = self.reset_email().await?;
            self.client.send_otp(&email).await
        };
        self.notifier
            .outcome(attempt.await, |_| "OTP resent".to_owned(), "Failed to resend OTP")?;
        Ok(())
    }

    /// Finish the reset for the remembered address, then forget it.
    pub async fn reset_password(&self, reset: &PasswordReset) -> Result<()> {
        let attempt = async {
            let email = self.reset_email().await?;
            reset.check()?;
            let ack = self
                .client
                .reset_password(&email, &reset.otp, &reset.new_password)
                .await?;
            self.store.remove(RESET_EMAIL).await?;
            info!(%email, "password reset");
            Ok(ack)
        };
        self.notifier.outcome(
            attempt.await,
            |ack| ack.message_or("Password reset successful"),
            "Password reset failed",
        )?;
        Ok(())
    }

    pub async fn apply_ngo(&self, application: &NgoApplication) -> Result<()> {
        let attempt = async {
            application.check()?;
            self.client.request_ngo(application).await
        };
        self.notifier.outcome(
            attempt.await,
            |ack| ack.message_or("Request submitted"),
            "Failed to submit request",
        )?;
        Ok(())
    }

    /// The address an OTP was last requested for, if any.
    pub async fn pending_reset_email(&self) -> Result<Option<String>> {
        self.store.get(RESET_EMAIL).await
    }

    async fn reset_email(&self) -> Result<String> {
        self.pending_reset_email()
            .await?
            .ok_or_else(|| Error::validation(NO_RESET_EMAIL))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        forms::Upload,
        notify::Level,
        tests::{TestContext, OTP},
    };

    fn flows(ctx: &TestContext) -> AuthFlows {
        AuthFlows::new(
            ctx.client.clone(),
            LocalStore::new(ctx.state_dir()),
            ctx.notifier(),
        )
    }

    #[tokio::test]
    async fn register_then_login() -> anyhow::Result<()> {
        let ctx = TestContext::new().await?;
        let auth = flows(&ctx);
        auth.register(&Registration {
            name: "Meera".to_owned(),
            email: "meera@example.com".to_owned(),
            city: "Anand".to_owned(),
            password: "Gr33n&Clean".to_owned(),
            confirm_password: "Gr33n&Clean".to_owned(),
        })
        .await?;
        assert_eq!(
            ctx.notifier.take_messages(Level::Success),
            vec!["Registered successfully"]
        );

        let store = ctx.session_store();
        let user = store
            .login(&crate::forms::Credentials {
                email: "meera@example.com".to_owned(),
                password: "Gr33n&Clean".to_owned(),
            })
            .await?;
        assert!(user.photo.is_some_and(|p| p.contains("seed=Meera")));
        Ok(())
    }

    #[tokio::test]
    async fn weak_password_is_rejected_locally() -> anyhow::Result<()> {
        let ctx = TestContext::new().await?;
        let auth = flows(&ctx);
        let err = auth
            .register(&Registration {
                name: "Meera".to_owned(),
                email: "meera@example.com".to_owned(),
                city: "Anand".to_owned(),
                password: "password".to_owned(),
                confirm_password: "password".to_owned(),
            })
            .await
            .unwrap_err();
        assert!(err.is_client_side());
        assert_eq!(ctx.backend.hits("/api/auth/register").await, 0);
        Ok(())
    }

    #[tokio::test]
    async fn otp_reset_uses_remembered_email() -> anyhow::Result<()> {
        let ctx = TestContext::new().await?;
        let auth = flows(&ctx);

        // Nothing remembered yet.
        let err = auth.resend_otp().await.unwrap_err();
        assert_eq!(err.to_string(), NO_RESET_EMAIL);

        auth.forgot_password("asha@example.com").await?;
        assert_eq!(
            auth.pending_reset_email().await?.as_deref(),
            Some("asha@example.com")
        );
        auth.resend_otp().await?;
        assert_eq!(ctx.backend.hits("/api/auth/send-otp").await, 2);

        auth.reset_password(&PasswordReset {
            otp: OTP.to_owned(),
            new_password: "N3w&Secret".to_owned(),
            confirm_new_password: "N3w&Secret".to_owned(),
        })
        .await?;
        assert_eq!(auth.pending_reset_email().await?, None);
        assert_eq!(
            ctx.backend.password_of("asha@example.com").await.as_deref(),
            Some("N3w&Secret")
        );
        Ok(())
    }

    #[tokio::test]
    async fn wrong_otp_keeps_remembered_email() -> anyhow::Result<()> {
        let ctx = TestContext::new().await?;
        let auth = flows(&ctx);
        auth.forgot_password("asha@example.com").await?;
        let _ = ctx.notifier.take();

        let result = auth
            .reset_password(&PasswordReset {
                otp: "000000".to_owned(),
                new_password: "N3w&Secret".to_owned(),
                confirm_new_password: "N3w&Secret".to_owned(),
            })
            .await;
        assert!(result.is_err());
        assert_eq!(
            ctx.notifier.take_messages(Level::Error),
            vec!["Invalid or expired OTP"]
        );
        assert!(auth.pending_reset_email().await?.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn unsaved_email_is_reported_as_local() -> anyhow::Result<()> {
        let ctx = TestContext::new().await?;
        let auth = flows(&ctx);
        tokio::fs::write(ctx.state_dir().join("state.json"), b"not json").await?;

        let err = auth.forgot_password("asha@example.com").await.unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
        assert_eq!(ctx.backend.hits("/api/auth/send-otp").await, 1);
        let seen: Vec<String> = ctx.notifier.take().into_iter().map(|n| n.message).collect();
        assert_eq!(seen, vec!["OTP sent to your email", RESET_EMAIL_NOT_SAVED]);
        Ok(())
    }

    #[tokio::test]
    async fn unknown_email_is_not_remembered() -> anyhow::Result<()> {
        let ctx = TestContext::new().await?;
        let auth = flows(&ctx);
        assert!(auth.forgot_password("nobody@example.com").await.is_err());
        assert_eq!(auth.pending_reset_email().await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn ngo_application() -> anyhow::Result<()> {
        let ctx = TestContext::new().await?;
        let auth = flows(&ctx);
        let mut application = NgoApplication {
            name: "River Guardians".to_owned(),
            email: "river@example.org".to_owned(),
            city: "Vadodara".to_owned(),
            registration_number: "NGO-1200".to_owned(),
            mobile_number: "9988776655".to_owned(),
            message: "Lake cleanups".to_owned(),
            logo: None,
        };
        assert!(auth.apply_ngo(&application).await.is_err());
        assert_eq!(ctx.backend.hits("/api/auth/request-ngo").await, 0);

        application.logo = Some(Upload::new("logo.png", vec![0x89, 0x50])?);
        auth.apply_ngo(&application).await?;
        assert_eq!(ctx.backend.hits("/api/auth/request-ngo").await, 1);
        Ok(())
    }
}
