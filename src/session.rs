//! The signed-in identity.
//!
//! [`SessionStore`] is owned by the application root and is the only thing
//! that changes the identity: it is filled on startup, refreshed after login
//! and OAuth completion, and cleared on logout. Views receive a
//! [`SessionHandle`], which can only read.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::{
    client::ApiClient,
    forms::Credentials,
    models::{Role, User},
    notify::Notifier,
    Result,
};

#[derive(Debug)]
struct SessionState {
    /// True until the first identity lookup finishes.
    loading: bool,
    identity: Option<User>,
}

/// Read-only view of the session, handed to everything below the root.
#[derive(Clone, Debug)]
pub struct SessionHandle {
    state: Arc<RwLock<SessionState>>,
}

impl SessionHandle {
    pub async fn identity(&self) -> Option<User> {
        self.state.read().await.identity.clone()
    }

    pub async fn is_loading(&self) -> bool {
        self.state.read().await.loading
    }

    pub async fn role(&self) -> Option<Role> {
        self.state.read().await.identity.as_ref().map(|u| u.role)
    }

    pub async fn is_authenticated(&self) -> bool {
        self.state.read().await.identity.is_some()
    }
}

pub struct SessionStore {
    client: ApiClient,
    notifier: Arc<dyn Notifier>,
    state: Arc<RwLock<SessionState>>,
}

impl SessionStore {
    /// A store in the loading state. Call [`SessionStore::init`] next.
    pub fn new(client: ApiClient, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            client,
            notifier,
            state: Arc::new(RwLock::new(SessionState {
                loading: true,
                identity: None,
            })),
        }
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            state: Arc::clone(&self.state),
        }
    }

    /// Resolve the identity carried by the session cookie, if any.
    pub async fn init(&self) -> Option<User> {
        self.fetch_user().await
    }

    /// Re-read the identity from the backend. Any failure means "signed out".
    pub async fn fetch_user(&self) -> Option<User> {
        self.state.write().await.loading = true;

        let identity = match self.client.me().await {
            Ok(user) => {
                debug!(user = %user.id, role = %user.role, "identity resolved");
                Some(user)
            }
            Err(e) => {
                debug!("no identity: {e}");
                None
            }
        };

        let mut state = self.state.write().await;
        state.identity = identity.clone();
        state.loading = false;
        identity
    }

    pub async fn login(&self, credentials: &Credentials) -> Result<User> {
        let attempt = async {
            credentials.validate_for_login()?;
            self.client.login(credentials).await?;
            self.fetch_user().await.ok_or_else(|| {
                crate::Error::validation("Signed in, but the session could not be read")
            })
        };

        match attempt.await {
            Ok(user) => {
                info!(user = %user.id, "logged in");
                self.notifier.success("Login successful");
                Ok(user)
            }
            Err(e) => {
                self.notifier.error(e.user_message("Login failed"));
                Err(e)
            }
        }
    }

    /// The OAuth provider redirected back: the cookie is set, read the identity.
    pub async fn complete_oauth(&self) -> Option<User> {
        self.fetch_user().await
    }

    /// End the server session. The local identity is only cleared on success.
    pub async fn logout(&self) -> Result<()> {
        match self.client.logout().await {
            Ok(_) => {
                let mut state = self.state.write().await;
                state.identity = None;
                state.loading = false;
                drop(state);
                info!("logged out");
                self.notifier.success("Logged out successfully");
                Ok(())
            }
            Err(e) => {
                warn!("logout failed: {e}");
                self.notifier.error("Logout failed");
                Err(e)
            }
        }
    }
}

impl Credentials {
    fn validate_for_login(&self) -> Result<()> {
        validator::Validate::validate(self).map_err(crate::Error::from)
    }
}

#[cfg(test)]
mod tests {
    use crate::{notify::Level, tests::TestContext};

    #[tokio::test]
    async fn starts_loading_then_resolves_anonymous() -> anyhow::Result<()> {
        let ctx = TestContext::new().await?;
        let store = ctx.session_store();
        let handle = store.handle();

        assert!(handle.is_loading().await);
        assert!(store.init().await.is_none());
        assert!(!handle.is_loading().await);
        assert!(!handle.is_authenticated().await);
        Ok(())
    }

    #[tokio::test]
    async fn login_then_logout() -> anyhow::Result<()> {
        let ctx = TestContext::new().await?;
        let store = ctx.session_store();
        let handle = store.handle();
        store.init().await;

        let user = store.login(&TestContext::credentials("asha")).await?;
        assert_eq!(user.name, "Asha");
        assert_eq!(handle.identity().await.map(|u| u.id), Some(user.id));

        store.logout().await?;
        assert!(handle.identity().await.is_none());
        // The server session is gone too.
        assert!(store.fetch_user().await.is_none());

        assert_eq!(
            ctx.notifier.take_messages(Level::Success),
            vec!["Login successful", "Logged out successfully"]
        );
        Ok(())
    }

    #[tokio::test]
    async fn bad_credentials_keep_anonymous() -> anyhow::Result<()> {
        let ctx = TestContext::new().await?;
        let store = ctx.session_store();
        store.init().await;

        let mut creds = TestContext::credentials("asha");
        creds.password = "wrong-password".to_owned();
        assert!(store.login(&creds).await.is_err());
        assert!(store.handle().identity().await.is_none());
        assert_eq!(
            ctx.notifier.take_messages(Level::Error),
            vec!["Invalid credentials"]
        );
        Ok(())
    }

    #[tokio::test]
    async fn empty_credentials_never_reach_the_backend() -> anyhow::Result<()> {
        let ctx = TestContext::new().await?;
        let store = ctx.session_store();

        let err = store
            .login(&crate::forms::Credentials::default())
            .await
            .unwrap_err();
        assert!(err.is_client_side());
        assert_eq!(ctx.backend.hits("/api/auth/login").await, 0);
        Ok(())
    }

    #[tokio::test]
    async fn failed_logout_keeps_identity() -> anyhow::Result<()> {
        let ctx = TestContext::new().await?;
        let store = ctx.session_store();
        store.login(&TestContext::credentials("asha")).await?;

        ctx.backend.fail_next("/api/auth/logout").await;
        assert!(store.logout().await.is_err());
        assert!(store.handle().is_authenticated().await);
        Ok(())
    }
}
