//! The admin panel: accounts, NGOs and NGO applications.

use std::sync::Arc;

use futures::future;
use tracing::{info, warn};

use crate::{
    client::{Ack, ApiClient},
    models::{Decision, NgoRequest, RequestStatus, User},
    notify::Notifier,
    Error, Result,
};

const DONE: &str = "Action completed";
const FAILED: &str = "Action failed";

pub struct AdminPanel {
    client: ApiClient,
    notifier: Arc<dyn Notifier>,
    pub users: Vec<User>,
    pub ngos: Vec<User>,
    pub requests: Vec<NgoRequest>,
}

impl AdminPanel {
    /// Load all three lists in parallel. A list that fails stays empty.
    pub async fn load(client: ApiClient, notifier: Arc<dyn Notifier>) -> Self {
        let mut panel = Self {
            client,
            notifier,
            users: Vec::new(),
            ngos: Vec::new(),
            requests: Vec::new(),
        };
        let (users, ngos, requests) = future::join3(
            panel.client.users(),
            panel.client.ngos(),
            panel.client.ngo_requests(),
        )
        .await;
        panel.apply_users(users);
        panel.apply_ngos(ngos);
        panel.apply_requests(requests);
        panel
    }

    fn apply_users(&mut self, users: Result<Vec<User>>) {
        match users {
            Ok(users) => self.users = users,
            Err(e) => self.notifier.error(e.user_message("Failed to load users")),
        }
    }

    fn apply_ngos(&mut self, ngos: Result<Vec<User>>) {
        match ngos {
            Ok(ngos) => self.ngos = ngos,
            Err(e) => self.notifier.error(e.user_message("Failed to load NGOs")),
        }
    }

    fn apply_requests(&mut self, requests: Result<Vec<NgoRequest>>) {
        match requests {
            Ok(requests) => self.requests = requests,
            Err(e) => self
                .notifier
                .error(e.user_message("Failed to load NGO requests")),
        }
    }

    fn announce(&self, result: Result<Ack>) -> Result<Ack> {
        if let Err(e) = &result {
            warn!("admin action failed: {e}");
        }
        self.notifier
            .outcome(result, |ack| ack.message_or(DONE), FAILED)
    }

    pub async fn delete_user(&mut self, id: &str) -> Result<()> {
        self.announce(self.client.delete_user(id).await)?;
        info!(user = id, "user deleted");
        let users = self.client.users().await;
        self.apply_users(users);
        Ok(())
    }

    pub async fn remove_ngo_role(&mut self, id: &str) -> Result<()> {
        self.announce(self.client.remove_ngo_role(id).await)?;
        info!(user = id, "NGO role removed");
        let ngos = self.client.ngos().await;
        self.apply_ngos(ngos);
        Ok(())
    }

    /// Approve or reject an application. Only pending ones can be reviewed.
    pub async fn review(&mut self, id: &str, decision: Decision) -> Result<()> {
        let status = self.requests.iter().find(|r| r.id == id).map(|r| r.status);
        let attempt = async {
            match status {
                None => return Err(Error::validation("No such NGO request")),
                Some(RequestStatus::Pending) => {}
                Some(_) => return Err(Error::validation("Request already reviewed")),
            }
            self.client.review_ngo_request(id, decision).await
        };
        self.announce(attempt.await)?;
        info!(request = id, ?decision, "NGO request reviewed");

        let (requests, ngos) =
            future::join(self.client.ngo_requests(), self.client.ngos()).await;
        self.apply_requests(requests);
        self.apply_ngos(ngos);
        Ok(())
    }

    pub fn pending_requests(&self) -> impl Iterator<Item = &NgoRequest> {
        self.requests
            .iter()
            .filter(|r| r.status == RequestStatus::Pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        feed::FeedView, models::Role, notify::Level, report_view::ReportView,
        tests::TestContext,
    };

    async fn panel(ctx: &TestContext) -> anyhow::Result<AdminPanel> {
        let (client, _store) = ctx.signed_in("admin").await?;
        Ok(AdminPanel::load(client, ctx.notifier()).await)
    }

    #[tokio::test]
    async fn loads_every_list_shape() -> anyhow::Result<()> {
        let ctx = TestContext::new().await?;
        let panel = panel(&ctx).await?;
        assert_eq!(panel.users.len(), 4);
        assert_eq!(panel.ngos.len(), 1);
        assert_eq!(panel.pending_requests().count(), 1);
        assert!(ctx.notifier.take().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn non_admins_see_errors() -> anyhow::Result<()> {
        let ctx = TestContext::new().await?;
        let (client, _store) = ctx.signed_in("asha").await?;
        let panel = AdminPanel::load(client, ctx.notifier()).await;
        assert!(panel.users.is_empty());
        assert_eq!(
            ctx.notifier.take_messages(Level::Error),
            vec!["Access denied"; 3]
        );
        Ok(())
    }

    #[tokio::test]
    async fn approve_creates_an_ngo() -> anyhow::Result<()> {
        let ctx = TestContext::new().await?;
        let mut panel = panel(&ctx).await?;

        panel.review("q-clean", Decision::Approve).await?;
        assert_eq!(
            ctx.notifier.take_messages(Level::Success),
            vec!["NGO approved"]
        );
        assert_eq!(panel.pending_requests().count(), 0);
        assert!(panel.ngos.iter().any(|n| n.name == "Clean City Trust"));

        // Reviewed requests cannot be reviewed again.
        let err = panel
            .review("q-clean", Decision::Reject)
            .await
            .unwrap_err();
        assert!(err.is_client_side());
        assert_eq!(ctx.backend.hits("/api/admin/ngo-request/q-clean").await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn remove_role_and_delete_user() -> anyhow::Result<()> {
        let ctx = TestContext::new().await?;
        let mut panel = panel(&ctx).await?;

        panel.remove_ngo_role("n-green").await?;
        assert!(panel.ngos.is_empty());

        panel.delete_user("u-ravi").await?;
        assert!(panel.users.iter().all(|u| u.id != "u-ravi"));
        assert!(panel
            .users
            .iter()
            .any(|u| u.id == "n-green" && u.role == Role::User));
        Ok(())
    }

    #[tokio::test]
    async fn deleted_authors_leave_readable_reports() -> anyhow::Result<()> {
        let ctx = TestContext::new().await?;
        let mut panel = panel(&ctx).await?;
        panel.delete_user("u-ravi").await?;
        let _ = ctx.notifier.take();

        let feed = FeedView::new(ctx.client.clone(), ctx.notifier(), ctx.config.feed.clone());
        let snapshot = feed.refresh().await;
        assert!(ctx.notifier.take().is_empty());
        assert_eq!(snapshot.reports.len(), 5);
        let drain = snapshot.reports.iter().find(|r| r.id == "r-drain").unwrap();
        assert_eq!(drain.posted_by.display_name(), "Deleted user");

        let (client, store) = ctx.signed_in("asha").await?;
        let view = ReportView::open(client, store.handle(), ctx.notifier(), "r-pothole").await?;
        assert!(view.report().comments[0].user.is_deleted());
        assert!(ctx.notifier.take_messages(Level::Error).is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn failures_use_server_message_or_fallback() -> anyhow::Result<()> {
        let ctx = TestContext::new().await?;
        let mut panel = panel(&ctx).await?;

        assert!(panel.remove_ngo_role("u-asha").await.is_err());
        assert_eq!(
            ctx.notifier.take_messages(Level::Error),
            vec!["User is not an NGO"]
        );

        ctx.backend.fail_next("/api/admin/users/u-ravi").await;
        let users = panel.users.clone();
        assert!(panel.delete_user("u-ravi").await.is_err());
        assert_eq!(panel.users, users);
        Ok(())
    }
}
