//! Per-identity listings: my activity, the NGO dashboard and profiles.

use std::sync::Arc;

use futures::future;
use tracing::warn;

use crate::{
    client::ApiClient,
    forms::ProfileUpdate,
    models::{NgoListKind, NgoReports, Report, Role, User},
    notify::Notifier,
    session::SessionHandle,
    Error, Result,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ActivityTab {
    #[default]
    Reports,
    Upvotes,
    Comments,
}

impl std::str::FromStr for ActivityTab {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "reports" => Ok(Self::Reports),
            "upvotes" => Ok(Self::Upvotes),
            "comments" => Ok(Self::Comments),
            other => Err(format!("unknown tab {other:?}")),
        }
    }
}

/// Reports the signed-in identity posted, upvoted or commented on.
pub async fn my_activity(
    client: &ApiClient,
    notifier: &dyn Notifier,
    tab: ActivityTab,
) -> Result<Vec<Report>> {
    let reports = match tab {
        ActivityTab::Reports => client.my_reports().await,
        ActivityTab::Upvotes => client.my_upvotes().await,
        ActivityTab::Comments => client.my_comments().await,
    };
    reports.inspect_err(|e| {
        warn!(?tab, "failed to load activity: {e}");
        notifier.error(e.user_message("Failed to load activity"));
    })
}

/// Report counts shown on the dashboard header.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DashboardCounts {
    pub completed: usize,
    pub incompleted: usize,
    pub taken: usize,
}

/// Everything an NGO is or was responsible for.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NgoActivity {
    pub taken: NgoReports,
    pub completed: NgoReports,
    pub incompleted: NgoReports,
}

impl NgoActivity {
    /// Read the three lists in parallel. A list that fails stays empty.
    pub async fn load(client: &ApiClient, notifier: &dyn Notifier, ngo_id: &str) -> Self {
        let (completed, incompleted, taken) = future::join3(
            client.ngo_reports(NgoListKind::Completed, ngo_id),
            client.ngo_reports(NgoListKind::Incompleted, ngo_id),
            client.ngo_reports(NgoListKind::Taken, ngo_id),
        )
        .await;

        let mut failed = false;
        let mut settle = |kind: NgoListKind, result: Result<NgoReports>| {
            result.unwrap_or_else(|e| {
                warn!(ngo = ngo_id, list = kind.path(), "failed to load NGO reports: {e}");
                failed = true;
                NgoReports::default()
            })
        };
        let activity = Self {
            completed: settle(NgoListKind::Completed, completed),
            incompleted: settle(NgoListKind::Incompleted, incompleted),
            taken: settle(NgoListKind::Taken, taken),
        };
        if failed {
            notifier.error("Failed to load dashboard");
        }
        activity
    }

    pub fn counts(&self) -> DashboardCounts {
        DashboardCounts {
            completed: self.completed.count,
            incompleted: self.incompleted.count,
            taken: self.taken.count,
        }
    }

    pub fn reports(&self, kind: NgoListKind) -> &[Report] {
        match kind {
            NgoListKind::Taken => &self.taken.reports,
            NgoListKind::Completed => &self.completed.reports,
            NgoListKind::Incompleted => &self.incompleted.reports,
        }
    }
}

/// The dashboard of the signed-in NGO (or admin).
pub async fn ngo_dashboard(
    client: &ApiClient,
    session: &SessionHandle,
    notifier: &dyn Notifier,
) -> Result<NgoActivity> {
    let user = session
        .identity()
        .await
        .filter(|u| u.role.is_responder())
        .ok_or_else(|| Error::forbidden("Only NGOs can open the dashboard"))?;
    Ok(NgoActivity::load(client, notifier, &user.id).await)
}

/// What a profile lists under the account details.
#[derive(Clone, Debug, PartialEq)]
pub enum ProfileReports {
    Ngo(NgoActivity),
    Posted(Vec<Report>),
}

pub struct ProfileView {
    client: ApiClient,
    notifier: Arc<dyn Notifier>,
    own: bool,
    pub user: User,
    pub reports: ProfileReports,
}

impl ProfileView {
    /// The signed-in identity's profile when `id` is `None`, else user `id`'s.
    pub async fn load(
        client: ApiClient,
        session: &SessionHandle,
        notifier: Arc<dyn Notifier>,
        id: Option<&str>,
    ) -> Result<Self> {
        let own_id = session.identity().await.map(|u| u.id);
        let user = match id {
            None => client.me().await,
            Some(id) => client.user(id).await,
        }
        .inspect_err(|e| notifier.error(e.user_message("Failed to load profile")))?;

        let reports = Self::load_reports(&client, notifier.as_ref(), &user).await?;
        Ok(Self {
            own: own_id.as_deref() == Some(user.id.as_str()),
            client,
            notifier,
            user,
            reports,
        })
    }

    async fn load_reports(
        client: &ApiClient,
        notifier: &dyn Notifier,
        user: &User,
    ) -> Result<ProfileReports> {
        if user.role == Role::Ngo {
            return Ok(ProfileReports::Ngo(
                NgoActivity::load(client, notifier, &user.id).await,
            ));
        }
        let posted = client
            .reports_by(&user.id)
            .await
            .inspect_err(|e| notifier.error(e.user_message("Failed to load reports")))?;
        Ok(ProfileReports::Posted(posted))
    }

    pub fn is_own(&self) -> bool {
        self.own
    }

    /// Update the shown profile, which must be the viewer's own.
    ///
    /// The session keeps the old identity until the caller refreshes it
    /// through [`SessionStore::fetch_user`](crate::session::SessionStore::fetch_user).
    pub async fn update(&mut self, update: &ProfileUpdate) -> Result<()> {
        let attempt = async {
            if !self.own {
                return Err(Error::forbidden("You can only edit your own profile"));
            }
            update.check()?;
            self.client.update_profile(update).await
        };
        self.notifier.outcome(
            attempt.await,
            |ack| ack.message_or("Profile updated"),
            "Failed to update profile",
        )?;
        self.user = self.client.me().await?;
        Ok(())
    }
}
