//! A single report and the lifecycle actions on it.
//!
//! Every action makes exactly one backend call and, when it succeeds,
//! re-reads the whole report. Nothing is updated optimistically, so the
//! view only ever shows what the backend last returned. If that re-read
//! fails the action still counts as done and the view is marked stale.

use std::sync::Arc;

use chrono::{Local, NaiveDate};
use tracing::{debug, warn};

use crate::{
    client::ApiClient,
    forms::{check_due_date, ResolveForm},
    models::{Report, ReportStatus, Role, User},
    notify::Notifier,
    session::SessionHandle,
    Error, Result,
};

/// What the current identity may do with a report.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub can_upvote: bool,
    pub has_upvoted: bool,
    pub can_comment: bool,
    pub can_claim: bool,
    pub can_resolve: bool,
    pub can_delete: bool,
}

impl Capabilities {
    pub fn of(report: &Report, identity: Option<&User>) -> Self {
        let Some(user) = identity else {
            return Self::default();
        };
        let responder = user.role.is_responder();
        Self {
            can_upvote: true,
            has_upvoted: report.is_upvoted_by(&user.id),
            can_comment: true,
            can_claim: responder && report.status == ReportStatus::Pending,
            can_resolve: responder
                && report.status == ReportStatus::Taken
                && report.is_taken_by(&user.id),
            can_delete: user.role == Role::Admin,
        }
    }
}

pub struct ReportView {
    client: ApiClient,
    session: SessionHandle,
    notifier: Arc<dyn Notifier>,
    report: Report,
    stale: bool,
}

impl ReportView {
    /// Load report `id`.
    pub async fn open(
        client: ApiClient,
        session: SessionHandle,
        notifier: Arc<dyn Notifier>,
        id: &str,
    ) -> Result<Self> {
        let report = match client.report(id).await {
            Ok(report) => report,
            Err(e) => {
                notifier.error(e.user_message("Failed to load report"));
                return Err(e);
            }
        };
        check_invariants(&report);

        Ok(Self {
            client,
            session,
            notifier,
            report,
            stale: false,
        })
    }

    pub fn report(&self) -> &Report {
        &self.report
    }

    /// Whether an action succeeded after the last successful read.
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub async fn capabilities(&self) -> Capabilities {
        Capabilities::of(&self.report, self.session.identity().await.as_ref())
    }

    /// Re-read the report. On failure the current copy is kept.
    pub async fn refresh(&mut self) -> Result<&Report> {
        let fresh = match self.client.report(&self.report.id).await {
            Ok(report) => report,
            Err(e) => {
                self.notifier.error(e.user_message("Failed to load report"));
                return Err(e);
            }
        };

        if !self.report.status.can_transition_to(fresh.status) {
            warn!(
                report = %fresh.id,
                from = %self.report.status,
                to = %fresh.status,
                "backend reported an impossible status change"
            );
        }
        check_invariants(&fresh);

        self.report = fresh;
        self.stale = false;
        Ok(&self.report)
    }

    /// Re-read after a successful action. The action stands either way.
    async fn reload(&mut self) {
        if let Err(e) = self.refresh().await.map(|_| ()) {
            warn!(report = %self.report.id, "action succeeded but the report could not be re-read: {e}");
            self.stale = true;
        }
    }

    pub async fn toggle_upvote(&mut self) -> Result<()> {
        // The vote direction comes from the copy, so it must be current.
        if self.stale {
            self.refresh().await.map(|_| ())?;
        }
        let identity = self.session.identity().await;
        let upvoted = identity
            .as_ref()
            .is_some_and(|u| self.report.is_upvoted_by(&u.id));
        let attempt = async {
            if identity.is_none() {
                return Err(Error::forbidden("Login to vote"));
            }
            if upvoted {
                self.client.remove_upvote(&self.report.id).await
            } else {
                self.client.upvote(&self.report.id).await
            }
        };
        let fallback = if upvoted { "Upvote removed" } else { "Upvoted" };
        self.notifier.outcome(
            attempt.await,
            |ack| ack.message_or(fallback),
            "Failed to update vote",
        )?;
        self.reload().await;
        Ok(())
    }

    pub async fn add_comment(&mut self, text: &str) -> Result<()> {
        let identity = self.session.identity().await;
        let text = text.trim();
        let attempt = async {
            if identity.is_none() {
                return Err(Error::forbidden("Login to comment"));
            }
            if text.is_empty() {
                return Err(Error::validation("Comment cannot be empty"));
            }
            self.client.comment(&self.report.id, text).await
        };
        self.notifier.outcome(
            attempt.await,
            |ack| ack.message_or("Comment added"),
            "Failed to add comment",
        )?;
        self.reload().await;
        Ok(())
    }

    /// Take responsibility for a pending report until `due_date`.
    pub async fn claim(&mut self, due_date: NaiveDate) -> Result<()> {
        self.claim_as_of(due_date, Local::now().date_naive()).await
    }

    async fn claim_as_of(&mut self, due_date: NaiveDate, today: NaiveDate) -> Result<()> {
        let capabilities = self.capabilities().await;
        let attempt = async {
            if self.report.status != ReportStatus::Pending {
                return Err(Error::forbidden(format!(
                    "Report is already {}",
                    self.report.status
                )));
            }
            if !capabilities.can_claim {
                return Err(Error::forbidden("Only NGOs can take reports"));
            }
            check_due_date(due_date, today)?;
            self.client.take(&self.report.id, due_date).await
        };
        self.notifier.outcome(
            attempt.await,
            |ack| ack.message_or("Report taken successfully"),
            "Failed to take report",
        )?;
        debug!(report = %self.report.id, %due_date, "claimed");
        self.reload().await;
        Ok(())
    }

    /// Mark a report this identity claimed as dealt with.
    pub async fn resolve(&mut self, form: &ResolveForm) -> Result<()> {
        let capabilities = self.capabilities().await;
        let attempt = async {
            if !capabilities.can_resolve {
                return Err(Error::forbidden(
                    "Only the NGO that took this report can complete it",
                ));
            }
            form.check()?;
            self.client.complete(&self.report.id, form).await
        };
        self.notifier.outcome(
            attempt.await,
            |ack| ack.message_or("Report marked as completed"),
            "Failed to complete report",
        )?;
        self.reload().await;
        Ok(())
    }

    /// Delete the report. On failure the view is handed back untouched.
    pub async fn delete(self) -> std::result::Result<(), (Self, Error)> {
        let capabilities = self.capabilities().await;
        let attempt = async {
            if !capabilities.can_delete {
                return Err(Error::forbidden("Only admins can delete reports"));
            }
            self.client.delete_report(&self.report.id).await
        };
        match self.notifier.outcome(
            attempt.await,
            |ack| ack.message_or("Report deleted"),
            "Failed to delete report",
        ) {
            Ok(_) => Ok(()),
            Err(e) => Err((self, e)),
        }
    }
}

fn check_invariants(report: &Report) {
    for violation in report.invariant_violations() {
        warn!(report = %report.id, "{violation}");
    }
}
