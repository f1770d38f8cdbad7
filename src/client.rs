//! Typed access to the EcoTrack REST API.
//!
//! One method per backend endpoint. Methods return the decoded payload on a
//! success status and [`Error::Api`] carrying the server's message otherwise;
//! none of them retry or time out on their own.

use anyhow::Context as _;
use chrono::NaiveDate;
use reqwest::StatusCode;
use reqwest_middleware::RequestBuilder;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use url::Url;

use crate::{
    error::ErrorBody,
    forms::{CreateReportForm, Credentials, NgoApplication, ProfileUpdate, Registration, ResolveForm},
    middleware::RequestLog,
    models::{
        Decision, Listing, NgoListKind, NgoReports, NgoRequest, Report, ReportEnvelope,
        ReportList, ReportLocation, ReportPage, ReportStatus, TakeBody, User, UserEnvelope,
    },
    Error, Result,
};

/// The application user agent. Concatenates the package name and version. e.g. `ecotrack/0.0.0`.
pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

/// The reqwest client type with middleware.
pub type Client = reqwest_middleware::ClientWithMiddleware;

/// Build the HTTP client used for every backend call.
///
/// The cookie store carries the session cookie set by login and OAuth.
pub fn build_client() -> anyhow::Result<Client> {
    let simple_client = reqwest::Client::builder()
        .user_agent(APP_USER_AGENT)
        .cookie_store(true)
        .build()
        .context("failed to build requester client")?;

    Ok(reqwest_middleware::ClientBuilder::new(simple_client)
        .with(RequestLog)
        .build())
}

/// Acknowledgement body of mutating endpoints.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Ack {
    msg: Option<String>,
    message: Option<String>,
}

impl Ack {
    /// The server's message, if it sent one.
    pub fn message(&self) -> Option<&str> {
        self.msg.as_deref().or(self.message.as_deref())
    }

    /// The server's message or `fallback`.
    pub fn message_or(&self, fallback: &str) -> String {
        self.message().unwrap_or(fallback).to_owned()
    }
}

/// Query shared by the paged and unpaged report filters.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FeedQuery {
    /// Case-insensitive city substring. Empty means every city.
    pub city: String,
    #[serde(serialize_with = "status_param")]
    pub status: Option<ReportStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

// The backend reads an empty status as "any".
fn status_param<S: serde::Serializer>(
    status: &Option<ReportStatus>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(status.map_or("", ReportStatus::as_str))
}

#[derive(Serialize)]
struct CommentBody<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct EmailBody<'a> {
    email: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ResetBody<'a> {
    email: &'a str,
    otp: &'a str,
    new_password: &'a str,
}

#[derive(Serialize)]
struct ReviewBody {
    action: Decision,
}

/// Handle to the backend. Cheap to clone; clones share the cookie store.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base: Url,
}

impl ApiClient {
    pub fn new(http: Client, base: Url) -> Result<Self> {
        if base.cannot_be_a_base() {
            return Err(Error::Config(format!("{base} cannot be used as an API base")));
        }
        Ok(Self { http, base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Join path segments onto the API base, escaping each one.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| Error::Config(format!("{} cannot be used as an API base", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn fetch<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T> {
        let res = req.send().await?;
        let res = check(res).await?;
        Ok(res.json::<T>().await?)
    }

    async fn execute(&self, req: RequestBuilder) -> Result<Ack> {
        let res = req.send().await?;
        let res = check(res).await?;
        let bytes = res.bytes().await?;
        // Some handlers answer with an empty or non-JSON body.
        Ok(serde_json::from_slice(&bytes).unwrap_or_default())
    }

    // Auth.

    pub async fn login(&self, credentials: &Credentials) -> Result<Ack> {
        let url = self.endpoint(&["auth", "login"])?;
        self.execute(self.http.post(url).json(credentials)).await
    }

    pub async fn register(&self, registration: &Registration) -> Result<Ack> {
        let url = self.endpoint(&["auth", "register"])?;
        self.execute(self.http.post(url).json(&registration.body()))
            .await
    }

    pub async fn logout(&self) -> Result<Ack> {
        let url = self.endpoint(&["auth", "logout"])?;
        self.execute(self.http.post(url).json(&serde_json::json!({})))
            .await
    }

    pub async fn send_otp(&self, email: &str) -> Result<Ack> {
        let url = self.endpoint(&["auth", "send-otp"])?;
        self.execute(self.http.post(url).json(&EmailBody { email }))
            .await
    }

    pub async fn reset_password(&self, email: &str, otp: &str, new_password: &str) -> Result<Ack> {
        let url = self.endpoint(&["auth", "reset-password"])?;
        let body = ResetBody {
            email,
            otp,
            new_password,
        };
        self.execute(self.http.post(url).json(&body)).await
    }

    pub async fn request_ngo(&self, application: &NgoApplication) -> Result<Ack> {
        let url = self.endpoint(&["auth", "request-ngo"])?;
        self.execute(self.http.post(url).multipart(application.to_multipart()?))
            .await
    }

    /// Where the browser must be sent to start the Google sign-in.
    pub fn oauth_url(&self) -> Result<Url> {
        self.endpoint(&["oauth", "google"])
    }

    // Users.

    pub async fn me(&self) -> Result<User> {
        let url = self.endpoint(&["user", "me"])?;
        self.fetch(self.http.get(url)).await
    }

    pub async fn user(&self, id: &str) -> Result<User> {
        let url = self.endpoint(&["user", id])?;
        let envelope: UserEnvelope = self.fetch(self.http.get(url)).await?;
        Ok(envelope.user)
    }

    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<Ack> {
        let url = self.endpoint(&["user", "update-profile"])?;
        self.execute(self.http.put(url).multipart(update.to_multipart()?))
            .await
    }

    // Reports.

    pub async fn report(&self, id: &str) -> Result<Report> {
        let url = self.endpoint(&["report", "reports", id])?;
        let envelope: ReportEnvelope = self.fetch(self.http.get(url)).await?;
        Ok(envelope.report)
    }

    pub async fn filter_paging(&self, query: &FeedQuery) -> Result<ReportPage> {
        let url = self.endpoint(&["report", "filter-paging"])?;
        self.fetch(self.http.get(url).query(query)).await
    }

    /// Every matching report, reduced to what the map needs.
    pub async fn filter_locations(&self, query: &FeedQuery) -> Result<Vec<ReportLocation>> {
        let url = self.endpoint(&["report", "filter"])?;
        let unpaged = FeedQuery {
            page: None,
            limit: None,
            ..query.clone()
        };
        let list: ReportList<ReportLocation> = self.fetch(self.http.get(url).query(&unpaged)).await?;
        Ok(list.reports)
    }

    /// Submit a new report. The backend answers 201, or 200 with a message.
    pub async fn create_report(&self, form: &CreateReportForm) -> Result<Ack> {
        let url = self.endpoint(&["report"])?;
        let res = self
            .http
            .post(url)
            .multipart(form.to_multipart()?)
            .send()
            .await?;
        let res = check(res).await?;
        let created = res.status() == StatusCode::CREATED;
        let ack: Ack = serde_json::from_slice(&res.bytes().await?).unwrap_or_default();
        if created || ack.message().is_some() {
            Ok(ack)
        } else {
            Err(Error::Api {
                status: StatusCode::OK,
                message: Some("Unexpected server response.".to_owned()),
            })
        }
    }

    pub async fn upvote(&self, id: &str) -> Result<Ack> {
        let url = self.endpoint(&["report", "upvote", id])?;
        self.execute(self.http.post(url)).await
    }

    pub async fn remove_upvote(&self, id: &str) -> Result<Ack> {
        let url = self.endpoint(&["report", "upvote", id])?;
        self.execute(self.http.delete(url)).await
    }

    pub async fn comment(&self, id: &str, text: &str) -> Result<Ack> {
        let url = self.endpoint(&["report", "comment", id])?;
        self.execute(self.http.post(url).json(&CommentBody { text }))
            .await
    }

    pub async fn my_reports(&self) -> Result<Vec<Report>> {
        let url = self.endpoint(&["report", "my-reports"])?;
        self.fetch(self.http.get(url)).await
    }

    pub async fn my_upvotes(&self) -> Result<Vec<Report>> {
        let url = self.endpoint(&["report", "my-upvotes"])?;
        self.fetch(self.http.get(url)).await
    }

    pub async fn my_comments(&self) -> Result<Vec<Report>> {
        let url = self.endpoint(&["report", "my-comments"])?;
        self.fetch(self.http.get(url)).await
    }

    pub async fn reports_by(&self, user_id: &str) -> Result<Vec<Report>> {
        let url = self.endpoint(&["report", "reports-by", user_id])?;
        let list: ReportList<Report> = self.fetch(self.http.get(url)).await?;
        Ok(list.reports)
    }

    // NGO.

    pub async fn take(&self, id: &str, due_date: NaiveDate) -> Result<Ack> {
        let url = self.endpoint(&["ngo", "take", id])?;
        self.execute(self.http.put(url).json(&TakeBody { due_date }))
            .await
    }

    pub async fn complete(&self, id: &str, form: &ResolveForm) -> Result<Ack> {
        let url = self.endpoint(&["ngo", "complete", id])?;
        self.execute(self.http.put(url).multipart(form.to_multipart()?))
            .await
    }

    pub async fn ngo_reports(&self, kind: NgoListKind, ngo_id: &str) -> Result<NgoReports> {
        let url = self.endpoint(&["ngo", kind.path(), ngo_id])?;
        self.fetch(self.http.get(url)).await
    }

    // Admin.

    pub async fn users(&self) -> Result<Vec<User>> {
        let url = self.endpoint(&["admin", "users"])?;
        let listing: Listing<User> = self.fetch(self.http.get(url)).await?;
        Ok(listing.into_vec())
    }

    pub async fn ngos(&self) -> Result<Vec<User>> {
        let url = self.endpoint(&["admin", "ngos"])?;
        let listing: Listing<User> = self.fetch(self.http.get(url)).await?;
        Ok(listing.into_vec())
    }

    pub async fn ngo_requests(&self) -> Result<Vec<NgoRequest>> {
        let url = self.endpoint(&["admin", "ngo-requests"])?;
        let listing: Listing<NgoRequest> = self.fetch(self.http.get(url)).await?;
        Ok(listing.into_vec())
    }

    pub async fn delete_user(&self, id: &str) -> Result<Ack> {
        let url = self.endpoint(&["admin", "users", id])?;
        self.execute(self.http.delete(url)).await
    }

    pub async fn remove_ngo_role(&self, id: &str) -> Result<Ack> {
        let url = self.endpoint(&["admin", "remove-ngo-role", id])?;
        self.execute(self.http.put(url)).await
    }

    pub async fn review_ngo_request(&self, id: &str, action: Decision) -> Result<Ack> {
        let url = self.endpoint(&["admin", "ngo-request", id])?;
        self.execute(self.http.put(url).json(&ReviewBody { action }))
            .await
    }

    pub async fn delete_report(&self, id: &str) -> Result<Ack> {
        let url = self.endpoint(&["admin", "report", id])?;
        self.execute(self.http.delete(url)).await
    }
}

/// Turn a non-success response into [`Error::Api`].
async fn check(res: reqwest::Response) -> Result<reqwest::Response> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }

    let message = res
        .json::<ErrorBody>()
        .await
        .ok()
        .and_then(ErrorBody::into_message);
    Err(Error::Api { status, message })
}
