//! Wire types shared with the EcoTrack backend.
//!
//! The backend is document-oriented: ids travel as `_id`, references to
//! users are either populated objects or bare ids, and most collections are
//! omitted entirely when empty.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A latitude/longitude pair.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Whether both coordinates are set. The backend stores unset locations as zeroes.
    pub fn is_set(&self) -> bool {
        self.lat != 0.0 && self.lng != 0.0
    }
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.5},{:.5}", self.lat, self.lng)
    }
}

/// Lifecycle state of a report.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Pending,
    Taken,
    Completed,
}

impl ReportStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Taken => "taken",
            Self::Completed => "completed",
        }
    }

    /// Whether the backend may move a report from `self` to `next`.
    ///
    /// Staying put is always allowed; otherwise only pending -> taken,
    /// taken -> completed and taken -> pending (missed due date) exist.
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Pending | Self::Taken)
                | (Self::Taken, _)
                | (Self::Completed, Self::Completed)
        )
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ReportStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "taken" => Ok(Self::Taken),
            "completed" => Ok(Self::Completed),
            other => Err(format!("unknown report status {other:?}")),
        }
    }
}

/// Account role. Only an admin action changes it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Ngo,
    Admin,
}

impl Role {
    /// NGOs and admins may claim and resolve reports.
    pub const fn is_responder(self) -> bool {
        matches!(self, Self::Ngo | Self::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::User => "user",
            Self::Ngo => "ngo",
            Self::Admin => "admin",
        })
    }
}

/// A full account as returned by `/user/me` and the admin listings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub photo: Option<String>,
    #[serde(default)]
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mobile_number: Option<String>,
}

/// Reference to a user embedded in another document.
///
/// Deserializes from a bare id, a populated object or `null`. The backend
/// sends `null` once the referenced account was deleted; that becomes the
/// placeholder returned by [`UserRef::deleted`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "UserRefRepr", into = "UserRefRepr")]
pub struct UserRef {
    pub id: String,
    pub name: Option<String>,
    pub photo: Option<String>,
    pub email: Option<String>,
}

impl UserRef {
    pub fn deleted() -> Self {
        Self::default()
    }

    pub fn is_deleted(&self) -> bool {
        self.id.is_empty()
    }

    pub fn display_name(&self) -> &str {
        match self.name.as_deref() {
            Some(name) => name,
            None if self.is_deleted() => "Deleted user",
            None => &self.id,
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum UserRefRepr {
    Deleted,
    Id(String),
    Populated {
        #[serde(rename = "_id")]
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        photo: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        email: Option<String>,
    },
}

impl From<UserRefRepr> for UserRef {
    fn from(repr: UserRefRepr) -> Self {
        match repr {
            UserRefRepr::Deleted => Self::deleted(),
            UserRefRepr::Id(id) => Self {
                id,
                ..Self::default()
            },
            UserRefRepr::Populated {
                id,
                name,
                photo,
                email,
            } => Self {
                id,
                name,
                photo,
                email,
            },
        }
    }
}

impl From<UserRef> for UserRefRepr {
    fn from(user: UserRef) -> Self {
        if user.is_deleted() {
            return Self::Deleted;
        }
        Self::Populated {
            id: user.id,
            name: user.name,
            photo: user.photo,
            email: user.email,
        }
    }
}

impl From<&User> for UserRef {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            name: Some(user.name.clone()),
            photo: user.photo.clone(),
            email: Some(user.email.clone()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub user: UserRef,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// A problem report and its full lifecycle state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub landmark: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub photos: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_location: Option<GeoPoint>,
    pub status: ReportStatus,
    #[serde(default)]
    pub posted_by: UserRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub taken_by: Option<UserRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub taken_on: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_on: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution_description: Option<String>,
    #[serde(default)]
    pub resolved_images: Vec<String>,
    #[serde(default)]
    pub comments: Vec<Comment>,
    #[serde(default)]
    pub upvotes: Vec<String>,
    #[serde(default)]
    pub incompleted_by: Vec<UserRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Report {
    pub fn upvote_count(&self) -> usize {
        self.upvotes.len()
    }

    pub fn is_upvoted_by(&self, user_id: &str) -> bool {
        self.upvotes.iter().any(|id| id == user_id)
    }

    pub fn is_taken_by(&self, user_id: &str) -> bool {
        self.taken_by.as_ref().is_some_and(|u| u.id == user_id)
    }

    /// List the ways this document disagrees with the lifecycle rules.
    pub fn invariant_violations(&self) -> Vec<&'static str> {
        let mut violations = Vec::new();
        if self.status == ReportStatus::Pending {
            if self.taken_by.is_some() {
                violations.push("pending report has takenBy");
            }
            if self.due_date.is_some() {
                violations.push("pending report has dueDate");
            }
        } else {
            if self.taken_by.is_none() {
                violations.push("claimed report has no takenBy");
            }
            if self.due_date.is_none() {
                violations.push("claimed report has no dueDate");
            }
        }
        if self.photos.len() > crate::forms::MAX_PHOTOS {
            violations.push("report has more than five photos");
        }
        violations
    }
}

/// Minimal projection of a report used for map plotting.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReportLocation {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub status: ReportStatus,
    #[serde(rename = "autoLocation", default)]
    pub location: Option<GeoPoint>,
}

/// One page of the filtered report listing.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportPage {
    #[serde(default)]
    pub reports: Vec<Report>,
    #[serde(default = "one")]
    pub total_pages: u32,
}

const fn one() -> u32 {
    1
}

/// `{ reports: [...] }` envelope.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct ReportList<T> {
    #[serde(default = "Vec::new")]
    pub reports: Vec<T>,
}

/// `{ report: {...} }` envelope.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct ReportEnvelope {
    pub report: Report,
}

/// `{ user: {...} }` envelope.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct UserEnvelope {
    pub user: User,
}

/// Reports attached to an NGO, with the backend's own count.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NgoReports {
    #[serde(default)]
    pub count: usize,
    #[serde(default)]
    pub reports: Vec<Report>,
}

/// Which NGO listing to read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NgoListKind {
    /// Claimed and not yet resolved.
    Taken,
    Completed,
    /// Claimed but the due date passed.
    Incompleted,
}

impl NgoListKind {
    pub const fn path(self) -> &'static str {
        match self {
            Self::Taken => "taken",
            Self::Completed => "completed",
            Self::Incompleted => "incompleted",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

/// A pending (or reviewed) application to become an NGO.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NgoRequest {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub registration_number: Option<String>,
    #[serde(default)]
    pub mobile_number: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub logo: Option<String>,
    #[serde(default)]
    pub status: RequestStatus,
}

/// Admin verdict on an NGO request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approve,
    Reject,
}

/// The backend returns admin listings either bare or wrapped in a named field.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum Listing<T> {
    Bare(Vec<T>),
    Users { users: Vec<T> },
    Ngos { ngos: Vec<T> },
    Requests { requests: Vec<T> },
}

impl<T> Listing<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Self::Bare(v) | Self::Users { users: v } | Self::Ngos { ngos: v } | Self::Requests { requests: v } => v,
        }
    }
}

/// Due dates travel as plain calendar dates.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TakeBody {
    pub due_date: NaiveDate,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_ref_accepts_both_shapes() {
        let bare: UserRef = serde_json::from_str(r#""abc123""#).unwrap();
        assert_eq!(bare.id, "abc123");
        assert_eq!(bare.display_name(), "abc123");

        let populated: UserRef =
            serde_json::from_str(r#"{"_id":"abc123","name":"Green Earth","photo":"p.png"}"#)
                .unwrap();
        assert_eq!(populated.display_name(), "Green Earth");
        assert_eq!(populated.photo.as_deref(), Some("p.png"));
    }

    #[test]
    fn report_defaults_missing_collections() {
        let report: Report = serde_json::from_str(
            r#"{"_id":"r1","title":"Overflowing bin","status":"pending","postedBy":"u1"}"#,
        )
        .unwrap();
        assert!(report.photos.is_empty());
        assert!(report.comments.is_empty());
        assert_eq!(report.upvote_count(), 0);
        assert!(report.invariant_violations().is_empty());
    }

    #[test]
    fn status_transitions() {
        use ReportStatus::*;
        assert!(Pending.can_transition_to(Taken));
        assert!(Taken.can_transition_to(Completed));
        assert!(Taken.can_transition_to(Pending));
        assert!(!Pending.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Taken));
        assert!(!Completed.can_transition_to(Pending));
    }

    #[test]
    fn pending_report_with_claimant_is_flagged() {
        let report: Report = serde_json::from_str(
            r#"{"_id":"r1","title":"t","status":"pending","postedBy":"u1","takenBy":"n1"}"#,
        )
        .unwrap();
        assert_eq!(
            report.invariant_violations(),
            vec!["pending report has takenBy"]
        );
    }

    #[test]
    fn claimed_report_needs_claimant_and_due_date() {
        let report: Report = serde_json::from_str(
            r#"{"_id":"r1","title":"t","status":"taken","postedBy":"u1"}"#,
        )
        .unwrap();
        assert_eq!(
            report.invariant_violations(),
            vec!["claimed report has no takenBy", "claimed report has no dueDate"]
        );

        let report: Report = serde_json::from_str(
            r#"{"_id":"r1","title":"t","status":"completed","postedBy":"u1","takenBy":"n1"}"#,
        )
        .unwrap();
        assert_eq!(
            report.invariant_violations(),
            vec!["claimed report has no dueDate"]
        );
    }

    #[test]
    fn deleted_authors_decode_as_placeholders() {
        let page: ReportPage = serde_json::from_str(
            r#"{
                "reports": [
                    {"_id":"r1","title":"Overflowing bin","status":"pending","postedBy":null,
                     "comments":[{"user":null,"text":"Still there"},{"user":"u2","text":"Same"}]},
                    {"_id":"r2","title":"Broken light","status":"pending","postedBy":"u1"}
                ],
                "totalPages": 1
            }"#,
        )
        .unwrap();

        let orphan = &page.reports[0];
        assert!(orphan.posted_by.is_deleted());
        assert_eq!(orphan.posted_by.display_name(), "Deleted user");
        assert!(orphan.comments[0].user.is_deleted());
        assert_eq!(orphan.comments[1].user.display_name(), "u2");
        assert!(!page.reports[1].posted_by.is_deleted());

        // A missing author reads the same as a null one and writes back as null.
        let report: Report =
            serde_json::from_str(r#"{"_id":"r3","title":"t","status":"pending"}"#).unwrap();
        assert!(report.posted_by.is_deleted());
        let json = serde_json::to_value(&report).unwrap();
        assert!(json["postedBy"].is_null());
    }

    #[test]
    fn listing_unwraps_any_envelope() {
        let bare: Listing<String> = serde_json::from_str(r#"["a","b"]"#).unwrap();
        assert_eq!(bare.into_vec(), vec!["a", "b"]);
        let wrapped: Listing<String> = serde_json::from_str(r#"{"ngos":["a"]}"#).unwrap();
        assert_eq!(wrapped.into_vec(), vec!["a"]);
    }
}
