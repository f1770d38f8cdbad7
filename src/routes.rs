//! Route table and access guards.

use std::fmt;

use crate::{
    models::{Role, User},
    session::SessionHandle,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Route {
    Home,
    OauthSuccess,
    NgoRegistration,
    About,
    Contact,
    Login,
    Register,
    ForgotPassword,
    ResetPassword,
    MyActivities,
    Report(String),
    /// Own profile when `None`.
    Profile(Option<String>),
    NgoDashboard,
    AdminPanel,
    NotFound(String),
}

/// Who may visit a route.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    Open,
    /// Only visitors without an identity (login, register, ...).
    PublicOnly,
    Authenticated,
    Roles(&'static [Role]),
}

/// What a guard decided.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Guard {
    Allow,
    Redirect(Route),
    /// The identity is still being resolved.
    Wait,
}

const RESPONDERS: &[Role] = &[Role::Ngo, Role::Admin];
const ADMINS: &[Role] = &[Role::Admin];

impl Route {
    pub fn parse(path: &str) -> Self {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        match segments.as_slice() {
            [] => Self::Home,
            ["oauth", "success"] => Self::OauthSuccess,
            ["ngo-registration"] => Self::NgoRegistration,
            ["about"] => Self::About,
            ["contact"] => Self::Contact,
            ["login"] => Self::Login,
            ["register"] => Self::Register,
            ["forgot-password"] => Self::ForgotPassword,
            ["reset-password"] => Self::ResetPassword,
            ["my-activities"] => Self::MyActivities,
            ["report", id] => Self::Report((*id).to_owned()),
            ["profile"] => Self::Profile(None),
            ["profile", id] => Self::Profile(Some((*id).to_owned())),
            ["ngo-dashboard"] => Self::NgoDashboard,
            ["admin-panel"] => Self::AdminPanel,
            _ => Self::NotFound(path.to_owned()),
        }
    }

    pub fn path(&self) -> String {
        match self {
            Self::Home => "/".to_owned(),
            Self::OauthSuccess => "/oauth/success".to_owned(),
            Self::NgoRegistration => "/ngo-registration".to_owned(),
            Self::About => "/about".to_owned(),
            Self::Contact => "/contact".to_owned(),
            Self::Login => "/login".to_owned(),
            Self::Register => "/register".to_owned(),
            Self::ForgotPassword => "/forgot-password".to_owned(),
            Self::ResetPassword => "/reset-password".to_owned(),
            Self::MyActivities => "/my-activities".to_owned(),
            Self::Report(id) => format!("/report/{id}"),
            Self::Profile(None) => "/profile".to_owned(),
            Self::Profile(Some(id)) => format!("/profile/{id}"),
            Self::NgoDashboard => "/ngo-dashboard".to_owned(),
            Self::AdminPanel => "/admin-panel".to_owned(),
            Self::NotFound(path) => path.clone(),
        }
    }

    pub const fn access(&self) -> Access {
        match self {
            Self::Home
            | Self::OauthSuccess
            | Self::NgoRegistration
            | Self::About
            | Self::Contact
            | Self::NotFound(_) => Access::Open,
            Self::Login | Self::Register | Self::ForgotPassword | Self::ResetPassword => {
                Access::PublicOnly
            }
            Self::MyActivities | Self::Report(_) | Self::Profile(_) => Access::Authenticated,
            Self::NgoDashboard => Access::Roles(RESPONDERS),
            Self::AdminPanel => Access::Roles(ADMINS),
        }
    }

    /// Decide whether `identity` may visit this route.
    ///
    /// While the identity is loading only pre-auth routes wait; identity
    /// routes redirect to login straight away, matching what an anonymous
    /// visitor would see.
    pub fn guard(&self, identity: Option<&User>, loading: bool) -> Guard {
        match (self.access(), identity) {
            (Access::Open, _) => Guard::Allow,
            (Access::PublicOnly, _) if loading => Guard::Wait,
            (Access::PublicOnly, None) => Guard::Allow,
            (Access::PublicOnly, Some(_)) => Guard::Redirect(Self::Home),
            (Access::Authenticated | Access::Roles(_), None) => Guard::Redirect(Self::Login),
            (Access::Authenticated, Some(_)) => Guard::Allow,
            (Access::Roles(roles), Some(user)) if roles.contains(&user.role) => Guard::Allow,
            (Access::Roles(_), Some(_)) => Guard::Redirect(Self::Home),
        }
    }

    /// [`Route::guard`] against the live session.
    pub async fn check(&self, session: &SessionHandle) -> Guard {
        let identity = session.identity().await;
        let loading = session.is_loading().await;
        self.guard(identity.as_ref(), loading)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}
