//! The interactive client shell.
//!
//! One process is one browsing session: the cookie store and the
//! [`SessionStore`] live as long as the shell does.

use std::{fmt::Write as _, path::PathBuf, sync::Arc};

use anyhow::Context as _;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use clap_verbosity_flag::{log::LevelFilter, InfoLevel, Verbosity};
use figment::{providers::Format as _, Figment};
use tokio::io::{AsyncBufReadExt as _, AsyncWrite, AsyncWriteExt as _, BufReader};
use tracing::{debug, info, warn};

use crate::{
    activity::{self, ActivityTab, NgoActivity, ProfileReports, ProfileView},
    admin::AdminPanel,
    auth::AuthFlows,
    client::{build_client, ApiClient, Client},
    config::AppConfig,
    feed::{FeedSnapshot, FeedView},
    forms::{
        CreateReportForm, Credentials, NgoApplication, PasswordReset, ProfileUpdate,
        Registration, ResolveForm, Upload,
    },
    local_store::LocalStore,
    map::{GoogleGeocoder, Geocoder, Locator, MapView, MarkerKind},
    models::{Decision, GeoPoint, NgoListKind, Report, ReportStatus, User},
    notify::{ConsoleNotifier, Notifier},
    report_view::{Capabilities, ReportView},
    routes::{Guard, Route},
    session::SessionStore,
};

#[derive(Parser, Debug, Clone)]
#[command(version, about)]
/// Command line arguments.
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "ecotrack.toml")]
    config: PathBuf,
    /// The verbosity level.
    #[command(flatten)]
    verbosity: Verbosity<InfoLevel>,
    /// Run one shell command and exit instead of starting the prompt.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

/// One line typed at the prompt.
#[derive(Parser, Debug)]
#[command(no_binary_name = true, disable_version_flag = true)]
struct Line {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Visit a page, e.g. `go /report/<id>` or `go /admin-panel`.
    Go { path: String },
    /// Show the signed-in identity.
    Whoami,
    Login { email: String, password: String },
    Logout,
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long, default_value = "")]
        city: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        confirm: String,
    },
    /// Print the Google sign-in URL.
    Oauth,
    /// Finish Google sign-in once the browser has been redirected back.
    OauthDone,
    /// Request a password-reset OTP.
    Forgot { email: String },
    ResendOtp,
    /// Set a new password with the emailed OTP.
    Reset {
        otp: String,
        new_password: String,
        confirm: String,
    },
    /// Apply to register an organisation as an NGO.
    ApplyNgo {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long, default_value = "")]
        city: String,
        #[arg(long)]
        registration_number: String,
        #[arg(long)]
        mobile: String,
        #[arg(long, default_value = "")]
        message: String,
        #[arg(long)]
        logo: Option<PathBuf>,
    },
    /// List reports. Filters stick until changed.
    Feed {
        #[arg(long)]
        city: Option<String>,
        /// pending, taken, completed or all
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        page: Option<u32>,
    },
    Next,
    Prev,
    /// Plot the current feed.
    Map {
        #[arg(long)]
        geojson: bool,
        /// Device latitude.
        #[arg(long, requires = "lng")]
        lat: Option<f64>,
        /// Device longitude.
        #[arg(long, requires = "lat")]
        lng: Option<f64>,
    },
    /// Report a new problem.
    New {
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: String,
        #[arg(long)]
        landmark: String,
        #[arg(long)]
        city: String,
        #[arg(long = "photo")]
        photos: Vec<PathBuf>,
        /// Defaults to the center of the city.
        #[arg(long, requires = "lng")]
        lat: Option<f64>,
        #[arg(long, requires = "lat")]
        lng: Option<f64>,
    },
    Show { id: String },
    Upvote { id: String },
    Comment {
        id: String,
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
    /// Take a pending report, due on YYYY-MM-DD.
    Claim { id: String, due: NaiveDate },
    Resolve {
        id: String,
        #[arg(long = "image")]
        images: Vec<PathBuf>,
        #[arg(long)]
        description: String,
    },
    Delete { id: String },
    /// My reports, upvotes or comments.
    Activity { tab: Option<ActivityTab> },
    Dashboard,
    Profile { id: Option<String> },
    EditProfile {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        city: String,
        #[arg(long)]
        photo: Option<PathBuf>,
    },
    Admin {
        #[command(subcommand)]
        action: Option<AdminAction>,
    },
    #[command(alias = "exit")]
    Quit,
}

#[derive(Subcommand, Debug)]
enum AdminAction {
    DeleteUser { id: String },
    RemoveNgo { id: String },
    Approve { id: String },
    Reject { id: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

/// Split a line into words, honouring quotes and backslash escapes.
fn tokenize(line: &str) -> Result<Vec<String>, String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), c) => current.push(c),
            (None, '"' | '\'') => {
                quote = Some(c);
                in_token = true;
            }
            (None, '\\') => {
                if let Some(next) = chars.next() {
                    current.push(next);
                    in_token = true;
                }
            }
            (None, c) if c.is_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            (None, c) => {
                current.push(c);
                in_token = true;
            }
        }
    }

    if quote.is_some() {
        return Err("unterminated quote".to_owned());
    }
    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}

/// Errors from views were already shown through the notifier.
fn settle<T>(result: crate::Result<T>) -> Option<T> {
    result
        .inspect_err(|e| debug!("action ended with: {e}"))
        .ok()
}

fn parse_status(status: &str) -> Result<Option<ReportStatus>, String> {
    match status.trim() {
        "" | "all" => Ok(None),
        other => other.parse().map(Some),
    }
}

fn report_line(report: &Report) -> String {
    format!(
        "{:<14} [{:<9}] {} - {}  upvotes:{} comments:{}",
        report.id,
        report.status,
        report.title,
        report.city,
        report.upvote_count(),
        report.comments.len()
    )
}

fn report_lines(out: &mut String, reports: &[Report]) {
    if reports.is_empty() {
        out.push_str("  (no reports)\n");
    }
    for report in reports {
        let _ = writeln!(out, "  {}", report_line(report));
    }
}

fn render_report(report: &Report, caps: Capabilities) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} [{}]", report.title, report.status);
    let _ = writeln!(out, "  {}", report.description);
    let _ = writeln!(out, "  at {}, {}", report.landmark, report.city);
    if let Some(location) = report.auto_location.filter(GeoPoint::is_set) {
        let _ = writeln!(out, "  location {location}");
    }
    let _ = writeln!(out, "  posted by {}", report.posted_by.display_name());
    if let Some(taken_by) = &report.taken_by {
        let due = report
            .due_date
            .map(|d| d.date_naive().to_string())
            .unwrap_or_default();
        let _ = writeln!(out, "  taken by {} (due {due})", taken_by.display_name());
    }
    if let Some(resolution) = &report.resolution_description {
        let _ = writeln!(
            out,
            "  resolved: {resolution} ({} images)",
            report.resolved_images.len()
        );
    }
    let _ = writeln!(
        out,
        "  {} photos, {} upvotes{}",
        report.photos.len(),
        report.upvote_count(),
        if caps.has_upvoted { " (including yours)" } else { "" }
    );
    for comment in &report.comments {
        let _ = writeln!(out, "  - {}: {}", comment.user.display_name(), comment.text);
    }

    let actions: Vec<&str> = [
        (caps.can_upvote, "upvote"),
        (caps.can_comment, "comment"),
        (caps.can_claim, "claim"),
        (caps.can_resolve, "resolve"),
        (caps.can_delete, "delete"),
    ]
    .into_iter()
    .filter_map(|(allowed, name)| allowed.then_some(name))
    .collect();
    if !actions.is_empty() {
        let _ = writeln!(out, "  actions: {}", actions.join(", "));
    }
    out
}

fn render_feed(snapshot: &FeedSnapshot) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "page {}/{}  city: {}  status: {}",
        snapshot.page,
        snapshot.total_pages,
        if snapshot.city.is_empty() { "any" } else { &snapshot.city },
        snapshot.status.map_or("any", ReportStatus::as_str),
    );
    report_lines(&mut out, &snapshot.reports);
    out
}

fn render_ngo(activity: &NgoActivity) -> String {
    let counts = activity.counts();
    let mut out = format!(
        "completed: {}  incompleted: {}  taken: {}\n",
        counts.completed, counts.incompleted, counts.taken
    );
    for kind in [NgoListKind::Taken, NgoListKind::Completed, NgoListKind::Incompleted] {
        let _ = writeln!(out, "{}:", kind.path());
        report_lines(&mut out, activity.reports(kind));
    }
    out
}

fn user_line(user: &User) -> String {
    format!(
        "  {:<14} {} <{}> {}{}",
        user.id,
        user.name,
        user.email,
        user.role,
        user.city
            .as_deref()
            .map(|c| format!(" ({c})"))
            .unwrap_or_default()
    )
}

async fn load_uploads(paths: &[PathBuf]) -> crate::Result<Vec<Upload>> {
    let mut uploads = Vec::with_capacity(paths.len());
    for path in paths {
        uploads.push(Upload::from_path(path).await?);
    }
    Ok(uploads)
}

struct Shell<W> {
    client: ApiClient,
    session: SessionStore,
    notifier: Arc<dyn Notifier>,
    feed: FeedView,
    locator: Locator,
    auth: AuthFlows,
    out: W,
}

impl<W: AsyncWrite + Unpin> Shell<W> {
    fn new(config: &AppConfig, http: Client, client: ApiClient, notifier: Arc<dyn Notifier>, out: W) -> Self {
        let geocoder = GoogleGeocoder::new(http, &config.maps).map(|g| Arc::new(g) as Arc<dyn Geocoder>);
        if geocoder.is_none() {
            warn!("no maps.api_key configured; city locations fall back to the default");
        }

        Self {
            session: SessionStore::new(client.clone(), Arc::clone(&notifier)),
            feed: FeedView::new(client.clone(), Arc::clone(&notifier), config.feed.clone()),
            locator: Locator::new(geocoder, config.maps.default_location, Arc::clone(&notifier)),
            auth: AuthFlows::new(
                client.clone(),
                LocalStore::new(&config.state_dir),
                Arc::clone(&notifier),
            ),
            client,
            notifier,
            out,
        }
    }

    async fn say(&mut self, text: impl AsRef<str>) -> anyhow::Result<()> {
        let text = text.as_ref();
        self.out.write_all(text.as_bytes()).await?;
        if !text.ends_with('\n') {
            self.out.write_all(b"\n").await?;
        }
        self.out.flush().await?;
        Ok(())
    }

    /// Apply the route guard. `false` means the command must not run.
    async fn enter(&mut self, route: &Route) -> anyhow::Result<bool> {
        match route.check(&self.session.handle()).await {
            Guard::Allow => Ok(true),
            Guard::Redirect(to) => {
                self.say(format!("{route} is not available here; go to {to}"))
                    .await?;
                Ok(false)
            }
            Guard::Wait => {
                self.say("Still checking your session, try again").await?;
                Ok(false)
            }
        }
    }

    async fn execute(&mut self, line: &str) -> anyhow::Result<Flow> {
        let tokens = match tokenize(line) {
            Ok(tokens) if tokens.is_empty() => return Ok(Flow::Continue),
            Ok(tokens) => tokens,
            Err(e) => {
                self.say(e).await?;
                return Ok(Flow::Continue);
            }
        };
        match Line::try_parse_from(tokens) {
            Ok(line) => self.dispatch(line.command).await,
            Err(e) => {
                self.say(e.render().to_string()).await?;
                Ok(Flow::Continue)
            }
        }
    }

    /// The command that renders a route, if the page shows data.
    fn route_command(route: &Route) -> Option<Command> {
        match route {
            Route::Home => Some(Command::Feed {
                city: None,
                status: None,
                page: None,
            }),
            Route::Report(id) => Some(Command::Show { id: id.clone() }),
            Route::MyActivities => Some(Command::Activity { tab: None }),
            Route::Profile(id) => Some(Command::Profile { id: id.clone() }),
            Route::NgoDashboard => Some(Command::Dashboard),
            Route::AdminPanel => Some(Command::Admin { action: None }),
            Route::OauthSuccess => Some(Command::OauthDone),
            _ => None,
        }
    }

    #[expect(clippy::too_many_lines, reason = "one arm per command")]
    async fn dispatch(&mut self, command: Command) -> anyhow::Result<Flow> {
        let command = match command {
            Command::Go { path } => {
                let route = Route::parse(&path);
                if let Route::NotFound(path) = &route {
                    self.say(format!("404: {path} not found")).await?;
                    return Ok(Flow::Continue);
                }
                match Self::route_command(&route) {
                    Some(command) => command,
                    None => {
                        if self.enter(&route).await? {
                            self.say(format!("{route}")).await?;
                        }
                        return Ok(Flow::Continue);
                    }
                }
            }
            other => other,
        };

        match command {
            Command::Go { .. } => {}
            Command::Quit => return Ok(Flow::Quit),
            Command::Whoami => {
                let text = match self.session.handle().identity().await {
                    Some(user) => user_line(&user),
                    None => "anonymous".to_owned(),
                };
                self.say(text).await?;
            }
            Command::Login { email, password } => {
                if self.enter(&Route::Login).await? {
                    settle(self.session.login(&Credentials { email, password }).await);
                }
            }
            Command::Logout => {
                if self.session.handle().is_authenticated().await {
                    settle(self.session.logout().await);
                } else {
                    self.say("Not signed in").await?;
                }
            }
            Command::Register {
                name,
                email,
                city,
                password,
                confirm,
            } => {
                if self.enter(&Route::Register).await? {
                    let registration = Registration {
                        name,
                        email,
                        city,
                        password,
                        confirm_password: confirm,
                    };
                    settle(self.auth.register(&registration).await);
                }
            }
            Command::Oauth => {
                if self.enter(&Route::Login).await? {
                    if let Some(url) = settle(self.auth.oauth_url()) {
                        self.say(format!("Open {url} in a browser, then run `oauth-done`"))
                            .await?;
                    }
                }
            }
            Command::OauthDone => {
                if self.session.complete_oauth().await.is_some() {
                    self.notifier.success("Login successful");
                } else {
                    self.notifier.error("Google sign-in did not complete");
                }
            }
            Command::Forgot { email } => {
                if self.enter(&Route::ForgotPassword).await? {
                    settle(self.auth.forgot_password(&email).await);
                }
            }
            Command::ResendOtp => {
                if self.enter(&Route::ResetPassword).await? {
                    settle(self.auth.resend_otp().await);
                }
            }
            Command::Reset {
                otp,
                new_password,
                confirm,
            } => {
                if self.enter(&Route::ResetPassword).await? {
                    let reset = PasswordReset {
                        otp,
                        new_password,
                        confirm_new_password: confirm,
                    };
                    settle(self.auth.reset_password(&reset).await);
                }
            }
            Command::ApplyNgo {
                name,
                email,
                city,
                registration_number,
                mobile,
                message,
                logo,
            } => {
                if self.enter(&Route::NgoRegistration).await? {
                    let logo = match logo {
                        Some(path) => match Upload::from_path(&path).await {
                            Ok(upload) => Some(upload),
                            Err(e) => {
                                self.notifier.error(e.user_message("Could not read logo"));
                                return Ok(Flow::Continue);
                            }
                        },
                        None => None,
                    };
                    let application = NgoApplication {
                        name,
                        email,
                        city,
                        registration_number,
                        mobile_number: mobile,
                        message,
                        logo,
                    };
                    settle(self.auth.apply_ngo(&application).await);
                }
            }
            Command::Feed { city, status, page } => {
                if !self.enter(&Route::Home).await? {
                    return Ok(Flow::Continue);
                }
                let status = match status.as_deref().map(parse_status).transpose() {
                    Ok(status) => status,
                    Err(e) => {
                        self.say(e).await?;
                        return Ok(Flow::Continue);
                    }
                };

                let mut snapshot = None;
                if let Some(city) = city {
                    snapshot = self.feed.set_city(&city).await;
                }
                if let Some(status) = status {
                    snapshot = Some(self.feed.set_status(status).await);
                }
                if let Some(page) = page {
                    snapshot = settle(self.feed.set_page(page).await);
                }
                let snapshot = match snapshot {
                    Some(snapshot) => snapshot,
                    None => self.feed.refresh().await,
                };
                self.say(render_feed(&snapshot)).await?;
            }
            Command::Next => {
                if let Some(snapshot) = settle(self.feed.next_page().await) {
                    self.say(render_feed(&snapshot)).await?;
                }
            }
            Command::Prev => {
                if let Some(snapshot) = settle(self.feed.prev_page().await) {
                    self.say(render_feed(&snapshot)).await?;
                }
            }
            Command::Map { geojson, lat, lng } => {
                let device = lat.zip(lng).map(|(lat, lng)| GeoPoint::new(lat, lng));
                let city = self.session.handle().identity().await.and_then(|u| u.city);
                let viewer = self.locator.viewer_location(device, city.as_deref()).await;
                let snapshot = self.feed.snapshot().await;
                let map = MapView::project(&snapshot.locations, viewer);

                let text = if geojson {
                    serde_json::to_string_pretty(&map.to_geojson())?
                } else {
                    let mut out = format!("center {} zoom {}\n", map.center, map.zoom);
                    for marker in &map.markers {
                        let label = match &marker.kind {
                            MarkerKind::Report { id, .. } => id.as_str(),
                            MarkerKind::Viewer => "you",
                        };
                        let _ = writeln!(
                            out,
                            "  {} {label:<14} {} {}",
                            marker.color, marker.position, marker.title
                        );
                    }
                    out
                };
                self.say(text).await?;
            }
            Command::New {
                title,
                description,
                landmark,
                city,
                photos,
                lat,
                lng,
            } => {
                if !self.session.handle().is_authenticated().await {
                    self.notifier.error("Login to report an issue");
                    return Ok(Flow::Continue);
                }
                let Some(uploads) = settle(
                    load_uploads(&photos)
                        .await
                        .inspect_err(|e| self.notifier.error(e.user_message("Could not read photo"))),
                ) else {
                    return Ok(Flow::Continue);
                };
                let location = match lat.zip(lng) {
                    Some((lat, lng)) => GeoPoint::new(lat, lng),
                    None => self.locator.pick_center(&city).await,
                };
                let mut form = CreateReportForm {
                    title,
                    description,
                    landmark,
                    city,
                    photos: Vec::new(),
                    location: Some(location),
                };
                form.attach_photos(uploads);
                if let Some(snapshot) = settle(self.feed.submit_report(&form).await) {
                    self.say(render_feed(&snapshot)).await?;
                }
            }
            Command::Show { id } => {
                if let Some(view) = self.open_report(&id).await? {
                    let text = render_report(view.report(), view.capabilities().await);
                    self.say(text).await?;
                }
            }
            Command::Upvote { id } => {
                if let Some(mut view) = self.open_report(&id).await? {
                    settle(view.toggle_upvote().await);
                    self.show(&view).await?;
                }
            }
            Command::Comment { id, text } => {
                if let Some(mut view) = self.open_report(&id).await? {
                    settle(view.add_comment(&text.join(" ")).await);
                    self.show(&view).await?;
                }
            }
            Command::Claim { id, due } => {
                if let Some(mut view) = self.open_report(&id).await? {
                    settle(view.claim(due).await);
                    self.show(&view).await?;
                }
            }
            Command::Resolve {
                id,
                images,
                description,
            } => {
                if let Some(mut view) = self.open_report(&id).await? {
                    let mut form = ResolveForm {
                        images: Vec::new(),
                        description,
                    };
                    let attached = match load_uploads(&images).await {
                        Ok(uploads) => form.attach(uploads),
                        Err(e) => Err(e),
                    };
                    match attached {
                        Ok(()) => {
                            settle(view.resolve(&form).await);
                        }
                        Err(e) => self.notifier.error(e.user_message("Could not read image")),
                    }
                    self.show(&view).await?;
                }
            }
            Command::Delete { id } => {
                if let Some(view) = self.open_report(&id).await? {
                    if let Err((view, e)) = view.delete().await {
                        debug!("delete refused: {e}");
                        self.show(&view).await?;
                    }
                }
            }
            Command::Activity { tab } => {
                if self.enter(&Route::MyActivities).await? {
                    let tab = tab.unwrap_or_default();
                    let reports =
                        activity::my_activity(&self.client, self.notifier.as_ref(), tab).await;
                    if let Some(reports) = settle(reports) {
                        let mut out = format!("{tab:?}:\n").to_lowercase();
                        report_lines(&mut out, &reports);
                        self.say(out).await?;
                    }
                }
            }
            Command::Dashboard => {
                if self.enter(&Route::NgoDashboard).await? {
                    let dashboard = activity::ngo_dashboard(
                        &self.client,
                        &self.session.handle(),
                        self.notifier.as_ref(),
                    )
                    .await;
                    if let Some(dashboard) = settle(dashboard) {
                        self.say(render_ngo(&dashboard)).await?;
                    }
                }
            }
            Command::Profile { id } => {
                if self.enter(&Route::Profile(id.clone())).await? {
                    let profile = ProfileView::load(
                        self.client.clone(),
                        &self.session.handle(),
                        Arc::clone(&self.notifier),
                        id.as_deref(),
                    )
                    .await;
                    if let Some(profile) = settle(profile) {
                        let mut out = user_line(&profile.user);
                        out.push('\n');
                        match &profile.reports {
                            ProfileReports::Ngo(activity) => out.push_str(&render_ngo(activity)),
                            ProfileReports::Posted(reports) => report_lines(&mut out, reports),
                        }
                        self.say(out).await?;
                    }
                }
            }
            Command::EditProfile { name, city, photo } => {
                if self.enter(&Route::Profile(None)).await? {
                    self.edit_profile(name, city, photo).await?;
                }
            }
            Command::Admin { action } => {
                if self.enter(&Route::AdminPanel).await? {
                    self.admin(action).await?;
                }
            }
        }
        Ok(Flow::Continue)
    }

    async fn open_report(&mut self, id: &str) -> anyhow::Result<Option<ReportView>> {
        if !self.enter(&Route::Report(id.to_owned())).await? {
            return Ok(None);
        }
        let view = ReportView::open(
            self.client.clone(),
            self.session.handle(),
            Arc::clone(&self.notifier),
            id,
        )
        .await;
        Ok(settle(view))
    }

    async fn show(&mut self, view: &ReportView) -> anyhow::Result<()> {
        let text = render_report(view.report(), view.capabilities().await);
        self.say(text).await
    }

    async fn edit_profile(
        &mut self,
        name: String,
        city: String,
        photo: Option<PathBuf>,
    ) -> anyhow::Result<()> {
        let photo = match photo {
            Some(path) => match Upload::from_path(&path).await {
                Ok(upload) => Some(upload),
                Err(e) => {
                    self.notifier.error(e.user_message("Could not read photo"));
                    return Ok(());
                }
            },
            None => None,
        };
        let profile = ProfileView::load(
            self.client.clone(),
            &self.session.handle(),
            Arc::clone(&self.notifier),
            None,
        )
        .await;
        let Some(mut profile) = settle(profile) else {
            return Ok(());
        };
        if settle(profile.update(&ProfileUpdate { name, city, photo }).await).is_some() {
            // The identity shown everywhere else changed too.
            self.session.fetch_user().await;
            self.say(user_line(&profile.user)).await?;
        }
        Ok(())
    }

    async fn admin(&mut self, action: Option<AdminAction>) -> anyhow::Result<()> {
        let mut panel = AdminPanel::load(self.client.clone(), Arc::clone(&self.notifier)).await;
        let result = match action {
            None => Ok(()),
            Some(AdminAction::DeleteUser { id }) => panel.delete_user(&id).await,
            Some(AdminAction::RemoveNgo { id }) => panel.remove_ngo_role(&id).await,
            Some(AdminAction::Approve { id }) => panel.review(&id, Decision::Approve).await,
            Some(AdminAction::Reject { id }) => panel.review(&id, Decision::Reject).await,
        };
        settle(result);

        let mut out = String::from("users:\n");
        for user in &panel.users {
            let _ = writeln!(out, "{}", user_line(user));
        }
        out.push_str("ngos:\n");
        for ngo in &panel.ngos {
            let _ = writeln!(out, "{}", user_line(ngo));
        }
        out.push_str("ngo requests:\n");
        for request in &panel.requests {
            let _ = writeln!(
                out,
                "  {:<14} {} <{}> {:?}",
                request.id, request.name, request.email, request.status
            );
        }
        self.say(out).await
    }

    /// Read commands from `input` until it ends or `quit`.
    async fn repl<R: tokio::io::AsyncRead + Unpin>(&mut self, input: R) -> anyhow::Result<()> {
        let mut lines = BufReader::new(input).lines();
        loop {
            self.out.write_all(b"ecotrack> ").await?;
            self.out.flush().await?;
            let Some(line) = lines.next_line().await.context("failed to read input")? else {
                break;
            };
            if self.execute(&line).await? == Flow::Quit {
                break;
            }
        }
        Ok(())
    }
}

/// The main application entry point.
pub async fn run() -> anyhow::Result<()> {
    let args = Args::parse();

    // Set up trace logging to stderr and account for the user-provided verbosity flag.
    if args.verbosity.log_level_filter() != LevelFilter::Off {
        let lvl = match args.verbosity.log_level_filter() {
            LevelFilter::Error => tracing::Level::ERROR,
            LevelFilter::Warn | LevelFilter::Off => tracing::Level::WARN,
            LevelFilter::Info => tracing::Level::INFO,
            LevelFilter::Debug => tracing::Level::DEBUG,
            LevelFilter::Trace => tracing::Level::TRACE,
        };
        tracing_subscriber::fmt()
            .with_max_level(lvl)
            .with_writer(std::io::stderr)
            .init();
    }

    if !args.config.exists() {
        // Not fatal: every setting can come from the environment.
        warn!(
            "configuration file {} does not exist",
            args.config.display()
        );
    }

    // Read and parse the user-provided configuration.
    let config: AppConfig = Figment::new()
        .admerge(figment::providers::Toml::file(&args.config))
        .admerge(figment::providers::Env::prefixed("ECOTRACK_").split("__"))
        .extract()
        .context("failed to load configuration")?;

    // Initialize metrics reporting.
    crate::metrics::setup(config.metrics.as_ref()).context("failed to set up metrics exporter")?;

    let http = build_client()?;
    let client = ApiClient::new(http.clone(), config.api.base_url.clone())
        .context("invalid api.base_url")?;
    info!(api = %client.base_url(), "starting");

    let notifier: Arc<dyn Notifier> = Arc::new(ConsoleNotifier);
    let mut shell = Shell::new(&config, http, client, notifier, tokio::io::stdout());

    // Resolve whoever the cookie store already speaks for.
    if let Some(user) = shell.session.init().await {
        info!(user = %user.id, "resumed session");
    }

    if args.command.is_empty() {
        shell.repl(tokio::io::stdin()).await
    } else {
        let line = args.command.join(" ");
        let _ = shell.execute(&line).await?;
        Ok(())
    }
}
