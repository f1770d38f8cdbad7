//! The filtered, paginated report listing and its map companion.

use std::{sync::Arc, time::Duration};

use futures::future;
use metrics::counter;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::{
    client::{ApiClient, FeedQuery},
    config::FeedConfig,
    forms::CreateReportForm,
    metrics::{FEED_FETCHES, FEED_STALE},
    models::{Report, ReportLocation, ReportStatus},
    notify::Notifier,
    Error, Result,
};

const FETCH_FAILED: &str = "Failed to fetch reports";

/// What the listing currently shows.
#[derive(Clone, Debug, PartialEq)]
pub struct FeedSnapshot {
    /// Case-insensitive city substring; empty means every city.
    pub city: String,
    pub status: Option<ReportStatus>,
    /// 1-based.
    pub page: u32,
    pub total_pages: u32,
    pub reports: Vec<Report>,
    /// Every match, unpaged, for the map.
    pub locations: Vec<ReportLocation>,
    pub loading: bool,
}

impl Default for FeedSnapshot {
    fn default() -> Self {
        Self {
            city: String::new(),
            status: None,
            page: 1,
            total_pages: 1,
            reports: Vec::new(),
            locations: Vec::new(),
            loading: false,
        }
    }
}

#[derive(Debug, Default)]
struct FeedState {
    snapshot: FeedSnapshot,
    /// Bumped by every fetch; responses carrying an older value are dropped.
    generation: u64,
    /// Bumped by every keystroke in the city filter.
    city_ticket: u64,
    /// Whether `total_pages` came from a page response for the current filters.
    pages_known: bool,
}

/// Shared handle to the listing. Clones see the same state.
#[derive(Clone)]
pub struct FeedView {
    client: ApiClient,
    notifier: Arc<dyn Notifier>,
    config: FeedConfig,
    state: Arc<Mutex<FeedState>>,
}

impl FeedView {
    pub fn new(client: ApiClient, notifier: Arc<dyn Notifier>, config: FeedConfig) -> Self {
        Self {
            client,
            notifier,
            config,
            state: Arc::new(Mutex::new(FeedState::default())),
        }
    }

    pub async fn snapshot(&self) -> FeedSnapshot {
        self.state.lock().await.snapshot.clone()
    }

    /// Fetch the current page and the map list in parallel.
    ///
    /// If another fetch starts before this one finishes, its responses are
    /// discarded and the snapshot is returned as the newer fetch leaves it.
    pub async fn refresh(&self) -> FeedSnapshot {
        let (generation, query) = {
            let mut state = self.state.lock().await;
            state.generation += 1;
            state.snapshot.loading = true;
            let query = FeedQuery {
                city: state.snapshot.city.clone(),
                status: state.snapshot.status,
                page: Some(state.snapshot.page),
                limit: Some(self.config.page_size),
            };
            (state.generation, query)
        };
        counter!(FEED_FETCHES).increment(1);

        let (page, locations) = future::join(
            self.client.filter_paging(&query),
            self.client.filter_locations(&query),
        )
        .await;

        let mut state = self.state.lock().await;
        if state.generation != generation {
            counter!(FEED_STALE).increment(1);
            debug!(generation, latest = state.generation, "discarding stale feed response");
            return state.snapshot.clone();
        }

        let mut failures = 0;
        match page {
            Ok(page) => {
                state.snapshot.reports = page.reports;
                state.snapshot.total_pages = page.total_pages.max(1);
                state.pages_known = true;
            }
            Err(e) => {
                warn!("failed to fetch report page: {e}");
                failures += 1;
            }
        }
        match locations {
            Ok(locations) => state.snapshot.locations = locations,
            Err(e) => {
                warn!("failed to fetch report locations: {e}");
                failures += 1;
            }
        }
        state.snapshot.loading = false;
        let snapshot = state.snapshot.clone();
        drop(state);

        for _ in 0..failures {
            self.notifier.error(FETCH_FAILED);
        }
        snapshot
    }

    /// Filter by city once typing settles.
    ///
    /// Returns `None` when a later call superseded this one before the quiet
    /// period ended; only the last value typed triggers a fetch.
    pub async fn set_city(&self, city: &str) -> Option<FeedSnapshot> {
        let ticket = {
            let mut state = self.state.lock().await;
            state.city_ticket += 1;
            state.city_ticket
        };

        tokio::time::sleep(Duration::from_millis(self.config.debounce_ms)).await;

        {
            let mut state = self.state.lock().await;
            if state.city_ticket != ticket {
                return None;
            }
            state.snapshot.city = city.trim().to_owned();
            state.snapshot.page = 1;
            state.pages_known = false;
        }
        Some(self.refresh().await)
    }

    pub async fn set_status(&self, status: Option<ReportStatus>) -> FeedSnapshot {
        {
            let mut state = self.state.lock().await;
            state.snapshot.status = status;
            state.snapshot.page = 1;
            state.pages_known = false;
        }
        self.refresh().await
    }

    /// Jump to `page`.
    ///
    /// Pages start at 1. The upper bound is only enforced once a page
    /// response for the current filters has reported the page count.
    pub async fn set_page(&self, page: u32) -> Result<FeedSnapshot> {
        {
            let mut state = self.state.lock().await;
            if page == 0 {
                return Err(Error::validation("Pages start at 1"));
            }
            let total = state.snapshot.total_pages;
            if state.pages_known && page > total {
                return Err(Error::validation(format!(
                    "Page {page} is out of range (1-{total})"
                )));
            }
            state.snapshot.page = page;
        }
        Ok(self.refresh().await)
    }

    pub async fn next_page(&self) -> Result<FeedSnapshot> {
        let page = self.state.lock().await.snapshot.page;
        self.set_page(page.saturating_add(1)).await
    }

    pub async fn prev_page(&self) -> Result<FeedSnapshot> {
        let page = self.state.lock().await.snapshot.page;
        self.set_page(page.saturating_sub(1)).await
    }

    /// Submit a new report, then reload the listing so it shows up.
    pub async fn submit_report(&self, form: &CreateReportForm) -> Result<FeedSnapshot> {
        let attempt = async {
            form.check()?;
            self.client.create_report(form).await
        };
        self.notifier.outcome(
            attempt.await,
            |ack| ack.message_or("Report submitted successfully"),
            "Failed to submit report",
        )?;
        Ok(self.refresh().await)
    }
}
