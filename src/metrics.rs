//! Metric name constants.

use std::time::Duration;

use anyhow::Context;
use metrics::describe_counter;
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::config;

pub const API_REQUESTS: &str = "ecotrack.api.requests"; // Counter.
pub const API_FAILURES: &str = "ecotrack.api.failures"; // Counter.

pub const FEED_FETCHES: &str = "ecotrack.feed.fetches"; // Counter.
pub const FEED_STALE: &str = "ecotrack.feed.stale"; // Counter.

pub const NOTIFY_SUCCESS: &str = "ecotrack.notify.success"; // Counter.
pub const NOTIFY_ERROR: &str = "ecotrack.notify.error"; // Counter.

/// Must be ran exactly once on startup. This will declare all of the instruments for `metrics`.
pub fn setup(config: Option<&config::MetricConfig>) -> anyhow::Result<()> {
    describe_counter!(API_REQUESTS, "Requests sent to the backend.");
    describe_counter!(
        API_FAILURES,
        "Requests that failed in transport or returned a non-success status."
    );

    describe_counter!(FEED_FETCHES, "Filtered feed refreshes started.");
    describe_counter!(
        FEED_STALE,
        "Feed responses discarded because a newer filter superseded them."
    );

    describe_counter!(NOTIFY_SUCCESS, "Success notifications shown to the user.");
    describe_counter!(NOTIFY_ERROR, "Error notifications shown to the user.");

    if let Some(config) = config {
        match config {
            config::MetricConfig::PrometheusPush(prometheus_config) => {
                PrometheusBuilder::new()
                    .with_push_gateway(
                        prometheus_config.url.clone(),
                        Duration::from_secs(10),
                        None,
                        None,
                    )
                    .context("failed to set up push gateway")?
                    .install()
                    .context("failed to install metrics exporter")?;
            }
        }
    }

    Ok(())
}
