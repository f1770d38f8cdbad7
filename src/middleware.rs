//! Outbound request logging.

use std::time::Instant;

use http::Extensions;
use metrics::counter;
use reqwest::{Request, Response};
use reqwest_middleware::{Middleware, Next};
use tracing::{debug, warn};

use crate::metrics::{API_FAILURES, API_REQUESTS};

/// Logs every exchange with the backend and counts failures.
///
/// Only the path is logged: query strings may carry credentials.
pub(crate) struct RequestLog;

#[async_trait::async_trait]
impl Middleware for RequestLog {
    async fn handle(
        &self,
        req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> reqwest_middleware::Result<Response> {
        let method = req.method().clone();
        let path = req.url().path().to_owned();
        let start = Instant::now();
        counter!(API_REQUESTS).increment(1);

        let res = next.run(req, extensions).await;
        let elapsed = start.elapsed();

        match res {
            Ok(ref r) => {
                let status = r.status();
                if !status.is_success() {
                    counter!(API_FAILURES).increment(1);
                }
                debug!(%method, %path, status = status.as_u16(), ?elapsed, "api call");
            }
            Err(ref e) => {
                counter!(API_FAILURES).increment(1);
                warn!(%method, %path, ?elapsed, "api call failed: {e}");
            }
        }

        res
    }
}
