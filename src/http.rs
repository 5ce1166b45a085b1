//! Shared HTTP client settings for the accounts and player endpoints.

use std::time::Duration;

use tracing::warn;

/// Upper bound on any single request, so a stalled call cannot pin a caller.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .unwrap_or_else(|e| {
            warn!("Failed to build HTTP client with timeout, using defaults: {e}");
            reqwest::Client::new()
        })
}
