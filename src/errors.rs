// SPDX-License-Identifier: MIT

use std::future::Future;
use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;
use tracing::debug;

/// Failure taxonomy for all portal interactions.
///
/// `Auth` aborts the run after one session refresh, `PageLimit` is fatal for
/// the affected category only, and transient `Network`/`Http` failures are
/// retried per call.
#[derive(Debug, Error)]
pub enum PortalError {
    #[error("authentication rejected by portal: {0}")]
    Auth(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("portal returned HTTP {0}")]
    Http(StatusCode),

    #[error("unexpected portal response: {0}")]
    Response(String),

    #[error("category \"{category}\" still reported more items after {pages} pages")]
    PageLimit { category: String, pages: u32 },
}

impl PortalError {
    /// Retryable conditions: timeouts, connection failures and server-side
    /// (5xx) errors. Everything else is treated as permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            PortalError::Network(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            PortalError::Http(status) => status.is_server_error(),
            _ => false,
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, PortalError::Auth(_))
    }
}

/// Runs `op` up to `attempts` times, sleeping `backoff` between tries.
/// Only transient errors are retried; the last error is returned as-is.
pub async fn retry_transient<T, F, Fut>(
    attempts: u32,
    backoff: Duration,
    mut op: F,
) -> Result<T, PortalError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, PortalError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < attempts => {
                debug!("transient portal error (attempt {attempt}/{attempts}): {e}");
                attempt += 1;
                tokio::time::sleep(backoff).await;
            }
            Err(e) => return Err(e),
        }
    }
}
