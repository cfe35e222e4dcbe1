//! Bounded, proxy-aware retries around a single unit of work.
//!
//! An [`Extract`] implementation performs one request for one item through one proxy and
//! classifies what went wrong. [`RetryingFetcher`] owns the loop around it: jitter, proxy
//! selection, health feedback and backoff.

use std::future::Future;
use std::sync::Arc;

use reqwest::StatusCode;
use thiserror::Error;

use crate::config::RetryPolicy;
use crate::proxy::{Proxy, ProxyPool};

/// Why a single extraction attempt failed.
#[derive(Debug, Clone, Error)]
pub enum ExtractError {
    /// The item has no data upstream. The proxy did its job, nothing to retry.
    #[error("not found")]
    NotFound,

    /// Timeouts, refused connections, 5xx, rate limiting and blocks.
    #[error("transient: {0}")]
    Transient(String),

    #[error("{0}")]
    Other(String),
}

impl ExtractError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ExtractError::Transient(_))
    }

    /// Maps a non-success HTTP status onto the retry classes.
    pub fn from_status(status: StatusCode) -> Self {
        match status {
            StatusCode::NOT_FOUND => ExtractError::NotFound,
            StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => {
                ExtractError::Transient(format!("HTTP {status}"))
            }
            s if s.is_server_error() => ExtractError::Transient(format!("HTTP {status}")),
            s => ExtractError::Other(format!("HTTP {s}")),
        }
    }
}

impl From<reqwest::Error> for ExtractError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return ExtractError::from_status(status);
        }
        if err.is_timeout() || err.is_connect() || err.is_request() {
            ExtractError::Transient(err.to_string())
        } else {
            ExtractError::Other(err.to_string())
        }
    }
}

/// One unit of work performed through a proxy.
pub trait Extract: Send + Sync + 'static {
    type Output: Send + 'static;

    fn extract(
        &self,
        item: &str,
        proxy: &Proxy,
    ) -> impl Future<Output = Result<Self::Output, ExtractError>> + Send;
}

/// A successful fetch: either the payload or confirmation that there is none.
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched<T> {
    Found(T),
    NotFound,
}

impl<T> Fetched<T> {
    pub fn into_option(self) -> Option<T> {
        match self {
            Fetched::Found(payload) => Some(payload),
            Fetched::NotFound => None,
        }
    }
}

/// Terminal failure for one item after every attempt was used up.
#[derive(Debug, Error)]
#[error("'{item}' failed after {attempts} attempts, last error: {last}")]
pub struct FetchError {
    pub item: String,
    pub attempts: usize,
    pub last: ExtractError,
}

pub struct RetryingFetcher {
    pool: Arc<ProxyPool>,
    policy: RetryPolicy,
}

impl RetryingFetcher {
    pub fn new(pool: Arc<ProxyPool>, policy: RetryPolicy) -> Self {
        RetryingFetcher { pool, policy }
    }

    pub fn pool(&self) -> &Arc<ProxyPool> {
        &self.pool
    }

    /// Runs `extractor` for `item` at most `max_attempts` times, rotating proxies between
    /// attempts. Per-item errors never escape as anything but a [`FetchError`].
    pub async fn fetch<E: Extract>(
        &self,
        item: &str,
        extractor: &E,
    ) -> Result<Fetched<E::Output>, FetchError> {
        let attempts = self.policy.max_attempts.max(1);
        let mut last = ExtractError::Other("no attempt made".into());

        for attempt in 1..=attempts {
            self.policy.jitter.sleep().await;
            let proxy = self.pool.acquire();

            match extractor.extract(item, &proxy).await {
                Ok(payload) => {
                    self.pool.report(&proxy, true);
                    return Ok(Fetched::Found(payload));
                }
                Err(ExtractError::NotFound) => {
                    self.pool.report(&proxy, true);
                    log::debug!("'{item}' not found");
                    return Ok(Fetched::NotFound);
                }
                Err(err) => {
                    self.pool.report(&proxy, false);
                    log::debug!("Error on '{item}' via {proxy} (attempt {attempt}/{attempts}): {err}");
                    let transient = err.is_transient();
                    last = err;
                    if transient && attempt < attempts {
                        self.policy.backoff.sleep().await;
                    }
                }
            }
        }

        Err(FetchError {
            item: item.to_string(),
            attempts,
            last,
        })
    }
}
