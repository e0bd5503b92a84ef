//! Request pacing and retry for the GitLab client.
//!
//! Every request passes a fixed-interval [`RateLimiter`] and is retried with a linear
//! [`Backoff`] while GitLab answers `429 Too Many Requests`.

use std::sync::Mutex;
use std::time::Duration;

use reqwest::{RequestBuilder, Response, StatusCode};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::Error;

#[cfg(test)]
#[path = "transport_tests.rs"]
mod tests;

/// Hands out request slots at a fixed interval.
///
/// Slots are reserved in call order, so concurrent callers queue up behind each other
/// instead of bursting.
#[derive(Debug)]
pub struct RateLimiter {
    period: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Creates a limiter that allows `requests` requests per second.
    ///
    /// A value of zero is treated as one request per second.
    pub fn per_second(requests: u32) -> Self {
        Self {
            period: Duration::from_secs(1) / requests.max(1),
            next_slot: Mutex::new(None),
        }
    }

    /// Returns the interval between two consecutive requests.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Waits until the next request slot is due.
    pub async fn acquire(&self) {
        let slot = {
            let mut next = match self.next_slot.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let now = Instant::now();
            let slot = next.map_or(now, |n| n.max(now));
            *next = Some(slot + self.period);
            slot
        };

        tokio::time::sleep_until(slot).await;
    }
}

/// Linear backoff applied when GitLab rate limits a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    /// Maximum number of attempts, the first one included.
    pub attempts: u32,
    /// Delay unit; the wait after attempt `n` is `n * base`.
    pub base: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            attempts: 5,
            base: Duration::from_millis(500),
        }
    }
}

impl Backoff {
    /// Returns how long to wait after the given failed attempt (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base * attempt
    }
}

/// The HTTP layer shared by all client calls.
#[derive(Debug)]
pub(crate) struct Transport {
    http: reqwest::Client,
    limiter: RateLimiter,
    backoff: Backoff,
}

impl Transport {
    pub(crate) fn new(http: reqwest::Client, limiter: RateLimiter, backoff: Backoff) -> Self {
        Self {
            http,
            limiter,
            backoff,
        }
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Sends the request, retrying on 429 until the attempt ceiling is reached.
    ///
    /// The returned response has not been checked for a successful status; see
    /// [`check_status`].
    ///
    /// # Errors
    ///
    /// Returns `Error::RateLimitExceeded` when every attempt was rate limited, or
    /// `Error::Http` when the request could not be sent.
    pub(crate) async fn send(&self, request: RequestBuilder) -> Result<Response, Error> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let pending = request.try_clone().ok_or(Error::InvalidResponse)?;

            self.limiter.acquire().await;
            let response = pending.send().await?;
            if response.status() != StatusCode::TOO_MANY_REQUESTS {
                return Ok(response);
            }

            if attempt >= self.backoff.attempts {
                warn!(
                    attempts = attempt,
                    url = %response.url(),
                    "Giving up after being rate limited on every attempt"
                );
                return Err(Error::RateLimitExceeded);
            }

            let delay = self.backoff.delay(attempt);
            debug!(
                attempt = attempt,
                delay_ms = delay.as_millis() as u64,
                url = %response.url(),
                "Rate limited by GitLab, backing off"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

/// Maps non-successful responses onto the matching [`Error`] variant.
pub(crate) async fn check_status(response: Response) -> Result<Response, Error> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    match status {
        StatusCode::FORBIDDEN => Err(Error::Forbidden),
        StatusCode::NOT_FOUND => Err(Error::NotFound),
        StatusCode::TOO_MANY_REQUESTS => Err(Error::RateLimitExceeded),
        StatusCode::UNAUTHORIZED => {
            let message = response.text().await.unwrap_or_default();
            Err(Error::AuthError(message))
        }
        _ => {
            let message = response.text().await.unwrap_or_default();
            Err(Error::ApiError {
                status: status.as_u16(),
                message,
            })
        }
    }
}
