//! Typed retry wrapper for remote checks and finder calls.
//!
//! Every remote call gets a bounded number of attempts, each under its own
//! timeout. Timeouts retry immediately, connection failures back off before
//! the next attempt, and a well-formed negative answer stops at once.

use std::future::Future;
use std::time::Duration;

/// Attempt budget and timings for one remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub timeout: Duration,
    pub connect_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            timeout: Duration::from_secs(30),
            connect_backoff: Duration::from_secs(5),
        }
    }
}

/// Why a single attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptError {
    /// No response within the per-attempt timeout.
    Timeout,
    /// Could not connect, or the connection was reset.
    Connect(String),
    /// Server returned 429 Too Many Requests.
    RateLimited { retry_after: Option<Duration> },
    /// Any other unexpected HTTP status.
    Status(u16),
    /// The response arrived but its body could not be read or decoded.
    Body(String),
}

impl std::fmt::Display for AttemptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttemptError::Timeout => write!(f, "timed out"),
            AttemptError::Connect(msg) => write!(f, "connection failed: {}", msg),
            AttemptError::RateLimited {
                retry_after: Some(d),
            } => write!(f, "rate limited (429), retry after {:.1}s", d.as_secs_f64()),
            AttemptError::RateLimited { retry_after: None } => write!(f, "rate limited (429)"),
            AttemptError::Status(code) => write!(f, "HTTP {}", code),
            AttemptError::Body(msg) => write!(f, "bad response body: {}", msg),
        }
    }
}

impl std::error::Error for AttemptError {}

impl From<reqwest::Error> for AttemptError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            AttemptError::Timeout
        } else if e.is_connect() || e.is_request() {
            AttemptError::Connect(e.to_string())
        } else if let Some(status) = e.status() {
            AttemptError::Status(status.as_u16())
        } else {
            AttemptError::Body(e.to_string())
        }
    }
}

/// Final result of a retried remote call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    /// The service answered with a usable payload.
    Found(T),
    /// The service answered and the thing does not exist.
    NotFound,
    /// Every attempt failed; carries the last failure.
    Exhausted(AttemptError),
}

impl<T> Outcome<T> {
    pub fn found(self) -> Option<T> {
        match self {
            Outcome::Found(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Outcome::Found(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Found(v) => Outcome::Found(f(v)),
            Outcome::NotFound => Outcome::NotFound,
            Outcome::Exhausted(e) => Outcome::Exhausted(e),
        }
    }
}

/// Run `attempt` under `policy`.
///
/// The closure receives the 1-based attempt number and returns
/// `Ok(Some(_))` for a hit, `Ok(None)` for a definitive miss, or an
/// [`AttemptError`] to be classified and possibly retried.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut attempt: F) -> Outcome<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Option<T>, AttemptError>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut last = AttemptError::Timeout;

    for n in 1..=attempts {
        let result = match tokio::time::timeout(policy.timeout, attempt(n)).await {
            Ok(r) => r,
            Err(_) => Err(AttemptError::Timeout),
        };

        match result {
            Ok(Some(v)) => return Outcome::Found(v),
            Ok(None) => return Outcome::NotFound,
            Err(e) => {
                tracing::debug!(attempt = n, of = attempts, error = %e, "remote attempt failed");
                if n < attempts {
                    match &e {
                        AttemptError::Connect(_) => tokio::time::sleep(policy.connect_backoff).await,
                        AttemptError::RateLimited { retry_after } => {
                            let wait = retry_after.unwrap_or(Duration::from_secs(2));
                            tokio::time::sleep(wait.min(policy.timeout)).await;
                        }
                        _ => {}
                    }
                }
                last = e;
            }
        }
    }

    Outcome::Exhausted(last)
}
