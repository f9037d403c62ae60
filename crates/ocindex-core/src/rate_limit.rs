//! Per-remote request pacing.
//!
//! Every HTTP call waits for its remote's permit via `until_ready()`. A 429
//! halves the remote's rate (down to 1/16 of the base rate); a quiet minute
//! restores it.

use std::fmt;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};

use crate::retry::AttemptError;

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

const MAX_SLOWDOWN: u32 = 16;
const RECOVERY: Duration = Duration::from_secs(60);

/// The remote services identifier checks and finders talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Remote {
    Crossref,
    DataCite,
    DoiOrg,
    PubMed,
    Orcid,
    Wikidata,
    OcMeta,
}

impl Remote {
    pub const ALL: [Remote; 7] = [
        Remote::Crossref,
        Remote::DataCite,
        Remote::DoiOrg,
        Remote::PubMed,
        Remote::Orcid,
        Remote::Wikidata,
        Remote::OcMeta,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Remote::Crossref => "Crossref",
            Remote::DataCite => "DataCite",
            Remote::DoiOrg => "doi.org",
            Remote::PubMed => "PubMed",
            Remote::Orcid => "ORCID",
            Remote::Wikidata => "Wikidata",
            Remote::OcMeta => "OpenCitations Meta",
        }
    }

    /// Requests per second, or `None` for remotes that are not paced.
    ///
    /// Crossref grants its polite-pool rate to clients that send a mailto.
    fn rate(self, has_mailto: bool) -> Option<u32> {
        match self {
            Remote::Crossref if has_mailto => Some(10),
            Remote::Crossref => Some(3),
            Remote::DataCite | Remote::Wikidata => Some(5),
            Remote::DoiOrg => Some(10),
            // without an E-utilities key
            Remote::PubMed => Some(3),
            Remote::Orcid => Some(8),
            Remote::OcMeta => None,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Remote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn limiter_for(interval: Duration) -> Arc<DirectLimiter> {
    let quota = Quota::with_period(interval).unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN));
    Arc::new(DirectLimiter::direct(quota))
}

/// Pacing for one remote. The governor is swapped out whole when the rate
/// changes, so callers already waiting keep their permit.
pub struct AdaptiveLimiter {
    interval: Duration,
    governor: ArcSwap<DirectLimiter>,
    slowdown: AtomicU32,
    throttled_at: Mutex<Option<Instant>>,
}

impl AdaptiveLimiter {
    /// One request every `interval`.
    pub fn every(interval: Duration) -> Self {
        Self {
            interval,
            governor: ArcSwap::from(limiter_for(interval)),
            slowdown: AtomicU32::new(1),
            throttled_at: Mutex::new(None),
        }
    }

    pub fn per_second(n: u32) -> Self {
        Self::every(Duration::from_millis(1000 / u64::from(n.max(1))))
    }

    /// Current slowdown: 1 at the base rate, 2 at half rate, and so on.
    pub fn slowdown(&self) -> u32 {
        self.slowdown.load(Ordering::SeqCst)
    }

    /// Wait for a permit.
    pub async fn acquire(&self) {
        self.recover_if_quiet();
        self.governor.load_full().until_ready().await;
    }

    /// The remote answered 429: halve the rate.
    pub fn throttle(&self) {
        if let Ok(mut at) = self.throttled_at.lock() {
            *at = Some(Instant::now());
        }
        let previous = self
            .slowdown
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |s| {
                Some((s * 2).min(MAX_SLOWDOWN))
            })
            .unwrap_or(MAX_SLOWDOWN);
        let slowdown = (previous * 2).min(MAX_SLOWDOWN);
        if let Some(interval) = self.interval.checked_mul(slowdown) {
            self.governor.store(limiter_for(interval));
        }
        tracing::debug!(slowdown, "remote throttled");
    }

    fn recover_if_quiet(&self) {
        if self.slowdown() == 1 {
            return;
        }
        let quiet = self
            .throttled_at
            .lock()
            .ok()
            .and_then(|at| *at)
            .is_some_and(|at| at.elapsed() >= RECOVERY);
        if quiet {
            self.slowdown.store(1, Ordering::SeqCst);
            self.governor.store(limiter_for(self.interval));
        }
    }
}

/// One limiter per paced remote.
pub struct RateLimiters {
    limiters: Vec<Option<AdaptiveLimiter>>,
}

impl Default for RateLimiters {
    fn default() -> Self {
        Self::new(false)
    }
}

impl RateLimiters {
    pub fn new(has_mailto: bool) -> Self {
        let limiters = Remote::ALL
            .iter()
            .map(|remote| remote.rate(has_mailto).map(AdaptiveLimiter::per_second))
            .collect();
        Self { limiters }
    }

    pub fn get(&self, remote: Remote) -> Option<&AdaptiveLimiter> {
        self.limiters.get(remote.index()).and_then(Option::as_ref)
    }
}

/// Map a 429 response to [`AttemptError::RateLimited`], honouring Retry-After.
pub fn check_rate_limit_response(resp: &reqwest::Response) -> Result<(), AttemptError> {
    if resp.status() != reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Ok(());
    }
    let retry_after = resp
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_retry_after);
    Err(AttemptError::RateLimited { retry_after })
}

/// Seconds, or a fixed 5s wait for an HTTP-date.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        Some(Duration::from_secs(secs))
    } else if value.ends_with("GMT") {
        Some(Duration::from_secs(5))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, retry_after: Option<&str>) -> reqwest::Response {
        let mut builder = http::Response::builder().status(status);
        if let Some(value) = retry_after {
            builder = builder.header("retry-after", value);
        }
        reqwest::Response::from(builder.body("").unwrap())
    }

    // ── Retry-After ────────────────────────────────────────────────────

    #[test]
    fn retry_after_seconds_and_dates() {
        assert_eq!(parse_retry_after(" 7 "), Some(Duration::from_secs(7)));
        assert_eq!(
            parse_retry_after("Mon, 12 Oct 2026 08:00:00 GMT"),
            Some(Duration::from_secs(5))
        );
        assert_eq!(parse_retry_after("soon"), None);
    }

    #[test]
    fn only_429_is_rate_limited() {
        assert!(check_rate_limit_response(&response(503, None)).is_ok());
        assert_eq!(
            check_rate_limit_response(&response(429, Some("3"))).unwrap_err(),
            AttemptError::RateLimited {
                retry_after: Some(Duration::from_secs(3))
            }
        );
        assert_eq!(
            check_rate_limit_response(&response(429, None)).unwrap_err(),
            AttemptError::RateLimited { retry_after: None }
        );
    }

    // ── AdaptiveLimiter ────────────────────────────────────────────────

    #[test]
    fn throttling_halves_the_rate_down_to_a_floor() {
        let limiter = AdaptiveLimiter::per_second(10);
        limiter.throttle();
        assert_eq!(limiter.slowdown(), 2);
        (0..6).for_each(|_| limiter.throttle());
        assert_eq!(limiter.slowdown(), MAX_SLOWDOWN);
    }

    #[tokio::test]
    async fn quiet_minute_restores_the_base_rate() {
        let limiter = AdaptiveLimiter::per_second(10);
        limiter.throttle();
        *limiter.throttled_at.lock().unwrap() = Some(Instant::now() - RECOVERY);
        limiter.acquire().await;
        assert_eq!(limiter.slowdown(), 1);
    }

    // ── RateLimiters ───────────────────────────────────────────────────

    #[test]
    fn meta_is_not_paced() {
        let limiters = RateLimiters::default();
        for remote in Remote::ALL {
            assert_eq!(limiters.get(remote).is_some(), remote != Remote::OcMeta, "{remote}");
        }
    }

    #[test]
    fn mailto_unlocks_the_crossref_polite_pool() {
        let anonymous = RateLimiters::new(false);
        let polite = RateLimiters::new(true);
        assert!(
            polite.get(Remote::Crossref).unwrap().interval
                < anonymous.get(Remote::Crossref).unwrap().interval
        );
    }
}
