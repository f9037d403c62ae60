//! Mock resource finder for testing.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::{FinderFuture, ResourceFinder};
use crate::CoreError;
use crate::identifier::Scheme;
use crate::record::ResolutionRecord;

/// A configurable mock response for [`MockFinder`].
#[derive(Clone, Debug)]
pub enum MockResponse {
    /// Return this record.
    Found(ResolutionRecord),
    /// The service has never heard of the identifier.
    NotFound,
    /// Retries exhausted.
    Transient(String),
}

/// A hand-rolled [`ResourceFinder`] for tests.
///
/// Returns a fixed response, or a sequence (one per call, repeating the last),
/// with optional per-call latency and a call counter.
pub struct MockFinder {
    name: &'static str,
    scheme: Scheme,
    responses: Mutex<Vec<MockResponse>>,
    fallback: MockResponse,
    delay: Option<Duration>,
    call_count: AtomicUsize,
    seen: Mutex<Vec<String>>,
}

impl MockFinder {
    /// A mock that always returns `response`.
    pub fn new(name: &'static str, scheme: Scheme, response: MockResponse) -> Self {
        Self {
            name,
            scheme,
            responses: Mutex::new(Vec::new()),
            fallback: response,
            delay: None,
            call_count: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// A mock that returns `responses` in order, then keeps repeating the last.
    pub fn with_sequence(
        name: &'static str,
        scheme: Scheme,
        mut responses: Vec<MockResponse>,
    ) -> Self {
        let fallback = responses.last().cloned().unwrap_or(MockResponse::NotFound);
        // reversed so pop() yields the next one
        responses.reverse();
        Self {
            responses: Mutex::new(responses),
            ..Self::new(name, scheme, fallback)
        }
    }

    /// Simulated latency per call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// How many times `fetch()` has been called.
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Identifiers passed to `fetch()`, in call order.
    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn next_response(&self) -> MockResponse {
        self.responses
            .lock()
            .ok()
            .and_then(|mut seq| seq.pop())
            .unwrap_or_else(|| self.fallback.clone())
    }
}

impl ResourceFinder for MockFinder {
    fn name(&self) -> &str {
        self.name
    }

    fn scheme(&self) -> Scheme {
        self.scheme
    }

    fn fetch<'a>(&'a self, id: &'a str) -> FinderFuture<'a> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(id.to_string());
        }
        let response = self.next_response();
        let delay = self.delay;

        Box::pin(async move {
            if let Some(d) = delay {
                tokio::time::sleep(d).await;
            }
            match response {
                MockResponse::Found(record) => Ok(record),
                MockResponse::NotFound => Ok(ResolutionRecord::default()),
                MockResponse::Transient(msg) => Err(CoreError::RemoteTransient(msg)),
            }
        })
    }
}
