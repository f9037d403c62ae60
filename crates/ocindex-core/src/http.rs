//! Shared HTTP plumbing for identifier checks and resource finders.

use std::sync::Arc;

use crate::Config;
use crate::rate_limit::{RateLimiters, Remote, check_rate_limit_response};
use crate::retry::{AttemptError, Outcome, RetryPolicy, with_retry};

const DEFAULT_MAILTO: &str = "contact@opencitations.net";

/// A `reqwest` client bundled with the retry policy and rate limiters.
///
/// Identifier managers and finders hold an `Arc<ApiClient>` instead of a bare
/// client so every remote call goes through the same attempt budget.
pub struct ApiClient {
    client: reqwest::Client,
    policy: RetryPolicy,
    limiters: Arc<RateLimiters>,
    mailto: String,
}

impl ApiClient {
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self::with_client(
            client,
            config.retry_policy(),
            config.rate_limiters.clone(),
            config.mailto.clone(),
        ))
    }

    pub fn with_client(
        client: reqwest::Client,
        policy: RetryPolicy,
        limiters: Arc<RateLimiters>,
        mailto: Option<String>,
    ) -> Self {
        Self {
            client,
            policy,
            limiters,
            mailto: mailto.unwrap_or_else(|| DEFAULT_MAILTO.to_string()),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// `User-Agent` value naming the calling tool and the operations mailbox.
    pub fn user_agent(&self, tool: &str) -> String {
        format!(
            "{} / OpenCitations Indexes (http://opencitations.net; mailto:{})",
            tool, self.mailto
        )
    }

    /// GET `url` and decode the body as JSON.
    pub async fn get_json(
        &self,
        remote: Remote,
        tool: &str,
        url: &str,
        headers: &[(&str, &str)],
    ) -> Outcome<serde_json::Value> {
        with_retry(&self.policy, |_| async move {
            let Some(resp) = self.send(remote, tool, url, headers).await? else {
                return Ok(None);
            };
            resp.json::<serde_json::Value>()
                .await
                .map(Some)
                .map_err(|e| AttemptError::Body(e.to_string()))
        })
        .await
    }

    /// GET `url` and return the body as text.
    pub async fn get_text(
        &self,
        remote: Remote,
        tool: &str,
        url: &str,
        headers: &[(&str, &str)],
    ) -> Outcome<String> {
        with_retry(&self.policy, |_| async move {
            let Some(resp) = self.send(remote, tool, url, headers).await? else {
                return Ok(None);
            };
            resp.text()
                .await
                .map(Some)
                .map_err(|e| AttemptError::Body(e.to_string()))
        })
        .await
    }

    /// One attempt: `Ok(None)` when the service says the resource is gone.
    async fn send(
        &self,
        remote: Remote,
        tool: &str,
        url: &str,
        headers: &[(&str, &str)],
    ) -> Result<Option<reqwest::Response>, AttemptError> {
        let limiter = self.limiters.get(remote);
        if let Some(lim) = limiter {
            lim.acquire().await;
        }

        let mut request = self
            .client
            .get(url)
            .header("User-Agent", self.user_agent(tool))
            .timeout(self.policy.timeout);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        let resp = request.send().await?;
        classify_response(resp).inspect_err(|e| {
            if let (AttemptError::RateLimited { .. }, Some(lim)) = (e, limiter) {
                lim.throttle();
            }
        })
    }
}

/// Sort a response into hit, definitive miss, or retryable failure.
pub fn classify_response(
    resp: reqwest::Response,
) -> Result<Option<reqwest::Response>, AttemptError> {
    check_rate_limit_response(&resp)?;
    let status = resp.status();
    if status == reqwest::StatusCode::NOT_FOUND || status == reqwest::StatusCode::GONE {
        return Ok(None);
    }
    if !status.is_success() {
        return Err(AttemptError::Status(status.as_u16()));
    }
    Ok(Some(resp))
}

/// Percent-encode a DOI for use in a URL path, keeping `/` separators.
pub fn quote_path(value: &str) -> String {
    value
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16) -> reqwest::Response {
        reqwest::Response::from(http::Response::builder().status(status).body("").unwrap())
    }

    #[test]
    fn success_is_a_hit() {
        assert!(matches!(classify_response(response(200)), Ok(Some(_))));
    }

    #[test]
    fn not_found_is_a_definitive_miss() {
        assert!(matches!(classify_response(response(404)), Ok(None)));
        assert!(matches!(classify_response(response(410)), Ok(None)));
    }

    #[test]
    fn server_errors_are_retryable() {
        assert!(matches!(
            classify_response(response(503)),
            Err(AttemptError::Status(503))
        ));
        assert!(matches!(
            classify_response(response(429)),
            Err(AttemptError::RateLimited { .. })
        ));
    }

    #[test]
    fn quote_path_keeps_slashes() {
        assert_eq!(quote_path("10.1000/a b<c>"), "10.1000/a%20b%3Cc%3E");
        assert_eq!(quote_path("10.1/x/y"), "10.1/x/y");
    }

    #[test]
    fn user_agent_names_tool_and_mailbox() {
        let api = ApiClient::with_client(
            reqwest::Client::new(),
            RetryPolicy::default(),
            Arc::new(RateLimiters::default()),
            Some("ops@example.org".into()),
        );
        assert_eq!(
            api.user_agent("ResourceFinder"),
            "ResourceFinder / OpenCitations Indexes (http://opencitations.net; mailto:ops@example.org)"
        );
    }
}
