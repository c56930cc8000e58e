//! GraphQL client. Executes queries against the upstream v2 API,
//! attaching bearer auth, retrying transient failures, and honoring
//! rate-limit backoff.
//!
//! The `reqwest::Client` is constructed once by the orchestrator and
//! shared via `Arc`; `reqwest::Client` is documented as cheap to clone
//! and safe to share across concurrent requests.

use crate::error::{EngineError, Result};
use crate::token_manager::TokenManager;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{instrument, warn};

type PointsLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

const BACKOFF_SCHEDULE_MS: [u64; 4] = [250, 1_000, 4_000, 8_000];
const MAX_ATTEMPTS: usize = 5;

/// Thin wrapper over a shared HTTP client and token manager that executes
/// one GraphQL query per call, with retry/backoff/reauth baked in.
pub struct GraphQlClient {
    http: Client,
    endpoint: String,
    tokens: Arc<TokenManager>,
    limiter: PointsLimiter,
}

impl GraphQlClient {
    pub fn new(http: Client, base_url: &str, tokens: Arc<TokenManager>, points_per_second: u32) -> Self {
        let quota = Quota::per_second(NonZeroU32::new(points_per_second.max(1)).unwrap());
        Self {
            http,
            endpoint: format!("{base_url}/client/api/v2/client"),
            tokens,
            limiter: RateLimiter::direct(quota),
        }
    }

    /// Executes `query` with `variables`, retrying transient failures with
    /// exponential backoff, and returns the parsed `data` object.
    #[instrument(skip(self, query, variables))]
    pub async fn query(&self, query: &str, variables: Value) -> Result<Value> {
        let body = serde_json::json!({ "query": query, "variables": variables });
        let started = std::time::Instant::now();

        let mut reauthed_once = false;
        let mut last_err = None;

        for attempt in 0..MAX_ATTEMPTS {
            self.limiter.until_ready().await;

            let bearer = self.tokens.current_token().await?;
            let send_result = self
                .http
                .post(&self.endpoint)
                .bearer_auth(&bearer)
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            let response = match send_result {
                Ok(r) => r,
                Err(e) => {
                    last_err = Some(EngineError::UpstreamUnavailable(e.to_string()));
                    crate::metrics::record_graphql_retry("transport");
                    self.backoff(attempt, None).await;
                    continue;
                }
            };

            match response.status() {
                StatusCode::UNAUTHORIZED if !reauthed_once => {
                    reauthed_once = true;
                    self.tokens.invalidate().await;
                    continue;
                }
                StatusCode::UNAUTHORIZED => {
                    crate::metrics::record_graphql_request("error", started.elapsed().as_millis() as f64);
                    return Err(EngineError::Unauthorized);
                }
                StatusCode::TOO_MANY_REQUESTS => {
                    let retry_after = parse_retry_after(response.headers());
                    last_err = Some(EngineError::RateLimited { retry_after });
                    crate::metrics::record_graphql_retry("rate_limited");
                    self.backoff(attempt, retry_after).await;
                    continue;
                }
                status if status.is_server_error() => {
                    last_err = Some(EngineError::UpstreamUnavailable(format!(
                        "upstream returned {status}"
                    )));
                    crate::metrics::record_graphql_retry("server_error");
                    self.backoff(attempt, None).await;
                    continue;
                }
                status if !status.is_success() => {
                    crate::metrics::record_graphql_request("error", started.elapsed().as_millis() as f64);
                    return Err(EngineError::UpstreamUnavailable(format!(
                        "upstream returned {status}"
                    )));
                }
                _ => {}
            }

            let payload: Value = response
                .json()
                .await
                .map_err(|e| EngineError::UpstreamUnavailable(e.to_string()))?;

            if let Some(errors) = payload.get("errors").and_then(Value::as_array) {
                if !errors.is_empty() {
                    let first = &errors[0];
                    let message = first
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown upstream error")
                        .to_string();
                    let path = first
                        .get("path")
                        .map(|p| p.to_string())
                        .unwrap_or_else(|| "<unknown>".to_string());
                    crate::metrics::record_graphql_request("error", started.elapsed().as_millis() as f64);
                    return Err(EngineError::UpstreamQueryError { message, path });
                }
            }

            let outcome = if attempt == 0 { "success" } else { "retried" };
            crate::metrics::record_graphql_request(outcome, started.elapsed().as_millis() as f64);
            return Ok(payload
                .get("data")
                .cloned()
                .unwrap_or(Value::Null));
        }

        crate::metrics::record_graphql_request("error", started.elapsed().as_millis() as f64);
        Err(last_err.unwrap_or_else(|| {
            EngineError::UpstreamUnavailable("retry budget exhausted".to_string())
        }))
    }

    async fn backoff(&self, attempt: usize, retry_after: Option<Duration>) {
        let delay = retry_after.unwrap_or_else(|| {
            Duration::from_millis(BACKOFF_SCHEDULE_MS[attempt.min(BACKOFF_SCHEDULE_MS.len() - 1)])
        });
        warn!(attempt, delay_ms = delay.as_millis() as u64, "graphql retry backoff");
        sleep(delay).await;
    }
}

fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_after_parses_seconds_header() {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(reqwest::header::RETRY_AFTER, "7".parse().unwrap());
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(7)));
    }

    #[test]
    fn retry_after_absent_returns_none() {
        let headers = reqwest::header::HeaderMap::new();
        assert_eq!(parse_retry_after(&headers), None);
    }
}
