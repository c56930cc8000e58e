//! OAuth2 client-credentials token manager.
//!
//! Holds the only mutable process-wide state in the engine: the current
//! bearer token. Concurrent callers share a single in-flight refresh via
//! a `tokio::sync::Mutex` guarding the cached token; the critical
//! section spans an HTTP round trip, so the lock is async rather than a
//! plain sync mutex.

use crate::error::{EngineError, Result};
use crate::settings::{Credentials, Upstream};
use rand::Rng;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::{instrument, warn};

#[derive(Debug, Clone)]
struct Token {
    bearer: String,
    expires_at: Instant,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

/// Acquires and refreshes OAuth2 bearer tokens against the upstream
/// identity endpoint, exposing a valid token on demand.
pub struct TokenManager {
    http: Client,
    credentials: Credentials,
    token_url: String,
    refresh_margin: Duration,
    current: Mutex<Option<Token>>,
}

impl TokenManager {
    pub fn new(http: Client, credentials: Credentials, upstream: &Upstream) -> Self {
        Self {
            http,
            credentials,
            token_url: format!("{}/oauth/token", upstream.base_url),
            refresh_margin: Duration::from_secs(upstream.refresh_margin_seconds),
            current: Mutex::new(None),
        }
    }

    /// Returns a bearer token whose expiry is at least `refresh_margin` in
    /// the future, refreshing synchronously if necessary.
    ///
    /// Holding the mutex across the refresh call is what gives this
    /// single-flight semantics: the second concurrent caller blocks on the
    /// lock, observes the freshly-written token once it's released, and
    /// never issues its own redundant request.
    #[instrument(skip(self))]
    pub async fn current_token(&self) -> Result<String> {
        let mut guard = self.current.lock().await;
        if let Some(token) = guard.as_ref() {
            if token.expires_at > Instant::now() + self.refresh_margin {
                return Ok(token.bearer.clone());
            }
        }
        let token = self.refresh_with_retry().await?;
        let bearer = token.bearer.clone();
        *guard = Some(token);
        Ok(bearer)
    }

    /// Forces the next `current_token` call to refresh, regardless of the
    /// cached token's remaining lifetime. Used by the GraphQL client after
    /// an HTTP 401 to retry exactly once with a fresh token.
    pub async fn invalidate(&self) {
        let mut guard = self.current.lock().await;
        *guard = None;
    }

    async fn refresh_with_retry(&self) -> Result<Token> {
        const MAX_ATTEMPTS: u32 = 3;
        const BASE_DELAYS_MS: [u64; 3] = [100, 400, 1600];

        let mut last_err = None;
        for attempt in 0..MAX_ATTEMPTS {
            match self.refresh_once().await {
                Ok(token) => return Ok(token),
                Err(err) => {
                    warn!(attempt, error = %err, "oauth token refresh attempt failed");
                    last_err = Some(err);
                    if attempt + 1 < MAX_ATTEMPTS {
                        sleep(jittered(BASE_DELAYS_MS[attempt as usize])).await;
                    }
                }
            }
        }
        Err(last_err.unwrap_or(EngineError::Unauthorized))
    }

    async fn refresh_once(&self) -> Result<Token> {
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| EngineError::UpstreamUnavailable(e.to_string()))?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED
            || response.status() == reqwest::StatusCode::FORBIDDEN
        {
            return Err(EngineError::Unauthorized);
        }
        if !response.status().is_success() {
            return Err(EngineError::UpstreamUnavailable(format!(
                "identity endpoint returned {}",
                response.status()
            )));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| EngineError::UpstreamUnavailable(e.to_string()))?;

        Ok(Token {
            bearer: body.access_token,
            expires_at: Instant::now() + Duration::from_secs(body.expires_in),
        })
    }
}

/// `base_ms` plus/minus 20% jitter, to keep concurrent refreshers from
/// retrying in lockstep.
fn jittered(base_ms: u64) -> Duration {
    let jitter_fraction = rand::thread_rng().gen_range(-0.2..=0.2);
    let delay_ms = (base_ms as f64 * (1.0 + jitter_fraction)).max(0.0);
    Duration::from_millis(delay_ms as u64)
}
