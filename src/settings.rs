//! Process-wide configuration, loaded once at orchestrator construction.
//!
//! Layered `config::Config` + `serde::Deserialize` + per-field
//! `#[serde(default = "...")]`: a `ReportEngine.toml` file provides the
//! base, and `REPORTENGINE__*` environment variables (double-underscore
//! nested) override individual keys. There is no mutable global —
//! `Settings` is constructed once and handed to the orchestrator as an
//! `Arc`.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Upstream OAuth2 client-credentials grant, required and process-wide.
#[derive(Debug, Deserialize, Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
}

/// Upstream origin and wire-protocol timing knobs.
#[derive(Debug, Deserialize, Clone)]
pub struct Upstream {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_http_timeout_seconds")]
    pub http_timeout_seconds: u64,
    #[serde(default = "default_refresh_margin_seconds")]
    pub refresh_margin_seconds: u64,
    #[serde(default = "default_points_per_second")]
    pub points_per_second: u32,
}

fn default_base_url() -> String {
    "https://www.warcraftlogs.com".to_string()
}
fn default_http_timeout_seconds() -> u64 {
    30
}
fn default_refresh_margin_seconds() -> u64 {
    60
}
fn default_points_per_second() -> u32 {
    // Upstream enforces a rolling per-hour points budget; this is a
    // conservative steady-state approximation used to smooth bursts
    // client-side before the 429/Retry-After path even triggers.
    10
}

impl Default for Upstream {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            http_timeout_seconds: default_http_timeout_seconds(),
            refresh_margin_seconds: default_refresh_margin_seconds(),
            points_per_second: default_points_per_second(),
        }
    }
}

/// Concurrency and pagination limits.
#[derive(Debug, Deserialize, Clone)]
pub struct Performance {
    #[serde(default = "default_max_concurrent_reports")]
    pub max_concurrent_reports: usize,
    #[serde(default = "default_max_inflight_per_job")]
    pub max_inflight_per_job: usize,
    #[serde(default = "default_job_timeout_seconds")]
    pub job_timeout_seconds: u64,
}

fn default_max_concurrent_reports() -> usize {
    2
}
fn default_max_inflight_per_job() -> usize {
    4
}
fn default_job_timeout_seconds() -> u64 {
    600
}

impl Default for Performance {
    fn default() -> Self {
        Self {
            max_concurrent_reports: default_max_concurrent_reports(),
            max_inflight_per_job: default_max_inflight_per_job(),
            job_timeout_seconds: default_job_timeout_seconds(),
        }
    }
}

/// Snapshot cache sizing.
#[derive(Debug, Deserialize, Clone)]
pub struct CacheSettings {
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
    #[serde(default = "default_cache_ttl_seconds")]
    pub ttl_seconds: u64,
}

fn default_cache_capacity() -> usize {
    64
}
fn default_cache_ttl_seconds() -> u64 {
    1800
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
            ttl_seconds: default_cache_ttl_seconds(),
        }
    }
}

/// Job admission/retention policy.
#[derive(Debug, Deserialize, Clone)]
pub struct QueueSettings {
    #[serde(default = "default_completed_job_ttl_seconds")]
    pub completed_job_ttl_seconds: u64,
    #[serde(default = "default_fast_return_threshold_ms")]
    pub fast_return_threshold_ms: u64,
}

fn default_completed_job_ttl_seconds() -> u64 {
    600
}
fn default_fast_return_threshold_ms() -> u64 {
    750
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            completed_job_ttl_seconds: default_completed_job_ttl_seconds(),
            fast_return_threshold_ms: default_fast_return_threshold_ms(),
        }
    }
}

/// Top-level process configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub credentials: Credentials,
    #[serde(default)]
    pub upstream: Upstream,
    #[serde(default)]
    pub performance: Performance,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub queue: QueueSettings,
}

impl Settings {
    /// Loads `ReportEngine.toml` from the current directory (if present)
    /// layered under environment overrides of the form
    /// `REPORTENGINE__UPSTREAM__BASE_URL=...`.
    pub fn load() -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::with_name("ReportEngine.toml").required(false))
            .add_source(
                Environment::with_prefix("REPORTENGINE")
                    .separator("__")
                    .try_parsing(true),
            );
        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Rejects a malformed `base_url` early rather than letting every
    /// downstream `format!("{base_url}/...")` call silently build a
    /// broken endpoint.
    fn validate(&self) -> Result<(), ConfigError> {
        url::Url::parse(&self.upstream.base_url)
            .map_err(|e| ConfigError::Message(format!("invalid upstream.base_url: {e}")))?;
        Ok(())
    }

    /// Builds settings directly from in-memory credentials, bypassing file
    /// and environment discovery. Used by tests and embedding consumers
    /// that already source credentials from their own secret store.
    pub fn with_credentials(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            credentials: Credentials {
                client_id: client_id.into(),
                client_secret: client_secret.into(),
            },
            upstream: Upstream::default(),
            performance: Performance::default(),
            cache: CacheSettings::default(),
            queue: QueueSettings::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_credentials_applies_documented_defaults() {
        let settings = Settings::with_credentials("id", "secret");
        assert_eq!(settings.performance.max_concurrent_reports, 2);
        assert_eq!(settings.cache.capacity, 64);
        assert_eq!(settings.cache.ttl_seconds, 1800);
        assert_eq!(settings.queue.fast_return_threshold_ms, 750);
        assert_eq!(settings.upstream.base_url, "https://www.warcraftlogs.com");
    }
}
