//! Client configuration.
//!
//! `ClientConfig::from_env()` reads the `ZENACT_*` variables below; anything
//! unset or unparseable keeps its default. Values that parse but make no sense
//! (zero poll interval, inverted prompt bounds, a non-http origin) are rejected.
//!
//! | Variable                           | Default                 |
//! |------------------------------------|-------------------------|
//! | `ZENACT_API_URL`                   | `http://localhost:8080` |
//! | `ZENACT_POLL_INTERVAL_MS`          | `2000`                  |
//! | `ZENACT_WS_RECONNECT_DELAY_MS`     | `1000`                  |
//! | `ZENACT_WS_MAX_RECONNECT_ATTEMPTS` | `5`                     |
//! | `ZENACT_PROMPT_MIN_LENGTH`         | `3`                     |
//! | `ZENACT_PROMPT_MAX_LENGTH`         | `2000`                  |
//! | `ZENACT_HTTP_TIMEOUT_MS`           | `15000`                 |

use std::str::FromStr;
use std::time::Duration;

use reqwest::Url;

use crate::error::{ClientError, Result};
use crate::reconnect::ReconnectPolicy;
use crate::sanitize::PromptBounds;

pub const DEFAULT_API_URL: &str = "http://localhost:8080";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 1000;
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;
pub const DEFAULT_HTTP_TIMEOUT_MS: u64 = 15_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// REST origin without a trailing slash, e.g. `http://localhost:8080`.
    pub api_url: String,
    pub poll_interval: Duration,
    pub reconnect: ReconnectPolicy,
    pub prompt_bounds: PromptBounds,
    pub http_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            reconnect: ReconnectPolicy::default(),
            prompt_bounds: PromptBounds::default(),
            http_timeout: Duration::from_millis(DEFAULT_HTTP_TIMEOUT_MS),
        }
    }
}

fn env_or<T: FromStr>(key: &str, fallback: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(fallback)
}

impl ClientConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = PromptBounds::default();
        let config = Self {
            api_url: normalize_origin(
                &std::env::var("ZENACT_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
            ),
            poll_interval: Duration::from_millis(env_or(
                "ZENACT_POLL_INTERVAL_MS",
                DEFAULT_POLL_INTERVAL_MS,
            )),
            reconnect: ReconnectPolicy {
                base_delay: Duration::from_millis(env_or(
                    "ZENACT_WS_RECONNECT_DELAY_MS",
                    DEFAULT_RECONNECT_DELAY_MS,
                )),
                max_attempts: env_or(
                    "ZENACT_WS_MAX_RECONNECT_ATTEMPTS",
                    DEFAULT_MAX_RECONNECT_ATTEMPTS,
                ),
            },
            prompt_bounds: PromptBounds {
                min: env_or("ZENACT_PROMPT_MIN_LENGTH", defaults.min),
                max: env_or("ZENACT_PROMPT_MAX_LENGTH", defaults.max),
            },
            http_timeout: Duration::from_millis(env_or(
                "ZENACT_HTTP_TIMEOUT_MS",
                DEFAULT_HTTP_TIMEOUT_MS,
            )),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_api_url(mut self, api_url: &str) -> Result<Self> {
        self.api_url = normalize_origin(api_url);
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.api_url).map_err(|e| {
            ClientError::InvalidConfig(format!("api url `{}`: {e}", self.api_url))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ClientError::InvalidConfig(format!(
                "api url `{}` must use http or https",
                self.api_url
            )));
        }
        if self.poll_interval.is_zero() {
            return Err(ClientError::InvalidConfig(
                "poll interval must be greater than zero".to_string(),
            ));
        }
        if self.prompt_bounds.min > self.prompt_bounds.max {
            return Err(ClientError::InvalidConfig(format!(
                "prompt min length {} exceeds max length {}",
                self.prompt_bounds.min, self.prompt_bounds.max
            )));
        }
        Ok(())
    }

    /// Push-channel origin: the REST origin with `http` swapped for `ws`.
    pub fn ws_base_url(&self) -> String {
        match self.api_url.strip_prefix("http") {
            Some(rest) => format!("ws{rest}"),
            None => self.api_url.clone(),
        }
    }

    /// `ws(s)://<origin>/api/task/<id>/ws` with the id percent-encoded.
    pub fn task_ws_url(&self, task_id: &str) -> Result<String> {
        build_task_url(&self.ws_base_url(), task_id, Some("ws"))
    }

    pub fn task_url(&self, task_id: &str) -> Result<String> {
        build_task_url(&self.api_url, task_id, None)
    }

    pub fn create_task_url(&self) -> String {
        format!("{}/api/task", self.api_url)
    }

    pub fn health_url(&self) -> String {
        format!("{}/health", self.api_url)
    }
}

fn normalize_origin(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}

fn build_task_url(base: &str, task_id: &str, suffix: Option<&str>) -> Result<String> {
    let mut url = Url::parse(base)
        .map_err(|e| ClientError::InvalidConfig(format!("base url `{base}`: {e}")))?;
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| ClientError::InvalidConfig(format!("base url `{base}` cannot be a base")))?;
        segments.pop_if_empty().extend(["api", "task", task_id]);
        if let Some(suffix) = suffix {
            segments.push(suffix);
        }
    }
    Ok(url.into())
}
