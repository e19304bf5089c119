//! Search-engine admin API client.
//!
//! Defines the [`SearchAdmin`] trait (the three admin calls provisioning
//! needs) and [`HttpSearchAdmin`], a blocking HTTP implementation for
//! Elasticsearch-compatible engines.
//!
//! # Retry Strategy
//!
//! The admin endpoint may be briefly unavailable while a cluster starts, so
//! every call goes through one bounded retry loop:
//! - connect errors and timeouts → retry
//! - HTTP 502, 503, 504 → retry
//! - any other response → returned to the caller as-is
//! - backoff: `backoff`, 2×, 4×, … (capped at 2^5 multiples)

use anyhow::{bail, Result};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::{StatusCode, Url};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::config::EngineConfig;

/// Admin operations against the search engine.
pub trait SearchAdmin {
    /// Major version reported by the engine, if it reports one.
    fn server_major_version(&self) -> Result<Option<u32>>;
    fn index_exists(&self, index: &str) -> Result<bool>;
    /// Create `index` with the given settings-and-mappings body. Returns the
    /// engine's acknowledgement.
    fn create_index(&self, index: &str, body: &Value) -> Result<Value>;
}

/// Bounded retry-on-transient-failure policy.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    fn delay(&self, attempt: u32) -> Duration {
        self.backoff * (1u32 << (attempt - 1).min(5))
    }
}

/// [`SearchAdmin`] over HTTP.
pub struct HttpSearchAdmin {
    client: Client,
    base: Url,
    retry: RetryPolicy,
}

impl HttpSearchAdmin {
    pub fn new(host: &str, port: u16, config: &EngineConfig) -> Result<Self> {
        let base = Url::parse(&format!("http://{}:{}/", host, port))
            .map_err(|e| anyhow::anyhow!("Invalid search engine address {}:{}: {}", host, port, e))?;

        let client = Client::builder().timeout(config.timeout()).build()?;

        Ok(Self {
            client,
            base,
            retry: RetryPolicy {
                max_retries: config.max_retries,
                backoff: config.backoff(),
            },
        })
    }

    fn index_url(&self, index: &str) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("search engine URL cannot carry a path"))?
            .pop_if_empty()
            .push(index);
        Ok(url)
    }

    /// Send the request built by `build`, retrying transient failures.
    fn send(&self, what: &str, build: impl Fn() -> RequestBuilder) -> Result<Response> {
        let mut last_err = None;

        for attempt in 0..=self.retry.max_retries {
            if attempt > 0 {
                let delay = self.retry.delay(attempt);
                debug!(attempt, ?delay, "{} retrying", what);
                std::thread::sleep(delay);
            }

            match build().send() {
                Ok(response) => {
                    let status = response.status();
                    if is_transient(status) {
                        debug!(%status, attempt, "{} got transient status", what);
                        last_err = Some(anyhow::anyhow!("{}: engine answered {}", what, status));
                        continue;
                    }
                    return Ok(response);
                }
                Err(e) if e.is_timeout() || e.is_connect() => {
                    debug!(error = %e, attempt, "{} failed to reach engine", what);
                    last_err = Some(anyhow::anyhow!("{}: {}", what, e));
                    continue;
                }
                Err(e) => return Err(anyhow::anyhow!("{}: {}", what, e)),
            }
        }

        Err(last_err
            .unwrap_or_else(|| anyhow::anyhow!("{} failed", what))
            .context(format!(
                "gave up after {} retries",
                self.retry.max_retries
            )))
    }
}

fn is_transient(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT
    )
}

impl SearchAdmin for HttpSearchAdmin {
    fn server_major_version(&self) -> Result<Option<u32>> {
        let response = self.send("engine info", || self.client.get(self.base.clone()))?;
        let status = response.status();
        if !status.is_success() {
            bail!("engine info returned {}", status);
        }
        let info: Value = response.json()?;
        Ok(parse_major_version(&info))
    }

    fn index_exists(&self, index: &str) -> Result<bool> {
        let url = self.index_url(index)?;
        let response = self.send("index exists", || self.client.head(url.clone()))?;
        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            other => bail!("index exists check for '{}' returned {}", index, other),
        }
    }

    fn create_index(&self, index: &str, body: &Value) -> Result<Value> {
        let url = self.index_url(index)?;
        let response = self.send("create index", || self.client.put(url.clone()).json(body))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            bail!("create index '{}' returned {}: {}", index, status, text);
        }
        Ok(response.json()?)
    }
}

/// Extract the major version from the engine's root info document
/// (`{"version": {"number": "5.6.3"}}`).
fn parse_major_version(info: &Value) -> Option<u32> {
    info.get("version")?
        .get("number")?
        .as_str()?
        .split('.')
        .next()?
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn major_version_from_info() {
        let info = json!({ "name": "node-1", "version": { "number": "5.6.3" } });
        assert_eq!(parse_major_version(&info), Some(5));
        assert_eq!(parse_major_version(&json!({ "version": {} })), None);
        assert_eq!(parse_major_version(&json!({})), None);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_retries: 10,
            backoff: Duration::from_millis(100),
        };
        assert_eq!(policy.delay(1), Duration::from_millis(100));
        assert_eq!(policy.delay(3), Duration::from_millis(400));
        assert_eq!(policy.delay(9), Duration::from_millis(3200));
    }

    #[test]
    fn index_url_appends_segment() {
        let admin = HttpSearchAdmin::new("localhost", 9200, &EngineConfig::default()).unwrap();
        assert_eq!(
            admin.index_url("ponymail").unwrap().as_str(),
            "http://localhost:9200/ponymail"
        );
    }

    #[test]
    fn transient_statuses() {
        assert!(is_transient(StatusCode::SERVICE_UNAVAILABLE));
        assert!(!is_transient(StatusCode::BAD_REQUEST));
        assert!(!is_transient(StatusCode::INTERNAL_SERVER_ERROR));
    }
}
