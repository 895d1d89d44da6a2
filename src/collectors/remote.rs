use super::{Collector, InvokeError, RawResult};
use crate::config::RemoteCollectorConfig;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, error, warn};

/// Forwards each poll to an upstream instance running the local collector.
pub struct UpstreamApi {
    client: Client,
    url: String,
    timeout: Duration,
    healthy: AtomicBool,
}

impl UpstreamApi {
    pub fn new(cfg: RemoteCollectorConfig) -> Result<Self, InvokeError> {
        let client = Client::builder()
            .user_agent(concat!("hostmetricsd/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            url: cfg.url(),
            timeout: Duration::from_secs(cfg.timeout_secs),
            healthy: AtomicBool::new(true),
        })
    }

    async fn fetch(&self) -> RawResult {
        let result = self.request().await;
        self.healthy.store(result.is_ok(), Ordering::Relaxed);
        result
    }

    async fn request(&self) -> RawResult {
        debug!(url = %self.url, "fetching metrics from host API");
        let resp = self
            .client
            .get(&self.url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|err| self.request_err(err))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(InvokeError::Status(status.as_u16()));
        }
        let body = resp.bytes().await.map_err(|err| self.request_err(err))?;
        unwrap_envelope(&body)
    }

    fn request_err(&self, err: reqwest::Error) -> InvokeError {
        if err.is_timeout() {
            InvokeError::RequestTimeout(self.timeout.as_secs())
        } else {
            InvokeError::Request(err)
        }
    }
}

/// The upstream answers with `{timestamp, data, error}`; a bare collector
/// document is passed through as-is.
fn unwrap_envelope(body: &[u8]) -> RawResult {
    let value: Value =
        serde_json::from_slice(body).map_err(|err| InvokeError::Body(err.to_string()))?;
    let Value::Object(mut map) = value else {
        return Err(InvokeError::Body("expected JSON object".to_string()));
    };

    let is_envelope =
        !map.contains_key("cpu") && (map.contains_key("data") || map.contains_key("error"));
    if !is_envelope {
        return serde_json::to_vec(&map).map_err(|err| InvokeError::Body(err.to_string()));
    }

    match (map.remove("data"), map.remove("error")) {
        (_, Some(Value::String(reason))) => Err(InvokeError::Upstream(reason)),
        (_, Some(other)) if !other.is_null() => Err(InvokeError::Upstream(other.to_string())),
        (Some(data), _) if !data.is_null() => {
            serde_json::to_vec(&data).map_err(|err| InvokeError::Body(err.to_string()))
        }
        _ => Err(InvokeError::Upstream("no data in response".to_string())),
    }
}

#[async_trait]
impl Collector for UpstreamApi {
    async fn invoke(&self) -> RawResult {
        let result = self.fetch().await;
        match &result {
            Ok(body) => debug!(bytes = body.len(), "fetched metrics from host API"),
            Err(InvokeError::Upstream(reason)) => {
                warn!(error = %reason, "host API returned error")
            }
            Err(err) => error!(error = %err, url = %self.url, "host API request failed"),
        }
        result
    }

    fn describe(&self) -> String {
        format!("GET {}", self.url)
    }

    fn available(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }
}
