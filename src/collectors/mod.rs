pub mod local;
pub mod remote;

use crate::config::CollectorConfig;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Raw outcome of one collector call: stdout / response body, or a reason.
pub type RawResult = Result<Vec<u8>, InvokeError>;

#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("Wrapper script not found at {}", .0.display())]
    ScriptMissing(PathBuf),
    #[error("Monitor script not found at {}", .0.display())]
    RequiredMissing(PathBuf),
    #[error("Script failed with return code {code}: {stderr}")]
    NonZeroExit { code: String, stderr: String },
    #[error("Script execution timed out after {0} seconds")]
    Timeout(u64),
    #[error("Script returned empty output")]
    EmptyOutput,
    #[error("Unexpected error executing script: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("Failed to fetch from host API: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Failed to fetch from host API: request timed out after {0} seconds")]
    RequestTimeout(u64),
    #[error("Failed to fetch from host API: HTTP {0}")]
    Status(u16),
    #[error("Failed to fetch from host API: malformed response body: {0}")]
    Body(String),
    #[error("Host API returned error: {0}")]
    Upstream(String),
}

#[async_trait]
pub trait Collector: Send + Sync {
    async fn invoke(&self) -> RawResult;

    fn describe(&self) -> String;

    /// Cheap availability check; must not perform network or process I/O.
    fn available(&self) -> bool;
}

pub fn from_config(cfg: &CollectorConfig) -> Result<Arc<dyn Collector>, InvokeError> {
    match cfg {
        CollectorConfig::Local(local) => Ok(Arc::new(local::LocalScript::new(local.clone()))),
        CollectorConfig::Remote(remote) => {
            Ok(Arc::new(remote::UpstreamApi::new(remote.clone())?))
        }
    }
}
