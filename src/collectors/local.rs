use super::{Collector, InvokeError, RawResult};
use crate::config::LocalCollectorConfig;
use crate::parser::excerpt;
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time;
use tracing::{debug, error, warn};

const STDERR_EXCERPT_CHARS: usize = 500;

/// Runs the trusted wrapper script on this host and captures its stdout.
pub struct LocalScript {
    cfg: LocalCollectorConfig,
}

impl LocalScript {
    pub fn new(cfg: LocalCollectorConfig) -> Self {
        Self { cfg }
    }

    fn check_scripts(&self) -> Result<(), InvokeError> {
        if !self.cfg.script.exists() {
            return Err(InvokeError::ScriptMissing(self.cfg.script.clone()));
        }
        if let Some(missing) = self.cfg.required_scripts.iter().find(|p| !p.exists()) {
            return Err(InvokeError::RequiredMissing(missing.clone()));
        }
        Ok(())
    }

    async fn run(&self) -> RawResult {
        self.check_scripts()?;

        let script = std::fs::canonicalize(&self.cfg.script)
            .unwrap_or_else(|_| self.cfg.script.clone());
        let mut cmd = Command::new(&self.cfg.interpreter);
        cmd.arg(&script)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = self.cfg.effective_working_dir() {
            cmd.current_dir(dir);
        }

        let output = match time::timeout(
            Duration::from_secs(self.cfg.timeout_secs),
            cmd.output(),
        )
        .await
        {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => return Err(InvokeError::Spawn(err)),
            Err(_elapsed) => return Err(InvokeError::Timeout(self.cfg.timeout_secs)),
        };

        if !output.status.success() {
            let code = output
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "none (terminated by signal)".to_string());
            debug!(stdout = %excerpt(&output.stdout), "script stdout before failure");
            return Err(InvokeError::NonZeroExit {
                code,
                stderr: stderr_excerpt(&output.stderr),
            });
        }

        if output.stdout.iter().all(u8::is_ascii_whitespace) {
            debug!(stderr = %stderr_excerpt(&output.stderr), "script produced no stdout");
            return Err(InvokeError::EmptyOutput);
        }

        Ok(output.stdout)
    }
}

#[async_trait]
impl Collector for LocalScript {
    async fn invoke(&self) -> RawResult {
        let result = self.run().await;
        match &result {
            Ok(stdout) => debug!(bytes = stdout.len(), "script finished"),
            Err(InvokeError::EmptyOutput) => warn!("script returned empty output"),
            Err(err) => error!(error = %err, script = %self.cfg.script.display(), "script failed"),
        }
        result
    }

    fn describe(&self) -> String {
        format!("{} {}", self.cfg.interpreter, self.cfg.script.display())
    }

    fn available(&self) -> bool {
        self.check_scripts().is_ok()
    }
}

fn stderr_excerpt(stderr: &[u8]) -> String {
    String::from_utf8_lossy(stderr)
        .trim()
        .chars()
        .take(STDERR_EXCERPT_CHARS)
        .collect()
}
