use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

pub const ENV_HOST_API_BASE_URL: &str = "HOST_API_BASE_URL";
pub const ENV_POLL_INTERVAL_SECONDS: &str = "POLL_INTERVAL_SECONDS";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub listen: String,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_history_path")]
    pub history_path: PathBuf,
    #[serde(default)]
    pub collector: CollectorConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum CollectorConfig {
    Local(LocalCollectorConfig),
    Remote(RemoteCollectorConfig),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LocalCollectorConfig {
    #[serde(default = "default_script")]
    pub script: PathBuf,
    #[serde(default = "default_required_scripts")]
    pub required_scripts: Vec<PathBuf>,
    #[serde(default = "default_interpreter")]
    pub interpreter: String,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    #[serde(default = "default_local_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RemoteCollectorConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_remote_path")]
    pub path: String,
    #[serde(default = "default_remote_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self::Local(LocalCollectorConfig::default())
    }
}

impl Default for LocalCollectorConfig {
    fn default() -> Self {
        Self {
            script: default_script(),
            required_scripts: default_required_scripts(),
            interpreter: default_interpreter(),
            working_dir: None,
            timeout_secs: default_local_timeout_secs(),
        }
    }
}

impl Default for RemoteCollectorConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            path: default_remote_path(),
            timeout_secs: default_remote_timeout_secs(),
        }
    }
}

impl CollectorConfig {
    pub fn mode(&self) -> &'static str {
        match self {
            Self::Local(_) => "local",
            Self::Remote(_) => "remote",
        }
    }
}

impl LocalCollectorConfig {
    /// Directory the script runs in: explicit `working_dir`, else the script's parent.
    pub fn effective_working_dir(&self) -> Option<PathBuf> {
        if let Some(dir) = &self.working_dir {
            return Some(dir.clone());
        }
        self.script
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
    }
}

impl RemoteCollectorConfig {
    pub fn url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.path.trim_start_matches('/')
        )
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("не удалось прочитать файл конфигурации {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("не удалось разобрать YAML в {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("некорректная переменная окружения {name}={value}")]
    Env { name: &'static str, value: String },
    #[error("ошибка валидации конфигурации: {0}")]
    Validation(String),
}

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let path_display = path_ref.display().to_string();
        let text = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_display.clone(),
            source,
        })?;

        let mut cfg: Config = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path_display,
            source,
        })?;

        cfg.apply_env_overrides(|name| std::env::var(name).ok())?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// `HOST_API_BASE_URL` forces remote mode with that base URL;
    /// `POLL_INTERVAL_SECONDS` replaces `interval_secs`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(base_url) = lookup(ENV_HOST_API_BASE_URL).filter(|v| !v.trim().is_empty()) {
            match &mut self.collector {
                CollectorConfig::Remote(remote) => remote.base_url = base_url,
                CollectorConfig::Local(_) => {
                    self.collector = CollectorConfig::Remote(RemoteCollectorConfig {
                        base_url,
                        ..RemoteCollectorConfig::default()
                    });
                }
            }
        }

        if let Some(raw) = lookup(ENV_POLL_INTERVAL_SECONDS) {
            self.interval_secs = raw.trim().parse().map_err(|_| ConfigError::Env {
                name: ENV_POLL_INTERVAL_SECONDS,
                value: raw.clone(),
            })?;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen.trim().is_empty() {
            return Err(ConfigError::Validation("поле listen обязательно".to_string()));
        }
        if SocketAddr::from_str(&self.listen).is_err() {
            return Err(ConfigError::Validation(
                "поле listen должно быть корректным адресом host:port".to_string(),
            ));
        }
        if self.interval_secs < 1 {
            return Err(ConfigError::Validation(
                "interval_secs должно быть >= 1".to_string(),
            ));
        }
        if self.history_path.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "history_path не должен быть пустым".to_string(),
            ));
        }

        match &self.collector {
            CollectorConfig::Local(local) => validate_local(local),
            CollectorConfig::Remote(remote) => validate_remote(remote),
        }
    }

    pub fn example_yaml() -> &'static str {
        include_str!("../config.yaml.example")
    }
}

fn validate_local(cfg: &LocalCollectorConfig) -> Result<(), ConfigError> {
    if cfg.script.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "collector.script не должен быть пустым".to_string(),
        ));
    }
    if cfg.interpreter.trim().is_empty() {
        return Err(ConfigError::Validation(
            "collector.interpreter не должен быть пустым".to_string(),
        ));
    }
    if cfg.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "collector.timeout_secs должен быть > 0".to_string(),
        ));
    }
    Ok(())
}

fn validate_remote(cfg: &RemoteCollectorConfig) -> Result<(), ConfigError> {
    let base = cfg.base_url.trim();
    if base.is_empty() {
        return Err(ConfigError::Validation(
            "collector.base_url не должен быть пустым".to_string(),
        ));
    }
    if !base.starts_with("http://") && !base.starts_with("https://") {
        return Err(ConfigError::Validation(format!(
            "collector.base_url '{}' должен начинаться с http:// или https://",
            cfg.base_url
        )));
    }
    if cfg.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "collector.timeout_secs должен быть > 0".to_string(),
        ));
    }
    Ok(())
}

const fn default_interval_secs() -> u64 {
    5
}

fn default_history_path() -> PathBuf {
    PathBuf::from("history.jsonl")
}

fn default_script() -> PathBuf {
    PathBuf::from("collect_metrics.sh")
}

fn default_required_scripts() -> Vec<PathBuf> {
    vec![PathBuf::from("system_monitor.sh")]
}

fn default_interpreter() -> String {
    "/bin/bash".to_string()
}

const fn default_local_timeout_secs() -> u64 {
    60
}

fn default_base_url() -> String {
    "http://host.docker.internal:9000".to_string()
}

fn default_remote_path() -> String {
    "/api/metrics/current".to_string()
}

const fn default_remote_timeout_secs() -> u64 {
    180
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config {
            listen: "127.0.0.1:8000".to_string(),
            interval_secs: 5,
            history_path: default_history_path(),
            collector: CollectorConfig::default(),
        }
    }

    #[test]
    fn example_yaml_parses_and_validates() {
        let cfg: Config = serde_yaml::from_str(Config::example_yaml()).expect("example yaml");
        cfg.validate().expect("example config must be valid");
        assert_eq!(cfg.interval_secs, 5);
    }

    #[test]
    fn remote_mode_defaults() {
        let cfg: Config = serde_yaml::from_str(
            "listen: 0.0.0.0:8000\ncollector:\n  mode: remote\n",
        )
        .expect("yaml");
        match &cfg.collector {
            CollectorConfig::Remote(remote) => {
                assert_eq!(remote.timeout_secs, 180);
                assert_eq!(
                    remote.url(),
                    "http://host.docker.internal:9000/api/metrics/current"
                );
            }
            other => panic!("unexpected collector config: {other:?}"),
        }
    }

    #[test]
    fn local_mode_is_default() {
        let cfg: Config = serde_yaml::from_str("listen: 0.0.0.0:9000\n").expect("yaml");
        assert_eq!(cfg.collector.mode(), "local");
        assert_eq!(cfg.history_path, PathBuf::from("history.jsonl"));
    }

    #[test]
    fn working_dir_falls_back_to_script_parent() {
        let mut local = LocalCollectorConfig {
            script: PathBuf::from("/opt/host_api/collect_metrics.sh"),
            ..LocalCollectorConfig::default()
        };
        assert_eq!(
            local.effective_working_dir(),
            Some(PathBuf::from("/opt/host_api"))
        );
        local.script = PathBuf::from("collect_metrics.sh");
        assert_eq!(local.effective_working_dir(), None);
    }

    #[test]
    fn zero_interval_rejected() {
        let mut cfg = valid_config();
        cfg.interval_secs = 0;
        let err = cfg.validate().expect_err("zero interval");
        assert!(matches!(err, ConfigError::Validation(_)));
        assert_eq!(
            err.to_string(),
            "ошибка валидации конфигурации: interval_secs должно быть >= 1"
        );
    }

    #[test]
    fn bad_listen_rejected() {
        let mut cfg = valid_config();
        cfg.listen = "localhost".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn env_base_url_switches_to_remote() {
        let mut cfg = valid_config();
        cfg.apply_env_overrides(|name| match name {
            ENV_HOST_API_BASE_URL => Some("http://10.0.0.2:9000/".to_string()),
            ENV_POLL_INTERVAL_SECONDS => Some("7".to_string()),
            _ => None,
        })
        .expect("overrides");
        assert_eq!(cfg.interval_secs, 7);
        match &cfg.collector {
            CollectorConfig::Remote(remote) => {
                assert_eq!(remote.url(), "http://10.0.0.2:9000/api/metrics/current")
            }
            other => panic!("unexpected collector config: {other:?}"),
        }
    }

    #[test]
    fn env_interval_must_be_integer() {
        let mut cfg = valid_config();
        let err = cfg
            .apply_env_overrides(|name| {
                (name == ENV_POLL_INTERVAL_SECONDS).then(|| "five".to_string())
            })
            .expect_err("non-numeric interval");
        assert!(matches!(err, ConfigError::Env { .. }));
    }

    #[test]
    fn remote_base_url_needs_scheme() {
        let mut cfg = valid_config();
        cfg.collector = CollectorConfig::Remote(RemoteCollectorConfig {
            base_url: "host:9000".to_string(),
            ..RemoteCollectorConfig::default()
        });
        assert!(cfg.validate().is_err());
    }
}
