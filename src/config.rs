use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::backend;

const DEFAULT_ENV_PREFIX: &str = "VIDSHARE";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub comments: CommentsConfig,
    #[serde(default)]
    pub watch: WatchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
            token: None,
            timeout: default_timeout(),
        }
    }
}

impl ApiConfig {
    pub fn client_config(&self) -> backend::ClientConfig {
        backend::ClientConfig {
            base_url: Some(self.base_url.clone()),
            user_agent: self.user_agent.clone(),
            token: self.token.clone(),
            timeout: Some(self.timeout),
            http_client: None,
        }
    }
}

fn default_base_url() -> String {
    backend::DEFAULT_BASE_URL.to_string()
}

fn default_user_agent() -> String {
    format!("vidshare/{}", crate::VERSION)
}

fn default_timeout() -> Duration {
    Duration::from_secs(20)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommentsConfig {
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_reply_page_size")]
    pub reply_page_size: u32,
}

impl Default for CommentsConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            reply_page_size: default_reply_page_size(),
        }
    }
}

fn default_page_size() -> u32 {
    10
}

fn default_reply_page_size() -> u32 {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WatchConfig {
    #[serde(default = "default_tick_interval", with = "humantime_serde")]
    pub tick_interval: Duration,
    /// Watched seconds before the video is first written to history.
    #[serde(default = "default_history_floor_secs")]
    pub history_floor_secs: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            tick_interval: default_tick_interval(),
            history_floor_secs: default_history_floor_secs(),
        }
    }
}

fn default_tick_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_history_floor_secs() -> u64 {
    1
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

pub fn load(options: LoadOptions) -> Result<Config> {
    let mut cfg = Config::default();

    if let Some(path) = options.config_file.as_ref() {
        if path.exists() {
            let from_file = read_config_file(path)?;
            cfg = merge_config(cfg, from_file);
        }
    } else if let Some(default_path) = default_config_path() {
        if default_path.exists() {
            let from_file = read_config_file(&default_path)?;
            cfg = merge_config(cfg, from_file);
        }
    }

    let prefix = options.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);
    apply_env(&mut cfg, prefix);

    validate(&cfg)?;
    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&data)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    Ok(config)
}

fn validate(cfg: &Config) -> Result<()> {
    anyhow::ensure!(
        cfg.comments.page_size > 0,
        "config: comments.page_size must be at least 1"
    );
    anyhow::ensure!(
        cfg.comments.reply_page_size > 0,
        "config: comments.reply_page_size must be at least 1"
    );
    anyhow::ensure!(
        !cfg.watch.tick_interval.is_zero(),
        "config: watch.tick_interval must be positive"
    );
    Ok(())
}

/// Overlays a file on `base`. Values still at their default are skipped, so
/// the file only overrides what it actually sets.
fn merge_config(mut base: Config, other: Config) -> Config {
    let defaults = Config::default();

    if other.api.base_url != defaults.api.base_url {
        base.api.base_url = other.api.base_url;
    }
    if other.api.user_agent != defaults.api.user_agent && !other.api.user_agent.is_empty() {
        base.api.user_agent = other.api.user_agent;
    }
    if other.api.token.is_some() {
        base.api.token = other.api.token;
    }
    if other.api.timeout != defaults.api.timeout {
        base.api.timeout = other.api.timeout;
    }

    if other.comments.page_size != defaults.comments.page_size {
        base.comments.page_size = other.comments.page_size;
    }
    if other.comments.reply_page_size != defaults.comments.reply_page_size {
        base.comments.reply_page_size = other.comments.reply_page_size;
    }

    if other.watch.tick_interval != defaults.watch.tick_interval {
        base.watch.tick_interval = other.watch.tick_interval;
    }
    if other.watch.history_floor_secs != defaults.watch.history_floor_secs {
        base.watch.history_floor_secs = other.watch.history_floor_secs;
    }

    base
}

/// Env vars are written straight onto the merged config, so one can also put
/// back a default that the file changed.
fn apply_env(cfg: &mut Config, prefix: &str) {
    let upper_prefix = format!("{}_", prefix.to_uppercase());
    let mut map: HashMap<String, String> = HashMap::new();

    for (key, value) in env::vars() {
        if let Some(stripped) = key.strip_prefix(&upper_prefix) {
            let normalized = stripped.to_ascii_lowercase().replace("__", ".");
            map.insert(normalized, value);
        }
    }

    for (key, value) in map {
        apply_env_value(cfg, &key, value);
    }
}

fn apply_env_value(cfg: &mut Config, key: &str, value: String) {
    match key {
        "api.base_url" => cfg.api.base_url = value,
        "api.user_agent" => cfg.api.user_agent = value,
        "api.token" => {
            if !value.trim().is_empty() {
                cfg.api.token = Some(value);
            }
        }
        "api.timeout" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.api.timeout = duration;
            }
        }
        "comments.page_size" => {
            if let Ok(parsed) = value.parse::<u32>() {
                cfg.comments.page_size = parsed;
            }
        }
        "comments.reply_page_size" => {
            if let Ok(parsed) = value.parse::<u32>() {
                cfg.comments.reply_page_size = parsed;
            }
        }
        "watch.tick_interval" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.watch.tick_interval = duration;
            }
        }
        "watch.history_floor_secs" => {
            if let Ok(parsed) = value.parse::<u64>() {
                cfg.watch.history_floor_secs = parsed;
            }
        }
        _ => {}
    }
}

pub fn default_path() -> Option<PathBuf> {
    default_config_path()
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("vidshare").join("config.yaml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use tempfile::tempdir;

    fn isolated(path: PathBuf, prefix: &str) -> LoadOptions {
        LoadOptions {
            config_file: Some(path),
            env_prefix: Some(prefix.to_string()),
        }
    }

    #[test]
    fn load_defaults_without_files() {
        let dir = tempdir().unwrap();
        let cfg = load(isolated(dir.path().join("missing.yaml"), "VIDSHARE_T1")).unwrap();
        assert_eq!(cfg.comments.page_size, 10);
        assert_eq!(cfg.comments.reply_page_size, 5);
        assert_eq!(cfg.watch.tick_interval, Duration::from_secs(1));
        assert_eq!(cfg.watch.history_floor_secs, 1);
        assert_eq!(cfg.api.base_url, backend::DEFAULT_BASE_URL);
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "api:\n  base_url: https://videos.test/api/\n  timeout: 5s\ncomments:\n  reply_page_size: 3\nwatch:\n  history_floor_secs: 30\n",
        )
        .unwrap();
        let cfg = load(isolated(path, "VIDSHARE_T2")).unwrap();
        assert_eq!(cfg.api.base_url, "https://videos.test/api/");
        assert_eq!(cfg.api.timeout, Duration::from_secs(5));
        assert_eq!(cfg.comments.page_size, 10);
        assert_eq!(cfg.comments.reply_page_size, 3);
        assert_eq!(cfg.watch.history_floor_secs, 30);
    }

    #[test]
    fn env_overrides() {
        let dir = tempdir().unwrap();
        env::set_var("VIDSHARE_T3_WATCH__TICK_INTERVAL", "250ms");
        env::set_var("VIDSHARE_T3_API__TOKEN", "secret");
        let cfg = load(isolated(dir.path().join("none.yaml"), "VIDSHARE_T3")).unwrap();
        assert_eq!(cfg.watch.tick_interval, Duration::from_millis(250));
        assert_eq!(cfg.api.token.as_deref(), Some("secret"));
        env::remove_var("VIDSHARE_T3_WATCH__TICK_INTERVAL");
        env::remove_var("VIDSHARE_T3_API__TOKEN");
    }

    #[test]
    fn env_can_restore_a_default_over_the_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "comments:\n  page_size: 20\n").unwrap();
        env::set_var("VIDSHARE_T5_COMMENTS__PAGE_SIZE", "10");
        let cfg = load(isolated(path, "VIDSHARE_T5")).unwrap();
        env::remove_var("VIDSHARE_T5_COMMENTS__PAGE_SIZE");
        assert_eq!(cfg.comments.page_size, 10);
    }

    #[test]
    fn zero_page_size_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "comments:\n  page_size: 0\n").unwrap();
        let err = load(isolated(path, "VIDSHARE_T4")).unwrap_err();
        assert!(err.to_string().contains("page_size"));
    }
}
