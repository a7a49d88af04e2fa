use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const DEFAULT_ENV_PREFIX: &str = "REELS";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub ui: UIConfig,
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct FeedConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UIConfig {
    #[serde(default = "default_scroll_step")]
    pub scroll_step: usize,
    #[serde(default = "default_snap_delay", with = "humantime_serde")]
    pub snap_delay: Duration,
    #[serde(default = "default_tick_rate", with = "humantime_serde")]
    pub tick_rate: Duration,
}

impl Default for UIConfig {
    fn default() -> Self {
        Self {
            scroll_step: default_scroll_step(),
            snap_delay: default_snap_delay(),
            tick_rate: default_tick_rate(),
        }
    }
}

fn default_scroll_step() -> usize {
    3
}

fn default_snap_delay() -> Duration {
    Duration::from_millis(300)
}

fn default_tick_rate() -> Duration {
    Duration::from_millis(120)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Simulated,
    Mpv,
}

impl Backend {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "simulated" => Some(Backend::Simulated),
            "mpv" => Some(Backend::Mpv),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerConfig {
    #[serde(default)]
    pub backend: Backend,
    #[serde(default = "default_mpv_path")]
    pub mpv_path: String,
    #[serde(default)]
    pub extra_args: Vec<String>,
    #[serde(default = "default_preload")]
    pub preload: usize,
    #[serde(default = "default_progress_interval", with = "humantime_serde")]
    pub progress_interval: Duration,
    #[serde(default = "default_simulated_duration", with = "humantime_serde")]
    pub simulated_duration: Duration,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            mpv_path: default_mpv_path(),
            extra_args: Vec::new(),
            preload: default_preload(),
            progress_interval: default_progress_interval(),
            simulated_duration: default_simulated_duration(),
        }
    }
}

fn default_mpv_path() -> String {
    "mpv".into()
}

fn default_preload() -> usize {
    1
}

fn default_progress_interval() -> Duration {
    Duration::from_millis(250)
}

fn default_simulated_duration() -> Duration {
    Duration::from_secs(15)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogConfig {
    #[serde(default)]
    pub file: Option<PathBuf>,
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            file: None,
            filter: default_log_filter(),
        }
    }
}

fn default_log_filter() -> String {
    "info,reels_tui=debug".into()
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

pub fn load(options: LoadOptions) -> Result<Config> {
    let mut cfg = Config::default();

    if let Some(path) = options.config_file.as_ref() {
        anyhow::ensure!(
            path.exists(),
            "config: file {} does not exist",
            path.display()
        );
        let from_file = read_config_file(path)?;
        cfg = merge_config(cfg, from_file);
    } else if let Some(default_path) = default_config_path() {
        if default_path.exists() {
            let from_file = read_config_file(&default_path)?;
            cfg = merge_config(cfg, from_file);
        }
    }

    let prefix = options.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);
    cfg = apply_env(cfg, prefix);

    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&data)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    Ok(config)
}

fn merge_config(mut base: Config, other: Config) -> Config {
    if other.feed.path.is_some() {
        base.feed.path = other.feed.path;
    }

    if other.ui.scroll_step != 0 {
        base.ui.scroll_step = other.ui.scroll_step;
    }
    base.ui.snap_delay = other.ui.snap_delay;
    if !other.ui.tick_rate.is_zero() {
        base.ui.tick_rate = other.ui.tick_rate;
    }

    base.player.backend = other.player.backend;
    if !other.player.mpv_path.is_empty() {
        base.player.mpv_path = other.player.mpv_path;
    }
    if !other.player.extra_args.is_empty() {
        base.player.extra_args = other.player.extra_args;
    }
    base.player.preload = other.player.preload;
    if !other.player.progress_interval.is_zero() {
        base.player.progress_interval = other.player.progress_interval;
    }
    if !other.player.simulated_duration.is_zero() {
        base.player.simulated_duration = other.player.simulated_duration;
    }

    if other.log.file.is_some() {
        base.log.file = other.log.file;
    }
    if !other.log.filter.is_empty() {
        base.log.filter = other.log.filter;
    }

    base
}

fn apply_env(mut cfg: Config, prefix: &str) -> Config {
    let mut map: HashMap<String, String> = HashMap::new();
    let upper_prefix = format!("{}_", prefix.to_uppercase());

    for (key, value) in env::vars() {
        if let Some(stripped) = key.strip_prefix(&upper_prefix) {
            let normalized = stripped.to_ascii_lowercase().replace("__", ".");
            map.insert(normalized, value);
        }
    }

    for (key, value) in map {
        apply_env_value(&mut cfg, &key, value);
    }

    cfg
}

fn apply_env_value(cfg: &mut Config, key: &str, value: String) {
    match key {
        "feed.path" => cfg.feed.path = Some(PathBuf::from(value)),
        "ui.scroll_step" => {
            if let Ok(parsed) = value.parse::<usize>() {
                cfg.ui.scroll_step = parsed.max(1);
            }
        }
        "ui.snap_delay" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.ui.snap_delay = duration;
            }
        }
        "ui.tick_rate" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.ui.tick_rate = duration;
            }
        }
        "player.backend" => {
            if let Some(backend) = Backend::parse(&value) {
                cfg.player.backend = backend;
            }
        }
        "player.mpv_path" => cfg.player.mpv_path = value,
        "player.extra_args" => {
            cfg.player.extra_args = value
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        "player.preload" => {
            if let Ok(parsed) = value.parse::<usize>() {
                cfg.player.preload = parsed;
            }
        }
        "player.progress_interval" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.player.progress_interval = duration;
            }
        }
        "player.simulated_duration" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.player.simulated_duration = duration;
            }
        }
        "log.file" => cfg.log.file = Some(PathBuf::from(value)),
        "log.filter" => cfg.log.filter = value,
        _ => {}
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("reels-tui").join("config.yaml"))
}

pub fn to_yaml(cfg: &Config) -> Result<String> {
    serde_yaml::to_string(cfg).context("config: failed to serialize config")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use tempfile::tempdir;

    fn isolated() -> LoadOptions {
        LoadOptions {
            config_file: None,
            env_prefix: Some("REELS_TEST_UNSET".into()),
        }
    }

    #[test]
    fn load_defaults_without_files() {
        let cfg = load(isolated()).unwrap();
        assert_eq!(cfg.ui.scroll_step, 3);
        assert_eq!(cfg.player.backend, Backend::Simulated);
        assert_eq!(cfg.player.progress_interval, Duration::from_millis(250));
        assert!(cfg.log.file.is_none());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "player:\n  backend: mpv\n  extra_args: [\"--vo=null\"]\nui:\n  snap_delay: 1s\n",
        )
        .unwrap();
        let cfg = load(LoadOptions {
            config_file: Some(path),
            env_prefix: Some("REELS_TEST_UNSET".into()),
        })
        .unwrap();
        assert_eq!(cfg.player.backend, Backend::Mpv);
        assert_eq!(cfg.player.extra_args, vec!["--vo=null".to_string()]);
        assert_eq!(cfg.player.mpv_path, "mpv");
        assert_eq!(cfg.ui.snap_delay, Duration::from_secs(1));
        assert_eq!(cfg.ui.tick_rate, Duration::from_millis(120));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempdir().unwrap();
        let result = load(LoadOptions {
            config_file: Some(dir.path().join("absent.yaml")),
            env_prefix: Some("REELS_TEST_UNSET".into()),
        });
        assert!(result.is_err());
    }

    #[test]
    fn yaml_round_trips_defaults() {
        let yaml = to_yaml(&Config::default()).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, Config::default());
    }

    #[test]
    fn env_overrides() {
        env::set_var("REELS_ENVTEST_PLAYER__BACKEND", "MPV");
        env::set_var("REELS_ENVTEST_UI__SNAP_DELAY", "750ms");
        let cfg = load(LoadOptions {
            config_file: None,
            env_prefix: Some("REELS_ENVTEST".into()),
        })
        .unwrap();
        assert_eq!(cfg.player.backend, Backend::Mpv);
        assert_eq!(cfg.ui.snap_delay, Duration::from_millis(750));
        env::remove_var("REELS_ENVTEST_PLAYER__BACKEND");
        env::remove_var("REELS_ENVTEST_UI__SNAP_DELAY");
    }
}
