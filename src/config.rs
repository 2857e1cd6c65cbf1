use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use std::{env, fs, path};

#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "redis_addr_default")]
    pub redis_addr: String,
    #[serde(default = "log_level_default")]
    pub log_level: String,
    #[serde(default = "cache_ttl_secs_default")]
    pub cache_ttl_secs: u64,
    #[serde(default = "http_timeout_secs_default")]
    pub http_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            redis_addr: redis_addr_default(),
            log_level: log_level_default(),
            cache_ttl_secs: cache_ttl_secs_default(),
            http_timeout_secs: http_timeout_secs_default(),
        }
    }
}

impl Config {
    fn get_config_dir() -> anyhow::Result<path::PathBuf> {
        let config_dir = if let Ok(xdg_path) = env::var("XDG_CONFIG_HOME") {
            path::PathBuf::from(&xdg_path)
        } else {
            let home = env::var("HOME").with_context(|| "neither XDG_CONFIG_HOME nor HOME is set")?;
            path::Path::new(&home).join(".config")
        };

        Ok(config_dir.join("rusty_cacher"))
    }

    /// Where the config file is expected, `$RUSTY_CACHER_CFG_PATH` wins over the XDG location.
    pub fn file_path() -> anyhow::Result<path::PathBuf> {
        if let Ok(cfg_path) = env::var("RUSTY_CACHER_CFG_PATH") {
            return Ok(path::PathBuf::from(cfg_path));
        }

        Ok(Self::get_config_dir()
            .with_context(|| "fail to locate config directory")?
            .join("config.toml"))
    }

    pub fn from_path() -> anyhow::Result<Self> {
        let file_path = Self::file_path()?;
        if !file_path.exists() {
            anyhow::bail!("Config file not found in {file_path:?}");
        }
        Self::from_file(&file_path)
    }

    /// Like [`Config::from_path`], but a missing file gives `None`. A file that exists and fails
    /// to load is still an error.
    pub fn from_path_if_exists() -> anyhow::Result<Option<Self>> {
        let file_path = Self::file_path()?;
        if !file_path.exists() {
            return Ok(None);
        }
        Self::from_file(&file_path).map(Some)
    }

    pub fn from_file(file_path: &path::Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(file_path)
            .with_context(|| format!("fail to read config file {file_path:?}"))?;

        toml::from_str(&content).with_context(|| "fail to parse config from toml")
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

fn redis_addr_default() -> String {
    "redis://localhost:6379".to_string()
}

fn log_level_default() -> String {
    "INFO".to_string()
}

fn cache_ttl_secs_default() -> u64 {
    10
}

fn http_timeout_secs_default() -> u64 {
    30
}

#[test]
fn validate_file_correctness() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    let config = r#"
        redis_addr = "redis://cache.internal:6380"
        log_level = "DEBUG"
        cache_ttl_secs = 60
    "#;
    fs::write(&path, config).unwrap();

    let config = Config::from_file(&path).unwrap();
    assert_eq!(config.redis_addr, "redis://cache.internal:6380");
    assert_eq!(config.log_level, "DEBUG");
    assert_eq!(config.cache_ttl(), Duration::from_secs(60));
    assert_eq!(config.http_timeout(), Duration::from_secs(30));
}

#[test]
fn empty_file_gives_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "").unwrap();

    let config = Config::from_file(&path).unwrap();
    assert_eq!(config.redis_addr, "redis://localhost:6379");
    assert_eq!(config.cache_ttl(), crate::DEFAULT_TTL);
}

#[test]
fn malformed_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "cache_ttl_secs = \"ten\"").unwrap();

    assert!(Config::from_file(&path).is_err());
}

#[test]
fn load_from_env_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cacher.toml");
    env::set_var("RUSTY_CACHER_CFG_PATH", &path);

    assert_eq!(Config::file_path().unwrap(), path);
    assert!(Config::from_path().is_err());
    assert!(Config::from_path_if_exists().unwrap().is_none());

    fs::write(&path, "redis_addr = \"redis://env-configured\"").unwrap();
    assert_eq!(Config::from_path().unwrap().redis_addr, "redis://env-configured");
    assert_eq!(
        Config::from_path_if_exists().unwrap().unwrap().redis_addr,
        "redis://env-configured"
    );

    fs::write(&path, "cache_ttl_secs = \"ten\"").unwrap();
    assert!(Config::from_path_if_exists().is_err());

    env::remove_var("RUSTY_CACHER_CFG_PATH");
}
