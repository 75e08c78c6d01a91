use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub store: StoreConfig,
    #[serde(default)]
    pub redis: Option<RedisConfig>,
    #[serde(default)]
    pub engine: EngineConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    Memory,
    Redis,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EngineConfig {
    /// Outbound frames buffered per subscriber before deliveries start failing
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { subscriber_buffer: default_subscriber_buffer() }
    }
}

fn default_subscriber_buffer() -> usize { 64 }

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides, optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Developer overrides, never checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Eg. `TUCK__SERVER__PORT=8080`
            .add_source(config::Environment::with_prefix("TUCK").separator("__"))
            .build()?;

        s.try_deserialize()
    }

    /// Parse a single TOML document with no file or environment layering
    pub fn from_toml_str(toml: &str) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    /// Redis URL, required only when the redis backend is selected
    pub fn redis_url(&self) -> Result<&str, config::ConfigError> {
        self.redis
            .as_ref()
            .map(|r| r.url.as_str())
            .ok_or_else(|| config::ConfigError::NotFound("redis.url".into()))
    }
}
