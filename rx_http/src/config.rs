use std::fmt;
use std::path::Path;
use std::time::Duration;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;

use crate::client::HttpClientConfig;
use crate::errors::Result;

pub const API_URL: &str = "https://discord.com/api/v10";

pub const USER_AGENT: &str = concat!("DiscordBot (", env!("CARGO_PKG_REPOSITORY"), ", ", env!("CARGO_PKG_VERSION"), ")");

/// Client settings
#[derive(Clone, PartialEq)]
pub struct RestConfig {
    /// API root every route path is appended to
    pub base_url: String,

    /// Bot token, sent as `Authorization: Bot <token>`
    pub token: String,

    pub user_agent: String,

    /// Wait out a 429 and re-issue the request once instead of failing (default: true)
    pub auto_wait_rate_limits: bool,

    /// Longest 429 window worth waiting out automatically (default: 60s)
    pub max_rate_limit_wait: Duration,

    /// Pause between attempts after a connection reset (default: 5s)
    pub transient_backoff: Duration,

    pub http: HttpClientConfig,
}

impl RestConfig {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            base_url: API_URL.to_string(),
            token: token.into(),
            user_agent: USER_AGENT.to_string(),
            auto_wait_rate_limits: true,
            max_rate_limit_wait: Duration::from_secs(60),
            transient_backoff: Duration::from_secs(5),
            http: HttpClientConfig::default(),
        }
    }

    /// Load from a config file, with `RX_*` environment variables taking precedence
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let config = Config::builder().add_source(File::from(path)).add_source(Environment::with_prefix("RX")).build()?;
        let file: RestConfigFile = config.try_deserialize()?;

        tracing::info!("Loaded REST config from {}", path.display());
        Ok(file.into())
    }
}

impl fmt::Debug for RestConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestConfig")
            .field("base_url", &self.base_url)
            .field("token", &"<redacted>")
            .field("user_agent", &self.user_agent)
            .field("auto_wait_rate_limits", &self.auto_wait_rate_limits)
            .field("max_rate_limit_wait", &self.max_rate_limit_wait)
            .field("transient_backoff", &self.transient_backoff)
            .field("http", &self.http)
            .finish()
    }
}

/// On-disk form of [`RestConfig`]; everything but the token is optional
#[derive(Debug, Deserialize)]
pub struct RestConfigFile {
    pub token: String,
    pub base_url: Option<String>,
    pub user_agent: Option<String>,
    pub auto_wait_rate_limits: Option<bool>,
    pub max_rate_limit_wait_secs: Option<f64>,
    pub transient_backoff_secs: Option<f64>,
    pub request_timeout_secs: Option<u64>,
    pub connect_timeout_secs: Option<u64>,
    pub pool_max_idle_per_host: Option<usize>,
}

impl From<RestConfigFile> for RestConfig {
    fn from(file: RestConfigFile) -> Self {
        let mut config = RestConfig::new(file.token);
        if let Some(base_url) = file.base_url {
            config.base_url = base_url;
        }
        if let Some(user_agent) = file.user_agent {
            config.user_agent = user_agent;
        }
        if let Some(auto_wait) = file.auto_wait_rate_limits {
            config.auto_wait_rate_limits = auto_wait;
        }
        if let Some(wait) = file.max_rate_limit_wait_secs.and_then(rx_ratelimit::secs_to_duration) {
            config.max_rate_limit_wait = wait;
        }
        if let Some(backoff) = file.transient_backoff_secs.and_then(rx_ratelimit::secs_to_duration) {
            config.transient_backoff = backoff;
        }
        if let Some(secs) = file.request_timeout_secs {
            config.http.request_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = file.connect_timeout_secs {
            config.http.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(pool) = file.pool_max_idle_per_host {
            config.http.pool_max_idle_per_host = pool;
        }
        config
    }
}
