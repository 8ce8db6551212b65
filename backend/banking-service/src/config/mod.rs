use crate::error::AppError;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use validator::Validate;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub jwt: JwtConfig,
    #[serde(default)]
    pub websocket: WebSocketConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[validate(range(min = 1, max = 256))]
    #[serde(default = "default_workers")]
    pub workers: usize,
}

#[derive(Clone, Deserialize, Validate)]
pub struct DatabaseConfig {
    #[validate(length(min = 1))]
    pub url: String,
    #[validate(range(min = 1))]
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &"<redacted>")
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

#[derive(Clone, Deserialize, Validate)]
pub struct RedisConfig {
    pub url: String,
    /// Cache role lookups in Redis
    #[serde(default = "default_true")]
    pub role_cache_enabled: bool,
    #[validate(range(min = 1))]
    #[serde(default = "default_role_cache_ttl")]
    pub role_cache_ttl_secs: u64,
}

impl fmt::Debug for RedisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisConfig")
            .field("url", &"<redacted>")
            .field("role_cache_enabled", &self.role_cache_enabled)
            .field("role_cache_ttl_secs", &self.role_cache_ttl_secs)
            .finish()
    }
}

#[derive(Clone, Deserialize, Validate)]
pub struct JwtConfig {
    #[validate(length(min = 16))]
    pub secret: String,
    #[validate(range(min = 1, max = 1440))]
    #[serde(default = "default_access_minutes")]
    pub access_token_expire_minutes: i64,
    #[validate(range(min = 1, max = 90))]
    #[serde(default = "default_refresh_days")]
    pub refresh_token_expire_days: i64,
}

impl fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"<redacted>")
            .field("access_token_expire_minutes", &self.access_token_expire_minutes)
            .field("refresh_token_expire_days", &self.refresh_token_expire_days)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct WebSocketConfig {
    #[validate(range(min = 1))]
    #[serde(default = "default_heartbeat")]
    pub heartbeat_interval_secs: u64,
    #[validate(range(min = 2))]
    #[serde(default = "default_client_timeout")]
    pub client_timeout_secs: u64,
    #[validate(range(min = 1))]
    #[serde(default = "default_event_queue_capacity")]
    pub event_queue_capacity: usize,
}

impl WebSocketConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn client_timeout(&self) -> Duration {
        Duration::from_secs(self.client_timeout_secs)
    }
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: default_heartbeat(),
            client_timeout_secs: default_client_timeout(),
            event_queue_capacity: default_event_queue_capacity(),
        }
    }
}

/// Fixed-window request limits for the admin API and socket upgrades.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RateLimitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[validate(range(min = 1))]
    #[serde(default = "default_rate_limit_max_requests")]
    pub max_requests: u64,
    #[validate(range(min = 1))]
    #[serde(default = "default_rate_limit_window")]
    pub window_secs: u64,
    /// Counter lookups slower than this let the request through
    #[validate(range(min = 1, max = 5000))]
    #[serde(default = "default_rate_limit_timeout")]
    pub store_timeout_ms: u64,
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: default_rate_limit_max_requests(),
            window_secs: default_rate_limit_window(),
            store_timeout_ms: default_rate_limit_timeout(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_workers() -> usize {
    4
}

fn default_max_connections() -> u32 {
    15
}

fn default_true() -> bool {
    true
}

fn default_role_cache_ttl() -> u64 {
    300
}

fn default_access_minutes() -> i64 {
    30
}

fn default_refresh_days() -> i64 {
    7
}

fn default_heartbeat() -> u64 {
    5
}

fn default_client_timeout() -> u64 {
    30
}

fn default_event_queue_capacity() -> usize {
    1024
}

fn default_rate_limit_max_requests() -> u64 {
    100
}

fn default_rate_limit_window() -> u64 {
    3600
}

fn default_rate_limit_timeout() -> u64 {
    100
}

impl Config {
    /// Load from the environment (and `.env`), e.g. `JWT__SECRET`, `SERVER__PORT`.
    pub fn load() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();
        Self::from_source(config::Environment::default().separator("__"))
    }

    pub fn from_source<S>(source: S) -> Result<Self, AppError>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let config = config::Config::builder()
            .set_default("server.host", default_host())
            .and_then(|b| b.set_default("server.port", default_port() as i64))
            .and_then(|b| b.set_default("database.url", "postgres://localhost/banking"))
            .and_then(|b| b.set_default("redis.url", "redis://localhost:6379"))
            .map_err(|e| AppError::Config(e.to_string()))?
            .add_source(source)
            .build()
            .map_err(|e| AppError::Config(e.to_string()))?;

        let cfg: Config = config
            .try_deserialize()
            .map_err(|e| AppError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), AppError> {
        let invalid = |section: &str, e: validator::ValidationErrors| {
            AppError::Config(format!("invalid {} config: {}", section, e))
        };

        self.server.validate().map_err(|e| invalid("server", e))?;
        self.database.validate().map_err(|e| invalid("database", e))?;
        self.redis.validate().map_err(|e| invalid("redis", e))?;
        self.jwt.validate().map_err(|e| invalid("jwt", e))?;
        self.websocket.validate().map_err(|e| invalid("websocket", e))?;
        self.rate_limit.validate().map_err(|e| invalid("rate_limit", e))?;

        if self.websocket.heartbeat_interval_secs >= self.websocket.client_timeout_secs {
            return Err(AppError::Config(
                "websocket.heartbeat_interval_secs must be below client_timeout_secs".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn source(vars: &[(&str, &str)]) -> config::Environment {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        config::Environment::default()
            .separator("__")
            .source(Some(map))
    }

    #[test]
    fn test_defaults_applied() {
        let cfg = Config::from_source(source(&[
            ("JWT__SECRET", "0123456789abcdef0123"),
            ("WEBSOCKET__EVENT_QUEUE_CAPACITY", "64"),
        ]))
        .unwrap();

        assert_eq!(cfg.server.port, 8000);
        assert_eq!(cfg.jwt.access_token_expire_minutes, 30);
        assert_eq!(cfg.jwt.refresh_token_expire_days, 7);
        assert_eq!(cfg.websocket.heartbeat_interval_secs, 5);
        assert_eq!(cfg.websocket.client_timeout_secs, 30);
        assert_eq!(cfg.websocket.event_queue_capacity, 64);
        assert_eq!(cfg.redis.role_cache_ttl_secs, 300);
        assert!(cfg.rate_limit.enabled);
        assert_eq!(cfg.rate_limit.max_requests, 100);
        assert_eq!(cfg.rate_limit.window_secs, 3600);
    }

    #[test]
    fn test_rate_limit_overrides() {
        let cfg = Config::from_source(source(&[
            ("JWT__SECRET", "0123456789abcdef0123"),
            ("RATE_LIMIT__MAX_REQUESTS", "20"),
            ("RATE_LIMIT__WINDOW_SECS", "60"),
        ]))
        .unwrap();
        assert_eq!(cfg.rate_limit.max_requests, 20);
        assert_eq!(cfg.rate_limit.window(), Duration::from_secs(60));

        let err = Config::from_source(source(&[
            ("JWT__SECRET", "0123456789abcdef0123"),
            ("RATE_LIMIT__MAX_REQUESTS", "0"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("rate_limit"));
    }

    #[test]
    fn test_missing_secret_rejected() {
        assert!(Config::from_source(source(&[])).is_err());
    }

    #[test]
    fn test_short_secret_rejected() {
        let err = Config::from_source(source(&[("JWT__SECRET", "short")])).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn test_heartbeat_must_be_below_timeout() {
        let err = Config::from_source(source(&[
            ("JWT__SECRET", "0123456789abcdef0123"),
            ("WEBSOCKET__HEARTBEAT_INTERVAL_SECS", "30"),
            ("WEBSOCKET__CLIENT_TIMEOUT_SECS", "30"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("heartbeat"));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let cfg = Config::from_source(source(&[("JWT__SECRET", "0123456789abcdef0123")])).unwrap();
        let rendered = format!("{:?}", cfg);
        assert!(!rendered.contains("0123456789abcdef0123"));
        assert!(rendered.contains("<redacted>"));
    }
}
