use handyhub_core::{BlockingPolicy, BusinessHours, CoreResult, MediaSettings};
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub booking: BookingConfig,
    pub storage: StorageConfig,
    pub media: MediaSettings,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    #[serde(default = "default_timeout")]
    pub request_timeout_seconds: u64,
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_timeout() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// No URL means the in-memory store
    pub url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
        }
    }
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RedisConfig {
    pub url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_expiration_seconds: u64,
    #[serde(default = "default_refresh_days")]
    pub refresh_token_days: i64,
    #[serde(default = "default_reset_minutes")]
    pub reset_token_minutes: i64,
}

fn default_refresh_days() -> i64 {
    30
}

fn default_reset_minutes() -> i64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct BookingConfig {
    pub open_time: String,
    pub close_time: String,
    pub blocking_statuses: Vec<String>,
    pub feed_page_size: i64,
    pub change_feed_capacity: usize,
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            open_time: "09:00".to_string(),
            close_time: "17:00".to_string(),
            blocking_statuses: vec!["pending".to_string(), "accepted".to_string()],
            feed_page_size: 10,
            change_feed_capacity: 256,
        }
    }
}

impl BookingConfig {
    pub fn business_hours(&self) -> CoreResult<BusinessHours> {
        BusinessHours::parse(&self.open_time, &self.close_time)
    }

    pub fn blocking_policy(&self) -> CoreResult<BlockingPolicy> {
        BlockingPolicy::from_names(&self.blocking_statuses)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub root: String,
    pub public_base_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RateLimitConfig {
    pub requests_per_window: i64,
    pub window_seconds: i64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_window: 120,
            window_seconds: 60,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. HANDYHUB__DATABASE__URL=postgres://...
            .add_source(
                config::Environment::with_prefix("HANDYHUB")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("booking.blocking_statuses")
                    .with_list_parse_key("server.cors_origins")
                    .try_parsing(true),
            )
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
        [server]
        port = 9000

        [auth]
        jwt_secret = "test"
        jwt_expiration_seconds = 60

        [booking]
        open_time = "08:00"
        close_time = "12:00"
        blocking_statuses = ["pending"]
        feed_page_size = 5
        change_feed_capacity = 16

        [storage]
        root = "/tmp/uploads"
        public_base_url = "http://localhost/media"

        [media]
        cloud_name = "demo"
        api_key = "k"
        api_secret = "s"
    "#;

    fn parse(raw: &str) -> Config {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(raw.as_bytes()).unwrap();

        config::Config::builder()
            .add_source(config::File::from(file.path()))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_sections_and_defaults() {
        let cfg = parse(SAMPLE);
        assert_eq!(cfg.server.port, 9000);
        assert_eq!(cfg.server.request_timeout_seconds, 10);
        assert!(cfg.database.url.is_none());
        assert!(cfg.redis.url.is_none());
        assert_eq!(cfg.rate_limit.window_seconds, 60);
        assert_eq!(cfg.media.ttl_seconds, 3600);
        assert_eq!(cfg.auth.refresh_token_days, 30);
    }

    #[test]
    fn test_booking_section_builds_domain_types() {
        let cfg = parse(SAMPLE);
        let hours = cfg.booking.business_hours().unwrap();
        assert_eq!(hours.length_minutes(), 240);
        assert_eq!(cfg.booking.blocking_policy().unwrap(), BlockingPolicy::pending_only());

        let mut bad = cfg.booking.clone();
        bad.blocking_statuses = vec!["accepted".to_string()];
        assert!(bad.blocking_policy().is_err());
    }
}
