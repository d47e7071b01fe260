use handyhub_core::{
    AuthService, BlockingPolicy, BookingManager, BusinessHours, ChangeFeed, LogMailer, Mailer, MediaSettings,
    NotificationFeed, ObjectStore, ProviderManager, Repositories, UploadSigner,
};
use handyhub_store::app_config::{Config, RateLimitConfig};
use handyhub_store::RedisClient;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub expiration: u64,
}

/// Everything needed to wire the services, independent of where it was read from
pub struct StateOptions {
    pub auth: AuthConfig,
    pub hours: BusinessHours,
    pub policy: BlockingPolicy,
    pub feed_page_size: i64,
    pub feed_capacity: usize,
    pub refresh_ttl: chrono::Duration,
    pub reset_ttl: chrono::Duration,
    pub media: Option<MediaSettings>,
    pub rate_limit: RateLimitConfig,
    pub request_timeout: Duration,
    /// Empty allows any origin
    pub cors_origins: Vec<String>,
}

impl StateOptions {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            auth: AuthConfig {
                secret: config.auth.jwt_secret.clone(),
                expiration: config.auth.jwt_expiration_seconds,
            },
            hours: config.booking.business_hours()?,
            policy: config.booking.blocking_policy()?,
            feed_page_size: config.booking.feed_page_size,
            feed_capacity: config.booking.change_feed_capacity,
            refresh_ttl: chrono::Duration::days(config.auth.refresh_token_days),
            reset_ttl: chrono::Duration::minutes(config.auth.reset_token_minutes),
            media: Some(config.media.clone()),
            rate_limit: config.rate_limit.clone(),
            request_timeout: Duration::from_secs(config.server.request_timeout_seconds),
            cors_origins: config.server.cors_origins.clone(),
        })
    }
}

impl Default for StateOptions {
    fn default() -> Self {
        Self {
            auth: AuthConfig {
                secret: "handyhub-dev-secret".to_string(),
                expiration: 3600,
            },
            hours: BusinessHours::default(),
            policy: BlockingPolicy::default(),
            feed_page_size: handyhub_core::notifications::DEFAULT_PAGE_SIZE,
            feed_capacity: handyhub_core::realtime::DEFAULT_FEED_CAPACITY,
            refresh_ttl: chrono::Duration::days(30),
            reset_ttl: chrono::Duration::hours(1),
            media: None,
            rate_limit: RateLimitConfig::default(),
            request_timeout: Duration::from_secs(10),
            cors_origins: Vec::new(),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub auth: AuthConfig,
    pub repos: Repositories,
    pub feed: ChangeFeed,
    pub bookings: Arc<BookingManager>,
    pub providers: Arc<ProviderManager>,
    pub notifications: NotificationFeed,
    pub identity: Arc<AuthService>,
    pub signer: Option<Arc<UploadSigner>>,
    pub redis: Option<Arc<RedisClient>>,
    pub rate_limit: RateLimitConfig,
    pub request_timeout: Duration,
    pub cors_origins: Vec<String>,
}

impl AppState {
    pub fn new(
        repos: Repositories,
        objects: Arc<dyn ObjectStore>,
        redis: Option<Arc<RedisClient>>,
        options: StateOptions,
    ) -> Self {
        Self::with_mailer(repos, objects, redis, Arc::new(LogMailer), options)
    }

    pub fn with_mailer(
        repos: Repositories,
        objects: Arc<dyn ObjectStore>,
        redis: Option<Arc<RedisClient>>,
        mailer: Arc<dyn Mailer>,
        options: StateOptions,
    ) -> Self {
        let feed = ChangeFeed::new(options.feed_capacity);

        let signer = match options.media.map(UploadSigner::new) {
            Some(Ok(signer)) => Some(Arc::new(signer)),
            Some(Err(e)) => {
                tracing::warn!("Upload signing disabled: {}", e);
                None
            }
            None => None,
        };

        Self {
            auth: options.auth,
            bookings: Arc::new(BookingManager::new(
                repos.clone(),
                feed.clone(),
                options.hours,
                options.policy,
            )),
            providers: Arc::new(ProviderManager::new(repos.clone(), feed.clone(), objects)),
            notifications: NotificationFeed::new(repos.notifications.clone(), feed.clone(), options.feed_page_size),
            identity: Arc::new(
                AuthService::new(repos.users.clone(), mailer).with_ttls(options.refresh_ttl, options.reset_ttl),
            ),
            signer,
            redis,
            rate_limit: options.rate_limit,
            request_timeout: options.request_timeout,
            cors_origins: options.cors_origins,
            repos,
            feed,
        }
    }
}
