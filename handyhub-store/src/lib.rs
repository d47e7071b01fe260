pub mod app_config;
pub mod booking_repo;
pub mod database;
pub mod notification_repo;
pub mod object_store;
pub mod provider_repo;
pub mod redis_repo;
pub mod service_repo;
pub mod user_repo;

pub use app_config::Config;
pub use database::DbClient;
pub use object_store::LocalObjectStore;
pub use redis_repo::RedisClient;
