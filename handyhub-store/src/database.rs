use handyhub_core::{Repositories, StoreError};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::booking_repo::PgBookingRepository;
use crate::notification_repo::PgNotificationRepository;
use crate::provider_repo::PgProviderRepository;
use crate::service_repo::PgServiceRepository;
use crate::user_repo::PgUserRepository;

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
}

impl DbClient {
    pub async fn new(connection_string: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(connection_string)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations").run(&self.pool).await?;
        info!("Migrations completed successfully.");
        Ok(())
    }

    /// Every table contract backed by this pool
    pub fn repositories(&self) -> Repositories {
        Repositories {
            users: Arc::new(PgUserRepository::new(self.pool.clone())),
            providers: Arc::new(PgProviderRepository::new(self.pool.clone())),
            services: Arc::new(PgServiceRepository::new(self.pool.clone())),
            bookings: Arc::new(PgBookingRepository::new(self.pool.clone())),
            notifications: Arc::new(PgNotificationRepository::new(self.pool.clone())),
        }
    }
}

/// Map sqlx failures onto the storage taxonomy. Unique violations become `Conflict`.
pub(crate) fn store_error(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::RowNotFound => StoreError::NotFound("row".to_string()),
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            let what = match db_err.constraint() {
                Some("uq_bookings_pending_slot") => "slot is no longer available".to_string(),
                Some("users_email_key") => "email is already registered".to_string(),
                Some("providers_user_id_key") => "a provider application already exists for this user".to_string(),
                Some(other) => format!("duplicate value violates {}", other),
                None => db_err.message().to_string(),
            };
            StoreError::Conflict(what)
        }
        _ => StoreError::backend(err),
    }
}

/// Stored value that no longer parses into the domain type
pub(crate) fn corrupt(column: &str, value: &str) -> StoreError {
    StoreError::Backend(format!("unexpected {} value '{}'", column, value).into())
}
