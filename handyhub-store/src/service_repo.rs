use async_trait::async_trait;
use handyhub_core::models::ProviderService;
use handyhub_core::repository::ServiceRepository;
use handyhub_core::{StoreError, StoreResult};
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::store_error;

pub struct PgServiceRepository {
    pool: PgPool,
}

impl PgServiceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ServiceRow {
    id: Uuid,
    provider_id: Uuid,
    name: String,
    description: Option<String>,
    duration_minutes: i32,
    price_cents: i32,
    is_available: bool,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl From<ServiceRow> for ProviderService {
    fn from(row: ServiceRow) -> Self {
        ProviderService {
            id: row.id,
            provider_id: row.provider_id,
            name: row.name,
            description: row.description,
            duration_minutes: row.duration_minutes,
            price_cents: row.price_cents,
            is_available: row.is_available,
            created_at: row.created_at,
        }
    }
}

const SERVICE_COLUMNS: &str = "id, provider_id, name, description, duration_minutes, price_cents, is_available, created_at";

#[async_trait]
impl ServiceRepository for PgServiceRepository {
    async fn create_service(&self, service: &ProviderService) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO provider_services (id, provider_id, name, description, duration_minutes, price_cents, is_available, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(service.id)
        .bind(service.provider_id)
        .bind(&service.name)
        .bind(&service.description)
        .bind(service.duration_minutes)
        .bind(service.price_cents)
        .bind(service.is_available)
        .bind(service.created_at)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(())
    }

    async fn get_service(&self, id: Uuid) -> StoreResult<Option<ProviderService>> {
        let row = sqlx::query_as::<_, ServiceRow>(&format!(
            "SELECT {} FROM provider_services WHERE id = $1",
            SERVICE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(row.map(ProviderService::from))
    }

    async fn list_services(&self, provider_id: Uuid, only_available: bool) -> StoreResult<Vec<ProviderService>> {
        let rows = sqlx::query_as::<_, ServiceRow>(&format!(
            "SELECT {} FROM provider_services WHERE provider_id = $1 AND (NOT $2 OR is_available) ORDER BY created_at",
            SERVICE_COLUMNS
        ))
        .bind(provider_id)
        .bind(only_available)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(rows.into_iter().map(ProviderService::from).collect())
    }

    async fn update_service(&self, service: &ProviderService) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE provider_services
            SET name = $2, description = $3, duration_minutes = $4, price_cents = $5, is_available = $6
            WHERE id = $1
            "#,
        )
        .bind(service.id)
        .bind(&service.name)
        .bind(&service.description)
        .bind(service.duration_minutes)
        .bind(service.price_cents)
        .bind(service.is_available)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("service {}", service.id)));
        }
        Ok(())
    }

    async fn delete_service(&self, id: Uuid) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM provider_services WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(store_error)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("service {}", id)));
        }
        Ok(())
    }
}
