use async_trait::async_trait;
use chrono::{DateTime, Utc};
use handyhub_core::models::{Provider, ProviderStatus};
use handyhub_core::repository::{ProviderFilter, ProviderRepository};
use handyhub_core::{StoreError, StoreResult};
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::{corrupt, store_error};

pub struct PgProviderRepository {
    pool: PgPool,
}

impl PgProviderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_one(&self, sql: &str, id: Uuid) -> StoreResult<Option<Provider>> {
        let row = sqlx::query_as::<_, ProviderRow>(sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;
        row.map(Provider::try_from).transpose()
    }
}

#[derive(sqlx::FromRow)]
struct ProviderRow {
    id: Uuid,
    user_id: Uuid,
    business_name: String,
    category: String,
    description: Option<String>,
    city: Option<String>,
    phone: Option<String>,
    image_url: Option<String>,
    status: String,
    rating: f64,
    rating_count: i32,
    total_bookings: i32,
    total_earnings_cents: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProviderRow> for Provider {
    type Error = StoreError;

    fn try_from(row: ProviderRow) -> Result<Self, Self::Error> {
        Ok(Provider {
            status: ProviderStatus::parse(&row.status).ok_or_else(|| corrupt("provider status", &row.status))?,
            id: row.id,
            user_id: row.user_id,
            business_name: row.business_name,
            category: row.category,
            description: row.description,
            city: row.city,
            phone: row.phone,
            image_url: row.image_url,
            rating: row.rating,
            rating_count: row.rating_count,
            total_bookings: row.total_bookings,
            total_earnings_cents: row.total_earnings_cents,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const PROVIDER_COLUMNS: &str = "id, user_id, business_name, category, description, city, phone, image_url, status, \
     rating, rating_count, total_bookings, total_earnings_cents, created_at, updated_at";

#[async_trait]
impl ProviderRepository for PgProviderRepository {
    async fn create_provider(&self, provider: &Provider) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO providers (id, user_id, business_name, category, description, city, phone, image_url, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(provider.id)
        .bind(provider.user_id)
        .bind(&provider.business_name)
        .bind(&provider.category)
        .bind(&provider.description)
        .bind(&provider.city)
        .bind(&provider.phone)
        .bind(&provider.image_url)
        .bind(provider.status.as_str())
        .bind(provider.created_at)
        .bind(provider.updated_at)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(())
    }

    async fn get_provider(&self, id: Uuid) -> StoreResult<Option<Provider>> {
        self.fetch_one(&format!("SELECT {} FROM providers WHERE id = $1", PROVIDER_COLUMNS), id)
            .await
    }

    async fn find_provider_by_user(&self, user_id: Uuid) -> StoreResult<Option<Provider>> {
        self.fetch_one(&format!("SELECT {} FROM providers WHERE user_id = $1", PROVIDER_COLUMNS), user_id)
            .await
    }

    async fn list_providers(&self, filter: &ProviderFilter) -> StoreResult<Vec<Provider>> {
        let rows = sqlx::query_as::<_, ProviderRow>(&format!(
            r#"
            SELECT {} FROM providers
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::text IS NULL OR lower(category) = lower($2))
              AND ($3::text IS NULL OR lower(city) = lower($3))
            ORDER BY rating DESC, business_name ASC
            "#,
            PROVIDER_COLUMNS
        ))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.category.as_deref())
        .bind(filter.city.as_deref())
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        rows.into_iter().map(Provider::try_from).collect()
    }

    async fn update_provider_status(&self, id: Uuid, status: ProviderStatus) -> StoreResult<Provider> {
        let row = sqlx::query_as::<_, ProviderRow>(&format!(
            "UPDATE providers SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING {}",
            PROVIDER_COLUMNS
        ))
        .bind(id)
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?
        .ok_or_else(|| StoreError::NotFound(format!("provider {}", id)))?;
        Provider::try_from(row)
    }

    async fn update_provider_image(&self, id: Uuid, image_url: &str) -> StoreResult<Provider> {
        let row = sqlx::query_as::<_, ProviderRow>(&format!(
            "UPDATE providers SET image_url = $2, updated_at = NOW() WHERE id = $1 RETURNING {}",
            PROVIDER_COLUMNS
        ))
        .bind(id)
        .bind(image_url)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?
        .ok_or_else(|| StoreError::NotFound(format!("provider {}", id)))?;
        Provider::try_from(row)
    }

    async fn record_completion(&self, id: Uuid, amount_cents: i32) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE providers
            SET total_bookings = total_bookings + 1,
                total_earnings_cents = total_earnings_cents + $2,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(amount_cents as i64)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("provider {}", id)));
        }
        Ok(())
    }

    async fn record_rating(&self, id: Uuid, rating: i16) -> StoreResult<()> {
        // Single statement so concurrent ratings cannot lose an update
        let result = sqlx::query(
            r#"
            UPDATE providers
            SET rating = (rating * rating_count + $2) / (rating_count + 1),
                rating_count = rating_count + 1,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(rating as f64)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("provider {}", id)));
        }
        Ok(())
    }
}
