use async_trait::async_trait;
use chrono::{DateTime, Utc};
use handyhub_core::models::{Role, User};
use handyhub_core::repository::{AuthToken, TokenPurpose, UserRepository};
use handyhub_core::{StoreError, StoreResult};
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::{corrupt, store_error};

pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    password_hash: String,
    role: String,
    metadata: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            role: Role::parse(&row.role).ok_or_else(|| corrupt("role", &row.role))?,
            id: row.id,
            email: row.email,
            password_hash: row.password_hash,
            metadata: row.metadata,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TokenRow {
    digest: String,
    user_id: Uuid,
    expires_at: DateTime<Utc>,
}

const USER_COLUMNS: &str = "id, email, password_hash, role, metadata, created_at, updated_at";

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn create_user(&self, user: &User) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, email, password_hash, role, metadata, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(&user.metadata)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!("SELECT {} FROM users WHERE email = $1", USER_COLUMNS))
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;
        row.map(User::try_from).transpose()
    }

    async fn get_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;
        row.map(User::try_from).transpose()
    }

    async fn update_metadata(&self, id: Uuid, metadata: &serde_json::Value) -> StoreResult<User> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "UPDATE users SET metadata = $2, updated_at = NOW() WHERE id = $1 RETURNING {}",
            USER_COLUMNS
        ))
        .bind(id)
        .bind(metadata)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?
        .ok_or_else(|| StoreError::NotFound(format!("user {}", id)))?;
        User::try_from(row)
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> StoreResult<()> {
        let result = sqlx::query("UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(&self.pool)
            .await
            .map_err(store_error)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("user {}", id)));
        }
        Ok(())
    }

    async fn save_token(&self, token: &AuthToken) -> StoreResult<()> {
        sqlx::query("INSERT INTO auth_tokens (digest, user_id, purpose, expires_at) VALUES ($1, $2, $3, $4)")
            .bind(&token.digest)
            .bind(token.user_id)
            .bind(token.purpose.as_str())
            .bind(token.expires_at)
            .execute(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(())
    }

    async fn take_token(&self, digest: &str, purpose: TokenPurpose) -> StoreResult<Option<AuthToken>> {
        let row = sqlx::query_as::<_, TokenRow>(
            "DELETE FROM auth_tokens WHERE digest = $1 AND purpose = $2 RETURNING digest, user_id, expires_at",
        )
        .bind(digest)
        .bind(purpose.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(row.map(|r| AuthToken {
            digest: r.digest,
            user_id: r.user_id,
            purpose,
            expires_at: r.expires_at,
        }))
    }

    async fn revoke_tokens(&self, user_id: Uuid, purpose: TokenPurpose) -> StoreResult<()> {
        sqlx::query("DELETE FROM auth_tokens WHERE user_id = $1 AND purpose = $2")
            .bind(user_id)
            .bind(purpose.as_str())
            .execute(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(())
    }
}
