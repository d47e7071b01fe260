use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use handyhub_shared::Masked;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{Identity, Role, User};
use crate::repository::{AuthToken, TokenPurpose, UserRepository};
use crate::{CoreError, CoreResult};

pub const MIN_PASSWORD_LEN: usize = 6;

/// Delivers password-reset links
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_password_reset(&self, email: &str, token: &str) -> CoreResult<()>;
}

/// Writes reset mail to the log instead of sending it. The address is masked.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_password_reset(&self, email: &str, token: &str) -> CoreResult<()> {
        tracing::info!(
            "Password reset requested for {} (token {}...)",
            Masked(email),
            &token[..token.len().min(6)]
        );
        Ok(())
    }
}

/// A signed-in user plus the opaque refresh token for the session
#[derive(Debug, Clone)]
pub struct AuthOutcome {
    pub user: User,
    pub refresh_token: String,
}

pub struct AuthService {
    users: Arc<dyn UserRepository>,
    mailer: Arc<dyn Mailer>,
    refresh_ttl: Duration,
    reset_ttl: Duration,
}

impl AuthService {
    pub fn new(users: Arc<dyn UserRepository>, mailer: Arc<dyn Mailer>) -> Self {
        Self {
            users,
            mailer,
            refresh_ttl: Duration::days(30),
            reset_ttl: Duration::hours(1),
        }
    }

    pub fn with_ttls(mut self, refresh_ttl: Duration, reset_ttl: Duration) -> Self {
        self.refresh_ttl = refresh_ttl;
        self.reset_ttl = reset_ttl;
        self
    }

    pub async fn sign_up(&self, email: &str, password: &str, metadata: Option<serde_json::Value>) -> CoreResult<AuthOutcome> {
        let email = normalize_email(email)?;
        check_password(password)?;
        let metadata = match metadata {
            None => serde_json::json!({}),
            Some(value) if value.is_object() => value,
            Some(_) => return Err(CoreError::ValidationError("metadata must be a JSON object".to_string())),
        };

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email,
            password_hash: hash_password(password)?,
            role: Role::Customer,
            metadata,
            created_at: now,
            updated_at: now,
        };
        self.users.create_user(&user).await?;
        tracing::info!("User {} signed up as {}", user.id, Masked(user.email.as_str()));

        self.start_session(user).await
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> CoreResult<AuthOutcome> {
        let invalid = || CoreError::AuthenticationError("invalid email or password".to_string());
        let email = normalize_email(email).map_err(|_| invalid())?;

        let user = self.users.find_user_by_email(&email).await?.ok_or_else(invalid)?;
        if !verify_password(password, &user.password_hash) {
            tracing::debug!("Failed sign-in for {}", Masked(email.as_str()));
            return Err(invalid());
        }
        self.start_session(user).await
    }

    /// Exchange a refresh token for a new session. The old token stops working.
    pub async fn refresh(&self, refresh_token: &str) -> CoreResult<AuthOutcome> {
        let token = self
            .users
            .take_token(&digest(refresh_token), TokenPurpose::Refresh)
            .await?
            .filter(|t| t.expires_at > Utc::now())
            .ok_or_else(|| CoreError::AuthenticationError("refresh token is invalid or expired".to_string()))?;

        let user = self
            .users
            .get_user(token.user_id)
            .await?
            .ok_or_else(|| CoreError::AuthenticationError("account no longer exists".to_string()))?;
        self.start_session(user).await
    }

    pub async fn sign_out(&self, identity: &Identity) -> CoreResult<()> {
        self.users.revoke_tokens(identity.user_id, TokenPurpose::Refresh).await?;
        Ok(())
    }

    /// Always succeeds so callers cannot probe which emails are registered
    pub async fn request_password_reset(&self, email: &str) -> CoreResult<()> {
        let Ok(email) = normalize_email(email) else {
            return Ok(());
        };
        let Some(user) = self.users.find_user_by_email(&email).await? else {
            tracing::debug!("Password reset for unknown address {}", Masked(email.as_str()));
            return Ok(());
        };

        let token = self.issue_token(user.id, TokenPurpose::PasswordReset, self.reset_ttl).await?;
        if let Err(e) = self.mailer.send_password_reset(&user.email, &token).await {
            tracing::error!("Failed to send password reset to user {}: {}", user.id, e);
        }
        Ok(())
    }

    pub async fn reset_password(&self, reset_token: &str, new_password: &str) -> CoreResult<()> {
        check_password(new_password)?;
        let token = self
            .users
            .take_token(&digest(reset_token), TokenPurpose::PasswordReset)
            .await?
            .filter(|t| t.expires_at > Utc::now())
            .ok_or_else(|| CoreError::AuthenticationError("reset link is invalid or expired".to_string()))?;

        self.users
            .update_password(token.user_id, &hash_password(new_password)?)
            .await?;
        self.users.revoke_tokens(token.user_id, TokenPurpose::Refresh).await?;
        tracing::info!("Password reset for user {}", token.user_id);
        Ok(())
    }

    /// Shallow merge of `patch` into the stored profile metadata
    pub async fn update_metadata(&self, identity: &Identity, patch: serde_json::Value) -> CoreResult<User> {
        let serde_json::Value::Object(patch) = patch else {
            return Err(CoreError::ValidationError("metadata must be a JSON object".to_string()));
        };
        let user = self.get_user(identity).await?;

        let mut metadata = match user.metadata {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        for (key, value) in patch {
            if value.is_null() {
                metadata.remove(&key);
            } else {
                metadata.insert(key, value);
            }
        }
        Ok(self
            .users
            .update_metadata(identity.user_id, &serde_json::Value::Object(metadata))
            .await?)
    }

    pub async fn get_user(&self, identity: &Identity) -> CoreResult<User> {
        self.users
            .get_user(identity.user_id)
            .await?
            .ok_or_else(|| CoreError::AuthenticationError("account no longer exists".to_string()))
    }

    async fn start_session(&self, user: User) -> CoreResult<AuthOutcome> {
        let refresh_token = self.issue_token(user.id, TokenPurpose::Refresh, self.refresh_ttl).await?;
        Ok(AuthOutcome { user, refresh_token })
    }

    async fn issue_token(&self, user_id: Uuid, purpose: TokenPurpose, ttl: Duration) -> CoreResult<String> {
        let secret = random_token();
        self.users
            .save_token(&AuthToken {
                digest: digest(&secret),
                user_id,
                purpose,
                expires_at: Utc::now() + ttl,
            })
            .await?;
        Ok(secret)
    }
}

fn normalize_email(raw: &str) -> CoreResult<String> {
    let email = raw.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') && !domain.starts_with('.') => Ok(email),
        _ => Err(CoreError::ValidationError("a valid email address is required".to_string())),
    }
}

fn check_password(password: &str) -> CoreResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(CoreError::ValidationError(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

pub fn hash_password(password: &str) -> CoreResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| CoreError::InternalError(format!("hash password: {}", e)))
}

pub fn verify_password(password: &str, stored: &str) -> bool {
    match PasswordHash::new(stored) {
        Ok(parsed) => Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok(),
        Err(_) => false,
    }
}

fn random_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::Repositories;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CapturingMailer {
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl Mailer for CapturingMailer {
        async fn send_password_reset(&self, email: &str, token: &str) -> CoreResult<()> {
            self.sent.lock().unwrap().push((email.to_string(), token.to_string()));
            Ok(())
        }
    }

    fn service() -> (AuthService, Arc<CapturingMailer>) {
        let mailer = Arc::new(CapturingMailer::default());
        let repos = Repositories::in_memory();
        (AuthService::new(repos.users, mailer.clone()), mailer)
    }

    #[tokio::test]
    async fn test_sign_up_and_sign_in() {
        let (auth, _) = service();
        let created = auth
            .sign_up(" Ana@Example.com ", "hunter22", Some(serde_json::json!({ "full_name": "Ana" })))
            .await
            .unwrap();
        assert_eq!(created.user.email, "ana@example.com");
        assert_ne!(created.user.password_hash, "hunter22");

        let session = auth.sign_in("ana@example.com", "hunter22").await.unwrap();
        assert_eq!(session.user.id, created.user.id);

        assert!(matches!(
            auth.sign_in("ana@example.com", "wrong-pass").await,
            Err(CoreError::AuthenticationError(_))
        ));
        assert!(matches!(
            auth.sign_in("nobody@example.com", "hunter22").await,
            Err(CoreError::AuthenticationError(_))
        ));
        assert!(matches!(
            auth.sign_up("ana@example.com", "another1", None).await,
            Err(CoreError::ConflictError(_))
        ));
    }

    #[tokio::test]
    async fn test_sign_up_validation() {
        let (auth, _) = service();
        assert!(auth.sign_up("not-an-email", "hunter22", None).await.is_err());
        assert!(auth.sign_up("a@example.com", "short", None).await.is_err());
        assert!(auth.sign_up("a@example.com", "hunter22", Some(serde_json::json!([1]))).await.is_err());
    }

    #[tokio::test]
    async fn test_refresh_rotates() {
        let (auth, _) = service();
        let first = auth.sign_up("bo@example.com", "hunter22", None).await.unwrap();

        let second = auth.refresh(&first.refresh_token).await.unwrap();
        assert_ne!(second.refresh_token, first.refresh_token);
        assert!(auth.refresh(&first.refresh_token).await.is_err());

        auth.sign_out(&second.user.identity()).await.unwrap();
        assert!(auth.refresh(&second.refresh_token).await.is_err());
    }

    #[tokio::test]
    async fn test_password_reset_flow() {
        let (auth, mailer) = service();
        let account = auth.sign_up("cy@example.com", "hunter22", None).await.unwrap();

        auth.request_password_reset("ghost@example.com").await.unwrap();
        assert!(mailer.sent.lock().unwrap().is_empty());

        auth.request_password_reset("CY@example.com").await.unwrap();
        let (to, token) = mailer.sent.lock().unwrap()[0].clone();
        assert_eq!(to, "cy@example.com");

        auth.reset_password(&token, "n3w-password").await.unwrap();
        assert!(auth.reset_password(&token, "again-123").await.is_err());

        assert!(auth.sign_in("cy@example.com", "hunter22").await.is_err());
        assert!(auth.sign_in("cy@example.com", "n3w-password").await.is_ok());
        // Existing sessions are revoked by a reset
        assert!(auth.refresh(&account.refresh_token).await.is_err());
    }

    #[tokio::test]
    async fn test_update_metadata_merges() {
        let (auth, _) = service();
        let account = auth
            .sign_up("di@example.com", "hunter22", Some(serde_json::json!({ "full_name": "Di", "city": "Reno" })))
            .await
            .unwrap();
        let me = account.user.identity();

        let user = auth
            .update_metadata(&me, serde_json::json!({ "city": "Boise", "phone": "555", "full_name": null }))
            .await
            .unwrap();
        assert_eq!(user.metadata, serde_json::json!({ "city": "Boise", "phone": "555" }));

        assert!(matches!(
            auth.update_metadata(&me, serde_json::json!("x")).await,
            Err(CoreError::ValidationError(_))
        ));
    }

    #[test]
    fn test_password_hash_round_trip() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("battery staple", &hash));
        assert!(!verify_password("correct horse", "not-a-hash"));
    }
}
