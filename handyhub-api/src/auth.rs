use axum::{
    extract::{FromRequestParts, State},
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    routing::{get, post},
    Json, Router,
};
use axum_extra::headers::{authorization::Bearer, Authorization, Header};
use chrono::{Duration, Utc};
use handyhub_core::{AuthOutcome, Identity, Role, User};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header as JwtHeader, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::AppError, state::AppState};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CustomerClaims {
    pub sub: String,
    pub email: String,
    pub role: String,
    pub exp: usize,
}

impl CustomerClaims {
    fn identity(&self) -> Result<Identity, AppError> {
        let user_id = Uuid::parse_str(&self.sub)
            .map_err(|_| AppError::AuthenticationError("malformed token subject".to_string()))?;
        let role = Role::parse(&self.role)
            .ok_or_else(|| AppError::AuthenticationError("unknown role in token".to_string()))?;
        Ok(Identity {
            user_id,
            email: self.email.clone(),
            role,
        })
    }
}

pub fn issue_token(state: &AppState, user: &User) -> Result<String, AppError> {
    let claims = CustomerClaims {
        sub: user.id.to_string(),
        email: user.email.clone(),
        role: user.role.as_str().to_owned(),
        exp: (Utc::now() + Duration::seconds(state.auth.expiration as i64)).timestamp() as usize,
    };

    encode(&JwtHeader::default(), &claims, &EncodingKey::from_secret(state.auth.secret.as_bytes()))
        .map_err(|e| AppError::InternalServerError(format!("Token encoding failed: {}", e)))
}

fn bearer_identity(parts: &Parts, state: &AppState) -> Result<Option<Identity>, AppError> {
    if !parts.headers.contains_key(AUTHORIZATION) {
        return Ok(None);
    }
    let bearer = Authorization::<Bearer>::decode(&mut parts.headers.get_all(AUTHORIZATION).iter())
        .map_err(|_| AppError::AuthenticationError("expected a Bearer token".to_string()))?;

    let token_data = decode::<CustomerClaims>(
        bearer.token(),
        &DecodingKey::from_secret(state.auth.secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| AppError::AuthenticationError(format!("invalid token: {}", e)))?;

    token_data.claims.identity().map(Some)
}

/// The signed-in caller; rejects anonymous requests with 401
pub struct CurrentUser(pub Identity);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        bearer_identity(parts, state)?
            .map(CurrentUser)
            .ok_or_else(|| AppError::AuthenticationError("sign in required".to_string()))
    }
}

/// The caller if a token was sent. A bad token is still an error.
pub struct MaybeUser(pub Option<Identity>);

impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(bearer_identity(parts, state)?))
    }
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: u64,
    pub refresh_token: String,
    pub user: User,
}

fn session(state: &AppState, outcome: AuthOutcome) -> Result<Json<SessionResponse>, AppError> {
    Ok(Json(SessionResponse {
        access_token: issue_token(state, &outcome.user)?,
        token_type: "bearer",
        expires_in: state.auth.expiration,
        refresh_token: outcome.refresh_token,
        user: outcome.user,
    }))
}

#[derive(Debug, Deserialize)]
struct SignUpRequest {
    email: String,
    password: String,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct SignInRequest {
    email: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct RefreshRequest {
    refresh_token: String,
}

#[derive(Debug, Deserialize)]
struct ResetRequest {
    email: String,
}

#[derive(Debug, Deserialize)]
struct NewPasswordRequest {
    token: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct UpdateUserRequest {
    data: serde_json::Value,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/auth/signup", post(sign_up))
        .route("/auth/signin", post(sign_in))
        .route("/auth/refresh", post(refresh))
        .route("/auth/signout", post(sign_out))
        .route("/auth/recover", post(request_reset))
        .route("/auth/reset", post(reset_password))
        .route("/auth/user", get(get_user).patch(update_user))
}

async fn sign_up(State(state): State<AppState>, Json(req): Json<SignUpRequest>) -> Result<(StatusCode, Json<SessionResponse>), AppError> {
    let outcome = state.identity.sign_up(&req.email, &req.password, req.data).await?;
    Ok((StatusCode::CREATED, session(&state, outcome)?))
}

async fn sign_in(State(state): State<AppState>, Json(req): Json<SignInRequest>) -> Result<Json<SessionResponse>, AppError> {
    let outcome = state.identity.sign_in(&req.email, &req.password).await?;
    session(&state, outcome)
}

async fn refresh(State(state): State<AppState>, Json(req): Json<RefreshRequest>) -> Result<Json<SessionResponse>, AppError> {
    let outcome = state.identity.refresh(&req.refresh_token).await?;
    session(&state, outcome)
}

async fn sign_out(State(state): State<AppState>, CurrentUser(me): CurrentUser) -> Result<StatusCode, AppError> {
    state.identity.sign_out(&me).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn request_reset(State(state): State<AppState>, Json(req): Json<ResetRequest>) -> Result<StatusCode, AppError> {
    state.identity.request_password_reset(&req.email).await?;
    Ok(StatusCode::ACCEPTED)
}

async fn reset_password(State(state): State<AppState>, Json(req): Json<NewPasswordRequest>) -> Result<StatusCode, AppError> {
    state.identity.reset_password(&req.token, &req.password).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_user(State(state): State<AppState>, CurrentUser(me): CurrentUser) -> Result<Json<User>, AppError> {
    Ok(Json(state.identity.get_user(&me).await?))
}

async fn update_user(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Json(req): Json<UpdateUserRequest>,
) -> Result<Json<User>, AppError> {
    Ok(Json(state.identity.update_metadata(&me, req.data).await?))
}
