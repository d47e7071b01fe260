use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use handyhub_core::{capabilities, toggle_view, Capabilities, Identity, Provider, ViewToggle};
use serde::Deserialize;

use crate::auth::MaybeUser;
use crate::{error::AppError, state::AppState};

#[derive(Debug, Deserialize)]
struct RouteQuery {
    #[serde(default = "default_route")]
    route: String,
}

fn default_route() -> String {
    "/".to_string()
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/me/capabilities", get(get_capabilities))
        .route("/me/toggle-view", post(toggle))
}

async fn provider_of(state: &AppState, me: Option<&Identity>) -> Result<Option<Provider>, AppError> {
    match me {
        Some(identity) => Ok(state.providers.my_provider(identity).await?),
        None => Ok(None),
    }
}

async fn get_capabilities(
    State(state): State<AppState>,
    MaybeUser(me): MaybeUser,
    Query(q): Query<RouteQuery>,
) -> Result<Json<Capabilities>, AppError> {
    let provider = provider_of(&state, me.as_ref()).await?;
    Ok(Json(capabilities(me.as_ref(), provider.as_ref(), &q.route)))
}

/// Anonymous callers get a sign-in redirect rather than a 401
async fn toggle(
    State(state): State<AppState>,
    MaybeUser(me): MaybeUser,
    Query(q): Query<RouteQuery>,
) -> Result<Json<ViewToggle>, AppError> {
    let provider = provider_of(&state, me.as_ref()).await?;
    let caps = capabilities(me.as_ref(), provider.as_ref(), &q.route);
    Ok(Json(toggle_view(&caps)))
}
