use axum::{
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures_util::stream::{self, Stream};
use handyhub_core::{ChangeFilter, ChangeSubscription, FeedPage, Identity, Notification};
use handyhub_shared::Table;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::{error::AppError, state::AppState};

#[derive(Debug, Serialize)]
struct MarkedResponse {
    updated: u64,
}

#[derive(Debug, Deserialize)]
struct RealtimeQuery {
    table: String,
    column: Option<String>,
    value: Option<String>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/notifications", get(recent))
        .route("/notifications/read-all", post(mark_all_read))
        .route("/notifications/stream", get(stream_notifications))
        .route("/notifications/{notification_id}/read", post(mark_read))
        .route("/realtime", get(realtime))
}

async fn recent(State(state): State<AppState>, CurrentUser(me): CurrentUser) -> Result<Json<FeedPage>, AppError> {
    Ok(Json(state.notifications.recent(&me).await?))
}

async fn mark_read(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Path(notification_id): Path<Uuid>,
) -> Result<Json<Notification>, AppError> {
    Ok(Json(state.notifications.mark_read(&me, notification_id).await?))
}

async fn mark_all_read(State(state): State<AppState>, CurrentUser(me): CurrentUser) -> Result<Json<MarkedResponse>, AppError> {
    let updated = state.notifications.mark_all_read(&me).await?;
    Ok(Json(MarkedResponse { updated }))
}

fn event_stream(subscription: ChangeSubscription) -> impl Stream<Item = Result<Event, axum::Error>> {
    stream::unfold(subscription, |mut subscription| async move {
        let change = subscription.next().await?;
        let event = Event::default().event(change.table.as_str()).json_data(&change);
        Some((event, subscription))
    })
}

async fn stream_notifications(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    tracing::debug!("Notification stream opened for {}", me.user_id);
    Sse::new(event_stream(state.notifications.subscribe(&me))).keep_alive(KeepAlive::default())
}

/// Which row changes a caller may watch. Bookings are visible to the customer and
/// to the provider they were made with; notifications only to their recipient.
/// Provider and service rows follow the REST visibility: approved providers and
/// listed services for everyone, the rest only for their owner.
async fn realtime_filter(state: &AppState, me: &Identity, query: &RealtimeQuery) -> Result<ChangeFilter, AppError> {
    let table = Table::parse(&query.table)
        .ok_or_else(|| AppError::ValidationError(format!("unknown table '{}'", query.table)))?;
    let own_provider = match table {
        Table::Providers | Table::ProviderServices | Table::Bookings if !me.is_admin() => {
            state.providers.my_provider(me).await?
        }
        _ => None,
    };

    let filter = match (query.column.as_deref(), query.value.as_deref()) {
        (Some(column), Some(value)) => {
            let allowed = match (table, column) {
                (Table::Providers | Table::ProviderServices, _) => true,
                (Table::Notifications, "user_id") | (Table::Bookings, "user_id") => {
                    me.is_admin() || value == me.user_id.to_string()
                }
                (Table::Bookings, "provider_id") => {
                    me.is_admin() || own_provider.as_ref().is_some_and(|p| p.id.to_string() == value)
                }
                _ => me.is_admin(),
            };
            if !allowed {
                return Err(AppError::AuthorizationError(format!(
                    "not allowed to watch {} where {} = {}",
                    table.as_str(),
                    column,
                    value
                )));
            }
            ChangeFilter::table(table).eq(column, value)
        }
        (None, None) => match table {
            Table::Providers | Table::ProviderServices => ChangeFilter::table(table),
            Table::Notifications => ChangeFilter::table(table).eq("user_id", me.user_id),
            Table::Bookings => {
                return Err(AppError::ValidationError(
                    "bookings subscriptions need a user_id or provider_id filter".to_string(),
                ))
            }
        },
        _ => {
            return Err(AppError::ValidationError(
                "column and value must be given together".to_string(),
            ))
        }
    };

    if me.is_admin() {
        return Ok(filter);
    }
    Ok(match table {
        Table::Providers => filter.visible_if([("status", "approved".to_string()), ("user_id", me.user_id.to_string())]),
        Table::ProviderServices => {
            let mut visible = vec![("is_available", "true".to_string())];
            if let Some(provider) = &own_provider {
                visible.push(("provider_id", provider.id.to_string()));
            }
            filter.visible_if(visible)
        }
        _ => filter,
    })
}

async fn realtime(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Query(query): Query<RealtimeQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, AppError> {
    let filter = realtime_filter(&state, &me, &query).await?;
    Ok(Sse::new(event_stream(state.feed.subscribe(filter))).keep_alive(KeepAlive::default()))
}
