//! HTTP handlers for the broker and trigger.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use serde_json::Value;

use crate::error::Result;
use crate::notification::{EventData, Notification};
use crate::server::AppState;
use crate::store::HashFields;

#[derive(Debug, Serialize)]
pub struct SubscriptionStatus {
    pub notification_type: String,
    pub user_id: String,
    pub subscribed: bool,
}

/// Persist and broadcast a domain event
#[tracing::instrument(name = "http.trigger_notification", skip(state, event))]
pub async fn trigger_notification(
    State(state): State<AppState>,
    Json(event): Json<EventData>,
) -> Result<(StatusCode, Json<Notification>)> {
    let notification = state.orchestrator.trigger_notification(event).await?;
    Ok((StatusCode::CREATED, Json(notification)))
}

/// Stored detail fields; an empty object when the id is unknown
pub async fn get_notification_details(
    State(state): State<AppState>,
    Path(notification_id): Path<String>,
) -> Result<Json<HashFields>> {
    let fields = state.broker.get_details(&notification_id).await?;
    Ok(Json(fields))
}

pub async fn push_to_queue(
    State(state): State<AppState>,
    Json(entry): Json<Value>,
) -> Result<StatusCode> {
    state.broker.push(&entry).await?;
    Ok(StatusCode::ACCEPTED)
}

/// Next queue entry, or `null` when the queue is empty
pub async fn pop_from_queue(State(state): State<AppState>) -> Result<Json<Option<Value>>> {
    let entry = state.broker.pop::<Value>().await?;
    Ok(Json(entry))
}

pub async fn subscribe_user(
    State(state): State<AppState>,
    Path((notification_type, user_id)): Path<(String, String)>,
) -> Result<StatusCode> {
    state.broker.subscribe(&notification_type, &user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn unsubscribe_user(
    State(state): State<AppState>,
    Path((notification_type, user_id)): Path<(String, String)>,
) -> Result<StatusCode> {
    state.broker.unsubscribe(&notification_type, &user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn subscription_status(
    State(state): State<AppState>,
    Path((notification_type, user_id)): Path<(String, String)>,
) -> Result<Json<SubscriptionStatus>> {
    let subscribed = state.broker.is_subscribed(&notification_type, &user_id).await?;
    Ok(Json(SubscriptionStatus {
        notification_type,
        user_id,
        subscribed,
    }))
}
