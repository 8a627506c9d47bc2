use axum::{Extension, Json, extract::State};
use tracing::info;

use messagely_types::api::{Claims, SendMessageRequest};
use messagely_types::models::{CreatedMessage, MessageDetail, ReadReceipt};

use crate::error::ApiError;
use crate::extract::{ApiJson, ApiPath};
use crate::{AppState, blocking};

/// GET /messages/{id} — sender or recipient only; anyone else gets a 404.
pub async fn get_message(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<MessageDetail>, ApiError> {
    let message = blocking(&state, move |s| s.messages.view(id, &claims.username)).await?;
    Ok(Json(message))
}

/// POST /messages — the sender is whoever holds the session token.
pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<SendMessageRequest>,
) -> Result<Json<CreatedMessage>, ApiError> {
    let message = blocking(&state, move |s| s.messages.send(&claims.username, &req)).await?;
    info!("Message {} sent from {} to {}", message.id, message.from_username, message.to_username);
    Ok(Json(message))
}

/// POST /messages/{id}/read — recipient only.
pub async fn mark_read(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ReadReceipt>, ApiError> {
    let receipt = blocking(&state, move |s| s.messages.mark_read_as(id, &claims.username)).await?;
    Ok(Json(receipt))
}
