use axum::{Extension, Json, extract::State};
use tracing::warn;

use messagely_types::api::Claims;
use messagely_types::models::{ReceivedMessage, SentMessage, UserDetail, UserSummary};

use crate::error::ApiError;
use crate::extract::ApiPath;
use crate::{AppState, blocking};

/// GET /users
pub async fn list_users(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
) -> Result<Json<Vec<UserSummary>>, ApiError> {
    let users = blocking(&state, |s| s.accounts.all()).await?;
    Ok(Json(users))
}

/// GET /users/{username}
pub async fn get_user(
    State(state): State<AppState>,
    ApiPath(username): ApiPath<String>,
    Extension(_claims): Extension<Claims>,
) -> Result<Json<UserDetail>, ApiError> {
    let user = blocking(&state, move |s| s.accounts.get(&username)).await?;
    Ok(Json(user))
}

/// GET /users/{username}/to — inbox, visible only to its owner.
pub async fn messages_to(
    State(state): State<AppState>,
    ApiPath(username): ApiPath<String>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<ReceivedMessage>>, ApiError> {
    ensure_owner(&claims, &username)?;
    let messages = blocking(&state, move |s| s.accounts.messages_to(&username)).await?;
    Ok(Json(messages))
}

/// GET /users/{username}/from — outbox, visible only to its owner.
pub async fn messages_from(
    State(state): State<AppState>,
    ApiPath(username): ApiPath<String>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<SentMessage>>, ApiError> {
    ensure_owner(&claims, &username)?;
    let messages = blocking(&state, move |s| s.accounts.messages_from(&username)).await?;
    Ok(Json(messages))
}

fn ensure_owner(claims: &Claims, username: &str) -> Result<(), ApiError> {
    if claims.username != username {
        warn!("{} tried to read the mailbox of {}", claims.username, username);
        return Err(ApiError::Unauthorized);
    }
    Ok(())
}
