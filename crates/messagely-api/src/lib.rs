pub mod auth;
pub mod config;
pub mod error;
pub mod extract;
pub mod messages;
pub mod middleware;
pub mod service;
pub mod session;
pub mod users;

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use serde_json::{Value, json};
use tracing::error;

use messagely_db::Database;

use crate::config::AuthConfig;
use crate::error::ApiError;
use crate::service::accounts::AccountManager;
use crate::service::messages::MessageService;
use crate::session::SessionAuthenticator;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub accounts: AccountManager,
    pub messages: MessageService,
    pub sessions: SessionAuthenticator,
}

impl AppStateInner {
    pub fn new(db: Database, auth: &AuthConfig) -> anyhow::Result<Self> {
        let db = Arc::new(db);
        Ok(Self {
            accounts: AccountManager::new(db.clone(), &auth.hash)?,
            messages: MessageService::new(db),
            sessions: SessionAuthenticator::new(auth),
        })
    }
}

/// All routes. Everything except `/auth/*` and `/health` requires a session
/// token, either as the `_token` field of the JSON body or as a bearer header.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/health", get(health));

    let protected_routes = Router::new()
        .route("/users", get(users::list_users))
        .route("/users/{username}", get(users::get_user))
        .route("/users/{username}/to", get(users::messages_to))
        .route("/users/{username}/from", get(users::messages_from))
        .route("/messages", post(messages::send_message))
        .route("/messages/{id}", get(messages::get_message))
        .route("/messages/{id}/read", post(messages::mark_read))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(middleware::MAX_BODY_BYTES))
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Run store and hashing work off the async runtime.
pub(crate) async fn blocking<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&AppStateInner) -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(anyhow::anyhow!("background task failed"))
        })?
}
