use axum::{Json, extract::State};
use tracing::{info, warn};

use messagely_types::api::{LoginRequest, LoginResponse, RegisterRequest, RegisterResponse};

use crate::error::ApiError;
use crate::extract::ApiJson;
use crate::{AppState, blocking};

/// POST /auth/register — create the account and log it in.
///
/// The stored password hash is never part of the response.
pub async fn register(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> Result<Json<RegisterResponse>, ApiError> {
    let (user, token) = blocking(&state, move |s| {
        let user = s.accounts.register(&req)?;
        let token = s.sessions.issue(&user.username)?;
        Ok((user, token))
    })
    .await?;

    Ok(Json(RegisterResponse {
        user: user.profile(),
        token,
    }))
}

/// POST /auth/login — check credentials, bump last_login_at, issue a token.
/// An unreadable body is reported the same way as wrong credentials.
pub async fn login(
    State(state): State<AppState>,
    payload: Result<ApiJson<LoginRequest>, ApiError>,
) -> Result<Json<LoginResponse>, ApiError> {
    let ApiJson(req) = payload.map_err(|_| ApiError::BadLogin)?;
    let token = blocking(&state, move |s| {
        if !s.accounts.authenticate(&req.username, &req.password)? {
            warn!("Failed login for {}", req.username);
            return Err(ApiError::BadLogin);
        }
        s.accounts.update_login_timestamp(&req.username)?;
        info!("{} logged in", req.username);
        s.sessions.issue(&req.username)
    })
    .await?;

    Ok(Json(LoginResponse { token }))
}
