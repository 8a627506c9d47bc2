use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};
use http_body_util::LengthLimitError;
use tracing::debug;

use messagely_types::api::TokenEnvelope;

use crate::AppState;
use crate::error::ApiError;

/// Request bodies are small JSON objects. Applies to every route; the router
/// sets the same cap for its extractors.
pub const MAX_BODY_BYTES: usize = 64 * 1024;

/// Verify the session token and attach its `Claims` to the request.
///
/// The token is taken from the `_token` field of the JSON body (GET requests
/// included), falling back to an `Authorization: Bearer` header. The body is
/// buffered and handed on unchanged so handlers can still extract it.
pub async fn require_auth(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let (parts, body) = req.into_parts();
    let bytes = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(body_error)?;

    let token = body_token(&bytes).or_else(|| bearer_token(&parts.headers));
    let claims = state.sessions.verify(token.as_deref()).inspect_err(|_| {
        debug!("Rejected {} {}: no valid session token", parts.method, parts.uri.path());
    })?;

    let mut req = Request::from_parts(parts, Body::from(bytes));
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

fn body_error(err: axum::Error) -> ApiError {
    let inner = err.into_inner();
    let first: &(dyn std::error::Error + 'static) = &*inner;
    let mut source = Some(first);
    while let Some(e) = source {
        if e.is::<LengthLimitError>() {
            return ApiError::BadRequest("Request body too large".into());
        }
        source = e.source();
    }
    debug!("Unreadable request body: {}", inner);
    ApiError::BadRequest("Unreadable request body".into())
}

fn body_token(bytes: &Bytes) -> Option<String> {
    if bytes.is_empty() {
        return None;
    }
    serde_json::from_slice::<TokenEnvelope>(bytes).ok()?.token
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}
