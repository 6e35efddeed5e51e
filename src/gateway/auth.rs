use crate::gateway::protocol::ErrorBody;
use crate::gateway::server::ExternalAccessState;

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use tracing::{debug, warn};

pub const MISSING_TOKEN_MESSAGE: &str = "Missing or invalid authorization token";
pub const INVALID_TOKEN_MESSAGE: &str = "Invalid or expired token";
pub const METHOD_NOT_ALLOWED_MESSAGE: &str = "Method not allowed";

/// Build a JSON error response.
pub fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

/// Extract bearer token from an Authorization header value.
pub fn extract_bearer_token(header: &str) -> Option<&str> {
    let header = header.trim();
    let scheme = header.get(..7)?;
    if !scheme.eq_ignore_ascii_case("bearer ") {
        return None;
    }
    let token = header.get(7..)?.trim();
    (!token.is_empty()).then_some(token)
}

/// Gate every request before routing.
///
/// Every request needs a valid bearer token, and only `POST` reaches the
/// routes. `OPTIONS` never gets here; the CORS layer answers it.
pub async fn require_bearer_token(
    State(state): State<ExternalAccessState>,
    request: Request,
    next: Next,
) -> Response {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(extract_bearer_token);

    let Some(token) = token else {
        debug!("Rejecting {} {}: no bearer token", request.method(), request.uri().path());
        return error_response(StatusCode::UNAUTHORIZED, MISSING_TOKEN_MESSAGE);
    };

    if let Err(e) = state.tokens.authorize(token).await {
        warn!("Rejecting {} {}: {}", request.method(), request.uri().path(), e);
        return error_response(StatusCode::UNAUTHORIZED, INVALID_TOKEN_MESSAGE);
    }

    if request.method() != Method::POST {
        return error_response(StatusCode::METHOD_NOT_ALLOWED, METHOD_NOT_ALLOWED_MESSAGE);
    }

    next.run(request).await
}
