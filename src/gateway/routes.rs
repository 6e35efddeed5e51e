use crate::error::VaultError;
use crate::gateway::auth::{error_response, require_bearer_token};
use crate::gateway::protocol::*;
use crate::gateway::server::ExternalAccessState;

use axum::{
    body::Bytes,
    extract::State,
    http::{
        header::{
            ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, AUTHORIZATION,
            CONTENT_TYPE,
        },
        HeaderValue, Method, StatusCode,
    },
    middleware,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::de::DeserializeOwned;
use std::any::Any;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any as AnyOrigin, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, warn};

pub const NOT_FOUND_MESSAGE: &str = "Endpoint not found";

const ALLOWED_METHODS: &str = "GET, POST, OPTIONS";
const ALLOWED_HEADERS: &str = "Content-Type, Authorization";

/// Build all routes for the external access service.
pub fn build_routes(state: ExternalAccessState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AnyOrigin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION]);

    Router::new()
        .route("/key", post(key_handler))
        .route("/list", post(list_handler))
        .fallback(not_found_handler)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_bearer_token,
        ))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                // CorsLayer only lists methods and headers on preflight.
                .layer(SetResponseHeaderLayer::if_not_present(
                    ACCESS_CONTROL_ALLOW_METHODS,
                    HeaderValue::from_static(ALLOWED_METHODS),
                ))
                .layer(SetResponseHeaderLayer::if_not_present(
                    ACCESS_CONTROL_ALLOW_HEADERS,
                    HeaderValue::from_static(ALLOWED_HEADERS),
                ))
                .layer(CatchPanicLayer::custom(handle_panic)),
        )
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

async fn key_handler(State(state): State<ExternalAccessState>, body: Bytes) -> Response {
    let request: KeyRequest = match parse_body(&body) {
        Ok(request) => request,
        Err(response) => return response,
    };
    debug!(request_id = ?request.request_id, "Key request for '{}'", request.key_name);

    let response = match state.store.require_value(&request.key_name).await {
        Ok(value) => KeyResponse::found(value),
        Err(VaultError::NotFound(message)) => KeyResponse::failure(message),
        Err(e) => {
            warn!("Failed to read key '{}': {}", request.key_name, e);
            KeyResponse::failure(format!("Error retrieving key: {e}"))
        }
    };
    Json(response).into_response()
}

async fn list_handler(State(state): State<ExternalAccessState>, body: Bytes) -> Response {
    let request: ListRequest = match parse_body(&body) {
        Ok(request) => request,
        Err(response) => return response,
    };
    debug!(request_id = ?request.request_id, "List request (category: {:?})", request.category);

    let response = match state
        .store
        .list_keys_in_category(request.category.as_deref())
        .await
    {
        Ok(keys) => ListResponse::keys(keys),
        Err(e) => {
            warn!("Failed to list keys: {}", e);
            ListResponse::failure(format!("Error listing keys: {e}"))
        }
    };
    Json(response).into_response()
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, NOT_FOUND_MESSAGE)
}

// ============================================================================
// Helpers
// ============================================================================

fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, Response> {
    serde_json::from_slice(body).map_err(|e| {
        warn!("Rejecting malformed request body: {}", e);
        internal_error(&e.to_string())
    })
}

fn internal_error(detail: &str) -> Response {
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("Internal server error: {detail}"),
    )
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unexpected panic".to_string()
    };
    error!("Request handler panicked: {}", detail);
    internal_error(&detail)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{TokenPolicy, TokenRegistry};
    use crate::storage::{MemorySecretStore, MemorySettingsStore, SecretValueStore, SettingsStore};
    use crate::vault::SecretStore;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    struct Fixture {
        app: Router,
        token: String,
        secrets: Arc<MemorySecretStore>,
    }

    async fn fixture() -> Fixture {
        let secrets = Arc::new(MemorySecretStore::new());
        let settings: Arc<dyn SettingsStore> = Arc::new(MemorySettingsStore::new());
        let store = Arc::new(SecretStore::new(secrets.clone(), settings.clone()));
        let tokens = Arc::new(
            TokenRegistry::load(settings, TokenPolicy::default())
                .await
                .unwrap(),
        );

        store.create_category("Cloud", None, None).await.unwrap();
        store
            .store_key("AWS_KEY", "aws-secret", Some("Cloud"))
            .await
            .unwrap();
        store.store_key("LOOSE", "loose-secret", None).await.unwrap();

        let token = tokens.generate_token().await.unwrap().token;
        let app = build_routes(ExternalAccessState { store, tokens });
        Fixture {
            app,
            token,
            secrets,
        }
    }

    fn post(path: &str, token: Option<&str>, body: &str) -> Request<Body> {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(path)
            .header(CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    #[tokio::test]
    async fn key_lookup_returns_value() {
        let f = fixture().await;
        let (status, body) = send(
            &f.app,
            post("/key", Some(&f.token), r#"{"keyName":"AWS_KEY","requestId":"1"}"#),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"success": true, "value": "aws-secret"}));
    }

    #[tokio::test]
    async fn unknown_key_is_success_false() {
        let f = fixture().await;
        let (status, body) = send(
            &f.app,
            post("/key", Some(&f.token), r#"{"keyName":"NOPE","requestId":"1"}"#),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"success": false, "error": "Key \"NOPE\" not found"}));
    }

    #[tokio::test]
    async fn empty_value_counts_as_missing() {
        let f = fixture().await;
        f.secrets.set("AWS_KEY", "").await.unwrap();
        let (_, body) = send(
            &f.app,
            post("/key", Some(&f.token), r#"{"keyName":"AWS_KEY"}"#),
        )
        .await;
        assert_eq!(body["success"], json!(false));
    }

    #[tokio::test]
    async fn list_filters_by_category() {
        let f = fixture().await;

        let (_, all) = send(&f.app, post("/list", Some(&f.token), r#"{"requestId":"1"}"#)).await;
        assert_eq!(all["keys"].as_array().unwrap().len(), 2);

        let (_, cloud) = send(
            &f.app,
            post("/list", Some(&f.token), r#"{"category":"Cloud"}"#),
        )
        .await;
        assert_eq!(
            cloud,
            json!({"success": true, "keys": [{"name": "AWS_KEY", "category": "Cloud"}]})
        );

        let (_, none) = send(
            &f.app,
            post("/list", Some(&f.token), r#"{"category":"Nowhere"}"#),
        )
        .await;
        assert_eq!(none, json!({"success": true, "keys": []}));
    }

    #[tokio::test]
    async fn list_never_exposes_values() {
        let f = fixture().await;
        let response = f
            .app
            .clone()
            .oneshot(post("/list", Some(&f.token), "{}"))
            .await
            .unwrap();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(!text.contains("aws-secret"));
        assert!(!text.contains("loose-secret"));
    }

    #[tokio::test]
    async fn missing_token_is_unauthorized() {
        let f = fixture().await;
        let (status, body) = send(&f.app, post("/key", None, r#"{"keyName":"AWS_KEY"}"#)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!({"error": "Missing or invalid authorization token"}));
    }

    #[tokio::test]
    async fn invalid_token_is_unauthorized() {
        let f = fixture().await;
        let (status, body) = send(
            &f.app,
            post("/key", Some("invalid-token"), r#"{"keyName":"AWS_KEY"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!({"error": "Invalid or expired token"}));
    }

    #[tokio::test]
    async fn unknown_path_is_checked_after_auth() {
        let f = fixture().await;

        let (status, _) = send(&f.app, post("/other", None, "{}")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = send(&f.app, post("/other", Some(&f.token), "{}")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"error": "Endpoint not found"}));
    }

    #[tokio::test]
    async fn non_post_is_method_not_allowed() {
        let f = fixture().await;
        let request = Request::builder()
            .method(Method::GET)
            .uri("/key")
            .header(AUTHORIZATION, format!("Bearer {}", f.token))
            .body(Body::empty())
            .unwrap();

        let (status, body) = send(&f.app, request).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(body, json!({"error": "Method not allowed"}));
    }

    #[tokio::test]
    async fn bare_options_is_ok_without_token() {
        let f = fixture().await;
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/key")
            .body(Body::empty())
            .unwrap();

        let response = f.app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn cors_preflight_carries_headers() {
        let f = fixture().await;
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/list")
            .header("origin", "http://localhost:3000")
            .header("access-control-request-method", "POST")
            .body(Body::empty())
            .unwrap();

        let response = f.app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["access-control-allow-origin"],
            "*"
        );
    }

    #[tokio::test]
    async fn every_response_carries_cors_headers() {
        let f = fixture().await;
        let requests = [
            post("/key", Some(&f.token), r#"{"keyName":"AWS_KEY"}"#),
            post("/key", None, "{}"),
            post("/nowhere", Some(&f.token), "{}"),
        ];

        for request in requests {
            let response = f.app.clone().oneshot(request).await.unwrap();
            let headers = response.headers();
            assert_eq!(headers["access-control-allow-origin"], "*");
            assert_eq!(headers["access-control-allow-methods"], ALLOWED_METHODS);
            assert_eq!(headers["access-control-allow-headers"], ALLOWED_HEADERS);
        }
    }

    #[tokio::test]
    async fn malformed_body_is_internal_error() {
        let f = fixture().await;
        let (status, body) = send(&f.app, post("/key", Some(&f.token), "{not json")).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"]
            .as_str()
            .unwrap()
            .starts_with("Internal server error: "));
    }

    #[test]
    fn panic_payload_is_reported() {
        let response = handle_panic(Box::new("boom"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
