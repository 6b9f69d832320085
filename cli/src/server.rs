use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use serde_json::{Map, Value};
use tower_http::limit::RequestBodyLimitLayer;

use crate::remote::{DocumentEnvelope, ErrorResponse, InsertResponse};
use nosh_core::cloud::{Collection, DocumentStore, FieldFilter, UserId};
use nosh_core::error::StoreError;

const BODY_LIMIT: usize = 1024 * 1024; // 1 MB

#[derive(Clone)]
struct AppState {
    docs: Arc<dyn DocumentStore>,
    api_key: Option<String>,
}

// --- Request / Response types ---

#[derive(Deserialize)]
struct ListQuery {
    field: Option<String>,
    value: Option<String>,
    limit: Option<usize>,
}

// --- Error handling ---

enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Internal(err) => {
                tracing::error!("Internal server error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } => Self::NotFound(err.to_string()),
            StoreError::InvalidQuery(msg) => Self::BadRequest(msg),
            other => Self::Internal(other.into()),
        }
    }
}

fn scope(user: &str, collection: &str) -> Result<(UserId, Collection), ApiError> {
    let user = UserId::new(user).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let collection = collection
        .parse::<Collection>()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    Ok((user, collection))
}

// --- Middleware ---

async fn require_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if let Some(ref expected_key) = state.api_key {
        let authorized = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|token| token == expected_key);

        if !authorized {
            return (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "Invalid or missing API key".to_string(),
                }),
            )
                .into_response();
        }
    }
    next.run(request).await
}

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'"),
    );
    response
}

// --- Handlers ---

async fn insert_document(
    State(state): State<AppState>,
    Path((user, collection)): Path<(String, String)>,
    Json(body): Json<Map<String, Value>>,
) -> Result<(StatusCode, Json<InsertResponse>), ApiError> {
    let (user, collection) = scope(&user, &collection)?;
    let id = state.docs.insert(&user, collection, body).await?;
    tracing::debug!(%user, %collection, %id, "document inserted");
    Ok((StatusCode::CREATED, Json(InsertResponse { id })))
}

async fn list_documents(
    State(state): State<AppState>,
    Path((user, collection)): Path<(String, String)>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<DocumentEnvelope>>, ApiError> {
    let (user, collection) = scope(&user, &collection)?;
    let filter = match (query.field, query.value) {
        (Some(field), Some(value)) => Some(FieldFilter { field, value }),
        (None, None) => None,
        _ => {
            return Err(ApiError::BadRequest(
                "field and value must be given together".to_string(),
            ));
        }
    };

    let docs = state
        .docs
        .list(&user, collection, filter.as_ref(), query.limit)
        .await?;
    Ok(Json(
        docs.into_iter()
            .map(|(id, body)| DocumentEnvelope { id, body })
            .collect(),
    ))
}

async fn get_document(
    State(state): State<AppState>,
    Path((user, collection, id)): Path<(String, String, String)>,
) -> Result<Json<Map<String, Value>>, ApiError> {
    let (user, collection) = scope(&user, &collection)?;
    state
        .docs
        .get(&user, collection, &id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("{collection} document {id} not found")))
}

async fn replace_document(
    State(state): State<AppState>,
    Path((user, collection, id)): Path<(String, String, String)>,
    Json(body): Json<Map<String, Value>>,
) -> Result<StatusCode, ApiError> {
    let (user, collection) = scope(&user, &collection)?;
    state.docs.replace(&user, collection, &id, body).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn merge_document(
    State(state): State<AppState>,
    Path((user, collection, id)): Path<(String, String, String)>,
    Json(fields): Json<Map<String, Value>>,
) -> Result<StatusCode, ApiError> {
    let (user, collection) = scope(&user, &collection)?;
    state.docs.merge(&user, collection, &id, fields).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_document(
    State(state): State<AppState>,
    Path((user, collection, id)): Path<(String, String, String)>,
) -> Result<StatusCode, ApiError> {
    let (user, collection) = scope(&user, &collection)?;
    state.docs.delete(&user, collection, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/v1/users/{user}/{collection}",
            get(list_documents).post(insert_document),
        )
        .route(
            "/v1/users/{user}/{collection}/{id}",
            get(get_document)
                .put(replace_document)
                .patch(merge_document)
                .delete(delete_document),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

pub(crate) fn router(docs: Arc<dyn DocumentStore>, api_key: Option<String>) -> Router {
    build_router(AppState { docs, api_key })
}

// --- Server startup ---

/// First and last four characters of the key, or nothing for short keys.
fn key_hint(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() < 12 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

pub async fn start_server(
    docs: Arc<dyn DocumentStore>,
    port: u16,
    bind: &str,
    api_key: Option<String>,
) -> anyhow::Result<()> {
    let app = router(docs, api_key.clone());

    if let Some(ref key) = api_key {
        eprintln!(
            "API key: {} (see api_key file in data directory)",
            key_hint(key)
        );
    } else {
        eprintln!("Warning: Authentication disabled (--no-auth). API is open to anyone.");
    }

    if bind != "127.0.0.1" && bind != "localhost" && api_key.is_none() {
        eprintln!(
            "Warning: Listening on {bind} with no authentication. Any device on your network can read every user's data."
        );
    }

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}")).await?;
    tracing::info!(%bind, port, "document server started");
    eprintln!("Listening on http://{bind}:{port}");
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;
    use nosh_core::cloud::SqliteDocumentStore;
    use serde_json::json;
    use tower::ServiceExt;

    fn test_app(api_key: Option<String>) -> Router {
        router(
            Arc::new(SqliteDocumentStore::open_in_memory().unwrap()),
            api_key,
        )
    }

    async fn call(app: &Router, request: axum::http::Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, json)
    }

    fn json_request(method: &str, uri: &str, body: &Value) -> axum::http::Request<Body> {
        axum::http::Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_request(uri: &str) -> axum::http::Request<Body> {
        axum::http::Request::get(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn auth_missing_key_returns_401() {
        let app = test_app(Some("test-key-abc123".to_string()));

        let (status, json) = call(&app, get_request("/v1/users/alice/meals")).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["error"], "Invalid or missing API key");
    }

    #[tokio::test]
    async fn auth_wrong_key_returns_401() {
        let app = test_app(Some("test-key-abc123".to_string()));

        let response = app
            .oneshot(
                axum::http::Request::get("/v1/users/alice/meals")
                    .header("Authorization", "Bearer wrong-key")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn auth_correct_key_succeeds() {
        let app = test_app(Some("test-key-abc123".to_string()));

        let response = app
            .oneshot(
                axum::http::Request::get("/v1/users/alice/meals")
                    .header("Authorization", "Bearer test-key-abc123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn security_headers_present() {
        let app = test_app(None);

        let response = app
            .oneshot(get_request("/v1/users/alice/meals"))
            .await
            .unwrap();

        assert_eq!(
            response.headers().get("x-content-type-options").unwrap(),
            "nosniff"
        );
        assert_eq!(response.headers().get("x-frame-options").unwrap(), "DENY");
        assert_eq!(
            response.headers().get("content-security-policy").unwrap(),
            "default-src 'none'"
        );
    }

    #[tokio::test]
    async fn security_headers_on_auth_failure() {
        let app = test_app(Some("secret".to_string()));

        let response = app
            .oneshot(get_request("/v1/users/alice/meals"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get("x-content-type-options").unwrap(),
            "nosniff"
        );
    }

    #[tokio::test]
    async fn body_size_limit_rejects_oversized() {
        let app = test_app(None);

        let big_body = vec![0u8; BODY_LIMIT + 1];
        let response = app
            .oneshot(
                axum::http::Request::post("/v1/users/alice/meals")
                    .header("content-type", "application/json")
                    .body(Body::from(big_body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn insert_then_get_document() {
        let app = test_app(None);

        let (status, created) = call(
            &app,
            json_request("POST", "/v1/users/alice/meals", &json!({"content": "toast"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = created["id"].as_str().unwrap().to_string();

        let (status, body) = call(&app, get_request(&format!("/v1/users/alice/meals/{id}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"content": "toast"}));
    }

    #[tokio::test]
    async fn missing_document_returns_404() {
        let app = test_app(None);

        let (status, _) = call(&app, get_request("/v1/users/alice/meals/nope")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(
            &app,
            json_request("PUT", "/v1/users/alice/meals/nope", &json!({"content": "x"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn patch_creates_and_merges() {
        let app = test_app(None);
        let uri = "/v1/users/alice/settings/profile";

        let (status, _) = call(&app, json_request("PATCH", uri, &json!({"bowl_g": 400}))).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = call(&app, json_request("PATCH", uri, &json!({"age": 30}))).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, body) = call(&app, get_request(uri)).await;
        assert_eq!(body, json!({"bowl_g": 400, "age": 30}));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let app = test_app(None);
        let delete = || {
            axum::http::Request::delete("/v1/users/alice/weights/nope")
                .body(Body::empty())
                .unwrap()
        };

        let (first, _) = call(&app, delete()).await;
        let (second, _) = call(&app, delete()).await;
        assert_eq!(first, StatusCode::NO_CONTENT);
        assert_eq!(second, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn list_filters_by_field_and_user() {
        let app = test_app(None);
        for (user, date) in [("alice", "2024-06-15"), ("alice", "2024-06-16"), ("bob", "2024-06-15")] {
            call(
                &app,
                json_request("POST", &format!("/v1/users/{user}/meals"), &json!({"date": date})),
            )
            .await;
        }

        let (status, listed) = call(
            &app,
            get_request("/v1/users/alice/meals?field=date&value=2024-06-15"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let listed = listed.as_array().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0]["body"]["date"], "2024-06-15");

        let (_, limited) = call(&app, get_request("/v1/users/alice/meals?limit=1")).await;
        assert_eq!(limited.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn invalid_scope_or_query_returns_400() {
        let app = test_app(None);

        let (status, json) = call(&app, get_request("/v1/users/alice/users")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("Unknown collection"));

        let (status, _) = call(&app, get_request("/v1/users/a%20b/meals")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(&app, get_request("/v1/users/alice/meals?field=date")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(
            &app,
            get_request("/v1/users/alice/meals?field=da.te&value=x"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn internal_error_does_not_leak_details() {
        let error = ApiError::Internal(anyhow::anyhow!("secret database path /home/user/.nosh/db"));
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Internal server error");
        assert!(!json["error"].as_str().unwrap().contains("secret"));
    }

    #[test]
    fn test_key_hint_never_slices_short_or_multibyte_keys() {
        assert_eq!(
            key_hint("0123456789abcdef0123456789abcdef"),
            "0123...cdef"
        );
        assert_eq!(key_hint("abc"), "****");
        assert_eq!(key_hint(""), "****");
        assert_eq!(key_hint("ééééxxxxxxxxüüüü"), "éééé...üüüü");
    }
}
