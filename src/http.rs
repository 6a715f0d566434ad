//! HTTP transport — maps REST requests onto gateway requests.
//!
//! Requires the `http` feature. Uses axum for routing.
//!
//! ## Routes
//!
//! For every resource path mapped to a family:
//!
//! - `POST /:resource`: create. Body = JSON payload.
//! - `GET /:resource`: get all.
//! - `GET /:resource/:id`: get single.
//! - `PUT /:resource/:id`: update. Body = JSON payload, `id` merged in.
//! - `DELETE /:resource/:id`: delete.
//! - `GET /health`: `{ "ok": true, "families": [...] }`.
//!
//! The completion's `statusCode` and `body` become the HTTP response.
//!
//! ## Example
//!
//! ```ignore
//! let gateway = Gateway::new(bus.clone(), registry.clone());
//! let routes = HttpRoutes::new().resource("users", "User");
//!
//! // Get the router to compose with other axum routes
//! let app = http::router(gateway.clone(), routes.clone());
//!
//! // Or serve directly
//! http::serve(gateway, routes, "0.0.0.0:3000").await?;
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::channels::ChannelRegistry;
use crate::correlation::{EngineError, Gateway};
use crate::message::{Action, CompletionPayload};

/// Resource path segment → channel family.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpRoutes {
    resources: BTreeMap<String, String>,
}

impl HttpRoutes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `family` under `/{path}`.
    pub fn resource(mut self, path: impl Into<String>, family: impl Into<String>) -> Self {
        self.resources.insert(path.into(), family.into());
        self
    }

    /// One lowercase plural resource per registered family (`User` → `users`).
    pub fn from_registry(registry: &ChannelRegistry) -> Self {
        registry.families().into_iter().fold(Self::new(), |routes, family| {
            routes.resource(format!("{}s", family.to_lowercase()), family)
        })
    }

    pub fn family(&self, path: &str) -> Option<&str> {
        self.resources.get(path).map(String::as_str)
    }
}

struct HttpState {
    gateway: Gateway,
    routes: HttpRoutes,
}

type SharedState = Arc<HttpState>;

/// Build an axum `Router` that forwards requests through `gateway`.
pub fn router(gateway: Gateway, routes: HttpRoutes) -> Router {
    let state = Arc::new(HttpState { gateway, routes });
    Router::new()
        .route("/health", get(health_handler))
        .route("/:resource", get(get_all_handler).post(create_handler))
        .route(
            "/:resource/:id",
            get(get_single_handler)
                .put(update_handler)
                .delete(delete_handler),
        )
        .with_state(state)
}

/// Serve the gateway over HTTP at the given address (e.g. `"0.0.0.0:3000"`).
pub async fn serve(gateway: Gateway, routes: HttpRoutes, addr: &str) -> Result<(), std::io::Error> {
    let app = router(gateway, routes);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr, "http transport listening");
    axum::serve(listener, app).await
}

/// `GET /health` returns `{ "ok": true, "families": [...] }`.
async fn health_handler(State(state): State<SharedState>) -> impl IntoResponse {
    let families = state.gateway.registry().families();
    Json(json!({ "ok": true, "families": families }))
}

async fn create_handler(
    State(state): State<SharedState>,
    Path(resource): Path<String>,
    Json(input): Json<Value>,
) -> Response {
    forward(&state, &resource, Action::Create, input).await
}

async fn get_all_handler(State(state): State<SharedState>, Path(resource): Path<String>) -> Response {
    forward(&state, &resource, Action::GetAll, json!({})).await
}

async fn get_single_handler(
    State(state): State<SharedState>,
    Path((resource, id)): Path<(String, String)>,
) -> Response {
    forward(&state, &resource, Action::GetSingle, json!({ "id": id })).await
}

async fn update_handler(
    State(state): State<SharedState>,
    Path((resource, id)): Path<(String, String)>,
    Json(input): Json<Value>,
) -> Response {
    forward(&state, &resource, Action::Update, with_id(input, id)).await
}

async fn delete_handler(
    State(state): State<SharedState>,
    Path((resource, id)): Path<(String, String)>,
) -> Response {
    forward(&state, &resource, Action::Delete, json!({ "id": id })).await
}

/// The path id wins over any `id` in the body.
fn with_id(input: Value, id: String) -> Value {
    match input {
        Value::Object(mut fields) => {
            fields.insert("id".to_string(), Value::String(id));
            Value::Object(fields)
        }
        _ => json!({ "id": id }),
    }
}

async fn forward(state: &HttpState, resource: &str, action: Action, payload: Value) -> Response {
    let Some(family) = state.routes.family(resource) else {
        return error_response(StatusCode::NOT_FOUND, format!("unknown resource: {resource}"));
    };

    match state.gateway.request(family, action, payload).await {
        Ok(completion) => completion_response(completion.completion_payload()),
        Err(err) => engine_error_response(&err),
    }
}

fn completion_response(completion: CompletionPayload) -> Response {
    let status = StatusCode::from_u16(completion.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status == StatusCode::NO_CONTENT || completion.body.is_null() {
        return status.into_response();
    }
    (status, Json(completion.body)).into_response()
}

fn engine_error_response(err: &EngineError) -> Response {
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    tracing::warn!(status = status.as_u16(), error = %err, "gateway request failed");
    error_response(status, err.to_string())
}

fn error_response(status: StatusCode, message: String) -> Response {
    (status, Json(json!({ "message": message }))).into_response()
}
