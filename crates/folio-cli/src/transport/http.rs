//! HTTP surface: JSON endpoints over a shared session, bearer auth, and a
//! Server-Sent Events stream of tracker events.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    middleware,
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::broadcast::error::RecvError;
use tower_http::cors::{Any, CorsLayer};

use folio::{classify, CatalogError, Dispatch, EnrichmentEvent};

use crate::session::Session;

/// Shared state handed to every handler.
pub struct ServerState {
    pub session: Session,
    pub token: Option<String>,
}

/// HTTP front end over one session.
pub struct HttpTransport {
    state: Arc<ServerState>,
}

impl HttpTransport {
    pub fn new(session: Session, token: Option<String>) -> Self {
        Self {
            state: Arc::new(ServerState { session, token }),
        }
    }

    /// Serve until the listener fails.
    pub async fn run(&self, addr: &str) -> anyhow::Result<()> {
        let app = router(self.state.clone());
        let listener = tokio::net::TcpListener::bind(addr).await?;

        tracing::info!(
            "HTTP API listening on http://{addr} (auth {})",
            if self.state.token.is_some() { "on" } else { "off" }
        );

        axum::serve(listener, app).await?;
        Ok(())
    }
}

/// Build the router. `/health` bypasses auth.
pub fn router(state: Arc<ServerState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/projects", get(list_projects))
        .route("/api/projects/:key/enrich", post(enrich_project))
        .route("/api/state", get(list_state))
        .route("/api/state/:key", get(project_state))
        .route("/api/classify", post(classify_text))
        .route("/api/events", get(events_sse))
        .layer(middleware::from_fn_with_state(state.clone(), auth_layer))
        .route("/health", get(health))
        .layer(cors)
        .with_state(state)
}

async fn auth_layer(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    request: axum::extract::Request,
    next: middleware::Next,
) -> Response {
    if let Some(expected) = &state.token {
        let authorized = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|token| token == expected);

        if !authorized {
            return error_response(StatusCode::UNAUTHORIZED, "Unauthorized");
        }
    }

    next.run(request).await
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

fn catalog_error(err: CatalogError) -> Response {
    match err {
        CatalogError::UnknownKey(_) => error_response(StatusCode::NOT_FOUND, err.to_string()),
        other => error_response(StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
    }
}

async fn health(State(state): State<Arc<ServerState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "entities": state.session.catalog().len(),
        "in_flight": state.session.tracker().in_flight(),
    }))
}

async fn list_projects(State(state): State<Arc<ServerState>>) -> Json<Value> {
    let projects: Vec<_> = state.session.catalog().iter().collect();
    Json(json!(projects))
}

async fn enrich_project(
    State(state): State<Arc<ServerState>>,
    Path(key): Path<String>,
) -> Response {
    match state.session.request(&key) {
        Ok(Dispatch::Started { request_id }) => (
            StatusCode::ACCEPTED,
            Json(json!({
                "key": key,
                "dispatch": "started",
                "request_id": request_id.to_string(),
            })),
        )
            .into_response(),
        Ok(Dispatch::Suppressed) => (
            StatusCode::OK,
            Json(json!({ "key": key, "dispatch": "suppressed" })),
        )
            .into_response(),
        Err(e) => catalog_error(e),
    }
}

async fn list_state(State(state): State<Arc<ServerState>>) -> Json<Value> {
    Json(json!(state.session.reports()))
}

async fn project_state(
    State(state): State<Arc<ServerState>>,
    Path(key): Path<String>,
) -> Response {
    match state.session.report(&key) {
        Ok(report) => Json(json!(report)).into_response(),
        Err(e) => catalog_error(e),
    }
}

#[derive(Deserialize)]
struct ClassifyBody {
    text: String,
}

async fn classify_text(Json(body): Json<ClassifyBody>) -> Json<Value> {
    Json(json!({ "units": classify(&body.text) }))
}

/// Stream tracker events as they happen.
async fn events_sse(
    State(state): State<Arc<ServerState>>,
) -> Sse<impl futures::Stream<Item = Result<Event, Infallible>>> {
    let mut rx = state.session.tracker().subscribe();

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Ok(json) = serde_json::to_string(&event) {
                        yield Ok(Event::default().event(event_name(&event)).data(json));
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!("SSE subscriber lagged, skipped {skipped} events");
                    continue;
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn event_name(event: &EnrichmentEvent) -> &'static str {
    match event {
        EnrichmentEvent::Started { .. } => "started",
        EnrichmentEvent::Suppressed { .. } => "suppressed",
        EnrichmentEvent::Succeeded { .. } => "succeeded",
        EnrichmentEvent::Failed { .. } => "failed",
    }
}
