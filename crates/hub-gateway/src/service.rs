//! Hub service facade.
//!
//! Serves JSON-RPC over HTTP (`POST /`), WebSocket sessions (`GET /ws`) and
//! a liveness check (`GET /health`) from one listener. Each WebSocket
//! connection gets its own `Session`; HTTP calls are sessionless.

use crate::domain::config::HubConfig;
use crate::domain::error::{ApiError, HubError};
use crate::domain::ids::SessionId;
use crate::domain::methods::HubCall;
use crate::domain::types::{json_rpc_error, json_rpc_result, RpcRequest};
use crate::middleware::{TracingLayer, MAX_REQUEST_BODY};
use crate::registry::SubscriptionRegistry;
use crate::router::QueryRouter;
use crate::ws::{self, DEFAULT_MAX_MESSAGE_SIZE};
use axum::{
    extract::{ws::WebSocketUpgrade, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{debug, info, warn};

/// State shared by every handler.
pub(crate) struct HubState {
    pub(crate) config: Arc<HubConfig>,
    pub(crate) registry: Arc<SubscriptionRegistry>,
    pub(crate) router: Arc<QueryRouter>,
    pub(crate) sessions: DashMap<SessionId, DateTime<Utc>>,
    /// One permit per allowed session, taken before the upgrade completes.
    pub(crate) session_slots: Arc<Semaphore>,
    pub(crate) shutdown: CancellationToken,
}

type SharedState = Arc<HubState>;

/// The hub's network entry point.
#[derive(Clone)]
pub struct HubService {
    state: SharedState,
}

impl HubService {
    pub fn new(
        config: Arc<HubConfig>,
        registry: Arc<SubscriptionRegistry>,
        router: QueryRouter,
    ) -> Self {
        let slots = config.server.max_sessions.min(Semaphore::MAX_PERMITS);
        Self {
            state: Arc::new(HubState {
                config,
                registry,
                router: Arc::new(router),
                sessions: DashMap::new(),
                session_slots: Arc::new(Semaphore::new(slots)),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn config(&self) -> &Arc<HubConfig> {
        &self.state.config
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.state.registry
    }

    /// Cancelled by `shutdown()`. Background tasks should stop on it.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.state.shutdown.clone()
    }

    pub fn session_count(&self) -> usize {
        self.state.sessions.len()
    }

    /// Trigger graceful shutdown: stop accepting, close every session.
    pub fn shutdown(&self) {
        info!("hub shutdown requested");
        self.state.shutdown.cancel();
    }

    /// Bind the configured address and serve until shutdown.
    pub async fn start(&self) -> Result<(), HubError> {
        let listener = TcpListener::bind(self.state.config.bind_addr())
            .await
            .map_err(HubError::Bind)?;
        self.serve(listener).await
    }

    /// Serve on an already-bound listener until shutdown.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), HubError> {
        let addr: SocketAddr = listener.local_addr().map_err(HubError::Bind)?;
        info!(%addr, "hub listening");

        let shutdown = self.state.shutdown.clone();
        axum::serve(listener, self.build_router())
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .map_err(HubError::Serve)?;

        self.state.registry.close_all();
        info!("hub stopped");
        Ok(())
    }

    /// Build the axum router with the middleware stack.
    pub fn build_router(&self) -> Router {
        Router::new()
            .route("/", post(handle_json_rpc))
            .route("/ws", get(handle_ws_upgrade))
            .route("/health", get(health_check))
            .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BODY))
            .layer(TracingLayer::new())
            .with_state(Arc::clone(&self.state))
    }
}

async fn handle_ws_upgrade(
    State(state): State<SharedState>,
    upgrade: WebSocketUpgrade,
) -> Response {
    let Ok(slot) = Arc::clone(&state.session_slots).try_acquire_owned() else {
        let max = state.config.server.max_sessions;
        warn!(max, "session limit reached, refusing upgrade");
        return (StatusCode::SERVICE_UNAVAILABLE, "too many sessions").into_response();
    };
    upgrade
        .max_message_size(DEFAULT_MAX_MESSAGE_SIZE)
        .on_upgrade(move |socket| ws::run_session(socket, state, slot))
}

async fn health_check(State(state): State<SharedState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "height": state.registry.tip_height(),
        "sessions": state.sessions.len(),
        "subscriptions": state.registry.len(),
    }))
}

/// Handle a single or batch JSON-RPC request over HTTP.
async fn handle_json_rpc(State(state): State<SharedState>, body: String) -> impl IntoResponse {
    let request: Value = match serde_json::from_str(&body) {
        Ok(v) => v,
        Err(e) => {
            let err = ApiError::parse_error(e.to_string());
            return (StatusCode::BAD_REQUEST, Json(json_rpc_error(&Value::Null, &err)));
        }
    };

    let response = match request {
        Value::Array(requests) if requests.is_empty() => {
            json_rpc_error(&Value::Null, &ApiError::invalid_request("empty batch"))
        }
        Value::Array(requests) => {
            let calls = requests.iter().map(|req| process_single_request(&state, req));
            Value::Array(futures::future::join_all(calls).await)
        }
        single => process_single_request(&state, &single).await,
    };

    (StatusCode::OK, Json(response))
}

async fn process_single_request(state: &HubState, request: &Value) -> Value {
    let (req, call) = match parse_call(request) {
        Ok(parsed) => parsed,
        Err(response) => return response,
    };
    debug!(method = %req.method, "http call");

    match state.router.dispatch(call).await {
        Ok(value) => json_rpc_result(&req.id, value),
        Err(e) => {
            if !e.is_client_error() {
                warn!(method = %req.method, code = e.code, error = %e.message, "call failed");
            }
            json_rpc_error(&req.id, &e)
        }
    }
}

/// Validate the envelope and parse the call, or build the error response.
pub(crate) fn parse_call(request: &Value) -> Result<(RpcRequest, HubCall), Value> {
    let req = RpcRequest::from_value(request).map_err(|(id, err)| json_rpc_error(&id, &err))?;
    match HubCall::parse(&req.method, req.params.as_ref()) {
        Ok(call) => Ok((req, call)),
        Err(err) => Err(json_rpc_error(&req.id, &err)),
    }
}
