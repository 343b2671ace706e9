//! WebSocket session loop.
//!
//! One connection runs three kinds of task:
//!
//! - the reader (this function), which parses frames and spawns one task per
//!   request so unary calls run concurrently;
//! - a writer, the only owner of the socket sink, draining a bounded outbound
//!   queue with `send_timeout` on every write;
//! - at most one subscription forwarder, moving headers from the session's
//!   stream into the outbound queue.
//!
//! Every task stops on the session's cancellation token, and the session is
//! closed (releasing its registry handle) on every exit path.

use crate::domain::error::{ApiError, ApiResult};
use crate::domain::methods::HubCall;
use crate::domain::types::{
    headers_notification, json_rpc_error, json_rpc_result, subscription_closed_notification,
    subscription_notification, RpcRequest,
};
use crate::router::QueryRouter;
use crate::service::{parse_call, HubState};
use crate::session::{Session, SessionSubscription};
use axum::extract::ws::{Message, WebSocket};
use chrono::Utc;
use futures::{Sink, SinkExt, StreamExt};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, OwnedSemaphorePermit};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

/// Maximum size of one inbound frame (1MB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Per-request context shared by the tasks of one connection.
#[derive(Clone)]
struct Connection {
    session: Arc<Session>,
    router: Arc<QueryRouter>,
    outbound: mpsc::Sender<Message>,
}

/// Response to one request, plus the subscription to start forwarding once
/// the response has been queued.
struct Reply {
    response: Value,
    subscription: Option<SessionSubscription>,
}

impl From<Value> for Reply {
    fn from(response: Value) -> Self {
        Self {
            response,
            subscription: None,
        }
    }
}

/// Serve one upgraded connection. `slot` is the session-limit permit taken
/// before the upgrade; it is released when the session ends.
pub(crate) async fn run_session(
    socket: WebSocket,
    state: Arc<HubState>,
    slot: OwnedSemaphorePermit,
) {
    let session = Arc::new(Session::child_of(
        Arc::clone(&state.registry),
        &state.shutdown,
    ));
    let session_id = session.id();
    state.sessions.insert(session_id, Utc::now());
    let span = tracing::info_span!("ws_session", session_id = %session_id);

    async move {
        info!(active = state.sessions.len(), "websocket session started");
        let cancel = session.cancellation_token();
        let (sink, mut stream) = socket.split();
        let (outbound, outbound_rx) =
            mpsc::channel(state.config.subscriptions.queue_capacity);
        let writer = tokio::spawn(
            write_loop(
                sink,
                outbound_rx,
                state.config.subscriptions.send_timeout,
                cancel.clone(),
            )
            .in_current_span(),
        );

        let conn = Connection {
            session: Arc::clone(&session),
            router: Arc::clone(&state.router),
            outbound,
        };
        let idle = state.config.server.session_timeout;
        let mut tasks = JoinSet::new();

        loop {
            let frame = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                Some(_) = tasks.join_next(), if !tasks.is_empty() => continue,
                _ = tokio::time::sleep(idle) => {
                    // A subscription keeps the session alive.
                    if session.subscription_id().is_some() {
                        continue;
                    }
                    info!(idle_secs = idle.as_secs(), "closing idle session");
                    break;
                }
                frame = stream.next() => frame,
            };

            let text = match frame {
                None | Some(Ok(Message::Close(_))) => break,
                Some(Err(e)) => {
                    debug!(error = %e, "websocket read error");
                    break;
                }
                Some(Ok(Message::Text(text))) => text,
                Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                    Ok(text) => text,
                    Err(_) => {
                        let err = ApiError::parse_error("binary frame is not UTF-8");
                        conn.send(json_rpc_error(&Value::Null, &err)).await;
                        continue;
                    }
                },
                // axum answers pings itself
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
            };

            let conn = conn.clone();
            tasks.spawn(async move { conn.handle_text(&text).await }.in_current_span());
        }

        session.close();
        tasks.shutdown().await;
        drop(conn);
        if let Err(e) = writer.await {
            warn!(error = %e, "websocket writer task failed");
        }
        state.sessions.remove(&session_id);
        drop(slot);
        info!(active = state.sessions.len(), "websocket session ended");
    }
    .instrument(span)
    .await
}

/// Drain `outbound` into `sink`. A write that takes longer than
/// `send_timeout` or fails ends the loop and cancels the session.
async fn write_loop<S>(
    mut sink: S,
    mut outbound: mpsc::Receiver<Message>,
    send_timeout: Duration,
    cancel: CancellationToken,
) where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    loop {
        let message = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            message = outbound.recv() => match message {
                Some(message) => message,
                None => break,
            },
        };
        match tokio::time::timeout(send_timeout, sink.send(message)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!(error = %e, "websocket write failed");
                break;
            }
            Err(_) => {
                let timeout_ms = send_timeout.as_millis() as u64;
                warn!(timeout_ms, "client stalled, dropping slow consumer");
                break;
            }
        }
    }
    cancel.cancel();
    let _ = tokio::time::timeout(send_timeout, sink.close()).await;
}

impl Connection {
    /// Queue a message for the writer. Gives up if the session is closing.
    async fn send(&self, message: Value) -> bool {
        let token = self.session.cancellation_token();
        tokio::select! {
            biased;
            _ = token.cancelled() => false,
            sent = self.outbound.send(Message::Text(message.to_string())) => sent.is_ok(),
        }
    }

    async fn handle_text(&self, text: &str) {
        let request: Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(e) => {
                let err = ApiError::parse_error(e.to_string());
                self.send(json_rpc_error(&Value::Null, &err)).await;
                return;
            }
        };

        match request {
            Value::Array(requests) if requests.is_empty() => {
                let err = ApiError::invalid_request("empty batch");
                self.send(json_rpc_error(&Value::Null, &err)).await;
            }
            Value::Array(requests) => {
                let mut responses = Vec::with_capacity(requests.len());
                let mut subscription = None;
                for request in &requests {
                    let reply = self.handle_request(request).await;
                    responses.push(reply.response);
                    if reply.subscription.is_some() {
                        subscription = reply.subscription;
                    }
                }
                if self.send(Value::Array(responses)).await {
                    if let Some(sub) = subscription {
                        self.forward(sub).await;
                    }
                }
            }
            single => {
                let reply = self.handle_request(&single).await;
                if self.send(reply.response).await {
                    if let Some(sub) = reply.subscription {
                        self.forward(sub).await;
                    }
                }
            }
        }
    }

    async fn handle_request(&self, request: &Value) -> Reply {
        let (req, call) = match parse_call(request) {
            Ok(parsed) => parsed,
            Err(response) => return response.into(),
        };
        debug!(method = %req.method, "ws call");

        match self.execute(&req, call).await {
            Ok(reply) => reply,
            Err(e) => {
                if !e.is_client_error() {
                    warn!(method = %req.method, code = e.code, error = %e.message, "call failed");
                }
                json_rpc_error(&req.id, &e).into()
            }
        }
    }

    async fn execute(&self, req: &RpcRequest, call: HubCall) -> ApiResult<Reply> {
        match call {
            HubCall::SubscribeHeaders { start_height } => {
                let subscription = self.session.open_subscription(start_height)?;
                Ok(Reply {
                    response: json_rpc_result(&req.id, json!(subscription.id())),
                    subscription: Some(subscription),
                })
            }
            HubCall::UnsubscribeHeaders { subscription } => {
                let cancelled = self.session.cancel_subscription(subscription);
                Ok(json_rpc_result(&req.id, json!(cancelled)).into())
            }
            HubCall::GetHeaders { start, end } => {
                let headers = self.router.get_headers(start, end).await?;
                for header in &headers {
                    if !self.send(headers_notification(&req.id, header)).await {
                        return Err(ApiError::subscription_closed("session closed"));
                    }
                }
                Ok(json_rpc_result(&req.id, json!({ "count": headers.len() })).into())
            }
            call => {
                let result = self.router.dispatch(call).await?;
                Ok(json_rpc_result(&req.id, result).into())
            }
        }
    }

    /// Forward headers until the subscription ends. Abnormal ends are
    /// reported to the client; an explicit unsubscribe is not.
    async fn forward(&self, mut subscription: SessionSubscription) {
        let id = subscription.id();
        while let Some(item) = subscription.next().await {
            match item {
                Ok(header) => {
                    if !self.send(subscription_notification(id, &header)).await {
                        break;
                    }
                }
                Err(e) => {
                    let err = ApiError::from(e);
                    info!(
                        subscription_id = %id,
                        code = err.code,
                        reason = %err.message,
                        "subscription closed"
                    );
                    self.send(subscription_closed_notification(id, &err)).await;
                    break;
                }
            }
        }
        debug!(subscription_id = %id, "forwarder stopped");
    }
}
