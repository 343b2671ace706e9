//! Request span layer.
//!
//! Every HTTP request (including WebSocket upgrades) runs inside an
//! `rpc_request` span carrying the method, path and a request id. The id is
//! taken from `x-request-id` when the client sends one.

use axum::{body::Body, http::Request, response::Response};
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::{info_span, Instrument, Span};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Longest client-supplied request id that is kept.
const MAX_REQUEST_ID_LEN: usize = 128;

#[derive(Clone, Default)]
pub struct TracingLayer;

impl TracingLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for TracingLayer {
    type Service = TracingService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TracingService { inner }
    }
}

#[derive(Clone)]
pub struct TracingService<S> {
    inner: S,
}

impl<S> Service<Request<Body>> for TracingService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let mut inner = self.inner.clone();

        let request_id = request_id(&req);
        let span = info_span!(
            "rpc_request",
            http.method = %req.method(),
            http.target = %req.uri().path(),
            request_id = %request_id,
            http.status = tracing::field::Empty,
        );

        Box::pin(
            async move {
                let result = inner.call(req).await;
                if let Ok(response) = &result {
                    Span::current().record("http.status", response.status().as_u16());
                }
                result
            }
            .instrument(span),
        )
    }
}

/// Client-supplied request id, or a fresh one.
fn request_id<B>(req: &Request<B>) -> String {
    req.headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty() && v.len() <= MAX_REQUEST_ID_LEN)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}
