//! Minimal JSON-RPC client for talking to a running hub.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("hub error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("failed to parse response: {0}")]
    Parse(String),
    #[error("cannot connect to {0}")]
    Connection(String),
}

#[derive(Debug, Serialize)]
struct Request<'a, P> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: P,
}

#[derive(Debug, Deserialize)]
struct Response<R> {
    result: Option<R>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

pub struct HubClient {
    client: reqwest::Client,
    url: String,
    request_id: AtomicU64,
}

impl HubClient {
    pub fn new(url: impl Into<String>) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(2))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
            request_id: AtomicU64::new(1),
        })
    }

    pub async fn call<P: Serialize, R: DeserializeOwned>(
        &self,
        method: &str,
        params: P,
    ) -> Result<R, ClientError> {
        let request = Request {
            jsonrpc: "2.0",
            id: self.request_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    ClientError::Connection(self.url.clone())
                } else {
                    ClientError::Http(e)
                }
            })?;

        let response: Response<R> = response
            .json()
            .await
            .map_err(|e| ClientError::Parse(e.to_string()))?;

        if let Some(error) = response.error {
            return Err(ClientError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        response
            .result
            .ok_or_else(|| ClientError::Parse("missing result in response".into()))
    }

    /// `hub_search` with a single request object.
    pub async fn search(&self, request: &hub_gateway::SearchRequest) -> Result<Value, ClientError> {
        self.call("hub_search", [request]).await
    }
}
