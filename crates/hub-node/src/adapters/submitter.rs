//! Transaction submission through the chain daemon's JSON-RPC
//! `sendrawtransaction`.

use crate::adapters::http_client;
use async_trait::async_trait;
use hub_types::{BlockHash, SubmitError, TxSubmitter};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Serialize)]
struct DaemonRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'static str,
    params: [&'a str; 1],
}

#[derive(Debug, Deserialize)]
struct DaemonResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<DaemonError>,
}

#[derive(Debug, Deserialize)]
struct DaemonError {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

pub struct ChainDaemonSubmitter {
    client: reqwest::Client,
    url: String,
    request_id: AtomicU64,
}

impl ChainDaemonSubmitter {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, SubmitError> {
        let client = http_client(timeout).map_err(|e| SubmitError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
            request_id: AtomicU64::new(1),
        })
    }

    fn next_id(&self) -> u64 {
        self.request_id.fetch_add(1, Ordering::Relaxed)
    }
}

#[async_trait]
impl TxSubmitter for ChainDaemonSubmitter {
    async fn submit(&self, raw_tx: &[u8]) -> Result<BlockHash, SubmitError> {
        let raw_hex = hex::encode(raw_tx);
        let request = DaemonRequest {
            jsonrpc: "1.0",
            id: self.next_id(),
            method: "sendrawtransaction",
            params: [raw_hex.as_str()],
        };
        debug!(bytes = raw_tx.len(), "submitting transaction");

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| SubmitError::Unavailable(e.to_string()))?;

        // The daemon reports RPC errors with a 500 status and a JSON body.
        let status = response.status();
        let body: DaemonResponse = response.json().await.map_err(|e| {
            SubmitError::Unavailable(format!("daemon returned {}: {}", status, e))
        })?;

        if let Some(error) = body.error {
            return Err(SubmitError::Rejected(format!("{} ({})", error.message, error.code)));
        }
        let txid = body
            .result
            .as_ref()
            .and_then(Value::as_str)
            .ok_or_else(|| SubmitError::Unavailable("daemon returned no txid".into()))?;
        let txid = BlockHash::from_hex(txid)
            .map_err(|e| SubmitError::Unavailable(format!("bad txid from daemon: {}", e)))?;

        info!(txid = %txid, "transaction submitted");
        Ok(txid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::post, Json, Router};
    use serde_json::json;

    const TXID: &str = "5c0d9e0e4a1c6f0e9c0b2f0dd0b5c3ea1c06a5e6bd5f6f8c2d51a4b0c5e0a9f1";

    async fn spawn_daemon(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_submit_returns_txid() {
        let router = Router::new().route(
            "/",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["method"], "sendrawtransaction");
                assert_eq!(body["params"][0], "deadbeef");
                Json(json!({ "result": TXID, "error": null, "id": body["id"] }))
            }),
        );
        let url = spawn_daemon(router).await;
        let submitter = ChainDaemonSubmitter::new(url, Duration::from_secs(2)).unwrap();

        let txid = submitter.submit(&[0xde, 0xad, 0xbe, 0xef]).await.unwrap();
        assert_eq!(txid.to_hex(), TXID);
    }

    #[tokio::test]
    async fn test_daemon_error_is_rejection() {
        let router = Router::new().route(
            "/",
            post(|| async {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "result": null,
                        "error": { "code": -26, "message": "txn-mempool-conflict" }
                    })),
                )
            }),
        );
        let url = spawn_daemon(router).await;
        let submitter = ChainDaemonSubmitter::new(url, Duration::from_secs(2)).unwrap();

        let err = submitter.submit(&[1, 2, 3]).await.unwrap_err();
        assert_eq!(err, SubmitError::Rejected("txn-mempool-conflict (-26)".into()));
    }

    #[tokio::test]
    async fn test_non_json_reply_is_unavailable() {
        let router = Router::new().route("/", post(|| async { (StatusCode::BAD_GATEWAY, "down") }));
        let url = spawn_daemon(router).await;
        let submitter = ChainDaemonSubmitter::new(url, Duration::from_secs(2)).unwrap();

        let err = submitter.submit(&[1]).await.unwrap_err();
        assert!(matches!(err, SubmitError::Unavailable(_)));
    }
}
