//! Shared fixtures: a hub served on an ephemeral port with a controllable
//! chain, plus a small WebSocket JSON-RPC client.

use futures::{SinkExt, StreamExt};
use hub_feed::{HeaderSource, InMemoryHeaderFeed};
use hub_gateway::domain::config::Toggles;
use hub_gateway::{
    HubConfig, HubConfigBuilder, HubService, QueryRouter, SubscriptionRegistry,
    UpstreamFeedAdapter,
};
use hub_types::{build_chain, ChainHeader, ChainStore, Height, MemoryChainStore};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

/// Upper bound for any single wait in a test.
pub const WAIT: Duration = Duration::from_secs(5);

/// Headers prepared beyond the initial tip, released by `advance`.
const SPARE_HEADERS: usize = 1000;

pub struct TestHub {
    pub service: HubService,
    pub registry: Arc<SubscriptionRegistry>,
    pub store: Arc<MemoryChainStore>,
    source: Arc<HeaderSource>,
    pending: Mutex<VecDeque<ChainHeader>>,
    addr: SocketAddr,
}

impl TestHub {
    /// Hub whose store holds heights `0..=tip`.
    pub async fn start(tip: Height) -> Self {
        Self::start_with(tip, |_| {}).await
    }

    pub async fn start_with(tip: Height, configure: impl FnOnce(&mut HubConfig)) -> Self {
        let mut chain: VecDeque<ChainHeader> =
            build_chain(0, tip as usize + 1 + SPARE_HEADERS).into();
        let initial: Vec<ChainHeader> = chain.drain(..=tip as usize).collect();

        let config = HubConfigBuilder::new()
            .configure(|c| {
                c.toggles = Toggles::none();
                configure(c);
            })
            .build()
            .expect("test config is valid");
        let config = Arc::new(config);

        let memory = Arc::new(MemoryChainStore::with_headers(initial).expect("contiguous chain"));
        let store: Arc<dyn ChainStore> = memory.clone();
        let feed = Arc::new(InMemoryHeaderFeed::new());
        let source = Arc::new(HeaderSource::new(Arc::clone(&store), Arc::clone(&feed)));
        source.sync().await.expect("store readable");

        let registry = Arc::new(SubscriptionRegistry::new(
            Arc::clone(&store),
            config.subscriptions.clone(),
        ));
        let adapter = UpstreamFeedAdapter::new(Arc::clone(&registry), Arc::clone(&store));
        adapter.seed().await.expect("store readable");

        let router = QueryRouter::new(Arc::clone(&config), Arc::clone(&registry), store);
        let service = HubService::new(config, Arc::clone(&registry), router);
        tokio::spawn(adapter.run(feed.subscribe(), service.shutdown_token()));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind ephemeral port");
        let addr = listener.local_addr().expect("local addr");
        let server = service.clone();
        tokio::spawn(async move {
            server.serve(listener).await.expect("serve");
        });

        Self {
            service,
            registry,
            store: memory,
            source,
            pending: Mutex::new(chain),
            addr,
        }
    }

    pub fn http_url(&self) -> String {
        format!("http://{}/", self.addr)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    pub fn health_url(&self) -> String {
        format!("http://{}/health", self.addr)
    }

    /// Extend the chain by `n` headers and wait until the registry has
    /// fanned them out.
    pub async fn advance(&self, n: usize) -> Height {
        let mut target = self.registry.tip_height().unwrap_or(0);
        for _ in 0..n {
            let header = self.pending.lock().pop_front().expect("spare headers left");
            target = header.height;
            self.store.append(header).expect("header extends tip");
        }
        self.source.sync().await.expect("store readable");
        self.wait_until(|| self.registry.tip_height() == Some(target)).await;
        target
    }

    /// Poll `condition` until it holds. Panics after `WAIT`.
    pub async fn wait_until(&self, condition: impl Fn() -> bool) {
        tokio::time::timeout(WAIT, async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    /// One JSON-RPC call over HTTP.
    pub async fn http_call(&self, method: &str, params: Value) -> Value {
        let body = json!({ "jsonrpc": "2.0", "id": 1, "method": method, "params": params });
        reqwest::Client::new()
            .post(self.http_url())
            .json(&body)
            .send()
            .await
            .expect("http request")
            .json()
            .await
            .expect("json response")
    }
}

impl Drop for TestHub {
    fn drop(&mut self) {
        self.service.shutdown();
    }
}

/// WebSocket JSON-RPC client that buffers notifications while waiting for
/// responses.
pub struct WsClient {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
    buffered: VecDeque<Value>,
    next_id: u64,
}

impl WsClient {
    pub async fn connect(url: &str) -> Self {
        let (socket, _) = tokio_tungstenite::connect_async(url)
            .await
            .expect("websocket handshake");
        Self {
            socket,
            buffered: VecDeque::new(),
            next_id: 1,
        }
    }

    pub async fn send_text(&mut self, text: impl Into<String>) {
        self.socket
            .send(Message::Text(text.into()))
            .await
            .expect("websocket send");
    }

    /// Next message from the socket, `None` once the server closed it.
    async fn read(&mut self) -> Option<Value> {
        loop {
            let message = tokio::time::timeout(WAIT, self.socket.next())
                .await
                .expect("no message in time");
            match message {
                Some(Ok(Message::Text(text))) => {
                    return Some(serde_json::from_str(&text).expect("server sent JSON"))
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => continue,
                Some(Ok(Message::Binary(_))) => panic!("unexpected binary frame"),
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return None,
            }
        }
    }

    /// Send a call and wait for its response; notifications received in the
    /// meantime stay buffered.
    pub async fn call(&mut self, method: &str, params: Value) -> Value {
        let id = self.next_id;
        self.next_id += 1;
        let request = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });
        self.send_text(request.to_string()).await;
        loop {
            let message = self.read().await.expect("connection closed before response");
            if message.get("id") == Some(&json!(id)) {
                return message;
            }
            self.buffered.push_back(message);
        }
    }

    /// Next notification, buffered or fresh.
    pub async fn notification(&mut self) -> Value {
        match self.buffered.pop_front() {
            Some(message) => message,
            None => self.read().await.expect("connection closed"),
        }
    }

    /// Any message arriving within `wait`.
    pub async fn try_notification(&mut self, wait: Duration) -> Option<Value> {
        if let Some(message) = self.buffered.pop_front() {
            return Some(message);
        }
        match tokio::time::timeout(wait, self.socket.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => serde_json::from_str(&text).ok(),
            _ => None,
        }
    }

    /// Height carried by a header notification.
    pub fn height_of(notification: &Value) -> Height {
        notification["params"]["result"]["height"]
            .as_u64()
            .expect("notification carries a header")
    }

    /// Wait for the server to close the connection, skipping any messages.
    pub async fn wait_closed(&mut self) {
        self.buffered.clear();
        while self.read().await.is_some() {}
    }

    pub async fn close(mut self) {
        let _ = self.socket.close(None).await;
    }
}
