//! Unary request dispatch.
//!
//! `QueryRouter` validates each call's shape, forwards it to the right
//! collaborator under the request timeout, and maps the outcome onto
//! `ApiError`. Subscription methods never reach it; `hub_getHeaders` does,
//! and returns the whole bounded range at once.

use crate::domain::config::HubConfig;
use crate::domain::error::{ApiError, ApiResult};
use crate::domain::methods::HubCall;
use crate::domain::search::SearchRequest;
use crate::domain::types::{BlockParam, BlockRecord, HeaderRecord};
use crate::registry::SubscriptionRegistry;
use hub_types::{BlockSelector, ChainStore, Height, SearchIndex, SearchResults, TxSubmitter};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Fixed reply to `hub_ping`.
pub const PING_REPLY: &str = "Hello, world!";

pub struct QueryRouter {
    config: Arc<HubConfig>,
    registry: Arc<SubscriptionRegistry>,
    store: Arc<dyn ChainStore>,
    search: Option<Arc<dyn SearchIndex>>,
    submitter: Option<Arc<dyn TxSubmitter>>,
}

impl QueryRouter {
    pub fn new(
        config: Arc<HubConfig>,
        registry: Arc<SubscriptionRegistry>,
        store: Arc<dyn ChainStore>,
    ) -> Self {
        Self {
            config,
            registry,
            store,
            search: None,
            submitter: None,
        }
    }

    pub fn with_search(mut self, search: Arc<dyn SearchIndex>) -> Self {
        self.search = Some(search);
        self
    }

    pub fn with_submitter(mut self, submitter: Arc<dyn TxSubmitter>) -> Self {
        self.submitter = Some(submitter);
        self
    }

    pub fn config(&self) -> &Arc<HubConfig> {
        &self.config
    }

    /// Dispatch a unary call and serialize its result.
    pub async fn dispatch(&self, call: HubCall) -> ApiResult<Value> {
        match call {
            HubCall::Search(request) => to_value(self.search(request).await?),
            HubCall::GetBlock(param) => to_value(self.get_block(param).await?),
            HubCall::GetBlockHeader(param) => to_value(self.get_block_header(param).await?),
            HubCall::GetHeaders { start, end } => to_value(self.get_headers(start, end).await?),
            HubCall::GetServerHeight => Ok(json!(self.server_height())),
            HubCall::Ping => Ok(json!(self.ping())),
            HubCall::Version => Ok(json!(self.version())),
            HubCall::Features => Ok(json!(self.features())),
            HubCall::Banner => Ok(json!(self.banner())),
            HubCall::Broadcast { raw_tx } => Ok(json!(self.broadcast(&raw_tx).await?)),
            HubCall::SubscribeHeaders { .. } | HubCall::UnsubscribeHeaders { .. } => {
                Err(ApiError::invalid_request(format!(
                    "{} requires a WebSocket session",
                    call.method()
                )))
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // SEARCH
    // ═══════════════════════════════════════════════════════════════════════

    /// hub_search - Claim search through the search backend
    #[instrument(skip(self, request))]
    pub async fn search(&self, request: SearchRequest) -> ApiResult<SearchResults> {
        let mut query = request.into_query()?;
        query.censorship = self.config.censorship();

        let search = match (&self.search, self.config.toggles.search) {
            (Some(search), true) => search,
            _ => return Err(ApiError::resource_unavailable("search is disabled")),
        };

        let results = self
            .bounded("search", search.search(&query))
            .await?
            .map_err(ApiError::from)?;
        debug!(total = results.total, returned = results.txos.len(), "search complete");
        Ok(results)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // BLOCK DATA
    // ═══════════════════════════════════════════════════════════════════════

    /// hub_getBlock - Block by height or hash
    #[instrument(skip(self))]
    pub async fn get_block(&self, param: BlockParam) -> ApiResult<BlockRecord> {
        let selector = param.into_selector()?;
        self.bounded("get_block", self.store.block(selector.clone()))
            .await??
            .ok_or_else(|| not_found("block", &selector))
    }

    /// hub_getBlockHeader - Header by height or hash
    #[instrument(skip(self))]
    pub async fn get_block_header(&self, param: BlockParam) -> ApiResult<HeaderRecord> {
        let selector = param.into_selector()?;
        self.bounded("get_block_header", self.store.header(selector.clone()))
            .await??
            .ok_or_else(|| not_found("header", &selector))
    }

    /// hub_getHeaders - Bounded header range, `end` clamped to the tip
    #[instrument(skip(self))]
    pub async fn get_headers(
        &self,
        start: Height,
        end: Option<Height>,
    ) -> ApiResult<Vec<HeaderRecord>> {
        let Some(tip) = self.registry.tip_height() else {
            return Ok(Vec::new());
        };
        let end = end.unwrap_or(tip).min(tip);
        if start > tip {
            return Ok(Vec::new());
        }
        if end < start {
            return Err(ApiError::invalid_params(format!(
                "end height {} is below start height {}",
                end, start
            )));
        }
        let len = end - start + 1;
        let max = self.config.subscriptions.max_headers_per_request;
        if len > max {
            return Err(ApiError::invalid_params(format!(
                "range of {} headers exceeds the limit of {}",
                len, max
            )));
        }

        let headers = self
            .bounded("get_headers", self.store.headers(start, len as usize))
            .await??;
        if headers.len() as u64 != len {
            warn!(start, end, got = headers.len(), "store returned a short header range");
        }
        Ok(headers)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // SERVER INFO
    // ═══════════════════════════════════════════════════════════════════════

    /// hub_getServerHeight - Current tip, 0 before the first header
    pub fn server_height(&self) -> Height {
        self.registry.tip_height().unwrap_or(0)
    }

    pub fn ping(&self) -> &'static str {
        PING_REPLY
    }

    pub fn version(&self) -> &str {
        &self.config.features.server_version
    }

    pub fn banner(&self) -> &str {
        &self.config.banner
    }

    /// hub_features - Server features as a JSON-encoded string
    pub fn features(&self) -> String {
        let f = &self.config.features;
        json!({
            "hosts": {},
            "pruning": Value::Null,
            "chain": f.chain,
            "server_version": f.server_version,
            "protocol_min": f.protocol_min,
            "protocol_max": f.protocol_max,
            "genesis_hash": f.genesis_hash,
            "description": f.description,
            "payment_address": f.payment_address,
            "donation_address": f.donation_address,
            "daily_fee": f.daily_fee,
            "country": f.country,
            "hash_function": "sha256",
        })
        .to_string()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // TRANSACTIONS
    // ═══════════════════════════════════════════════════════════════════════

    /// hub_broadcast - Submit a raw transaction; returns the tip height
    ///
    /// Not idempotent. A timeout is reported as not retry-safe because the
    /// daemon may already have accepted the transaction.
    #[instrument(skip(self, raw_tx), fields(len = raw_tx.len()))]
    pub async fn broadcast(&self, raw_tx: &str) -> ApiResult<Height> {
        let payload = raw_tx.trim();
        let payload = payload.strip_prefix("0x").unwrap_or(payload);
        if payload.is_empty() {
            return Err(ApiError::invalid_params("empty transaction"));
        }
        let bytes = hex::decode(payload)?;

        let submitter = self.submitter.as_ref().ok_or_else(|| {
            ApiError::resource_unavailable("transaction submission is not configured")
        })?;

        let submit = submitter.submit(&bytes);
        let txid = match tokio::time::timeout(self.config.timeouts.request, submit).await {
            Ok(result) => result?,
            Err(_) => {
                warn!("broadcast timed out; submission state unknown");
                return Err(ApiError::timeout_not_retry_safe("broadcast"));
            }
        };
        debug!(%txid, "transaction submitted");
        Ok(self.server_height())
    }

    async fn bounded<T>(&self, operation: &str, fut: impl Future<Output = T>) -> ApiResult<T> {
        tokio::time::timeout(self.config.timeouts.request, fut)
            .await
            .map_err(|_| {
                warn!(operation, "collaborator call timed out");
                ApiError::timeout(operation)
            })
    }
}

fn not_found(what: &str, selector: &BlockSelector) -> ApiError {
    ApiError::resource_not_found(format!("{} {}", what, selector))
}

fn to_value<T: serde::Serialize>(value: T) -> ApiResult<Value> {
    serde_json::to_value(value).map_err(|e| ApiError::internal(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::SubscriptionConfig;
    use crate::domain::error::codes;
    use async_trait::async_trait;
    use hub_types::{
        build_chain, BlockHash, ClaimOutput, MemoryChainStore, SearchError, SearchQuery,
        StoreError, SubmitError,
    };
    use parking_lot::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingSearch {
        last: Mutex<Option<SearchQuery>>,
    }

    #[async_trait]
    impl SearchIndex for RecordingSearch {
        async fn search(&self, query: &SearchQuery) -> Result<SearchResults, SearchError> {
            *self.last.lock() = Some(query.clone());
            Ok(SearchResults {
                txos: vec![ClaimOutput {
                    tx_hash: "aa".repeat(32),
                    nout: 0,
                    height: 7,
                    claim_id: "c1".into(),
                    name: "cats".into(),
                    channel_id: None,
                }],
                total: 1,
                ..Default::default()
            })
        }
    }

    struct StallingSubmitter;

    #[async_trait]
    impl TxSubmitter for StallingSubmitter {
        async fn submit(&self, _raw_tx: &[u8]) -> Result<BlockHash, SubmitError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Err(SubmitError::Unavailable("unreachable".into()))
        }
    }

    struct RejectingSubmitter;

    #[async_trait]
    impl TxSubmitter for RejectingSubmitter {
        async fn submit(&self, raw_tx: &[u8]) -> Result<BlockHash, SubmitError> {
            if raw_tx == [0xde, 0xad] {
                Err(SubmitError::Rejected("bad-txns".into()))
            } else {
                Ok(BlockHash::digest(raw_tx))
            }
        }
    }

    struct StalledStore;

    #[async_trait]
    impl ChainStore for StalledStore {
        async fn tip(&self) -> Result<Option<hub_types::ChainHeader>, StoreError> {
            Ok(None)
        }
        async fn header(
            &self,
            _selector: BlockSelector,
        ) -> Result<Option<hub_types::ChainHeader>, StoreError> {
            std::future::pending().await
        }
        async fn headers(
            &self,
            _start: Height,
            _count: usize,
        ) -> Result<Vec<hub_types::ChainHeader>, StoreError> {
            std::future::pending().await
        }
        async fn block(
            &self,
            _selector: BlockSelector,
        ) -> Result<Option<hub_types::Block>, StoreError> {
            std::future::pending().await
        }
    }

    fn router_with(
        config: HubConfig,
        store: Arc<dyn ChainStore>,
        tip: Option<Height>,
    ) -> QueryRouter {
        let registry = Arc::new(SubscriptionRegistry::new(
            store.clone(),
            SubscriptionConfig::default(),
        ));
        if let Some(tip) = tip {
            registry.seed_tip(tip);
        }
        QueryRouter::new(Arc::new(config), registry, store)
    }

    fn router(tip: Height) -> (QueryRouter, Arc<MemoryChainStore>) {
        let store =
            Arc::new(MemoryChainStore::with_headers(build_chain(0, tip as usize + 1)).unwrap());
        (router_with(HubConfig::default(), store.clone(), Some(tip)), store)
    }

    #[tokio::test]
    async fn test_static_methods() {
        let (router, _) = router(42);
        assert_eq!(router.dispatch(HubCall::Ping).await.unwrap(), json!("Hello, world!"));
        assert_eq!(router.dispatch(HubCall::Version).await.unwrap(), json!("0.107.0"));
        assert_eq!(router.dispatch(HubCall::GetServerHeight).await.unwrap(), json!(42));

        let features = router.dispatch(HubCall::Features).await.unwrap();
        let parsed: Value = serde_json::from_str(features.as_str().unwrap()).unwrap();
        assert_eq!(parsed["description"], "Herald");
        assert_eq!(parsed["daily_fee"], "1.0");

        let banner = router.dispatch(HubCall::Banner).await.unwrap();
        assert!(banner.as_str().unwrap().contains("0.107.0"));
    }

    #[tokio::test]
    async fn test_server_height_before_first_header() {
        let store = Arc::new(MemoryChainStore::new());
        let router = router_with(HubConfig::default(), store, None);
        assert_eq!(router.server_height(), 0);
    }

    #[tokio::test]
    async fn test_get_block_header_found_and_missing() {
        let (router, store) = router(10);
        let header = router.get_block_header(BlockParam::Height(4)).await.unwrap();
        assert_eq!(header.height, 4);

        let by_hash = router
            .get_block_header(BlockParam::Hash(header.hash.to_hex()))
            .await
            .unwrap();
        assert_eq!(by_hash, header);

        let err = router.get_block_header(BlockParam::Height(99)).await.unwrap_err();
        assert_eq!(err.code, codes::RESOURCE_NOT_FOUND);

        store.set_offline(true);
        let err = router.get_block(BlockParam::Height(4)).await.unwrap_err();
        assert_eq!(err.code, codes::RESOURCE_UNAVAILABLE);
        assert_eq!(err.data, Some(json!({"retryable": true})));
    }

    #[tokio::test]
    async fn test_get_headers_clamps_and_validates() {
        let (router, _) = router(100);
        let headers = router.get_headers(95, Some(500)).await.unwrap();
        assert_eq!(
            headers.iter().map(|h| h.height).collect::<Vec<_>>(),
            (95..=100).collect::<Vec<_>>()
        );
        assert_eq!(router.get_headers(98, None).await.unwrap().len(), 3);
        assert!(router.get_headers(200, None).await.unwrap().is_empty());

        let err = router.get_headers(50, Some(40)).await.unwrap_err();
        assert_eq!(err.code, codes::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_get_headers_range_limit() {
        let store = Arc::new(MemoryChainStore::with_headers(build_chain(0, 50)).unwrap());
        let mut config = HubConfig::default();
        config.subscriptions.max_headers_per_request = 10;
        let router = router_with(config, store, Some(49));
        assert_eq!(router.get_headers(0, Some(9)).await.unwrap().len(), 10);
        let err = router.get_headers(0, Some(10)).await.unwrap_err();
        assert_eq!(err.code, codes::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_search_attaches_censorship() {
        let store = Arc::new(MemoryChainStore::new());
        let mut config = HubConfig::default();
        config.channels.blocking = vec!["blocked".into()];
        let search = Arc::new(RecordingSearch::default());
        let router = router_with(config, store, None).with_search(search.clone());

        let request: SearchRequest = serde_json::from_value(json!({"text": "cats"})).unwrap();
        let results = router.search(request).await.unwrap();
        assert_eq!(results.total, 1);

        let query = search.last.lock().clone().unwrap();
        assert_eq!(query.text.as_deref(), Some("cats"));
        assert_eq!(
            query.censorship.unwrap().blocked_channels,
            vec!["blocked".to_string()]
        );
    }

    #[tokio::test]
    async fn test_search_rejects_contradictory_selectors_before_backend() {
        let search = Arc::new(RecordingSearch::default());
        let store = Arc::new(MemoryChainStore::new());
        let router = router_with(HubConfig::default(), store, None).with_search(search.clone());

        let request: SearchRequest =
            serde_json::from_value(json!({"channel_id": "a", "channel_ids": ["b"]})).unwrap();
        let err = router.search(request).await.unwrap_err();
        assert_eq!(err.code, codes::INVALID_PARAMS);
        assert!(search.last.lock().is_none());
    }

    #[tokio::test]
    async fn test_search_disabled() {
        let (router, _) = router(1);
        let err = router.search(SearchRequest::default()).await.unwrap_err();
        assert_eq!(err.code, codes::RESOURCE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_broadcast() {
        let (router, _) = router(77);
        let router = router.with_submitter(Arc::new(RejectingSubmitter));

        assert_eq!(router.broadcast("0x00ff").await.unwrap(), 77);
        assert_eq!(
            router.broadcast("dead").await.unwrap_err().code,
            codes::TRANSACTION_REJECTED
        );
        assert_eq!(router.broadcast("").await.unwrap_err().code, codes::INVALID_PARAMS);
        assert_eq!(router.broadcast("zz").await.unwrap_err().code, codes::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_broadcast_without_submitter() {
        let (router, _) = router(1);
        let err = router.broadcast("00").await.unwrap_err();
        assert_eq!(err.code, codes::RESOURCE_UNAVAILABLE);
    }

    #[tokio::test(start_paused = true)]
    async fn test_broadcast_timeout_is_not_retry_safe() {
        let (router, _) = router(1);
        let router = router.with_submitter(Arc::new(StallingSubmitter));
        let err = router.broadcast("00").await.unwrap_err();
        assert_eq!(err.code, codes::TIMEOUT);
        assert_eq!(err.data, Some(json!({"retry_safe": false})));
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_timeout() {
        let router = router_with(HubConfig::default(), Arc::new(StalledStore), Some(5));
        let err = router.get_block_header(BlockParam::Height(1)).await.unwrap_err();
        assert_eq!(err.code, codes::TIMEOUT);
    }

    #[tokio::test]
    async fn test_subscription_methods_rejected() {
        let (router, _) = router(1);
        let err = router
            .dispatch(HubCall::SubscribeHeaders { start_height: None })
            .await
            .unwrap_err();
        assert_eq!(err.code, codes::INVALID_REQUEST);
    }
}
