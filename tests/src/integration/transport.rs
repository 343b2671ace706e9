//! # End-to-end Transport
//!
//! HTTP JSON-RPC and WebSocket sessions against a hub bound to an ephemeral
//! port.

#[cfg(test)]
mod tests {
    use crate::harness::{TestHub, WsClient};
    use hub_gateway::codes;
    use serde_json::{json, Value};
    use std::time::Duration;

    // =========================================================================
    // HTTP
    // =========================================================================

    #[tokio::test]
    async fn test_http_unary_calls() {
        let hub = TestHub::start(12).await;

        let ping = hub.http_call("hub_ping", json!([])).await;
        assert_eq!(ping["result"], "Hello, world!");

        let height = hub.http_call("hub_getServerHeight", json!([])).await;
        assert_eq!(height["result"], 12);

        let headers = hub.http_call("hub_getHeaders", json!([5, 7])).await;
        let heights: Vec<u64> = headers["result"]
            .as_array()
            .unwrap()
            .iter()
            .map(|h| h["height"].as_u64().unwrap())
            .collect();
        assert_eq!(heights, vec![5, 6, 7]);

        let header = hub.http_call("hub_getBlockHeader", json!([{ "height": 3 }])).await;
        assert_eq!(header["result"]["height"], 3);

        let missing = hub.http_call("hub_getBlock", json!([{ "height": 9999 }])).await;
        assert_eq!(missing["error"]["code"], codes::RESOURCE_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_http_reports_unavailable_backends() {
        let hub = TestHub::start(1).await;

        let search = hub.http_call("hub_search", json!([{ "text": "cats" }])).await;
        assert_eq!(search["error"]["code"], codes::RESOURCE_UNAVAILABLE);

        let broadcast = hub.http_call("hub_broadcast", json!(["deadbeef"])).await;
        assert_eq!(broadcast["error"]["code"], codes::RESOURCE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_http_rejects_subscriptions() {
        let hub = TestHub::start(4).await;
        let response = hub.http_call("hub_subscribeHeaders", json!([])).await;
        assert_eq!(response["error"]["code"], codes::INVALID_REQUEST);
        assert!(hub.registry.is_empty());
    }

    #[tokio::test]
    async fn test_health_reports_height_and_sessions() {
        let hub = TestHub::start(7).await;
        let mut client = WsClient::connect(&hub.ws_url()).await;
        client.call("hub_subscribeHeaders", json!([])).await;

        let health: Value = reqwest::get(hub.health_url())
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health["status"], "ok");
        assert_eq!(health["height"], 7);
        assert_eq!(health["sessions"], 1);
        assert_eq!(health["subscriptions"], 1);
    }

    // =========================================================================
    // WEBSOCKET SUBSCRIPTIONS
    // =========================================================================

    #[tokio::test]
    async fn test_ws_subscribe_backfill_then_live() {
        let hub = TestHub::start(20).await;
        let mut client = WsClient::connect(&hub.ws_url()).await;

        let response = client.call("hub_subscribeHeaders", json!([18])).await;
        let id = response["result"].as_str().unwrap().to_string();

        for expected in 18..=20 {
            let n = client.notification().await;
            assert_eq!(n["method"], "hub_subscription");
            assert_eq!(n["params"]["subscription"], id.as_str());
            assert_eq!(WsClient::height_of(&n), expected);
        }

        hub.advance(2).await;
        for expected in 21..=22 {
            let n = client.notification().await;
            assert_eq!(WsClient::height_of(&n), expected);
        }
    }

    #[tokio::test]
    async fn test_ws_unary_calls_during_subscription() {
        let hub = TestHub::start(10).await;
        let mut client = WsClient::connect(&hub.ws_url()).await;
        client.call("hub_subscribeHeaders", json!([])).await;

        let ping = client.call("hub_ping", json!([])).await;
        assert_eq!(ping["result"], "Hello, world!");

        hub.advance(1).await;
        let height = client.call("hub_getServerHeight", json!([])).await;
        assert_eq!(height["result"], 11);
        assert_eq!(WsClient::height_of(&client.notification().await), 11);
    }

    #[tokio::test]
    async fn test_ws_unsubscribe_stops_notifications() {
        let hub = TestHub::start(10).await;
        let mut client = WsClient::connect(&hub.ws_url()).await;

        let response = client.call("hub_subscribeHeaders", json!([])).await;
        let id = response["result"].clone();
        hub.wait_until(|| hub.registry.len() == 1).await;

        let response = client.call("hub_unsubscribeHeaders", json!([id])).await;
        assert_eq!(response["result"], true);
        assert!(hub.registry.is_empty());

        hub.advance(1).await;
        assert!(client.try_notification(Duration::from_millis(200)).await.is_none());

        let response = client.call("hub_unsubscribeHeaders", json!([])).await;
        assert_eq!(response["result"], false);
    }

    #[tokio::test]
    async fn test_ws_second_subscription_rejected() {
        let hub = TestHub::start(3).await;
        let mut client = WsClient::connect(&hub.ws_url()).await;

        client.call("hub_subscribeHeaders", json!([])).await;
        let second = client.call("hub_subscribeHeaders", json!([1])).await;
        assert_eq!(second["error"]["code"], codes::ALREADY_SUBSCRIBED);
        assert_eq!(hub.registry.len(), 1);
    }

    #[tokio::test]
    async fn test_ws_backfill_too_deep() {
        let hub = TestHub::start_with(100, |c| c.subscriptions.max_backfill = 10).await;
        let mut client = WsClient::connect(&hub.ws_url()).await;

        let response = client.call("hub_subscribeHeaders", json!([50])).await;
        assert_eq!(response["error"]["code"], codes::INVALID_PARAMS);
        assert!(hub.registry.is_empty());
    }

    #[tokio::test]
    async fn test_ws_get_headers_streams_then_counts() {
        let hub = TestHub::start(9).await;
        let mut client = WsClient::connect(&hub.ws_url()).await;

        let response = client.call("hub_getHeaders", json!([2, 4])).await;
        assert_eq!(response["result"]["count"], 3);

        for expected in 2..=4 {
            let n = client.notification().await;
            assert_eq!(n["method"], "hub_headers");
            assert_eq!(n["params"]["id"], response["id"]);
            assert_eq!(WsClient::height_of(&n), expected);
        }
    }

    // =========================================================================
    // CONNECTION LIFECYCLE
    // =========================================================================

    #[tokio::test]
    async fn test_ws_disconnect_releases_session() {
        let hub = TestHub::start(5).await;
        let mut client = WsClient::connect(&hub.ws_url()).await;
        client.call("hub_subscribeHeaders", json!([2])).await;
        assert_eq!(hub.service.session_count(), 1);

        client.close().await;
        hub.wait_until(|| hub.registry.is_empty() && hub.service.session_count() == 0)
            .await;
    }

    /// Sessions without a subscription are closed after the idle timeout;
    /// a subscribed session outlives it.
    #[tokio::test]
    async fn test_idle_session_closed_subscriber_kept() {
        let idle = Duration::from_millis(300);
        let hub = TestHub::start_with(3, |c| c.server.session_timeout = idle).await;

        let mut idle_client = WsClient::connect(&hub.ws_url()).await;
        idle_client.call("hub_ping", json!([])).await;
        let mut subscriber = WsClient::connect(&hub.ws_url()).await;
        subscriber.call("hub_subscribeHeaders", json!([])).await;

        idle_client.wait_closed().await;
        hub.wait_until(|| hub.service.session_count() == 1).await;

        tokio::time::sleep(idle * 3).await;
        assert_eq!(hub.service.session_count(), 1);
        hub.advance(1).await;
        assert_eq!(WsClient::height_of(&subscriber.notification().await), 4);
    }

    #[tokio::test]
    async fn test_ws_parse_error_keeps_connection() {
        let hub = TestHub::start(2).await;
        let mut client = WsClient::connect(&hub.ws_url()).await;

        client.send_text("{not json").await;
        let error = client.notification().await;
        assert_eq!(error["error"]["code"], codes::PARSE_ERROR);

        let ping = client.call("hub_ping", json!([])).await;
        assert_eq!(ping["result"], "Hello, world!");
    }

    #[tokio::test]
    async fn test_ws_batch_keeps_order() {
        let hub = TestHub::start(6).await;
        let mut client = WsClient::connect(&hub.ws_url()).await;

        client
            .send_text(
                json!([
                    { "jsonrpc": "2.0", "id": "a", "method": "hub_version" },
                    { "jsonrpc": "2.0", "id": "b", "method": "hub_nope" },
                ])
                .to_string(),
            )
            .await;
        let batch = client.notification().await;
        let items = batch.as_array().unwrap();
        assert_eq!(items[0]["result"], "0.107.0");
        assert_eq!(items[1]["error"]["code"], codes::METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_ws_object_params() {
        let hub = TestHub::start(6).await;
        let mut client = WsClient::connect(&hub.ws_url()).await;

        let response = client
            .call("hub_subscribeHeaders", json!({ "start_height": 5 }))
            .await;
        let id = response["result"].clone();
        for expected in 5..=6 {
            assert_eq!(WsClient::height_of(&client.notification().await), expected);
        }

        let response = client
            .call("hub_unsubscribeHeaders", json!({ "subscription": id }))
            .await;
        assert_eq!(response["result"], true);

        let response = client.call("hub_subscribeHeaders", json!({})).await;
        assert!(response["result"].is_string());
    }

    #[tokio::test]
    async fn test_session_limit_refuses_upgrade() {
        let hub = TestHub::start_with(1, |c| c.server.max_sessions = 1).await;
        let mut first = WsClient::connect(&hub.ws_url()).await;
        first.call("hub_ping", json!([])).await;

        let second = tokio_tungstenite::connect_async(hub.ws_url()).await;
        assert!(second.is_err());
    }

    /// Concurrent upgrades racing for the last slots never exceed the
    /// session limit.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_session_limit_holds_under_concurrent_upgrades() {
        let hub = TestHub::start_with(1, |c| c.server.max_sessions = 2).await;
        let url = hub.ws_url();

        let attempts = (0..8).map(|_| tokio_tungstenite::connect_async(url.clone()));
        let results = futures::future::join_all(attempts).await;
        let connected: Vec<_> = results.into_iter().filter_map(Result::ok).collect();

        assert_eq!(connected.len(), 2);
        hub.wait_until(|| hub.service.session_count() == 2).await;
    }
}
