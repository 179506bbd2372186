//! Dispatcher invariants: batch shape, ordering, id echoing, and per-item
//! error isolation.

use crate::mock_infrastructure::{
    rpc_mock::{rpc_error, rpc_result},
    Harness, MockUpstream, NETWORK,
};
use serde_json::{json, Value};

#[tokio::test]
async fn empty_batch_yields_empty_array() {
    let harness = Harness::new("http://127.0.0.1:1", None);

    let outcome = harness.dispatcher.dispatch(json!([]), NETWORK).await;

    assert_eq!(outcome.body, json!([]));
    assert_eq!(outcome.cache_header, "MISS");
}

#[tokio::test]
async fn batch_preserves_length_order_and_ids() {
    let mut primary = MockUpstream::start().await;
    let _chain = primary.respond_to_any_count("eth_chainId", &rpc_result(json!("0x1"))).await;
    let _net = primary.respond_to_any_count("net_version", &rpc_result(json!("1"))).await;
    let _gas = primary.respond_to_any_count("eth_gasPrice", &rpc_result(json!("0x5f5e100"))).await;

    let harness = Harness::new(&primary.url(), None);

    let batch = json!([
        {"jsonrpc": "2.0", "method": "eth_chainId", "params": [], "id": 1},
        {"jsonrpc": "2.0", "method": "net_version", "params": [], "id": "two"},
        {"jsonrpc": "2.0", "method": "eth_gasPrice", "params": [], "id": 3},
    ]);

    let outcome = harness.dispatcher.dispatch(batch, NETWORK).await;
    let responses = outcome.body.as_array().expect("array response");

    assert_eq!(responses.len(), 3);
    assert_eq!(responses[0]["id"], json!(1));
    assert_eq!(responses[0]["result"], json!("0x1"));
    assert_eq!(responses[1]["id"], json!("two"));
    assert_eq!(responses[1]["result"], json!("1"));
    assert_eq!(responses[2]["id"], json!(3));
    assert_eq!(responses[2]["result"], json!("0x5f5e100"));
}

#[tokio::test]
async fn failing_item_does_not_abort_the_batch() {
    let mut primary = MockUpstream::start().await;
    let _chain = primary.respond_to_any_count("eth_chainId", &rpc_result(json!("0x1"))).await;
    let _net = primary.respond_to_any_count("net_version", &rpc_result(json!("1"))).await;
    let _unknown = primary
        .respond_to_any_count("eth_unknown", &rpc_error(-32601, "Method not found"))
        .await;

    let harness = Harness::new(&primary.url(), None);

    let batch = json!([
        {"jsonrpc": "2.0", "method": "eth_chainId", "params": [], "id": 1},
        {"jsonrpc": "2.0", "method": "eth_unknown", "params": [], "id": 2},
        {"jsonrpc": "2.0", "method": "net_version", "params": [], "id": 3},
    ]);

    let outcome = harness.dispatcher.dispatch(batch, NETWORK).await;
    let responses = outcome.body.as_array().expect("array response");

    assert_eq!(responses.len(), 3);
    assert!(responses[0].get("result").is_some());
    assert_eq!(responses[1]["error"]["code"], json!(-32601));
    assert_eq!(responses[1]["id"], json!(2));
    assert!(responses[2].get("result").is_some());
}

#[tokio::test]
async fn malformed_item_gets_error_at_its_position() {
    let mut primary = MockUpstream::start().await;
    let _chain = primary.respond_to_any_count("eth_chainId", &rpc_result(json!("0x1"))).await;

    let harness = Harness::new(&primary.url(), None);

    let batch = json!([
        {"jsonrpc": "2.0", "method": "eth_chainId", "params": [], "id": 1},
        {"not": "a request", "id": 2},
    ]);

    let outcome = harness.dispatcher.dispatch(batch, NETWORK).await;
    let responses = outcome.body.as_array().expect("array response");

    assert_eq!(responses.len(), 2);
    assert_eq!(responses[1]["error"]["code"], json!(-32600));
    assert_eq!(responses[1]["id"], json!(2));
}

#[tokio::test]
async fn wrong_version_is_rejected_per_item() {
    let harness = Harness::new("http://127.0.0.1:1", None);

    let batch = json!([
        {"jsonrpc": "1.0", "method": "eth_chainId", "params": [], "id": 1},
    ]);

    let outcome = harness.dispatcher.dispatch(batch, NETWORK).await;
    let responses = outcome.body.as_array().expect("array response");

    assert_eq!(responses[0]["error"]["code"], json!(-32600));
}

#[tokio::test]
async fn notification_in_batch_still_gets_a_positional_response() {
    let mut primary = MockUpstream::start().await;
    let _chain = primary.respond_to_any_count("eth_chainId", &rpc_result(json!("0x1"))).await;
    let _net = primary.respond_to_any_count("net_version", &rpc_result(json!("1"))).await;

    let harness = Harness::new(&primary.url(), None);

    let batch = json!([
        {"jsonrpc": "2.0", "method": "eth_chainId", "params": []},
        {"jsonrpc": "2.0", "method": "net_version", "params": [], "id": 5},
    ]);

    let outcome = harness.dispatcher.dispatch(batch, NETWORK).await;
    let responses = outcome.body.as_array().expect("array response");

    // the id-less notification is answered at its index with a null id
    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0]["id"], Value::Null);
    assert_eq!(responses[0]["result"], json!("0x1"));
    assert_eq!(responses[1]["id"], json!(5));
}

#[tokio::test]
async fn single_request_passes_through_unwrapped() {
    let mut primary = MockUpstream::start().await;
    let _chain = primary.respond_to_any_count("eth_chainId", &rpc_result(json!("0x1"))).await;

    let harness = Harness::new(&primary.url(), None);

    let outcome = harness
        .dispatcher
        .dispatch(json!({"jsonrpc": "2.0", "method": "eth_chainId", "params": [], "id": 9}), NETWORK)
        .await;

    assert!(outcome.body.is_object());
    assert_eq!(outcome.body["id"], json!(9));
    assert_eq!(outcome.body["result"], json!("0x1"));
    assert_eq!(outcome.cache_header, "MISS");
}

#[tokio::test]
async fn batch_cache_header_aggregates_to_partial() {
    let mut primary = MockUpstream::start().await;
    let _chain = primary.respond_to_any_count("eth_chainId", &rpc_result(json!("0x1"))).await;
    let _net = primary.respond_to_any_count("net_version", &rpc_result(json!("1"))).await;

    let harness = Harness::new(&primary.url(), None);

    // prime the cache
    let _ = harness
        .dispatcher
        .dispatch(json!({"jsonrpc": "2.0", "method": "eth_chainId", "params": [], "id": 1}), NETWORK)
        .await;

    let outcome = harness
        .dispatcher
        .dispatch(
            json!([
                {"jsonrpc": "2.0", "method": "eth_chainId", "params": [], "id": 2},
                {"jsonrpc": "2.0", "method": "net_version", "params": [], "id": 3},
            ]),
            NETWORK,
        )
        .await;

    assert_eq!(outcome.cache_header, "PARTIAL");
}

#[tokio::test]
async fn duplicate_items_in_one_batch_share_an_upstream_call() {
    let mut primary = MockUpstream::start().await;
    let mock = primary.respond_to("eth_chainId", &rpc_result(json!("0x1")), 1).await;

    let harness = Harness::new(&primary.url(), None);

    let batch = json!([
        {"jsonrpc": "2.0", "method": "eth_chainId", "params": [], "id": 1},
        {"jsonrpc": "2.0", "method": "eth_chainId", "params": [], "id": 2},
        {"jsonrpc": "2.0", "method": "eth_chainId", "params": [], "id": 3},
    ]);

    let outcome = harness.dispatcher.dispatch(batch, NETWORK).await;
    let responses = outcome.body.as_array().expect("array response");

    for (i, response) in responses.iter().enumerate() {
        assert_eq!(response["result"], json!("0x1"), "item {i}");
    }
    assert_eq!(responses[0]["id"], json!(1));
    assert_eq!(responses[1]["id"], json!(2));
    assert_eq!(responses[2]["id"], json!(3));

    mock.assert_async().await;
}
