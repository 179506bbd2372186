//! End-to-end pipeline scenarios against mock upstreams.
//!
//! Each test wires a fresh pipeline to one or two mockito servers playing
//! the primary (`P`) and archive fallback (`F`) roles, then asserts on both
//! the responses and the exact number of upstream POSTs.

use crate::mock_infrastructure::{
    request,
    rpc_mock::{rpc_error, rpc_result},
    test_helpers::HarnessOptions,
    Harness, MockUpstream, NETWORK,
};
use serde_json::json;
use std::time::Duration;

#[tokio::test]
async fn cache_miss_then_hit_makes_one_upstream_call() {
    let mut primary = MockUpstream::start().await;
    let mock = primary.respond_to("eth_chainId", &rpc_result(json!("0x1")), 1).await;

    let harness = Harness::new(&primary.url(), None);

    let first = harness
        .pipeline
        .process(request("eth_chainId", json!([]), json!(1)), NETWORK)
        .await;
    assert_eq!(first.result, Some(json!("0x1")));
    assert_eq!(*first.id, json!(1));

    let second = harness
        .pipeline
        .process(request("eth_chainId", json!([]), json!(2)), NETWORK)
        .await;
    assert_eq!(second.result, Some(json!("0x1")));
    assert_eq!(*second.id, json!(2));

    // exactly one POST reached the upstream
    mock.assert_async().await;
    assert_eq!(harness.stats.snapshot().cache_hits, 1);
}

#[tokio::test]
async fn params_omitted_and_empty_share_a_cache_entry() {
    let mut primary = MockUpstream::start().await;
    let mock = primary.respond_to("eth_gasPrice", &rpc_result(json!("0x3b9aca00")), 1).await;

    let harness = Harness::new(&primary.url(), None);

    let with_empty = harness
        .pipeline
        .process(request("eth_gasPrice", json!([]), json!(1)), NETWORK)
        .await;
    let with_absent = harness
        .pipeline
        .process(request("eth_gasPrice", json!(null), json!(2)), NETWORK)
        .await;

    assert_eq!(with_empty.result, with_absent.result);
    mock.assert_async().await;
}

#[tokio::test]
async fn null_result_triggers_archive_fallback() {
    let mut primary = MockUpstream::start().await;
    let mut fallback = MockUpstream::start().await;

    let log = json!({"address": "0x1", "blockNumber": "0x10", "logIndex": "0x0"});
    let p_mock = primary.respond_to("eth_getLogs", &rpc_result(json!(null)), 1).await;
    let f_mock = fallback.respond_to("eth_getLogs", &rpc_result(json!([log.clone()])), 1).await;

    let harness = Harness::new(&primary.url(), Some(&fallback.url()));

    let response = harness
        .pipeline
        .process(
            request("eth_getLogs", json!([{"fromBlock": "0x1", "toBlock": "0x20"}]), json!(7)),
            NETWORK,
        )
        .await;

    assert_eq!(response.result, Some(json!([log])));
    assert_eq!(*response.id, json!(7));
    p_mock.assert_async().await;
    f_mock.assert_async().await;
    assert_eq!(harness.stats.snapshot().fallback_calls, 1);
}

#[tokio::test]
async fn error_pattern_triggers_fallback_and_result_is_cached() {
    let mut primary = MockUpstream::start().await;
    let mut fallback = MockUpstream::start().await;

    let p_mock = primary
        .respond_to("eth_getBalance", &rpc_error(-32000, "block not found"), 1)
        .await;
    let f_mock = fallback
        .respond_to("eth_getBalance", &rpc_result(json!("0xdeadbeef")), 1)
        .await;

    let harness = Harness::new(&primary.url(), Some(&fallback.url()));

    let response = harness
        .pipeline
        .process(request("eth_getBalance", json!(["0xabc", "0x10"]), json!(9)), NETWORK)
        .await;
    assert_eq!(response.result, Some(json!("0xdeadbeef")));

    // the fallback's answer was cached under the request fingerprint:
    // a repeat is served without any further upstream traffic
    let repeat = harness
        .pipeline
        .process(request("eth_getBalance", json!(["0xabc", "0x10"]), json!(10)), NETWORK)
        .await;
    assert_eq!(repeat.result, Some(json!("0xdeadbeef")));
    assert_eq!(*repeat.id, json!(10));

    p_mock.assert_async().await;
    f_mock.assert_async().await;
}

#[tokio::test]
async fn successful_primary_never_contacts_fallback() {
    let mut primary = MockUpstream::start().await;
    let mut fallback = MockUpstream::start().await;

    let p_mock = primary.respond_to("eth_getBalance", &rpc_result(json!("0x64")), 1).await;
    let f_mock = fallback.respond_status(200, 0).await;

    let harness = Harness::new(&primary.url(), Some(&fallback.url()));

    let response = harness
        .pipeline
        .process(request("eth_getBalance", json!(["0xabc", "latest"]), json!(1)), NETWORK)
        .await;

    assert_eq!(response.result, Some(json!("0x64")));
    p_mock.assert_async().await;
    f_mock.assert_async().await;
    assert_eq!(harness.stats.snapshot().fallback_calls, 0);
}

#[tokio::test]
async fn protocol_error_without_archive_pattern_is_forwarded_verbatim() {
    let mut primary = MockUpstream::start().await;
    let mut fallback = MockUpstream::start().await;

    let p_mock = primary
        .respond_to("eth_call", &rpc_error(-32000, "execution reverted"), 1)
        .await;
    let f_mock = fallback.respond_status(200, 0).await;

    let harness = Harness::new(&primary.url(), Some(&fallback.url()));

    let response = harness
        .pipeline
        .process(request("eth_call", json!([{"to": "0x1"}, "0x10"]), json!(3)), NETWORK)
        .await;

    let error = response.error.expect("forwarded rpc error");
    assert_eq!(error.code, -32000);
    assert_eq!(error.message, "execution reverted");
    p_mock.assert_async().await;
    f_mock.assert_async().await;
}

#[tokio::test]
async fn breaker_opens_after_consecutive_failures() {
    let mut primary = MockUpstream::start().await;
    // five failing requests reach the upstream; the sixth must not
    let mock = primary.respond_status(500, 5).await;

    let harness = Harness::with_options(
        &primary.url(),
        None,
        HarnessOptions { retries: 0, failure_threshold: 5, ..HarnessOptions::default() },
    );

    for i in 0..5 {
        let response = harness
            .pipeline
            .process(
                request("eth_getBalance", json!([format!("0x{i}"), "0x10"]), json!(i)),
                NETWORK,
            )
            .await;
        let error = response.error.expect("upstream failure");
        assert_eq!(error.code, -32000);
        assert_eq!(error.message, "Upstream error");
    }

    let rejected = harness
        .pipeline
        .process(request("eth_getBalance", json!(["0xff", "0x10"]), json!(6)), NETWORK)
        .await;
    let error = rejected.error.expect("breaker rejection");
    assert_eq!(error.code, -32000);
    assert_eq!(error.message, "Upstream unavailable");

    mock.assert_async().await;
    assert_eq!(harness.stats.snapshot().breaker_rejections, 1);
}

#[tokio::test]
async fn concurrent_identical_requests_coalesce_into_one_call() {
    let mut primary = MockUpstream::start().await;
    let block = json!({"number": "0x10", "hash": "0xabc"});
    let mock = primary
        .respond_slow(
            "eth_getBlockByHash",
            &rpc_result(block.clone()),
            Duration::from_millis(300),
            1,
        )
        .await;

    let harness = Harness::new(&primary.url(), None);

    let mut tasks = Vec::new();
    for i in 0..8 {
        let pipeline = std::sync::Arc::clone(&harness.pipeline);
        tasks.push(tokio::spawn(async move {
            pipeline
                .process(
                    request("eth_getBlockByHash", json!(["0xabc", false]), json!(i)),
                    NETWORK,
                )
                .await
        }));
    }

    for (i, task) in tasks.into_iter().enumerate() {
        let response = task.await.expect("task join");
        assert_eq!(response.result, Some(block.clone()), "waiter {i}");
        assert_eq!(*response.id, json!(i));
    }

    mock.assert_async().await;
    let snapshot = harness.stats.snapshot();
    assert_eq!(snapshot.upstream_calls, 1);
    assert_eq!(snapshot.coalesced, 7);
}

#[tokio::test]
async fn fresh_block_cache_rewrites_latest_for_eth_call() {
    let mut primary = MockUpstream::start().await;
    // the upstream must see the concrete hex tag, not "latest"
    let mock = primary
        .respond_matching(r#""params"\s*:\s*\[.*"0x112a880"\]"#, &rpc_result(json!("0x01")), 1)
        .await;

    let harness = Harness::new(&primary.url(), None);
    harness.block_numbers.record(NETWORK, 0x0112_a880);

    let first = harness
        .pipeline
        .process(request("eth_call", json!([{"to": "0x1"}, "latest"]), json!(1)), NETWORK)
        .await;
    assert_eq!(first.result, Some(json!("0x01")));

    // second "latest" call inside the freshness window shares the entry
    let second = harness
        .pipeline
        .process(request("eth_call", json!([{"to": "0x1"}, "latest"]), json!(2)), NETWORK)
        .await;
    assert_eq!(second.result, Some(json!("0x01")));

    mock.assert_async().await;
    assert_eq!(harness.stats.snapshot().cache_hits, 1);
}

#[tokio::test]
async fn cold_block_cache_forwards_latest_unchanged() {
    let mut primary = MockUpstream::start().await;
    let mock = primary
        .respond_matching(r#""params"\s*:\s*\[.*"latest"\]"#, &rpc_result(json!("0x02")), 1)
        .await;

    let harness = Harness::new(&primary.url(), None);

    let response = harness
        .pipeline
        .process(request("eth_call", json!([{"to": "0x1"}, "latest"]), json!(1)), NETWORK)
        .await;

    assert_eq!(response.result, Some(json!("0x02")));
    mock.assert_async().await;
}

#[tokio::test]
async fn problematic_responses_are_never_cached() {
    let mut primary = MockUpstream::start().await;
    // empty array result: served to the client but kept out of the cache,
    // so the second request goes upstream again
    let mock = primary.respond_to("eth_getLogs", &rpc_result(json!([])), 2).await;

    let harness = Harness::new(&primary.url(), None);
    let params = json!([{"fromBlock": "0x1", "toBlock": "0x2"}]);

    let first = harness
        .pipeline
        .process(request("eth_getLogs", params.clone(), json!(1)), NETWORK)
        .await;
    assert_eq!(first.result, Some(json!([])));

    let second = harness
        .pipeline
        .process(request("eth_getLogs", params, json!(2)), NETWORK)
        .await;
    assert_eq!(second.result, Some(json!([])));

    mock.assert_async().await;
    assert_eq!(harness.stats.snapshot().cache_hits, 0);
}

#[tokio::test]
async fn non_cacheable_methods_bypass_the_store() {
    let mut primary = MockUpstream::start().await;
    let mock = primary
        .respond_to("eth_getTransactionCount", &rpc_result(json!("0x5")), 2)
        .await;

    let harness = Harness::new(&primary.url(), None);

    for id in 0..2 {
        let response = harness
            .pipeline
            .process(
                request("eth_getTransactionCount", json!(["0xabc", "latest"]), json!(id)),
                NETWORK,
            )
            .await;
        assert_eq!(response.result, Some(json!("0x5")));
    }

    mock.assert_async().await;
    assert_eq!(harness.pipeline.cache().len(), 0);
}

#[tokio::test]
async fn transport_failure_surfaces_as_upstream_error() {
    // closed port: connection refused immediately
    let harness = Harness::with_options(
        "http://127.0.0.1:1",
        None,
        HarnessOptions { retries: 0, ..HarnessOptions::default() },
    );

    let response = harness
        .pipeline
        .process(request("eth_chainId", json!([]), json!(1)), NETWORK)
        .await;

    let error = response.error.expect("transport failure");
    assert_eq!(error.code, -32000);
    assert_eq!(error.message, "Upstream error");
    assert!(error.data.is_some());
    // errors never pollute the cache
    assert_eq!(harness.pipeline.cache().len(), 0);
}

#[tokio::test]
async fn fallback_failure_is_reported_to_the_caller() {
    let mut primary = MockUpstream::start().await;
    let p_mock = primary
        .respond_to("eth_getTransactionReceipt", &rpc_result(json!(null)), 1)
        .await;

    // fallback on a closed port: the single fallback attempt fails and the
    // caller sees the failure, with no second fallback try
    let harness = Harness::with_options(
        &primary.url(),
        Some("http://127.0.0.1:1"),
        HarnessOptions { retries: 0, ..HarnessOptions::default() },
    );

    let response = harness
        .pipeline
        .process(request("eth_getTransactionReceipt", json!(["0xdead"]), json!(4)), NETWORK)
        .await;

    let error = response.error.expect("fallback failure");
    assert_eq!(error.code, -32000);
    p_mock.assert_async().await;
    assert_eq!(harness.stats.snapshot().fallback_calls, 1);
}
