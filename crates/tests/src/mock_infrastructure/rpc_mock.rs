//! Mockito wrapper with JSON-RPC-shaped response builders.
//!
//! Mocks match on the `method` field in the POSTed body, so one upstream can
//! stub several methods at once. Hit counts are asserted through the returned
//! [`Mock`] handles.

use mockito::{Matcher, Mock, Server, ServerGuard};
use serde_json::{json, Value};
use std::time::Duration;

/// One mock upstream endpoint.
pub struct MockUpstream {
    server: ServerGuard,
}

/// Builds a full JSON-RPC success envelope.
#[must_use]
pub fn rpc_result(result: Value) -> Value {
    json!({"jsonrpc": "2.0", "id": 1, "result": result})
}

/// Builds a full JSON-RPC error envelope.
#[must_use]
pub fn rpc_error(code: i64, message: &str) -> Value {
    json!({"jsonrpc": "2.0", "id": 1, "error": {"code": code, "message": message}})
}

impl MockUpstream {
    pub async fn start() -> Self {
        Self { server: Server::new_async().await }
    }

    #[must_use]
    pub fn url(&self) -> String {
        self.server.url()
    }

    fn method_matcher(method: &str) -> Matcher {
        Matcher::Regex(format!(r#""method"\s*:\s*"{method}""#))
    }

    /// Stubs `method` with a JSON-RPC envelope, expecting exactly `hits`
    /// calls.
    pub async fn respond_to(&mut self, method: &str, envelope: &Value, hits: usize) -> Mock {
        self.server
            .mock("POST", "/")
            .match_body(Self::method_matcher(method))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(envelope.to_string())
            .expect(hits)
            .create_async()
            .await
    }

    /// Stubs `method` without a hit expectation (background probes etc.).
    pub async fn respond_to_any_count(&mut self, method: &str, envelope: &Value) -> Mock {
        self.server
            .mock("POST", "/")
            .match_body(Self::method_matcher(method))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(envelope.to_string())
            .expect_at_least(0)
            .create_async()
            .await
    }

    /// Stubs requests whose body matches `body_regex`, expecting exactly
    /// `hits` calls.
    pub async fn respond_matching(
        &mut self,
        body_regex: &str,
        envelope: &Value,
        hits: usize,
    ) -> Mock {
        self.server
            .mock("POST", "/")
            .match_body(Matcher::Regex(body_regex.to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(envelope.to_string())
            .expect(hits)
            .create_async()
            .await
    }

    /// Stubs every request with an HTTP status, expecting exactly `hits`
    /// calls.
    pub async fn respond_status(&mut self, status: usize, hits: usize) -> Mock {
        self.server
            .mock("POST", "/")
            .with_status(status)
            .expect(hits)
            .create_async()
            .await
    }

    /// Stubs `method` with a response delayed by `delay`, expecting exactly
    /// `hits` calls. Used to hold a flight open while duplicates pile up.
    pub async fn respond_slow(
        &mut self,
        method: &str,
        envelope: &Value,
        delay: Duration,
        hits: usize,
    ) -> Mock {
        let body = envelope.to_string().into_bytes();
        self.server
            .mock("POST", "/")
            .match_body(Self::method_matcher(method))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_chunked_body(move |writer| {
                std::thread::sleep(delay);
                writer.write_all(&body)
            })
            .expect(hits)
            .create_async()
            .await
    }
}
