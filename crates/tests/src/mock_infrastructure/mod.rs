//! Reusable test infrastructure: mockito upstream mocks and a pipeline
//! harness wired to them.

pub mod rpc_mock;
pub mod test_helpers;

pub use rpc_mock::MockUpstream;
pub use test_helpers::{request, Harness, NETWORK};
