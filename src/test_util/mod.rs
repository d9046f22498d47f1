//! Test-only helpers: port allocation, blackhole HTTP servers, and mocks
//! of the federation source, authorize endpoint, and upload sink used by
//! the integration tests under `tests/`.

pub mod addr;
pub mod authorize_mock;
pub mod federate_mock;
pub mod http;
pub mod simulate_metrics;
pub mod upload_mock;

use std::net::SocketAddr;
use std::time::Duration;

/// Polls `addr` until a TCP connection succeeds or the deadline passes.
pub async fn wait_for_tcp(addr: SocketAddr) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if tokio::net::TcpStream::connect(addr).await.is_ok() {
            return;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {addr} to accept connections");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
