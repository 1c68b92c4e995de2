//! Mock-server setup shared by the socket-bound test files.

use std::net::TcpListener;

use wiremock::MockServer;

/// Set to `1` to fail, rather than skip, when no localhost socket can be bound.
const REQUIRE_SOCKETS_ENV: &str = "FETCHER_REQUIRE_SOCKET_TESTS";

/// Starts a mock server, or returns `None` in sandboxes without localhost sockets.
pub async fn mock_server() -> Option<MockServer> {
    if TcpListener::bind("127.0.0.1:0").is_ok() {
        return Some(MockServer::start().await);
    }
    assert!(
        std::env::var(REQUIRE_SOCKETS_ENV).as_deref() != Ok("1"),
        "cannot bind a localhost socket and {REQUIRE_SOCKETS_ENV}=1"
    );
    eprintln!("cannot bind a localhost socket; skipping mock-server test");
    None
}

/// Yields a running mock server or returns early from the calling test.
macro_rules! require_mock_server {
    () => {
        match crate::support::mock_server().await {
            Some(server) => server,
            None => return,
        }
    };
}
