use httpmock::MockServer;

/// Starts a local HTTP server that tests point `with_emulator_host` at.
/// Panics when no port can be bound; callers wrap it in `catch_unwind` and skip.
pub fn start_mock_server() -> MockServer {
    MockServer::start()
}
