//! `test-utils` is used for testing in both `sitegate-lib` and `sitegate-bin`.
//! This crate does not depend on `sitegate-lib` or `sitegate`, else we would get dependency cycles.
//! Macros are used instead, so that the importer is responsible for providing the dependencies.

/// Create a mock web server, which responds with a predefined status when
/// handling a matching request
#[macro_export]
macro_rules! mock_server {
    ($status:expr $(, $func:tt ($($arg:expr),*))*) => {{
        let mock_server = wiremock::MockServer::start().await;
        let response_template = wiremock::ResponseTemplate::new(http::StatusCode::from($status));
        let template = response_template$(.$func($($arg),*))*;
        wiremock::Mock::given(wiremock::matchers::method("GET")).respond_with(template).mount(&mock_server).await;
        mock_server
    }};
}

/// Create a mock web server which rate limits the first request with the
/// given status and `Retry-After` value, and answers every later request
/// with `200 OK`.
///
/// The server expects exactly two requests: the limited one and the retry.
#[macro_export]
macro_rules! rate_limited_mock_server {
    ($status:expr, $retry_after:expr) => {{
        let mock_server = wiremock::MockServer::start().await;
        let limited = wiremock::ResponseTemplate::new(http::StatusCode::from($status))
            .insert_header("Retry-After", $retry_after);
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(limited)
            .up_to_n_times(1)
            .expect(1)
            .mount(&mock_server)
            .await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(wiremock::ResponseTemplate::new(http::StatusCode::OK))
            .expect(1)
            .mount(&mock_server)
            .await;
        mock_server
    }};
}

/// Helper to get a file path inside a temporary directory, creating the
/// file with `$content`
#[macro_export]
macro_rules! temp_file {
    ($dir:expr, $name:expr, $content:expr) => {{
        let path = $dir.path().join($name);
        std::fs::write(&path, $content).expect("Expected to write temporary file");
        path
    }};
}
