#[cfg(test)]
mod cli {
    use assert_cmd::cargo::cargo_bin_cmd;
    use http::StatusCode;
    use predicates::str::contains;
    use std::{
        error::Error,
        time::{Duration, Instant},
    };
    use tempfile::tempdir;
    use test_utils::{mock_server, rate_limited_mock_server, temp_file};

    type Result<T> = std::result::Result<T, Box<dyn Error>>;

    #[tokio::test]
    async fn test_fetch_prints_status() -> Result<()> {
        let mock_server = mock_server!(StatusCode::OK);

        cargo_bin_cmd!()
            .arg(mock_server.uri())
            .assert()
            .success()
            .stdout(contains(format!("200 {}", mock_server.uri())));

        Ok(())
    }

    #[tokio::test]
    async fn test_same_host_is_spaced() -> Result<()> {
        let mock_server = mock_server!(StatusCode::OK);

        let start = Instant::now();
        cargo_bin_cmd!()
            .arg("--min-spacing")
            .arg("500ms")
            .arg(format!("{}/first", mock_server.uri()))
            .arg(format!("{}/second", mock_server.uri()))
            .assert()
            .success()
            .stdout(contains("/first"))
            .stdout(contains("/second"));

        assert!(start.elapsed() >= Duration::from_millis(500));
        Ok(())
    }

    #[tokio::test]
    async fn test_retry_after_is_honored() -> Result<()> {
        let mock_server = rate_limited_mock_server!(StatusCode::TOO_MANY_REQUESTS, "1");

        let start = Instant::now();
        cargo_bin_cmd!()
            .arg("--min-spacing")
            .arg("0s")
            .arg(mock_server.uri())
            .assert()
            .success()
            .stdout(contains(format!("200 {}", mock_server.uri())));

        assert!(start.elapsed() >= Duration::from_secs(1));
        Ok(())
    }

    #[tokio::test]
    async fn test_config_file() -> Result<()> {
        let mock_server = mock_server!(StatusCode::OK);
        let dir = tempdir()?;
        let config = temp_file!(
            dir,
            "pacing.toml",
            "min_spacing = \"600ms\"\npermits = 10\nperiod = \"1s\"\n"
        );

        let start = Instant::now();
        cargo_bin_cmd!()
            .arg("--config")
            .arg(&config)
            .arg(format!("{}/a", mock_server.uri()))
            .arg(format!("{}/b", mock_server.uri()))
            .assert()
            .success();

        assert!(start.elapsed() >= Duration::from_millis(600));
        Ok(())
    }

    #[test]
    fn test_invalid_config_file() -> Result<()> {
        let dir = tempdir()?;
        let config = temp_file!(dir, "broken.toml", "request_interval = \"1s\"\n");

        cargo_bin_cmd!()
            .arg("--config")
            .arg(&config)
            .arg("https://example.com")
            .assert()
            .failure()
            .code(3)
            .stderr(contains("Cannot load configuration file"));

        Ok(())
    }

    #[test]
    fn test_default_config_file_is_loaded() -> Result<()> {
        let dir = tempdir()?;
        temp_file!(dir, "sitegate.toml", "permits = 0\n");

        cargo_bin_cmd!()
            .current_dir(dir.path())
            .arg("https://example.com")
            .assert()
            .failure()
            .code(3);

        Ok(())
    }

    #[tokio::test]
    async fn test_verbosity_from_config_file() -> Result<()> {
        let mock_server = mock_server!(StatusCode::OK);
        let dir = tempdir()?;
        temp_file!(
            dir,
            "sitegate.toml",
            "verbose = \"debug\"\nmin_spacing = \"300ms\"\n"
        );

        cargo_bin_cmd!()
            .current_dir(dir.path())
            .env_remove("RUST_LOG")
            .arg(format!("{}/a", mock_server.uri()))
            .arg(format!("{}/b", mock_server.uri()))
            .assert()
            .success()
            .stderr(contains("[DEBUG] Waiting"));

        Ok(())
    }

    #[test]
    fn test_zero_permits_is_rejected() {
        cargo_bin_cmd!()
            .arg("--permits")
            .arg("0")
            .arg("https://example.com")
            .assert()
            .failure()
            .code(3)
            .stderr(contains("Invalid pacing configuration"));
    }

    #[test]
    fn test_unreachable_host_fails() {
        cargo_bin_cmd!()
            .arg("--timeout")
            .arg("5")
            .arg("http://127.0.0.1:1/")
            .assert()
            .failure()
            .code(2)
            .stderr(contains("http://127.0.0.1:1/"));
    }

    #[test]
    fn test_invalid_url_fails() {
        cargo_bin_cmd!()
            .arg("not a url")
            .assert()
            .failure()
            .code(2)
            .stderr(contains("not a url"));
    }

    #[tokio::test]
    async fn test_host_stats() -> Result<()> {
        let mock_server = mock_server!(StatusCode::OK);

        cargo_bin_cmd!()
            .arg("--host-stats")
            .arg("--min-spacing")
            .arg("0s")
            .arg(mock_server.uri())
            .assert()
            .success()
            .stdout(contains("Per-host statistics"))
            .stdout(contains("127.0.0.1"))
            .stdout(contains("1 requests (0 rate limited, 0 retried)"));

        Ok(())
    }

    #[tokio::test]
    async fn test_custom_header() -> Result<()> {
        let mock_server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::header("x-reader", "sitegate"))
            .respond_with(wiremock::ResponseTemplate::new(204))
            .expect(1)
            .mount(&mock_server)
            .await;

        cargo_bin_cmd!()
            .arg("-H")
            .arg("X-Reader: sitegate")
            .arg(mock_server.uri())
            .assert()
            .success()
            .stdout(contains("204"));

        Ok(())
    }
}
