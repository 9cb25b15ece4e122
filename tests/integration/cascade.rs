//! Cascade classification against real HTTP and TCP endpoints

use std::time::Duration;

use sitewatch::CheckStatus;
use sitewatch::config::HttpConfig;
use sitewatch::monitors::{HealthChecker, TcpProbe};
use sitewatch::net::{ConnectionPool, DnsCache};
use sitewatch::monitors::cascade::TCP_FALLBACK_REASON;
use sitewatch::storage::SettingsRecord;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

#[tokio::test]
async fn test_head_200_is_up_without_get() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let result = checker(2000).check(&job(1, server.uri())).await;

    assert_eq!(result.status, CheckStatus::Up);
    assert_eq!(result.error_reason, None);
    assert!(result.response_time_ms.is_some());
}

#[tokio::test]
async fn test_404_is_down() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let result = checker(2000).check(&job(1, server.uri())).await;

    assert_eq!(result.status, CheckStatus::Down);
    assert_eq!(result.error_reason.as_deref(), Some("HTTP 404"));
}

#[tokio::test]
async fn test_403_is_up() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let result = checker(2000).check(&job(1, server.uri())).await;

    assert_eq!(result.status, CheckStatus::Up);
    assert_eq!(result.error_reason, None);
}

#[tokio::test]
async fn test_head_405_falls_back_to_get() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(405))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
        .expect(1)
        .mount(&server)
        .await;

    let result = checker(2000).check(&job(1, server.uri())).await;

    assert_eq!(result.status, CheckStatus::Up);
    assert_eq!(result.error_reason, None);
}

#[tokio::test]
async fn test_get_status_after_head_405_is_classified() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(405))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let result = checker(2000).check(&job(1, server.uri())).await;

    assert_eq!(result.status, CheckStatus::Down);
    assert_eq!(result.error_reason.as_deref(), Some("HTTP 500"));
}

#[tokio::test]
async fn test_get_405_is_down() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(405))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(405))
        .mount(&server)
        .await;

    let result = checker(2000).check(&job(1, server.uri())).await;

    assert_eq!(result.status, CheckStatus::Down);
    assert_eq!(result.error_reason.as_deref(), Some("HTTP 405"));
}

#[tokio::test]
async fn test_redirects_are_followed() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/old"))
        .respond_with(
            ResponseTemplate::new(301).insert_header("Location", format!("{}/new", server.uri())),
        )
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/new"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let result = checker(2000)
        .check(&job(1, format!("{}/old", server.uri())))
        .await;

    // The final status decides, not the redirect
    assert_eq!(result.error_reason.as_deref(), Some("HTTP 404"));
}

#[tokio::test]
async fn test_redirect_loop_ends_in_tcp_fallback() {
    let server = MockServer::start().await;
    Mock::given(path("/loop"))
        .respond_with(
            ResponseTemplate::new(302).insert_header("Location", format!("{}/loop", server.uri())),
        )
        .mount(&server)
        .await;

    let result = tcp_checker(2000, server.address().port())
        .check(&job(1, format!("{}/loop", server.uri())))
        .await;

    assert_eq!(result.status, CheckStatus::Up);
    assert_eq!(result.error_reason.as_deref(), Some(TCP_FALLBACK_REASON));
}

#[tokio::test]
async fn test_browser_headers_are_sent() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(header("accept-language", "en-US,en;q=0.5"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let result = checker(2000).check(&job(1, server.uri())).await;
    assert_eq!(result.status, CheckStatus::Up);
}

#[tokio::test]
async fn test_timeouts_fall_back_to_tcp() {
    let server = MockServer::start().await;
    Mock::given(wiremock::matchers::any())
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let result = tcp_checker(150, server.address().port())
        .check(&job(1, server.uri()))
        .await;

    assert_eq!(result.status, CheckStatus::Up);
    assert_eq!(result.error_reason.as_deref(), Some(TCP_FALLBACK_REASON));
    // Both HTTP stages ran into their timeout before the TCP probe
    assert!(result.response_time_ms.unwrap() >= 300);
}

#[tokio::test]
async fn test_request_timeout_is_read_live() {
    let server = MockServer::start().await;
    Mock::given(wiremock::matchers::any())
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(300)))
        .mount(&server)
        .await;

    let settings = live_settings(10, 100);
    let (checker, _dns) = checker_parts(settings.clone(), Some(server.address().port()));

    let result = checker.check(&job(1, server.uri())).await;
    assert_eq!(result.error_reason.as_deref(), Some(TCP_FALLBACK_REASON));

    settings.apply(&SettingsRecord {
        request_timeout_ms: Some(2000),
        ..SettingsRecord::default()
    });
    let result = checker.check(&job(1, server.uri())).await;
    assert_eq!(result.status, CheckStatus::Up);
    assert_eq!(result.error_reason, None);
}

#[tokio::test]
async fn test_non_http_listener_is_tcp_reachable() {
    let addr = hangup_server().await;

    let result = tcp_checker(1000, addr.port())
        .check(&job(1, format!("http://{addr}/")))
        .await;

    assert_eq!(result.status, CheckStatus::Up);
    assert_eq!(result.error_reason.as_deref(), Some(TCP_FALLBACK_REASON));
}

#[tokio::test]
async fn test_tcp_fallback_uses_scheme_port_not_url_port() {
    let http_port = closed_port().await;
    let standard_port = hangup_server().await.port();

    // Nothing listens on the port in the URL, the standard port answers
    let result = tcp_checker(1000, standard_port)
        .check(&job(1, format!("http://127.0.0.1:{http_port}/")))
        .await;

    assert_eq!(result.status, CheckStatus::Up);
    assert_eq!(result.error_reason.as_deref(), Some(TCP_FALLBACK_REASON));
}

#[tokio::test]
async fn test_unreachable_port_reports_get_failure() {
    let port = closed_port().await;

    let result = tcp_checker(1000, port)
        .check(&job(1, format!("http://127.0.0.1:{port}/")))
        .await;

    assert_eq!(result.status, CheckStatus::Down);
    assert_eq!(result.error_reason.as_deref(), Some("ECONNREFUSED"));
}

#[tokio::test]
async fn test_hostnames_resolve_through_dns_cache() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    // The TCP probe gets its own cache, so an entry here came from the HTTP client
    let dns = DnsCache::new(Duration::from_secs(3600));
    let pool = ConnectionPool::new(&HttpConfig::default(), &dns).unwrap();
    let tcp = TcpProbe::new(
        Duration::from_millis(500),
        DnsCache::new(Duration::from_secs(3600)),
    );
    let checker = HealthChecker::new(pool, tcp, live_settings(10, 2000));
    assert!(dns.cached("localhost").await.is_none());

    let url = format!("http://localhost:{}/", server.address().port());
    checker.check(&job(1, url)).await;

    let entry = dns.cached("localhost").await.expect("client resolved through the cache");
    assert!(entry.address.is_loopback());
}
