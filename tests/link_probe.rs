//! HttpLinkProber against a local wiremock server.

use std::time::Duration;

use favlinks::services::link_probe::{HttpLinkProber, LinkProber, ProbeConfig, ProbeOutcome};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn prober() -> HttpLinkProber {
    let config = ProbeConfig {
        timeout: Duration::from_secs(2),
        user_agent: "favlinks-test".to_string(),
        max_body_bytes: 64 * 1024,
    };
    HttpLinkProber::new(&config).unwrap()
}

#[tokio::test]
async fn test_success_extracts_title() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .and(header("user-agent", "favlinks-test"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            "<html><head><title>Example Domain</title></head><body></body></html>",
            "text/html",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = prober().probe(&format!("{}/", server.uri())).await;
    assert_eq!(outcome, ProbeOutcome::valid("Example Domain"));
}

#[tokio::test]
async fn test_page_without_title_is_valid_with_empty_title() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/plain"))
        .respond_with(ResponseTemplate::new(200).set_body_string("just text"))
        .mount(&server)
        .await;

    let outcome = prober().probe(&format!("{}/plain", server.uri())).await;
    assert!(outcome.is_valid);
    assert_eq!(outcome.title.as_deref(), Some(""));
}

#[tokio::test]
async fn test_error_status_is_invalid() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("<title>Not Found</title>"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let prober = prober();
    assert_eq!(prober.probe(&format!("{}/missing", server.uri())).await, ProbeOutcome::invalid());
    assert_eq!(prober.probe(&format!("{}/broken", server.uri())).await, ProbeOutcome::invalid());
}

#[tokio::test]
async fn test_timeout_is_invalid() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let outcome = prober().probe(&server.uri()).await;
    assert_eq!(outcome, ProbeOutcome::invalid());
}

#[tokio::test]
async fn test_unreachable_host_is_invalid() {
    // Nothing listens on the discard port of the loopback address
    let outcome = prober().probe("http://127.0.0.1:9/").await;
    assert_eq!(outcome, ProbeOutcome::invalid());
}

#[tokio::test]
async fn test_body_is_capped() {
    let server = MockServer::start().await;
    let body = format!("{}<title>Too late</title>", " ".repeat(128 * 1024));
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&server)
        .await;

    let outcome = prober().probe(&server.uri()).await;
    assert_eq!(outcome, ProbeOutcome::valid(""));
}
