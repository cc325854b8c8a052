//! reqwest transport tests
//!
//! The mock server doubles as the proxy: reqwest sends plain-HTTP requests
//! to it in absolute form, and the mock answers them directly.

use std::time::Duration;
use tokio_util::sync::CancellationToken;
use vntm_crawler::crawler::{
    OutboundRequest, RateLimiter, RequestExecutor, ReqwestTransport, RetryPolicy, Transport,
};
use vntm_crawler::proxy::{ProxyPool, ProxyRecord};
use vntm_crawler::session::{SessionCredential, StaticCookieStore};
use vntm_crawler::CrawlError;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn proxy_for(server: &MockServer) -> ProxyRecord {
    let address = server.address();
    ProxyRecord::new(address.ip().to_string(), address.port(), "crawler", "secret")
}

fn transport_for(server: &MockServer) -> ReqwestTransport {
    ReqwestTransport::new(
        Duration::from_secs(5),
        format!("{}/probe", server.uri()),
        Duration::from_secs(2),
    )
}

#[tokio::test]
async fn test_probe_and_send_through_proxy() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/probe"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/suggest"))
        .and(query_param("term", "VN-4-2020-00002"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(r#"[{"value":"VN-4-2020-00002"}]"#),
        )
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/detail"))
        .and(body_string_contains("query=AFNB_ORI"))
        .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
        .mount(&server)
        .await;

    let transport = transport_for(&server);
    let proxy = proxy_for(&server);

    assert!(transport.probe(&proxy).await);

    let request = OutboundRequest::get(format!("{}/suggest", server.uri()))
        .with_query("term", "VN-4-2020-00002");
    let response = transport.send(&proxy, &request).await.unwrap();
    assert_eq!(response.status, 200);
    assert!(response.body.contains("VN-4-2020-00002"));

    // Non-2xx answers are responses, classifying them is the executor's job
    let request = OutboundRequest::post_form(
        format!("{}/detail", server.uri()),
        vec![("query".to_string(), "AFNB_ORI:(VN-4-2020-00002)".to_string())],
    );
    let response = transport.send(&proxy, &request).await.unwrap();
    assert_eq!(response.status, 503);
}

#[tokio::test]
async fn test_unreachable_proxy() {
    let transport = ReqwestTransport::new(
        Duration::from_secs(2),
        "http://registry.invalid/",
        Duration::from_secs(1),
    );
    let proxy = ProxyRecord::new("127.0.0.1", 1, "", "");

    assert!(!transport.probe(&proxy).await);

    let request = OutboundRequest::get("http://registry.invalid/suggest");
    assert!(transport.send(&proxy, &request).await.is_err());
}

#[tokio::test]
async fn test_executor_sends_session_cookie() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/probe"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/suggest"))
        .and(header("cookie", "PSUSR=token-1; JSESSIONID=session-1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
        .expect(1)
        .mount(&server)
        .await;

    let mut executor = RequestExecutor::new(
        transport_for(&server),
        ProxyPool::from_proxies(vec![proxy_for(&server)], 20),
        RateLimiter::new(60),
        Box::new(StaticCookieStore::new(Some(SessionCredential::new(
            "token-1",
            "session-1",
        )))),
        RetryPolicy::new(1, 1),
        CancellationToken::new(),
    );

    let response = executor
        .execute(OutboundRequest::get(format!("{}/suggest", server.uri())))
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.body, "[]");
    assert_eq!(executor.last_proxy(), Some(proxy_for(&server).label().as_str()));
}

#[tokio::test]
async fn test_executor_reports_expired_session() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/probe"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/suggest"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let mut executor = RequestExecutor::new(
        transport_for(&server),
        ProxyPool::from_proxies(vec![proxy_for(&server)], 20),
        RateLimiter::new(60),
        Box::new(StaticCookieStore::empty()),
        RetryPolicy::new(3, 1),
        CancellationToken::new(),
    );

    let result = executor
        .execute(OutboundRequest::get(format!("{}/suggest", server.uri())))
        .await;

    assert!(matches!(result, Err(CrawlError::AuthExpired { status: 401, .. })));
}
