//! Integration tests for the IPA client against a wiremock server.

use reqwest::header::HeaderMap;
use reqwest::Method;
use serde_json::json;
use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use ipa_client::{ClientError, HttpClient, HttpConfig, RequestBody, RpcRequest, SessionClient};

// =============================================================================
// Helpers
// =============================================================================

async fn mount_login(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/ipa/session/login_password"))
        .and(header("Content-Type", "application/x-www-form-urlencoded"))
        .and(header("Accept", "text/plain"))
        .and(body_string_contains("user=admin"))
        .respond_with(
            ResponseTemplate::new(200)
                .append_header("Set-Cookie", "ipa_session=abc123; Path=/ipa; HttpOnly")
                .append_header("Set-Cookie", "lb=node1")
                .set_body_string("OK"),
        )
        .expect(1)
        .mount(server)
        .await;
}

async fn login(server: &MockServer) -> SessionClient {
    SessionClient::login(
        &format!("{}/ipa", server.uri()),
        "admin",
        "Secret123",
        &HttpConfig::default(),
    )
    .await
    .expect("login should succeed")
}

async fn mount_redirect_chain(server: &MockServer, redirects: usize) {
    for hop in 0..redirects {
        Mock::given(method("GET"))
            .and(path(format!("/hop/{hop}")))
            .respond_with(
                ResponseTemplate::new(302).insert_header("Location", format!("/hop/{}", hop + 1)),
            )
            .mount(server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path(format!("/hop/{redirects}")))
        .respond_with(ResponseTemplate::new(200).set_body_string("arrived"))
        .mount(server)
        .await;
}

// =============================================================================
// Login
// =============================================================================

#[tokio::test]
async fn login_persists_session_cookie() {
    let server = MockServer::start().await;
    mount_login(&server).await;

    let client = login(&server).await;

    assert_eq!(
        client.headers().get("Cookie").unwrap(),
        "ipa_session=abc123; lb=node1"
    );
    assert_eq!(
        client.headers().get("Referer").unwrap().to_str().unwrap(),
        format!("{}/ipa", server.uri())
    );
    assert_eq!(client.principal(), "admin");
}

#[tokio::test]
async fn login_rejected_is_authentication_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/ipa/session/login_password"))
        .respond_with(
            ResponseTemplate::new(401)
                .insert_header("X-IPA-Rejection-Reason", "invalid-password")
                .set_body_string("Unauthorized"),
        )
        .mount(&server)
        .await;

    let err = SessionClient::login(
        &format!("{}/ipa", server.uri()),
        "admin",
        "wrong",
        &HttpConfig::default(),
    )
    .await
    .unwrap_err();

    match err {
        ClientError::Authentication {
            principal, status, ..
        } => {
            assert_eq!(principal, "admin");
            assert_eq!(status, 401);
        }
        other => panic!("expected authentication error, got {other:?}"),
    }
}

#[tokio::test]
async fn login_without_cookie_is_authentication_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/ipa/session/login_password"))
        .respond_with(ResponseTemplate::new(200).set_body_string("OK"))
        .mount(&server)
        .await;

    let err = SessionClient::login(
        &format!("{}/ipa", server.uri()),
        "admin",
        "Secret123",
        &HttpConfig::default(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ClientError::Authentication { .. }));
}

// =============================================================================
// JSON-RPC calls
// =============================================================================

#[tokio::test]
async fn call_sends_cookie_and_returns_payload() {
    let server = MockServer::start().await;
    mount_login(&server).await;

    Mock::given(method("POST"))
        .and(path("/ipa/session/json"))
        .and(header("Cookie", "ipa_session=abc123; lb=node1"))
        .and(header("Content-Type", "application/json"))
        .and(body_partial_json(json!({
            "id": 0,
            "method": "user_find/1",
            "params": [[], {"all": true}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": {"result": [{"uid": ["bob"]}], "count": 1},
            "error": null,
            "id": 0
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = login(&server).await;
    let payload = client
        .call_payload(&RpcRequest::new("user_find/1").option("all", true))
        .await
        .unwrap();

    assert_eq!(payload, json!([{"uid": ["bob"]}]));
}

#[tokio::test]
async fn call_with_error_field_fails_despite_200() {
    let server = MockServer::start().await;
    mount_login(&server).await;

    Mock::given(method("POST"))
        .and(path("/ipa/session/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": null,
            "error": {"code": 4001, "name": "NotFound", "message": "bob: user not found"},
            "id": 0
        })))
        .mount(&server)
        .await;

    let client = login(&server).await;
    let err = client
        .call(&RpcRequest::new("user_show/1").arg("bob"))
        .await
        .unwrap_err();

    match err {
        ClientError::Api(message) => assert_eq!(message, "bob: user not found"),
        other => panic!("expected API error, got {other:?}"),
    }
}

#[tokio::test]
async fn call_server_error_carries_diagnostics() {
    let server = MockServer::start().await;
    mount_login(&server).await;

    Mock::given(method("POST"))
        .and(path("/ipa/session/json"))
        .respond_with(ResponseTemplate::new(500).set_body_string("kaboom"))
        .mount(&server)
        .await;

    let client = login(&server).await;
    let err = client
        .call(&RpcRequest::new("group_find/1"))
        .await
        .unwrap_err();

    match err {
        ClientError::Status {
            method,
            url,
            status,
            body,
            ..
        } => {
            assert_eq!(method, "POST");
            assert!(url.ends_with("/ipa/session/json"));
            assert_eq!(status, 500);
            assert_eq!(body, "kaboom");
        }
        other => panic!("expected status error, got {other:?}"),
    }
}

#[tokio::test]
async fn call_with_non_json_body_is_decode_error() {
    let server = MockServer::start().await;
    mount_login(&server).await;

    Mock::given(method("POST"))
        .and(path("/ipa/session/json"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>login</html>"))
        .mount(&server)
        .await;

    let client = login(&server).await;
    let err = client
        .call(&RpcRequest::new("group_find/1"))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Decode(_)));
}

// =============================================================================
// Redirects
// =============================================================================

#[tokio::test]
async fn nine_redirects_succeed_on_tenth_request() {
    let server = MockServer::start().await;
    mount_redirect_chain(&server, 9).await;

    let client = HttpClient::new(&HttpConfig::default()).unwrap();
    let response = client
        .request(
            Method::GET,
            &format!("{}/hop/0", server.uri()),
            &RequestBody::Empty,
            &HeaderMap::new(),
        )
        .await
        .expect("ten requests fit in the default limit");

    assert_eq!(response.text().await.unwrap(), "arrived");
}

#[tokio::test]
async fn eleven_redirects_fail_with_redirect_depth() {
    let server = MockServer::start().await;
    mount_redirect_chain(&server, 11).await;

    let client = HttpClient::new(&HttpConfig::default()).unwrap();
    let err = client
        .request(
            Method::GET,
            &format!("{}/hop/0", server.uri()),
            &RequestBody::Empty,
            &HeaderMap::new(),
        )
        .await
        .unwrap_err();

    match err {
        ClientError::RedirectLimit { method, limit, .. } => {
            assert_eq!(method, "GET");
            assert_eq!(limit, 10);
        }
        other => panic!("expected redirect limit error, got {other:?}"),
    }
}

#[tokio::test]
async fn redirect_resends_post_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/old/session/json"))
        .respond_with(
            ResponseTemplate::new(301).insert_header("Location", "/new/session/json"),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/new/session/json"))
        .and(body_partial_json(json!({"method": "ping/1"})))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpClient::new(&HttpConfig::default()).unwrap();
    client
        .request(
            Method::POST,
            &format!("{}/old/session/json", server.uri()),
            &RequestBody::Json(json!({"id": 0, "method": "ping/1", "params": [[], {}]})),
            &HeaderMap::new(),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn redirect_without_location_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/nowhere"))
        .respond_with(ResponseTemplate::new(302))
        .mount(&server)
        .await;

    let client = HttpClient::new(&HttpConfig::default()).unwrap();
    let err = client
        .request(
            Method::GET,
            &format!("{}/nowhere", server.uri()),
            &RequestBody::Empty,
            &HeaderMap::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::MissingLocation { status: 302, .. }));
}

#[tokio::test]
async fn custom_redirect_limit_is_honoured() {
    let server = MockServer::start().await;
    mount_redirect_chain(&server, 3).await;

    let config = HttpConfig {
        redirect_limit: 3,
        ..HttpConfig::default()
    };
    let client = HttpClient::new(&config).unwrap();
    let err = client
        .request(
            Method::GET,
            &format!("{}/hop/0", server.uri()),
            &RequestBody::Empty,
            &HeaderMap::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::RedirectLimit { limit: 3, .. }));
}
