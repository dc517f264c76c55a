//! Token-info introspection against a mocked endpoint.

use std::time::Duration;

use serde_json::json;
use session_gate::services::auth::introspection::{
    HttpTokenIntrospector, IntrospectionError, TokenIntrospector,
};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKENINFO_PATH: &str = "/oauth2/v2/tokeninfo";

async fn server(template: ResponseTemplate) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKENINFO_PATH))
        .and(body_string_contains("access_token=access-abc"))
        .respond_with(template)
        .mount(&server)
        .await;
    server
}

fn introspector(server: &MockServer, audience: Option<&str>) -> HttpTokenIntrospector {
    HttpTokenIntrospector::new(
        reqwest::Client::new(),
        format!("{}{}", server.uri(), TOKENINFO_PATH),
        Duration::from_millis(300),
        audience.map(str::to_string),
    )
}

#[tokio::test]
async fn live_token_resolves_to_email() {
    let s = server(ResponseTemplate::new(200).set_body_json(json!({
        "issued_to": "gateway-client",
        "audience": "gateway-client",
        "user_id": "1170",
        "expires_in": 3599,
        "email": "user@example.com",
        "verified_email": true
    })))
    .await;

    let out = introspector(&s, Some("gateway-client"))
        .introspect("access-abc")
        .await
        .expect("introspect");
    assert_eq!(out.subject, "user@example.com");
    assert_eq!(out.expires_in, Some(3599));
}

#[tokio::test]
async fn rejected_token_is_a_status_error() {
    let s = server(
        ResponseTemplate::new(400).set_body_json(json!({ "error_description": "Invalid Value" })),
    )
    .await;

    let err = introspector(&s, None)
        .introspect("access-abc")
        .await
        .unwrap_err();
    assert!(matches!(err, IntrospectionError::Status(400)));
}

#[tokio::test]
async fn token_for_another_client_is_refused() {
    let s = server(ResponseTemplate::new(200).set_body_json(json!({
        "audience": "other-client",
        "email": "user@example.com",
        "expires_in": 100
    })))
    .await;

    let err = introspector(&s, Some("gateway-client"))
        .introspect("access-abc")
        .await
        .unwrap_err();
    assert!(matches!(err, IntrospectionError::AudienceMismatch));
}

#[tokio::test]
async fn slow_endpoint_times_out() {
    let s = server(
        ResponseTemplate::new(200)
            .set_body_json(json!({ "email": "user@example.com" }))
            .set_delay(Duration::from_secs(2)),
    )
    .await;

    let err = introspector(&s, None)
        .introspect("access-abc")
        .await
        .unwrap_err();
    assert!(matches!(err, IntrospectionError::Timeout));
}
