//! JWKS resolver over HTTP: caching, outage handling and response limits.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::jwks_mock::{JWKS_PATH, KEY1_KID, KEY1_X, jwk, jwks_server, jwks_url};
use serde_json::json;
use session_gate::services::auth::jwks::{
    CachePolicy, HttpJwksFetcher, JwksResolver, KeyResolveError, KeySetFetcher,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn resolver(url: String) -> JwksResolver {
    let fetcher = Arc::new(HttpJwksFetcher::new(reqwest::Client::new(), url));
    JwksResolver::new(fetcher, CachePolicy::default())
}

async fn failing_server(template: ResponseTemplate) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(template)
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn cached_key_set_is_fetched_once() {
    let server = jwks_server(&[jwk(KEY1_KID, KEY1_X)], 1).await;
    let r = resolver(jwks_url(&server));

    for _ in 0..5 {
        let key = r.resolve(KEY1_KID).await.expect("resolve");
        assert_eq!(key.kid(), KEY1_KID);
    }
}

#[tokio::test]
async fn miss_on_young_snapshot_does_not_refetch() {
    let server = jwks_server(&[jwk(KEY1_KID, KEY1_X)], 1).await;
    let r = resolver(jwks_url(&server));

    r.resolve(KEY1_KID).await.expect("resolve");
    for _ in 0..3 {
        assert_eq!(
            r.resolve("unknown").await.unwrap_err(),
            KeyResolveError::KeyNotFound
        );
    }
}

#[tokio::test]
async fn server_error_is_key_set_unavailable() {
    let server = failing_server(ResponseTemplate::new(500)).await;
    let r = resolver(jwks_url(&server));

    assert_eq!(
        r.resolve(KEY1_KID).await.unwrap_err(),
        KeyResolveError::KeySetUnavailable
    );
    assert!(r.snapshot().is_none());
}

#[tokio::test]
async fn unreachable_endpoint_is_key_set_unavailable() {
    // Nothing listens on port 1.
    let r = resolver(format!("http://127.0.0.1:1{}", JWKS_PATH));
    assert_eq!(
        r.resolve(KEY1_KID).await.unwrap_err(),
        KeyResolveError::KeySetUnavailable
    );
}

#[tokio::test]
async fn slow_endpoint_times_out() {
    let server = failing_server(
        ResponseTemplate::new(200)
            .set_body_json(json!({ "keys": [jwk(KEY1_KID, KEY1_X)] }))
            .set_delay(Duration::from_secs(2)),
    )
    .await;
    let fetcher = Arc::new(HttpJwksFetcher::new(
        reqwest::Client::new(),
        jwks_url(&server),
    ));
    let r = JwksResolver::new(
        fetcher,
        CachePolicy {
            fetch_timeout: Duration::from_millis(100),
            ..CachePolicy::default()
        },
    );

    assert_eq!(
        r.resolve(KEY1_KID).await.unwrap_err(),
        KeyResolveError::KeySetUnavailable
    );
}

#[tokio::test]
async fn non_json_body_is_rejected() {
    let server = failing_server(ResponseTemplate::new(200).set_body_string("<html>")).await;
    let fetcher = HttpJwksFetcher::new(reqwest::Client::new(), jwks_url(&server));
    assert!(fetcher.fetch().await.is_err());
}

#[tokio::test]
async fn oversized_document_is_rejected() {
    let padding = "a".repeat(600 * 1024);
    let server = failing_server(
        ResponseTemplate::new(200)
            .set_body_json(json!({ "keys": [jwk(KEY1_KID, KEY1_X)], "padding": padding })),
    )
    .await;
    let r = resolver(jwks_url(&server));

    assert_eq!(
        r.resolve(KEY1_KID).await.unwrap_err(),
        KeyResolveError::KeySetUnavailable
    );
}

#[tokio::test]
async fn symmetric_and_encryption_keys_are_ignored() {
    let server = jwks_server(
        &[
            json!({ "kty": "oct", "kid": "shared", "k": "c2VjcmV0" }),
            json!({ "kty": "OKP", "crv": "Ed25519", "use": "enc", "kid": "enc", "x": KEY1_X }),
            jwk(KEY1_KID, KEY1_X),
        ],
        1,
    )
    .await;
    let r = resolver(jwks_url(&server));

    r.resolve(KEY1_KID).await.expect("signing key");
    assert_eq!(
        r.resolve("shared").await.unwrap_err(),
        KeyResolveError::KeyNotFound
    );
    assert_eq!(
        r.resolve("enc").await.unwrap_err(),
        KeyResolveError::KeyNotFound
    );
}
