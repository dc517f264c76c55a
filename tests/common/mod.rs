//! Shared fixtures for integration tests.
//!
//! - Ed25519 test keys and a JWKS mock (wiremock)
//! - identity token signing
//! - session cookie signing with the same layout the gateway is configured for

#![allow(dead_code)]

pub mod jwks_mock;

use std::collections::HashMap;

use session_gate::config::Config;
use session_gate::services::auth::digest::{HmacVerifier, SigningKey};
use session_gate::services::auth::message::SignedFields;

pub const HMAC_SECRET: &str = "test-shared-secret-0123456789abcdef";
pub const HOST: &str = "gateway.example.com";
pub const ISSUER: &str = "https://accounts.example.com";
pub const AUDIENCE: &str = "gateway-client.apps.example.com";

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Config from explicit pairs; the HMAC secret is always set.
pub fn config(pairs: &[(&str, &str)]) -> Config {
    let mut map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    map.entry("OAUTH_HMAC_SECRET".into())
        .or_insert_with(|| HMAC_SECRET.into());
    Config::from_lookup(|k| map.get(k).cloned()).expect("test config")
}

/// What the upstream proxy would set for one session.
#[derive(Debug, Clone, Default)]
pub struct ProxySession {
    pub expires: String,
    pub bearer_token: Option<String>,
    pub id_token: Option<String>,
}

impl ProxySession {
    pub fn new(expires: i64) -> Self {
        Self {
            expires: expires.to_string(),
            ..Self::default()
        }
    }

    pub fn bearer(mut self, token: &str) -> Self {
        self.bearer_token = Some(token.to_string());
        self
    }

    pub fn id_token(mut self, token: String) -> Self {
        self.id_token = Some(token);
        self
    }

    /// Sign for `host` with the secret and layout in `config`.
    pub fn digest(&self, config: &Config, host: &str) -> String {
        let message = config
            .session
            .layout
            .build(&SignedFields {
                host,
                expires: &self.expires,
                access_token: self.bearer_token.as_deref(),
                id_token: self.id_token.as_deref(),
            })
            .expect("canonical message");
        let key = SigningKey::new(&config.session.hmac_secret).expect("signing key");
        HmacVerifier::new(key, None, config.session.digest_encoding).sign(&message)
    }

    /// `Cookie` header value with a digest computed for `host`.
    pub fn cookie_header(&self, config: &Config, host: &str) -> String {
        self.cookie_header_with_digest(&self.digest(config, host))
    }

    pub fn cookie_header_with_digest(&self, digest: &str) -> String {
        let mut cookie = format!("OauthHMAC={}; OauthExpires={}", digest, self.expires);
        if let Some(token) = &self.bearer_token {
            cookie.push_str(&format!("; BearerToken={}", token));
        }
        if let Some(token) = &self.id_token {
            cookie.push_str(&format!("; IdToken={}", token));
        }
        cookie
    }
}
