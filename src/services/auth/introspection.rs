//! Bearer token introspection against the identity provider's token-info endpoint.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum IntrospectionError {
    #[error("token-info request failed: {0}")]
    Transport(String),
    #[error("token-info request timed out")]
    Timeout,
    #[error("token-info endpoint returned status {0}")]
    Status(u16),
    #[error("token-info response invalid: {0}")]
    InvalidResponse(String),
    #[error("token is not live: {0}")]
    Inactive(String),
    #[error("token audience mismatch")]
    AudienceMismatch,
}

/// What the identity provider says about a live token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Introspection {
    /// Verified email, or the provider's user id when no email was granted.
    pub subject: String,
    pub expires_in: Option<i64>,
}

#[async_trait]
pub trait TokenIntrospector: Send + Sync {
    async fn introspect(&self, access_token: &str) -> Result<Introspection, IntrospectionError>;
}

/// Google-style `tokeninfo` response (oauth2 v2 and v3 field names).
#[derive(Debug, Default, Deserialize)]
struct TokenInfo {
    #[serde(default)]
    email: Option<String>,
    #[serde(default, deserialize_with = "lenient_bool")]
    verified_email: Option<bool>,
    #[serde(default, deserialize_with = "lenient_bool")]
    email_verified: Option<bool>,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    audience: Option<String>,
    #[serde(default)]
    aud: Option<String>,
    #[serde(default)]
    issued_to: Option<String>,
    #[serde(default, deserialize_with = "lenient_i64")]
    expires_in: Option<i64>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

// v3 tokeninfo returns booleans and numbers as strings.
fn lenient_bool<'de, D>(de: D) -> Result<Option<bool>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Option::<serde_json::Value>::deserialize(de)? {
        Some(serde_json::Value::Bool(b)) => Some(b),
        Some(serde_json::Value::String(s)) => s.parse().ok(),
        _ => None,
    })
}

fn lenient_i64<'de, D>(de: D) -> Result<Option<i64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Option::<serde_json::Value>::deserialize(de)? {
        Some(serde_json::Value::Number(n)) => n.as_i64(),
        Some(serde_json::Value::String(s)) => s.parse().ok(),
        _ => None,
    })
}

impl TokenInfo {
    fn into_introspection(
        self,
        expected_audience: Option<&str>,
    ) -> Result<Introspection, IntrospectionError> {
        if let Some(error) = self.error {
            let detail = self.error_description.unwrap_or(error);
            return Err(IntrospectionError::Inactive(detail));
        }
        if let Some(expires_in) = self.expires_in
            && expires_in <= 0
        {
            return Err(IntrospectionError::Inactive("expired".into()));
        }

        if let Some(expected) = expected_audience {
            let matches = [&self.audience, &self.aud, &self.issued_to]
                .into_iter()
                .flatten()
                .any(|a| a == expected);
            if !matches {
                return Err(IntrospectionError::AudienceMismatch);
            }
        }

        let verified = self.verified_email.or(self.email_verified) != Some(false);
        let subject = match self.email {
            Some(email) if verified && !email.is_empty() => email,
            _ => self
                .sub
                .or(self.user_id)
                .filter(|s| !s.is_empty())
                .ok_or_else(|| IntrospectionError::InvalidResponse("no subject".into()))?,
        };

        Ok(Introspection {
            subject,
            expires_in: self.expires_in,
        })
    }
}

/// Calls the token-info endpoint with the bearer token as a form parameter.
#[derive(Debug, Clone)]
pub struct HttpTokenIntrospector {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
    expected_audience: Option<String>,
}

impl HttpTokenIntrospector {
    pub fn new(
        client: reqwest::Client,
        url: impl Into<String>,
        timeout: Duration,
        expected_audience: Option<String>,
    ) -> Self {
        Self {
            client,
            url: url.into(),
            timeout,
            expected_audience,
        }
    }
}

#[async_trait]
impl TokenIntrospector for HttpTokenIntrospector {
    async fn introspect(&self, access_token: &str) -> Result<Introspection, IntrospectionError> {
        let response = self
            .client
            .post(&self.url)
            .form(&[("access_token", access_token)])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    IntrospectionError::Timeout
                } else {
                    IntrospectionError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            debug!(status = status.as_u16(), "token-info rejected the token");
            return Err(IntrospectionError::Status(status.as_u16()));
        }

        let info: TokenInfo = response.json().await.map_err(|e| {
            if e.is_timeout() {
                IntrospectionError::Timeout
            } else {
                IntrospectionError::InvalidResponse(e.to_string())
            }
        })?;

        info.into_introspection(self.expected_audience.as_deref())
    }
}
