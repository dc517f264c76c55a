use std::sync::Arc;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Validation, decode, decode_header};
use serde::Deserialize;
use thiserror::Error;

use crate::services::auth::error::TokenInvalidReason;
use crate::services::auth::jwks::{JwksResolver, KeyResolveError};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdTokenError {
    #[error("identity token invalid: {0}")]
    Invalid(TokenInvalidReason),
    #[error("identity provider key set unavailable")]
    KeySetUnavailable,
}

impl From<TokenInvalidReason> for IdTokenError {
    fn from(reason: TokenInvalidReason) -> Self {
        Self::Invalid(reason)
    }
}

/// Identity token (OIDC id_token) claims.
///
/// NOTE:
/// - `aud` can be a string or an array; `jsonwebtoken::Validation` performs the membership check.
/// - NumericDate fields accept any JSON number so a fractional or negative `exp` is judged by
///   validation (`expired`) instead of failing to deserialize (`malformed`).
#[derive(Debug, Clone, Deserialize)]
pub struct IdTokenClaims {
    pub iss: String,
    #[serde(default)]
    pub aud: serde_json::Value,
    pub sub: String,
    #[serde(deserialize_with = "numeric_date")]
    pub exp: i64,

    #[serde(default, deserialize_with = "optional_numeric_date")]
    pub nbf: Option<i64>,
    #[serde(default, deserialize_with = "optional_numeric_date")]
    pub iat: Option<i64>,

    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub email_verified: Option<bool>,
}

fn to_seconds<E: serde::de::Error>(n: serde_json::Number) -> Result<i64, E> {
    n.as_i64()
        .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.round() as i64))
        .ok_or_else(|| E::custom("NumericDate out of range"))
}

fn numeric_date<'de, D>(de: D) -> Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    to_seconds(serde_json::Number::deserialize(de)?)
}

fn optional_numeric_date<'de, D>(de: D) -> Result<Option<i64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<serde_json::Number>::deserialize(de)?
        .map(to_seconds)
        .transpose()
}

impl IdTokenClaims {
    /// The email when the provider did not mark it unverified, otherwise `sub`.
    pub fn subject(&self) -> &str {
        match (&self.email, self.email_verified) {
            (Some(email), verified) if verified != Some(false) && !email.is_empty() => email,
            _ => &self.sub,
        }
    }
}

/// Verifies compact JWS identity tokens against the JWKS-backed resolver.
#[derive(Debug, Clone)]
pub struct IdTokenVerifier {
    resolver: Arc<JwksResolver>,
    audience: String,
    issuer: String,
    leeway_seconds: u64,
}

impl IdTokenVerifier {
    pub fn new(
        resolver: Arc<JwksResolver>,
        audience: impl Into<String>,
        issuer: impl Into<String>,
        leeway_seconds: u64,
    ) -> Self {
        Self {
            resolver,
            audience: audience.into(),
            issuer: issuer.into(),
            leeway_seconds,
        }
    }

    /// Verify against the configured audience and issuer.
    pub async fn verify(&self, token: &str) -> Result<IdTokenClaims, IdTokenError> {
        self.verify_for(token, &self.audience, &self.issuer).await
    }

    /// Verify a compact token.
    ///
    /// Order:
    /// 1. header (`alg`, `kid`) is parsed without trusting anything else
    /// 2. the key is resolved by `kid`
    /// 3. the header `alg` must equal the algorithm bound to the key
    /// 4. signature, `exp`/`nbf`, `aud`, `iss` via `jsonwebtoken::Validation`
    /// 5. `iat` must not lie in the future and `sub` must not be empty
    pub async fn verify_for(
        &self,
        token: &str,
        expected_audience: &str,
        expected_issuer: &str,
    ) -> Result<IdTokenClaims, IdTokenError> {
        let header = decode_header(token).map_err(|_| TokenInvalidReason::Malformed)?;
        let kid = header.kid.ok_or(TokenInvalidReason::MissingKeyId)?;

        let key = self.resolver.resolve(&kid).await.map_err(|e| match e {
            KeyResolveError::KeyNotFound => IdTokenError::Invalid(TokenInvalidReason::KeyNotFound),
            KeyResolveError::AmbiguousKey => {
                IdTokenError::Invalid(TokenInvalidReason::AmbiguousKey)
            }
            KeyResolveError::KeySetUnavailable => IdTokenError::KeySetUnavailable,
        })?;

        // The key decides the algorithm; a header asking for anything else is refused outright.
        if header.alg != key.algorithm() {
            return Err(TokenInvalidReason::AlgorithmMismatch.into());
        }

        let mut validation = Validation::new(key.algorithm());
        validation.set_audience(&[expected_audience]);
        validation.set_issuer(&[expected_issuer]);
        validation.set_required_spec_claims(&["exp", "iss", "aud"]);
        validation.validate_nbf = true;
        validation.leeway = self.leeway_seconds;

        let claims = decode::<IdTokenClaims>(token, key.decoding_key(), &validation)
            .map_err(|e| reason_for(e.kind()))?
            .claims;

        let now = chrono::Utc::now().timestamp();
        if let Some(iat) = claims.iat
            && iat > now.saturating_add(self.leeway_seconds as i64)
        {
            return Err(TokenInvalidReason::IssuedInFuture.into());
        }
        if claims.sub.trim().is_empty() {
            return Err(TokenInvalidReason::MissingClaim.into());
        }

        Ok(claims)
    }
}

fn reason_for(kind: &ErrorKind) -> TokenInvalidReason {
    match kind {
        ErrorKind::InvalidSignature => TokenInvalidReason::BadSignature,
        ErrorKind::ExpiredSignature => TokenInvalidReason::Expired,
        ErrorKind::ImmatureSignature => TokenInvalidReason::NotYetValid,
        ErrorKind::InvalidAudience => TokenInvalidReason::AudienceMismatch,
        ErrorKind::InvalidIssuer => TokenInvalidReason::IssuerMismatch,
        ErrorKind::MissingRequiredClaim(_) => TokenInvalidReason::MissingClaim,
        ErrorKind::InvalidAlgorithm => TokenInvalidReason::AlgorithmMismatch,
        // Only a negative `exp` gets past our claim types and fails the library's u64 parse.
        ErrorKind::InvalidClaimFormat(claim) if claim == "exp" => TokenInvalidReason::Expired,
        _ => TokenInvalidReason::Malformed,
    }
}
