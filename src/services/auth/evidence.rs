//! Session evidence forwarded by the upstream OAuth2 proxy.
//!
//! Cookie names are a byte-for-byte contract with the proxy.

use axum::http::{HeaderMap, Uri, header};
use axum_extra::extract::cookie::CookieJar;

use crate::services::auth::error::VerifyError;

pub const HMAC_COOKIE: &str = "OauthHMAC";
pub const EXPIRES_COOKIE: &str = "OauthExpires";
pub const BEARER_TOKEN_COOKIE: &str = "BearerToken";
pub const ID_TOKEN_COOKIE: &str = "IdToken";

/// Which optional cookies the active deployment mode needs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvidenceRequirements {
    pub bearer_token: bool,
    pub id_token: bool,
}

/// Everything the pipeline reads from one request. Owned by that request only.
#[derive(Clone)]
pub struct SessionEvidence {
    pub host: String,
    pub hmac_digest: String,
    pub expires_at: String,
    pub bearer_token: Option<String>,
    pub id_token: Option<String>,
}

impl std::fmt::Debug for SessionEvidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print digests or tokens.
        f.debug_struct("SessionEvidence")
            .field("host", &self.host)
            .field("expires_at", &self.expires_at)
            .field("has_bearer_token", &self.bearer_token.is_some())
            .field("has_id_token", &self.id_token.is_some())
            .finish_non_exhaustive()
    }
}

impl SessionEvidence {
    pub fn extract(
        headers: &HeaderMap,
        uri: &Uri,
        requirements: EvidenceRequirements,
    ) -> Result<Self, VerifyError> {
        let jar = CookieJar::from_headers(headers);
        let cookie = |name: &str| {
            jar.get(name)
                .map(|c| c.value().to_string())
                .filter(|v| !v.is_empty())
        };

        let hmac_digest = cookie(HMAC_COOKIE).ok_or(VerifyError::EvidenceMissing(HMAC_COOKIE))?;
        let expires_at =
            cookie(EXPIRES_COOKIE).ok_or(VerifyError::EvidenceMissing(EXPIRES_COOKIE))?;

        // The signer never signs an empty host.
        let host = request_host(headers, uri).ok_or(VerifyError::EvidenceMissing("host"))?;

        let bearer_token = cookie(BEARER_TOKEN_COOKIE);
        if requirements.bearer_token && bearer_token.is_none() {
            return Err(VerifyError::EvidenceMissing(BEARER_TOKEN_COOKIE));
        }
        let id_token = cookie(ID_TOKEN_COOKIE);
        if requirements.id_token && id_token.is_none() {
            return Err(VerifyError::EvidenceMissing(ID_TOKEN_COOKIE));
        }

        Ok(Self {
            host,
            hmac_digest,
            expires_at,
            bearer_token,
            id_token,
        })
    }
}

/// `Host` header, or the URI authority for HTTP/2 requests.
pub fn request_host(headers: &HeaderMap, uri: &Uri) -> Option<String> {
    headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| uri.authority().map(|a| a.as_str().to_string()))
        .filter(|h| !h.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(cookie: &str, host: Option<&str>) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(header::COOKIE, HeaderValue::from_str(cookie).unwrap());
        if let Some(host) = host {
            h.insert(header::HOST, HeaderValue::from_str(host).unwrap());
        }
        h
    }

    #[test]
    fn extracts_all_cookies() {
        let h = headers(
            "OauthHMAC=abc; OauthExpires=1767225600; BearerToken=tok; IdToken=a.b.c",
            Some("gateway.example.com:8443"),
        );
        let ev = SessionEvidence::extract(
            &h,
            &Uri::from_static("/"),
            EvidenceRequirements {
                bearer_token: true,
                id_token: true,
            },
        )
        .unwrap();
        assert_eq!(ev.host, "gateway.example.com:8443");
        assert_eq!(ev.hmac_digest, "abc");
        assert_eq!(ev.expires_at, "1767225600");
        assert_eq!(ev.bearer_token.as_deref(), Some("tok"));
        assert_eq!(ev.id_token.as_deref(), Some("a.b.c"));
    }

    #[test]
    fn missing_digest_cookie_is_reported_by_name() {
        let h = headers("OauthExpires=1", Some("gateway.example.com"));
        let err = SessionEvidence::extract(&h, &Uri::from_static("/"), Default::default())
            .unwrap_err();
        assert!(matches!(err, VerifyError::EvidenceMissing(HMAC_COOKIE)));
    }

    #[test]
    fn required_bearer_token_must_be_present() {
        let h = headers("OauthHMAC=abc; OauthExpires=1", Some("gateway.example.com"));
        let err = SessionEvidence::extract(
            &h,
            &Uri::from_static("/"),
            EvidenceRequirements {
                bearer_token: true,
                id_token: false,
            },
        )
        .unwrap_err();
        assert!(matches!(err, VerifyError::EvidenceMissing(BEARER_TOKEN_COOKIE)));
    }

    #[test]
    fn host_falls_back_to_uri_authority() {
        let h = headers("OauthHMAC=abc; OauthExpires=1", None);
        let uri: Uri = "https://gateway.example.com/".parse().unwrap();
        let ev = SessionEvidence::extract(&h, &uri, Default::default()).unwrap();
        assert_eq!(ev.host, "gateway.example.com");

        let err = SessionEvidence::extract(&h, &Uri::from_static("/"), Default::default())
            .unwrap_err();
        assert!(matches!(err, VerifyError::EvidenceMissing("host")));
    }

    #[test]
    fn debug_hides_tokens() {
        let h = headers(
            "OauthHMAC=secretdigest; OauthExpires=1; BearerToken=secrettoken",
            Some("h"),
        );
        let ev = SessionEvidence::extract(&h, &Uri::from_static("/"), Default::default()).unwrap();
        let out = format!("{:?}", ev);
        assert!(!out.contains("secretdigest"));
        assert!(!out.contains("secrettoken"));
    }
}
