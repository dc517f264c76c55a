//! Session cookie digest verification (HMAC-SHA256).

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::{Choice, ConstantTimeEq};

use crate::services::auth::message::CanonicalMessage;

type HmacSha256 = Hmac<Sha256>;

/// Textual form of the digest carried in the `OauthHMAC` cookie.
///
/// Both forms exist in deployed proxies and are not wire-compatible with each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestEncoding {
    /// base64(hex(digest)): the older proxy behaviour.
    HexBase64,
    /// base64(digest)
    Base64,
}

impl DigestEncoding {
    fn encode(&self, digest: &[u8]) -> String {
        match self {
            Self::HexBase64 => STANDARD.encode(hex::encode(digest)),
            Self::Base64 => STANDARD.encode(digest),
        }
    }
}

impl std::str::FromStr for DigestEncoding {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hex-base64" | "hex_base64" | "base64-hex" => Ok(Self::HexBase64),
            "base64" | "raw-base64" => Ok(Self::Base64),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum HmacKeyError {
    #[error("HMAC key is empty")]
    Empty,
    #[error("HMAC key rejected: {0}")]
    Rejected(String),
}

/// A keyed HMAC prototype, cloned per computation.
#[derive(Clone)]
pub struct SigningKey {
    mac: HmacSha256,
    len: usize,
}

impl SigningKey {
    /// Keys shorter than this are accepted but logged at startup.
    pub const RECOMMENDED_MIN_LENGTH: usize = 32;

    /// The key is the raw bytes of the shared secret as configured on the proxy.
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self, HmacKeyError> {
        let secret = secret.as_ref();
        if secret.is_empty() {
            return Err(HmacKeyError::Empty);
        }
        if secret.len() < Self::RECOMMENDED_MIN_LENGTH {
            tracing::warn!(
                key_length = secret.len(),
                recommended = Self::RECOMMENDED_MIN_LENGTH,
                "HMAC key is shorter than recommended"
            );
        }
        let mac = HmacSha256::new_from_slice(secret)
            .map_err(|e| HmacKeyError::Rejected(e.to_string()))?;

        Ok(Self {
            mac,
            len: secret.len(),
        })
    }

    fn digest(&self, data: &[u8]) -> [u8; 32] {
        let mut mac = self.mac.clone();
        mac.update(data);
        mac.finalize().into_bytes().into()
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("key_length", &self.len)
            .finish_non_exhaustive()
    }
}

/// Recomputes the session digest and compares it to the presented one.
///
/// Holds the current key and, during a rotation window, the previous one. A digest produced by
/// either key is accepted.
#[derive(Debug, Clone)]
pub struct HmacVerifier {
    current: SigningKey,
    previous: Option<SigningKey>,
    encoding: DigestEncoding,
}

impl HmacVerifier {
    pub fn new(current: SigningKey, previous: Option<SigningKey>, encoding: DigestEncoding) -> Self {
        Self {
            current,
            previous,
            encoding,
        }
    }

    pub fn encoding(&self) -> DigestEncoding {
        self.encoding
    }

    /// Digest of `message` under the current key, in the configured encoding.
    pub fn sign(&self, message: &CanonicalMessage) -> String {
        self.encoding
            .encode(&self.current.digest(message.as_bytes()))
    }

    /// Constant-time check of `presented` against every configured key.
    pub fn verify(&self, message: &CanonicalMessage, presented: &str) -> bool {
        let presented = presented.as_bytes();

        // No early exit: every key is evaluated regardless of which one matches.
        let mut matched = Choice::from(0u8);
        for key in std::iter::once(&self.current).chain(self.previous.as_ref()) {
            let expected = self.encoding.encode(&key.digest(message.as_bytes()));
            matched |= expected.as_bytes().ct_eq(presented);
        }

        matched.into()
    }
}
