//! Canonical message construction for the session HMAC.
//!
//! The upstream proxy signs `host || expires || [access_token] || [id_token]`. Which optional
//! fields take part and how they are joined is a deployment contract with that proxy: it is fixed
//! at startup in a `MessageLayout` and applied identically to every request.

use thiserror::Error;

/// Separator placed between signed fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter {
    /// Plain concatenation (`host` + `expires` + ...).
    None,
    /// Fields joined with `\n`.
    Newline,
}

impl Delimiter {
    fn as_bytes(&self) -> &'static [u8] {
        match self {
            Self::None => b"",
            Self::Newline => b"\n",
        }
    }
}

impl std::str::FromStr for Delimiter {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "" | "concat" => Ok(Self::None),
            "newline" | "lf" => Ok(Self::Newline),
            _ => Err(()),
        }
    }
}

/// The fields the upstream signer covered, borrowed from the request.
#[derive(Debug, Clone, Copy)]
pub struct SignedFields<'a> {
    pub host: &'a str,
    pub expires: &'a str,
    pub access_token: Option<&'a str>,
    pub id_token: Option<&'a str>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MessageError {
    #[error("host is empty")]
    EmptyHost,
    #[error("signed field missing: {0}")]
    MissingField(&'static str),
}

/// Field order and delimiter of the canonical message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageLayout {
    pub delimiter: Delimiter,
    pub include_access_token: bool,
    pub include_id_token: bool,
}

impl Default for MessageLayout {
    fn default() -> Self {
        Self {
            delimiter: Delimiter::None,
            include_access_token: false,
            include_id_token: false,
        }
    }
}

/// Bytes covered by the session digest. Derived per request and never stored.
#[derive(Clone, PartialEq, Eq)]
pub struct CanonicalMessage(Vec<u8>);

impl CanonicalMessage {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for CanonicalMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Contains bearer material.
        f.debug_struct("CanonicalMessage")
            .field("len", &self.0.len())
            .finish_non_exhaustive()
    }
}

impl MessageLayout {
    pub fn build(&self, fields: &SignedFields<'_>) -> Result<CanonicalMessage, MessageError> {
        if fields.host.is_empty() {
            return Err(MessageError::EmptyHost);
        }

        let mut parts: Vec<&str> = Vec::with_capacity(4);
        parts.push(fields.host);
        parts.push(fields.expires);

        if self.include_access_token {
            parts.push(
                fields
                    .access_token
                    .ok_or(MessageError::MissingField("access_token"))?,
            );
        }
        if self.include_id_token {
            parts.push(fields.id_token.ok_or(MessageError::MissingField("id_token"))?);
        }

        let delimiter = self.delimiter.as_bytes();
        let mut out = Vec::with_capacity(parts.iter().map(|p| p.len() + delimiter.len()).sum());
        for (i, part) in parts.iter().enumerate() {
            if i > 0 {
                out.extend_from_slice(delimiter);
            }
            out.extend_from_slice(part.as_bytes());
        }

        Ok(CanonicalMessage(out))
    }
}
