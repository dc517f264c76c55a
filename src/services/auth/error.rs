//! Verification error taxonomy.
//!
//! Every variant except `InternalFault` is attributable to the evidence a client presented (or to
//! the identity provider it was issued by) and surfaces as 401. Reason codes are for logs only;
//! they never reach the client.

use thiserror::Error;

/// Why an identity token was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenInvalidReason {
    Malformed,
    MissingKeyId,
    KeyNotFound,
    AmbiguousKey,
    AlgorithmMismatch,
    BadSignature,
    Expired,
    NotYetValid,
    IssuedInFuture,
    AudienceMismatch,
    IssuerMismatch,
    MissingClaim,
}

impl TokenInvalidReason {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Malformed => "malformed",
            Self::MissingKeyId => "missing_kid",
            Self::KeyNotFound => "key_not_found",
            Self::AmbiguousKey => "ambiguous_key",
            Self::AlgorithmMismatch => "algorithm_mismatch",
            Self::BadSignature => "bad_signature",
            Self::Expired => "expired",
            Self::NotYetValid => "not_yet_valid",
            Self::IssuedInFuture => "issued_in_future",
            Self::AudienceMismatch => "audience_mismatch",
            Self::IssuerMismatch => "issuer_mismatch",
            Self::MissingClaim => "missing_claim",
        }
    }
}

impl std::fmt::Display for TokenInvalidReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("missing session evidence: {0}")]
    EvidenceMissing(&'static str),

    #[error("session signature invalid")]
    SignatureInvalid,

    #[error("identity token invalid: {0}")]
    TokenInvalid(TokenInvalidReason),

    #[error("identity provider key set unavailable")]
    KeySetUnavailable,

    #[error("token introspection failed")]
    IntrospectionFailed,

    #[error("internal fault: {0}")]
    InternalFault(String),
}

impl VerifyError {
    /// Stable code for logs and metrics.
    pub fn code(&self) -> &'static str {
        match self {
            Self::EvidenceMissing(_) => "evidence_missing",
            Self::SignatureInvalid => "signature_invalid",
            Self::TokenInvalid(_) => "token_invalid",
            Self::KeySetUnavailable => "key_set_unavailable",
            Self::IntrospectionFailed => "introspection_failed",
            Self::InternalFault(_) => "internal_fault",
        }
    }

    /// Whether this error is the gateway's own fault rather than the client's or the IdP's.
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::InternalFault(_))
    }
}
