//! Per-request verification: `ExtractEvidence -> HmacCheck -> [JwtCheck] -> [Introspect] -> Accept`.
//!
//! The first failing stage ends the request. Nothing is retried here: a client that fails must
//! re-authenticate through the upstream proxy.

use std::sync::Arc;

use axum::http::{HeaderMap, Uri};
use tracing::{error, warn};

use crate::services::auth::digest::HmacVerifier;
use crate::services::auth::error::VerifyError;
use crate::services::auth::evidence::{EvidenceRequirements, SessionEvidence};
use crate::services::auth::id_token::{IdTokenClaims, IdTokenError, IdTokenVerifier};
use crate::services::auth::introspection::TokenIntrospector;
use crate::services::auth::message::{MessageError, MessageLayout, SignedFields};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ExtractEvidence,
    HmacCheck,
    JwtCheck,
    Introspect,
    Accept,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ExtractEvidence => "extract_evidence",
            Self::HmacCheck => "hmac_check",
            Self::JwtCheck => "jwt_check",
            Self::Introspect => "introspect",
            Self::Accept => "accept",
        }
    }
}

/// Identity handed to protected handlers.
///
/// Only the pipeline's `Accept` stage constructs one.
#[derive(Clone)]
pub struct VerifiedIdentity {
    subject_email: String,
    access_token: Option<String>,
    expires_at: String,
}

impl VerifiedIdentity {
    /// Verified subject; empty when no subject resolution is configured.
    pub fn subject_email(&self) -> &str {
        &self.subject_email
    }

    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    pub fn expires_at(&self) -> &str {
        &self.expires_at
    }
}

impl std::fmt::Debug for VerifiedIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerifiedIdentity")
            .field("subject_email", &self.subject_email)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// A terminal failure and the stage it happened in.
#[derive(Debug)]
pub struct Rejection {
    pub stage: Stage,
    pub error: VerifyError,
}

impl Rejection {
    /// Operator-facing log line. `KeySetUnavailable` is a dependency outage and logged as such.
    pub fn log(&self) {
        match &self.error {
            VerifyError::KeySetUnavailable => error!(
                stage = self.stage.name(),
                code = self.error.code(),
                "rejecting request: identity provider key set unavailable"
            ),
            VerifyError::InternalFault(detail) => error!(
                stage = self.stage.name(),
                code = self.error.code(),
                detail = %detail,
                "rejecting request: internal fault"
            ),
            VerifyError::TokenInvalid(reason) => warn!(
                stage = self.stage.name(),
                code = self.error.code(),
                reason = reason.code(),
                "rejecting request"
            ),
            other => warn!(
                stage = self.stage.name(),
                code = other.code(),
                error = %other,
                "rejecting request"
            ),
        }
    }
}

/// State carried from one stage to the next within a single request.
#[derive(Default)]
struct Progress {
    evidence: Option<SessionEvidence>,
    id_claims: Option<IdTokenClaims>,
    introspected_subject: Option<String>,
    identity: Option<VerifiedIdentity>,
}

impl Progress {
    fn evidence(&self) -> Result<&SessionEvidence, VerifyError> {
        self.evidence
            .as_ref()
            .ok_or_else(|| VerifyError::InternalFault("stage ran before evidence".into()))
    }
}

#[derive(Clone)]
pub struct VerificationPipeline {
    layout: MessageLayout,
    hmac: HmacVerifier,
    id_tokens: Option<IdTokenVerifier>,
    introspector: Option<Arc<dyn TokenIntrospector>>,
}

impl std::fmt::Debug for VerificationPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerificationPipeline")
            .field("layout", &self.layout)
            .field("encoding", &self.hmac.encoding())
            .field("id_tokens", &self.id_tokens.is_some())
            .field("introspection", &self.introspector.is_some())
            .finish()
    }
}

impl VerificationPipeline {
    pub fn new(layout: MessageLayout, hmac: HmacVerifier) -> Self {
        Self {
            layout,
            hmac,
            id_tokens: None,
            introspector: None,
        }
    }

    pub fn with_id_tokens(mut self, verifier: IdTokenVerifier) -> Self {
        self.id_tokens = Some(verifier);
        self
    }

    pub fn with_introspection(mut self, introspector: Arc<dyn TokenIntrospector>) -> Self {
        self.introspector = Some(introspector);
        self
    }

    pub fn layout(&self) -> MessageLayout {
        self.layout
    }

    pub fn hmac(&self) -> &HmacVerifier {
        &self.hmac
    }

    /// Cookies that must be present for the active mode.
    pub fn requirements(&self) -> EvidenceRequirements {
        EvidenceRequirements {
            bearer_token: self.layout.include_access_token || self.introspector.is_some(),
            id_token: self.layout.include_id_token || self.id_tokens.is_some(),
        }
    }

    /// Stages this deployment runs, in order.
    pub fn plan(&self) -> Vec<Stage> {
        let mut stages = vec![Stage::ExtractEvidence, Stage::HmacCheck];
        if self.id_tokens.is_some() {
            stages.push(Stage::JwtCheck);
        }
        if self.introspector.is_some() {
            stages.push(Stage::Introspect);
        }
        stages.push(Stage::Accept);
        stages
    }

    pub async fn verify(
        &self,
        headers: &HeaderMap,
        uri: &Uri,
    ) -> Result<VerifiedIdentity, Rejection> {
        let mut progress = Progress::default();

        for stage in self.plan() {
            self.run_stage(stage, headers, uri, &mut progress)
                .await
                .map_err(|error| Rejection { stage, error })?;
        }

        progress.identity.ok_or_else(|| Rejection {
            stage: Stage::Accept,
            error: VerifyError::InternalFault("accept produced no identity".into()),
        })
    }

    async fn run_stage(
        &self,
        stage: Stage,
        headers: &HeaderMap,
        uri: &Uri,
        progress: &mut Progress,
    ) -> Result<(), VerifyError> {
        match stage {
            Stage::ExtractEvidence => {
                progress.evidence =
                    Some(SessionEvidence::extract(headers, uri, self.requirements())?);
            }
            Stage::HmacCheck => self.check_hmac(progress.evidence()?)?,
            Stage::JwtCheck => {
                let Some(verifier) = &self.id_tokens else {
                    return Ok(());
                };
                let token = progress
                    .evidence()?
                    .id_token
                    .as_deref()
                    .ok_or(VerifyError::EvidenceMissing("IdToken"))?;
                let claims = verifier.verify(token).await.map_err(|e| match e {
                    IdTokenError::Invalid(reason) => VerifyError::TokenInvalid(reason),
                    IdTokenError::KeySetUnavailable => VerifyError::KeySetUnavailable,
                })?;
                progress.id_claims = Some(claims);
            }
            Stage::Introspect => {
                let Some(introspector) = &self.introspector else {
                    return Ok(());
                };
                let token = progress
                    .evidence()?
                    .bearer_token
                    .as_deref()
                    .ok_or(VerifyError::EvidenceMissing("BearerToken"))?;
                let result = introspector.introspect(token).await.map_err(|e| {
                    warn!(error = %e, "token introspection failed");
                    VerifyError::IntrospectionFailed
                })?;
                progress.introspected_subject = Some(result.subject);
            }
            Stage::Accept => {
                let evidence = progress.evidence()?;
                let subject_email = progress
                    .introspected_subject
                    .clone()
                    .or_else(|| progress.id_claims.as_ref().map(|c| c.subject().to_string()))
                    .unwrap_or_default();
                progress.identity = Some(VerifiedIdentity {
                    subject_email,
                    access_token: evidence.bearer_token.clone(),
                    expires_at: evidence.expires_at.clone(),
                });
            }
        }
        Ok(())
    }

    fn check_hmac(&self, evidence: &SessionEvidence) -> Result<(), VerifyError> {
        let message = self
            .layout
            .build(&SignedFields {
                host: &evidence.host,
                expires: &evidence.expires_at,
                access_token: evidence.bearer_token.as_deref(),
                id_token: evidence.id_token.as_deref(),
            })
            .map_err(|e| match e {
                MessageError::EmptyHost => VerifyError::EvidenceMissing("host"),
                MessageError::MissingField(field) => VerifyError::EvidenceMissing(field),
            })?;

        if self.hmac.verify(&message, &evidence.hmac_digest) {
            Ok(())
        } else {
            Err(VerifyError::SignatureInvalid)
        }
    }
}
