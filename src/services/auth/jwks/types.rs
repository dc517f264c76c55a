use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use jsonwebtoken::jwk::{AlgorithmParameters, EllipticCurve, Jwk, KeyAlgorithm, PublicKeyUse};
use jsonwebtoken::{Algorithm, DecodingKey};
use tracing::warn;

/// A verification key taken from the key set, with the one algorithm it may be used with.
///
/// The algorithm comes from the key material (`alg`, or `kty`/`crv` when `alg` is absent),
/// never from a token header.
#[derive(Clone)]
pub struct ResolvedKey {
    kid: String,
    algorithm: Algorithm,
    decoding_key: DecodingKey,
}

impl ResolvedKey {
    pub fn kid(&self) -> &str {
        &self.kid
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }

    fn from_jwk(jwk: &Jwk) -> Result<Self, &'static str> {
        let kid = jwk.common.key_id.clone().ok_or("missing kid")?;

        if matches!(jwk.common.public_key_use, Some(PublicKeyUse::Encryption)) {
            return Err("encryption key");
        }

        let algorithm = algorithm_for(jwk)?;
        let decoding_key = DecodingKey::from_jwk(jwk).map_err(|_| "unusable key material")?;

        Ok(Self {
            kid,
            algorithm,
            decoding_key,
        })
    }
}

impl std::fmt::Debug for ResolvedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedKey")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

fn declared_algorithm(alg: &KeyAlgorithm) -> Option<Algorithm> {
    Some(match alg {
        KeyAlgorithm::RS256 => Algorithm::RS256,
        KeyAlgorithm::RS384 => Algorithm::RS384,
        KeyAlgorithm::RS512 => Algorithm::RS512,
        KeyAlgorithm::PS256 => Algorithm::PS256,
        KeyAlgorithm::PS384 => Algorithm::PS384,
        KeyAlgorithm::PS512 => Algorithm::PS512,
        KeyAlgorithm::ES256 => Algorithm::ES256,
        KeyAlgorithm::ES384 => Algorithm::ES384,
        KeyAlgorithm::EdDSA => Algorithm::EdDSA,
        _ => return None,
    })
}

/// Signature algorithm implied by the key type, checked against `alg` when the key declares one.
fn algorithm_for(jwk: &Jwk) -> Result<Algorithm, &'static str> {
    let by_type = match &jwk.algorithm {
        AlgorithmParameters::RSA(_) => Algorithm::RS256,
        AlgorithmParameters::EllipticCurve(params) => match params.curve {
            EllipticCurve::P256 => Algorithm::ES256,
            EllipticCurve::P384 => Algorithm::ES384,
            _ => return Err("unsupported curve"),
        },
        AlgorithmParameters::OctetKeyPair(params) => match params.curve {
            EllipticCurve::Ed25519 => Algorithm::EdDSA,
            _ => return Err("unsupported curve"),
        },
        // Symmetric (`oct`) keys have no place in a public key set.
        _ => return Err("unsupported key type"),
    };

    let Some(declared) = jwk.common.key_algorithm.as_ref() else {
        return Ok(by_type);
    };
    let declared = declared_algorithm(declared).ok_or("unsupported alg")?;

    let compatible = match by_type {
        Algorithm::RS256 => matches!(
            declared,
            Algorithm::RS256
                | Algorithm::RS384
                | Algorithm::RS512
                | Algorithm::PS256
                | Algorithm::PS384
                | Algorithm::PS512
        ),
        other => declared == other,
    };
    if !compatible {
        return Err("alg does not match key type");
    }
    Ok(declared)
}

/// Outcome of looking a `kid` up in one snapshot.
#[derive(Debug)]
pub enum Lookup<'a> {
    Found(&'a Arc<ResolvedKey>),
    Ambiguous,
    Missing,
}

/// Immutable view of the key set as fetched at one point in time.
///
/// Snapshots are built completely before being published; a reader holding one never sees
/// another fetch's keys.
#[derive(Debug)]
pub struct KeySnapshot {
    keys: HashMap<String, Arc<ResolvedKey>>,
    ambiguous: HashSet<String>,
    fetched_at: Instant,
}

impl KeySnapshot {
    /// Build a snapshot from the raw `keys` array of a JWKS document.
    ///
    /// Entries that cannot be used for signature verification are skipped. A `kid` that appears
    /// more than once is remembered as ambiguous and never resolves.
    pub fn from_documents(documents: Vec<serde_json::Value>) -> Self {
        let mut keys: HashMap<String, Arc<ResolvedKey>> = HashMap::new();
        let mut ambiguous = HashSet::new();

        for doc in documents {
            let jwk: Jwk = match serde_json::from_value(doc) {
                Ok(jwk) => jwk,
                Err(err) => {
                    warn!(error = %err, "skipping unparsable JWK");
                    continue;
                }
            };
            let key = match ResolvedKey::from_jwk(&jwk) {
                Ok(key) => key,
                Err(reason) => {
                    warn!(kid = ?jwk.common.key_id, reason, "skipping JWK");
                    continue;
                }
            };

            if ambiguous.contains(&key.kid) {
                continue;
            }
            if keys.remove(&key.kid).is_some() {
                warn!(kid = %key.kid, "duplicate kid in key set");
                ambiguous.insert(key.kid);
                continue;
            }
            keys.insert(key.kid.clone(), Arc::new(key));
        }

        Self {
            keys,
            ambiguous,
            fetched_at: Instant::now(),
        }
    }

    pub fn lookup(&self, kid: &str) -> Lookup<'_> {
        if self.ambiguous.contains(kid) {
            return Lookup::Ambiguous;
        }
        match self.keys.get(kid) {
            Some(key) => Lookup::Found(key),
            None => Lookup::Missing,
        }
    }

    /// Number of usable keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn age(&self) -> Duration {
        self.fetched_at.elapsed()
    }
}
