/// Factory: build the `VerificationPipeline` from application `Config`.
use std::sync::Arc;
use std::time::Duration;

use crate::config::{Config, IdTokenConfig};
use crate::error::AppError;
use crate::services::auth::digest::{HmacVerifier, SigningKey};
use crate::services::auth::id_token::IdTokenVerifier;
use crate::services::auth::introspection::HttpTokenIntrospector;
use crate::services::auth::jwks::{CachePolicy, HttpJwksFetcher, JwksResolver};
use crate::services::auth::pipeline::VerificationPipeline;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

pub fn build_pipeline(config: &Config) -> Result<Arc<VerificationPipeline>, AppError> {
    let session = &config.session;

    let current = SigningKey::new(&session.hmac_secret).map_err(|err| {
        tracing::error!(error = %err, "OAUTH_HMAC_SECRET rejected");
        AppError::Internal
    })?;
    let previous = session
        .hmac_secret_previous
        .as_ref()
        .map(SigningKey::new)
        .transpose()
        .map_err(|err| {
            tracing::error!(error = %err, "OAUTH_HMAC_SECRET_PREVIOUS rejected");
            AppError::Internal
        })?;
    let hmac = HmacVerifier::new(current, previous, session.digest_encoding);

    let mut pipeline = VerificationPipeline::new(session.layout, hmac);

    if config.id_token.is_none() && config.introspection.is_none() {
        return Ok(Arc::new(pipeline));
    }

    // One connection pool for both identity provider endpoints.
    let client = reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to build HTTP client");
            AppError::Internal
        })?;

    if let Some(id) = &config.id_token {
        pipeline = pipeline.with_id_tokens(build_id_token_verifier(client.clone(), id));
    }

    if let Some(introspection) = &config.introspection {
        pipeline = pipeline.with_introspection(Arc::new(HttpTokenIntrospector::new(
            client,
            introspection.url.clone(),
            introspection.timeout,
            introspection.audience.clone(),
        )));
    }

    tracing::info!(stages = ?pipeline.plan(), "verification pipeline ready");
    Ok(Arc::new(pipeline))
}

fn build_id_token_verifier(client: reqwest::Client, config: &IdTokenConfig) -> IdTokenVerifier {
    let fetcher = Arc::new(HttpJwksFetcher::new(client, config.jwks_url.clone()));
    let resolver = Arc::new(JwksResolver::new(
        fetcher,
        CachePolicy {
            ttl: config.jwks_cache_ttl,
            min_refresh_interval: config.jwks_min_refresh_interval,
            fetch_timeout: config.jwks_fetch_timeout,
        },
    ));

    if config.background_refresh {
        let every = (config.jwks_cache_ttl / 2).max(Duration::from_secs(1));
        resolver.spawn_refresh(every);
    }

    IdTokenVerifier::new(
        resolver,
        config.audience.clone(),
        config.issuer.clone(),
        config.leeway_seconds,
    )
}
