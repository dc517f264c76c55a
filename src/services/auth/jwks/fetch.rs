//! Key set retrieval.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

/// Largest JWKS document we are willing to parse.
pub const MAX_JWKS_SIZE: usize = 512 * 1024;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("jwks transport error: {0}")]
    Transport(String),
    #[error("jwks endpoint returned status {0}")]
    Status(u16),
    #[error("jwks document too large: {0} bytes")]
    TooLarge(usize),
    #[error("jwks document invalid: {0}")]
    Parse(String),
}

/// Source of the raw `keys` array of a JWKS document.
///
/// Parsing individual keys is left to the snapshot so one bad entry does not discard the set.
#[async_trait]
pub trait KeySetFetcher: Send + Sync {
    async fn fetch(&self) -> Result<Vec<serde_json::Value>, FetchError>;
}

#[derive(Deserialize)]
struct RawKeySet {
    keys: Vec<serde_json::Value>,
}

/// Fetches the key set over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpJwksFetcher {
    client: reqwest::Client,
    url: String,
}

impl HttpJwksFetcher {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl KeySetFetcher for HttpJwksFetcher {
    async fn fetch(&self) -> Result<Vec<serde_json::Value>, FetchError> {
        debug!(url = %self.url, "fetching JWKS");

        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        if let Some(len) = response.content_length()
            && len as usize > MAX_JWKS_SIZE
        {
            return Err(FetchError::TooLarge(len as usize));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        if bytes.len() > MAX_JWKS_SIZE {
            return Err(FetchError::TooLarge(bytes.len()));
        }

        let set: RawKeySet =
            serde_json::from_slice(&bytes).map_err(|e| FetchError::Parse(e.to_string()))?;
        Ok(set.keys)
    }
}
