/*
 * Responsibility
 * - 環境変数から設定を読み込む (HMAC 鍵, 署名フォーマット, JWKS, introspection)
 * - 設定値のバリデーション (不足・不正なら起動失敗)
 * - デプロイモード (digest encoding / delimiter / 署名対象フィールド) は起動時に一度だけ確定する
 */
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::services::auth::digest::DigestEncoding;
use crate::services::auth::message::{Delimiter, MessageLayout};

const DEFAULT_TOKENINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/tokeninfo";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
}

impl AppEnv {
    fn parse(value: Option<String>) -> Self {
        match value
            .unwrap_or_else(|| "development".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "missing configuration: {}", key),
            ConfigError::Invalid(key) => write!(f, "invalid configuration: {}", key),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Shared-secret settings for the session cookie digest.
#[derive(Clone)]
pub struct SessionConfig {
    pub hmac_secret: String,
    pub hmac_secret_previous: Option<String>,
    pub digest_encoding: DigestEncoding,
    pub layout: MessageLayout,
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Do not print key material
        f.debug_struct("SessionConfig")
            .field("has_previous_secret", &self.hmac_secret_previous.is_some())
            .field("digest_encoding", &self.digest_encoding)
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct IdTokenConfig {
    pub jwks_url: String,
    pub issuer: String,
    pub audience: String,
    pub leeway_seconds: u64,
    pub jwks_cache_ttl: Duration,
    pub jwks_fetch_timeout: Duration,
    pub jwks_min_refresh_interval: Duration,
    pub background_refresh: bool,
}

#[derive(Debug, Clone)]
pub struct IntrospectionConfig {
    pub url: String,
    pub timeout: Duration,
    pub audience: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub app_env: AppEnv,
    pub request_timeout: Duration,

    pub session: SessionConfig,
    /// Identity-token verification; `None` skips the JWT stage.
    pub id_token: Option<IdTokenConfig>,
    /// Token introspection; `None` skips the introspection stage.
    pub introspection: Option<IntrospectionConfig>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(&lookup);

        let port: u16 = env.parse_or("PORT", 8082)?;
        let addr: SocketAddr = SocketAddr::from_str(&format!("0.0.0.0:{}", port))
            .map_err(|_| ConfigError::Invalid("PORT"))?;
        let app_env = AppEnv::parse(env.get("APP_ENV"));
        let request_timeout = Duration::from_secs(env.parse_or("REQUEST_TIMEOUT_SECONDS", 30)?);

        let validate_user = env.flag("VALIDATE_USER", false)?;
        let verify_id_token = env.flag("VERIFY_ID_TOKEN", false)?;

        let session = SessionConfig {
            hmac_secret: env.required("OAUTH_HMAC_SECRET")?,
            hmac_secret_previous: env.get("OAUTH_HMAC_SECRET_PREVIOUS"),
            digest_encoding: env.parse_or("HMAC_DIGEST_ENCODING", DigestEncoding::HexBase64)?,
            layout: MessageLayout {
                delimiter: env.parse_or("HMAC_MESSAGE_DELIMITER", Delimiter::None)?,
                // The proxy signs the access token whenever it forwards one for introspection.
                include_access_token: env.flag("HMAC_INCLUDE_ACCESS_TOKEN", validate_user)?,
                include_id_token: env.flag("HMAC_INCLUDE_ID_TOKEN", false)?,
            },
        };

        let id_token = if verify_id_token {
            let jwks_url = env.required("JWKS_URL")?;
            check_url(&jwks_url, app_env, "JWKS_URL")?;
            Some(IdTokenConfig {
                jwks_url,
                issuer: env.required("ID_TOKEN_ISSUER")?,
                audience: env.required("ID_TOKEN_AUDIENCE")?,
                leeway_seconds: env.parse_or("ID_TOKEN_LEEWAY_SECONDS", 60)?,
                jwks_cache_ttl: Duration::from_secs(env.parse_or("JWKS_CACHE_TTL_SECONDS", 3600)?),
                jwks_fetch_timeout: Duration::from_millis(
                    env.parse_or("JWKS_FETCH_TIMEOUT_MS", 5000)?,
                ),
                jwks_min_refresh_interval: Duration::from_secs(
                    env.parse_or("JWKS_MIN_REFRESH_INTERVAL_SECONDS", 30)?,
                ),
                background_refresh: env.flag("JWKS_BACKGROUND_REFRESH", false)?,
            })
        } else {
            None
        };

        let introspection = if validate_user {
            let url = env
                .get("INTROSPECTION_URL")
                .unwrap_or_else(|| DEFAULT_TOKENINFO_URL.to_string());
            check_url(&url, app_env, "INTROSPECTION_URL")?;
            Some(IntrospectionConfig {
                url,
                timeout: Duration::from_millis(env.parse_or("INTROSPECTION_TIMEOUT_MS", 2000)?),
                audience: env.get("INTROSPECTION_AUDIENCE"),
            })
        } else {
            None
        };

        Ok(Self {
            addr,
            app_env,
            request_timeout,
            session,
            id_token,
            introspection,
        })
    }
}

struct Env<'a, F>(&'a F);

impl<F> Env<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Trimmed, non-empty value.
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, key: &'static str) -> Result<String, ConfigError> {
        self.get(key).ok_or(ConfigError::Missing(key))
    }

    fn parse_or<T: FromStr>(&self, key: &'static str, default: T) -> Result<T, ConfigError> {
        match self.get(key) {
            Some(v) => v.parse().map_err(|_| ConfigError::Invalid(key)),
            None => Ok(default),
        }
    }

    fn flag(&self, key: &'static str, default: bool) -> Result<bool, ConfigError> {
        match self.get(key).map(|v| v.to_ascii_lowercase()).as_deref() {
            None => Ok(default),
            Some("1" | "true" | "yes" | "on") => Ok(true),
            Some("0" | "false" | "no" | "off") => Ok(false),
            Some(_) => Err(ConfigError::Invalid(key)),
        }
    }
}

// Plain http is only tolerated outside production (local IdP mocks).
fn check_url(raw: &str, app_env: AppEnv, key: &'static str) -> Result<(), ConfigError> {
    let url = url::Url::parse(raw).map_err(|_| ConfigError::Invalid(key))?;
    match url.scheme() {
        "https" => Ok(()),
        "http" if !app_env.is_production() => Ok(()),
        _ => Err(ConfigError::Invalid(key)),
    }
}
