use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

use crate::error::AppError;
use crate::http_client::HttpClient;

/// Group whose members may modify items.
pub const ADMIN_GROUP: &str = "Admin";

/// Unknown key ids do not trigger another fetch within this window.
pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing authorization token")]
    MissingToken,
    #[error("Invalid token: {0}")]
    InvalidToken(String),
    #[error("Unable to load signing keys: {0}")]
    KeysUnavailable(String),
    #[error("User is not in the {} group", ADMIN_GROUP)]
    NotAdmin,
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::NotAdmin => AppError::Forbidden("Admin access required".into()),
            AuthError::MissingToken => AppError::Unauthorized(err.to_string()),
            other => {
                tracing::warn!("Rejected bearer token: {}", other);
                AppError::Unauthorized("Invalid token".into())
            }
        }
    }
}

/// Identity carried by a verified token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminClaims {
    pub subject: String,
    pub username: Option<String>,
    pub groups: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TokenClaims {
    sub: String,
    #[serde(default)]
    username: Option<String>,
    #[serde(default, rename = "cognito:groups")]
    groups: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct JwkKey {
    kid: String,
    kty: String,
    n: String,
    e: String,
}

#[derive(Debug, Deserialize)]
struct JwksResponse {
    keys: Vec<JwkKey>,
}

struct CachedKeys {
    keys: HashMap<String, JwkKey>,
    fetched_at: Instant,
}

/// Signing keys fetched from a JWKS endpoint, kept for `ttl` and refetched early
/// when a token names a key id the cache has never seen. Only one fetch runs at
/// a time; callers waiting on it reuse its result.
pub struct JwksCache {
    http: HttpClient,
    jwks_url: String,
    ttl: Duration,
    min_refresh: Duration,
    cache: RwLock<Option<CachedKeys>>,
    refresh: Mutex<()>,
}

impl JwksCache {
    pub fn new(http: HttpClient, jwks_url: String, ttl: Duration) -> Self {
        Self {
            http,
            jwks_url,
            ttl,
            min_refresh: MIN_REFRESH_INTERVAL,
            cache: RwLock::new(None),
            refresh: Mutex::new(()),
        }
    }

    async fn decoding_key(&self, kid: &str) -> Result<DecodingKey, AuthError> {
        let seen = {
            let cache = self.cache.read().await;
            match cache.as_ref() {
                Some(cached) if cached.fetched_at.elapsed() < self.ttl => {
                    if let Some(key) = cached.keys.get(kid) {
                        return jwk_to_decoding_key(key);
                    }
                    if cached.fetched_at.elapsed() < self.min_refresh {
                        return Err(unknown_kid(kid));
                    }
                    Some(cached.fetched_at)
                }
                Some(cached) => Some(cached.fetched_at),
                None => None,
            }
        };

        let _guard = self.refresh.lock().await;

        // Another caller may have refreshed while we waited.
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if Some(cached.fetched_at) != seen && cached.fetched_at.elapsed() < self.ttl {
                    return cached
                        .keys
                        .get(kid)
                        .ok_or_else(|| unknown_kid(kid))
                        .and_then(jwk_to_decoding_key);
                }
            }
        }

        tracing::info!("Fetching signing keys from {}", self.jwks_url);
        let jwks: JwksResponse = self
            .http
            .get_json(&self.jwks_url)
            .await
            .map_err(|e| AuthError::KeysUnavailable(e.to_string()))?;

        let keys: HashMap<String, JwkKey> = jwks
            .keys
            .into_iter()
            .map(|key| (key.kid.clone(), key))
            .collect();
        let result = keys
            .get(kid)
            .ok_or_else(|| unknown_kid(kid))
            .and_then(jwk_to_decoding_key);

        *self.cache.write().await = Some(CachedKeys {
            keys,
            fetched_at: Instant::now(),
        });

        result
    }
}

fn unknown_kid(kid: &str) -> AuthError {
    AuthError::InvalidToken(format!("signing key '{}' not found", kid))
}

fn jwk_to_decoding_key(key: &JwkKey) -> Result<DecodingKey, AuthError> {
    if key.kty != "RSA" {
        return Err(AuthError::InvalidToken(format!(
            "unsupported key type: {}",
            key.kty
        )));
    }
    DecodingKey::from_rsa_components(&key.n, &key.e)
        .map_err(|e| AuthError::InvalidToken(format!("bad signing key: {}", e)))
}

/// Verifies RS256 bearer tokens against the JWKS and checks admin membership.
#[derive(Clone)]
pub struct TokenVerifier {
    keys: Arc<JwksCache>,
}

impl TokenVerifier {
    pub fn new(keys: Arc<JwksCache>) -> Self {
        Self { keys }
    }

    pub async fn verify(&self, token: &str) -> Result<AdminClaims, AuthError> {
        let header =
            decode_header(token).map_err(|e| AuthError::InvalidToken(e.to_string()))?;
        let kid = header
            .kid
            .ok_or_else(|| AuthError::InvalidToken("missing kid in token header".into()))?;

        let key = self.keys.decoding_key(&kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_aud = false;

        let data = decode::<TokenClaims>(token, &key, &validation)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;

        Ok(AdminClaims {
            subject: data.claims.sub,
            username: data.claims.username,
            groups: data.claims.groups,
        })
    }

    /// Verifies the token and requires membership in [`ADMIN_GROUP`].
    pub async fn authorize_admin(&self, token: &str) -> Result<AdminClaims, AuthError> {
        let claims = self.verify(token).await?;
        if !claims.groups.iter().any(|g| g == ADMIN_GROUP) {
            tracing::warn!(
                "Non-admin user {} attempted an admin operation",
                claims.username.as_deref().unwrap_or(&claims.subject)
            );
            return Err(AuthError::NotAdmin);
        }
        Ok(claims)
    }
}
