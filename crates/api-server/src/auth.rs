//! Bearer-token verification against an identity provider's key set
//!
//! Tokens are RS256 JWTs. The signing key set is fetched fresh from the
//! provider's JWKS endpoint for every verification, so key rotation upstream
//! is picked up without a restart. When no provider is configured the
//! verifier degrades to a single local principal, which keeps development
//! setups working without an identity provider account.

use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use video_recon_common::config::AuthConfig;

/// Subject used when verification is disabled
const LOCAL_SUBJECT: &str = "local";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingToken,

    #[error("invalid token: {0}")]
    InvalidToken(String),

    /// The provider's key set could not be fetched or used
    #[error("key set unavailable: {0}")]
    KeySetUnavailable(String),
}

#[derive(Debug, Deserialize)]
struct KeySet {
    keys: Vec<Key>,
}

#[derive(Debug, Deserialize)]
struct Key {
    #[serde(default)]
    kid: String,
    #[serde(default)]
    kty: String,
    #[serde(default)]
    n: String,
    #[serde(default)]
    e: String,
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
}

/// Verifies bearer tokens, or stands in for verification when disabled
#[derive(Debug)]
pub enum TokenVerifier {
    /// No provider configured; every request maps to the local principal
    Disabled,
    /// RS256 verification against the provider's published keys
    Provider(AuthConfig),
}

impl TokenVerifier {
    #[must_use]
    pub fn from_config(auth: Option<AuthConfig>) -> Self {
        match auth {
            Some(config) => Self::Provider(config),
            None => Self::Disabled,
        }
    }

    /// Verify a bearer token and return the stable subject it names
    pub async fn verify(&self, token: Option<&str>) -> Result<String, AuthError> {
        let config = match self {
            Self::Disabled => return Ok(LOCAL_SUBJECT.to_string()),
            Self::Provider(config) => config,
        };
        let token = token.ok_or(AuthError::MissingToken)?;

        let header =
            decode_header(token).map_err(|e| AuthError::InvalidToken(e.to_string()))?;
        let kid = header
            .kid
            .ok_or_else(|| AuthError::InvalidToken("token has no key id".to_string()))?;

        let key_set = fetch_key_set(&config.domain).await?;
        let key = key_set
            .keys
            .iter()
            .find(|k| k.kid == kid && k.kty == "RSA")
            .ok_or_else(|| AuthError::InvalidToken(format!("no signing key for kid {kid}")))?;

        let decoding_key = DecodingKey::from_rsa_components(&key.n, &key.e)
            .map_err(|e| AuthError::KeySetUnavailable(e.to_string()))?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[&config.audience]);
        validation.set_issuer(&[format!("https://{}/", config.domain)]);

        let data = decode::<Claims>(token, &decoding_key, &validation)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;
        debug!(subject = %data.claims.sub, "token verified");
        Ok(data.claims.sub)
    }
}

async fn fetch_key_set(domain: &str) -> Result<KeySet, AuthError> {
    let url = format!("https://{domain}/.well-known/jwks.json");
    let response = reqwest::get(&url)
        .await
        .map_err(|e| AuthError::KeySetUnavailable(e.to_string()))?;

    if !response.status().is_success() {
        return Err(AuthError::KeySetUnavailable(format!(
            "key set endpoint answered {}",
            response.status()
        )));
    }

    response
        .json::<KeySet>()
        .await
        .map_err(|e| AuthError::KeySetUnavailable(e.to_string()))
}
