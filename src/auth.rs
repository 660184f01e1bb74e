//! Access tokens for the Sheets API.
//!
//! Either a pre-issued token (config or `SIZEDB_ACCESS_TOKEN`) or a
//! service-account key exchanged through the OAuth2 JWT-bearer grant. One
//! token per run; nothing is cached on disk.

use std::path::{Path, PathBuf};

use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::CredentialsConfig;

pub const ACCESS_TOKEN_ENV: &str = "SIZEDB_ACCESS_TOKEN";
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("failed to read credential file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid service account key {}: {reason}", .path.display())]
    InvalidKey { path: PathBuf, reason: String },

    #[error("failed to sign token assertion: {0}")]
    Sign(#[from] jsonwebtoken::errors::Error),

    #[error("token request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("token endpoint returned {status}: {message}")]
    Rejected { status: u16, message: String },
}

/// The fields of a Google service-account JSON key that the grant needs.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub token_uri: Option<String>,
}

impl ServiceAccountKey {
    pub fn load(path: &Path) -> Result<Self, CredentialError> {
        let content = std::fs::read_to_string(path).map_err(|source| CredentialError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &content)
    }

    fn parse(path: &Path, content: &str) -> Result<Self, CredentialError> {
        let invalid = |reason: String| CredentialError::InvalidKey {
            path: path.to_path_buf(),
            reason,
        };
        let key: Self = serde_json::from_str(content).map_err(|e| invalid(e.to_string()))?;
        if key.client_email.trim().is_empty() {
            return Err(invalid("client_email is empty".to_string()));
        }
        if !key.private_key.contains("PRIVATE KEY") {
            return Err(invalid("private_key is not a PEM key".to_string()));
        }
        Ok(key)
    }
}

#[derive(Debug, Serialize, PartialEq)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

impl<'a> AssertionClaims<'a> {
    fn new(key: &'a ServiceAccountKey, scope: &'a str, aud: &'a str, now: i64) -> Self {
        Self {
            iss: &key.client_email,
            scope,
            aud,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Pick a pre-issued token: the environment wins over the config file.
/// Blank values are ignored.
fn static_token(env_token: Option<String>, config_token: Option<&str>) -> Option<String> {
    env_token
        .filter(|t| !t.trim().is_empty())
        .or_else(|| config_token.filter(|t| !t.trim().is_empty()).map(str::to_string))
}

/// Resolve an access token for the configured credentials.
pub async fn access_token(cfg: &CredentialsConfig) -> Result<String, CredentialError> {
    if let Some(token) = static_token(
        std::env::var(ACCESS_TOKEN_ENV).ok(),
        cfg.access_token.as_deref(),
    ) {
        tracing::info!("using pre-issued access token");
        return Ok(token);
    }

    let key = ServiceAccountKey::load(&cfg.key_path)?;
    let token_uri = cfg
        .token_uri
        .clone()
        .or_else(|| key.token_uri.clone())
        .unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string());
    tracing::info!(client_email = %key.client_email, %token_uri, "exchanging service account assertion");

    let claims = AssertionClaims::new(&key, &cfg.scope, &token_uri, Utc::now().timestamp());
    let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())?;
    let assertion = jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &signing_key)?;

    let client = reqwest::Client::builder().user_agent(&cfg.app_name).build()?;
    let response = client
        .post(&token_uri)
        .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(CredentialError::Rejected {
            status: status.as_u16(),
            message: token_error_message(&body),
        });
    }

    let token: TokenResponse = response.json().await?;
    Ok(token.access_token)
}

fn token_error_message(body: &str) -> String {
    match serde_json::from_str::<TokenErrorResponse>(body) {
        Ok(TokenErrorResponse {
            error,
            error_description: Some(desc),
        }) => format!("{}: {}", error, desc),
        Ok(TokenErrorResponse { error, .. }) => error,
        Err(_) => body.trim().chars().take(200).collect(),
    }
}
