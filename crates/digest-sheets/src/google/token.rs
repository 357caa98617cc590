//! OAuth2 bearer tokens for a service account (JWT bearer grant).

use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use super::{check_status, transport_error};
use crate::config::{ConfigError, ServiceAccountKey};
use crate::error::ApiError;

pub const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
/// Lifetime requested for each signed assertion; Google caps it at one hour.
const ASSERTION_LIFETIME_SECS: u64 = 3600;
/// Refresh this long before the token actually expires.
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Serialize, PartialEq, Eq)]
pub(crate) struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: u64,
    exp: u64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    ASSERTION_LIFETIME_SECS
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    refresh_at: Instant,
}

/// Signs assertions with the service-account key and caches the resulting
/// access token until shortly before it expires.
pub struct TokenProvider {
    client_email: String,
    token_uri: String,
    key_id: Option<String>,
    encoding_key: EncodingKey,
    cached: Mutex<Option<CachedToken>>,
}

impl std::fmt::Debug for TokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenProvider")
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

impl TokenProvider {
    pub fn new(key: &ServiceAccountKey) -> Result<Self, ConfigError> {
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| ConfigError::InvalidPrivateKey(e.to_string()))?;
        Ok(Self {
            client_email: key.client_email.clone(),
            token_uri: key.token_uri.clone(),
            key_id: key.private_key_id.clone(),
            encoding_key,
            cached: Mutex::new(None),
        })
    }

    fn cached(&self) -> MutexGuard<'_, Option<CachedToken>> {
        match self.cached.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub(crate) fn claims(&self, issued_at: u64) -> Claims<'_> {
        Claims {
            iss: &self.client_email,
            scope: SHEETS_SCOPE,
            aud: &self.token_uri,
            iat: issued_at,
            exp: issued_at + ASSERTION_LIFETIME_SECS,
        }
    }

    /// A valid access token, exchanging a fresh assertion when needed.
    pub fn bearer(&self, http: &Client) -> Result<String, ApiError> {
        if let Some(token) = self.cached().as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.value.clone());
            }
        }

        let issued_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs());
        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key_id.clone();
        let assertion = encode(&header, &self.claims(issued_at), &self.encoding_key)
            .map_err(|e| ApiError::transport(format!("failed to sign token assertion: {e}")))?;

        let requested_at = Instant::now();
        let response = http
            .post(&self.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .map_err(transport_error)?;
        let token: TokenResponse = check_status(response)?
            .json()
            .map_err(|e| ApiError::transport(format!("invalid token response: {e}")))?;
        log::debug!(
            "obtained access token for {} (expires in {}s)",
            self.client_email,
            token.expires_in
        );

        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(REFRESH_MARGIN);
        *self.cached() = Some(CachedToken {
            value: token.access_token.clone(),
            refresh_at: requested_at + lifetime,
        });
        Ok(token.access_token)
    }
}
