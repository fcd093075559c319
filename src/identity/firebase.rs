// Firebase ID token verification with JWKS caching
// Tokens are RS256 JWTs signed by Google's securetoken service account

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use rsa::{pkcs1v15::VerifyingKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tokio::sync::RwLock;

use super::{IdentityError, IdentityVerifier, VerifiedIdentity};

const ISSUER_PREFIX: &str = "https://securetoken.google.com/";
const CLOCK_SKEW_SECONDS: i64 = 300;

// ============================================================================
// JWT Structures
// ============================================================================

#[derive(Debug, Deserialize)]
struct JwtHeader {
    alg: String,
    kid: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FirebaseClaims {
    pub iss: String,
    pub aud: String,
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
    #[serde(default)]
    pub email: Option<String>,
}

// ============================================================================
// JWKS Structures
// ============================================================================

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JsonWebKeySet {
    pub keys: Vec<JsonWebKey>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JsonWebKey {
    pub kty: String,
    pub kid: Option<String>,
    pub alg: Option<String>,
    #[serde(rename = "use")]
    pub key_use: Option<String>,
    pub n: Option<String>,
    pub e: Option<String>,
}

// ============================================================================
// JWKS Cache
// ============================================================================

pub struct JwksCache {
    // Key ID -> JsonWebKey
    keys: HashMap<String, JsonWebKey>,
    last_updated: Option<DateTime<Utc>>,
    last_failed: Option<DateTime<Utc>>,
    cache_duration: Duration,
    retry_backoff: Duration,
}

impl Default for JwksCache {
    fn default() -> Self {
        Self::new()
    }
}

impl JwksCache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            keys: HashMap::new(),
            last_updated: None,
            last_failed: None,
            cache_duration: Duration::from_secs(3600),
            retry_backoff: Duration::from_secs(300),
        }
    }

    #[must_use]
    pub fn is_cache_valid(&self) -> bool {
        self.last_updated.is_some_and(|updated| {
            let elapsed = Utc::now().signed_duration_since(updated);
            elapsed.to_std().unwrap_or(Duration::MAX) < self.cache_duration
        })
    }

    #[must_use]
    pub fn should_retry_fetch(&self) -> bool {
        if let Some(failed) = self.last_failed {
            let elapsed = Utc::now().signed_duration_since(failed);
            elapsed.to_std().unwrap_or(Duration::MAX) >= self.retry_backoff
        } else {
            true
        }
    }

    #[must_use]
    pub fn get_key(&self, kid: &str) -> Option<&JsonWebKey> {
        self.keys.get(kid)
    }

    /// Replace the cached key set; keys without a `kid` are ignored
    pub fn store_keys(&mut self, keys: Vec<JsonWebKey>) {
        self.keys = keys
            .into_iter()
            .filter_map(|key| key.kid.clone().map(|kid| (kid, key)))
            .collect();
        debug!("💾 Cached {} Firebase signing keys", self.keys.len());
        self.last_updated = Some(Utc::now());
        self.last_failed = None;
    }

    pub fn record_fetch_failure(&mut self) {
        self.last_failed = Some(Utc::now());
    }
}

// ============================================================================
// Verifier
// ============================================================================

#[derive(Clone)]
pub struct FirebaseTokenVerifier {
    project_id: String,
    jwks_uri: String,
    client: reqwest::Client,
    cache: Arc<RwLock<JwksCache>>,
}

impl FirebaseTokenVerifier {
    #[must_use]
    pub fn new(project_id: &str, jwks_uri: &str) -> Self {
        Self {
            project_id: project_id.to_string(),
            jwks_uri: jwks_uri.to_string(),
            client: reqwest::Client::new(),
            cache: Arc::new(RwLock::new(JwksCache::new())),
        }
    }

    /// Seed the key cache without a network fetch
    pub async fn preload_keys(&self, keys: Vec<JsonWebKey>) {
        self.cache.write().await.store_keys(keys);
    }

    /// Verify an ID token and return its claims
    ///
    /// # Errors
    ///
    /// Returns an error if the token is malformed, the signing key cannot be
    /// found, the signature does not verify, or any claim check fails.
    pub async fn verify_token(&self, token: &str) -> Result<FirebaseClaims, IdentityError> {
        let parts: Vec<&str> = token.split('.').collect();
        if parts.len() != 3 {
            return Err(IdentityError::InvalidToken("Invalid JWT format".to_string()));
        }

        let header: JwtHeader = decode_segment(parts[0], "header")?;
        if header.alg != "RS256" {
            return Err(IdentityError::UnsupportedAlgorithm(header.alg));
        }
        let kid = header
            .kid
            .ok_or_else(|| IdentityError::InvalidToken("Missing kid".to_string()))?;

        let key = self.get_public_key(&kid).await?;
        let signing_input = format!("{}.{}", parts[0], parts[1]);
        verify_rs256(signing_input.as_bytes(), parts[2], &key)?;

        let claims: FirebaseClaims = decode_segment(parts[1], "claims")?;
        self.validate_claims(&claims, Utc::now().timestamp())?;

        debug!("✅ ID token verified for subject '{}'", claims.sub);
        Ok(claims)
    }

    async fn get_public_key(&self, kid: &str) -> Result<JsonWebKey, IdentityError> {
        {
            let cache = self.cache.read().await;
            if cache.is_cache_valid() {
                if let Some(key) = cache.get_key(kid) {
                    return Ok(key.clone());
                }
            }
        }

        self.fetch_and_cache_jwks().await?;

        let cache = self.cache.read().await;
        cache
            .get_key(kid)
            .cloned()
            .ok_or_else(|| IdentityError::KeyNotFound(kid.to_string()))
    }

    async fn fetch_and_cache_jwks(&self) -> Result<(), IdentityError> {
        if !self.cache.read().await.should_retry_fetch() {
            return Err(IdentityError::JwksFetchFailed(
                "Skipping fetch due to recent failure and backoff".to_string(),
            ));
        }

        info!("🔑 Fetching Firebase signing keys from {}", self.jwks_uri);
        match self.fetch_jwks().await {
            Ok(jwks) => {
                self.cache.write().await.store_keys(jwks.keys);
                Ok(())
            }
            Err(e) => {
                warn!("Failed to refresh Firebase signing keys: {e}");
                self.cache.write().await.record_fetch_failure();
                Err(e)
            }
        }
    }

    async fn fetch_jwks(&self) -> Result<JsonWebKeySet, IdentityError> {
        let response = self
            .client
            .get(&self.jwks_uri)
            .send()
            .await
            .map_err(|e| IdentityError::JwksFetchFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(IdentityError::JwksFetchFailed(format!(
                "JWKS request failed with status: {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| IdentityError::JwksFetchFailed(format!("Failed to parse JWKS: {e}")))
    }

    fn validate_claims(&self, claims: &FirebaseClaims, now: i64) -> Result<(), IdentityError> {
        let expected_issuer = format!("{ISSUER_PREFIX}{}", self.project_id);
        if claims.iss != expected_issuer {
            return Err(IdentityError::ClaimValidationFailed {
                claim: "iss".to_string(),
                expected: expected_issuer,
                actual: claims.iss.clone(),
            });
        }

        if claims.aud != self.project_id {
            return Err(IdentityError::ClaimValidationFailed {
                claim: "aud".to_string(),
                expected: self.project_id.clone(),
                actual: claims.aud.clone(),
            });
        }

        if now > claims.exp + CLOCK_SKEW_SECONDS {
            return Err(IdentityError::TokenExpired);
        }
        if now < claims.iat - CLOCK_SKEW_SECONDS {
            return Err(IdentityError::TokenNotYetValid);
        }

        if claims.sub.is_empty() {
            return Err(IdentityError::ClaimValidationFailed {
                claim: "sub".to_string(),
                expected: "non-empty subject".to_string(),
                actual: String::new(),
            });
        }

        Ok(())
    }
}

#[async_trait]
impl IdentityVerifier for FirebaseTokenVerifier {
    async fn verify(&self, token: &str) -> Result<VerifiedIdentity, IdentityError> {
        let claims = self.verify_token(token).await?;
        Ok(VerifiedIdentity {
            subject_id: claims.sub,
            email: claims.email,
        })
    }
}

fn decode_segment<T: serde::de::DeserializeOwned>(
    segment: &str,
    name: &str,
) -> Result<T, IdentityError> {
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| IdentityError::InvalidToken(format!("Invalid {name} encoding: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| IdentityError::InvalidToken(format!("Invalid {name} JSON: {e}")))
}

fn verify_rs256(
    signing_input: &[u8],
    signature_b64: &str,
    key: &JsonWebKey,
) -> Result<(), IdentityError> {
    use rsa::signature::Verifier;

    let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
    let n = key
        .n
        .as_ref()
        .ok_or_else(|| IdentityError::KeyDecodingFailed("Missing RSA modulus (n)".to_string()))?;
    let e = key
        .e
        .as_ref()
        .ok_or_else(|| IdentityError::KeyDecodingFailed("Missing RSA exponent (e)".to_string()))?;
    let n_bytes = engine
        .decode(n)
        .map_err(|e| IdentityError::KeyDecodingFailed(format!("Invalid modulus encoding: {e}")))?;
    let e_bytes = engine
        .decode(e)
        .map_err(|e| IdentityError::KeyDecodingFailed(format!("Invalid exponent encoding: {e}")))?;

    let rsa_key = RsaPublicKey::new(
        rsa::BigUint::from_bytes_be(&n_bytes),
        rsa::BigUint::from_bytes_be(&e_bytes),
    )
    .map_err(|e| IdentityError::KeyDecodingFailed(format!("Invalid RSA key: {e}")))?;

    let signature_bytes = engine
        .decode(signature_b64)
        .map_err(|e| IdentityError::InvalidToken(format!("Invalid signature encoding: {e}")))?;
    let signature = rsa::pkcs1v15::Signature::try_from(signature_bytes.as_slice())
        .map_err(|_| IdentityError::SignatureInvalid)?;

    VerifyingKey::<Sha256>::new(rsa_key)
        .verify(signing_input, &signature)
        .map_err(|_| IdentityError::SignatureInvalid)
}
