//! Firebase-style ID tokens signed with the RS256 test key

use base64::Engine as _;
use chrono::Utc;
use ring::rand::SystemRandom;
use ring::signature::{RsaKeyPair, RsaPublicKeyComponents, RSA_PKCS1_SHA256};
use serde::Serialize;

use super::keys::rsa_test_key_pkcs8;
use super::{TEST_KID, TEST_PROJECT_ID};
use crate::identity::JsonWebKey;

/// Claims placed in a minted token
#[derive(Debug, Clone, Serialize)]
pub struct TokenClaims {
    pub iss: String,
    pub aud: String,
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl TokenClaims {
    /// Claims valid for the next hour against [`TEST_PROJECT_ID`]
    #[must_use]
    pub fn for_subject(subject: &str) -> Self {
        let now = Utc::now().timestamp();
        Self {
            iss: format!("https://securetoken.google.com/{TEST_PROJECT_ID}"),
            aud: TEST_PROJECT_ID.to_string(),
            sub: subject.to_string(),
            exp: now + 3600,
            iat: now,
            email: None,
        }
    }

    #[must_use]
    pub fn with_email(mut self, email: &str) -> Self {
        self.email = Some(email.to_string());
        self
    }
}

/// Sign `claims` as an RS256 JWT with [`TEST_KID`]
///
/// # Panics
///
/// Panics if the test key cannot be loaded or signing fails.
#[must_use]
pub fn mint_id_token(claims: &TokenClaims) -> String {
    let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
    let header = serde_json::json!({ "alg": "RS256", "typ": "JWT", "kid": TEST_KID });
    let signing_input = format!(
        "{}.{}",
        engine.encode(header.to_string()),
        engine.encode(serde_json::to_vec(claims).expect("serialize claims"))
    );

    let key = RsaKeyPair::from_pkcs8(&rsa_test_key_pkcs8()).expect("load RSA test key");
    let mut signature = vec![0u8; key.public().modulus_len()];
    key.sign(
        &RSA_PKCS1_SHA256,
        &SystemRandom::new(),
        signing_input.as_bytes(),
        &mut signature,
    )
    .expect("sign token");

    format!("{signing_input}.{}", engine.encode(signature))
}

/// Public half of the test key as a JWKS entry
///
/// # Panics
///
/// Panics if the test key cannot be loaded.
#[must_use]
pub fn test_jwk() -> JsonWebKey {
    let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
    let key = RsaKeyPair::from_pkcs8(&rsa_test_key_pkcs8()).expect("load RSA test key");
    let components = RsaPublicKeyComponents::<Vec<u8>>::from(key.public());
    JsonWebKey {
        kty: "RSA".to_string(),
        kid: Some(TEST_KID.to_string()),
        alg: Some("RS256".to_string()),
        key_use: Some("sig".to_string()),
        n: Some(engine.encode(components.n)),
        e: Some(engine.encode(components.e)),
    }
}
