//! Software authenticator
//!
//! Produces real attestation objects and signed assertions so ceremonies can be
//! exercised end to end without a browser or a hardware key.

use ciborium::value::Value;
use ring::rand::{SecureRandom, SystemRandom};
use ring::signature::{
    EcdsaKeyPair, Ed25519KeyPair, KeyPair, RsaKeyPair, RsaPublicKeyComponents,
    ECDSA_P256_SHA256_ASN1_SIGNING, RSA_PKCS1_SHA256,
};
use serde_json::json;

use super::keys::rsa_test_key_pkcs8;
use crate::webauthn::cbor::{FLAG_AT, FLAG_UP, FLAG_UV};
use crate::webauthn::crypto::{encode_b64url, sha256};
use crate::webauthn::{
    AuthenticationResponse, AuthenticatorAssertionResponse, AuthenticatorAttestationResponse,
    CoseAlgorithm, CosePublicKey, RegistrationResponse,
};

enum SigningKey {
    Es256(EcdsaKeyPair),
    EdDsa(Ed25519KeyPair),
    Rs256(RsaKeyPair),
}

pub struct SoftAuthenticator {
    key: SigningKey,
    rng: SystemRandom,
    credential_id: Vec<u8>,
    sign_count: u32,
    counter_enabled: bool,
    user_present: bool,
    user_verified: bool,
    user_handle: Option<Vec<u8>>,
}

impl SoftAuthenticator {
    /// New authenticator with a fresh key (RS256 uses the shared test key)
    /// and a random 16-byte credential id
    ///
    /// # Panics
    ///
    /// Panics if key generation fails.
    #[must_use]
    pub fn new(algorithm: CoseAlgorithm) -> Self {
        let rng = SystemRandom::new();
        let key = match algorithm {
            CoseAlgorithm::Es256 => {
                let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, &rng)
                    .expect("generate P-256 key");
                SigningKey::Es256(
                    EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, pkcs8.as_ref(), &rng)
                        .expect("load P-256 key"),
                )
            }
            CoseAlgorithm::EdDsa => {
                let pkcs8 = Ed25519KeyPair::generate_pkcs8(&rng).expect("generate Ed25519 key");
                SigningKey::EdDsa(
                    Ed25519KeyPair::from_pkcs8(pkcs8.as_ref()).expect("load Ed25519 key"),
                )
            }
            CoseAlgorithm::Rs256 => SigningKey::Rs256(
                RsaKeyPair::from_pkcs8(&rsa_test_key_pkcs8()).expect("load RSA test key"),
            ),
        };

        let mut credential_id = vec![0u8; 16];
        rng.fill(&mut credential_id).expect("random credential id");

        Self {
            key,
            rng,
            credential_id,
            sign_count: 0,
            counter_enabled: true,
            user_present: true,
            user_verified: true,
            user_handle: None,
        }
    }

    /// Never set the user-present flag
    #[must_use]
    pub fn without_user_presence(mut self) -> Self {
        self.user_present = false;
        self
    }

    /// Never set the user-verified flag
    #[must_use]
    pub fn without_user_verification(mut self) -> Self {
        self.user_verified = false;
        self
    }

    /// Always report a signature counter of zero
    #[must_use]
    pub fn without_counter(mut self) -> Self {
        self.counter_enabled = false;
        self
    }

    #[must_use]
    pub fn with_credential_id(mut self, credential_id: Vec<u8>) -> Self {
        self.credential_id = credential_id;
        self
    }

    /// Return this user handle in assertions, like a discoverable credential does
    #[must_use]
    pub fn with_user_handle(mut self, user_handle: Vec<u8>) -> Self {
        self.user_handle = Some(user_handle);
        self
    }

    #[must_use]
    pub fn credential_id(&self) -> &[u8] {
        &self.credential_id
    }

    #[must_use]
    pub fn credential_id_b64(&self) -> String {
        encode_b64url(&self.credential_id)
    }

    #[must_use]
    pub fn sign_count(&self) -> u32 {
        self.sign_count
    }

    /// COSE encoding of the public key, as placed in attested credential data
    #[must_use]
    pub fn cose_public_key(&self) -> Vec<u8> {
        let key = match &self.key {
            SigningKey::Es256(pair) => {
                let point = pair.public_key().as_ref();
                CosePublicKey::Es256 {
                    x: point[1..33].to_vec(),
                    y: point[33..65].to_vec(),
                }
            }
            SigningKey::EdDsa(pair) => CosePublicKey::EdDsa {
                x: pair.public_key().as_ref().to_vec(),
            },
            SigningKey::Rs256(pair) => {
                let components = RsaPublicKeyComponents::<Vec<u8>>::from(pair.public());
                CosePublicKey::Rs256 {
                    n: components.n,
                    e: components.e,
                }
            }
        };
        key.to_cbor()
    }

    /// Build a registration response for `challenge` (base64url)
    #[must_use]
    pub fn register(&self, challenge: &str, origin: &str, rp_id: &str) -> RegistrationResponse {
        let client_data = client_data_json("webauthn.create", challenge, origin);

        let sign_count = self.reported_count(self.sign_count);
        let mut auth_data = self.auth_data_header(rp_id, FLAG_AT, sign_count);
        auth_data.extend_from_slice(&[0u8; 16]); // AAGUID
        let id_len = u16::try_from(self.credential_id.len()).expect("credential id length");
        auth_data.extend_from_slice(&id_len.to_be_bytes());
        auth_data.extend_from_slice(&self.credential_id);
        auth_data.extend_from_slice(&self.cose_public_key());

        let attestation = Value::Map(vec![
            (Value::Text("fmt".into()), Value::Text("none".into())),
            (Value::Text("attStmt".into()), Value::Map(Vec::new())),
            (Value::Text("authData".into()), Value::Bytes(auth_data)),
        ]);
        let mut attestation_object = Vec::new();
        ciborium::ser::into_writer(&attestation, &mut attestation_object)
            .expect("encode attestation object");

        RegistrationResponse {
            id: self.credential_id_b64(),
            raw_id: self.credential_id_b64(),
            response: AuthenticatorAttestationResponse {
                client_data_json: encode_b64url(client_data.as_bytes()),
                attestation_object: encode_b64url(&attestation_object),
                transports: vec!["internal".to_string()],
            },
            client_extension_results: None,
            r#type: "public-key".to_string(),
        }
    }

    /// Sign an assertion, advancing the internal counter first
    pub fn authenticate(
        &mut self,
        challenge: &str,
        origin: &str,
        rp_id: &str,
    ) -> AuthenticationResponse {
        if self.counter_enabled {
            self.sign_count += 1;
        }
        self.assert_with_count(challenge, origin, rp_id, self.sign_count)
    }

    /// Sign an assertion reporting exactly `sign_count`
    #[must_use]
    pub fn assert_with_count(
        &self,
        challenge: &str,
        origin: &str,
        rp_id: &str,
        sign_count: u32,
    ) -> AuthenticationResponse {
        let client_data = client_data_json("webauthn.get", challenge, origin);
        let auth_data = self.auth_data_header(rp_id, 0, self.reported_count(sign_count));

        let mut message = auth_data.clone();
        message.extend_from_slice(&sha256(client_data.as_bytes()));
        let signature = self.sign(&message);

        AuthenticationResponse {
            id: self.credential_id_b64(),
            raw_id: self.credential_id_b64(),
            response: AuthenticatorAssertionResponse {
                client_data_json: encode_b64url(client_data.as_bytes()),
                authenticator_data: encode_b64url(&auth_data),
                signature: encode_b64url(&signature),
                user_handle: self.user_handle.as_deref().map(encode_b64url),
            },
            client_extension_results: None,
            r#type: "public-key".to_string(),
        }
    }

    fn reported_count(&self, sign_count: u32) -> u32 {
        if self.counter_enabled {
            sign_count
        } else {
            0
        }
    }

    fn auth_data_header(&self, rp_id: &str, extra_flags: u8, sign_count: u32) -> Vec<u8> {
        let mut flags = extra_flags;
        if self.user_present {
            flags |= FLAG_UP;
        }
        if self.user_verified {
            flags |= FLAG_UV;
        }
        let mut out = sha256(rp_id.as_bytes()).to_vec();
        out.push(flags);
        out.extend_from_slice(&sign_count.to_be_bytes());
        out
    }

    fn sign(&self, message: &[u8]) -> Vec<u8> {
        match &self.key {
            SigningKey::Es256(pair) => pair
                .sign(&self.rng, message)
                .expect("ECDSA signing")
                .as_ref()
                .to_vec(),
            SigningKey::EdDsa(pair) => pair.sign(message).as_ref().to_vec(),
            SigningKey::Rs256(pair) => {
                let mut signature = vec![0u8; pair.public().modulus_len()];
                pair.sign(&RSA_PKCS1_SHA256, &self.rng, message, &mut signature)
                    .expect("RSA signing");
                signature
            }
        }
    }
}

fn client_data_json(ceremony_type: &str, challenge: &str, origin: &str) -> String {
    json!({
        "type": ceremony_type,
        "challenge": challenge,
        "origin": origin,
        "crossOrigin": false
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webauthn::crypto::decode_b64url;
    use crate::webauthn::AuthenticatorData;

    #[test]
    fn test_cose_key_round_trips_through_parser() {
        for alg in CoseAlgorithm::SUPPORTED {
            let authenticator = SoftAuthenticator::new(alg);
            let key = CosePublicKey::from_cbor(&authenticator.cose_public_key()).unwrap();
            assert_eq!(key.algorithm(), alg);
        }
    }

    #[test]
    fn test_counter_advances_per_assertion() {
        let mut authenticator = SoftAuthenticator::new(CoseAlgorithm::EdDsa);
        for expected in 1..=3 {
            let response = authenticator.authenticate("Y2g", "https://example.com", "example.com");
            let raw = decode_b64url(&response.response.authenticator_data, "authData").unwrap();
            assert_eq!(AuthenticatorData::parse(&raw).unwrap().sign_count, expected);
        }

        let mut counterless = SoftAuthenticator::new(CoseAlgorithm::EdDsa).without_counter();
        let response = counterless.authenticate("Y2g", "https://example.com", "example.com");
        let raw = decode_b64url(&response.response.authenticator_data, "authData").unwrap();
        assert_eq!(AuthenticatorData::parse(&raw).unwrap().sign_count, 0);
    }

    #[test]
    fn test_user_verification_flag_can_be_cleared() {
        let mut verifying = SoftAuthenticator::new(CoseAlgorithm::Es256);
        let response = verifying.authenticate("Y2g", "https://example.com", "example.com");
        let raw = decode_b64url(&response.response.authenticator_data, "authData").unwrap();
        assert!(AuthenticatorData::parse(&raw).unwrap().user_verified());

        let mut presence_only =
            SoftAuthenticator::new(CoseAlgorithm::Es256).without_user_verification();
        let response = presence_only.authenticate("Y2g", "https://example.com", "example.com");
        let raw = decode_b64url(&response.response.authenticator_data, "authData").unwrap();
        let auth_data = AuthenticatorData::parse(&raw).unwrap();
        assert!(auth_data.user_present());
        assert!(!auth_data.user_verified());
    }
}
