//! Client data verification
//!
//! Checks the `clientDataJSON` the browser signed over: ceremony type,
//! challenge, and origin.

use serde::Deserialize;

use super::config::CeremonyConfig;
use super::crypto::{decode_b64url, sha256};
use super::errors::CeremonyError;

/// The `type` member of client data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientDataType {
    Create,
    Get,
}

impl ClientDataType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "webauthn.create",
            Self::Get => "webauthn.get",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectedClientData {
    #[serde(rename = "type")]
    pub ceremony_type: String,
    pub challenge: String,
    pub origin: String,
    #[serde(default)]
    pub cross_origin: bool,
}

/// Decoded client data together with the exact bytes that were hashed
#[derive(Debug, Clone)]
pub struct ClientData {
    pub raw: Vec<u8>,
    pub collected: CollectedClientData,
}

impl ClientData {
    /// Decode base64url `clientDataJSON`
    ///
    /// # Errors
    ///
    /// Returns `MalformedResponse` on bad encoding or JSON missing required members.
    pub fn parse(client_data_json_b64: &str) -> Result<Self, CeremonyError> {
        let raw = decode_b64url(client_data_json_b64, "clientDataJSON")?;
        let collected: CollectedClientData = serde_json::from_slice(&raw)
            .map_err(|_| CeremonyError::malformed("Invalid client data JSON"))?;
        Ok(Self { raw, collected })
    }

    #[must_use]
    pub fn hash(&self) -> [u8; 32] {
        sha256(&self.raw)
    }

    /// Verify type, challenge and origin
    ///
    /// # Errors
    ///
    /// - `ChallengeTypeMismatch` if `type` is not the expected ceremony type
    /// - `ChallengeMismatch` if the challenge differs from `expected_challenge` in any byte
    /// - `OriginMismatch` if the origin is not one of the config's expected origins
    pub fn verify(
        &self,
        expected_type: ClientDataType,
        expected_challenge: &[u8],
        config: &CeremonyConfig,
    ) -> Result<(), CeremonyError> {
        if self.collected.ceremony_type != expected_type.as_str() {
            return Err(CeremonyError::ChallengeTypeMismatch);
        }

        let Ok(challenge) = decode_b64url(&self.collected.challenge, "challenge") else {
            return Err(CeremonyError::ChallengeMismatch);
        };
        if challenge != expected_challenge {
            return Err(CeremonyError::ChallengeMismatch);
        }

        if !config.is_expected_origin(&self.collected.origin) {
            return Err(CeremonyError::OriginMismatch(self.collected.origin.clone()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webauthn::crypto::encode_b64url;
    use serde_json::json;

    fn config() -> CeremonyConfig {
        CeremonyConfig::new(
            "example.com",
            "Example",
            vec![
                "https://example.com".to_string(),
                "https://app.example.com".to_string(),
            ],
        )
    }

    fn client_data(ty: &str, challenge: &[u8], origin: &str) -> ClientData {
        let json = json!({
            "type": ty,
            "challenge": encode_b64url(challenge),
            "origin": origin,
            "crossOrigin": false
        });
        ClientData::parse(&encode_b64url(json.to_string().as_bytes())).unwrap()
    }

    #[test]
    fn test_valid_client_data() {
        let data = client_data("webauthn.create", b"challenge-bytes", "https://example.com");
        assert!(data
            .verify(ClientDataType::Create, b"challenge-bytes", &config())
            .is_ok());
        assert_eq!(data.hash(), sha256(&data.raw));
    }

    #[test]
    fn test_wrong_type() {
        let data = client_data("webauthn.get", b"c", "https://example.com");
        assert_eq!(
            data.verify(ClientDataType::Create, b"c", &config()),
            Err(CeremonyError::ChallengeTypeMismatch)
        );
    }

    #[test]
    fn test_one_byte_challenge_difference() {
        let issued = [7u8; 32];
        let mut presented = issued;
        presented[31] ^= 0x01;
        let data = client_data("webauthn.get", &presented, "https://example.com");
        assert_eq!(
            data.verify(ClientDataType::Get, &issued, &config()),
            Err(CeremonyError::ChallengeMismatch)
        );
    }

    #[test]
    fn test_origin_membership() {
        for origin in ["https://example.com", "https://app.example.com"] {
            let data = client_data("webauthn.get", b"c", origin);
            assert!(data.verify(ClientDataType::Get, b"c", &config()).is_ok());
        }
        for origin in [
            "http://example.com",
            "https://example.com:8443",
            "https://evil.example.com",
        ] {
            let data = client_data("webauthn.get", b"c", origin);
            assert_eq!(
                data.verify(ClientDataType::Get, b"c", &config()),
                Err(CeremonyError::OriginMismatch(origin.to_string()))
            );
        }
    }

    #[test]
    fn test_missing_members_are_malformed() {
        let raw = encode_b64url(br#"{"type":"webauthn.get"}"#);
        assert!(matches!(
            ClientData::parse(&raw),
            Err(CeremonyError::MalformedResponse(_))
        ));
    }
}
