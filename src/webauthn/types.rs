//! `WebAuthn` wire types
//!
//! JSON shapes exchanged with the browser's credential API. Every byte field
//! is base64url encoded without padding.

use serde::{Deserialize, Serialize};

/// `PublicKeyCredentialCreationOptions` sent to the client
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationOptions {
    pub challenge: String, // Base64URL-encoded random challenge
    pub rp: RelyingParty,
    pub user: UserEntity,
    #[serde(rename = "pubKeyCredParams")]
    pub public_key_params: Vec<PublicKeyCredentialParameters>,
    pub timeout: u64, // Milliseconds
    pub attestation: String,
    pub authenticator_selection: AuthenticatorSelectionCriteria,
    #[serde(default)]
    pub exclude_credentials: Vec<PublicKeyCredentialDescriptor>,
}

/// `PublicKeyCredentialRequestOptions` sent to the client
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationOptions {
    pub challenge: String,
    pub timeout: u64,
    pub rp_id: String,
    /// Empty for the usernameless (discoverable credential) flow
    #[serde(default)]
    pub allow_credentials: Vec<PublicKeyCredentialDescriptor>,
    pub user_verification: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct RelyingParty {
    pub id: String,   // Domain name (e.g., "example.com")
    pub name: String, // Display name
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UserEntity {
    pub id: String, // Base64URL-encoded user handle
    pub name: String,
    pub display_name: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PublicKeyCredentialParameters {
    #[serde(rename = "type")]
    pub r#type: String, // Always "public-key"
    pub alg: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorSelectionCriteria {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authenticator_attachment: Option<String>, // "platform", "cross-platform"
    pub resident_key: String,
    pub require_resident_key: bool,
    pub user_verification: String, // "required", "preferred", "discouraged"
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PublicKeyCredentialDescriptor {
    #[serde(rename = "type")]
    pub r#type: String, // Always "public-key"
    pub id: String,     // Base64URL-encoded credential ID
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transports: Vec<String>,
}

impl PublicKeyCredentialDescriptor {
    #[must_use]
    pub fn public_key(id: String, transports: Vec<String>) -> Self {
        Self {
            r#type: "public-key".to_string(),
            id,
            transports,
        }
    }
}

/// Registration `PublicKeyCredential` from the client
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationResponse {
    pub id: String,
    pub raw_id: String,
    pub response: AuthenticatorAttestationResponse,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_extension_results: Option<serde_json::Value>,
    #[serde(rename = "type", default = "public_key_type")]
    pub r#type: String,
}

/// Assertion `PublicKeyCredential` from the client
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationResponse {
    pub id: String,
    pub raw_id: String,
    pub response: AuthenticatorAssertionResponse,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_extension_results: Option<serde_json::Value>,
    #[serde(rename = "type", default = "public_key_type")]
    pub r#type: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorAttestationResponse {
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: String,
    pub attestation_object: String,
    #[serde(default)]
    pub transports: Vec<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorAssertionResponse {
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: String,
    pub authenticator_data: String,
    pub signature: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_handle: Option<String>,
}

fn public_key_type() -> String {
    "public-key".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_registration_response_uses_browser_field_names() {
        let body = json!({
            "id": "Y3JlZA",
            "rawId": "Y3JlZA",
            "type": "public-key",
            "response": {
                "clientDataJSON": "e30",
                "attestationObject": "oA",
                "transports": ["internal", "hybrid"]
            }
        });
        let parsed: RegistrationResponse = serde_json::from_value(body).unwrap();
        assert_eq!(parsed.raw_id, "Y3JlZA");
        assert_eq!(parsed.response.client_data_json, "e30");
        assert_eq!(parsed.response.transports, vec!["internal", "hybrid"]);
    }

    #[test]
    fn test_assertion_without_user_handle() {
        let body = json!({
            "id": "Y3JlZA",
            "rawId": "Y3JlZA",
            "response": {
                "clientDataJSON": "e30",
                "authenticatorData": "AA",
                "signature": "AA"
            }
        });
        let parsed: AuthenticationResponse = serde_json::from_value(body).unwrap();
        assert!(parsed.response.user_handle.is_none());
        assert_eq!(parsed.r#type, "public-key");
    }

    #[test]
    fn test_options_serialize_camel_case() {
        let options = AuthenticationOptions {
            challenge: "abc".to_string(),
            timeout: 60_000,
            rp_id: "example.com".to_string(),
            allow_credentials: vec![PublicKeyCredentialDescriptor::public_key(
                "Y3JlZA".to_string(),
                vec![],
            )],
            user_verification: "preferred".to_string(),
        };
        let value = serde_json::to_value(&options).unwrap();
        assert_eq!(value["rpId"], "example.com");
        assert_eq!(value["userVerification"], "preferred");
        assert_eq!(value["allowCredentials"][0]["type"], "public-key");
        assert!(value["allowCredentials"][0].get("transports").is_none());
    }
}
