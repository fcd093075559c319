//! Registration ceremony
//!
//! Attestation statements are not verified: credentials are accepted on the
//! "none" attestation trust model and the authenticator data alone decides
//! what gets stored.

use log::{info, warn};

use super::challenge::CeremonyType;
use super::credentials::PasskeyCredential;
use super::service::{check_subject, PasskeyService};
use crate::webauthn::crypto::{decode_b64url, encode_b64url, user_handle};
use crate::webauthn::{
    AttestationObject, AuthenticatorSelectionCriteria, CeremonyConfig, CeremonyError, ClientData,
    ClientDataType, CoseAlgorithm, PublicKeyCredentialDescriptor, PublicKeyCredentialParameters,
    RegistrationOptions, RegistrationResponse, RelyingParty, UserEntity,
};

/// Result of a successful registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationOutcome {
    /// Base64url credential id
    pub credential_id: String,
    pub sign_count: u32,
}

impl PasskeyService {
    /// Issue registration options bound to a fresh challenge
    ///
    /// `user_name` is the account name shown by the authenticator, normally the
    /// email address; a placeholder derived from the subject id is used without one.
    ///
    /// # Errors
    ///
    /// - `Unauthorized` for an unusable subject id
    /// - `StorageUnavailable` if the challenge or the existing credentials
    ///   could not be read or written
    pub async fn begin_registration(
        &self,
        subject_id: &str,
        display_name: &str,
        user_name: Option<&str>,
        config: &CeremonyConfig,
    ) -> Result<RegistrationOptions, CeremonyError> {
        check_subject(subject_id)?;

        let existing = self.credentials.list(subject_id).await?;
        let challenge = self
            .challenges
            .create(subject_id, CeremonyType::Registration)
            .await?;

        let name = user_name.filter(|n| !n.is_empty()).map_or_else(
            || {
                let short: String = subject_id.chars().take(8).collect();
                format!("user-{short}@cipherlock.local")
            },
            str::to_string,
        );
        let display_name = if display_name.is_empty() {
            name.clone()
        } else {
            display_name.to_string()
        };

        info!(
            "Starting passkey registration for {subject_id} ({} existing credentials)",
            existing.len()
        );

        Ok(RegistrationOptions {
            challenge: challenge.encoded(),
            rp: RelyingParty {
                id: config.relying_party_id.clone(),
                name: config.relying_party_name.clone(),
            },
            user: UserEntity {
                id: encode_b64url(&user_handle(subject_id)),
                name,
                display_name,
            },
            public_key_params: CoseAlgorithm::SUPPORTED
                .iter()
                .map(|alg| PublicKeyCredentialParameters {
                    r#type: "public-key".to_string(),
                    alg: alg.id(),
                })
                .collect(),
            timeout: self.options.timeout_ms,
            attestation: "none".to_string(),
            authenticator_selection: AuthenticatorSelectionCriteria {
                authenticator_attachment: self.options.authenticator_attachment.clone(),
                resident_key: self.options.resident_key.clone(),
                require_resident_key: self.options.resident_key == "required",
                user_verification: self.options.user_verification.clone(),
            },
            exclude_credentials: existing
                .into_iter()
                .map(|c| PublicKeyCredentialDescriptor::public_key(c.encoded_id(), c.transports))
                .collect(),
        })
    }

    /// Verify a registration response and store the new credential
    ///
    /// The pending challenge is consumed first, so any failure here means the
    /// client has to request new options.
    ///
    /// # Errors
    ///
    /// - `ChallengeNotFound` / `ChallengeTypeMismatch` for a missing, expired or
    ///   wrong-ceremony challenge
    /// - `MalformedResponse` if the response cannot be decoded
    /// - `ChallengeMismatch` / `OriginMismatch` from the client data checks
    /// - `RelyingPartyMismatch` if the authenticator data is scoped to another RP
    /// - `UserNotPresent` if the UP flag is clear
    /// - `UserNotVerified` if verification is required and the UV flag is clear
    /// - `CredentialAlreadyRegistered` if the subject already has this credential
    /// - `StorageUnavailable` if the credential could not be persisted
    pub async fn finish_registration(
        &self,
        subject_id: &str,
        response: &RegistrationResponse,
        config: &CeremonyConfig,
    ) -> Result<RegistrationOutcome, CeremonyError> {
        check_subject(subject_id)?;

        let challenge = self.challenges.consume(subject_id).await?;
        if challenge.ceremony_type != CeremonyType::Registration {
            warn!("Registration attempted with a non-registration challenge for {subject_id}");
            return Err(CeremonyError::ChallengeTypeMismatch);
        }

        let result = self
            .verify_registration(subject_id, &challenge.value, response, config)
            .await;
        if let Err(e) = &result {
            warn!("Passkey registration failed for {subject_id}: {e}");
        }
        result
    }

    async fn verify_registration(
        &self,
        subject_id: &str,
        expected_challenge: &[u8],
        response: &RegistrationResponse,
        config: &CeremonyConfig,
    ) -> Result<RegistrationOutcome, CeremonyError> {
        let raw_id = decode_b64url(&response.raw_id, "rawId")?;
        if decode_b64url(&response.id, "id")? != raw_id {
            return Err(CeremonyError::malformed("id and rawId differ"));
        }
        let client_data = ClientData::parse(&response.response.client_data_json)?;
        let attestation = AttestationObject::parse(&decode_b64url(
            &response.response.attestation_object,
            "attestationObject",
        )?)?;

        client_data.verify(ClientDataType::Create, expected_challenge, config)?;

        let auth_data = attestation.auth_data;
        if auth_data.rp_id_hash != config.rp_id_hash() {
            return Err(CeremonyError::RelyingPartyMismatch);
        }
        if !auth_data.user_present() {
            return Err(CeremonyError::UserNotPresent);
        }
        self.check_user_verification(auth_data.user_verified())?;
        let Some(attested) = auth_data.attested_credential.clone() else {
            return Err(CeremonyError::malformed("No attested credential data"));
        };
        if attested.credential_id != raw_id {
            return Err(CeremonyError::malformed(
                "rawId does not match the attested credential id",
            ));
        }

        if self
            .credentials
            .get(subject_id, &attested.credential_id)
            .await?
            .is_some()
        {
            return Err(CeremonyError::CredentialAlreadyRegistered);
        }

        let credential = PasskeyCredential {
            credential_id: attested.credential_id,
            public_key: attested.public_key,
            sign_count: auth_data.sign_count,
            transports: response.response.transports.clone(),
            owner_id: subject_id.to_string(),
            aaguid: attested.aaguid.to_vec(),
            backup_eligible: auth_data.backup_eligible(),
            backed_up: auth_data.backed_up(),
            created_at: self.clock.now(),
            last_used_at: None,
        };
        self.credentials.put(&credential).await?;

        info!(
            "Registered passkey for {subject_id} (fmt={}, user verified: {})",
            attestation.fmt,
            auth_data.user_verified()
        );
        Ok(RegistrationOutcome {
            credential_id: credential.encoded_id(),
            sign_count: credential.sign_count,
        })
    }
}
