//! Authentication ceremony

use log::{error, info, warn};

use super::challenge::CeremonyType;
use super::service::{check_subject, PasskeyService};
use crate::webauthn::crypto::{decode_b64url, encode_b64url, generate_challenge, user_handle};
use crate::webauthn::{
    AuthenticationOptions, AuthenticationResponse, AuthenticatorData, CeremonyConfig,
    CeremonyError, ClientData, ClientDataType, CosePublicKey, PublicKeyCredentialDescriptor,
};

/// Result of a successful assertion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticationOutcome {
    /// Base64url credential id that signed the assertion
    pub credential_id: String,
    /// Counter persisted for the credential after this assertion
    pub new_sign_count: u32,
    pub user_verified: bool,
}

/// Apply the clone-detection rule and return the counter to persist
///
/// When both the stored and the observed counter are non-zero the observed one
/// must be strictly greater. A zero on either side means the authenticator does
/// not keep a counter and the check is skipped. The persisted value never
/// decreases.
///
/// # Errors
///
/// Returns `PossibleCloneDetected` if the counter did not advance.
pub fn check_sign_count(stored: u32, observed: u32) -> Result<u32, CeremonyError> {
    if stored != 0 && observed != 0 && observed <= stored {
        return Err(CeremonyError::PossibleCloneDetected { stored, observed });
    }
    Ok(stored.max(observed))
}

impl PasskeyService {
    /// Issue authentication options
    ///
    /// With a subject the options list that subject's credentials and the
    /// challenge is stored for verification. Without one the options allow any
    /// discoverable credential and the challenge is not stored: the caller has
    /// to carry it through its own session-less flow.
    ///
    /// # Errors
    ///
    /// `StorageUnavailable` if credentials could not be listed or the challenge
    /// could not be stored.
    pub async fn begin_authentication(
        &self,
        subject_id: Option<&str>,
        config: &CeremonyConfig,
    ) -> Result<AuthenticationOptions, CeremonyError> {
        let (challenge, allow_credentials) = match subject_id {
            Some(subject_id) => {
                check_subject(subject_id)?;
                let allow = self
                    .credentials
                    .list(subject_id)
                    .await?
                    .into_iter()
                    .map(|c| {
                        PublicKeyCredentialDescriptor::public_key(c.encoded_id(), c.transports)
                    })
                    .collect::<Vec<_>>();
                let challenge = self
                    .challenges
                    .create(subject_id, CeremonyType::Authentication)
                    .await?;
                info!(
                    "Starting passkey authentication for {subject_id} ({} credentials)",
                    allow.len()
                );
                (challenge.encoded(), allow)
            }
            None => {
                info!("Starting usernameless passkey authentication");
                (encode_b64url(&generate_challenge()), Vec::new())
            }
        };

        Ok(AuthenticationOptions {
            challenge,
            timeout: self.options.timeout_ms,
            rp_id: config.relying_party_id.clone(),
            allow_credentials,
            user_verification: self.options.user_verification.clone(),
        })
    }

    /// Verify an assertion and advance the credential's signature counter
    ///
    /// # Errors
    ///
    /// - `ChallengeNotFound` / `ChallengeTypeMismatch` for a missing, expired or
    ///   wrong-ceremony challenge
    /// - `MalformedResponse` if the response cannot be decoded
    /// - `ChallengeMismatch` / `OriginMismatch` / `RelyingPartyMismatch` /
    ///   `UserNotPresent` / `UserNotVerified` from the client and authenticator
    ///   data checks
    /// - `CredentialNotFound` if the subject has no such credential
    /// - `SignatureInvalid` if the signature does not verify
    /// - `PossibleCloneDetected` if the signature counter went backwards or stalled
    /// - `StorageUnavailable` on storage failure
    pub async fn finish_authentication(
        &self,
        subject_id: &str,
        response: &AuthenticationResponse,
        config: &CeremonyConfig,
    ) -> Result<AuthenticationOutcome, CeremonyError> {
        check_subject(subject_id)?;

        let challenge = self.challenges.consume(subject_id).await?;
        if challenge.ceremony_type != CeremonyType::Authentication {
            warn!("Authentication attempted with a non-authentication challenge for {subject_id}");
            return Err(CeremonyError::ChallengeTypeMismatch);
        }

        let result = self
            .verify_assertion(subject_id, &challenge.value, response, config)
            .await;
        match &result {
            Err(e @ CeremonyError::PossibleCloneDetected { .. }) => {
                error!("🚨 Possible cloned authenticator for {subject_id}: {e}");
            }
            Err(e) => warn!("Passkey authentication failed for {subject_id}: {e}"),
            Ok(outcome) => info!(
                "✅ Passkey authentication succeeded for {subject_id} (sign count {})",
                outcome.new_sign_count
            ),
        }
        result
    }

    async fn verify_assertion(
        &self,
        subject_id: &str,
        expected_challenge: &[u8],
        response: &AuthenticationResponse,
        config: &CeremonyConfig,
    ) -> Result<AuthenticationOutcome, CeremonyError> {
        let credential_id = decode_b64url(&response.raw_id, "rawId")?;
        if decode_b64url(&response.id, "id")? != credential_id {
            return Err(CeremonyError::malformed("id and rawId differ"));
        }
        let client_data = ClientData::parse(&response.response.client_data_json)?;
        let auth_data_raw =
            decode_b64url(&response.response.authenticator_data, "authenticatorData")?;
        let auth_data = AuthenticatorData::parse(&auth_data_raw)?;
        let signature = decode_b64url(&response.response.signature, "signature")?;
        let presented_handle = response
            .response
            .user_handle
            .as_deref()
            .filter(|h| !h.is_empty())
            .map(|h| decode_b64url(h, "userHandle"))
            .transpose()?;

        client_data.verify(ClientDataType::Get, expected_challenge, config)?;
        if auth_data.rp_id_hash != config.rp_id_hash() {
            return Err(CeremonyError::RelyingPartyMismatch);
        }
        if !auth_data.user_present() {
            return Err(CeremonyError::UserNotPresent);
        }
        self.check_user_verification(auth_data.user_verified())?;

        let Some(credential) = self.credentials.get(subject_id, &credential_id).await? else {
            return Err(CeremonyError::CredentialNotFound);
        };
        if presented_handle.is_some_and(|h| h != user_handle(subject_id)) {
            return Err(CeremonyError::malformed(
                "userHandle does not belong to this user",
            ));
        }

        // Signed message: authenticatorData || SHA-256(clientDataJSON)
        let mut message = auth_data_raw;
        message.extend_from_slice(&client_data.hash());
        CosePublicKey::from_cbor(&credential.public_key)?.verify(&message, &signature)?;

        let new_sign_count = check_sign_count(credential.sign_count, auth_data.sign_count)?;
        self.credentials
            .record_use(subject_id, &credential_id, new_sign_count, self.clock.now())
            .await?;

        Ok(AuthenticationOutcome {
            credential_id: credential.encoded_id(),
            new_sign_count,
            user_verified: auth_data.user_verified(),
        })
    }
}
