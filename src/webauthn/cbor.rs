//! CBOR processing for `WebAuthn`
//!
//! Decodes attestation objects and the binary authenticator data structure
//! shared by registration and authentication responses.

use ciborium::de::from_reader;
use ciborium::value::Value;

use super::cose::CosePublicKey;
use super::errors::CeremonyError;

/// User present
pub const FLAG_UP: u8 = 0x01;
/// User verified
pub const FLAG_UV: u8 = 0x04;
/// Backup eligible
pub const FLAG_BE: u8 = 0x08;
/// Backed up
pub const FLAG_BS: u8 = 0x10;
/// Attested credential data included
pub const FLAG_AT: u8 = 0x40;
/// Extension data included
pub const FLAG_ED: u8 = 0x80;

// rpIdHash (32) + flags (1) + signCount (4)
const AUTH_DATA_MIN_LEN: usize = 37;
const AAGUID_LEN: usize = 16;

/// Credential data attached to authenticator data during registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestedCredentialData {
    pub aaguid: [u8; 16],
    pub credential_id: Vec<u8>,
    /// The COSE key exactly as the authenticator encoded it
    pub public_key: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatorData {
    pub rp_id_hash: [u8; 32],
    pub flags: u8,
    pub sign_count: u32,
    pub attested_credential: Option<AttestedCredentialData>,
}

impl AuthenticatorData {
    /// Parse the binary authenticator data
    ///
    /// Layout:
    /// - 32 bytes: RP ID hash
    /// - 1 byte: flags
    /// - 4 bytes: signature counter (big-endian)
    /// - if AT is set: 16 bytes AAGUID, 2 bytes credential id length L,
    ///   L bytes credential id, then the COSE public key
    /// - if ED is set: a CBOR extensions map
    ///
    /// # Errors
    ///
    /// Returns `MalformedResponse` if the data is truncated or has trailing bytes.
    pub fn parse(bytes: &[u8]) -> Result<Self, CeremonyError> {
        if bytes.len() < AUTH_DATA_MIN_LEN {
            return Err(CeremonyError::malformed("Authenticator data too short"));
        }

        let mut rp_id_hash = [0u8; 32];
        rp_id_hash.copy_from_slice(&bytes[..32]);
        let flags = bytes[32];
        let sign_count = u32::from_be_bytes([bytes[33], bytes[34], bytes[35], bytes[36]]);

        let mut rest = &bytes[AUTH_DATA_MIN_LEN..];

        let attested_credential = if flags & FLAG_AT == 0 {
            None
        } else {
            Some(parse_attested_credential(&mut rest)?)
        };

        if flags & FLAG_ED != 0 {
            let _extensions: Value = from_reader(&mut rest)
                .map_err(|_| CeremonyError::malformed("Invalid extension data"))?;
        }

        if !rest.is_empty() {
            return Err(CeremonyError::malformed(
                "Trailing bytes after authenticator data",
            ));
        }

        Ok(Self {
            rp_id_hash,
            flags,
            sign_count,
            attested_credential,
        })
    }

    #[must_use]
    pub fn user_present(&self) -> bool {
        self.flags & FLAG_UP != 0
    }

    #[must_use]
    pub fn user_verified(&self) -> bool {
        self.flags & FLAG_UV != 0
    }

    #[must_use]
    pub fn backup_eligible(&self) -> bool {
        self.flags & FLAG_BE != 0
    }

    #[must_use]
    pub fn backed_up(&self) -> bool {
        self.flags & FLAG_BS != 0
    }
}

fn parse_attested_credential(rest: &mut &[u8]) -> Result<AttestedCredentialData, CeremonyError> {
    if rest.len() < AAGUID_LEN + 2 {
        return Err(CeremonyError::malformed(
            "Authenticator data too short for attested credential",
        ));
    }
    let mut aaguid = [0u8; 16];
    aaguid.copy_from_slice(&rest[..AAGUID_LEN]);
    let id_len = usize::from(u16::from_be_bytes([rest[AAGUID_LEN], rest[AAGUID_LEN + 1]]));
    *rest = &rest[AAGUID_LEN + 2..];

    if id_len == 0 || rest.len() < id_len {
        return Err(CeremonyError::malformed("Invalid credential id length"));
    }
    let credential_id = rest[..id_len].to_vec();
    *rest = &rest[id_len..];

    // Decode through a cursor so the exact encoded length of the key is known
    let key_start = *rest;
    let key_value: Value = from_reader(&mut *rest)
        .map_err(|_| CeremonyError::malformed("Invalid credential public key"))?;
    let consumed = key_start.len() - rest.len();
    let public_key = key_start[..consumed].to_vec();

    // Reject keys we could never verify at registration time
    CosePublicKey::from_value(&key_value)?;

    Ok(AttestedCredentialData {
        aaguid,
        credential_id,
        public_key,
    })
}

/// A decoded attestation object
#[derive(Debug, Clone)]
pub struct AttestationObject {
    pub fmt: String,
    /// Raw authenticator data bytes
    pub auth_data_raw: Vec<u8>,
    pub auth_data: AuthenticatorData,
}

impl AttestationObject {
    /// Decode an attestation object (`{fmt, attStmt, authData}` CBOR map)
    ///
    /// The attestation statement is not checked: credentials are accepted on
    /// the "none" attestation trust model.
    ///
    /// # Errors
    ///
    /// Returns `MalformedResponse` if the CBOR is invalid, `authData` is missing,
    /// or the authenticator data carries no attested credential.
    pub fn parse(bytes: &[u8]) -> Result<Self, CeremonyError> {
        let attestation: Value = from_reader(bytes)
            .map_err(|_| CeremonyError::malformed("Invalid CBOR attestation format"))?;

        let Some(map) = attestation.as_map() else {
            return Err(CeremonyError::malformed("Attestation object is not a map"));
        };

        let text_field = |name: &str| {
            map.iter()
                .find(|(k, _)| k.as_text() == Some(name))
                .map(|(_, v)| v)
        };

        let fmt = text_field("fmt")
            .and_then(Value::as_text)
            .unwrap_or("none")
            .to_string();

        let Some(auth_data_raw) = text_field("authData").and_then(Value::as_bytes) else {
            return Err(CeremonyError::malformed("Missing authData in attestation"));
        };

        let auth_data = AuthenticatorData::parse(auth_data_raw)?;
        if auth_data.attested_credential.is_none() {
            return Err(CeremonyError::malformed("No attested credential data"));
        }

        Ok(Self {
            fmt,
            auth_data_raw: auth_data_raw.clone(),
            auth_data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ed25519_key() -> Vec<u8> {
        CosePublicKey::EdDsa { x: vec![9; 32] }.to_cbor()
    }

    fn auth_data(flags: u8, count: u32, credential: Option<(&[u8], &[u8])>) -> Vec<u8> {
        let mut out = vec![0xaa; 32];
        out.push(flags);
        out.extend_from_slice(&count.to_be_bytes());
        if let Some((id, key)) = credential {
            out.extend_from_slice(&[0x11; 16]);
            out.extend_from_slice(&u16::try_from(id.len()).unwrap().to_be_bytes());
            out.extend_from_slice(id);
            out.extend_from_slice(key);
        }
        out
    }

    #[test]
    fn test_parse_assertion_auth_data() {
        let data = AuthenticatorData::parse(&auth_data(FLAG_UP | FLAG_UV, 42, None)).unwrap();
        assert_eq!(data.rp_id_hash, [0xaa; 32]);
        assert_eq!(data.sign_count, 42);
        assert!(data.user_present());
        assert!(data.user_verified());
        assert!(!data.backup_eligible());
        assert!(data.attested_credential.is_none());
    }

    #[test]
    fn test_parse_attested_credential_keeps_exact_key_bytes() {
        let key = ed25519_key();
        let bytes = auth_data(FLAG_UP | FLAG_AT, 0, Some((b"cred-1", &key)));
        let data = AuthenticatorData::parse(&bytes).unwrap();
        let cred = data.attested_credential.unwrap();
        assert_eq!(cred.aaguid, [0x11; 16]);
        assert_eq!(cred.credential_id, b"cred-1".to_vec());
        assert_eq!(cred.public_key, key);
    }

    #[test]
    fn test_truncated_auth_data() {
        assert!(matches!(
            AuthenticatorData::parse(&[0u8; 36]),
            Err(CeremonyError::MalformedResponse(_))
        ));

        let key = ed25519_key();
        let mut bytes = auth_data(FLAG_UP | FLAG_AT, 0, Some((b"cred-1", &key)));
        bytes.truncate(bytes.len() - 3);
        assert!(AuthenticatorData::parse(&bytes).is_err());
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = auth_data(FLAG_UP, 1, None);
        bytes.push(0);
        assert!(AuthenticatorData::parse(&bytes).is_err());
    }

    #[test]
    fn test_extensions_are_skipped() {
        let mut bytes = auth_data(FLAG_UP | FLAG_ED, 3, None);
        let mut ext = Vec::new();
        ciborium::ser::into_writer(
            &Value::Map(vec![(Value::Text("credProps".into()), Value::Bool(true))]),
            &mut ext,
        )
        .unwrap();
        bytes.extend_from_slice(&ext);
        let data = AuthenticatorData::parse(&bytes).unwrap();
        assert_eq!(data.sign_count, 3);
    }

    #[test]
    fn test_attestation_object_requires_credential() {
        let mut bytes = Vec::new();
        let value = Value::Map(vec![
            (Value::Text("fmt".into()), Value::Text("none".into())),
            (Value::Text("attStmt".into()), Value::Map(vec![])),
            (
                Value::Text("authData".into()),
                Value::Bytes(auth_data(FLAG_UP, 0, None)),
            ),
        ]);
        ciborium::ser::into_writer(&value, &mut bytes).unwrap();
        assert!(matches!(
            AttestationObject::parse(&bytes),
            Err(CeremonyError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_attestation_object_parses() {
        let key = ed25519_key();
        let raw = auth_data(FLAG_UP | FLAG_AT, 0, Some((b"abc", &key)));
        let value = Value::Map(vec![
            (Value::Text("fmt".into()), Value::Text("none".into())),
            (Value::Text("attStmt".into()), Value::Map(vec![])),
            (Value::Text("authData".into()), Value::Bytes(raw.clone())),
        ]);
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(&value, &mut bytes).unwrap();

        let parsed = AttestationObject::parse(&bytes).unwrap();
        assert_eq!(parsed.fmt, "none");
        assert_eq!(parsed.auth_data_raw, raw);
        assert_eq!(
            parsed.auth_data.attested_credential.unwrap().credential_id,
            b"abc".to_vec()
        );
    }
}
