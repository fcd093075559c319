//! `WebAuthn` protocol primitives
//!
//! Wire types, CBOR/COSE decoding, client data checks and signature
//! verification. Nothing here touches storage or knows about users beyond
//! an opaque subject id.

pub mod cbor;
mod client_data;
mod config;
pub mod cose;
pub mod crypto;
mod errors;
mod types;

pub use cbor::{AttestationObject, AttestedCredentialData, AuthenticatorData};
pub use client_data::{ClientData, ClientDataType, CollectedClientData};
pub use config::{CeremonyConfig, CeremonyConfigResolver};
pub use cose::{CoseAlgorithm, CosePublicKey};
pub use errors::CeremonyError;
pub use types::*;
