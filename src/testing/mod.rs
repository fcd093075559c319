//! Testing utilities for Cipherlock
//!
//! - [`authenticator`] - Software authenticator producing real attestations and assertions
//! - [`tokens`] - RS256 Firebase-style ID tokens
//! - [`fixtures`] - Pre-built services and application state
//! - [`mock`] - Fake collaborators and failing storage
//!
//! ## Usage
//!
//! ```rust,ignore
//! use cipherlock::testing::{SoftAuthenticator, TestFixtures, TEST_ORIGIN, TEST_RP_ID};
//! use cipherlock::webauthn::CoseAlgorithm;
//!
//! # async fn demo() {
//! let service = TestFixtures::passkey_service();
//! let config = TestFixtures::ceremony_config();
//! let options = service
//!     .begin_registration("u1", "Alice", None, &config)
//!     .await
//!     .unwrap();
//!
//! let authenticator = SoftAuthenticator::new(CoseAlgorithm::Es256);
//! let response = authenticator.register(&options.challenge, TEST_ORIGIN, TEST_RP_ID);
//! service.finish_registration("u1", &response, &config).await.unwrap();
//! # }
//! ```

pub mod authenticator;
pub mod fixtures;
pub mod keys;
pub mod mock;
pub mod tokens;

pub use authenticator::SoftAuthenticator;
pub use fixtures::TestFixtures;
pub use mock::{FlakyDocumentStore, StaticIdentityVerifier};
pub use tokens::{mint_id_token, test_jwk, TokenClaims};

/// Relying party id used by ceremony tests
pub const TEST_RP_ID: &str = "example.com";

/// Front-end origin trusted in ceremony tests
pub const TEST_ORIGIN: &str = "https://example.com";

/// Firebase project the test tokens are issued for
pub const TEST_PROJECT_ID: &str = "cipherlock-test";

/// Key id of the RS256 test signing key
pub const TEST_KID: &str = "cipherlock-test-key";
