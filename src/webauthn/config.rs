//! Per-request ceremony configuration
//!
//! The relying party identity and the set of acceptable origins are resolved
//! once per request by the HTTP layer and handed to every ceremony call as a
//! plain value.

use anyhow::{bail, Context, Result};
use url::Url;

use super::crypto::sha256;

/// Relying party identity and trusted origins for one ceremony
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CeremonyConfig {
    /// Effective domain credentials are scoped to (no scheme, no port)
    pub relying_party_id: String,
    pub relying_party_name: String,
    /// Full origins (scheme://host[:port]) accepted in client data
    pub expected_origins: Vec<String>,
}

impl CeremonyConfig {
    #[must_use]
    pub fn new(
        relying_party_id: impl Into<String>,
        relying_party_name: impl Into<String>,
        expected_origins: Vec<String>,
    ) -> Self {
        Self {
            relying_party_id: relying_party_id.into(),
            relying_party_name: relying_party_name.into(),
            expected_origins,
        }
    }

    #[must_use]
    pub fn is_expected_origin(&self, origin: &str) -> bool {
        self.expected_origins.iter().any(|o| o == origin)
    }

    /// SHA-256 of the relying party id, as found at the start of authenticator data
    #[must_use]
    pub fn rp_id_hash(&self) -> [u8; 32] {
        sha256(self.relying_party_id.as_bytes())
    }
}

/// Resolves a [`CeremonyConfig`] from the request's `Origin` header
#[derive(Debug, Clone)]
pub struct CeremonyConfigResolver {
    rp_id: String,
    rp_name: String,
    trusted_origins: Vec<String>,
}

impl CeremonyConfigResolver {
    /// Build a resolver from configured values
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The relying party id is empty or contains a scheme, port or path
    /// - No trusted origin is configured
    /// - An origin is not a valid URL, or uses plain http on a host other than localhost
    pub fn new(rp_id: &str, rp_name: &str, trusted_origins: &[String]) -> Result<Self> {
        let rp_id = rp_id.trim();
        if rp_id.is_empty() {
            bail!("Relying party ID cannot be empty");
        }
        if rp_id.contains(['/', ':']) {
            bail!("Relying party ID must be a bare domain, got {rp_id}");
        }

        let mut origins = Vec::with_capacity(trusted_origins.len());
        for origin in trusted_origins {
            let origin = normalize_origin(origin);
            if origin.is_empty() {
                continue;
            }
            let url = Url::parse(&origin).with_context(|| format!("Invalid origin {origin}"))?;
            let is_localhost = url.host_str() == Some("localhost");
            if url.scheme() != "https" && !(url.scheme() == "http" && is_localhost) {
                bail!("Origin must be https:// except for localhost, got {origin}");
            }
            origins.push(origin);
        }
        if origins.is_empty() {
            bail!("At least one trusted origin is required");
        }

        Ok(Self {
            rp_id: rp_id.to_string(),
            rp_name: rp_name.to_string(),
            trusted_origins: origins,
        })
    }

    /// Resolve the configuration for a request
    ///
    /// A trusted request origin can narrow a `localhost` relying party id to the
    /// origin's host, so one deployment can serve several trusted front-ends.
    /// Untrusted or missing origins fall back to the configured values; the
    /// ceremony rejects them later with `OriginMismatch`.
    #[must_use]
    pub fn resolve(&self, request_origin: Option<&str>) -> CeremonyConfig {
        let rp_id = request_origin
            .map(normalize_origin)
            .filter(|origin| self.trusted_origins.contains(origin))
            .and_then(|origin| Url::parse(&origin).ok())
            .and_then(|url| url.host_str().map(str::to_string))
            .filter(|host| self.rp_id == "localhost" && host != "localhost")
            .unwrap_or_else(|| self.rp_id.clone());

        CeremonyConfig {
            relying_party_id: rp_id,
            relying_party_name: self.rp_name.clone(),
            expected_origins: self.trusted_origins.clone(),
        }
    }

    #[must_use]
    pub fn trusted_origins(&self) -> &[String] {
        &self.trusted_origins
    }
}

fn normalize_origin(origin: &str) -> String {
    origin.trim().trim_end_matches('/').to_string()
}
