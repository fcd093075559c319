// Helper functions shared by the API handlers
use actix_web::http::header;
use actix_web::{HttpRequest, HttpResponse};
use serde_json::json;

use crate::identity::VerifiedIdentity;
use crate::state::AppState;
use crate::webauthn::{CeremonyConfig, CeremonyError};

/// Extract the token from an `Authorization: Bearer <token>` header
#[must_use]
pub fn bearer_token(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Resolve the ceremony configuration from the request's `Origin` header
#[must_use]
pub fn ceremony_config(req: &HttpRequest, state: &AppState) -> CeremonyConfig {
    let origin = req
        .headers()
        .get(header::ORIGIN)
        .and_then(|value| value.to_str().ok());
    state.resolver.resolve(origin)
}

/// Verify the bearer token on a request that requires one
///
/// # Errors
///
/// Returns a 401 response if the header is missing or the token is rejected.
pub async fn require_identity(
    req: &HttpRequest,
    state: &AppState,
) -> Result<VerifiedIdentity, HttpResponse> {
    let Some(token) = bearer_token(req) else {
        return Err(error_response(&CeremonyError::Unauthorized(
            "Missing bearer token".to_string(),
        )));
    };
    verify_token(token, state).await
}

/// Verify the bearer token if the request carries one
///
/// # Errors
///
/// Returns a 401 response if a token is present but rejected.
pub async fn optional_identity(
    req: &HttpRequest,
    state: &AppState,
) -> Result<Option<VerifiedIdentity>, HttpResponse> {
    match bearer_token(req) {
        Some(token) => verify_token(token, state).await.map(Some),
        None => Ok(None),
    }
}

async fn verify_token(token: &str, state: &AppState) -> Result<VerifiedIdentity, HttpResponse> {
    state.identity.verify(token).await.map_err(|e| {
        log::warn!("Rejected bearer token: {e}");
        error_response(&CeremonyError::Unauthorized("Invalid token".to_string()))
    })
}

/// Convert a ceremony error to its HTTP response
#[must_use]
pub fn error_response(error: &CeremonyError) -> HttpResponse {
    let body = json!({
        "error": error.code(),
        "message": error.to_string(),
    });
    match error {
        CeremonyError::ChallengeNotFound
        | CeremonyError::ChallengeTypeMismatch
        | CeremonyError::ChallengeMismatch
        | CeremonyError::OriginMismatch(_)
        | CeremonyError::RelyingPartyMismatch
        | CeremonyError::MalformedResponse(_)
        | CeremonyError::UnsupportedAlgorithm(_)
        | CeremonyError::UserNotPresent
        | CeremonyError::UserNotVerified => HttpResponse::BadRequest().json(body),
        CeremonyError::CredentialAlreadyRegistered => HttpResponse::Conflict().json(body),
        CeremonyError::CredentialNotFound
        | CeremonyError::SignatureInvalid
        | CeremonyError::Unauthorized(_) => HttpResponse::Unauthorized().json(body),
        CeremonyError::PossibleCloneDetected { .. } => HttpResponse::Forbidden().json(body),
        CeremonyError::StorageUnavailable(_) => HttpResponse::ServiceUnavailable().json(json!({
            "error": error.code(),
            "message": "Storage is temporarily unavailable",
        })),
    }
}

/// 400 response for a request body that is missing a required field
#[must_use]
pub fn invalid_request(message: &str) -> HttpResponse {
    HttpResponse::BadRequest().json(json!({
        "error": "invalid_request",
        "message": message,
    }))
}
