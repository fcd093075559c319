//! Passkey request handlers
//!
//! Thin adapters between the JSON API and the ceremony engine. Each handler
//! resolves the ceremony configuration for the request and passes it along.

use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use super::helpers::{
    ceremony_config, error_response, invalid_request, optional_identity, require_identity,
};
use crate::state::AppState;
use crate::webauthn::{AuthenticationResponse, RegistrationResponse};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterOptionsRequest {
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginOptionsRequest {
    #[serde(default)]
    pub uid: Option<String>,
}

/// Assertion credential with the subject it claims to belong to
#[derive(Debug, Deserialize)]
pub struct LoginVerifyRequest {
    #[serde(default)]
    pub uid: Option<String>,
    #[serde(flatten)]
    pub credential: AuthenticationResponse,
}

/// `POST /api/auth/webauthn/register/options`
pub async fn register_options(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: Option<web::Json<RegisterOptionsRequest>>,
) -> HttpResponse {
    let identity = match require_identity(&req, &state).await {
        Ok(identity) => identity,
        Err(response) => return response,
    };
    let display_name = body
        .and_then(|b| b.into_inner().display_name)
        .or_else(|| identity.email.clone())
        .unwrap_or_default();

    let config = ceremony_config(&req, &state);
    match state
        .passkeys
        .begin_registration(
            &identity.subject_id,
            &display_name,
            identity.email.as_deref(),
            &config,
        )
        .await
    {
        Ok(options) => HttpResponse::Ok().json(options),
        Err(e) => error_response(&e),
    }
}

/// `POST /api/auth/webauthn/register/verify`
pub async fn register_verify(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<RegistrationResponse>,
) -> HttpResponse {
    let identity = match require_identity(&req, &state).await {
        Ok(identity) => identity,
        Err(response) => return response,
    };

    let config = ceremony_config(&req, &state);
    match state
        .passkeys
        .finish_registration(&identity.subject_id, &body, &config)
        .await
    {
        Ok(outcome) => HttpResponse::Ok().json(json!({
            "verified": true,
            "credential_id": outcome.credential_id,
        })),
        Err(e) => error_response(&e),
    }
}

/// `POST /api/auth/webauthn/login/options`
///
/// The subject comes from a bearer token when one is sent, otherwise from the
/// optional `uid` in the body. Without either the options are usernameless.
pub async fn login_options(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: Option<web::Json<LoginOptionsRequest>>,
) -> HttpResponse {
    let identity = match optional_identity(&req, &state).await {
        Ok(identity) => identity,
        Err(response) => return response,
    };
    let subject_id = identity.map(|i| i.subject_id).or_else(|| {
        body.and_then(|b| b.into_inner().uid)
            .filter(|uid| !uid.is_empty())
    });

    let config = ceremony_config(&req, &state);
    match state
        .passkeys
        .begin_authentication(subject_id.as_deref(), &config)
        .await
    {
        Ok(options) => HttpResponse::Ok().json(options),
        Err(e) => error_response(&e),
    }
}

/// `POST /api/auth/webauthn/login/verify`
pub async fn login_verify(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<LoginVerifyRequest>,
) -> HttpResponse {
    let LoginVerifyRequest { uid, credential } = body.into_inner();
    let Some(uid) = uid.filter(|uid| !uid.is_empty()) else {
        return invalid_request("UID is required for verification");
    };

    let config = ceremony_config(&req, &state);
    match state
        .passkeys
        .finish_authentication(&uid, &credential, &config)
        .await
    {
        Ok(outcome) => HttpResponse::Ok().json(json!({
            "verified": true,
            "uid": uid,
            "sign_count": outcome.new_sign_count,
        })),
        Err(e) => error_response(&e),
    }
}
