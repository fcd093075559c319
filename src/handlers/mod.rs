// HTTP request handlers for the vault API
pub mod health;
pub mod helpers;
pub mod passkey;

use actix_web::web;

// Re-export the main handler functions
pub use health::health;
pub use passkey::{login_options, login_verify, register_options, register_verify};

/// Register every API route
pub fn configure_services(cfg: &mut web::ServiceConfig) {
    cfg
        // Passkey endpoints
        .route(
            "/api/auth/webauthn/register/options",
            web::post().to(register_options),
        )
        .route(
            "/api/auth/webauthn/register/verify",
            web::post().to(register_verify),
        )
        .route(
            "/api/auth/webauthn/login/options",
            web::post().to(login_options),
        )
        .route(
            "/api/auth/webauthn/login/verify",
            web::post().to(login_verify),
        )
        // Health endpoint
        .route("/api/health", web::get().to(health));
}
