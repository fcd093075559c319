#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![deny(warnings)]
#![allow(clippy::multiple_crate_versions)]

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use cipherlock::{configure_services, settings::CipherlockSettings, AppState, VERSION};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load configuration from Settings.toml and environment variables
    // This also loads .env file and initializes the logger
    let settings = CipherlockSettings::load()
        .map_err(|e| std::io::Error::other(format!("Failed to load settings: {e:#}")))?;

    let state = AppState::from_settings(&settings)
        .map_err(|e| std::io::Error::other(format!("Failed to initialize services: {e:#}")))?;

    start_server(state, settings).await
}

/// Start the API server
///
/// # Errors
///
/// Returns an error if:
/// - Server binding fails
/// - Server fails to start
async fn start_server(state: AppState, settings: CipherlockSettings) -> std::io::Result<()> {
    let bind_address = settings.get_bind_address();
    print_startup_info(&bind_address, &settings);

    let cors_origins = settings.get_cors_origins();

    HttpServer::new(move || {
        let cors_origins = cors_origins.clone();
        let cors = Cors::default()
            .allowed_origin_fn(move |origin, _| {
                cors_origins
                    .iter()
                    .any(|allowed| allowed == origin.to_str().unwrap_or(""))
            })
            .allowed_methods(vec!["GET", "POST", "OPTIONS"])
            .allowed_headers(vec!["Authorization", "Content-Type", "Accept"])
            .supports_credentials()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(cors)
            .wrap(Logger::default())
            .configure(configure_services)
    })
    .bind(&bind_address)?
    .run()
    .await
}

fn print_startup_info(bind_address: &str, settings: &CipherlockSettings) {
    println!("Starting Cipherlock {VERSION} on http://{bind_address}");
    println!("Storage Backend: {:?}", settings.storage.backend);
    println!(
        "Relying Party: {} ({})",
        settings.webauthn.rp_id, settings.webauthn.rp_name
    );
    println!("Trusted Origins: {}", settings.get_origins().join(", "));
    println!();
    println!("Passkey endpoints:");
    println!("  POST /api/auth/webauthn/register/options - Start passkey registration");
    println!("  POST /api/auth/webauthn/register/verify  - Complete passkey registration");
    println!("  POST /api/auth/webauthn/login/options    - Start passkey authentication");
    println!("  POST /api/auth/webauthn/login/verify     - Complete passkey authentication");
    println!();
    println!("System endpoints:");
    println!("  GET  /api/health - Health check");
}
