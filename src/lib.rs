#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![deny(warnings)]
#![allow(clippy::multiple_crate_versions)]

/// Version of the cipherlock application
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod handlers;
pub mod identity;
pub mod passkey;
pub mod settings;
pub mod state;
pub mod store;
pub mod webauthn;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

/// Re-export commonly used items
pub use handlers::configure_services;
pub use passkey::PasskeyService;
pub use settings::CipherlockSettings;
pub use state::AppState;
