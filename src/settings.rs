use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

const DEFAULT_FRONTEND_ORIGIN: &str = "http://localhost:5173";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CipherlockSettings {
    pub application: ApplicationSettings,
    pub webauthn: WebAuthnSettings,
    pub firebase: FirebaseSettings,
    pub storage: StorageSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
    pub cors_origins: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebAuthnSettings {
    /// Relying party id (bare domain, no scheme or port)
    pub rp_id: String,
    pub rp_name: String,
    /// Comma separated trusted front-end origins
    pub origins: String,
    /// Client-side ceremony timeout advertised in options
    pub timeout_seconds: u64,
    pub user_verification: String,
    pub authenticator_attachment: Option<String>,
    pub resident_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FirebaseSettings {
    pub project_id: String,
    pub jwks_uri: String,
    pub firestore_base_url: String,
    /// Bearer token for server-side Firestore access
    pub access_token: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Firestore,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StorageSettings {
    pub backend: StorageBackend,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for ApplicationSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            cors_origins: DEFAULT_FRONTEND_ORIGIN.to_string(),
        }
    }
}

impl Default for WebAuthnSettings {
    fn default() -> Self {
        Self {
            rp_id: "localhost".to_string(),
            rp_name: "Cipherlock Vault".to_string(),
            origins: DEFAULT_FRONTEND_ORIGIN.to_string(),
            timeout_seconds: 60,
            user_verification: "preferred".to_string(),
            authenticator_attachment: Some("platform".to_string()),
            resident_key: "preferred".to_string(),
        }
    }
}

impl Default for FirebaseSettings {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            jwks_uri: "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com".to_string(),
            firestore_base_url: "https://firestore.googleapis.com/v1".to_string(),
            access_token: None,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl CipherlockSettings {
    /// Load settings from configuration files and environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - A settings file cannot be read or parsed
    /// - The resulting settings fail validation
    pub fn load() -> Result<Self> {
        Self::load_env_file(Path::new(".env"));

        let secrets_dir = std::env::var("CIPHERLOCK_SECRETS_DIR").ok();
        let mut settings =
            Self::load_base_settings(Path::new("."), secrets_dir.as_deref().map(Path::new))?;
        Self::apply_env_overrides(&mut settings);

        Self::init_logging(&settings.logging);
        settings.validate()?;
        Ok(settings)
    }

    /// Load base settings from TOML file(s) or use defaults
    /// Settings are loaded with the following priority (highest to lowest):
    /// 1. Environment variables (applied separately after loading base settings)
    /// 2. Settings.toml in `CIPHERLOCK_SECRETS_DIR` (if specified and exists)
    /// 3. Settings.toml in the working directory (if exists)
    /// 4. Default settings
    ///
    /// # Errors
    ///
    /// Returns an error if a settings file exists but cannot be read or parsed
    pub fn load_base_settings(working_dir: &Path, secrets_dir: Option<&Path>) -> Result<Self> {
        let mut settings = Self::default();

        let default_config_path = working_dir.join("Settings.toml");
        if default_config_path.exists() {
            settings = Self::read_toml(&default_config_path)?;
            println!(
                "✓ Loaded base settings from {}",
                default_config_path.display()
            );
        }

        if let Some(secrets_dir) = secrets_dir {
            let secrets_path = secrets_dir.join("Settings.toml");
            if secrets_path.exists() {
                settings = Self::read_toml(&secrets_path)?;
                println!("✓ Overriding settings from {}", secrets_path.display());
            } else {
                println!(
                    "ℹ CIPHERLOCK_SECRETS_DIR set but no Settings.toml found at: {}",
                    secrets_path.display()
                );
            }
        }

        Ok(settings)
    }

    fn read_toml(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
        basic_toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Apply environment variable overrides to settings
    pub fn apply_env_overrides(settings: &mut Self) {
        Self::apply_application_env_overrides(&mut settings.application);
        Self::apply_webauthn_env_overrides(&mut settings.webauthn);
        Self::apply_firebase_env_overrides(&mut settings.firebase);
        Self::apply_storage_env_overrides(&mut settings.storage);
        Self::apply_logging_env_overrides(&mut settings.logging);
    }

    fn apply_application_env_overrides(app_settings: &mut ApplicationSettings) {
        if let Ok(host) = std::env::var("HOST") {
            app_settings.host = host;
        }
        if let Ok(port_str) = std::env::var("PORT") {
            if let Ok(port) = port_str.parse::<u16>() {
                app_settings.port = port;
            }
        }
        if let Ok(cors_origins) = std::env::var("CORS_ORIGINS") {
            app_settings.cors_origins = cors_origins;
        }
    }

    fn apply_webauthn_env_overrides(webauthn: &mut WebAuthnSettings) {
        if let Ok(rp_id) = std::env::var("RP_ID") {
            webauthn.rp_id = rp_id;
        }
        if let Ok(rp_name) = std::env::var("RP_NAME") {
            webauthn.rp_name = rp_name;
        }
        if let Ok(origins) = std::env::var("ORIGIN") {
            webauthn.origins = origins;
        }
        if let Ok(timeout_str) = std::env::var("WEBAUTHN_TIMEOUT_SECONDS") {
            if let Ok(timeout) = timeout_str.parse::<u64>() {
                webauthn.timeout_seconds = timeout;
            }
        }
    }

    fn apply_firebase_env_overrides(firebase: &mut FirebaseSettings) {
        if let Ok(project_id) = std::env::var("FIREBASE_PROJECT_ID") {
            firebase.project_id = project_id;
        }
        if let Ok(jwks_uri) = std::env::var("FIREBASE_JWKS_URI") {
            firebase.jwks_uri = jwks_uri;
        }
        if let Ok(base_url) = std::env::var("FIRESTORE_BASE_URL") {
            firebase.firestore_base_url = base_url;
        }
        if let Ok(token) = std::env::var("FIRESTORE_ACCESS_TOKEN") {
            firebase.access_token = (!token.is_empty()).then_some(token);
        }
    }

    fn apply_storage_env_overrides(storage: &mut StorageSettings) {
        if let Ok(backend) = std::env::var("STORAGE_BACKEND") {
            match backend.trim().to_ascii_lowercase().as_str() {
                "memory" => storage.backend = StorageBackend::Memory,
                "firestore" => storage.backend = StorageBackend::Firestore,
                other => eprintln!("⚠️  Ignoring unknown STORAGE_BACKEND '{other}'"),
            }
        }
    }

    fn apply_logging_env_overrides(logging_settings: &mut LoggingSettings) {
        if let Ok(log_level) = std::env::var("RUST_LOG") {
            logging_settings.level = log_level;
        }
    }

    /// Load environment variables from a .env file
    ///
    /// Variables already present in the process environment win over the file.
    fn load_env_file(path: &Path) {
        if let Ok(contents) = fs::read_to_string(path) {
            for line in contents.lines() {
                let line = line.trim();
                if line.starts_with('#') {
                    continue;
                }
                if let Some((key, value)) = line.split_once('=') {
                    let key = key.trim();
                    if key.is_empty() || std::env::var_os(key).is_some() {
                        continue;
                    }
                    std::env::set_var(key, value.trim());
                }
            }
        }
    }

    fn init_logging(logging: &LoggingSettings) {
        let env = env_logger::Env::default().default_filter_or(logging.level.as_str());
        if env_logger::Builder::from_env(env).try_init().is_err() {
            log::debug!("Logger already initialized");
        }
    }

    /// Check the settings a server cannot start without
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The relying party id is empty or not a bare domain
    /// - No trusted origin is configured
    /// - Firestore storage is selected without a Firebase project id
    /// - A WebAuthn preference is not one of its allowed values
    pub fn validate(&self) -> Result<()> {
        let rp_id = self.webauthn.rp_id.trim();
        if rp_id.is_empty() || rp_id.contains(['/', ':']) {
            bail!("webauthn.rp_id must be a bare domain, got '{rp_id}'");
        }
        if self.get_origins().is_empty() {
            bail!("webauthn.origins must list at least one trusted origin");
        }
        if self.storage.backend == StorageBackend::Firestore && self.firebase.project_id.is_empty()
        {
            bail!("firebase.project_id is required for the firestore storage backend");
        }

        let webauthn = &self.webauthn;
        if !REQUIREMENT_LEVELS.contains(&webauthn.user_verification.as_str()) {
            bail!(
                "webauthn.user_verification must be one of {REQUIREMENT_LEVELS:?}, got '{}'",
                webauthn.user_verification
            );
        }
        if !REQUIREMENT_LEVELS.contains(&webauthn.resident_key.as_str()) {
            bail!(
                "webauthn.resident_key must be one of {REQUIREMENT_LEVELS:?}, got '{}'",
                webauthn.resident_key
            );
        }
        if let Some(attachment) = &webauthn.authenticator_attachment {
            if !ATTACHMENTS.contains(&attachment.as_str()) {
                bail!(
                    "webauthn.authenticator_attachment must be one of {ATTACHMENTS:?}, got '{attachment}'"
                );
            }
        }
        Ok(())
    }

    /// Get the bind address for the server
    #[must_use]
    pub fn get_bind_address(&self) -> String {
        format!("{}:{}", self.application.host, self.application.port)
    }

    /// Get CORS origins as a vector of strings
    #[must_use]
    pub fn get_cors_origins(&self) -> Vec<String> {
        split_list(&self.application.cors_origins)
    }

    /// Get trusted WebAuthn origins as a vector of strings
    #[must_use]
    pub fn get_origins(&self) -> Vec<String> {
        split_list(&self.webauthn.origins)
    }
}

/// Allowed `userVerification` and `residentKey` values
const REQUIREMENT_LEVELS: [&str; 3] = ["required", "preferred", "discouraged"];

const ATTACHMENTS: [&str; 2] = ["platform", "cross-platform"];

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const ENV_VARS: &[&str] = &[
        "HOST",
        "PORT",
        "CORS_ORIGINS",
        "RP_ID",
        "RP_NAME",
        "ORIGIN",
        "WEBAUTHN_TIMEOUT_SECONDS",
        "FIREBASE_PROJECT_ID",
        "FIRESTORE_ACCESS_TOKEN",
        "STORAGE_BACKEND",
    ];

    fn clean_env_vars() {
        for var in ENV_VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn test_defaults() {
        let settings = CipherlockSettings::default();
        assert_eq!(settings.get_bind_address(), "0.0.0.0:5000");
        assert_eq!(settings.webauthn.rp_id, "localhost");
        assert_eq!(settings.webauthn.rp_name, "Cipherlock Vault");
        assert_eq!(settings.get_origins(), vec!["http://localhost:5173"]);
        assert_eq!(settings.webauthn.timeout_seconds, 60);
        assert_eq!(settings.storage.backend, StorageBackend::Memory);
        assert!(settings.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_webauthn_env_overrides() {
        clean_env_vars();
        std::env::set_var("RP_ID", "vault.example.com");
        std::env::set_var("ORIGIN", "https://vault.example.com, https://app.example.com");
        std::env::set_var("WEBAUTHN_TIMEOUT_SECONDS", "120");
        std::env::set_var("STORAGE_BACKEND", "Firestore");

        let mut settings = CipherlockSettings::default();
        CipherlockSettings::apply_env_overrides(&mut settings);

        assert_eq!(settings.webauthn.rp_id, "vault.example.com");
        assert_eq!(
            settings.get_origins(),
            vec!["https://vault.example.com", "https://app.example.com"]
        );
        assert_eq!(settings.webauthn.timeout_seconds, 120);
        assert_eq!(settings.storage.backend, StorageBackend::Firestore);

        clean_env_vars();
    }

    #[test]
    #[serial]
    fn test_invalid_numeric_env_ignored() {
        clean_env_vars();
        std::env::set_var("PORT", "not-a-port");
        std::env::set_var("WEBAUTHN_TIMEOUT_SECONDS", "soon");

        let mut settings = CipherlockSettings::default();
        CipherlockSettings::apply_env_overrides(&mut settings);

        assert_eq!(settings.application.port, 5000);
        assert_eq!(settings.webauthn.timeout_seconds, 60);

        clean_env_vars();
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let settings: CipherlockSettings = basic_toml::from_str(
            r#"
            [webauthn]
            rp_id = "vault.example.com"
            "#,
        )
        .unwrap();
        assert_eq!(settings.webauthn.rp_id, "vault.example.com");
        assert_eq!(settings.webauthn.rp_name, "Cipherlock Vault");
        assert_eq!(settings.application.port, 5000);
    }

    #[test]
    fn test_settings_dir_precedence() {
        let working = tempfile::tempdir().unwrap();
        let secrets = tempfile::tempdir().unwrap();

        fs::write(
            working.path().join("Settings.toml"),
            "[webauthn]\nrp_id = \"root.example.com\"\n",
        )
        .unwrap();

        let settings = CipherlockSettings::load_base_settings(working.path(), None).unwrap();
        assert_eq!(settings.webauthn.rp_id, "root.example.com");

        fs::write(
            secrets.path().join("Settings.toml"),
            "[webauthn]\nrp_id = \"secret.example.com\"\n",
        )
        .unwrap();

        let settings =
            CipherlockSettings::load_base_settings(working.path(), Some(secrets.path())).unwrap();
        assert_eq!(settings.webauthn.rp_id, "secret.example.com");
    }

    #[test]
    fn test_missing_secrets_file_falls_back() {
        let working = tempfile::tempdir().unwrap();
        let secrets = tempfile::tempdir().unwrap();

        let settings =
            CipherlockSettings::load_base_settings(working.path(), Some(secrets.path())).unwrap();
        assert_eq!(settings.webauthn.rp_id, "localhost");
    }

    #[test]
    fn test_malformed_toml_is_an_error() {
        let working = tempfile::tempdir().unwrap();
        fs::write(working.path().join("Settings.toml"), "[webauthn\nrp_id = ").unwrap();
        assert!(CipherlockSettings::load_base_settings(working.path(), None).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut settings = CipherlockSettings::default();
        settings.webauthn.rp_id = "https://vault.example.com".to_string();
        assert!(settings.validate().is_err());

        let mut settings = CipherlockSettings::default();
        settings.webauthn.origins = " , ".to_string();
        assert!(settings.validate().is_err());

        let mut settings = CipherlockSettings::default();
        settings.storage.backend = StorageBackend::Firestore;
        assert!(settings.validate().is_err());
        settings.firebase.project_id = "cipherlock-test".to_string();
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_validate_webauthn_preferences() {
        let mut settings = CipherlockSettings::default();
        settings.webauthn.user_verification = "required".to_string();
        settings.webauthn.resident_key = "discouraged".to_string();
        settings.webauthn.authenticator_attachment = Some("cross-platform".to_string());
        assert!(settings.validate().is_ok());
        settings.webauthn.authenticator_attachment = None;
        assert!(settings.validate().is_ok());

        let mut settings = CipherlockSettings::default();
        settings.webauthn.user_verification = "always".to_string();
        assert!(settings.validate().is_err());

        let mut settings = CipherlockSettings::default();
        settings.webauthn.resident_key = "Required".to_string();
        assert!(settings.validate().is_err());

        let mut settings = CipherlockSettings::default();
        settings.webauthn.authenticator_attachment = Some("usb".to_string());
        assert!(settings.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_env_file_does_not_override_process_env() {
        clean_env_vars();
        std::env::set_var("RP_ID", "vault.example.com");
        let dir = tempfile::tempdir().unwrap();
        let env_file = dir.path().join(".env");
        fs::write(
            &env_file,
            "# local overrides\nRP_ID=from-file.example\nRP_NAME = File Vault\n",
        )
        .unwrap();

        CipherlockSettings::load_env_file(&env_file);

        assert_eq!(std::env::var("RP_ID").unwrap(), "vault.example.com");
        assert_eq!(std::env::var("RP_NAME").unwrap(), "File Vault");

        clean_env_vars();
    }
}
