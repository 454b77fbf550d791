//! Configuration module for trueticket-server.
//!
//! Handles loading configuration from TOML files, CLI arguments,
//! and environment variables. Also handles admin secret hashing.

pub mod file;
pub mod runtime;

use crate::config::file::{FileConfig, LedgerConfig as FileLedgerConfig};
use crate::config::runtime::{
    AdminConfig, CollaboratorConfig, ConfigStore, ServerConfig, SharedConfig, TicketingSettings,
};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use time::Duration;
use tokio::sync::RwLock;
use trueticket_core::checkin::HmacCodeSigner;
use trueticket_core::pricing::WeightedRoyaltySplit;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("password hashing error: {0}")]
    HashError(String),

    #[error("DATABASE_URL environment variable not set")]
    MissingDatabaseUrl,
}

/// Loaded configuration result containing all parts.
pub struct LoadedConfig {
    pub server: ServerConfig,
    pub admin: AdminConfig,
    pub payment: CollaboratorConfig,
    pub ledger: Option<CollaboratorConfig>,
    pub settings: TicketingSettings,
    /// Only read at startup; changing it needs a restart.
    pub check_in_signer: Arc<HmacCodeSigner>,
    /// Only read at startup; changing it needs a restart.
    pub royalty_split: Arc<WeightedRoyaltySplit>,
}

impl LoadedConfig {
    /// Convert into a SharedConfig with Arc<RwLock<T>> wrappers.
    pub fn to_shared(&self) -> SharedConfig {
        SharedConfig {
            server: Arc::new(RwLock::new(self.server.clone())),
            admin: Arc::new(RwLock::new(self.admin.clone())),
            payment: Arc::new(RwLock::new(self.payment.clone())),
            ledger: Arc::new(RwLock::new(self.ledger.clone())),
            settings: ConfigStore::new(self.settings.clone()),
        }
    }

    /// Push the reloadable sections into a running SharedConfig.
    pub async fn apply_to(self, shared: &SharedConfig) {
        *shared.server.write().await = self.server;
        *shared.admin.write().await = self.admin;
        *shared.payment.write().await = self.payment;
        *shared.ledger.write().await = self.ledger;
        shared.settings.update(self.settings).await;
    }
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: std::path::PathBuf,
    listen_override: Option<SocketAddr>,
}

impl ConfigLoader {
    pub fn new(config_path: impl AsRef<Path>, listen_override: Option<SocketAddr>) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            listen_override,
        }
    }

    /// Read, override, validate, hash the admin secret if it is still
    /// plaintext (rewriting the file), and build the runtime parts.
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let config_content = std::fs::read_to_string(&self.config_path)?;
        let mut file_config: FileConfig = toml::from_str(&config_content)?;

        if let Some(listen) = self.listen_override {
            file_config.server.listen = listen;
        }

        let secret_hash = if file_config.is_admin_secret_hashed() {
            file_config.admin.secret.clone()
        } else {
            let hash = self.hash_secret(&file_config.admin.secret)?;
            file_config.admin.secret = hash.clone();
            self.rewrite_config(&file_config)?;
            tracing::info!("Admin secret hashed and config file updated");
            hash
        };

        self.build_loaded_config(file_config, secret_hash)
    }

    /// Reload the configuration (used during SIGHUP).
    pub fn reload(&self) -> Result<LoadedConfig, ConfigError> {
        self.load()
    }

    fn hash_secret(&self, plaintext: &str) -> Result<String, ConfigError> {
        use argon2::{
            Argon2, PasswordHasher,
            password_hash::{SaltString, rand_core::OsRng},
        };

        if plaintext.is_empty() {
            return Err(ConfigError::ValidationError(
                "admin secret is empty".to_string(),
            ));
        }
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(plaintext.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| ConfigError::HashError(e.to_string()))
    }

    fn rewrite_config(&self, config: &FileConfig) -> Result<(), ConfigError> {
        let toml_string = toml::to_string_pretty(config)?;

        // Write atomically: write to temp file, then rename
        let temp_path = self.config_path.with_extension("toml.tmp");
        std::fs::write(&temp_path, toml_string)?;
        std::fs::rename(&temp_path, &self.config_path)?;

        Ok(())
    }

    fn build_loaded_config(
        &self,
        file_config: FileConfig,
        secret_hash: String,
    ) -> Result<LoadedConfig, ConfigError> {
        let FileConfig {
            server,
            payment,
            ledger,
            check_in,
            reservations,
            resale,
            ..
        } = file_config;

        let currency = payment.currency.trim().to_ascii_uppercase();
        if currency.len() != 3 || !currency.bytes().all(|b| b.is_ascii_uppercase()) {
            return Err(ConfigError::ValidationError(format!(
                "currency {:?} is not an ISO 4217 code",
                payment.currency
            )));
        }
        if payment.secret.is_empty() {
            return Err(ConfigError::ValidationError(
                "payment secret is empty".to_string(),
            ));
        }

        let check_in_signer = HmacCodeSigner::new(check_in.signing_key.as_bytes())
            .map_err(|e| ConfigError::ValidationError(format!("check_in.signing_key: {e}")))?;

        let royalty_split = if resale.royalty_split.is_empty() {
            WeightedRoyaltySplit::host_only()
        } else {
            WeightedRoyaltySplit::new(
                resale
                    .royalty_split
                    .iter()
                    .map(|share| (share.beneficiary.into(), share.weight_bps)),
            )
            .map_err(|e| ConfigError::ValidationError(format!("resale.royalty_split: {e}")))?
        };

        let require_external_mint = ledger.as_ref().is_some_and(|l| l.require_mint);
        let mint_max_attempts = ledger.as_ref().map_or(11, |l| l.mint_max_attempts);
        let settings = TicketingSettings {
            currency,
            reservation_ttl: positive_secs("reservations.ttl_secs", reservations.ttl_secs)?,
            code_ttl: positive_secs("check_in.code_ttl_secs", check_in.code_ttl_secs)?,
            default_listing_ttl: positive_secs(
                "resale.default_listing_ttl_secs",
                resale.default_listing_ttl_secs,
            )?,
            sweep_interval: positive_secs(
                "reservations.sweep_interval_secs",
                reservations.sweep_interval_secs,
            )?,
            require_external_mint,
            mint_max_attempts,
        };
        if settings.mint_max_attempts <= 0 {
            return Err(ConfigError::ValidationError(
                "ledger.mint_max_attempts must be positive".to_string(),
            ));
        }

        Ok(LoadedConfig {
            server: ServerConfig {
                listen: server.listen,
            },
            admin: AdminConfig::new(secret_hash),
            payment: CollaboratorConfig::new(
                payment.gateway_url,
                payment.secret.into_bytes().into_boxed_slice(),
            ),
            ledger: ledger.map(convert_ledger),
            settings,
            check_in_signer: Arc::new(check_in_signer),
            royalty_split: Arc::new(royalty_split),
        })
    }
}

fn positive_secs(field: &str, secs: i64) -> Result<Duration, ConfigError> {
    if secs <= 0 {
        return Err(ConfigError::ValidationError(format!(
            "{field} must be positive, got {secs}"
        )));
    }
    Ok(Duration::seconds(secs))
}

fn convert_ledger(l: FileLedgerConfig) -> CollaboratorConfig {
    CollaboratorConfig::new(l.endpoint, l.secret.into_bytes().into_boxed_slice())
}

/// Get the database URL from the environment.
pub fn get_database_url() -> Result<String, ConfigError> {
    std::env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const BASE: &str = r#"
[admin]
secret = "plaintext-admin"

[payment]
gateway_url = "https://pay.example.com/"
secret = "payment-secret"
currency = "eur"

[check_in]
signing_key = "0123456789abcdef0123456789abcdef"
"#;

    fn write_config(contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("trueticket-{}.toml", uuid::Uuid::new_v4()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_load_hashes_admin_secret_and_rewrites_file() {
        let path = write_config(BASE);
        let loader = ConfigLoader::new(&path, None);

        let loaded = loader.load().unwrap();
        assert!(loaded.admin.verify("plaintext-admin"));
        assert_eq!(loaded.settings.currency, "EUR");
        assert!(!loaded.settings.require_external_mint);

        let rewritten = std::fs::read_to_string(&path).unwrap();
        assert!(rewritten.contains("$argon2"));
        assert!(!rewritten.contains("plaintext-admin"));

        // A second load keeps the stored hash.
        let reloaded = loader.reload().unwrap();
        assert_eq!(reloaded.admin.secret_hash(), loaded.admin.secret_hash());
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_listen_override() {
        let path = write_config(BASE);
        let listen: SocketAddr = "127.0.0.1:9999".parse().unwrap();
        let loaded = ConfigLoader::new(&path, Some(listen)).load().unwrap();
        assert_eq!(loaded.server.listen, listen);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_weak_signing_key_rejected() {
        let path = write_config(&BASE.replace("0123456789abcdef0123456789abcdef", "short"));
        let err = ConfigLoader::new(&path, None).load().err().unwrap();
        assert!(matches!(err, ConfigError::ValidationError(_)));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_bad_royalty_split_rejected() {
        let contents = format!(
            "{BASE}\n[[resale.royalty_split]]\nbeneficiary = \"artist\"\nweight_bps = 9000\n"
        );
        let path = write_config(&contents);
        let err = ConfigLoader::new(&path, None).load().err().unwrap();
        assert!(matches!(err, ConfigError::ValidationError(_)));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_ledger_enables_external_mint() {
        let contents = format!(
            "{BASE}\n[ledger]\nendpoint = \"https://ledger.example.com/\"\nsecret = \"ledger-secret\"\nrequire_mint = true\n"
        );
        let path = write_config(&contents);
        let loaded = ConfigLoader::new(&path, None).load().unwrap();
        assert!(loaded.settings.require_external_mint);
        assert_eq!(
            loaded.ledger.unwrap().endpoint.as_str(),
            "https://ledger.example.com/"
        );
        std::fs::remove_file(&path).unwrap();
    }
}
