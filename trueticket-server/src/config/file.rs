//! TOML file configuration structures.
//!
//! These structs directly map to the `trueticket.toml` file format.

use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use trueticket_sdk::objects::Beneficiary;
use url::Url;

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub admin: AdminConfig,
    pub payment: PaymentConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ledger: Option<LedgerConfig>,
    pub check_in: CheckInConfig,
    #[serde(default)]
    pub reservations: ReservationsConfig,
    #[serde(default)]
    pub resale: ResaleConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The address and port to listen on (e.g., "0.0.0.0:8080").
    #[serde(default = "default_listen_addr")]
    pub listen: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8080))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    /// The admin secret. If this is plaintext (doesn't start with `$argon2`),
    /// it will be hashed and the config file will be rewritten.
    pub secret: String,
}

/// Payment collaborator section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentConfig {
    /// Base URL of the payment gateway; checkouts are posted to `{base}checkouts`.
    pub gateway_url: Url,
    /// Shared HMAC key for initiation requests and incoming callbacks.
    pub secret: String,
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_currency() -> String {
    "USD".to_string()
}

/// Optional external ledger section. Without it tickets settle at purchase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    pub endpoint: Url,
    pub secret: String,
    /// Hold tickets in `pending_settlement` until the mint is confirmed.
    #[serde(default)]
    pub require_mint: bool,
    #[serde(default = "default_mint_max_attempts")]
    pub mint_max_attempts: i32,
}

fn default_mint_max_attempts() -> i32 {
    11
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckInConfig {
    /// HMAC key for rotating entry codes, at least 16 bytes.
    pub signing_key: String,
    #[serde(default = "default_code_ttl_secs")]
    pub code_ttl_secs: i64,
}

fn default_code_ttl_secs() -> i64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationsConfig {
    #[serde(default = "default_reservation_ttl_secs")]
    pub ttl_secs: i64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: i64,
}

impl Default for ReservationsConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_reservation_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

fn default_reservation_ttl_secs() -> i64 {
    15 * 60
}

fn default_sweep_interval_secs() -> i64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResaleConfig {
    #[serde(default = "default_listing_ttl_secs")]
    pub default_listing_ttl_secs: i64,
    /// Royalty split weights in basis points. Empty means everything to the host.
    #[serde(default)]
    pub royalty_split: Vec<RoyaltyShareConfig>,
}

impl Default for ResaleConfig {
    fn default() -> Self {
        Self {
            default_listing_ttl_secs: default_listing_ttl_secs(),
            royalty_split: Vec::new(),
        }
    }
}

fn default_listing_ttl_secs() -> i64 {
    7 * 24 * 60 * 60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoyaltyShareConfig {
    pub beneficiary: Beneficiary,
    pub weight_bps: u32,
}

impl FileConfig {
    /// Check if the admin secret is already hashed (argon2 format).
    pub fn is_admin_secret_hashed(&self) -> bool {
        self.admin.secret.starts_with("$argon2")
    }
}
