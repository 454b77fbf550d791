use time::Duration;

/// Engine behaviour knobs that may change on a config reload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketingSettings {
    /// ISO 4217 code stamped on every new purchase.
    pub currency: String,
    /// How long a pending purchase may hold inventory before the sweeper
    /// fails it.
    pub reservation_ttl: Duration,
    /// Lifetime of a rotating check-in code.
    pub code_ttl: Duration,
    /// Listing lifetime when the seller does not pick one.
    pub default_listing_ttl: Duration,
    /// Pause between expiry sweeps.
    pub sweep_interval: Duration,
    /// When set, new tickets wait in `PendingSettlement` until the external
    /// ledger confirms the mint.
    pub require_external_mint: bool,
    /// Mint attempts per ticket before the ledger sync gives up.
    pub mint_max_attempts: i32,
}

impl Default for TicketingSettings {
    fn default() -> Self {
        Self {
            currency: "USD".to_string(),
            reservation_ttl: Duration::minutes(15),
            code_ttl: Duration::seconds(30),
            default_listing_ttl: Duration::days(7),
            sweep_interval: Duration::seconds(30),
            require_external_mint: false,
            mint_max_attempts: 11,
        }
    }
}
