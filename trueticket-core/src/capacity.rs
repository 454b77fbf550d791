//! Capacity Ledger: per-tier sold/reserved counters.
//!
//! The tx-level functions are the only code that mutates tier counters.
//! Each one locks the tier row, checks the invariant and writes back inside
//! the caller's transaction, so a failed caller leaves no partial change.

use std::sync::Arc;

use kanau::processor::Processor;
use uuid::Uuid;

use crate::entities::Tier;
use crate::error::{Resource, TicketingError, TicketingResult};
use crate::store::{Store, StoreTx};

async fn lock(tx: &mut dyn StoreTx, tier_id: Uuid) -> TicketingResult<Tier> {
    tx.lock_tier(tier_id)
        .await?
        .ok_or(TicketingError::NotFound(Resource::Tier))
}

fn ensure_positive(quantity: i32) -> TicketingResult<()> {
    if quantity <= 0 {
        return Err(TicketingError::InvalidRequest(format!(
            "quantity must be positive, got {quantity}"
        )));
    }
    Ok(())
}

/// Hold `quantity` units of the tier for `requester`.
///
/// Enforces the tier's wallet limit against tickets the requester already
/// holds plus units in their other pending purchases.
pub async fn reserve(
    tx: &mut dyn StoreTx,
    tier_id: Uuid,
    quantity: i32,
    requester: &str,
) -> TicketingResult<Tier> {
    ensure_positive(quantity)?;
    let mut tier = lock(tx, tier_id).await?;

    let available = tier.available();
    if available < quantity {
        return Err(TicketingError::InsufficientInventory {
            tier_id,
            requested: quantity,
            available: available.max(0),
        });
    }

    if let Some(limit) = tier.max_per_wallet {
        let held = tx.count_wallet_holdings(tier_id, requester).await?;
        if held + i64::from(quantity) > i64::from(limit) {
            return Err(TicketingError::WalletLimitExceeded {
                tier_id,
                limit,
                held,
                requested: quantity,
            });
        }
    }

    tier.reserved_quantity += quantity;
    tx.update_tier_counters(&tier).await?;
    tracing::debug!(tier_id = %tier_id, quantity, reserved = tier.reserved_quantity, "Reserved");
    Ok(tier)
}

/// Turn `quantity` reserved units into sold units after settlement.
pub async fn commit(tx: &mut dyn StoreTx, tier_id: Uuid, quantity: i32) -> TicketingResult<Tier> {
    ensure_positive(quantity)?;
    let mut tier = lock(tx, tier_id).await?;
    if tier.reserved_quantity < quantity {
        tracing::error!(
            tier_id = %tier_id,
            reserved = tier.reserved_quantity,
            quantity,
            "Commit exceeds reserved quantity"
        );
        return Err(TicketingError::Internal(format!(
            "tier {tier_id} has only {} reserved units",
            tier.reserved_quantity
        )));
    }
    tier.reserved_quantity -= quantity;
    tier.sold_quantity += quantity;
    tx.update_tier_counters(&tier).await?;
    tracing::debug!(tier_id = %tier_id, quantity, sold = tier.sold_quantity, "Committed");
    Ok(tier)
}

/// Return `quantity` reserved units to sale.
pub async fn release(tx: &mut dyn StoreTx, tier_id: Uuid, quantity: i32) -> TicketingResult<Tier> {
    ensure_positive(quantity)?;
    let mut tier = lock(tx, tier_id).await?;
    if tier.reserved_quantity < quantity {
        tracing::error!(
            tier_id = %tier_id,
            reserved = tier.reserved_quantity,
            quantity,
            "Release exceeds reserved quantity"
        );
        return Err(TicketingError::Internal(format!(
            "tier {tier_id} has only {} reserved units",
            tier.reserved_quantity
        )));
    }
    tier.reserved_quantity -= quantity;
    tx.update_tier_counters(&tier).await?;
    tracing::debug!(tier_id = %tier_id, quantity, reserved = tier.reserved_quantity, "Released");
    Ok(tier)
}

/// Standalone access to the ledger, each call in its own transaction.
#[derive(Clone)]
pub struct CapacityLedger {
    store: Arc<dyn Store>,
}

impl CapacityLedger {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[derive(Debug, Clone)]
pub struct Reserve {
    pub tier_id: Uuid,
    pub quantity: i32,
    pub requester: String,
}

#[derive(Debug, Clone)]
pub struct Commit {
    pub tier_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Clone)]
pub struct Release {
    pub tier_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Clone)]
pub struct GetTierAvailability {
    pub tier_id: Uuid,
}

impl Processor<Reserve> for CapacityLedger {
    type Output = Tier;
    type Error = TicketingError;

    async fn process(&self, input: Reserve) -> Result<Tier, TicketingError> {
        let mut tx = self.store.begin().await?;
        let tier = reserve(tx.as_mut(), input.tier_id, input.quantity, &input.requester).await?;
        tx.commit().await?;
        Ok(tier)
    }
}

impl Processor<Commit> for CapacityLedger {
    type Output = Tier;
    type Error = TicketingError;

    async fn process(&self, input: Commit) -> Result<Tier, TicketingError> {
        let mut tx = self.store.begin().await?;
        let tier = commit(tx.as_mut(), input.tier_id, input.quantity).await?;
        tx.commit().await?;
        Ok(tier)
    }
}

impl Processor<Release> for CapacityLedger {
    type Output = Tier;
    type Error = TicketingError;

    async fn process(&self, input: Release) -> Result<Tier, TicketingError> {
        let mut tx = self.store.begin().await?;
        let tier = release(tx.as_mut(), input.tier_id, input.quantity).await?;
        tx.commit().await?;
        Ok(tier)
    }
}

impl Processor<GetTierAvailability> for CapacityLedger {
    type Output = Tier;
    type Error = TicketingError;

    async fn process(&self, input: GetTierAvailability) -> Result<Tier, TicketingError> {
        let mut tx = self.store.begin().await?;
        tx.get_tier(input.tier_id)
            .await?
            .ok_or(TicketingError::NotFound(Resource::Tier))
    }
}
