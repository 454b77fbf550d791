//! In-process store with the same transactional contract as Postgres.
//!
//! A transaction takes the single writer lock, works on a copy of the
//! tables and writes the copy back on commit. Holding the lock for the
//! whole transaction makes every transaction serializable.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use itertools::Itertools;
use time::OffsetDateTime;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{Store, StoreError, StoreResult, StoreTx};
use crate::entities::{
    CheckInRecord, Event, Listing, ListingStatus, Purchase, PurchaseRefund, PurchaseStatus,
    RoyaltyAllocation, Ticket, TicketStatus, Tier, TransferRecord,
};

#[derive(Debug, Clone, Default)]
struct MemoryTables {
    events: HashMap<Uuid, Event>,
    tiers: HashMap<Uuid, Tier>,
    purchases: BTreeMap<Uuid, Purchase>,
    refunds: Vec<PurchaseRefund>,
    tickets: BTreeMap<Uuid, Ticket>,
    listings: BTreeMap<Uuid, Listing>,
    transfers: Vec<(TransferRecord, Vec<RoyaltyAllocation>)>,
    check_ins: Vec<CheckInRecord>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<MemoryTables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        let guard = self.tables.clone().lock_owned().await;
        let work = guard.clone();
        Ok(Box::new(MemoryStoreTx { guard, work }))
    }
}

struct MemoryStoreTx {
    guard: OwnedMutexGuard<MemoryTables>,
    work: MemoryTables,
}

fn insert_unique<V: Clone>(
    map: &mut BTreeMap<Uuid, V>,
    id: Uuid,
    value: &V,
    what: &str,
) -> StoreResult<()> {
    if map.contains_key(&id) {
        return Err(StoreError::Conflict(format!("duplicate {what} id {id}")));
    }
    map.insert(id, value.clone());
    Ok(())
}

fn replace_existing<V: Clone>(
    map: &mut BTreeMap<Uuid, V>,
    id: Uuid,
    value: &V,
    what: &str,
) -> StoreResult<()> {
    match map.get_mut(&id) {
        Some(slot) => {
            *slot = value.clone();
            Ok(())
        }
        None => Err(StoreError::Corrupt(format!("{what} {id} vanished during update"))),
    }
}

impl MemoryStoreTx {
    fn check_single_active_listing(&self, listing: &Listing) -> StoreResult<()> {
        if listing.status != ListingStatus::Active {
            return Ok(());
        }
        let clash = self.work.listings.values().any(|other| {
            other.id != listing.id
                && other.ticket_id == listing.ticket_id
                && other.status == ListingStatus::Active
        });
        if clash {
            return Err(StoreError::Conflict(format!(
                "ticket {} already has an active listing",
                listing.ticket_id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl StoreTx for MemoryStoreTx {
    async fn insert_event(&mut self, event: &Event) -> StoreResult<()> {
        if self.work.events.contains_key(&event.id) {
            return Err(StoreError::Conflict(format!("duplicate event id {}", event.id)));
        }
        self.work.events.insert(event.id, event.clone());
        Ok(())
    }

    async fn get_event(&mut self, id: Uuid) -> StoreResult<Option<Event>> {
        Ok(self.work.events.get(&id).cloned())
    }

    async fn insert_tier(&mut self, tier: &Tier) -> StoreResult<()> {
        if !self.work.events.contains_key(&tier.event_id) {
            return Err(StoreError::Conflict(format!(
                "tier {} references unknown event {}",
                tier.id, tier.event_id
            )));
        }
        if self.work.tiers.contains_key(&tier.id) {
            return Err(StoreError::Conflict(format!("duplicate tier id {}", tier.id)));
        }
        self.work.tiers.insert(tier.id, tier.clone());
        Ok(())
    }

    async fn get_tier(&mut self, id: Uuid) -> StoreResult<Option<Tier>> {
        Ok(self.work.tiers.get(&id).cloned())
    }

    async fn lock_tier(&mut self, id: Uuid) -> StoreResult<Option<Tier>> {
        Ok(self.work.tiers.get(&id).cloned())
    }

    async fn update_tier_counters(&mut self, tier: &Tier) -> StoreResult<()> {
        let Some(slot) = self.work.tiers.get_mut(&tier.id) else {
            return Err(StoreError::Corrupt(format!("tier {} vanished during update", tier.id)));
        };
        slot.sold_quantity = tier.sold_quantity;
        slot.reserved_quantity = tier.reserved_quantity;
        Ok(())
    }

    async fn count_wallet_holdings(&mut self, tier_id: Uuid, owner: &str) -> StoreResult<i64> {
        let held = self
            .work
            .tickets
            .values()
            .filter(|t| {
                t.tier_id == tier_id && t.owner_id == owner && t.status != TicketStatus::Revoked
            })
            .count() as i64;
        let pending: i64 = self
            .work
            .purchases
            .values()
            .filter(|p| p.status == PurchaseStatus::Pending && p.buyer_id == owner)
            .flat_map(|p| p.items.iter())
            .filter(|item| item.tier_id == tier_id)
            .map(|item| i64::from(item.quantity))
            .sum();
        Ok(held + pending)
    }

    async fn insert_purchase(&mut self, purchase: &Purchase) -> StoreResult<()> {
        if self
            .work
            .purchases
            .values()
            .any(|p| p.correlation_id == purchase.correlation_id)
        {
            return Err(StoreError::Conflict(format!(
                "duplicate correlation id {}",
                purchase.correlation_id
            )));
        }
        insert_unique(&mut self.work.purchases, purchase.id, purchase, "purchase")
    }

    async fn get_purchase(&mut self, id: Uuid) -> StoreResult<Option<Purchase>> {
        Ok(self.work.purchases.get(&id).cloned())
    }

    async fn lock_purchase(&mut self, id: Uuid) -> StoreResult<Option<Purchase>> {
        Ok(self.work.purchases.get(&id).cloned())
    }

    async fn lock_purchase_by_correlation(
        &mut self,
        correlation_id: &str,
    ) -> StoreResult<Option<Purchase>> {
        Ok(self
            .work
            .purchases
            .values()
            .find(|p| p.correlation_id == correlation_id)
            .cloned())
    }

    async fn update_purchase(&mut self, purchase: &Purchase) -> StoreResult<()> {
        replace_existing(&mut self.work.purchases, purchase.id, purchase, "purchase")
    }

    async fn record_refund(&mut self, refund: &PurchaseRefund) -> StoreResult<bool> {
        let duplicate = self
            .work
            .refunds
            .iter()
            .any(|r| r.purchase_id == refund.purchase_id && r.refund_ref == refund.refund_ref);
        if duplicate {
            return Ok(false);
        }
        self.work.refunds.push(refund.clone());
        Ok(true)
    }

    async fn stale_pending_purchases(
        &mut self,
        created_before: OffsetDateTime,
        limit: i64,
    ) -> StoreResult<Vec<Uuid>> {
        Ok(self
            .work
            .purchases
            .values()
            .filter(|p| p.status == PurchaseStatus::Pending && p.created_at < created_before)
            .sorted_by_key(|p| p.created_at)
            .take(usize::try_from(limit).unwrap_or(0))
            .map(|p| p.id)
            .collect())
    }

    async fn insert_tickets(&mut self, tickets: &[Ticket]) -> StoreResult<()> {
        for ticket in tickets {
            insert_unique(&mut self.work.tickets, ticket.id, ticket, "ticket")?;
        }
        Ok(())
    }

    async fn get_ticket(&mut self, id: Uuid) -> StoreResult<Option<Ticket>> {
        Ok(self.work.tickets.get(&id).cloned())
    }

    async fn lock_ticket(&mut self, id: Uuid) -> StoreResult<Option<Ticket>> {
        Ok(self.work.tickets.get(&id).cloned())
    }

    async fn update_ticket(&mut self, ticket: &Ticket) -> StoreResult<()> {
        replace_existing(&mut self.work.tickets, ticket.id, ticket, "ticket")
    }

    async fn lock_tickets_for_purchase(&mut self, purchase_id: Uuid) -> StoreResult<Vec<Ticket>> {
        Ok(self
            .work
            .tickets
            .values()
            .filter(|t| t.purchase_id == purchase_id)
            .cloned()
            .collect())
    }

    async fn tickets_pending_mint(
        &mut self,
        max_attempts: i32,
        limit: i64,
    ) -> StoreResult<Vec<Ticket>> {
        Ok(self
            .work
            .tickets
            .values()
            .filter(|t| {
                t.status == TicketStatus::PendingSettlement
                    && t.external_token_ref.is_none()
                    && t.mint_attempts < max_attempts
            })
            .sorted_by_key(|t| t.created_at)
            .take(usize::try_from(limit).unwrap_or(0))
            .cloned()
            .collect())
    }

    async fn insert_listing(&mut self, listing: &Listing) -> StoreResult<()> {
        self.check_single_active_listing(listing)?;
        insert_unique(&mut self.work.listings, listing.id, listing, "listing")
    }

    async fn get_listing(&mut self, id: Uuid) -> StoreResult<Option<Listing>> {
        Ok(self.work.listings.get(&id).cloned())
    }

    async fn lock_listing(&mut self, id: Uuid) -> StoreResult<Option<Listing>> {
        Ok(self.work.listings.get(&id).cloned())
    }

    async fn update_listing(&mut self, listing: &Listing) -> StoreResult<()> {
        self.check_single_active_listing(listing)?;
        replace_existing(&mut self.work.listings, listing.id, listing, "listing")
    }

    async fn lock_active_listing_for_ticket(
        &mut self,
        ticket_id: Uuid,
    ) -> StoreResult<Option<Listing>> {
        Ok(self
            .work
            .listings
            .values()
            .find(|l| l.ticket_id == ticket_id && l.status == ListingStatus::Active)
            .cloned())
    }

    async fn active_listings_for_tier(
        &mut self,
        tier_id: Uuid,
        now: OffsetDateTime,
        limit: i64,
    ) -> StoreResult<Vec<Listing>> {
        let tickets = &self.work.tickets;
        Ok(self
            .work
            .listings
            .values()
            .filter(|l| l.is_live_at(now))
            .filter(|l| tickets.get(&l.ticket_id).is_some_and(|t| t.tier_id == tier_id))
            .sorted_by_key(|l| (l.price, l.created_at))
            .take(usize::try_from(limit).unwrap_or(0))
            .cloned()
            .collect())
    }

    async fn expirable_listings(
        &mut self,
        now: OffsetDateTime,
        limit: i64,
    ) -> StoreResult<Vec<Uuid>> {
        Ok(self
            .work
            .listings
            .values()
            .filter(|l| l.status == ListingStatus::Active && l.expires_at <= now)
            .sorted_by_key(|l| l.expires_at)
            .take(usize::try_from(limit).unwrap_or(0))
            .map(|l| l.id)
            .collect())
    }

    async fn insert_transfer(
        &mut self,
        transfer: &TransferRecord,
        allocations: &[RoyaltyAllocation],
    ) -> StoreResult<()> {
        if self.work.transfers.iter().any(|(t, _)| t.id == transfer.id) {
            return Err(StoreError::Conflict(format!("duplicate transfer id {}", transfer.id)));
        }
        self.work
            .transfers
            .push((transfer.clone(), allocations.to_vec()));
        Ok(())
    }

    async fn transfers_for_ticket(&mut self, ticket_id: Uuid) -> StoreResult<Vec<TransferRecord>> {
        Ok(self
            .work
            .transfers
            .iter()
            .filter(|(t, _)| t.ticket_id == ticket_id)
            .map(|(t, _)| t.clone())
            .collect())
    }

    async fn insert_check_in(&mut self, record: &CheckInRecord) -> StoreResult<()> {
        self.work.check_ins.push(record.clone());
        Ok(())
    }

    async fn check_ins_for_ticket(&mut self, ticket_id: Uuid) -> StoreResult<Vec<CheckInRecord>> {
        Ok(self
            .work
            .check_ins
            .iter()
            .filter(|c| c.ticket_id == ticket_id)
            .cloned()
            .collect())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryStoreTx { mut guard, work } = *self;
        *guard = work;
        Ok(())
    }
}
