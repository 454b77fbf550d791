//! Transactional storage seam.
//!
//! Every mutating engine operation runs inside one [`StoreTx`]: rows are
//! locked with `lock_*` before they are read-modify-written, and nothing is
//! visible to other transactions until [`StoreTx::commit`]. Dropping a
//! transaction without committing discards its writes.
//!
//! Two backends exist: [`PgStore`] (row locks via `SELECT ... FOR UPDATE`)
//! and [`MemoryStore`] (one writer at a time over an in-process copy).

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::entities::{
    CheckInRecord, Event, Listing, Purchase, PurchaseRefund, RoyaltyAllocation, Ticket, Tier,
    TransferRecord,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A uniqueness backstop rejected the write.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A stored row could not be mapped back to a domain value.
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>>;
}

#[async_trait]
pub trait StoreTx: Send {
    async fn insert_event(&mut self, event: &Event) -> StoreResult<()>;
    async fn get_event(&mut self, id: Uuid) -> StoreResult<Option<Event>>;

    async fn insert_tier(&mut self, tier: &Tier) -> StoreResult<()>;
    async fn get_tier(&mut self, id: Uuid) -> StoreResult<Option<Tier>>;
    async fn lock_tier(&mut self, id: Uuid) -> StoreResult<Option<Tier>>;
    async fn update_tier_counters(&mut self, tier: &Tier) -> StoreResult<()>;
    /// Non-revoked tickets held by `owner` in the tier plus units in their
    /// pending purchases.
    async fn count_wallet_holdings(&mut self, tier_id: Uuid, owner: &str) -> StoreResult<i64>;

    async fn insert_purchase(&mut self, purchase: &Purchase) -> StoreResult<()>;
    async fn get_purchase(&mut self, id: Uuid) -> StoreResult<Option<Purchase>>;
    async fn lock_purchase(&mut self, id: Uuid) -> StoreResult<Option<Purchase>>;
    async fn lock_purchase_by_correlation(
        &mut self,
        correlation_id: &str,
    ) -> StoreResult<Option<Purchase>>;
    /// Persist status, failure reason, refunded amount, ticket ids and timestamps.
    async fn update_purchase(&mut self, purchase: &Purchase) -> StoreResult<()>;
    /// Returns `false` when the refund reference was already recorded.
    async fn record_refund(&mut self, refund: &PurchaseRefund) -> StoreResult<bool>;
    async fn stale_pending_purchases(
        &mut self,
        created_before: OffsetDateTime,
        limit: i64,
    ) -> StoreResult<Vec<Uuid>>;

    async fn insert_tickets(&mut self, tickets: &[Ticket]) -> StoreResult<()>;
    async fn get_ticket(&mut self, id: Uuid) -> StoreResult<Option<Ticket>>;
    async fn lock_ticket(&mut self, id: Uuid) -> StoreResult<Option<Ticket>>;
    async fn update_ticket(&mut self, ticket: &Ticket) -> StoreResult<()>;
    async fn lock_tickets_for_purchase(&mut self, purchase_id: Uuid) -> StoreResult<Vec<Ticket>>;
    /// Tickets still waiting for an external token, under the attempt limit.
    async fn tickets_pending_mint(
        &mut self,
        max_attempts: i32,
        limit: i64,
    ) -> StoreResult<Vec<Ticket>>;

    async fn insert_listing(&mut self, listing: &Listing) -> StoreResult<()>;
    async fn get_listing(&mut self, id: Uuid) -> StoreResult<Option<Listing>>;
    async fn lock_listing(&mut self, id: Uuid) -> StoreResult<Option<Listing>>;
    async fn update_listing(&mut self, listing: &Listing) -> StoreResult<()>;
    async fn lock_active_listing_for_ticket(
        &mut self,
        ticket_id: Uuid,
    ) -> StoreResult<Option<Listing>>;
    async fn active_listings_for_tier(
        &mut self,
        tier_id: Uuid,
        now: OffsetDateTime,
        limit: i64,
    ) -> StoreResult<Vec<Listing>>;
    /// Active listings whose expiry is at or before `now`.
    async fn expirable_listings(
        &mut self,
        now: OffsetDateTime,
        limit: i64,
    ) -> StoreResult<Vec<Uuid>>;

    async fn insert_transfer(
        &mut self,
        transfer: &TransferRecord,
        allocations: &[RoyaltyAllocation],
    ) -> StoreResult<()>;
    async fn transfers_for_ticket(&mut self, ticket_id: Uuid) -> StoreResult<Vec<TransferRecord>>;

    async fn insert_check_in(&mut self, record: &CheckInRecord) -> StoreResult<()>;
    async fn check_ins_for_ticket(&mut self, ticket_id: Uuid) -> StoreResult<Vec<CheckInRecord>>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
}
