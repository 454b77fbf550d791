//! Postgres backend. Queries are checked at runtime so the crate builds
//! without a live database.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use time::OffsetDateTime;
use uuid::Uuid;

use super::{Store, StoreError, StoreResult, StoreTx};
use crate::entities::{
    CheckInRecord, Event, FailureReason, Listing, PriceCapKind, PriceCapPolicy, Purchase,
    PurchaseItem, PurchaseRefund, PurchaseStatus, ResalePolicy, RoyaltyAllocation, Ticket, Tier,
    TransferRecord,
};

const EVENT_COLUMNS: &str = "id, name, starts_at, ends_at, price_cap_kind, price_cap_value, \
                             min_resale_price, royalty_bps";
const TIER_COLUMNS: &str = "id, event_id, name, total_quantity, sold_quantity, \
                            reserved_quantity, max_per_wallet, price_face, price_cap_kind, \
                            price_cap_value, min_resale_price";
const PURCHASE_COLUMNS: &str = "id, correlation_id, buyer_id, status, failure_reason, currency, \
                                amount, refunded_amount, ticket_ids, created_at, updated_at, \
                                finalized_at";
const TICKET_COLUMNS: &str = "id, tier_id, event_id, purchase_id, owner_id, status, \
                              original_price, check_in_secret_ref, external_token_ref, listed, \
                              transfer_count, mint_attempts, mint_last_tried_at, created_at, \
                              updated_at";
const LISTING_COLUMNS: &str = "id, ticket_id, seller_id, price, status, expires_at, buyer_id, \
                               created_at, updated_at";
const TRANSFER_COLUMNS: &str = "id, ticket_id, kind, from_owner_id, to_owner_id, price, \
                                royalty_amount, listing_id, created_at";
const CHECK_IN_COLUMNS: &str = "id, ticket_id, scanner_id, method, outcome, created_at";

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    #[tracing::instrument(skip_all, err, name = "SQL:Begin")]
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgStoreTx { tx }))
    }
}

pub struct PgStoreTx {
    tx: sqlx::Transaction<'static, Postgres>,
}

/// Map unique violations onto [`StoreError::Conflict`].
fn conflict_aware(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return StoreError::Conflict(db.message().to_string());
        }
    }
    StoreError::Database(e)
}

#[derive(sqlx::FromRow)]
struct EventRow {
    id: Uuid,
    name: String,
    starts_at: OffsetDateTime,
    ends_at: OffsetDateTime,
    price_cap_kind: PriceCapKind,
    price_cap_value: i64,
    min_resale_price: Option<i64>,
    royalty_bps: i32,
}

impl TryFrom<EventRow> for Event {
    type Error = StoreError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        let cap = PriceCapPolicy::from_parts(row.price_cap_kind, row.price_cap_value).ok_or_else(
            || StoreError::Corrupt(format!("event {} has an invalid price cap", row.id)),
        )?;
        Ok(Event {
            id: row.id,
            name: row.name,
            starts_at: row.starts_at,
            ends_at: row.ends_at,
            resale_policy: ResalePolicy {
                cap,
                min_resale_price: row.min_resale_price,
            },
            royalty_bps: row.royalty_bps,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TierRow {
    id: Uuid,
    event_id: Uuid,
    name: String,
    total_quantity: i32,
    sold_quantity: i32,
    reserved_quantity: i32,
    max_per_wallet: Option<i32>,
    price_face: i64,
    price_cap_kind: Option<PriceCapKind>,
    price_cap_value: Option<i64>,
    min_resale_price: Option<i64>,
}

impl TryFrom<TierRow> for Tier {
    type Error = StoreError;

    fn try_from(row: TierRow) -> Result<Self, Self::Error> {
        let resale_policy = match row.price_cap_kind {
            Some(kind) => {
                let cap = PriceCapPolicy::from_parts(kind, row.price_cap_value.unwrap_or(0))
                    .ok_or_else(|| {
                        StoreError::Corrupt(format!("tier {} has an invalid price cap", row.id))
                    })?;
                Some(ResalePolicy {
                    cap,
                    min_resale_price: row.min_resale_price,
                })
            }
            None => None,
        };
        Ok(Tier {
            id: row.id,
            event_id: row.event_id,
            name: row.name,
            total_quantity: row.total_quantity,
            sold_quantity: row.sold_quantity,
            reserved_quantity: row.reserved_quantity,
            max_per_wallet: row.max_per_wallet,
            price_face: row.price_face,
            resale_policy,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PurchaseRow {
    id: Uuid,
    correlation_id: String,
    buyer_id: String,
    status: PurchaseStatus,
    failure_reason: Option<FailureReason>,
    currency: String,
    amount: i64,
    refunded_amount: i64,
    ticket_ids: Vec<Uuid>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
    finalized_at: Option<OffsetDateTime>,
}

impl PgStoreTx {
    async fn fetch_tier(&mut self, id: Uuid, for_update: bool) -> StoreResult<Option<Tier>> {
        let sql = format!(
            "SELECT {TIER_COLUMNS} FROM tiers WHERE id = $1{}",
            if for_update { " FOR UPDATE" } else { "" }
        );
        let row: Option<TierRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(Tier::try_from).transpose()
    }

    async fn fetch_purchase(
        &mut self,
        key: PurchaseKey<'_>,
        for_update: bool,
    ) -> StoreResult<Option<Purchase>> {
        let sql = format!(
            "SELECT {PURCHASE_COLUMNS} FROM purchases WHERE {} = $1{}",
            key.column(),
            if for_update { " FOR UPDATE" } else { "" }
        );
        let query = sqlx::query_as::<_, PurchaseRow>(&sql);
        let query = match key {
            PurchaseKey::Id(id) => query.bind(id),
            PurchaseKey::Correlation(correlation_id) => query.bind(correlation_id),
        };
        let Some(row) = query.fetch_optional(&mut *self.tx).await? else {
            return Ok(None);
        };
        let items: Vec<PurchaseItem> = sqlx::query_as(
            "SELECT tier_id, quantity, unit_price FROM purchase_items \
             WHERE purchase_id = $1 ORDER BY tier_id",
        )
        .bind(row.id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(Some(Purchase {
            id: row.id,
            correlation_id: row.correlation_id,
            buyer_id: row.buyer_id,
            status: row.status,
            failure_reason: row.failure_reason,
            currency: row.currency,
            amount: row.amount,
            refunded_amount: row.refunded_amount,
            items: items.into_iter().collect(),
            ticket_ids: row.ticket_ids,
            created_at: row.created_at,
            updated_at: row.updated_at,
            finalized_at: row.finalized_at,
        }))
    }

    async fn fetch_ticket(&mut self, id: Uuid, for_update: bool) -> StoreResult<Option<Ticket>> {
        let sql = format!(
            "SELECT {TICKET_COLUMNS} FROM tickets WHERE id = $1{}",
            if for_update { " FOR UPDATE" } else { "" }
        );
        Ok(sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?)
    }

    async fn fetch_listing(&mut self, id: Uuid, for_update: bool) -> StoreResult<Option<Listing>> {
        let sql = format!(
            "SELECT {LISTING_COLUMNS} FROM listings WHERE id = $1{}",
            if for_update { " FOR UPDATE" } else { "" }
        );
        Ok(sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?)
    }
}

enum PurchaseKey<'a> {
    Id(Uuid),
    Correlation(&'a str),
}

impl PurchaseKey<'_> {
    fn column(&self) -> &'static str {
        match self {
            PurchaseKey::Id(_) => "id",
            PurchaseKey::Correlation(_) => "correlation_id",
        }
    }
}

#[async_trait]
impl StoreTx for PgStoreTx {
    #[tracing::instrument(skip_all, err, name = "SQL:InsertEvent")]
    async fn insert_event(&mut self, event: &Event) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO events (id, name, starts_at, ends_at, price_cap_kind, price_cap_value, \
             min_resale_price, royalty_bps) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(event.id)
        .bind(&event.name)
        .bind(event.starts_at)
        .bind(event.ends_at)
        .bind(event.resale_policy.cap.kind())
        .bind(event.resale_policy.cap.value())
        .bind(event.resale_policy.min_resale_price)
        .bind(event.royalty_bps)
        .execute(&mut *self.tx)
        .await
        .map_err(conflict_aware)?;
        Ok(())
    }

    #[tracing::instrument(skip_all, err, name = "SQL:GetEvent")]
    async fn get_event(&mut self, id: Uuid) -> StoreResult<Option<Event>> {
        let sql = format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = $1");
        let row: Option<EventRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(Event::try_from).transpose()
    }

    #[tracing::instrument(skip_all, err, name = "SQL:InsertTier")]
    async fn insert_tier(&mut self, tier: &Tier) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO tiers (id, event_id, name, total_quantity, sold_quantity, \
             reserved_quantity, max_per_wallet, price_face, price_cap_kind, price_cap_value, \
             min_resale_price) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(tier.id)
        .bind(tier.event_id)
        .bind(&tier.name)
        .bind(tier.total_quantity)
        .bind(tier.sold_quantity)
        .bind(tier.reserved_quantity)
        .bind(tier.max_per_wallet)
        .bind(tier.price_face)
        .bind(tier.resale_policy.map(|p| p.cap.kind()))
        .bind(tier.resale_policy.map(|p| p.cap.value()))
        .bind(tier.resale_policy.and_then(|p| p.min_resale_price))
        .execute(&mut *self.tx)
        .await
        .map_err(conflict_aware)?;
        Ok(())
    }

    #[tracing::instrument(skip_all, err, name = "SQL:GetTier")]
    async fn get_tier(&mut self, id: Uuid) -> StoreResult<Option<Tier>> {
        self.fetch_tier(id, false).await
    }

    #[tracing::instrument(skip_all, err, name = "SQL:LockTier")]
    async fn lock_tier(&mut self, id: Uuid) -> StoreResult<Option<Tier>> {
        self.fetch_tier(id, true).await
    }

    #[tracing::instrument(skip_all, err, name = "SQL:UpdateTierCounters")]
    async fn update_tier_counters(&mut self, tier: &Tier) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE tiers SET sold_quantity = $2, reserved_quantity = $3 WHERE id = $1",
        )
        .bind(tier.id)
        .bind(tier.sold_quantity)
        .bind(tier.reserved_quantity)
        .execute(&mut *self.tx)
        .await?;
        if result.rows_affected() != 1 {
            return Err(StoreError::Corrupt(format!("tier {} vanished during update", tier.id)));
        }
        Ok(())
    }

    #[tracing::instrument(skip_all, err, name = "SQL:CountWalletHoldings")]
    async fn count_wallet_holdings(&mut self, tier_id: Uuid, owner: &str) -> StoreResult<i64> {
        let (held,): (i64,) = sqlx::query_as(
            "SELECT \
               (SELECT COUNT(*) FROM tickets \
                 WHERE tier_id = $1 AND owner_id = $2 AND status <> 'revoked') \
             + (SELECT COALESCE(SUM(i.quantity), 0) FROM purchase_items i \
                 JOIN purchases p ON p.id = i.purchase_id \
                 WHERE i.tier_id = $1 AND p.buyer_id = $2 AND p.status = 'pending')",
        )
        .bind(tier_id)
        .bind(owner)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(held)
    }

    #[tracing::instrument(skip_all, err, name = "SQL:InsertPurchase")]
    async fn insert_purchase(&mut self, purchase: &Purchase) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO purchases (id, correlation_id, buyer_id, status, failure_reason, \
             currency, amount, refunded_amount, ticket_ids, created_at, updated_at, finalized_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(purchase.id)
        .bind(&purchase.correlation_id)
        .bind(&purchase.buyer_id)
        .bind(purchase.status)
        .bind(purchase.failure_reason)
        .bind(&purchase.currency)
        .bind(purchase.amount)
        .bind(purchase.refunded_amount)
        .bind(&purchase.ticket_ids)
        .bind(purchase.created_at)
        .bind(purchase.updated_at)
        .bind(purchase.finalized_at)
        .execute(&mut *self.tx)
        .await
        .map_err(conflict_aware)?;

        if purchase.items.is_empty() {
            return Ok(());
        }
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO purchase_items (purchase_id, tier_id, quantity, unit_price) ",
        );
        builder.push_values(purchase.items.iter(), |mut b, item| {
            b.push_bind(purchase.id)
                .push_bind(item.tier_id)
                .push_bind(item.quantity)
                .push_bind(item.unit_price);
        });
        builder
            .build()
            .execute(&mut *self.tx)
            .await
            .map_err(conflict_aware)?;
        Ok(())
    }

    #[tracing::instrument(skip_all, err, name = "SQL:GetPurchase")]
    async fn get_purchase(&mut self, id: Uuid) -> StoreResult<Option<Purchase>> {
        self.fetch_purchase(PurchaseKey::Id(id), false).await
    }

    #[tracing::instrument(skip_all, err, name = "SQL:LockPurchase")]
    async fn lock_purchase(&mut self, id: Uuid) -> StoreResult<Option<Purchase>> {
        self.fetch_purchase(PurchaseKey::Id(id), true).await
    }

    #[tracing::instrument(skip_all, err, name = "SQL:LockPurchaseByCorrelation")]
    async fn lock_purchase_by_correlation(
        &mut self,
        correlation_id: &str,
    ) -> StoreResult<Option<Purchase>> {
        self.fetch_purchase(PurchaseKey::Correlation(correlation_id), true)
            .await
    }

    #[tracing::instrument(skip_all, err, name = "SQL:UpdatePurchase")]
    async fn update_purchase(&mut self, purchase: &Purchase) -> StoreResult<()> {
        sqlx::query(
            "UPDATE purchases SET status = $2, failure_reason = $3, refunded_amount = $4, \
             ticket_ids = $5, updated_at = $6, finalized_at = $7 WHERE id = $1",
        )
        .bind(purchase.id)
        .bind(purchase.status)
        .bind(purchase.failure_reason)
        .bind(purchase.refunded_amount)
        .bind(&purchase.ticket_ids)
        .bind(purchase.updated_at)
        .bind(purchase.finalized_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    #[tracing::instrument(skip_all, err, name = "SQL:RecordRefund")]
    async fn record_refund(&mut self, refund: &PurchaseRefund) -> StoreResult<bool> {
        let result = sqlx::query(
            "INSERT INTO purchase_refunds (purchase_id, refund_ref, amount, created_at) \
             VALUES ($1, $2, $3, $4) ON CONFLICT (purchase_id, refund_ref) DO NOTHING",
        )
        .bind(refund.purchase_id)
        .bind(&refund.refund_ref)
        .bind(refund.amount)
        .bind(refund.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    #[tracing::instrument(skip_all, err, name = "SQL:StalePendingPurchases")]
    async fn stale_pending_purchases(
        &mut self,
        created_before: OffsetDateTime,
        limit: i64,
    ) -> StoreResult<Vec<Uuid>> {
        let ids: Vec<(Uuid,)> = sqlx::query_as(
            "SELECT id FROM purchases WHERE status = 'pending' AND created_at < $1 \
             ORDER BY created_at LIMIT $2",
        )
        .bind(created_before)
        .bind(limit)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(ids.into_iter().map(|(id,)| id).collect())
    }

    #[tracing::instrument(skip_all, err, name = "SQL:InsertTickets")]
    async fn insert_tickets(&mut self, tickets: &[Ticket]) -> StoreResult<()> {
        if tickets.is_empty() {
            return Ok(());
        }
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("INSERT INTO tickets ({TICKET_COLUMNS}) "));
        builder.push_values(tickets, |mut b, t| {
            b.push_bind(t.id)
                .push_bind(t.tier_id)
                .push_bind(t.event_id)
                .push_bind(t.purchase_id)
                .push_bind(&t.owner_id)
                .push_bind(t.status)
                .push_bind(t.original_price)
                .push_bind(&t.check_in_secret_ref)
                .push_bind(&t.external_token_ref)
                .push_bind(t.listed)
                .push_bind(t.transfer_count)
                .push_bind(t.mint_attempts)
                .push_bind(t.mint_last_tried_at)
                .push_bind(t.created_at)
                .push_bind(t.updated_at);
        });
        builder
            .build()
            .execute(&mut *self.tx)
            .await
            .map_err(conflict_aware)?;
        Ok(())
    }

    #[tracing::instrument(skip_all, err, name = "SQL:GetTicket")]
    async fn get_ticket(&mut self, id: Uuid) -> StoreResult<Option<Ticket>> {
        self.fetch_ticket(id, false).await
    }

    #[tracing::instrument(skip_all, err, name = "SQL:LockTicket")]
    async fn lock_ticket(&mut self, id: Uuid) -> StoreResult<Option<Ticket>> {
        self.fetch_ticket(id, true).await
    }

    #[tracing::instrument(skip_all, err, name = "SQL:UpdateTicket")]
    async fn update_ticket(&mut self, ticket: &Ticket) -> StoreResult<()> {
        sqlx::query(
            "UPDATE tickets SET owner_id = $2, status = $3, check_in_secret_ref = $4, \
             external_token_ref = $5, listed = $6, transfer_count = $7, mint_attempts = $8, \
             mint_last_tried_at = $9, updated_at = $10 WHERE id = $1",
        )
        .bind(ticket.id)
        .bind(&ticket.owner_id)
        .bind(ticket.status)
        .bind(&ticket.check_in_secret_ref)
        .bind(&ticket.external_token_ref)
        .bind(ticket.listed)
        .bind(ticket.transfer_count)
        .bind(ticket.mint_attempts)
        .bind(ticket.mint_last_tried_at)
        .bind(ticket.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    #[tracing::instrument(skip_all, err, name = "SQL:LockTicketsForPurchase")]
    async fn lock_tickets_for_purchase(&mut self, purchase_id: Uuid) -> StoreResult<Vec<Ticket>> {
        let sql = format!(
            "SELECT {TICKET_COLUMNS} FROM tickets WHERE purchase_id = $1 ORDER BY id FOR UPDATE"
        );
        Ok(sqlx::query_as(&sql)
            .bind(purchase_id)
            .fetch_all(&mut *self.tx)
            .await?)
    }

    #[tracing::instrument(skip_all, err, name = "SQL:TicketsPendingMint")]
    async fn tickets_pending_mint(
        &mut self,
        max_attempts: i32,
        limit: i64,
    ) -> StoreResult<Vec<Ticket>> {
        let sql = format!(
            "SELECT {TICKET_COLUMNS} FROM tickets \
             WHERE status = 'pending_settlement' AND external_token_ref IS NULL \
             AND mint_attempts < $1 ORDER BY created_at LIMIT $2"
        );
        Ok(sqlx::query_as(&sql)
            .bind(max_attempts)
            .bind(limit)
            .fetch_all(&mut *self.tx)
            .await?)
    }

    #[tracing::instrument(skip_all, err, name = "SQL:InsertListing")]
    async fn insert_listing(&mut self, listing: &Listing) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO listings (id, ticket_id, seller_id, price, status, expires_at, buyer_id, \
             created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(listing.id)
        .bind(listing.ticket_id)
        .bind(&listing.seller_id)
        .bind(listing.price)
        .bind(listing.status)
        .bind(listing.expires_at)
        .bind(&listing.buyer_id)
        .bind(listing.created_at)
        .bind(listing.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(conflict_aware)?;
        Ok(())
    }

    #[tracing::instrument(skip_all, err, name = "SQL:GetListing")]
    async fn get_listing(&mut self, id: Uuid) -> StoreResult<Option<Listing>> {
        self.fetch_listing(id, false).await
    }

    #[tracing::instrument(skip_all, err, name = "SQL:LockListing")]
    async fn lock_listing(&mut self, id: Uuid) -> StoreResult<Option<Listing>> {
        self.fetch_listing(id, true).await
    }

    #[tracing::instrument(skip_all, err, name = "SQL:UpdateListing")]
    async fn update_listing(&mut self, listing: &Listing) -> StoreResult<()> {
        sqlx::query(
            "UPDATE listings SET status = $2, buyer_id = $3, updated_at = $4 WHERE id = $1",
        )
        .bind(listing.id)
        .bind(listing.status)
        .bind(&listing.buyer_id)
        .bind(listing.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(conflict_aware)?;
        Ok(())
    }

    #[tracing::instrument(skip_all, err, name = "SQL:LockActiveListingForTicket")]
    async fn lock_active_listing_for_ticket(
        &mut self,
        ticket_id: Uuid,
    ) -> StoreResult<Option<Listing>> {
        let sql = format!(
            "SELECT {LISTING_COLUMNS} FROM listings \
             WHERE ticket_id = $1 AND status = 'active' FOR UPDATE"
        );
        Ok(sqlx::query_as(&sql)
            .bind(ticket_id)
            .fetch_optional(&mut *self.tx)
            .await?)
    }

    #[tracing::instrument(skip_all, err, name = "SQL:ActiveListingsForTier")]
    async fn active_listings_for_tier(
        &mut self,
        tier_id: Uuid,
        now: OffsetDateTime,
        limit: i64,
    ) -> StoreResult<Vec<Listing>> {
        let sql = "SELECT l.id, l.ticket_id, l.seller_id, l.price, l.status, l.expires_at, \
                   l.buyer_id, l.created_at, l.updated_at \
                   FROM listings l JOIN tickets t ON t.id = l.ticket_id \
                   WHERE t.tier_id = $1 AND l.status = 'active' AND l.expires_at > $2 \
                   ORDER BY l.price, l.created_at LIMIT $3";
        Ok(sqlx::query_as(sql)
            .bind(tier_id)
            .bind(now)
            .bind(limit)
            .fetch_all(&mut *self.tx)
            .await?)
    }

    #[tracing::instrument(skip_all, err, name = "SQL:ExpirableListings")]
    async fn expirable_listings(
        &mut self,
        now: OffsetDateTime,
        limit: i64,
    ) -> StoreResult<Vec<Uuid>> {
        let ids: Vec<(Uuid,)> = sqlx::query_as(
            "SELECT id FROM listings WHERE status = 'active' AND expires_at <= $1 \
             ORDER BY expires_at LIMIT $2",
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(ids.into_iter().map(|(id,)| id).collect())
    }

    #[tracing::instrument(skip_all, err, name = "SQL:InsertTransfer")]
    async fn insert_transfer(
        &mut self,
        transfer: &TransferRecord,
        allocations: &[RoyaltyAllocation],
    ) -> StoreResult<()> {
        let sql = format!(
            "INSERT INTO transfers ({TRANSFER_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"
        );
        sqlx::query(&sql)
            .bind(transfer.id)
            .bind(transfer.ticket_id)
            .bind(transfer.kind)
            .bind(&transfer.from_owner_id)
            .bind(&transfer.to_owner_id)
            .bind(transfer.price)
            .bind(transfer.royalty_amount)
            .bind(transfer.listing_id)
            .bind(transfer.created_at)
            .execute(&mut *self.tx)
            .await
            .map_err(conflict_aware)?;

        if allocations.is_empty() {
            return Ok(());
        }
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO royalty_allocations (transfer_id, beneficiary, amount) ",
        );
        builder.push_values(allocations, |mut b, allocation| {
            b.push_bind(transfer.id)
                .push_bind(allocation.beneficiary)
                .push_bind(allocation.amount);
        });
        builder
            .build()
            .execute(&mut *self.tx)
            .await
            .map_err(conflict_aware)?;
        Ok(())
    }

    #[tracing::instrument(skip_all, err, name = "SQL:TransfersForTicket")]
    async fn transfers_for_ticket(&mut self, ticket_id: Uuid) -> StoreResult<Vec<TransferRecord>> {
        let sql = format!(
            "SELECT {TRANSFER_COLUMNS} FROM transfers WHERE ticket_id = $1 ORDER BY created_at"
        );
        Ok(sqlx::query_as(&sql)
            .bind(ticket_id)
            .fetch_all(&mut *self.tx)
            .await?)
    }

    #[tracing::instrument(skip_all, err, name = "SQL:InsertCheckIn")]
    async fn insert_check_in(&mut self, record: &CheckInRecord) -> StoreResult<()> {
        let sql =
            format!("INSERT INTO check_ins ({CHECK_IN_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6)");
        sqlx::query(&sql)
            .bind(record.id)
            .bind(record.ticket_id)
            .bind(&record.scanner_id)
            .bind(record.method)
            .bind(record.outcome)
            .bind(record.created_at)
            .execute(&mut *self.tx)
            .await
            .map_err(conflict_aware)?;
        Ok(())
    }

    #[tracing::instrument(skip_all, err, name = "SQL:CheckInsForTicket")]
    async fn check_ins_for_ticket(&mut self, ticket_id: Uuid) -> StoreResult<Vec<CheckInRecord>> {
        let sql = format!(
            "SELECT {CHECK_IN_COLUMNS} FROM check_ins WHERE ticket_id = $1 ORDER BY created_at"
        );
        Ok(sqlx::query_as(&sql)
            .bind(ticket_id)
            .fetch_all(&mut *self.tx)
            .await?)
    }

    #[tracing::instrument(skip_all, err, name = "SQL:Commit")]
    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
