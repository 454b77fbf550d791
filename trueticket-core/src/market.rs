//! Resale Market: listing lifecycle, price-cap enforcement and ownership
//! transfer.
//!
//! Every path that touches both rows locks the ticket before the listing
//! (refund and admission included). When buy and cancel race, the first to
//! commit wins and the other sees a non-active listing.

use std::sync::Arc;

use kanau::processor::Processor;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::{ConfigStore, TicketingSettings};
use crate::entities::{
    Event, Listing, ListingStatus, ResalePolicy, RoyaltyAllocation, Ticket, TicketAction,
    TransferKind, TransferRecord,
};
use crate::error::{Resource, TicketingError, TicketingResult};
use crate::pricing::{self, RoyaltySplit};
use crate::store::{Store, StoreError, StoreTx};
use crate::tickets::lock_ticket;

/// Who is asking to cancel a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requester {
    Holder(String),
    Admin,
}

#[derive(Clone)]
pub struct ResaleMarket {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    settings: ConfigStore<TicketingSettings>,
    royalty_split: Arc<dyn RoyaltySplit>,
}

/// Event and effective resale policy for a ticket's tier.
async fn policy_for(tx: &mut dyn StoreTx, ticket: &Ticket) -> TicketingResult<(Event, ResalePolicy)> {
    let tier = tx
        .get_tier(ticket.tier_id)
        .await?
        .ok_or(TicketingError::NotFound(Resource::Tier))?;
    let event = tx
        .get_event(tier.event_id)
        .await?
        .ok_or(TicketingError::NotFound(Resource::Event))?;
    let policy = tier.resale_policy.unwrap_or(event.resale_policy);
    Ok((event, policy))
}

async fn clear_listed_flag(
    tx: &mut dyn StoreTx,
    ticket: &mut Ticket,
    now: OffsetDateTime,
) -> TicketingResult<()> {
    if ticket.listed {
        ticket.listed = false;
        ticket.updated_at = now;
        tx.update_ticket(ticket).await?;
    }
    Ok(())
}

impl ResaleMarket {
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        settings: ConfigStore<TicketingSettings>,
        royalty_split: Arc<dyn RoyaltySplit>,
    ) -> Self {
        Self {
            store,
            clock,
            settings,
            royalty_split,
        }
    }

    async fn lock_listing(tx: &mut dyn StoreTx, listing_id: Uuid) -> TicketingResult<Listing> {
        tx.lock_listing(listing_id)
            .await?
            .ok_or(TicketingError::NotFound(Resource::Listing))
    }

    /// Lock a listing and the ticket it sells, ticket row first.
    async fn lock_listing_and_ticket(
        tx: &mut dyn StoreTx,
        listing_id: Uuid,
    ) -> TicketingResult<(Listing, Ticket)> {
        // The ticket id of a listing never changes, so an unlocked read is enough.
        let ticket_id = tx
            .get_listing(listing_id)
            .await?
            .ok_or(TicketingError::NotFound(Resource::Listing))?
            .ticket_id;
        let ticket = lock_ticket(tx, ticket_id).await?;
        let listing = Self::lock_listing(tx, listing_id).await?;
        Ok((listing, ticket))
    }
}

#[derive(Debug, Clone)]
pub struct CreateListing {
    pub ticket_id: Uuid,
    pub seller_id: String,
    pub price: i64,
    /// Defaults to now plus the configured listing lifetime. Always clamped
    /// to the event start.
    pub expires_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone)]
pub struct BuyListing {
    pub listing_id: Uuid,
    pub buyer_id: String,
}

/// Everything a completed resale produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResaleReceipt {
    pub listing: Listing,
    pub ticket: Ticket,
    pub transfer: TransferRecord,
    pub royalty_allocations: Vec<RoyaltyAllocation>,
}

#[derive(Debug, Clone)]
pub struct CancelListing {
    pub listing_id: Uuid,
    pub requester: Requester,
}

/// Mark active listings past their expiry as `Expired`.
#[derive(Debug, Clone)]
pub struct ExpireListings {
    pub limit: i64,
}

#[derive(Debug, Clone)]
pub struct GiftTransfer {
    pub ticket_id: Uuid,
    pub from_owner_id: String,
    pub to_owner_id: String,
}

#[derive(Debug, Clone)]
pub struct GetListing {
    pub listing_id: Uuid,
}

/// Live listings for a tier, cheapest first.
#[derive(Debug, Clone)]
pub struct ListingsForTier {
    pub tier_id: Uuid,
    pub limit: i64,
}

#[derive(Debug, Clone)]
pub struct GetResaleCap {
    pub ticket_id: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResaleCap {
    pub ticket_id: Uuid,
    pub original_price: i64,
    pub max_price: i64,
    pub min_price: Option<i64>,
}

impl Processor<CreateListing> for ResaleMarket {
    type Output = Listing;
    type Error = TicketingError;

    #[tracing::instrument(skip_all, err, fields(ticket_id = %input.ticket_id, price = input.price))]
    async fn process(&self, input: CreateListing) -> Result<Listing, TicketingError> {
        if input.price < 0 {
            return Err(TicketingError::InvalidRequest(
                "price must not be negative".to_string(),
            ));
        }
        let settings = self.settings.snapshot().await;
        let now = self.clock.now();

        let mut tx = self.store.begin().await?;
        let mut ticket = lock_ticket(tx.as_mut(), input.ticket_id).await?;
        if ticket.owner_id != input.seller_id {
            return Err(TicketingError::NotTicketOwner(ticket.id));
        }
        ticket.ensure(TicketAction::Resale)?;
        if ticket.listed || tx.lock_active_listing_for_ticket(ticket.id).await?.is_some() {
            return Err(TicketingError::AlreadyListed(ticket.id));
        }

        let (event, policy) = policy_for(tx.as_mut(), &ticket).await?;
        if now >= event.starts_at {
            return Err(TicketingError::InvalidRequest(
                "resale is closed once the event has started".to_string(),
            ));
        }
        pricing::check_listing_price(&policy, ticket.original_price, input.price)?;

        let expires_at = input
            .expires_at
            .unwrap_or(now + settings.default_listing_ttl)
            .min(event.starts_at);
        if expires_at <= now {
            return Err(TicketingError::InvalidRequest(
                "listing expiry must be in the future".to_string(),
            ));
        }

        let listing = Listing {
            id: Uuid::now_v7(),
            ticket_id: ticket.id,
            seller_id: input.seller_id,
            price: input.price,
            status: ListingStatus::Active,
            expires_at,
            buyer_id: None,
            created_at: now,
            updated_at: now,
        };
        match tx.insert_listing(&listing).await {
            Err(StoreError::Conflict(_)) => return Err(TicketingError::AlreadyListed(ticket.id)),
            other => other?,
        }
        ticket.listed = true;
        ticket.updated_at = now;
        tx.update_ticket(&ticket).await?;
        tx.commit().await?;

        tracing::info!(listing_id = %listing.id, "Listing created");
        Ok(listing)
    }
}

impl Processor<BuyListing> for ResaleMarket {
    type Output = ResaleReceipt;
    type Error = TicketingError;

    #[tracing::instrument(skip_all, err, fields(listing_id = %input.listing_id))]
    async fn process(&self, input: BuyListing) -> Result<ResaleReceipt, TicketingError> {
        if input.buyer_id.trim().is_empty() {
            return Err(TicketingError::InvalidRequest("buyer id is empty".to_string()));
        }
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let (mut listing, mut ticket) =
            Self::lock_listing_and_ticket(tx.as_mut(), input.listing_id).await?;

        if listing.status != ListingStatus::Active {
            return Err(TicketingError::ListingNoLongerActive(listing.id));
        }
        if !listing.is_live_at(now) {
            listing.status = ListingStatus::Expired;
            listing.updated_at = now;
            tx.update_listing(&listing).await?;
            clear_listed_flag(tx.as_mut(), &mut ticket, now).await?;
            tx.commit().await?;
            return Err(TicketingError::ListingNoLongerActive(listing.id));
        }
        if listing.seller_id == input.buyer_id {
            return Err(TicketingError::SelfPurchaseNotAllowed);
        }

        if ticket.owner_id != listing.seller_id {
            tracing::error!(
                listing_id = %listing.id,
                ticket_id = %ticket.id,
                "Active listing does not belong to the ticket holder"
            );
            return Err(TicketingError::ListingNoLongerActive(listing.id));
        }
        let (event, _) = policy_for(tx.as_mut(), &ticket).await?;

        let royalty_amount = pricing::royalty_total(listing.price, event.royalty_bps);
        let royalty_allocations = self.royalty_split.allocate(royalty_amount);

        let from_owner_id = ticket.owner_id.clone();
        ticket.reassign(&input.buyer_id, now)?;
        listing.status = ListingStatus::Sold;
        listing.buyer_id = Some(input.buyer_id.clone());
        listing.updated_at = now;

        let transfer = TransferRecord {
            id: Uuid::now_v7(),
            ticket_id: ticket.id,
            kind: TransferKind::Resale,
            from_owner_id,
            to_owner_id: input.buyer_id,
            price: Some(listing.price),
            royalty_amount,
            listing_id: Some(listing.id),
            created_at: now,
        };
        tx.update_listing(&listing).await?;
        tx.update_ticket(&ticket).await?;
        tx.insert_transfer(&transfer, &royalty_allocations).await?;
        tx.commit().await?;

        tracing::info!(
            listing_id = %listing.id,
            ticket_id = %ticket.id,
            price = listing.price,
            royalty = royalty_amount,
            "Resale completed"
        );
        Ok(ResaleReceipt {
            listing,
            ticket,
            transfer,
            royalty_allocations,
        })
    }
}

impl Processor<CancelListing> for ResaleMarket {
    type Output = Listing;
    type Error = TicketingError;

    async fn process(&self, input: CancelListing) -> Result<Listing, TicketingError> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let (mut listing, mut ticket) =
            Self::lock_listing_and_ticket(tx.as_mut(), input.listing_id).await?;
        if let Requester::Holder(requester) = &input.requester {
            if *requester != listing.seller_id {
                return Err(TicketingError::NotListingSeller(listing.id));
            }
        }
        if listing.status != ListingStatus::Active {
            return Err(TicketingError::ListingNoLongerActive(listing.id));
        }

        listing.status = ListingStatus::Cancelled;
        listing.updated_at = now;
        tx.update_listing(&listing).await?;
        clear_listed_flag(tx.as_mut(), &mut ticket, now).await?;
        tx.commit().await?;

        tracing::info!(listing_id = %listing.id, by = ?input.requester, "Listing cancelled");
        Ok(listing)
    }
}

impl Processor<ExpireListings> for ResaleMarket {
    type Output = Vec<Uuid>;
    type Error = TicketingError;

    async fn process(&self, input: ExpireListings) -> Result<Vec<Uuid>, TicketingError> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let mut expired = Vec::new();
        for listing_id in tx.expirable_listings(now, input.limit).await? {
            let (mut listing, mut ticket) =
                Self::lock_listing_and_ticket(tx.as_mut(), listing_id).await?;
            if listing.status != ListingStatus::Active || listing.is_live_at(now) {
                continue;
            }
            listing.status = ListingStatus::Expired;
            listing.updated_at = now;
            tx.update_listing(&listing).await?;
            clear_listed_flag(tx.as_mut(), &mut ticket, now).await?;
            expired.push(listing.id);
        }
        tx.commit().await?;

        if !expired.is_empty() {
            tracing::info!(count = expired.len(), "Expired listings");
        }
        Ok(expired)
    }
}

impl Processor<GiftTransfer> for ResaleMarket {
    type Output = TransferRecord;
    type Error = TicketingError;

    #[tracing::instrument(skip_all, err, fields(ticket_id = %input.ticket_id))]
    async fn process(&self, input: GiftTransfer) -> Result<TransferRecord, TicketingError> {
        if input.to_owner_id.trim().is_empty() {
            return Err(TicketingError::InvalidRequest(
                "recipient id is empty".to_string(),
            ));
        }
        if input.to_owner_id == input.from_owner_id {
            return Err(TicketingError::InvalidRequest(
                "cannot transfer a ticket to its current holder".to_string(),
            ));
        }
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let mut ticket = lock_ticket(tx.as_mut(), input.ticket_id).await?;
        if ticket.owner_id != input.from_owner_id {
            return Err(TicketingError::NotTicketOwner(ticket.id));
        }
        ticket.ensure(TicketAction::Transfer)?;
        if ticket.listed {
            return Err(TicketingError::AlreadyListed(ticket.id));
        }

        ticket.reassign(&input.to_owner_id, now)?;
        let transfer = TransferRecord {
            id: Uuid::now_v7(),
            ticket_id: ticket.id,
            kind: TransferKind::Gift,
            from_owner_id: input.from_owner_id,
            to_owner_id: input.to_owner_id,
            price: None,
            royalty_amount: 0,
            listing_id: None,
            created_at: now,
        };
        tx.update_ticket(&ticket).await?;
        tx.insert_transfer(&transfer, &[]).await?;
        tx.commit().await?;

        tracing::info!(transfer_id = %transfer.id, "Ticket gifted");
        Ok(transfer)
    }
}

impl Processor<GetListing> for ResaleMarket {
    type Output = Listing;
    type Error = TicketingError;

    async fn process(&self, input: GetListing) -> Result<Listing, TicketingError> {
        let mut tx = self.store.begin().await?;
        tx.get_listing(input.listing_id)
            .await?
            .ok_or(TicketingError::NotFound(Resource::Listing))
    }
}

impl Processor<ListingsForTier> for ResaleMarket {
    type Output = Vec<Listing>;
    type Error = TicketingError;

    async fn process(&self, input: ListingsForTier) -> Result<Vec<Listing>, TicketingError> {
        let mut tx = self.store.begin().await?;
        if tx.get_tier(input.tier_id).await?.is_none() {
            return Err(TicketingError::NotFound(Resource::Tier));
        }
        Ok(tx
            .active_listings_for_tier(input.tier_id, self.clock.now(), input.limit)
            .await?)
    }
}

impl Processor<GetResaleCap> for ResaleMarket {
    type Output = ResaleCap;
    type Error = TicketingError;

    async fn process(&self, input: GetResaleCap) -> Result<ResaleCap, TicketingError> {
        let mut tx = self.store.begin().await?;
        let ticket = tx
            .get_ticket(input.ticket_id)
            .await?
            .ok_or(TicketingError::NotFound(Resource::Ticket))?;
        let (_, policy) = policy_for(tx.as_mut(), &ticket).await?;
        Ok(ResaleCap {
            ticket_id: ticket.id,
            original_price: ticket.original_price,
            max_price: pricing::compute_max_resale_price(policy.cap, ticket.original_price),
            min_price: policy.min_resale_price,
        })
    }
}

#[cfg(test)]
mod tests {
    use kanau::processor::Processor;
    use time::Duration;

    use super::*;
    use crate::entities::{Beneficiary, PriceCapPolicy, TicketStatus};
    use crate::test_support::{Fixture, settled_ticket};
    use crate::tickets::GetTransferHistory;

    fn listing(ticket: &Ticket, price: i64) -> CreateListing {
        CreateListing {
            ticket_id: ticket.id,
            seller_id: ticket.owner_id.clone(),
            price,
            expires_at: None,
        }
    }

    #[tokio::test]
    async fn test_listing_price_cap_boundary() {
        let fx = Fixture::new().await;
        let tier = fx.tier(10, None, 10_000).await;
        let ticket = settled_ticket(&fx, &tier, "alice").await;

        let err = fx
            .engine
            .market
            .process(listing(&ticket, 12_001))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TicketingError::PriceCapExceeded {
                price: 12_001,
                max_price: 12_000
            }
        ));
        assert!(!fx.ticket(ticket.id).await.listed);

        let created = fx
            .engine
            .market
            .process(listing(&ticket, 12_000))
            .await
            .unwrap();
        assert_eq!(created.status, ListingStatus::Active);
        assert!(fx.ticket(ticket.id).await.listed);
    }

    #[tokio::test]
    async fn test_tier_policy_overrides_event() {
        let fx = Fixture::new().await;
        let tier = fx
            .tier_with_policy(
                10,
                None,
                10_000,
                Some(ResalePolicy {
                    cap: PriceCapPolicy::FaceValueOnly,
                    min_resale_price: Some(5_000),
                }),
            )
            .await;
        let ticket = settled_ticket(&fx, &tier, "alice").await;

        let cap = fx
            .engine
            .market
            .process(GetResaleCap {
                ticket_id: ticket.id,
            })
            .await
            .unwrap();
        assert_eq!(cap.max_price, 10_000);
        assert_eq!(cap.min_price, Some(5_000));

        let err = fx
            .engine
            .market
            .process(listing(&ticket, 4_999))
            .await
            .unwrap_err();
        assert!(matches!(err, TicketingError::BelowMinimumPrice { .. }));
    }

    #[tokio::test]
    async fn test_second_listing_rejected() {
        let fx = Fixture::new().await;
        let tier = fx.tier(10, None, 10_000).await;
        let ticket = settled_ticket(&fx, &tier, "alice").await;

        fx.engine
            .market
            .process(listing(&ticket, 10_000))
            .await
            .unwrap();
        let err = fx
            .engine
            .market
            .process(listing(&ticket, 9_000))
            .await
            .unwrap_err();
        assert!(matches!(err, TicketingError::AlreadyListed(_)));
    }

    #[tokio::test]
    async fn test_only_owner_may_list() {
        let fx = Fixture::new().await;
        let tier = fx.tier(10, None, 10_000).await;
        let ticket = settled_ticket(&fx, &tier, "alice").await;

        let err = fx
            .engine
            .market
            .process(CreateListing {
                ticket_id: ticket.id,
                seller_id: "mallory".to_string(),
                price: 10_000,
                expires_at: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, TicketingError::NotTicketOwner(_)));
    }

    #[tokio::test]
    async fn test_buy_transfers_ownership_and_pays_royalty() {
        let fx = Fixture::new().await;
        let tier = fx.tier(10, None, 10_000).await;
        let ticket = settled_ticket(&fx, &tier, "alice").await;
        let created = fx
            .engine
            .market
            .process(listing(&ticket, 12_000))
            .await
            .unwrap();

        let receipt = fx
            .engine
            .market
            .process(BuyListing {
                listing_id: created.id,
                buyer_id: "bob".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(receipt.listing.status, ListingStatus::Sold);
        assert_eq!(receipt.listing.buyer_id.as_deref(), Some("bob"));
        assert_eq!(receipt.ticket.owner_id, "bob");
        assert_eq!(receipt.ticket.status, TicketStatus::Valid);
        assert!(!receipt.ticket.listed);
        assert_eq!(receipt.ticket.transfer_count, 1);
        assert_ne!(receipt.ticket.check_in_secret_ref, ticket.check_in_secret_ref);
        assert_eq!(receipt.transfer.royalty_amount, 1_200);
        assert_eq!(
            receipt.royalty_allocations,
            vec![RoyaltyAllocation {
                beneficiary: Beneficiary::Host,
                amount: 1_200,
            }]
        );

        let history = fx
            .engine
            .tickets
            .process(GetTransferHistory {
                ticket_id: ticket.id,
            })
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].from_owner_id, "alice");
        assert_eq!(history[0].to_owner_id, "bob");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_buyers_single_winner() {
        let fx = Fixture::new().await;
        let tier = fx.tier(10, None, 10_000).await;
        let ticket = settled_ticket(&fx, &tier, "alice").await;
        let created = fx
            .engine
            .market
            .process(listing(&ticket, 11_000))
            .await
            .unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let market = fx.engine.market.clone();
                let listing_id = created.id;
                tokio::spawn(async move {
                    market
                        .process(BuyListing {
                            listing_id,
                            buyer_id: format!("buyer-{i}"),
                        })
                        .await
                })
            })
            .collect();

        let mut winners = Vec::new();
        for handle in handles {
            match handle.await.unwrap() {
                Ok(receipt) => winners.push(receipt.ticket.owner_id),
                Err(TicketingError::ListingNoLongerActive(_)) => {}
                Err(e) => panic!("unexpected error {e}"),
            }
        }
        assert_eq!(winners.len(), 1);
        assert_eq!(fx.ticket(ticket.id).await.owner_id, winners[0]);
    }

    #[tokio::test]
    async fn test_self_purchase_rejected() {
        let fx = Fixture::new().await;
        let tier = fx.tier(10, None, 10_000).await;
        let ticket = settled_ticket(&fx, &tier, "alice").await;
        let created = fx
            .engine
            .market
            .process(listing(&ticket, 10_000))
            .await
            .unwrap();

        let err = fx
            .engine
            .market
            .process(BuyListing {
                listing_id: created.id,
                buyer_id: "alice".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, TicketingError::SelfPurchaseNotAllowed));
    }

    #[tokio::test]
    async fn test_cancelled_listing_cannot_be_bought() {
        let fx = Fixture::new().await;
        let tier = fx.tier(10, None, 10_000).await;
        let ticket = settled_ticket(&fx, &tier, "alice").await;
        let created = fx
            .engine
            .market
            .process(listing(&ticket, 10_000))
            .await
            .unwrap();

        let err = fx
            .engine
            .market
            .process(CancelListing {
                listing_id: created.id,
                requester: Requester::Holder("bob".to_string()),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, TicketingError::NotListingSeller(_)));

        let cancelled = fx
            .engine
            .market
            .process(CancelListing {
                listing_id: created.id,
                requester: Requester::Holder("alice".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(cancelled.status, ListingStatus::Cancelled);
        assert!(!fx.ticket(ticket.id).await.listed);

        let err = fx
            .engine
            .market
            .process(BuyListing {
                listing_id: created.id,
                buyer_id: "bob".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, TicketingError::ListingNoLongerActive(_)));
        assert_eq!(fx.ticket(ticket.id).await.owner_id, "alice");
    }

    #[tokio::test]
    async fn test_expired_listing_is_inert() {
        let fx = Fixture::new().await;
        let tier = fx.tier(10, None, 10_000).await;
        let ticket = settled_ticket(&fx, &tier, "alice").await;
        let created = fx
            .engine
            .market
            .process(CreateListing {
                expires_at: Some(fx.clock.now() + Duration::hours(1)),
                ..listing(&ticket, 10_000)
            })
            .await
            .unwrap();

        fx.clock.advance(Duration::hours(2));
        let err = fx
            .engine
            .market
            .process(BuyListing {
                listing_id: created.id,
                buyer_id: "bob".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, TicketingError::ListingNoLongerActive(_)));

        let stored = fx
            .engine
            .market
            .process(GetListing {
                listing_id: created.id,
            })
            .await
            .unwrap();
        assert_eq!(stored.status, ListingStatus::Expired);
        let ticket = fx.ticket(ticket.id).await;
        assert_eq!(ticket.owner_id, "alice");
        assert!(!ticket.listed);
    }

    #[tokio::test]
    async fn test_expire_listings_sweep() {
        let fx = Fixture::new().await;
        let tier = fx.tier(10, None, 10_000).await;
        let ticket = settled_ticket(&fx, &tier, "alice").await;
        let created = fx
            .engine
            .market
            .process(CreateListing {
                expires_at: Some(fx.clock.now() + Duration::minutes(5)),
                ..listing(&ticket, 10_000)
            })
            .await
            .unwrap();

        let none = fx
            .engine
            .market
            .process(ExpireListings { limit: 10 })
            .await
            .unwrap();
        assert!(none.is_empty());

        fx.clock.advance(Duration::minutes(6));
        let expired = fx
            .engine
            .market
            .process(ExpireListings { limit: 10 })
            .await
            .unwrap();
        assert_eq!(expired, vec![created.id]);
        assert!(!fx.ticket(ticket.id).await.listed);
    }

    #[tokio::test]
    async fn test_listing_expiry_clamped_to_event_start() {
        let fx = Fixture::new().await;
        let tier = fx.tier(10, None, 10_000).await;
        let ticket = settled_ticket(&fx, &tier, "alice").await;

        let created = fx
            .engine
            .market
            .process(CreateListing {
                expires_at: Some(fx.event.starts_at + Duration::days(3)),
                ..listing(&ticket, 10_000)
            })
            .await
            .unwrap();
        assert_eq!(created.expires_at, fx.event.starts_at);
    }

    #[tokio::test]
    async fn test_gift_rotates_secret() {
        let fx = Fixture::new().await;
        let tier = fx.tier(10, None, 10_000).await;
        let ticket = settled_ticket(&fx, &tier, "alice").await;

        let transfer = fx
            .engine
            .market
            .process(GiftTransfer {
                ticket_id: ticket.id,
                from_owner_id: "alice".to_string(),
                to_owner_id: "carol".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(transfer.kind, TransferKind::Gift);
        assert_eq!(transfer.price, None);

        let gifted = fx.ticket(ticket.id).await;
        assert_eq!(gifted.owner_id, "carol");
        assert_ne!(gifted.check_in_secret_ref, ticket.check_in_secret_ref);

        let err = fx
            .engine
            .market
            .process(GiftTransfer {
                ticket_id: ticket.id,
                from_owner_id: "alice".to_string(),
                to_owner_id: "dave".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, TicketingError::NotTicketOwner(_)));
    }

    #[tokio::test]
    async fn test_listings_for_tier_cheapest_first() {
        let fx = Fixture::new().await;
        let tier = fx.tier(10, None, 10_000).await;
        let first = settled_ticket(&fx, &tier, "alice").await;
        let second = settled_ticket(&fx, &tier, "bob").await;
        fx.engine
            .market
            .process(listing(&first, 11_000))
            .await
            .unwrap();
        fx.engine
            .market
            .process(listing(&second, 9_000))
            .await
            .unwrap();

        let live = fx
            .engine
            .market
            .process(ListingsForTier {
                tier_id: tier.id,
                limit: 10,
            })
            .await
            .unwrap();
        let prices: Vec<i64> = live.iter().map(|l| l.price).collect();
        assert_eq!(prices, vec![9_000, 11_000]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_listing_attempts_single_listing() {
        let fx = Fixture::new().await;
        let tier = fx.tier(10, None, 10_000).await;
        let ticket = settled_ticket(&fx, &tier, "alice").await;

        let handles: Vec<_> = (0..6)
            .map(|i| {
                let market = fx.engine.market.clone();
                let request = listing(&ticket, 10_000 + i * 100);
                tokio::spawn(async move { market.process(request).await })
            })
            .collect();

        let mut created = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => created += 1,
                Err(TicketingError::AlreadyListed(_)) => {}
                Err(e) => panic!("unexpected error {e}"),
            }
        }
        assert_eq!(created, 1);

        let live = fx
            .engine
            .market
            .process(ListingsForTier {
                tier_id: tier.id,
                limit: 10,
            })
            .await
            .unwrap();
        assert_eq!(live.len(), 1);
        assert!(fx.ticket(ticket.id).await.listed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_cancel_and_buy_race_first_commit_wins() {
        let fx = Fixture::new().await;
        let tier = fx.tier(10, None, 10_000).await;

        for _ in 0..5 {
            let ticket = settled_ticket(&fx, &tier, "alice").await;
            let created = fx
                .engine
                .market
                .process(listing(&ticket, 10_500))
                .await
                .unwrap();
            let listing_id = created.id;

            let market = fx.engine.market.clone();
            let cancel = tokio::spawn(async move {
                market
                    .process(CancelListing {
                        listing_id,
                        requester: Requester::Holder("alice".to_string()),
                    })
                    .await
            });
            let market = fx.engine.market.clone();
            let buy = tokio::spawn(async move {
                market
                    .process(BuyListing {
                        listing_id,
                        buyer_id: "bob".to_string(),
                    })
                    .await
            });
            let cancelled = cancel.await.unwrap();
            let bought = buy.await.unwrap();

            let stored = fx
                .engine
                .market
                .process(GetListing { listing_id })
                .await
                .unwrap();
            let ticket = fx.ticket(ticket.id).await;
            assert!(!ticket.listed);
            match (cancelled, bought) {
                (Ok(_), Err(TicketingError::ListingNoLongerActive(_))) => {
                    assert_eq!(stored.status, ListingStatus::Cancelled);
                    assert_eq!(ticket.owner_id, "alice");
                }
                (Err(TicketingError::ListingNoLongerActive(_)), Ok(receipt)) => {
                    assert_eq!(stored.status, ListingStatus::Sold);
                    assert_eq!(receipt.ticket.owner_id, "bob");
                    assert_eq!(ticket.owner_id, "bob");
                }
                other => panic!("expected exactly one winner, got {other:?}"),
            }
        }
    }
}
