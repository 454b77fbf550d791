//! Purchase Reconciler.
//!
//! A purchase is created `Pending` with its inventory reserved, and is then
//! finalized exactly once by whichever settlement signal arrives first.
//! Every entry point locks the purchase row and checks its status before
//! mutating, which makes redelivered callbacks harmless.

use std::collections::BTreeMap;
use std::sync::Arc;

use kanau::processor::Processor;
use time::OffsetDateTime;
use trueticket_sdk::objects::{PaymentCallback, PaymentInitiation, PurchaseItemRequest};
use uuid::Uuid;

use crate::capacity;
use crate::clock::Clock;
use crate::collaborators::PaymentGateway;
use crate::config::{ConfigStore, TicketingSettings};
use crate::entities::{
    FailureReason, ListingStatus, Purchase, PurchaseItem, PurchaseItems, PurchaseRefund,
    PurchaseStatus, Ticket, TicketAction, TicketStatus, ticket::new_secret_ref,
};
use crate::error::{Resource, TicketingError, TicketingResult};
use crate::events::{EventSenders, LedgerEvent};
use crate::store::{Store, StoreTx};

/// How a caller names a purchase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurchaseRef {
    Id(Uuid),
    Correlation(String),
}

impl std::fmt::Display for PurchaseRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PurchaseRef::Id(id) => write!(f, "{id}"),
            PurchaseRef::Correlation(correlation_id) => write!(f, "{correlation_id}"),
        }
    }
}

async fn lock_purchase(tx: &mut dyn StoreTx, purchase: &PurchaseRef) -> TicketingResult<Purchase> {
    let found = match purchase {
        PurchaseRef::Id(id) => tx.lock_purchase(*id).await?,
        PurchaseRef::Correlation(correlation_id) => {
            tx.lock_purchase_by_correlation(correlation_id).await?
        }
    };
    found.ok_or(TicketingError::NotFound(Resource::Purchase))
}

fn new_correlation_id() -> String {
    format!("tt_{}", Uuid::new_v4().simple())
}

#[derive(Clone)]
pub struct PurchaseReconciler {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    settings: ConfigStore<TicketingSettings>,
    events: EventSenders,
    gateway: Arc<dyn PaymentGateway>,
}

impl PurchaseReconciler {
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        settings: ConfigStore<TicketingSettings>,
        events: EventSenders,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        Self {
            store,
            clock,
            settings,
            events,
            gateway,
        }
    }

    /// Release the reservation and move a pending purchase to `Failed`.
    async fn terminate(
        &self,
        purchase: PurchaseRef,
        reason: FailureReason,
    ) -> TicketingResult<Purchase> {
        let mut tx = self.store.begin().await?;
        let mut purchase = lock_purchase(tx.as_mut(), &purchase).await?;
        if purchase.status != PurchaseStatus::Pending {
            return Err(TicketingError::AlreadyFinalized(purchase.id));
        }

        for item in &purchase.items {
            capacity::release(tx.as_mut(), item.tier_id, item.quantity).await?;
        }
        let now = self.clock.now();
        purchase.status = PurchaseStatus::Failed;
        purchase.failure_reason = Some(reason);
        purchase.updated_at = now;
        purchase.finalized_at = Some(now);
        tx.update_purchase(&purchase).await?;
        tx.commit().await?;

        tracing::info!(
            purchase_id = %purchase.id,
            reason = ?reason,
            "Purchase failed, reservation released"
        );
        Ok(purchase)
    }
}

/// Reserve every item and open a pending purchase.
#[derive(Debug, Clone)]
pub struct BeginPurchase {
    pub buyer_id: String,
    pub items: Vec<PurchaseItemRequest>,
}

/// What the payment collaborator needs to collect for a new purchase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseHandle {
    pub purchase_id: Uuid,
    pub correlation_id: String,
    pub amount: i64,
    pub currency: String,
    /// When the sweeper will give up on the reservation.
    pub reserved_until: OffsetDateTime,
}

/// [`BeginPurchase`] followed by payment initiation.
#[derive(Debug, Clone)]
pub struct StartCheckout {
    pub buyer_id: String,
    pub items: Vec<PurchaseItemRequest>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutStarted {
    pub handle: PurchaseHandle,
    pub redirect_target: String,
}

#[derive(Debug, Clone)]
pub struct FinalizePurchase {
    pub correlation_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalizeOutcome {
    /// This call settled the purchase and created its tickets.
    Completed { purchase: Purchase },
    /// An earlier call already did; nothing changed.
    AlreadyCompleted { purchase: Purchase },
}

impl FinalizeOutcome {
    pub fn purchase(&self) -> &Purchase {
        match self {
            FinalizeOutcome::Completed { purchase }
            | FinalizeOutcome::AlreadyCompleted { purchase } => purchase,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExpirePurchase {
    pub purchase: PurchaseRef,
}

#[derive(Debug, Clone)]
pub struct FailPurchase {
    pub purchase: PurchaseRef,
    pub reason: FailureReason,
}

#[derive(Debug, Clone)]
pub struct RefundPurchase {
    pub purchase: PurchaseRef,
    pub amount: i64,
    /// Collaborator's refund reference; repeats are no-ops.
    pub refund_ref: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefundOutcome {
    Applied {
        purchase: Purchase,
        revoked_ticket_ids: Vec<Uuid>,
    },
    Duplicate {
        purchase: Purchase,
    },
}

impl RefundOutcome {
    pub fn purchase(&self) -> &Purchase {
        match self {
            RefundOutcome::Applied { purchase, .. } | RefundOutcome::Duplicate { purchase } => {
                purchase
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct GetPurchase {
    pub purchase_id: Uuid,
}

/// Result of dispatching a payment callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    Finalized(FinalizeOutcome),
    Failed(Purchase),
    Refunded(RefundOutcome),
    /// The purchase was already in a terminal state for this signal.
    AlreadyFinalized,
}

impl CallbackOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            CallbackOutcome::AlreadyFinalized => "already_finalized",
            _ => "processed",
        }
    }
}

impl Processor<BeginPurchase> for PurchaseReconciler {
    type Output = PurchaseHandle;
    type Error = TicketingError;

    #[tracing::instrument(skip_all, err, fields(buyer_id = %input.buyer_id))]
    async fn process(&self, input: BeginPurchase) -> Result<PurchaseHandle, TicketingError> {
        if input.buyer_id.trim().is_empty() {
            return Err(TicketingError::InvalidRequest("buyer id is empty".to_string()));
        }
        if input.items.is_empty() {
            return Err(TicketingError::InvalidRequest(
                "purchase has no items".to_string(),
            ));
        }
        // Ascending tier order is the lock order for multi-tier reservations.
        let mut merged: BTreeMap<Uuid, i32> = BTreeMap::new();
        for item in &input.items {
            if item.quantity <= 0 {
                return Err(TicketingError::InvalidRequest(format!(
                    "quantity for tier {} must be positive",
                    item.tier_id
                )));
            }
            let entry = merged.entry(item.tier_id).or_insert(0);
            *entry = entry.checked_add(item.quantity).ok_or_else(|| {
                TicketingError::InvalidRequest("quantity out of range".to_string())
            })?;
        }

        let settings = self.settings.snapshot().await;
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;

        let mut items = PurchaseItems::new();
        let mut amount: i64 = 0;
        for (tier_id, quantity) in merged {
            let tier = capacity::reserve(tx.as_mut(), tier_id, quantity, &input.buyer_id).await?;
            amount = tier
                .price_face
                .checked_mul(i64::from(quantity))
                .and_then(|line| amount.checked_add(line))
                .ok_or_else(|| TicketingError::InvalidRequest("amount out of range".to_string()))?;
            items.push(PurchaseItem {
                tier_id,
                quantity,
                unit_price: tier.price_face,
            });
        }

        let purchase = Purchase {
            id: Uuid::now_v7(),
            correlation_id: new_correlation_id(),
            buyer_id: input.buyer_id,
            status: PurchaseStatus::Pending,
            failure_reason: None,
            currency: settings.currency,
            amount,
            refunded_amount: 0,
            items,
            ticket_ids: Vec::new(),
            created_at: now,
            updated_at: now,
            finalized_at: None,
        };
        tx.insert_purchase(&purchase).await?;
        tx.commit().await?;

        tracing::info!(
            purchase_id = %purchase.id,
            correlation_id = %purchase.correlation_id,
            amount = purchase.amount,
            "Purchase started"
        );
        Ok(PurchaseHandle {
            purchase_id: purchase.id,
            correlation_id: purchase.correlation_id,
            amount: purchase.amount,
            currency: purchase.currency,
            reserved_until: now + settings.reservation_ttl,
        })
    }
}

impl Processor<StartCheckout> for PurchaseReconciler {
    type Output = CheckoutStarted;
    type Error = TicketingError;

    async fn process(&self, input: StartCheckout) -> Result<CheckoutStarted, TicketingError> {
        let handle = self
            .process(BeginPurchase {
                buyer_id: input.buyer_id,
                items: input.items,
            })
            .await?;

        // The reservation is committed; the gateway call holds no lock.
        let initiation = PaymentInitiation {
            correlation_id: handle.correlation_id.clone(),
            amount: handle.amount,
            currency: handle.currency.clone(),
        };
        match self.gateway.initiate(initiation).await {
            Ok(redirect) => Ok(CheckoutStarted {
                handle,
                redirect_target: redirect.redirect_target,
            }),
            Err(e) => {
                tracing::warn!(
                    purchase_id = %handle.purchase_id,
                    error = %e,
                    "Payment initiation failed, releasing reservation"
                );
                match self
                    .terminate(PurchaseRef::Id(handle.purchase_id), FailureReason::PaymentUnavailable)
                    .await
                {
                    // A confirmation may have raced in; leave that purchase alone.
                    Ok(_) | Err(TicketingError::AlreadyFinalized(_)) => {}
                    Err(release_err) => {
                        tracing::error!(
                            purchase_id = %handle.purchase_id,
                            error = %release_err,
                            "Failed to release reservation after initiation failure"
                        );
                    }
                }
                Err(TicketingError::PaymentUnavailable(e.to_string()))
            }
        }
    }
}

impl Processor<FinalizePurchase> for PurchaseReconciler {
    type Output = FinalizeOutcome;
    type Error = TicketingError;

    #[tracing::instrument(skip_all, err, fields(correlation_id = %input.correlation_id))]
    async fn process(&self, input: FinalizePurchase) -> Result<FinalizeOutcome, TicketingError> {
        let settings = self.settings.snapshot().await;
        let mut tx = self.store.begin().await?;
        let mut purchase =
            lock_purchase(tx.as_mut(), &PurchaseRef::Correlation(input.correlation_id)).await?;

        match purchase.status {
            PurchaseStatus::Pending => {}
            status if status.is_settled() => {
                return Ok(FinalizeOutcome::AlreadyCompleted { purchase });
            }
            _ => {
                tracing::warn!(
                    purchase_id = %purchase.id,
                    reason = ?purchase.failure_reason,
                    "Payment confirmed for a failed purchase, a refund is required"
                );
                return Err(TicketingError::AlreadyFinalized(purchase.id));
            }
        }

        let now = self.clock.now();
        let mut tickets: Vec<Ticket> = Vec::new();
        for item in &purchase.items {
            let tier = capacity::commit(tx.as_mut(), item.tier_id, item.quantity).await?;
            for _ in 0..item.quantity {
                let mut ticket = Ticket {
                    id: Uuid::now_v7(),
                    tier_id: tier.id,
                    event_id: tier.event_id,
                    purchase_id: purchase.id,
                    owner_id: purchase.buyer_id.clone(),
                    status: TicketStatus::PendingSettlement,
                    original_price: item.unit_price,
                    check_in_secret_ref: new_secret_ref(),
                    external_token_ref: None,
                    listed: false,
                    transfer_count: 0,
                    mint_attempts: 0,
                    mint_last_tried_at: None,
                    created_at: now,
                    updated_at: now,
                };
                if !settings.require_external_mint {
                    ticket.apply(TicketAction::Settle, now)?;
                }
                tickets.push(ticket);
            }
        }
        tx.insert_tickets(&tickets).await?;

        purchase.status = PurchaseStatus::Completed;
        purchase.ticket_ids = tickets.iter().map(|t| t.id).collect();
        purchase.updated_at = now;
        purchase.finalized_at = Some(now);
        tx.update_purchase(&purchase).await?;
        tx.commit().await?;

        tracing::info!(
            purchase_id = %purchase.id,
            tickets = tickets.len(),
            "Purchase completed"
        );
        if settings.require_external_mint {
            for ticket in &tickets {
                self.events
                    .publish_ledger(LedgerEvent::MintRequested { ticket_id: ticket.id });
            }
        }
        Ok(FinalizeOutcome::Completed { purchase })
    }
}

impl Processor<ExpirePurchase> for PurchaseReconciler {
    type Output = Purchase;
    type Error = TicketingError;

    async fn process(&self, input: ExpirePurchase) -> Result<Purchase, TicketingError> {
        self.terminate(input.purchase, FailureReason::Expired).await
    }
}

impl Processor<FailPurchase> for PurchaseReconciler {
    type Output = Purchase;
    type Error = TicketingError;

    async fn process(&self, input: FailPurchase) -> Result<Purchase, TicketingError> {
        self.terminate(input.purchase, input.reason).await
    }
}

impl Processor<RefundPurchase> for PurchaseReconciler {
    type Output = RefundOutcome;
    type Error = TicketingError;

    #[tracing::instrument(skip_all, err, fields(purchase = %input.purchase, amount = input.amount))]
    async fn process(&self, input: RefundPurchase) -> Result<RefundOutcome, TicketingError> {
        if input.amount <= 0 {
            return Err(TicketingError::InvalidRequest(format!(
                "refund amount must be positive, got {}",
                input.amount
            )));
        }
        if input.refund_ref.trim().is_empty() {
            return Err(TicketingError::InvalidRequest(
                "refund reference is empty".to_string(),
            ));
        }

        let mut tx = self.store.begin().await?;
        let mut purchase = lock_purchase(tx.as_mut(), &input.purchase).await?;
        if !purchase.status.is_settled() {
            return Err(TicketingError::PurchaseNotSettled(purchase.id));
        }

        let now = self.clock.now();
        let recorded = tx
            .record_refund(&PurchaseRefund {
                purchase_id: purchase.id,
                refund_ref: input.refund_ref.clone(),
                amount: input.amount,
                created_at: now,
            })
            .await?;
        if !recorded {
            tracing::debug!(refund_ref = %input.refund_ref, "Duplicate refund ignored");
            return Ok(RefundOutcome::Duplicate { purchase });
        }

        let remaining = purchase.refundable();
        if input.amount > remaining {
            return Err(TicketingError::RefundExceedsTotal {
                requested: input.amount,
                remaining,
            });
        }

        purchase.refunded_amount += input.amount;
        purchase.updated_at = now;
        let mut revoked_ticket_ids = Vec::new();
        if purchase.refunded_amount == purchase.amount {
            purchase.status = PurchaseStatus::Refunded;
            for mut ticket in tx.lock_tickets_for_purchase(purchase.id).await? {
                if ticket.status.is_terminal() {
                    continue;
                }
                if ticket.listed {
                    if let Some(mut listing) = tx.lock_active_listing_for_ticket(ticket.id).await? {
                        listing.status = ListingStatus::Cancelled;
                        listing.updated_at = now;
                        tx.update_listing(&listing).await?;
                    }
                    ticket.listed = false;
                }
                ticket.apply(TicketAction::Revoke, now)?;
                tx.update_ticket(&ticket).await?;
                revoked_ticket_ids.push(ticket.id);
            }
        } else {
            purchase.status = PurchaseStatus::PartiallyRefunded;
        }
        tx.update_purchase(&purchase).await?;
        tx.commit().await?;

        tracing::info!(
            purchase_id = %purchase.id,
            refunded = purchase.refunded_amount,
            revoked = revoked_ticket_ids.len(),
            "Refund applied"
        );
        Ok(RefundOutcome::Applied {
            purchase,
            revoked_ticket_ids,
        })
    }
}

impl Processor<PaymentCallback> for PurchaseReconciler {
    type Output = CallbackOutcome;
    type Error = TicketingError;

    async fn process(&self, callback: PaymentCallback) -> Result<CallbackOutcome, TicketingError> {
        callback
            .validate()
            .map_err(|e| TicketingError::InvalidRequest(e.to_string()))?;
        tracing::debug!(callback = ?callback, "Dispatching payment callback");

        let result = match callback {
            PaymentCallback::Confirmed { correlation_id } => self
                .process(FinalizePurchase { correlation_id })
                .await
                .map(CallbackOutcome::Finalized),
            PaymentCallback::Expired { correlation_id } => self
                .terminate(PurchaseRef::Correlation(correlation_id), FailureReason::Expired)
                .await
                .map(CallbackOutcome::Failed),
            PaymentCallback::Failed {
                correlation_id,
                reason,
            } => {
                if let Some(reason) = &reason {
                    tracing::info!(correlation_id = %correlation_id, reason = %reason, "Payment failed");
                }
                self.terminate(
                    PurchaseRef::Correlation(correlation_id),
                    FailureReason::PaymentFailed,
                )
                .await
                .map(CallbackOutcome::Failed)
            }
            PaymentCallback::Refunded {
                correlation_id,
                refund_id,
                amount,
            } => self
                .process(RefundPurchase {
                    purchase: PurchaseRef::Correlation(correlation_id),
                    amount,
                    refund_ref: refund_id,
                })
                .await
                .map(CallbackOutcome::Refunded),
        };

        match result {
            Err(TicketingError::AlreadyFinalized(_)) => Ok(CallbackOutcome::AlreadyFinalized),
            other => other,
        }
    }
}

impl Processor<GetPurchase> for PurchaseReconciler {
    type Output = Purchase;
    type Error = TicketingError;

    async fn process(&self, input: GetPurchase) -> Result<Purchase, TicketingError> {
        let mut tx = self.store.begin().await?;
        tx.get_purchase(input.purchase_id)
            .await?
            .ok_or(TicketingError::NotFound(Resource::Purchase))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::market::{BuyListing, CreateListing, GetListing};
    use crate::test_support::{Fixture, settled_ticket};

    fn items(tier_id: Uuid, quantity: i32) -> Vec<PurchaseItemRequest> {
        vec![PurchaseItemRequest { tier_id, quantity }]
    }

    async fn begin(fx: &Fixture, tier_id: Uuid, quantity: i32) -> PurchaseHandle {
        fx.engine
            .purchases
            .process(BeginPurchase {
                buyer_id: "alice".to_string(),
                items: items(tier_id, quantity),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_begin_reserves_and_prices() {
        let fx = Fixture::new().await;
        let tier = fx.tier(10, None, 2_500).await;
        let handle = begin(&fx, tier.id, 3).await;

        assert_eq!(handle.amount, 7_500);
        assert_eq!(handle.currency, "USD");
        assert!(handle.correlation_id.starts_with("tt_"));
        let tier = fx.current_tier(tier.id).await;
        assert_eq!(tier.reserved_quantity, 3);
        assert_eq!(tier.sold_quantity, 0);
    }

    #[tokio::test]
    async fn test_finalize_twice_returns_same_tickets() {
        let fx = Fixture::new().await;
        let tier = fx.tier(10, None, 2_500).await;
        let handle = begin(&fx, tier.id, 2).await;

        let first = fx
            .engine
            .purchases
            .process(FinalizePurchase {
                correlation_id: handle.correlation_id.clone(),
            })
            .await
            .unwrap();
        let second = fx
            .engine
            .purchases
            .process(FinalizePurchase {
                correlation_id: handle.correlation_id.clone(),
            })
            .await
            .unwrap();

        assert!(matches!(first, FinalizeOutcome::Completed { .. }));
        assert!(matches!(second, FinalizeOutcome::AlreadyCompleted { .. }));
        assert_eq!(first.purchase().ticket_ids.len(), 2);
        assert_eq!(first.purchase().ticket_ids, second.purchase().ticket_ids);

        let tier = fx.current_tier(tier.id).await;
        assert_eq!(tier.sold_quantity, 2);
        assert_eq!(tier.reserved_quantity, 0);
        for id in &first.purchase().ticket_ids {
            assert_eq!(fx.ticket(*id).await.status, TicketStatus::Valid);
        }
    }

    #[tokio::test]
    async fn test_multi_tier_reservation_is_all_or_nothing() {
        let fx = Fixture::new().await;
        let roomy = fx.tier(10, None, 1_000).await;
        let tight = fx.tier(1, None, 1_000).await;

        let err = fx
            .engine
            .purchases
            .process(BeginPurchase {
                buyer_id: "alice".to_string(),
                items: vec![
                    PurchaseItemRequest {
                        tier_id: roomy.id,
                        quantity: 2,
                    },
                    PurchaseItemRequest {
                        tier_id: tight.id,
                        quantity: 2,
                    },
                ],
            })
            .await
            .unwrap_err();

        assert!(matches!(err, TicketingError::InsufficientInventory { .. }));
        assert_eq!(fx.current_tier(roomy.id).await.reserved_quantity, 0);
        assert_eq!(fx.current_tier(tight.id).await.reserved_quantity, 0);
    }

    #[tokio::test]
    async fn test_expire_releases_and_blocks_late_confirmation() {
        let fx = Fixture::new().await;
        let tier = fx.tier(5, None, 1_000).await;
        let handle = begin(&fx, tier.id, 2).await;

        let expired = fx
            .engine
            .purchases
            .process(ExpirePurchase {
                purchase: PurchaseRef::Id(handle.purchase_id),
            })
            .await
            .unwrap();
        assert_eq!(expired.status, PurchaseStatus::Failed);
        assert_eq!(expired.failure_reason, Some(FailureReason::Expired));
        assert_eq!(fx.current_tier(tier.id).await.reserved_quantity, 0);

        let late = fx
            .engine
            .purchases
            .process(PaymentCallback::Confirmed {
                correlation_id: handle.correlation_id,
            })
            .await
            .unwrap();
        assert_eq!(late, CallbackOutcome::AlreadyFinalized);
        assert_eq!(fx.current_tier(tier.id).await.sold_quantity, 0);
    }

    #[tokio::test]
    async fn test_failed_callback_redelivery_is_acknowledged() {
        let fx = Fixture::new().await;
        let tier = fx.tier(5, None, 1_000).await;
        let handle = begin(&fx, tier.id, 1).await;
        let callback = PaymentCallback::Failed {
            correlation_id: handle.correlation_id,
            reason: Some("card declined".to_string()),
        };

        let first = fx.engine.purchases.process(callback.clone()).await.unwrap();
        let again = fx.engine.purchases.process(callback).await.unwrap();

        match first {
            CallbackOutcome::Failed(purchase) => {
                assert_eq!(purchase.failure_reason, Some(FailureReason::PaymentFailed))
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(again, CallbackOutcome::AlreadyFinalized);
        assert_eq!(fx.current_tier(tier.id).await.reserved_quantity, 0);
    }

    #[tokio::test]
    async fn test_full_refund_revokes_tickets() {
        let fx = Fixture::new().await;
        let tier = fx.tier(5, None, 1_000).await;
        let ticket_ids = fx.buy(&tier, "alice", 2).await;
        let purchase_id = fx.ticket(ticket_ids[0]).await.purchase_id;

        let outcome = fx
            .engine
            .purchases
            .process(RefundPurchase {
                purchase: PurchaseRef::Id(purchase_id),
                amount: 2_000,
                refund_ref: "rf_1".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(outcome.purchase().status, PurchaseStatus::Refunded);
        match &outcome {
            RefundOutcome::Applied {
                revoked_ticket_ids, ..
            } => assert_eq!(revoked_ticket_ids.len(), 2),
            other => panic!("unexpected outcome {other:?}"),
        }
        for id in ticket_ids {
            assert_eq!(fx.ticket(id).await.status, TicketStatus::Revoked);
        }
        // Refunds never return inventory to sale.
        assert_eq!(fx.current_tier(tier.id).await.sold_quantity, 2);
    }

    #[tokio::test]
    async fn test_partial_refund_keeps_tickets_valid() {
        let fx = Fixture::new().await;
        let tier = fx.tier(5, None, 1_000).await;
        let ticket_ids = fx.buy(&tier, "alice", 2).await;
        let purchase_id = fx.ticket(ticket_ids[0]).await.purchase_id;

        let outcome = fx
            .engine
            .purchases
            .process(RefundPurchase {
                purchase: PurchaseRef::Id(purchase_id),
                amount: 500,
                refund_ref: "rf_1".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(outcome.purchase().status, PurchaseStatus::PartiallyRefunded);
        assert_eq!(outcome.purchase().refunded_amount, 500);
        for id in ticket_ids {
            assert_eq!(fx.ticket(id).await.status, TicketStatus::Valid);
        }
    }

    #[tokio::test]
    async fn test_refund_replay_and_overflow() {
        let fx = Fixture::new().await;
        let tier = fx.tier(5, None, 1_000).await;
        let ticket_ids = fx.buy(&tier, "alice", 1).await;
        let purchase_id = fx.ticket(ticket_ids[0]).await.purchase_id;
        let refund = |amount: i64, refund_ref: &str| RefundPurchase {
            purchase: PurchaseRef::Id(purchase_id),
            amount,
            refund_ref: refund_ref.to_string(),
        };

        fx.engine.purchases.process(refund(600, "rf_1")).await.unwrap();
        let replay = fx.engine.purchases.process(refund(600, "rf_1")).await.unwrap();
        assert!(matches!(replay, RefundOutcome::Duplicate { .. }));
        assert_eq!(replay.purchase().refunded_amount, 600);

        let err = fx
            .engine
            .purchases
            .process(refund(500, "rf_2"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TicketingError::RefundExceedsTotal {
                requested: 500,
                remaining: 400
            }
        ));

        // The rejected reference was not recorded and can be retried.
        let retried = fx.engine.purchases.process(refund(400, "rf_2")).await.unwrap();
        assert_eq!(retried.purchase().status, PurchaseStatus::Refunded);
    }

    #[tokio::test]
    async fn test_refund_requires_settled_purchase() {
        let fx = Fixture::new().await;
        let tier = fx.tier(5, None, 1_000).await;
        let handle = begin(&fx, tier.id, 1).await;

        let err = fx
            .engine
            .purchases
            .process(RefundPurchase {
                purchase: PurchaseRef::Id(handle.purchase_id),
                amount: 100,
                refund_ref: "rf_1".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, TicketingError::PurchaseNotSettled(_)));
    }

    #[tokio::test]
    async fn test_checkout_gateway_failure_releases_reservation() {
        let fx = Fixture::new().await;
        let tier = fx.tier(5, None, 1_000).await;
        fx.gateway.fail.store(true, Ordering::SeqCst);

        let err = fx
            .engine
            .purchases
            .process(StartCheckout {
                buyer_id: "alice".to_string(),
                items: items(tier.id, 2),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, TicketingError::PaymentUnavailable(_)));
        assert_eq!(fx.current_tier(tier.id).await.reserved_quantity, 0);
    }

    #[tokio::test]
    async fn test_checkout_returns_redirect() {
        let fx = Fixture::new().await;
        let tier = fx.tier(5, None, 1_000).await;

        let started = fx
            .engine
            .purchases
            .process(StartCheckout {
                buyer_id: "alice".to_string(),
                items: items(tier.id, 1),
            })
            .await
            .unwrap();
        assert_eq!(
            started.redirect_target,
            format!("https://pay.example/{}", started.handle.correlation_id)
        );
    }

    #[tokio::test]
    async fn test_external_mint_leaves_tickets_pending() {
        let fx = Fixture::with_external_mint().await;
        let tier = fx.tier(5, None, 1_000).await;
        let ticket_ids = fx.buy(&tier, "alice", 1).await;

        assert_eq!(
            fx.ticket(ticket_ids[0]).await.status,
            TicketStatus::PendingSettlement
        );
        let event = fx.ledger_rx.lock().await.recv().await.unwrap();
        assert_eq!(
            event,
            LedgerEvent::MintRequested {
                ticket_id: ticket_ids[0]
            }
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_full_refund_racing_resale() {
        let fx = Fixture::new().await;
        let tier = fx.tier(10, None, 1_000).await;

        for round in 0..5 {
            let ticket = settled_ticket(&fx, &tier, "alice").await;
            let listing = fx
                .engine
                .market
                .process(CreateListing {
                    ticket_id: ticket.id,
                    seller_id: "alice".to_string(),
                    price: 1_100,
                    expires_at: None,
                })
                .await
                .unwrap();
            let listing_id = listing.id;
            let purchase_id = ticket.purchase_id;

            let purchases = fx.engine.purchases.clone();
            let refund = tokio::spawn(async move {
                purchases
                    .process(RefundPurchase {
                        purchase: PurchaseRef::Id(purchase_id),
                        amount: 1_000,
                        refund_ref: format!("rf_{round}"),
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

            let refunded = refund.await.unwrap().unwrap();
            assert_eq!(refunded.purchase().status, PurchaseStatus::Refunded);
            match buy.await.unwrap() {
                Ok(receipt) => assert_eq!(receipt.ticket.owner_id, "bob"),
                Err(TicketingError::ListingNoLongerActive(_)) => {}
                Err(e) => panic!("unexpected error {e}"),
            }

            let ticket = fx.ticket(ticket.id).await;
            assert_eq!(ticket.status, TicketStatus::Revoked);
            assert!(!ticket.listed);
            let stored = fx
                .engine
                .market
                .process(GetListing { listing_id })
                .await
                .unwrap();
            assert_ne!(stored.status, ListingStatus::Active);
        }
    }
}
