//! ExpirySweeper processor.
//!
//! Housekeeping only: expired listings are already inert for buyers and a
//! late payment confirmation still wins against a pending purchase until
//! the sweep commits. Each sweep fails `Pending` purchases older than the
//! reservation TTL (releasing their inventory) and marks past-due listings
//! `Expired`.

use std::sync::Arc;

use kanau::processor::Processor;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::clock::Clock;
use crate::config::{ConfigStore, TicketingSettings};
use crate::error::TicketingError;
use crate::market::{ExpireListings, ResaleMarket};
use crate::purchase::{ExpirePurchase, PurchaseRef, PurchaseReconciler};
use crate::store::Store;

const SWEEP_BATCH: i64 = 100;

#[derive(Clone)]
pub struct ExpirySweeper {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    settings: ConfigStore<TicketingSettings>,
    purchases: PurchaseReconciler,
    market: ResaleMarket,
}

/// Run one sweep now.
#[derive(Debug, Clone, Copy, Default)]
pub struct SweepNow;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired_purchases: usize,
    pub expired_listings: usize,
}

impl ExpirySweeper {
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        settings: ConfigStore<TicketingSettings>,
        purchases: PurchaseReconciler,
        market: ResaleMarket,
    ) -> Self {
        Self {
            store,
            clock,
            settings,
            purchases,
            market,
        }
    }

    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!("ExpirySweeper started");
        let mut settings_rx = self.settings.subscribe();

        loop {
            let interval = self.settings.read().await.sweep_interval;
            let interval = std::time::Duration::try_from(interval)
                .unwrap_or(std::time::Duration::from_secs(30));

            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("ExpirySweeper received shutdown signal");
                        break;
                    }
                }

                Ok(()) = settings_rx.changed() => {
                    debug!(version = self.settings.version(), "Settings reloaded, rescheduling sweep");
                }

                _ = tokio::time::sleep(interval) => {
                    match self.process(SweepNow).await {
                        Ok(report) => debug!(report = ?report, "Sweep finished"),
                        Err(e) => error!(error = %e, "Sweep failed"),
                    }
                }
            }
        }

        info!("ExpirySweeper shutdown complete");
    }
}

impl Processor<SweepNow> for ExpirySweeper {
    type Output = SweepReport;
    type Error = TicketingError;

    async fn process(&self, _: SweepNow) -> Result<SweepReport, TicketingError> {
        let ttl = self.settings.read().await.reservation_ttl;
        let cutoff = self.clock.now() - ttl;
        let stale = {
            let mut tx = self.store.begin().await?;
            tx.stale_pending_purchases(cutoff, SWEEP_BATCH).await?
        };

        let mut report = SweepReport::default();
        for purchase_id in stale {
            match self
                .purchases
                .process(ExpirePurchase {
                    purchase: PurchaseRef::Id(purchase_id),
                })
                .await
            {
                Ok(_) => report.expired_purchases += 1,
                // Settled between the scan and the lock.
                Err(TicketingError::AlreadyFinalized(_)) => {}
                Err(e) => return Err(e),
            }
        }

        report.expired_listings = self
            .market
            .process(ExpireListings { limit: SWEEP_BATCH })
            .await?
            .len();

        if report != SweepReport::default() {
            info!(
                purchases = report.expired_purchases,
                listings = report.expired_listings,
                "Expiry sweep"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use time::Duration;
    use trueticket_sdk::objects::PurchaseItemRequest;

    use super::*;
    use crate::entities::{FailureReason, PurchaseStatus};
    use crate::market::CreateListing;
    use crate::purchase::{BeginPurchase, GetPurchase};
    use crate::test_support::{Fixture, settled_ticket};

    #[tokio::test]
    async fn test_sweep_expires_stale_reservations() {
        let fx = Fixture::new().await;
        let tier = fx.tier(5, None, 1_000).await;
        let handle = fx
            .engine
            .purchases
            .process(BeginPurchase {
                buyer_id: "alice".to_string(),
                items: vec![PurchaseItemRequest {
                    tier_id: tier.id,
                    quantity: 3,
                }],
            })
            .await
            .unwrap();

        fx.clock.advance(Duration::minutes(10));
        let report = fx.engine.sweeper.process(SweepNow).await.unwrap();
        assert_eq!(report, SweepReport::default());
        assert_eq!(fx.current_tier(tier.id).await.reserved_quantity, 3);

        fx.clock.advance(Duration::minutes(6));
        let report = fx.engine.sweeper.process(SweepNow).await.unwrap();
        assert_eq!(report.expired_purchases, 1);
        assert_eq!(fx.current_tier(tier.id).await.reserved_quantity, 0);

        let purchase = fx
            .engine
            .purchases
            .process(GetPurchase {
                purchase_id: handle.purchase_id,
            })
            .await
            .unwrap();
        assert_eq!(purchase.status, PurchaseStatus::Failed);
        assert_eq!(purchase.failure_reason, Some(FailureReason::Expired));
    }

    #[tokio::test]
    async fn test_sweep_leaves_completed_purchases_and_expires_listings() {
        let fx = Fixture::new().await;
        let tier = fx.tier(5, None, 1_000).await;
        let ticket = settled_ticket(&fx, &tier, "alice").await;
        fx.engine
            .market
            .process(CreateListing {
                ticket_id: ticket.id,
                seller_id: "alice".to_string(),
                price: 1_000,
                expires_at: Some(fx.clock.now() + Duration::minutes(1)),
            })
            .await
            .unwrap();

        fx.clock.advance(Duration::hours(1));
        let report = fx.engine.sweeper.process(SweepNow).await.unwrap();
        assert_eq!(
            report,
            SweepReport {
                expired_purchases: 0,
                expired_listings: 1,
            }
        );
        assert_eq!(fx.current_tier(tier.id).await.sold_quantity, 1);
    }
}
