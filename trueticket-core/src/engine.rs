//! The engine components wired over one store, clock and settings handle.

use std::sync::Arc;

use crate::capacity::CapacityLedger;
use crate::checkin::{CheckInVerifier, CodeSigner};
use crate::clock::Clock;
use crate::collaborators::PaymentGateway;
use crate::config::{ConfigStore, TicketingSettings};
use crate::events::EventSenders;
use crate::market::ResaleMarket;
use crate::pricing::RoyaltySplit;
use crate::processors::ExpirySweeper;
use crate::purchase::PurchaseReconciler;
use crate::store::Store;
use crate::tickets::TicketStore;

pub struct EngineDeps {
    pub store: Arc<dyn Store>,
    pub clock: Arc<dyn Clock>,
    pub settings: ConfigStore<TicketingSettings>,
    pub events: EventSenders,
    pub gateway: Arc<dyn PaymentGateway>,
    pub signer: Arc<dyn CodeSigner>,
    pub royalty_split: Arc<dyn RoyaltySplit>,
}

#[derive(Clone)]
pub struct TicketingEngine {
    pub capacity: CapacityLedger,
    pub tickets: TicketStore,
    pub purchases: PurchaseReconciler,
    pub market: ResaleMarket,
    pub check_in: CheckInVerifier,
    pub sweeper: ExpirySweeper,
}

impl TicketingEngine {
    pub fn new(deps: EngineDeps) -> Self {
        let EngineDeps {
            store,
            clock,
            settings,
            events,
            gateway,
            signer,
            royalty_split,
        } = deps;

        let purchases = PurchaseReconciler::new(
            store.clone(),
            clock.clone(),
            settings.clone(),
            events.clone(),
            gateway,
        );
        let market = ResaleMarket::new(
            store.clone(),
            clock.clone(),
            settings.clone(),
            royalty_split,
        );
        let sweeper = ExpirySweeper::new(
            store.clone(),
            clock.clone(),
            settings.clone(),
            purchases.clone(),
            market.clone(),
        );
        Self {
            capacity: CapacityLedger::new(store.clone()),
            tickets: TicketStore::new(store.clone(), clock.clone()),
            check_in: CheckInVerifier::new(store, clock, settings, signer, events),
            purchases,
            market,
            sweeper,
        }
    }
}
