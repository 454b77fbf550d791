//! Shared fixtures for engine tests: an in-memory store, a manual clock and
//! a stub payment gateway.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use kanau::processor::Processor;
use time::{Duration, OffsetDateTime};
use tokio::sync::Mutex;
use trueticket_sdk::objects::{PaymentInitiation, PaymentRedirect, PurchaseItemRequest};
use uuid::Uuid;

use crate::checkin::HmacCodeSigner;
use crate::clock::ManualClock;
use crate::collaborators::{GatewayError, PaymentGateway};
use crate::config::{ConfigStore, TicketingSettings};
use crate::engine::{EngineDeps, TicketingEngine};
use crate::entities::{Event, PriceCapPolicy, ResalePolicy, Ticket, Tier};
use crate::events::{EventSenders, LedgerEventReceiver, ledger_event_channel};
use crate::pricing::WeightedRoyaltySplit;
use crate::purchase::{BeginPurchase, FinalizePurchase};
use crate::store::{MemoryStore, Store};

pub const SIGNING_KEY: &[u8] = b"test-signing-key-0123456789abcdef";

#[derive(Default)]
pub struct StubGateway {
    pub fail: AtomicBool,
}

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn initiate(&self, request: PaymentInitiation) -> Result<PaymentRedirect, GatewayError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(GatewayError::Rejected {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        Ok(PaymentRedirect {
            redirect_target: format!("https://pay.example/{}", request.correlation_id),
        })
    }
}

pub struct Fixture {
    pub store: Arc<dyn Store>,
    pub clock: Arc<ManualClock>,
    pub settings: ConfigStore<TicketingSettings>,
    pub gateway: Arc<StubGateway>,
    pub engine: TicketingEngine,
    pub event: Event,
    pub ledger_rx: Mutex<LedgerEventReceiver>,
}

pub fn start_time() -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(1_900_000_000).unwrap()
}

impl Fixture {
    pub async fn new() -> Self {
        Self::with_settings(TicketingSettings::default()).await
    }

    pub async fn with_external_mint() -> Self {
        Self::with_settings(TicketingSettings {
            require_external_mint: true,
            ..TicketingSettings::default()
        })
        .await
    }

    /// The event starts 30 days after the clock's start, allows resale up
    /// to 20% over face and pays 10% royalty.
    pub async fn with_settings(settings: TicketingSettings) -> Self {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(start_time()));
        let settings = ConfigStore::new(settings);
        let gateway = Arc::new(StubGateway::default());
        let (ledger_tx, ledger_rx) = ledger_event_channel();

        let engine = TicketingEngine::new(EngineDeps {
            store: store.clone(),
            clock: clock.clone(),
            settings: settings.clone(),
            events: EventSenders::new(ledger_tx),
            gateway: gateway.clone(),
            signer: Arc::new(HmacCodeSigner::new(SIGNING_KEY).unwrap()),
            royalty_split: Arc::new(WeightedRoyaltySplit::host_only()),
        });

        let event = Event {
            id: Uuid::now_v7(),
            name: "Summer Festival".to_string(),
            starts_at: start_time() + Duration::days(30),
            ends_at: start_time() + Duration::days(31),
            resale_policy: ResalePolicy {
                cap: PriceCapPolicy::PercentageCap { bps: 2000 },
                min_resale_price: None,
            },
            royalty_bps: 1000,
        };
        let mut tx = store.begin().await.unwrap();
        tx.insert_event(&event).await.unwrap();
        tx.commit().await.unwrap();

        Self {
            store,
            clock,
            settings,
            gateway,
            engine,
            event,
            ledger_rx: Mutex::new(ledger_rx),
        }
    }

    pub async fn tier(&self, total: i32, max_per_wallet: Option<i32>, price_face: i64) -> Tier {
        self.tier_with_policy(total, max_per_wallet, price_face, None)
            .await
    }

    pub async fn tier_with_policy(
        &self,
        total: i32,
        max_per_wallet: Option<i32>,
        price_face: i64,
        resale_policy: Option<ResalePolicy>,
    ) -> Tier {
        let tier = Tier {
            id: Uuid::now_v7(),
            event_id: self.event.id,
            name: "General Admission".to_string(),
            total_quantity: total,
            sold_quantity: 0,
            reserved_quantity: 0,
            max_per_wallet,
            price_face,
            resale_policy,
        };
        let mut tx = self.store.begin().await.unwrap();
        tx.insert_tier(&tier).await.unwrap();
        tx.commit().await.unwrap();
        tier
    }

    pub async fn current_tier(&self, tier_id: Uuid) -> Tier {
        let mut tx = self.store.begin().await.unwrap();
        tx.get_tier(tier_id).await.unwrap().unwrap()
    }

    pub async fn ticket(&self, ticket_id: Uuid) -> Ticket {
        let mut tx = self.store.begin().await.unwrap();
        tx.get_ticket(ticket_id).await.unwrap().unwrap()
    }

    /// Begin and settle a purchase, returning the new ticket ids.
    pub async fn buy(&self, tier: &Tier, buyer: &str, quantity: i32) -> Vec<Uuid> {
        let handle = self
            .engine
            .purchases
            .process(BeginPurchase {
                buyer_id: buyer.to_string(),
                items: vec![PurchaseItemRequest {
                    tier_id: tier.id,
                    quantity,
                }],
            })
            .await
            .unwrap();
        self.engine
            .purchases
            .process(FinalizePurchase {
                correlation_id: handle.correlation_id,
            })
            .await
            .unwrap()
            .purchase()
            .ticket_ids
            .clone()
    }
}

/// One `Valid` ticket owned by `owner`.
pub async fn settled_ticket(fx: &Fixture, tier: &Tier, owner: &str) -> Ticket {
    let ids = fx.buy(tier, owner, 1).await;
    fx.ticket(ids[0]).await
}
