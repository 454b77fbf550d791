//! LedgerSync processor.
//!
//! Responsible for:
//! - Receiving `LedgerEvent` after the originating transaction committed
//! - Minting a token for each ticket waiting in `PendingSettlement` and
//!   confirming it through the ticket store
//! - Retrying failed mints with exponential backoff (2^0 to 2^11 seconds),
//!   tracked in `mint_attempts` and `mint_last_tried_at`
//! - Forwarding admissions as best-effort `mark_used` calls

use std::sync::Arc;

use kanau::processor::Processor;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::collaborators::LedgerClient;
use crate::config::{ConfigStore, TicketingSettings};
use crate::entities::{Ticket, TicketStatus};
use crate::error::TicketingError;
use crate::events::{LedgerEvent, LedgerEventReceiver};
use crate::store::Store;
use crate::tickets::{ConfirmMint, GetTicket, RecordMintFailure, TicketStore};

/// Maximum backoff exponent (2^11 = 2048 seconds).
const MAX_RETRY_COUNT: u32 = 11;

const RETRY_SCAN_INTERVAL: std::time::Duration = std::time::Duration::from_secs(10);
const RETRY_BATCH: i64 = 20;

pub struct LedgerSync {
    store: Arc<dyn Store>,
    tickets: TicketStore,
    ledger: Arc<dyn LedgerClient>,
    clock: Arc<dyn Clock>,
    settings: ConfigStore<TicketingSettings>,
    ledger_rx: LedgerEventReceiver,
    shutdown_rx: watch::Receiver<bool>,
    retry_interval: std::time::Duration,
}

impl LedgerSync {
    pub fn new(
        store: Arc<dyn Store>,
        ledger: Arc<dyn LedgerClient>,
        clock: Arc<dyn Clock>,
        settings: ConfigStore<TicketingSettings>,
        ledger_rx: LedgerEventReceiver,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            tickets: TicketStore::new(store.clone(), clock.clone()),
            store,
            ledger,
            clock,
            settings,
            ledger_rx,
            shutdown_rx,
            retry_interval: RETRY_SCAN_INTERVAL,
        }
    }

    /// Period of the backoff scan over tickets still waiting for a mint.
    pub fn with_retry_interval(mut self, retry_interval: std::time::Duration) -> Self {
        self.retry_interval = retry_interval;
        self
    }

    pub async fn run(mut self) {
        info!("LedgerSync started");

        // The scan keeps its own schedule; incoming events must not push it back.
        let mut retry_tick = tokio::time::interval_at(
            tokio::time::Instant::now() + self.retry_interval,
            self.retry_interval,
        );
        retry_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown_rx.changed() => {
                    if *self.shutdown_rx.borrow() {
                        info!("LedgerSync received shutdown signal");
                        break;
                    }
                }

                _ = retry_tick.tick() => {
                    if let Err(e) = self.retry_pending_mints().await {
                        error!(error = %e, "Failed to retry pending mints");
                    }
                }

                Some(event) = self.ledger_rx.recv() => {
                    debug!(event = ?event, "Received LedgerEvent");
                    if let Err(e) = self.process_event(event).await {
                        error!(error = %e, "Failed to process LedgerEvent");
                    }
                }

                else => {
                    info!("LedgerEvent channel closed");
                    break;
                }
            }
        }

        info!("LedgerSync shutdown complete");
    }

    async fn process_event(&self, event: LedgerEvent) -> Result<(), TicketingError> {
        match event {
            LedgerEvent::MintRequested { ticket_id } => {
                let ticket = self.tickets.process(GetTicket { ticket_id }).await?;
                self.mint(ticket).await
            }
            LedgerEvent::MarkUsed {
                ticket_id,
                external_token_ref,
            } => {
                if let Err(e) = self.ledger.mark_used(&external_token_ref).await {
                    warn!(ticket_id = %ticket_id, error = %e, "Ledger mark-used failed");
                }
                Ok(())
            }
        }
    }

    async fn mint(&self, ticket: Ticket) -> Result<(), TicketingError> {
        if ticket.status != TicketStatus::PendingSettlement || ticket.external_token_ref.is_some()
        {
            debug!(ticket_id = %ticket.id, "Ticket no longer needs a mint");
            return Ok(());
        }

        match self.ledger.mint(ticket.id).await {
            Ok(external_token_ref) => {
                self.tickets
                    .process(ConfirmMint {
                        ticket_id: ticket.id,
                        external_token_ref,
                    })
                    .await?;
                Ok(())
            }
            Err(e) => {
                let updated = self
                    .tickets
                    .process(RecordMintFailure {
                        ticket_id: ticket.id,
                    })
                    .await?;
                warn!(
                    ticket_id = %ticket.id,
                    error = %e,
                    attempts = updated.mint_attempts,
                    "Ledger mint failed"
                );
                Ok(())
            }
        }
    }

    /// Mint tickets whose backoff has elapsed.
    async fn retry_pending_mints(&self) -> Result<(), TicketingError> {
        let max_attempts = self.settings.read().await.mint_max_attempts;
        let candidates = {
            let mut tx = self.store.begin().await?;
            tx.tickets_pending_mint(max_attempts, RETRY_BATCH).await?
        };

        let now = self.clock.now();
        for ticket in candidates {
            let last_tried = ticket.mint_last_tried_at.unwrap_or(ticket.created_at);
            let attempts = u32::try_from(ticket.mint_attempts).unwrap_or(0);
            let delay = calculate_retry_delay(attempts);
            let due = last_tried + time::Duration::seconds(delay.as_secs() as i64);
            if due > now {
                continue;
            }
            let ticket_id: Uuid = ticket.id;
            if let Err(e) = self.mint(ticket).await {
                error!(ticket_id = %ticket_id, error = %e, "Mint retry failed");
            }
        }
        Ok(())
    }
}

/// Calculate the next retry delay based on retry count.
///
/// Uses exponential backoff: 2^retry_count seconds.
pub fn calculate_retry_delay(retry_count: u32) -> std::time::Duration {
    let seconds = 2u64.pow(retry_count.min(MAX_RETRY_COUNT));
    std::time::Duration::from_secs(seconds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::LedgerError;
    use crate::test_support::{Fixture, settled_ticket};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct FakeLedger {
        fail: AtomicBool,
        minted: Mutex<Vec<Uuid>>,
        marked: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LedgerClient for FakeLedger {
        async fn mint(&self, ticket_id: Uuid) -> Result<String, LedgerError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(LedgerError::Rejected {
                    status: 503,
                    body: "down".to_string(),
                });
            }
            self.minted.lock().unwrap().push(ticket_id);
            Ok(format!("token-{ticket_id}"))
        }

        async fn mark_used(&self, external_token_ref: &str) -> Result<(), LedgerError> {
            self.marked.lock().unwrap().push(external_token_ref.to_string());
            Ok(())
        }
    }

    fn sync(fx: &Fixture, ledger: Arc<FakeLedger>) -> LedgerSync {
        let (_tx, rx) = crate::events::ledger_event_channel();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        LedgerSync::new(
            fx.store.clone(),
            ledger,
            fx.clock.clone(),
            fx.settings.clone(),
            rx,
            shutdown_rx,
        )
    }

    #[test]
    fn test_retry_delay_calculation() {
        assert_eq!(calculate_retry_delay(0), std::time::Duration::from_secs(1));
        assert_eq!(calculate_retry_delay(1), std::time::Duration::from_secs(2));
        assert_eq!(calculate_retry_delay(10), std::time::Duration::from_secs(1024));
        assert_eq!(calculate_retry_delay(11), std::time::Duration::from_secs(2048));
        assert_eq!(calculate_retry_delay(100), std::time::Duration::from_secs(2048));
    }

    #[tokio::test]
    async fn test_mint_settles_pending_ticket() {
        let fx = Fixture::with_external_mint().await;
        let tier = fx.tier(10, None, 2_500).await;
        let ticket_ids = fx.buy(&tier, "alice", 1).await;
        let ticket = fx.ticket(ticket_ids[0]).await;
        assert_eq!(ticket.status, TicketStatus::PendingSettlement);

        let ledger = Arc::new(FakeLedger::default());
        let sync = sync(&fx, ledger.clone());
        sync.process_event(LedgerEvent::MintRequested {
            ticket_id: ticket.id,
        })
        .await
        .unwrap();

        let ticket = fx.ticket(ticket.id).await;
        assert_eq!(ticket.status, TicketStatus::Valid);
        assert_eq!(
            ticket.external_token_ref.as_deref(),
            Some(format!("token-{}", ticket.id).as_str())
        );

        // A redelivered event is a no-op.
        sync.process_event(LedgerEvent::MintRequested {
            ticket_id: ticket.id,
        })
        .await
        .unwrap();
        assert_eq!(ledger.minted.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_mint_backs_off_then_retries() {
        let fx = Fixture::with_external_mint().await;
        let tier = fx.tier(10, None, 2_500).await;
        let ticket_ids = fx.buy(&tier, "alice", 1).await;

        let ledger = Arc::new(FakeLedger::default());
        ledger.fail.store(true, Ordering::SeqCst);
        let sync = sync(&fx, ledger.clone());
        sync.process_event(LedgerEvent::MintRequested {
            ticket_id: ticket_ids[0],
        })
        .await
        .unwrap();

        let ticket = fx.ticket(ticket_ids[0]).await;
        assert_eq!(ticket.status, TicketStatus::PendingSettlement);
        assert_eq!(ticket.mint_attempts, 1);

        ledger.fail.store(false, Ordering::SeqCst);
        // 2^1 seconds have not passed yet.
        sync.retry_pending_mints().await.unwrap();
        assert!(ledger.minted.lock().unwrap().is_empty());

        fx.clock.advance(time::Duration::seconds(2));
        sync.retry_pending_mints().await.unwrap();
        assert_eq!(fx.ticket(ticket_ids[0]).await.status, TicketStatus::Valid);
    }

    #[tokio::test]
    async fn test_mark_used_forwards_token() {
        let fx = Fixture::new().await;
        let tier = fx.tier(10, None, 2_500).await;
        let ticket = settled_ticket(&fx, &tier, "alice").await;

        let ledger = Arc::new(FakeLedger::default());
        let sync = sync(&fx, ledger.clone());
        sync.process_event(LedgerEvent::MarkUsed {
            ticket_id: ticket.id,
            external_token_ref: "token-1".to_string(),
        })
        .await
        .unwrap();
        assert_eq!(*ledger.marked.lock().unwrap(), vec!["token-1".to_string()]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_retry_scan_runs_under_steady_traffic() {
        let fx = Fixture::with_external_mint().await;
        let tier = fx.tier(10, None, 2_500).await;
        let ticket_ids = fx.buy(&tier, "alice", 1).await;
        // Backoff for a never-tried ticket has long elapsed.
        fx.clock.advance(time::Duration::minutes(1));

        let ledger = Arc::new(FakeLedger::default());
        let (ledger_tx, ledger_rx) = crate::events::ledger_event_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let sync = LedgerSync::new(
            fx.store.clone(),
            ledger.clone(),
            fx.clock.clone(),
            fx.settings.clone(),
            ledger_rx,
            shutdown_rx,
        )
        .with_retry_interval(std::time::Duration::from_millis(50));
        let handle = tokio::spawn(sync.run());

        // An event every 10ms, well inside the scan period.
        let traffic = tokio::spawn(async move {
            loop {
                let event = LedgerEvent::MarkUsed {
                    ticket_id: Uuid::nil(),
                    external_token_ref: "token-other".to_string(),
                };
                if ledger_tx.send(event).await.is_err() {
                    break;
                }
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
        });

        let mut status = TicketStatus::PendingSettlement;
        for _ in 0..100 {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            status = fx.ticket(ticket_ids[0]).await.status;
            if status == TicketStatus::Valid {
                break;
            }
        }
        let traffic_still_flowing = !traffic.is_finished();

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
        traffic.abort();

        assert!(traffic_still_flowing);
        assert_eq!(status, TicketStatus::Valid);
        assert_eq!(*ledger.minted.lock().unwrap(), vec![ticket_ids[0]]);
        assert!(!ledger.marked.lock().unwrap().is_empty());
    }
}
