//! Event channel factories and handles.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use super::types::LedgerEvent;

/// Default buffer size for event channels.
pub const DEFAULT_CHANNEL_BUFFER: usize = 256;

pub type LedgerEventSender = mpsc::Sender<LedgerEvent>;
pub type LedgerEventReceiver = mpsc::Receiver<LedgerEvent>;

pub fn ledger_event_channel() -> (LedgerEventSender, LedgerEventReceiver) {
    mpsc::channel(DEFAULT_CHANNEL_BUFFER)
}

/// Senders handed to the engine components.
#[derive(Clone)]
pub struct EventSenders {
    pub ledger: LedgerEventSender,
}

impl EventSenders {
    pub fn new(ledger: LedgerEventSender) -> Self {
        Self { ledger }
    }

    /// Publish without waiting. The transaction behind the event has
    /// already committed, so a full or closed channel only delays the
    /// ledger mirror.
    pub fn publish_ledger(&self, event: LedgerEvent) {
        match self.ledger.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                tracing::warn!(
                    ticket_id = %event.ticket_id(),
                    "Ledger event channel full, leaving event to the retry scan"
                );
            }
            Err(TrySendError::Closed(event)) => {
                tracing::debug!(
                    ticket_id = %event.ticket_id(),
                    "Ledger sync not running, dropping event"
                );
            }
        }
    }
}
