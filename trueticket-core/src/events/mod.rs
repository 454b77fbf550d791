//! After-commit events.
//!
//! Components publish these once their transaction has committed; the
//! [`crate::processors::LedgerSync`] processor consumes them. Events carry
//! identifiers only and the processor re-reads the rows, so a dropped event
//! is recovered by the processor's periodic scan.

pub mod channels;
pub mod types;

pub use channels::{
    DEFAULT_CHANNEL_BUFFER, EventSenders, LedgerEventReceiver, LedgerEventSender,
    ledger_event_channel,
};
pub use types::LedgerEvent;
