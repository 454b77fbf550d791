//! Persistent records of the ticketing engine.
//!
//! Enums here are the `sqlx::Type` versions stored in Postgres. For API/DTO
//! use, see `trueticket_sdk::objects`; `From` conversions exist both ways
//! where a wire counterpart exists.

pub mod check_in;
pub mod event;
pub mod listing;
pub mod purchase;
pub mod ticket;
pub mod tier;
pub mod transfer;

pub use check_in::{CheckInMethod, CheckInOutcome, CheckInRecord};
pub use event::{Event, PriceCapKind, PriceCapPolicy, ResalePolicy};
pub use listing::{Listing, ListingStatus};
pub use purchase::{
    FailureReason, Purchase, PurchaseItem, PurchaseItems, PurchaseRefund, PurchaseStatus,
};
pub use ticket::{Ticket, TicketAction, TicketStatus};
pub use tier::Tier;
pub use transfer::{Beneficiary, RoyaltyAllocation, TransferKind, TransferRecord};
