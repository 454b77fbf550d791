//! Domain error type shared by every component.
//!
//! Each variant is recoverable and carries enough context for the caller to
//! react (the cap for `PriceCapExceeded`, the actual state for
//! `InvalidTicketState`). Store and signing failures collapse into
//! `Internal` at this boundary.

use thiserror::Error;
use uuid::Uuid;

use crate::checkin::SigningError;
use crate::entities::{TicketAction, TicketStatus};
use crate::store::StoreError;

/// Kind of resource a `NotFound` refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Event,
    Tier,
    Ticket,
    Purchase,
    Listing,
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Resource::Event => write!(f, "event"),
            Resource::Tier => write!(f, "tier"),
            Resource::Ticket => write!(f, "ticket"),
            Resource::Purchase => write!(f, "purchase"),
            Resource::Listing => write!(f, "listing"),
        }
    }
}

#[derive(Debug, Error)]
pub enum TicketingError {
    #[error("tier {tier_id} has {available} tickets available, {requested} requested")]
    InsufficientInventory {
        tier_id: Uuid,
        requested: i32,
        available: i32,
    },

    #[error("wallet limit of {limit} for tier {tier_id} exceeded (holding {held}, requested {requested})")]
    WalletLimitExceeded {
        tier_id: Uuid,
        limit: i32,
        held: i64,
        requested: i32,
    },

    #[error("cannot {action} ticket {ticket_id} in state {state}")]
    InvalidTicketState {
        ticket_id: Uuid,
        state: TicketStatus,
        action: TicketAction,
    },

    #[error("price {price} exceeds the resale cap of {max_price}")]
    PriceCapExceeded { price: i64, max_price: i64 },

    #[error("price {price} is below the minimum resale price of {min_price}")]
    BelowMinimumPrice { price: i64, min_price: i64 },

    #[error("listing {0} is no longer active")]
    ListingNoLongerActive(Uuid),

    #[error("cannot buy your own listing")]
    SelfPurchaseNotAllowed,

    #[error("check-in code has expired")]
    CodeExpired,

    #[error("check-in code signature does not match")]
    SignatureMismatch,

    #[error("ticket {0} has already been used")]
    AlreadyUsed(Uuid),

    #[error("purchase {0} is already finalized")]
    AlreadyFinalized(Uuid),

    #[error("{0} not found")]
    NotFound(Resource),

    #[error("requester does not own ticket {0}")]
    NotTicketOwner(Uuid),

    #[error("requester is not the seller of listing {0}")]
    NotListingSeller(Uuid),

    #[error("ticket {0} already has an active listing")]
    AlreadyListed(Uuid),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("purchase {0} has not been settled")]
    PurchaseNotSettled(Uuid),

    #[error("refund of {requested} exceeds the remaining refundable amount {remaining}")]
    RefundExceedsTotal { requested: i64, remaining: i64 },

    #[error("payment collaborator unavailable: {0}")]
    PaymentUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl TicketingError {
    /// Stable machine-readable name, used as the `kind` of error responses.
    pub fn kind(&self) -> &'static str {
        match self {
            TicketingError::InsufficientInventory { .. } => "insufficient_inventory",
            TicketingError::WalletLimitExceeded { .. } => "wallet_limit_exceeded",
            TicketingError::InvalidTicketState { .. } => "invalid_ticket_state",
            TicketingError::PriceCapExceeded { .. } => "price_cap_exceeded",
            TicketingError::BelowMinimumPrice { .. } => "below_minimum_price",
            TicketingError::ListingNoLongerActive(_) => "listing_no_longer_active",
            TicketingError::SelfPurchaseNotAllowed => "self_purchase_not_allowed",
            TicketingError::CodeExpired => "code_expired",
            TicketingError::SignatureMismatch => "signature_mismatch",
            TicketingError::AlreadyUsed(_) => "already_used",
            TicketingError::AlreadyFinalized(_) => "already_finalized",
            TicketingError::NotFound(_) => "not_found",
            TicketingError::NotTicketOwner(_) => "not_ticket_owner",
            TicketingError::NotListingSeller(_) => "not_listing_seller",
            TicketingError::AlreadyListed(_) => "already_listed",
            TicketingError::InvalidRequest(_) => "invalid_request",
            TicketingError::PurchaseNotSettled(_) => "purchase_not_settled",
            TicketingError::RefundExceedsTotal { .. } => "refund_exceeds_total",
            TicketingError::PaymentUnavailable(_) => "payment_unavailable",
            TicketingError::Internal(_) => "internal",
        }
    }
}

impl From<StoreError> for TicketingError {
    fn from(e: StoreError) -> Self {
        tracing::error!(error = %e, "store failure");
        TicketingError::Internal(e.to_string())
    }
}

impl From<SigningError> for TicketingError {
    fn from(e: SigningError) -> Self {
        tracing::error!(error = %e, "signing failure");
        TicketingError::Internal(e.to_string())
    }
}

pub type TicketingResult<T> = Result<T, TicketingError>;
