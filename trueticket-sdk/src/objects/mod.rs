//! Wire objects exchanged between the TrueTicket server, its callers and
//! its collaborators.
//!
//! Enums here are the API/DTO versions. The engine keeps its own `sqlx::Type`
//! versions in `trueticket-core::entities` and converts at the boundary.

pub mod checkin;
pub mod error;
pub mod ledger;
pub mod listing;
pub mod payment;
pub mod purchase;
pub mod ticket;

pub use checkin::{
    CheckInCodeResponse, CheckInMethod, CheckInOutcome, CheckInResponse, ScanRequest, ScanResponse,
};
pub use error::ErrorResponse;
pub use ledger::{MarkUsedRequest, MintConfirmation, MintRequest, MintResponse};
pub use listing::{
    Beneficiary, CreateListingRequest, ListingResponse, ListingStatus, ResaleReceiptResponse,
    RoyaltyShareResponse,
};
pub use payment::{
    CallbackAck, CallbackValidationError, PaymentCallback, PaymentInitiation, PaymentRedirect,
};
pub use purchase::{
    BeginPurchaseRequest, PurchaseItemRequest, PurchaseResponse, PurchaseStatus, RefundRequest,
};
pub use ticket::{
    ResaleCapResponse, TicketResponse, TicketStatus, TierAvailabilityResponse, TransferKind,
    TransferResponse, TransferTicketRequest,
};
