//! HTTP API.
//!
//! Holders and scanners are identified by the trusted `TrueTicket-Identity`
//! header set by the fronting gateway. Collaborator callbacks carry a
//! `TrueTicket-Signature` over the body, and admin routes need
//! `TrueTicket-Admin-Authorization` with the plaintext admin secret.
//!
//! # Endpoints
//!
//! - `POST /purchases`, `GET /purchases/{purchase_id}`
//! - `POST /payments/callback`, `POST /ledger/mint-confirmations`
//! - `GET  /tiers/{tier_id}/availability`, `GET /tiers/{tier_id}/listings`
//! - `GET  /tickets/{ticket_id}`, `GET /tickets/{ticket_id}/resale-cap`,
//!   `POST /tickets/{ticket_id}/transfer`, `POST /tickets/{ticket_id}/check-in-code`,
//!   `POST /tickets/{ticket_id}/scan`, `GET /tickets/{ticket_id}/check-ins`
//! - `POST /listings`, `GET /listings/{listing_id}`,
//!   `POST /listings/{listing_id}/buy`, `POST /listings/{listing_id}/cancel`
//! - `/admin/...`, see [`admin`]

use axum::{
    Json, Router,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use trueticket_core::TicketingError;
use trueticket_sdk::objects::ErrorResponse;

use crate::state::AppState;

pub mod admin;
pub mod callbacks;
pub mod extractors;
pub mod listings;
pub mod purchases;
pub mod tickets;
pub mod tiers;

/// Build the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(purchases::router())
        .merge(callbacks::router())
        .merge(tiers::router())
        .merge(tickets::router())
        .merge(listings::router())
        .nest("/admin", admin::router())
}

/// A failed engine operation, rendered as an [`ErrorResponse`].
#[derive(Debug)]
pub struct ApiError(pub TicketingError);

impl From<TicketingError> for ApiError {
    fn from(e: TicketingError) -> Self {
        Self(e)
    }
}

fn status_for(e: &TicketingError) -> StatusCode {
    match e {
        TicketingError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        TicketingError::NotFound(_) => StatusCode::NOT_FOUND,
        TicketingError::NotTicketOwner(_)
        | TicketingError::NotListingSeller(_)
        | TicketingError::SignatureMismatch => StatusCode::FORBIDDEN,
        TicketingError::CodeExpired => StatusCode::GONE,
        TicketingError::InsufficientInventory { .. }
        | TicketingError::WalletLimitExceeded { .. }
        | TicketingError::InvalidTicketState { .. }
        | TicketingError::ListingNoLongerActive(_)
        | TicketingError::AlreadyUsed(_)
        | TicketingError::AlreadyFinalized(_)
        | TicketingError::AlreadyListed(_)
        | TicketingError::PurchaseNotSettled(_) => StatusCode::CONFLICT,
        TicketingError::PriceCapExceeded { .. }
        | TicketingError::BelowMinimumPrice { .. }
        | TicketingError::SelfPurchaseNotAllowed
        | TicketingError::RefundExceedsTotal { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        TicketingError::PaymentUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        TicketingError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        let mut body = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self.0, "API internal error");
            ErrorResponse::new(self.0.kind(), "internal server error")
        } else {
            ErrorResponse::new(self.0.kind(), self.0.to_string())
        };
        match self.0 {
            TicketingError::PriceCapExceeded { max_price, .. } => body.max_price = Some(max_price),
            TicketingError::BelowMinimumPrice { min_price, .. } => body.min_price = Some(min_price),
            _ => {}
        }
        (status, Json(body)).into_response()
    }
}

/// Error body for failures raised before the engine is reached.
pub(crate) fn reject(status: StatusCode, kind: &str, message: &str) -> Response {
    (status, Json(ErrorResponse::new(kind, message))).into_response()
}

/// Unix seconds to an engine timestamp.
pub(crate) fn from_unix(field: &str, value: i64) -> Result<time::OffsetDateTime, ApiError> {
    time::OffsetDateTime::from_unix_timestamp(value)
        .map_err(|_| ApiError(TicketingError::InvalidRequest(format!("{field} is out of range"))))
}
