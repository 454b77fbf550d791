//! Admin API handlers.
//!
//! Every route requires the `TrueTicket-Admin-Authorization` header with the
//! plaintext admin secret.
//!
//! # Endpoints
//!
//! - `POST /purchases/{purchase_id}/refund` - apply a refund (idempotent per `refund_ref`)
//! - `POST /listings/{listing_id}/cancel`   - cancel any active listing
//! - `POST /sweep`                          - run an expiry sweep now

use axum::{
    Json, Router,
    extract::{Path, State},
    response::IntoResponse,
    routing::post,
};
use kanau::processor::Processor;
use serde::Serialize;
use trueticket_core::market::{CancelListing, Requester};
use trueticket_core::processors::SweepNow;
use trueticket_core::purchase::{PurchaseRef, RefundPurchase};
use trueticket_sdk::objects::{ListingResponse, RefundRequest};
use uuid::Uuid;

use super::ApiError;
use super::extractors::AdminAuth;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/purchases/{purchase_id}/refund", post(refund_purchase))
        .route("/listings/{listing_id}/cancel", post(cancel_listing))
        .route("/sweep", post(sweep))
}

async fn refund_purchase(
    State(state): State<AppState>,
    _auth: AdminAuth,
    Path(purchase_id): Path<Uuid>,
    Json(request): Json<RefundRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state
        .engine
        .purchases
        .process(RefundPurchase {
            purchase: PurchaseRef::Id(purchase_id),
            amount: request.amount,
            refund_ref: request.refund_ref,
        })
        .await?;
    Ok(Json(outcome.purchase().to_response(None)))
}

async fn cancel_listing(
    State(state): State<AppState>,
    _auth: AdminAuth,
    Path(listing_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let listing = state
        .engine
        .market
        .process(CancelListing {
            listing_id,
            requester: Requester::Admin,
        })
        .await?;
    Ok(Json(ListingResponse::from(&listing)))
}

#[derive(Serialize)]
struct SweepResponse {
    expired_purchases: usize,
    expired_listings: usize,
}

async fn sweep(
    State(state): State<AppState>,
    _auth: AdminAuth,
) -> Result<impl IntoResponse, ApiError> {
    let report = state.engine.sweeper.process(SweepNow).await?;
    Ok(Json(SweepResponse {
        expired_purchases: report.expired_purchases,
        expired_listings: report.expired_listings,
    }))
}
