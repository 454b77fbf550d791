//! Resale listings.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use kanau::processor::Processor;
use trueticket_core::market::{BuyListing, CancelListing, CreateListing, GetListing, Requester};
use trueticket_sdk::objects::{
    CreateListingRequest, ListingResponse, ResaleReceiptResponse, RoyaltyShareResponse,
    TransferResponse,
};
use uuid::Uuid;

use super::extractors::Identity;
use super::{ApiError, from_unix};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/listings", post(create_listing))
        .route("/listings/{listing_id}", get(get_listing))
        .route("/listings/{listing_id}/buy", post(buy_listing))
        .route("/listings/{listing_id}/cancel", post(cancel_listing))
}

/// `POST /listings` - list a held ticket within the resale price bounds.
async fn create_listing(
    State(state): State<AppState>,
    Identity(seller_id): Identity,
    Json(request): Json<CreateListingRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let expires_at = request
        .expires_at
        .map(|at| from_unix("expires_at", at))
        .transpose()?;
    let listing = state
        .engine
        .market
        .process(CreateListing {
            ticket_id: request.ticket_id,
            seller_id,
            price: request.price,
            expires_at,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(ListingResponse::from(&listing))))
}

async fn get_listing(
    State(state): State<AppState>,
    Path(listing_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let listing = state
        .engine
        .market
        .process(GetListing { listing_id })
        .await?;
    Ok(Json(ListingResponse::from(&listing)))
}

/// `POST /listings/{listing_id}/buy` - exactly one concurrent buyer wins;
/// the rest get `listing_no_longer_active`.
async fn buy_listing(
    State(state): State<AppState>,
    Identity(buyer_id): Identity,
    Path(listing_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let receipt = state
        .engine
        .market
        .process(BuyListing {
            listing_id,
            buyer_id,
        })
        .await?;
    Ok(Json(ResaleReceiptResponse {
        listing: ListingResponse::from(&receipt.listing),
        transfer: TransferResponse::from(&receipt.transfer),
        royalty_shares: receipt
            .royalty_allocations
            .iter()
            .map(RoyaltyShareResponse::from)
            .collect(),
    }))
}

async fn cancel_listing(
    State(state): State<AppState>,
    Identity(caller): Identity,
    Path(listing_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let listing = state
        .engine
        .market
        .process(CancelListing {
            listing_id,
            requester: Requester::Holder(caller),
        })
        .await?;
    Ok(Json(ListingResponse::from(&listing)))
}
