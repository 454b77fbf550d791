//! Tier reads: remaining capacity and live resale listings.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::get,
};
use kanau::processor::Processor;
use serde::Deserialize;
use trueticket_core::capacity::GetTierAvailability;
use trueticket_core::entities::Tier;
use trueticket_core::market::ListingsForTier;
use trueticket_sdk::objects::{ListingResponse, TierAvailabilityResponse};
use uuid::Uuid;

use super::ApiError;
use crate::state::AppState;

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 200;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/tiers/{tier_id}/availability", get(availability))
        .route("/tiers/{tier_id}/listings", get(listings))
}

fn to_response(tier: &Tier) -> TierAvailabilityResponse {
    TierAvailabilityResponse {
        tier_id: tier.id,
        event_id: tier.event_id,
        total: tier.total_quantity,
        sold: tier.sold_quantity,
        reserved: tier.reserved_quantity,
        available: tier.available(),
        price_face: tier.price_face,
        max_per_wallet: tier.max_per_wallet,
    }
}

async fn availability(
    State(state): State<AppState>,
    Path(tier_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let tier = state
        .engine
        .capacity
        .process(GetTierAvailability { tier_id })
        .await?;
    Ok(Json(to_response(&tier)))
}

#[derive(Debug, Deserialize)]
struct ListingsQuery {
    #[serde(default)]
    limit: Option<i64>,
}

/// Live listings, cheapest first.
async fn listings(
    State(state): State<AppState>,
    Path(tier_id): Path<Uuid>,
    Query(query): Query<ListingsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    let listings = state
        .engine
        .market
        .process(ListingsForTier { tier_id, limit })
        .await?;
    Ok(Json(
        listings
            .iter()
            .map(ListingResponse::from)
            .collect::<Vec<_>>(),
    ))
}
