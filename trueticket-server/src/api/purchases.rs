//! Primary sale: checkout and purchase status.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use kanau::processor::Processor;
use trueticket_core::error::Resource;
use trueticket_core::purchase::{GetPurchase, StartCheckout};
use trueticket_core::TicketingError;
use trueticket_sdk::objects::BeginPurchaseRequest;
use uuid::Uuid;

use super::ApiError;
use super::extractors::Identity;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/purchases", post(create_purchase))
        .route("/purchases/{purchase_id}", get(get_purchase))
}

/// `POST /purchases` - reserve inventory and start payment.
///
/// Responds `201` with the pending purchase and the collaborator's redirect
/// target. The reservation is released if the gateway cannot be reached.
async fn create_purchase(
    State(state): State<AppState>,
    Identity(buyer_id): Identity,
    Json(request): Json<BeginPurchaseRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let started = state
        .engine
        .purchases
        .process(StartCheckout {
            buyer_id,
            items: request.items,
        })
        .await?;
    let purchase = state
        .engine
        .purchases
        .process(GetPurchase {
            purchase_id: started.handle.purchase_id,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(purchase.to_response(Some(started.redirect_target))),
    ))
}

/// `GET /purchases/{purchase_id}` - visible to its buyer only.
async fn get_purchase(
    State(state): State<AppState>,
    Identity(caller): Identity,
    Path(purchase_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let purchase = state
        .engine
        .purchases
        .process(GetPurchase { purchase_id })
        .await?;
    if purchase.buyer_id != caller {
        return Err(TicketingError::NotFound(Resource::Purchase).into());
    }
    Ok(Json(purchase.to_response(None)))
}
