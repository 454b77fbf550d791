//! Collaborator callbacks, authenticated by a signed body.
//!
//! - `POST /payments/callback` - payment confirmed, expired, failed or refunded
//! - `POST /ledger/mint-confirmations` - the external ledger minted a token

use axum::{Json, Router, extract::State, response::IntoResponse, routing::post};
use kanau::processor::Processor;
use trueticket_core::tickets::ConfirmMint;
use trueticket_sdk::objects::{CallbackAck, MintConfirmation, PaymentCallback, TicketResponse};

use super::ApiError;
use super::extractors::SignedBody;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/payments/callback", post(payment_callback))
        .route("/ledger/mint-confirmations", post(mint_confirmation))
}

/// Redeliveries of an already applied signal are acknowledged with `200` and
/// `outcome = "already_finalized"` so the collaborator stops retrying.
async fn payment_callback(
    State(state): State<AppState>,
    SignedBody(callback): SignedBody<PaymentCallback>,
) -> Result<impl IntoResponse, ApiError> {
    let correlation_id = callback.correlation_id().to_string();
    let outcome = state.engine.purchases.process(callback).await?;
    tracing::info!(
        correlation_id = %correlation_id,
        outcome = outcome.label(),
        "Payment callback handled"
    );
    Ok(Json(CallbackAck {
        correlation_id,
        outcome: outcome.label().to_string(),
    }))
}

async fn mint_confirmation(
    State(state): State<AppState>,
    SignedBody(confirmation): SignedBody<MintConfirmation>,
) -> Result<impl IntoResponse, ApiError> {
    let ticket = state
        .engine
        .tickets
        .process(ConfirmMint {
            ticket_id: confirmation.ticket_id,
            external_token_ref: confirmation.external_token_ref,
        })
        .await?;
    Ok(Json(TicketResponse::from(&ticket)))
}
