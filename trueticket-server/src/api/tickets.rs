//! Ticket reads, gifting and venue entry.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use kanau::processor::Processor;
use trueticket_core::TicketingError;
use trueticket_core::checkin::{IssueCode, ScanCode};
use trueticket_core::market::{GetResaleCap, GiftTransfer};
use trueticket_core::tickets::{GetCheckInHistory, GetTicket};
use trueticket_sdk::objects::{
    CheckInCodeResponse, CheckInResponse, ResaleCapResponse, ScanRequest, ScanResponse,
    TicketResponse, TransferResponse, TransferTicketRequest,
};
use uuid::Uuid;

use super::ApiError;
use super::extractors::Identity;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/tickets/{ticket_id}", get(get_ticket))
        .route("/tickets/{ticket_id}/resale-cap", get(resale_cap))
        .route("/tickets/{ticket_id}/transfer", post(transfer))
        .route("/tickets/{ticket_id}/check-in-code", post(check_in_code))
        .route("/tickets/{ticket_id}/scan", post(scan))
        .route("/tickets/{ticket_id}/check-ins", get(check_ins))
}

/// `GET /tickets/{ticket_id}` - holder only.
async fn get_ticket(
    State(state): State<AppState>,
    Identity(caller): Identity,
    Path(ticket_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let ticket = state.engine.tickets.process(GetTicket { ticket_id }).await?;
    if ticket.owner_id != caller {
        return Err(TicketingError::NotTicketOwner(ticket.id).into());
    }
    Ok(Json(TicketResponse::from(&ticket)))
}

async fn resale_cap(
    State(state): State<AppState>,
    Path(ticket_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let cap = state
        .engine
        .market
        .process(GetResaleCap { ticket_id })
        .await?;
    Ok(Json(ResaleCapResponse {
        ticket_id: cap.ticket_id,
        original_price: cap.original_price,
        max_price: cap.max_price,
        min_price: cap.min_price,
    }))
}

/// `POST /tickets/{ticket_id}/transfer` - gift to another holder.
async fn transfer(
    State(state): State<AppState>,
    Identity(caller): Identity,
    Path(ticket_id): Path<Uuid>,
    Json(request): Json<TransferTicketRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state
        .engine
        .market
        .process(GiftTransfer {
            ticket_id,
            from_owner_id: caller,
            to_owner_id: request.to_owner_id,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(TransferResponse::from(&record))))
}

/// `POST /tickets/{ticket_id}/check-in-code` - a fresh rotating code for the
/// holder's device.
async fn check_in_code(
    State(state): State<AppState>,
    Identity(caller): Identity,
    Path(ticket_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let issued = state
        .engine
        .check_in
        .process(IssueCode {
            ticket_id,
            requester_id: caller,
        })
        .await?;
    Ok(Json(CheckInCodeResponse {
        ticket_id: issued.ticket_id,
        code: issued.code,
        signature: issued.signature,
        issued_at: issued.issued_at.unix_timestamp(),
        expires_at: issued.expires_at.unix_timestamp(),
    }))
}

/// `POST /tickets/{ticket_id}/scan` - the caller is the scanner.
async fn scan(
    State(state): State<AppState>,
    Identity(scanner_id): Identity,
    Path(ticket_id): Path<Uuid>,
    Json(request): Json<ScanRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let result = state
        .engine
        .check_in
        .process(ScanCode {
            ticket_id,
            code: request.code,
            signature: request.signature,
            scanner_id,
            check_in: request.check_in,
        })
        .await?;
    Ok(Json(ScanResponse {
        ticket_id: result.ticket_id,
        status: result.status.into(),
        admitted: result.check_in.is_some(),
        check_in_id: result.check_in.map(|record| record.id),
    }))
}

async fn check_ins(
    State(state): State<AppState>,
    _caller: Identity,
    Path(ticket_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let records = state
        .engine
        .tickets
        .process(GetCheckInHistory { ticket_id })
        .await?;
    Ok(Json(
        records
            .iter()
            .map(CheckInResponse::from)
            .collect::<Vec<_>>(),
    ))
}
