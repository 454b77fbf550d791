//! Ticket Store: reads of individual tickets and the mint settlement entry
//! points.
//!
//! Status changes go through [`Ticket::apply`] so the state machine lives in
//! one place; the operations here only add locking and persistence.

use std::sync::Arc;

use kanau::processor::Processor;
use uuid::Uuid;

use crate::clock::Clock;
use crate::entities::{CheckInRecord, Ticket, TicketAction, TicketStatus, TransferRecord};
use crate::error::{Resource, TicketingError, TicketingResult};
use crate::store::{Store, StoreTx};

pub(crate) async fn lock_ticket(tx: &mut dyn StoreTx, ticket_id: Uuid) -> TicketingResult<Ticket> {
    tx.lock_ticket(ticket_id)
        .await?
        .ok_or(TicketingError::NotFound(Resource::Ticket))
}

#[derive(Clone)]
pub struct TicketStore {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl TicketStore {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }
}

#[derive(Debug, Clone)]
pub struct GetTicket {
    pub ticket_id: Uuid,
}

#[derive(Debug, Clone)]
pub struct GetTransferHistory {
    pub ticket_id: Uuid,
}

#[derive(Debug, Clone)]
pub struct GetCheckInHistory {
    pub ticket_id: Uuid,
}

/// The external ledger minted a token for the ticket.
#[derive(Debug, Clone)]
pub struct ConfirmMint {
    pub ticket_id: Uuid,
    pub external_token_ref: String,
}

/// A mint attempt failed; bump the attempt counter for backoff.
#[derive(Debug, Clone)]
pub struct RecordMintFailure {
    pub ticket_id: Uuid,
}

impl Processor<GetTicket> for TicketStore {
    type Output = Ticket;
    type Error = TicketingError;

    async fn process(&self, input: GetTicket) -> Result<Ticket, TicketingError> {
        let mut tx = self.store.begin().await?;
        tx.get_ticket(input.ticket_id)
            .await?
            .ok_or(TicketingError::NotFound(Resource::Ticket))
    }
}

impl Processor<GetTransferHistory> for TicketStore {
    type Output = Vec<TransferRecord>;
    type Error = TicketingError;

    async fn process(&self, input: GetTransferHistory) -> Result<Vec<TransferRecord>, TicketingError> {
        let mut tx = self.store.begin().await?;
        if tx.get_ticket(input.ticket_id).await?.is_none() {
            return Err(TicketingError::NotFound(Resource::Ticket));
        }
        Ok(tx.transfers_for_ticket(input.ticket_id).await?)
    }
}

impl Processor<GetCheckInHistory> for TicketStore {
    type Output = Vec<CheckInRecord>;
    type Error = TicketingError;

    async fn process(&self, input: GetCheckInHistory) -> Result<Vec<CheckInRecord>, TicketingError> {
        let mut tx = self.store.begin().await?;
        if tx.get_ticket(input.ticket_id).await?.is_none() {
            return Err(TicketingError::NotFound(Resource::Ticket));
        }
        Ok(tx.check_ins_for_ticket(input.ticket_id).await?)
    }
}

impl Processor<ConfirmMint> for TicketStore {
    type Output = Ticket;
    type Error = TicketingError;

    /// Idempotent for a repeated token ref. A different ref for an already
    /// minted ticket is rejected.
    async fn process(&self, input: ConfirmMint) -> Result<Ticket, TicketingError> {
        if input.external_token_ref.trim().is_empty() {
            return Err(TicketingError::InvalidRequest(
                "external token ref is empty".to_string(),
            ));
        }
        let mut tx = self.store.begin().await?;
        let mut ticket = lock_ticket(tx.as_mut(), input.ticket_id).await?;

        match &ticket.external_token_ref {
            Some(existing) if *existing == input.external_token_ref => return Ok(ticket),
            Some(existing) => {
                return Err(TicketingError::InvalidRequest(format!(
                    "ticket {} is already minted as {existing}",
                    ticket.id
                )));
            }
            None => {}
        }

        let now = self.clock.now();
        ticket.external_token_ref = Some(input.external_token_ref);
        ticket.updated_at = now;
        if ticket.status == TicketStatus::PendingSettlement {
            ticket.apply(TicketAction::Settle, now)?;
        } else {
            tracing::warn!(
                ticket_id = %ticket.id,
                status = %ticket.status,
                "Mint confirmed for a ticket that is no longer pending settlement"
            );
        }
        tx.update_ticket(&ticket).await?;
        tx.commit().await?;

        tracing::info!(ticket_id = %ticket.id, status = %ticket.status, "Mint confirmed");
        Ok(ticket)
    }
}

impl Processor<RecordMintFailure> for TicketStore {
    type Output = Ticket;
    type Error = TicketingError;

    async fn process(&self, input: RecordMintFailure) -> Result<Ticket, TicketingError> {
        let mut tx = self.store.begin().await?;
        let mut ticket = lock_ticket(tx.as_mut(), input.ticket_id).await?;
        let now = self.clock.now();
        ticket.mint_attempts += 1;
        ticket.mint_last_tried_at = Some(now);
        ticket.updated_at = now;
        tx.update_ticket(&ticket).await?;
        tx.commit().await?;
        Ok(ticket)
    }
}
