//! Check-in Verifier.
//!
//! Holders get a short-lived signed code bound to the ticket's current
//! secret ref and owner. Scanners verify the code, which yields a
//! [`VerifiedCode`] proof; only that proof can admit the ticket.

pub mod code;

use std::sync::Arc;

use kanau::processor::Processor;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::{ConfigStore, TicketingSettings};
use crate::entities::{
    CheckInMethod, CheckInOutcome, CheckInRecord, ListingStatus, Ticket, TicketAction,
    TicketStatus,
};
use crate::error::{Resource, TicketingError};
use crate::events::{EventSenders, LedgerEvent};
use crate::store::Store;
use crate::tickets::lock_ticket;

pub use code::{CodePayload, CodeSigner, HmacCodeSigner, SigningError};

#[derive(Clone)]
pub struct CheckInVerifier {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    settings: ConfigStore<TicketingSettings>,
    signer: Arc<dyn CodeSigner>,
    events: EventSenders,
}

impl CheckInVerifier {
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        settings: ConfigStore<TicketingSettings>,
        signer: Arc<dyn CodeSigner>,
        events: EventSenders,
    ) -> Self {
        Self {
            store,
            clock,
            settings,
            signer,
            events,
        }
    }

    /// Signature, then expiry, then binding to the current holder, then
    /// ticket state.
    async fn verify(&self, input: &VerifyCode) -> Result<(VerifiedCode, Ticket), TicketingError> {
        let payload = code::decode(&input.code)
            .and_then(|bytes| CodePayload::from_bytes(&bytes).map(|payload| (bytes, payload)));
        let Some((bytes, payload)) = payload else {
            return Err(TicketingError::SignatureMismatch);
        };
        let Some(signature) = code::decode(&input.signature) else {
            return Err(TicketingError::SignatureMismatch);
        };
        if !self.signer.verify(&bytes, &signature)? {
            return Err(TicketingError::SignatureMismatch);
        }

        let now = self.clock.now();
        if now.unix_timestamp() >= payload.expires_at {
            return Err(TicketingError::CodeExpired);
        }

        let mut tx = self.store.begin().await?;
        let ticket = tx
            .get_ticket(input.ticket_id)
            .await?
            .ok_or(TicketingError::NotFound(Resource::Ticket))?;
        if ticket.check_in_secret_ref != payload.ticket_ref || ticket.owner_id != payload.owner_ref
        {
            return Err(TicketingError::SignatureMismatch);
        }
        if ticket.status != TicketStatus::Valid {
            return Err(TicketingError::AlreadyUsed(ticket.id));
        }

        let proof = VerifiedCode {
            ticket_id: ticket.id,
            scanner_id: input.scanner_id.clone(),
            secret_ref: payload.ticket_ref,
            code_expires_at: payload.expires_at,
        };
        Ok((proof, ticket))
    }

    async fn record_rejected_scan(&self, ticket_id: Uuid, scanner_id: &str, outcome: CheckInOutcome) {
        let record = CheckInRecord {
            id: Uuid::now_v7(),
            ticket_id,
            scanner_id: scanner_id.to_string(),
            method: CheckInMethod::RotatingCode,
            outcome,
            created_at: self.clock.now(),
        };
        let result = async {
            let mut tx = self.store.begin().await?;
            if tx.get_ticket(ticket_id).await?.is_none() {
                return Ok(());
            }
            tx.insert_check_in(&record).await?;
            tx.commit().await
        }
        .await;
        if let Err(e) = result {
            tracing::error!(ticket_id = %ticket_id, error = %e, "Failed to record rejected scan");
        }
    }
}

/// Issue a display code to the ticket's holder.
#[derive(Debug, Clone)]
pub struct IssueCode {
    pub ticket_id: Uuid,
    pub requester_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedCode {
    pub ticket_id: Uuid,
    pub code: String,
    pub signature: String,
    pub issued_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct VerifyCode {
    pub ticket_id: Uuid,
    pub code: String,
    pub signature: String,
    pub scanner_id: String,
}

/// Proof that a code just passed verification. Only the verifier can build
/// one, and admitting a ticket consumes it.
#[derive(Debug)]
pub struct VerifiedCode {
    ticket_id: Uuid,
    scanner_id: String,
    secret_ref: String,
    code_expires_at: i64,
}

impl VerifiedCode {
    pub fn ticket_id(&self) -> Uuid {
        self.ticket_id
    }

    pub fn scanner_id(&self) -> &str {
        &self.scanner_id
    }
}

#[derive(Debug)]
pub struct CheckIn {
    pub proof: VerifiedCode,
}

/// Scanner path: verify, optionally admit, and audit rejected codes.
#[derive(Debug, Clone)]
pub struct ScanCode {
    pub ticket_id: Uuid,
    pub code: String,
    pub signature: String,
    pub scanner_id: String,
    pub check_in: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanResult {
    pub ticket_id: Uuid,
    pub status: TicketStatus,
    pub check_in: Option<CheckInRecord>,
}

impl Processor<IssueCode> for CheckInVerifier {
    type Output = IssuedCode;
    type Error = TicketingError;

    async fn process(&self, input: IssueCode) -> Result<IssuedCode, TicketingError> {
        let ttl = self.settings.read().await.code_ttl;
        let mut tx = self.store.begin().await?;
        let ticket = tx
            .get_ticket(input.ticket_id)
            .await?
            .ok_or(TicketingError::NotFound(Resource::Ticket))?;
        drop(tx);
        if ticket.owner_id != input.requester_id {
            return Err(TicketingError::NotTicketOwner(ticket.id));
        }
        ticket.ensure(TicketAction::CheckIn)?;

        let issued_at = self.clock.now();
        let expires_at = issued_at + ttl;
        let payload = CodePayload::new(
            ticket.check_in_secret_ref,
            ticket.owner_id,
            issued_at.unix_timestamp(),
            expires_at.unix_timestamp(),
        );
        let bytes = payload.to_bytes()?;
        let signature = self.signer.sign(&bytes)?;

        Ok(IssuedCode {
            ticket_id: ticket.id,
            code: code::encode(&bytes),
            signature: code::encode(&signature),
            issued_at,
            expires_at,
        })
    }
}

impl Processor<VerifyCode> for CheckInVerifier {
    type Output = VerifiedCode;
    type Error = TicketingError;

    async fn process(&self, input: VerifyCode) -> Result<VerifiedCode, TicketingError> {
        self.verify(&input).await.map(|(proof, _)| proof)
    }
}

impl Processor<CheckIn> for CheckInVerifier {
    type Output = CheckInRecord;
    type Error = TicketingError;

    #[tracing::instrument(skip_all, err, fields(ticket_id = %input.proof.ticket_id))]
    async fn process(&self, input: CheckIn) -> Result<CheckInRecord, TicketingError> {
        let proof = input.proof;
        let now = self.clock.now();
        if now.unix_timestamp() >= proof.code_expires_at {
            return Err(TicketingError::CodeExpired);
        }

        let mut tx = self.store.begin().await?;
        let mut ticket = lock_ticket(tx.as_mut(), proof.ticket_id).await?;
        if ticket.status != TicketStatus::Valid {
            return Err(TicketingError::AlreadyUsed(ticket.id));
        }
        // Ownership changed between verification and admission.
        if ticket.check_in_secret_ref != proof.secret_ref {
            return Err(TicketingError::SignatureMismatch);
        }

        ticket.apply(TicketAction::CheckIn, now)?;
        // An admitted ticket cannot stay on sale. Ticket row is already locked.
        let mut withdrawn_listing = None;
        if ticket.listed {
            if let Some(mut listing) = tx.lock_active_listing_for_ticket(ticket.id).await? {
                listing.status = ListingStatus::Cancelled;
                listing.updated_at = now;
                tx.update_listing(&listing).await?;
                withdrawn_listing = Some(listing.id);
            }
            ticket.listed = false;
        }
        let record = CheckInRecord {
            id: Uuid::now_v7(),
            ticket_id: ticket.id,
            scanner_id: proof.scanner_id,
            method: CheckInMethod::RotatingCode,
            outcome: CheckInOutcome::Admitted,
            created_at: now,
        };
        tx.update_ticket(&ticket).await?;
        tx.insert_check_in(&record).await?;
        tx.commit().await?;

        tracing::info!(ticket_id = %ticket.id, scanner_id = %record.scanner_id, "Ticket admitted");
        if let Some(listing_id) = withdrawn_listing {
            tracing::info!(ticket_id = %ticket.id, listing_id = %listing_id, "Listing withdrawn on admission");
        }
        if let Some(external_token_ref) = ticket.external_token_ref {
            self.events.publish_ledger(LedgerEvent::MarkUsed {
                ticket_id: ticket.id,
                external_token_ref,
            });
        }
        Ok(record)
    }
}

impl Processor<ScanCode> for CheckInVerifier {
    type Output = ScanResult;
    type Error = TicketingError;

    async fn process(&self, input: ScanCode) -> Result<ScanResult, TicketingError> {
        let verify = VerifyCode {
            ticket_id: input.ticket_id,
            code: input.code,
            signature: input.signature,
            scanner_id: input.scanner_id,
        };
        let (proof, ticket) = match self.verify(&verify).await {
            Ok(verified) => verified,
            Err(e) => {
                let outcome = match &e {
                    TicketingError::SignatureMismatch => Some(CheckInOutcome::SignatureMismatch),
                    TicketingError::CodeExpired => Some(CheckInOutcome::CodeExpired),
                    _ => None,
                };
                if let Some(outcome) = outcome {
                    self.record_rejected_scan(verify.ticket_id, &verify.scanner_id, outcome)
                        .await;
                }
                return Err(e);
            }
        };

        if !input.check_in {
            return Ok(ScanResult {
                ticket_id: ticket.id,
                status: ticket.status,
                check_in: None,
            });
        }
        let record = self.process(CheckIn { proof }).await?;
        Ok(ScanResult {
            ticket_id: record.ticket_id,
            status: TicketStatus::Used,
            check_in: Some(record),
        })
    }
}
