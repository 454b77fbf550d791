use time::OffsetDateTime;
use trueticket_sdk::objects::{TicketResponse, TicketStatus as SdkTicketStatus};
use uuid::Uuid;

use crate::error::TicketingError;

/// One admission right, owned by exactly one identity at a time.
///
/// Rows are never deleted; `Used` and `Revoked` are the terminal states.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Ticket {
    pub id: Uuid,
    pub tier_id: Uuid,
    pub event_id: Uuid,
    pub purchase_id: Uuid,
    pub owner_id: String,
    pub status: TicketStatus,
    pub original_price: i64,
    /// Opaque reference the rotating entry codes are bound to. Rotated on
    /// every ownership change so codes shown to a previous holder stop
    /// verifying.
    pub check_in_secret_ref: String,
    pub external_token_ref: Option<String>,
    /// Set while an active resale listing exists for this ticket.
    pub listed: bool,
    pub transfer_count: i32,
    pub mint_attempts: i32,
    pub mint_last_tried_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Ticket status for database operations.
///
/// ```text
/// PendingSettlement --settle--> Valid --check in--> Used
///        |                        |
///        +-------revoke-------> Revoked
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "snake_case", type_name = "ticket_status")]
pub enum TicketStatus {
    PendingSettlement,
    Valid,
    Used,
    Revoked,
}

impl TicketStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TicketStatus::Used | TicketStatus::Revoked)
    }
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        SdkTicketStatus::from(*self).fmt(f)
    }
}

impl From<TicketStatus> for SdkTicketStatus {
    fn from(value: TicketStatus) -> Self {
        match value {
            TicketStatus::PendingSettlement => SdkTicketStatus::PendingSettlement,
            TicketStatus::Valid => SdkTicketStatus::Valid,
            TicketStatus::Used => SdkTicketStatus::Used,
            TicketStatus::Revoked => SdkTicketStatus::Revoked,
        }
    }
}

/// Something a caller attempts to do with a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TicketAction {
    /// External settlement confirmed.
    Settle,
    /// Put on the resale market.
    Resale,
    /// Hand over to another holder.
    Transfer,
    /// Admit at the venue.
    CheckIn,
    /// Invalidate after a refund.
    Revoke,
}

impl std::fmt::Display for TicketAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TicketAction::Settle => write!(f, "settle"),
            TicketAction::Resale => write!(f, "resale"),
            TicketAction::Transfer => write!(f, "transfer"),
            TicketAction::CheckIn => write!(f, "check-in"),
            TicketAction::Revoke => write!(f, "revoke"),
        }
    }
}

impl TicketAction {
    fn permitted_from(self, status: TicketStatus) -> bool {
        match self {
            TicketAction::Settle => status == TicketStatus::PendingSettlement,
            TicketAction::Resale | TicketAction::Transfer | TicketAction::CheckIn => {
                status == TicketStatus::Valid
            }
            TicketAction::Revoke => {
                matches!(status, TicketStatus::PendingSettlement | TicketStatus::Valid)
            }
        }
    }

    /// Status the ticket ends in, if the action changes it.
    fn target(self) -> Option<TicketStatus> {
        match self {
            TicketAction::Settle => Some(TicketStatus::Valid),
            TicketAction::CheckIn => Some(TicketStatus::Used),
            TicketAction::Revoke => Some(TicketStatus::Revoked),
            TicketAction::Resale | TicketAction::Transfer => None,
        }
    }
}

impl Ticket {
    /// Fail with `InvalidTicketState` unless `action` is allowed from the
    /// current status.
    pub fn ensure(&self, action: TicketAction) -> Result<(), TicketingError> {
        if action.permitted_from(self.status) {
            Ok(())
        } else {
            Err(TicketingError::InvalidTicketState {
                ticket_id: self.id,
                state: self.status,
                action,
            })
        }
    }

    /// Apply a status-changing action in memory. The caller persists the row.
    pub fn apply(&mut self, action: TicketAction, now: OffsetDateTime) -> Result<(), TicketingError> {
        self.ensure(action)?;
        if let Some(next) = action.target() {
            self.status = next;
            self.updated_at = now;
        }
        Ok(())
    }

    /// Hand the ticket to `new_owner` and rotate the check-in secret ref.
    pub fn reassign(&mut self, new_owner: &str, now: OffsetDateTime) -> Result<(), TicketingError> {
        self.ensure(TicketAction::Transfer)?;
        self.owner_id = new_owner.to_string();
        self.check_in_secret_ref = new_secret_ref();
        self.transfer_count += 1;
        self.listed = false;
        self.updated_at = now;
        Ok(())
    }
}

/// Fresh opaque check-in secret reference.
pub fn new_secret_ref() -> String {
    let bytes: [u8; 16] = rand::random();
    fast32::base64::RFC4648_NOPAD.encode(&bytes)
}

impl From<&Ticket> for TicketResponse {
    fn from(ticket: &Ticket) -> Self {
        TicketResponse {
            ticket_id: ticket.id,
            tier_id: ticket.tier_id,
            event_id: ticket.event_id,
            purchase_id: ticket.purchase_id,
            owner_id: ticket.owner_id.clone(),
            status: ticket.status.into(),
            original_price: ticket.original_price,
            listed: ticket.listed,
            external_token_ref: ticket.external_token_ref.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticket(status: TicketStatus) -> Ticket {
        let now = OffsetDateTime::UNIX_EPOCH;
        Ticket {
            id: Uuid::now_v7(),
            tier_id: Uuid::now_v7(),
            event_id: Uuid::now_v7(),
            purchase_id: Uuid::now_v7(),
            owner_id: "alice".to_string(),
            status,
            original_price: 10_000,
            check_in_secret_ref: new_secret_ref(),
            external_token_ref: None,
            listed: false,
            transfer_count: 0,
            mint_attempts: 0,
            mint_last_tried_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_lifecycle_transitions() {
        let now = OffsetDateTime::UNIX_EPOCH;
        let mut t = ticket(TicketStatus::PendingSettlement);
        t.apply(TicketAction::Settle, now).unwrap();
        assert_eq!(t.status, TicketStatus::Valid);
        t.apply(TicketAction::CheckIn, now).unwrap();
        assert_eq!(t.status, TicketStatus::Used);
    }

    #[test]
    fn test_terminal_states_reject_everything() {
        let now = OffsetDateTime::UNIX_EPOCH;
        for status in [TicketStatus::Used, TicketStatus::Revoked] {
            assert!(status.is_terminal());
            for action in [
                TicketAction::Settle,
                TicketAction::Resale,
                TicketAction::Transfer,
                TicketAction::CheckIn,
                TicketAction::Revoke,
            ] {
                let mut t = ticket(status);
                let err = t.apply(action, now).unwrap_err();
                match err {
                    TicketingError::InvalidTicketState {
                        state, action: rejected, ..
                    } => {
                        assert_eq!(state, status);
                        assert_eq!(rejected, action);
                    }
                    other => panic!("unexpected error: {other:?}"),
                }
                assert_eq!(t.status, status);
            }
        }
    }

    #[test]
    fn test_pending_ticket_cannot_be_resold_or_scanned() {
        let t = ticket(TicketStatus::PendingSettlement);
        assert!(t.ensure(TicketAction::Resale).is_err());
        assert!(t.ensure(TicketAction::Transfer).is_err());
        assert!(t.ensure(TicketAction::CheckIn).is_err());
        assert!(t.ensure(TicketAction::Revoke).is_ok());
    }

    #[test]
    fn test_reassign_rotates_secret_and_keeps_valid() {
        let now = OffsetDateTime::UNIX_EPOCH;
        let mut t = ticket(TicketStatus::Valid);
        t.listed = true;
        let old_ref = t.check_in_secret_ref.clone();
        t.reassign("bob", now).unwrap();
        assert_eq!(t.owner_id, "bob");
        assert_eq!(t.status, TicketStatus::Valid);
        assert_eq!(t.transfer_count, 1);
        assert!(!t.listed);
        assert_ne!(t.check_in_secret_ref, old_ref);
    }
}
