use uuid::Uuid;

/// Work for the external ledger collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerEvent {
    /// A ticket was created in `PendingSettlement` and needs a token.
    MintRequested { ticket_id: Uuid },
    /// A ticket was admitted; mirror it on the ledger.
    MarkUsed {
        ticket_id: Uuid,
        external_token_ref: String,
    },
}

impl LedgerEvent {
    pub fn ticket_id(&self) -> Uuid {
        match self {
            LedgerEvent::MintRequested { ticket_id } | LedgerEvent::MarkUsed { ticket_id, .. } => {
                *ticket_id
            }
        }
    }
}
