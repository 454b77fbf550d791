//! Ticket, tier and transfer objects.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Ticket status for API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    PendingSettlement,
    Valid,
    Used,
    Revoked,
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TicketStatus::PendingSettlement => write!(f, "pending_settlement"),
            TicketStatus::Valid => write!(f, "valid"),
            TicketStatus::Used => write!(f, "used"),
            TicketStatus::Revoked => write!(f, "revoked"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketResponse {
    pub ticket_id: Uuid,
    pub tier_id: Uuid,
    pub event_id: Uuid,
    pub purchase_id: Uuid,
    pub owner_id: String,
    pub status: TicketStatus,
    pub original_price: i64,
    pub listed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_token_ref: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierAvailabilityResponse {
    pub tier_id: Uuid,
    pub event_id: Uuid,
    pub total: i32,
    pub sold: i32,
    pub reserved: i32,
    pub available: i32,
    pub price_face: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_per_wallet: Option<i32>,
}

/// Resale price bounds for one ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResaleCapResponse {
    pub ticket_id: Uuid,
    pub original_price: i64,
    pub max_price: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_price: Option<i64>,
}

/// Request body for `POST /tickets/{ticket_id}/transfer`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferTicketRequest {
    pub to_owner_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferKind {
    Resale,
    Gift,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferResponse {
    pub transfer_id: Uuid,
    pub ticket_id: Uuid,
    pub kind: TransferKind,
    pub from_owner_id: String,
    pub to_owner_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<i64>,
    pub royalty_amount: i64,
    pub created_at: i64,
}
