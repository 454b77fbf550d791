//! Primary-sale purchase objects.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One line of a checkout: `quantity` tickets of tier `tier_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseItemRequest {
    pub tier_id: Uuid,
    pub quantity: i32,
}

/// Request body for `POST /purchases`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeginPurchaseRequest {
    pub items: Vec<PurchaseItemRequest>,
}

/// Request body for the admin refund endpoint.
///
/// `refund_ref` is the payment collaborator's refund identifier; replaying
/// the same reference is a no-op.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundRequest {
    pub amount: i64,
    pub refund_ref: String,
}

/// Purchase status for API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
    PartiallyRefunded,
}

impl std::fmt::Display for PurchaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PurchaseStatus::Pending => write!(f, "pending"),
            PurchaseStatus::Completed => write!(f, "completed"),
            PurchaseStatus::Failed => write!(f, "failed"),
            PurchaseStatus::Refunded => write!(f, "refunded"),
            PurchaseStatus::PartiallyRefunded => write!(f, "partially_refunded"),
        }
    }
}

/// A purchase as seen by its buyer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseResponse {
    pub purchase_id: Uuid,
    pub correlation_id: String,
    pub status: PurchaseStatus,
    /// Total in minor currency units.
    pub amount: i64,
    pub refunded_amount: i64,
    pub currency: String,
    pub ticket_ids: Vec<Uuid>,
    /// Where to send the buyer to pay. Only present right after checkout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_target: Option<String>,
    pub created_at: i64,
}
