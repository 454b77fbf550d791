use smallvec::SmallVec;
use time::OffsetDateTime;
use trueticket_sdk::objects::{PurchaseResponse, PurchaseStatus as SdkPurchaseStatus};
use uuid::Uuid;

/// Line items of a purchase. Most checkouts touch one or two tiers.
pub type PurchaseItems = SmallVec<[PurchaseItem; 4]>;

/// One checkout attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Purchase {
    pub id: Uuid,
    /// Handed to the payment collaborator; its callbacks reference it.
    pub correlation_id: String,
    pub buyer_id: String,
    pub status: PurchaseStatus,
    pub failure_reason: Option<FailureReason>,
    pub currency: String,
    pub amount: i64,
    pub refunded_amount: i64,
    pub items: PurchaseItems,
    /// Filled only once the purchase completes.
    pub ticket_ids: Vec<Uuid>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub finalized_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct PurchaseItem {
    pub tier_id: Uuid,
    pub quantity: i32,
    /// Face price captured at reservation time.
    pub unit_price: i64,
}

/// One applied refund. `(purchase_id, refund_ref)` is unique, which makes
/// redelivered refund callbacks no-ops.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct PurchaseRefund {
    pub purchase_id: Uuid,
    pub refund_ref: String,
    pub amount: i64,
    pub created_at: OffsetDateTime,
}

/// Purchase status for database operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "snake_case", type_name = "purchase_status")]
pub enum PurchaseStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
    PartiallyRefunded,
}

/// Why a purchase ended in `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "snake_case", type_name = "purchase_failure_reason")]
pub enum FailureReason {
    Expired,
    PaymentFailed,
    PaymentUnavailable,
}

impl PurchaseStatus {
    /// Whether payment was captured at some point.
    pub fn is_settled(self) -> bool {
        matches!(
            self,
            PurchaseStatus::Completed | PurchaseStatus::Refunded | PurchaseStatus::PartiallyRefunded
        )
    }
}

impl From<PurchaseStatus> for SdkPurchaseStatus {
    fn from(value: PurchaseStatus) -> Self {
        match value {
            PurchaseStatus::Pending => SdkPurchaseStatus::Pending,
            PurchaseStatus::Completed => SdkPurchaseStatus::Completed,
            PurchaseStatus::Failed => SdkPurchaseStatus::Failed,
            PurchaseStatus::Refunded => SdkPurchaseStatus::Refunded,
            PurchaseStatus::PartiallyRefunded => SdkPurchaseStatus::PartiallyRefunded,
        }
    }
}

impl std::fmt::Display for PurchaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        SdkPurchaseStatus::from(*self).fmt(f)
    }
}

impl Purchase {
    pub fn refundable(&self) -> i64 {
        self.amount - self.refunded_amount
    }

    pub fn to_response(&self, redirect_target: Option<String>) -> PurchaseResponse {
        PurchaseResponse {
            purchase_id: self.id,
            correlation_id: self.correlation_id.clone(),
            status: self.status.into(),
            amount: self.amount,
            refunded_amount: self.refunded_amount,
            currency: self.currency.clone(),
            ticket_ids: self.ticket_ids.clone(),
            redirect_target,
            created_at: self.created_at.unix_timestamp(),
        }
    }
}
