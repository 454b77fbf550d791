//! Resale listing objects.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ticket::TransferResponse;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingStatus {
    Active,
    Sold,
    Cancelled,
    Expired,
}

impl std::fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListingStatus::Active => write!(f, "active"),
            ListingStatus::Sold => write!(f, "sold"),
            ListingStatus::Cancelled => write!(f, "cancelled"),
            ListingStatus::Expired => write!(f, "expired"),
        }
    }
}

/// Request body for `POST /listings`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateListingRequest {
    pub ticket_id: Uuid,
    /// Asking price in minor currency units.
    pub price: i64,
    /// Unix timestamp. Defaults to the configured listing lifetime.
    #[serde(default)]
    pub expires_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingResponse {
    pub listing_id: Uuid,
    pub ticket_id: Uuid,
    pub seller_id: String,
    pub price: i64,
    pub status: ListingStatus,
    pub expires_at: i64,
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buyer_id: Option<String>,
}

/// Who a slice of a resale royalty is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Beneficiary {
    Artist,
    Venue,
    Host,
    Platform,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoyaltyShareResponse {
    pub beneficiary: Beneficiary,
    pub amount: i64,
}

/// Result of a successful `POST /listings/{listing_id}/buy`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResaleReceiptResponse {
    pub listing: ListingResponse,
    pub transfer: TransferResponse,
    pub royalty_shares: Vec<RoyaltyShareResponse>,
}
