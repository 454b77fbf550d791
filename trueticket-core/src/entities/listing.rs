use time::OffsetDateTime;
use trueticket_sdk::objects::{ListingResponse, ListingStatus as SdkListingStatus};
use uuid::Uuid;

/// A resale offer for one ticket.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Listing {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub seller_id: String,
    pub price: i64,
    pub status: ListingStatus,
    pub expires_at: OffsetDateTime,
    pub buyer_id: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Listing status for database operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "snake_case", type_name = "listing_status")]
pub enum ListingStatus {
    Active,
    Sold,
    Cancelled,
    Expired,
}

impl Listing {
    /// Active and not past its expiry. Expired-but-unswept listings are inert.
    pub fn is_live_at(&self, now: OffsetDateTime) -> bool {
        self.status == ListingStatus::Active && now < self.expires_at
    }
}

impl From<ListingStatus> for SdkListingStatus {
    fn from(value: ListingStatus) -> Self {
        match value {
            ListingStatus::Active => SdkListingStatus::Active,
            ListingStatus::Sold => SdkListingStatus::Sold,
            ListingStatus::Cancelled => SdkListingStatus::Cancelled,
            ListingStatus::Expired => SdkListingStatus::Expired,
        }
    }
}

impl From<&Listing> for ListingResponse {
    fn from(listing: &Listing) -> Self {
        ListingResponse {
            listing_id: listing.id,
            ticket_id: listing.ticket_id,
            seller_id: listing.seller_id.clone(),
            price: listing.price,
            status: listing.status.into(),
            expires_at: listing.expires_at.unix_timestamp(),
            created_at: listing.created_at.unix_timestamp(),
            buyer_id: listing.buyer_id.clone(),
        }
    }
}
