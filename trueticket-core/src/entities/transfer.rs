use time::OffsetDateTime;
use trueticket_sdk::objects::{
    Beneficiary as SdkBeneficiary, RoyaltyShareResponse, TransferKind as SdkTransferKind,
    TransferResponse,
};
use uuid::Uuid;

/// Append-only record of an ownership change.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct TransferRecord {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub kind: TransferKind,
    pub from_owner_id: String,
    pub to_owner_id: String,
    pub price: Option<i64>,
    pub royalty_amount: i64,
    pub listing_id: Option<Uuid>,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "snake_case", type_name = "transfer_kind")]
pub enum TransferKind {
    Resale,
    Gift,
}

/// The slice of a royalty attributed to one beneficiary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoyaltyAllocation {
    pub beneficiary: Beneficiary,
    pub amount: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "snake_case", type_name = "royalty_beneficiary")]
pub enum Beneficiary {
    Artist,
    Venue,
    Host,
    Platform,
}

impl From<TransferKind> for SdkTransferKind {
    fn from(value: TransferKind) -> Self {
        match value {
            TransferKind::Resale => SdkTransferKind::Resale,
            TransferKind::Gift => SdkTransferKind::Gift,
        }
    }
}

impl From<Beneficiary> for SdkBeneficiary {
    fn from(value: Beneficiary) -> Self {
        match value {
            Beneficiary::Artist => SdkBeneficiary::Artist,
            Beneficiary::Venue => SdkBeneficiary::Venue,
            Beneficiary::Host => SdkBeneficiary::Host,
            Beneficiary::Platform => SdkBeneficiary::Platform,
        }
    }
}

impl From<SdkBeneficiary> for Beneficiary {
    fn from(value: SdkBeneficiary) -> Self {
        match value {
            SdkBeneficiary::Artist => Beneficiary::Artist,
            SdkBeneficiary::Venue => Beneficiary::Venue,
            SdkBeneficiary::Host => Beneficiary::Host,
            SdkBeneficiary::Platform => Beneficiary::Platform,
        }
    }
}

impl From<&TransferRecord> for TransferResponse {
    fn from(record: &TransferRecord) -> Self {
        TransferResponse {
            transfer_id: record.id,
            ticket_id: record.ticket_id,
            kind: record.kind.into(),
            from_owner_id: record.from_owner_id.clone(),
            to_owner_id: record.to_owner_id.clone(),
            price: record.price,
            royalty_amount: record.royalty_amount,
            created_at: record.created_at.unix_timestamp(),
        }
    }
}

impl From<&RoyaltyAllocation> for RoyaltyShareResponse {
    fn from(allocation: &RoyaltyAllocation) -> Self {
        RoyaltyShareResponse {
            beneficiary: allocation.beneficiary.into(),
            amount: allocation.amount,
        }
    }
}
