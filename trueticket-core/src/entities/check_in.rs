use time::OffsetDateTime;
use trueticket_sdk::objects::{
    CheckInMethod as SdkCheckInMethod, CheckInOutcome as SdkCheckInOutcome, CheckInResponse,
};
use uuid::Uuid;

/// Append-only record of a scan attempt at the venue.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct CheckInRecord {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub scanner_id: String,
    pub method: CheckInMethod,
    pub outcome: CheckInOutcome,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "snake_case", type_name = "check_in_method")]
pub enum CheckInMethod {
    RotatingCode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "snake_case", type_name = "check_in_outcome")]
pub enum CheckInOutcome {
    Admitted,
    CodeExpired,
    SignatureMismatch,
}

impl From<&CheckInRecord> for CheckInResponse {
    fn from(record: &CheckInRecord) -> Self {
        CheckInResponse {
            check_in_id: record.id,
            ticket_id: record.ticket_id,
            scanner_id: record.scanner_id.clone(),
            method: match record.method {
                CheckInMethod::RotatingCode => SdkCheckInMethod::RotatingCode,
            },
            outcome: match record.outcome {
                CheckInOutcome::Admitted => SdkCheckInOutcome::Admitted,
                CheckInOutcome::CodeExpired => SdkCheckInOutcome::CodeExpired,
                CheckInOutcome::SignatureMismatch => SdkCheckInOutcome::SignatureMismatch,
            },
            at: record.created_at.unix_timestamp(),
        }
    }
}
