//! Venue entry objects.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ticket::TicketStatus;

/// A freshly issued rotating entry code, shown on the holder's device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckInCodeResponse {
    pub ticket_id: Uuid,
    pub code: String,
    pub signature: String,
    pub issued_at: i64,
    pub expires_at: i64,
}

/// Scanner submission for `POST /tickets/{ticket_id}/scan`.
///
/// With `check_in = false` the code is only verified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRequest {
    pub code: String,
    pub signature: String,
    #[serde(default = "default_check_in")]
    pub check_in: bool,
}

fn default_check_in() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResponse {
    pub ticket_id: Uuid,
    pub status: TicketStatus,
    pub admitted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_in_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckInMethod {
    RotatingCode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckInOutcome {
    Admitted,
    CodeExpired,
    SignatureMismatch,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckInResponse {
    pub check_in_id: Uuid,
    pub ticket_id: Uuid,
    pub scanner_id: String,
    pub method: CheckInMethod,
    pub outcome: CheckInOutcome,
    pub at: i64,
}
