//! Objects exchanged with the optional external ledger.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::signature::Signature;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintRequest {
    pub ticket_id: Uuid,
}

impl Signature for MintRequest {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintResponse {
    pub external_token_ref: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkUsedRequest {
    pub external_token_ref: String,
}

impl Signature for MarkUsedRequest {}

/// Asynchronous confirmation that a mint finished, pushed by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintConfirmation {
    pub ticket_id: Uuid,
    pub external_token_ref: String,
}

impl Signature for MintConfirmation {}
