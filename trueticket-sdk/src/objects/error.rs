//! Error body returned by every failing API call.

use serde::{Deserialize, Serialize};

/// JSON error body.
///
/// `kind` is the stable machine-readable error name (`price_cap_exceeded`,
/// `listing_no_longer_active`, ...). `max_price` and `min_price` are filled
/// for the resale price errors so a client can show the allowed range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub kind: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_price: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_price: Option<i64>,
}

impl ErrorResponse {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            max_price: None,
            min_price: None,
        }
    }
}
