//! Objects exchanged with the payment collaborator.

use serde::{Deserialize, Serialize};

use crate::signature::Signature;

/// Signed request the server sends to the payment collaborator to start
/// collecting money for a purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentInitiation {
    pub correlation_id: String,
    pub amount: i64,
    pub currency: String,
}

impl Signature for PaymentInitiation {}

/// Payment collaborator's answer to a [`PaymentInitiation`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRedirect {
    pub redirect_target: String,
}

/// Callback delivered by the payment collaborator.
///
/// Delivery is at-least-once and unordered across correlation ids, so the
/// engine treats every variant idempotently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PaymentCallback {
    Confirmed {
        correlation_id: String,
    },
    Expired {
        correlation_id: String,
    },
    Failed {
        correlation_id: String,
        #[serde(default)]
        reason: Option<String>,
    },
    Refunded {
        correlation_id: String,
        refund_id: String,
        amount: i64,
    },
}

impl Signature for PaymentCallback {}

/// A callback that parsed but carries unusable values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallbackValidationError {
    #[error("correlation id is empty")]
    EmptyCorrelationId,
    #[error("refund id is empty")]
    EmptyRefundId,
    #[error("refund amount must be positive, got {0}")]
    NonPositiveAmount(i64),
}

impl PaymentCallback {
    pub fn correlation_id(&self) -> &str {
        match self {
            PaymentCallback::Confirmed { correlation_id }
            | PaymentCallback::Expired { correlation_id }
            | PaymentCallback::Failed { correlation_id, .. }
            | PaymentCallback::Refunded { correlation_id, .. } => correlation_id,
        }
    }

    pub fn validate(&self) -> Result<(), CallbackValidationError> {
        if self.correlation_id().trim().is_empty() {
            return Err(CallbackValidationError::EmptyCorrelationId);
        }
        if let PaymentCallback::Refunded {
            refund_id, amount, ..
        } = self
        {
            if refund_id.trim().is_empty() {
                return Err(CallbackValidationError::EmptyRefundId);
            }
            if *amount <= 0 {
                return Err(CallbackValidationError::NonPositiveAmount(*amount));
            }
        }
        Ok(())
    }
}

/// Response to a processed callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackAck {
    pub correlation_id: String,
    /// `processed` or `already_finalized`.
    pub outcome: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callback_wire_format() {
        let json = r#"{"event":"refunded","correlation_id":"c1","refund_id":"r1","amount":500}"#;
        let callback: PaymentCallback = serde_json::from_str(json).unwrap();
        assert_eq!(
            callback,
            PaymentCallback::Refunded {
                correlation_id: "c1".to_string(),
                refund_id: "r1".to_string(),
                amount: 500,
            }
        );

        let failed: PaymentCallback =
            serde_json::from_str(r#"{"event":"failed","correlation_id":"c2"}"#).unwrap();
        assert_eq!(failed.correlation_id(), "c2");
    }

    #[test]
    fn test_unknown_event_is_rejected() {
        let result = serde_json::from_str::<PaymentCallback>(
            r#"{"event":"chargeback","correlation_id":"c1"}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_validation() {
        let empty = PaymentCallback::Confirmed {
            correlation_id: "  ".to_string(),
        };
        assert_eq!(
            empty.validate(),
            Err(CallbackValidationError::EmptyCorrelationId)
        );

        let zero = PaymentCallback::Refunded {
            correlation_id: "c".to_string(),
            refund_id: "r".to_string(),
            amount: 0,
        };
        assert_eq!(
            zero.validate(),
            Err(CallbackValidationError::NonPositiveAmount(0))
        );
    }
}
