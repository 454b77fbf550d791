//! Narrow interfaces to the external payment and ledger systems, with
//! signed-HTTP implementations.

pub mod ledger;
pub mod payment;

pub use ledger::{HttpLedgerClient, LedgerClient, LedgerError};
pub use payment::{GatewayError, HttpPaymentGateway, PaymentGateway};

use std::time::Duration;

pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}
