use async_trait::async_trait;
use thiserror::Error;
use trueticket_sdk::objects::{MarkUsedRequest, MintRequest, MintResponse};
use trueticket_sdk::signature::{SIGNATURE_HEADER, Signature, SignedObject};
use url::Url;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("ledger answered {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("payload serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid endpoint: {0}")]
    Endpoint(#[from] url::ParseError),
}

/// Optional external system of record for ticket ownership. Never
/// authoritative for admission.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Returns the external token reference for the ticket.
    async fn mint(&self, ticket_id: Uuid) -> Result<String, LedgerError>;
    async fn mark_used(&self, external_token_ref: &str) -> Result<(), LedgerError>;
}

pub struct HttpLedgerClient {
    mint_endpoint: Url,
    mark_used_endpoint: Url,
    secret: Box<[u8]>,
    http_client: reqwest::Client,
}

impl HttpLedgerClient {
    pub fn new(base: &Url, secret: impl Into<Box<[u8]>>) -> Result<Self, LedgerError> {
        Ok(Self {
            mint_endpoint: base.join("mint")?,
            mark_used_endpoint: base.join("mark-used")?,
            secret: secret.into(),
            http_client: super::http_client(),
        })
    }

    async fn post_signed<T: Signature>(
        &self,
        url: &Url,
        body: T,
    ) -> Result<reqwest::Response, LedgerError> {
        let signed = SignedObject::new(body, &self.secret)?;
        let response = self
            .http_client
            .post(url.clone())
            .header("Content-Type", "application/json")
            .header(SIGNATURE_HEADER, signed.to_header())
            .body(signed.json)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(LedgerError::Rejected {
                status: status.as_u16(),
                body,
            })
        }
    }
}

#[async_trait]
impl LedgerClient for HttpLedgerClient {
    #[tracing::instrument(skip(self), err)]
    async fn mint(&self, ticket_id: Uuid) -> Result<String, LedgerError> {
        let response = self
            .post_signed(&self.mint_endpoint, MintRequest { ticket_id })
            .await?;
        let minted: MintResponse = response.json().await?;
        Ok(minted.external_token_ref)
    }

    #[tracing::instrument(skip(self), err)]
    async fn mark_used(&self, external_token_ref: &str) -> Result<(), LedgerError> {
        self.post_signed(
            &self.mark_used_endpoint,
            MarkUsedRequest {
                external_token_ref: external_token_ref.to_string(),
            },
        )
        .await?;
        Ok(())
    }
}
