use async_trait::async_trait;
use thiserror::Error;
use trueticket_sdk::objects::{PaymentInitiation, PaymentRedirect};
use trueticket_sdk::signature::{SIGNATURE_HEADER, SignedObject};
use url::Url;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("payment collaborator answered {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("payload serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid endpoint: {0}")]
    Endpoint(#[from] url::ParseError),
}

/// Starts collecting money for a purchase. Confirmation arrives later as a
/// callback.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn initiate(&self, request: PaymentInitiation) -> Result<PaymentRedirect, GatewayError>;
}

/// Posts a signed [`PaymentInitiation`] to `{base}/checkouts`.
pub struct HttpPaymentGateway {
    endpoint: Url,
    secret: Box<[u8]>,
    http_client: reqwest::Client,
}

impl HttpPaymentGateway {
    pub fn new(base: &Url, secret: impl Into<Box<[u8]>>) -> Result<Self, GatewayError> {
        Ok(Self {
            endpoint: base.join("checkouts")?,
            secret: secret.into(),
            http_client: super::http_client(),
        })
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    #[tracing::instrument(skip_all, err, fields(correlation_id = %request.correlation_id))]
    async fn initiate(&self, request: PaymentInitiation) -> Result<PaymentRedirect, GatewayError> {
        let signed = SignedObject::new(request, &self.secret)?;
        let response = self
            .http_client
            .post(self.endpoint.clone())
            .header("Content-Type", "application/json")
            .header(SIGNATURE_HEADER, signed.to_header())
            .body(signed.json)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json::<PaymentRedirect>().await?)
    }
}
