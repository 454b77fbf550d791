//! Custom Axum extractors for request authentication.
//!
//! Provides:
//! - `Identity` - the caller id from the trusted `TrueTicket-Identity` header.
//! - `SignedBody<T>` - verifies the `TrueTicket-Signature` header against a
//!   collaborator's signed JSON body.
//! - `AdminAuth` - checks `TrueTicket-Admin-Authorization` against the
//!   argon2 hash of the admin secret.

use axum::{
    extract::{FromRequest, FromRequestParts, Request},
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use trueticket_sdk::objects::{MintConfirmation, PaymentCallback};
use trueticket_sdk::signature::{
    ADMIN_AUTH_HEADER, IDENTITY_HEADER, SIGNATURE_HEADER, Signature, SignatureError, SignedObject,
};

use super::reject;
use crate::state::{AppState, Collaborator};

const MAX_IDENTITY_LEN: usize = 256;
const MAX_SIGNED_BODY: usize = 64 * 1024;

/// The authenticated caller: a ticket holder, buyer or scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity(pub String);

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("missing TrueTicket-Identity header")]
    Missing,
    #[error("invalid TrueTicket-Identity header")]
    Invalid,
}

impl IntoResponse for IdentityError {
    fn into_response(self) -> Response {
        let status = match self {
            IdentityError::Missing => StatusCode::UNAUTHORIZED,
            IdentityError::Invalid => StatusCode::BAD_REQUEST,
        };
        reject(status, "unauthenticated", &self.to_string())
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Identity {
    type Rejection = IdentityError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(IDENTITY_HEADER)
            .ok_or(IdentityError::Missing)?
            .to_str()
            .map_err(|_| IdentityError::Invalid)?
            .trim();
        if value.is_empty() || value.len() > MAX_IDENTITY_LEN {
            return Err(IdentityError::Invalid);
        }
        Ok(Identity(value.to_string()))
    }
}

// ---------------------------------------------------------------------------
// SignedBody - collaborator authentication via signed JSON body
// ---------------------------------------------------------------------------

/// A body type sent by one specific collaborator.
pub trait SignedBy: Signature {
    const COLLABORATOR: Collaborator;
}

impl SignedBy for PaymentCallback {
    const COLLABORATOR: Collaborator = Collaborator::Payment;
}

impl SignedBy for MintConfirmation {
    const COLLABORATOR: Collaborator = Collaborator::Ledger;
}

/// Verifies the `TrueTicket-Signature` header and deserializes the
/// authenticated JSON body.
///
/// # Header format
///
/// ```text
/// TrueTicket-Signature: {unix_timestamp}.{base64_signature}
/// ```
///
/// The signature is `HMAC-SHA256("{timestamp}.{json_body}", collaborator_secret)`.
pub struct SignedBody<T: SignedBy>(pub T);

#[derive(Debug, thiserror::Error)]
pub enum SignedBodyError {
    #[error("missing TrueTicket-Signature header")]
    MissingHeader,
    #[error("invalid TrueTicket-Signature header format")]
    InvalidHeader,
    #[error("invalid signature encoding")]
    InvalidBase64,
    #[error("failed to read request body")]
    BodyReadError,
    #[error("invalid JSON body: {0}")]
    JsonError(serde_json::Error),
    #[error("signature verification failed")]
    VerificationFailed,
    #[error("signature expired")]
    Expired,
    #[error("collaborator is not configured")]
    NotConfigured,
}

impl From<SignatureError> for SignedBodyError {
    fn from(err: SignatureError) -> Self {
        match err {
            SignatureError::InvalidFormat => Self::InvalidHeader,
            SignatureError::InvalidBase64 => Self::InvalidBase64,
            SignatureError::Json(e) => Self::JsonError(e),
            SignatureError::SignatureMismatch => Self::VerificationFailed,
            SignatureError::Expired => Self::Expired,
        }
    }
}

impl IntoResponse for SignedBodyError {
    fn into_response(self) -> Response {
        let status = match self {
            SignedBodyError::MissingHeader
            | SignedBodyError::VerificationFailed
            | SignedBodyError::Expired => StatusCode::UNAUTHORIZED,
            SignedBodyError::InvalidHeader
            | SignedBodyError::InvalidBase64
            | SignedBodyError::BodyReadError
            | SignedBodyError::JsonError(_) => StatusCode::BAD_REQUEST,
            SignedBodyError::NotConfigured => StatusCode::NOT_FOUND,
        };
        if let SignedBodyError::JsonError(e) = &self {
            tracing::debug!(error = %e, "Rejected signed body");
        }
        reject(status, "bad_signature", &self.to_string())
    }
}

impl<T: SignedBy + Send> FromRequest<AppState> for SignedBody<T> {
    type Rejection = SignedBodyError;

    async fn from_request(req: Request, state: &AppState) -> Result<Self, Self::Rejection> {
        let header_value = req
            .headers()
            .get(SIGNATURE_HEADER)
            .ok_or(SignedBodyError::MissingHeader)?
            .to_str()
            .map_err(|_| SignedBodyError::InvalidHeader)?
            .to_owned();

        let body_bytes = axum::body::to_bytes(req.into_body(), MAX_SIGNED_BODY)
            .await
            .map_err(|_| SignedBodyError::BodyReadError)?;
        let json =
            String::from_utf8(body_bytes.to_vec()).map_err(|_| SignedBodyError::BodyReadError)?;

        let secret = state
            .collaborator_secret(T::COLLABORATOR)
            .await
            .ok_or(SignedBodyError::NotConfigured)?;
        let signed = SignedObject::<T>::from_header_and_body(&header_value, json)?;
        let verified_body = signed.verify(&secret)?;

        Ok(SignedBody(verified_body))
    }
}

// ---------------------------------------------------------------------------
// AdminAuth
// ---------------------------------------------------------------------------

/// Proof that the request carried the admin secret.
pub struct AdminAuth;

#[derive(Debug, thiserror::Error)]
pub enum AdminAuthError {
    #[error("missing TrueTicket-Admin-Authorization header")]
    Missing,
    #[error("invalid admin credentials")]
    Invalid,
}

impl IntoResponse for AdminAuthError {
    fn into_response(self) -> Response {
        reject(StatusCode::UNAUTHORIZED, "unauthorized", &self.to_string())
    }
}

impl FromRequestParts<AppState> for AdminAuth {
    type Rejection = AdminAuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let secret = parts
            .headers
            .get(ADMIN_AUTH_HEADER)
            .ok_or(AdminAuthError::Missing)?
            .to_str()
            .map_err(|_| AdminAuthError::Invalid)?
            .to_owned();

        let admin = state.config.admin.read().await.clone();
        // argon2 verification blocks for tens of milliseconds.
        let verified = tokio::task::spawn_blocking(move || admin.verify(&secret))
            .await
            .unwrap_or(false);
        if !verified {
            tracing::warn!("Rejected admin request with invalid credentials");
            return Err(AdminAuthError::Invalid);
        }
        Ok(AdminAuth)
    }
}
