//! Rotating check-in codes.
//!
//! A code is the base64 of a canonical byte encoding:
//!
//! ```text
//! u16 len | ticket_ref | u16 len | owner_ref | i64 issued_at | i64 expires_at | [u8; 16] nonce
//! ```
//!
//! Integers are big-endian and timestamps are unix seconds. The signature is
//! a keyed MAC over exactly those bytes, produced by an injected
//! [`CodeSigner`] so the key never enters the ticket store.

use ring::hmac;
use thiserror::Error;

const NONCE_LEN: usize = 16;
const MIN_KEY_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum SigningError {
    #[error("signing key is unavailable")]
    KeyUnavailable,
    #[error("signing key must be at least {MIN_KEY_LEN} bytes")]
    WeakKey,
    #[error("code field too long to encode")]
    FieldTooLong,
}

/// Signs and verifies check-in code payloads.
pub trait CodeSigner: Send + Sync {
    fn sign(&self, payload: &[u8]) -> Result<Vec<u8>, SigningError>;
    /// `Ok(false)` for a wrong signature; `Err` only when the key itself is
    /// unusable.
    fn verify(&self, payload: &[u8], signature: &[u8]) -> Result<bool, SigningError>;
}

/// HMAC-SHA256 with the platform signing key.
pub struct HmacCodeSigner {
    key: hmac::Key,
}

impl HmacCodeSigner {
    pub fn new(secret: &[u8]) -> Result<Self, SigningError> {
        if secret.is_empty() {
            return Err(SigningError::KeyUnavailable);
        }
        if secret.len() < MIN_KEY_LEN {
            return Err(SigningError::WeakKey);
        }
        Ok(Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, secret),
        })
    }
}

impl CodeSigner for HmacCodeSigner {
    fn sign(&self, payload: &[u8]) -> Result<Vec<u8>, SigningError> {
        Ok(hmac::sign(&self.key, payload).as_ref().to_vec())
    }

    fn verify(&self, payload: &[u8], signature: &[u8]) -> Result<bool, SigningError> {
        Ok(hmac::verify(&self.key, payload, signature).is_ok())
    }
}

/// Decoded contents of a check-in code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodePayload {
    pub ticket_ref: String,
    pub owner_ref: String,
    pub issued_at: i64,
    pub expires_at: i64,
    pub nonce: [u8; NONCE_LEN],
}

impl CodePayload {
    pub fn new(ticket_ref: String, owner_ref: String, issued_at: i64, expires_at: i64) -> Self {
        Self {
            ticket_ref,
            owner_ref,
            issued_at,
            expires_at,
            nonce: rand::random(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, SigningError> {
        let mut out = Vec::with_capacity(
            4 + self.ticket_ref.len() + self.owner_ref.len() + 16 + NONCE_LEN,
        );
        for field in [&self.ticket_ref, &self.owner_ref] {
            let len = u16::try_from(field.len()).map_err(|_| SigningError::FieldTooLong)?;
            out.extend_from_slice(&len.to_be_bytes());
            out.extend_from_slice(field.as_bytes());
        }
        out.extend_from_slice(&self.issued_at.to_be_bytes());
        out.extend_from_slice(&self.expires_at.to_be_bytes());
        out.extend_from_slice(&self.nonce);
        Ok(out)
    }

    /// `None` for anything that is not a well-formed encoding.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let mut reader = Reader { bytes };
        let ticket_ref = reader.string()?;
        let owner_ref = reader.string()?;
        let issued_at = i64::from_be_bytes(reader.array()?);
        let expires_at = i64::from_be_bytes(reader.array()?);
        let nonce = reader.array()?;
        if !reader.bytes.is_empty() {
            return None;
        }
        Some(Self {
            ticket_ref,
            owner_ref,
            issued_at,
            expires_at,
            nonce,
        })
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        if self.bytes.len() < n {
            return None;
        }
        let (head, tail) = self.bytes.split_at(n);
        self.bytes = tail;
        Some(head)
    }

    fn array<const N: usize>(&mut self) -> Option<[u8; N]> {
        self.take(N)?.try_into().ok()
    }

    fn string(&mut self) -> Option<String> {
        let len = u16::from_be_bytes(self.array()?);
        let raw = self.take(usize::from(len))?;
        String::from_utf8(raw.to_vec()).ok()
    }
}

pub fn encode(bytes: &[u8]) -> String {
    fast32::base64::RFC4648_NOPAD.encode(bytes)
}

pub fn decode(text: &str) -> Option<Vec<u8>> {
    fast32::base64::RFC4648_NOPAD.decode_str(text).ok()
}
