//! Body signing shared by the TrueTicket server and its collaborators.
//!
//! Payment and ledger callbacks, and the requests the server sends to those
//! collaborators, carry an HMAC-SHA256 signature in a header:
//!
//! ```text
//! TrueTicket-Signature: {unix_timestamp}.{base64_signature}
//! ```
//!
//! The signed message is `"{timestamp}.{json_body}"`.

/// Header name for the HMAC signature.
pub const SIGNATURE_HEADER: &str = "TrueTicket-Signature";

/// Header carrying the caller identity, as asserted by the upstream identity gateway.
pub const IDENTITY_HEADER: &str = "TrueTicket-Identity";

/// Header name for admin API authentication (plaintext secret).
pub const ADMIN_AUTH_HEADER: &str = "TrueTicket-Admin-Authorization";

/// Maximum allowed age of a signature (in seconds).
pub const MAX_SIGNATURE_AGE: i64 = 5 * 60;

/// Marker trait for types that can participate in body signing via
/// [`SignedObject`].
pub trait Signature: for<'de> serde::Deserialize<'de> + serde::Serialize {}

/// Errors produced by signature operations.
#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("invalid header format")]
    InvalidFormat,
    #[error("invalid base64 encoding")]
    InvalidBase64,
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid signature")]
    SignatureMismatch,
    #[error("signature expired")]
    Expired,
}

impl From<ring::error::Unspecified> for SignatureError {
    fn from(_: ring::error::Unspecified) -> Self {
        Self::SignatureMismatch
    }
}

/// Seconds a signature may be dated ahead of the verifier's clock.
const MAX_CLOCK_SKEW: i64 = 30;

fn mac(key: &[u8], timestamp: i64, json: &str) -> ring::hmac::Tag {
    let key = ring::hmac::Key::new(ring::hmac::HMAC_SHA256, key);
    ring::hmac::sign(&key, format!("{timestamp}.{json}").as_bytes())
}

/// The parsed value of a [`SIGNATURE_HEADER`]: `{timestamp}.{base64}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    pub timestamp: i64,
    pub mac: Box<[u8]>,
}

impl std::str::FromStr for SignatureHeader {
    type Err = SignatureError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (timestamp, encoded) = value
            .trim()
            .split_once('.')
            .ok_or(SignatureError::InvalidFormat)?;
        let timestamp = timestamp
            .parse()
            .map_err(|_| SignatureError::InvalidFormat)?;
        let mac = fast32::base64::RFC4648_NOPAD
            .decode_str(encoded)
            .map_err(|_| SignatureError::InvalidBase64)?
            .into_boxed_slice();
        Ok(Self { timestamp, mac })
    }
}

impl std::fmt::Display for SignatureHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{}",
            self.timestamp,
            fast32::base64::RFC4648_NOPAD.encode(&self.mac)
        )
    }
}

/// A JSON body together with the exact bytes that were signed.
///
/// The signature covers the raw JSON string, not a re-serialization of
/// `body`, so verification works on whatever the peer actually sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedObject<T: Signature> {
    pub body: T,
    pub timestamp: i64,
    pub json: String,
    pub signature: Box<[u8]>,
}

impl<T: Signature> SignedObject<T> {
    /// Sign `body` with the current time.
    pub fn new(body: T, key: &[u8]) -> Result<Self, serde_json::Error> {
        Self::new_at(body, key, time::OffsetDateTime::now_utc().unix_timestamp())
    }

    pub fn new_at(body: T, key: &[u8], timestamp: i64) -> Result<Self, serde_json::Error> {
        let json = serde_json::to_string(&body)?;
        let signature = mac(key, timestamp, &json).as_ref().into();
        Ok(Self {
            body,
            timestamp,
            json,
            signature,
        })
    }

    /// Parse the header and the body. The MAC is not checked until
    /// [`verify`](Self::verify).
    pub fn from_header_and_body(
        header_value: &str,
        body_json: String,
    ) -> Result<Self, SignatureError> {
        let header: SignatureHeader = header_value.parse()?;
        let body = serde_json::from_str(&body_json)?;
        Ok(Self {
            body,
            timestamp: header.timestamp,
            json: body_json,
            signature: header.mac,
        })
    }

    /// Check the MAC, then freshness against the current time.
    pub fn verify(self, key: &[u8]) -> Result<T, SignatureError> {
        self.verify_at(key, time::OffsetDateTime::now_utc().unix_timestamp())
    }

    pub fn verify_at(self, key: &[u8], now: i64) -> Result<T, SignatureError> {
        let key = ring::hmac::Key::new(ring::hmac::HMAC_SHA256, key);
        let message = format!("{}.{}", self.timestamp, self.json);
        ring::hmac::verify(&key, message.as_bytes(), &self.signature)?;

        let age = now - self.timestamp;
        if age > MAX_SIGNATURE_AGE || age < -MAX_CLOCK_SKEW {
            return Err(SignatureError::Expired);
        }
        Ok(self.body)
    }

    pub fn header(&self) -> SignatureHeader {
        SignatureHeader {
            timestamp: self.timestamp,
            mac: self.signature.clone(),
        }
    }

    /// The full [`SIGNATURE_HEADER`] value.
    pub fn to_header(&self) -> String {
        self.header().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::payment::PaymentCallback;

    const KEY: &[u8] = b"callback-secret";

    fn confirmed() -> PaymentCallback {
        PaymentCallback::Confirmed {
            correlation_id: "pay_123".to_string(),
        }
    }

    #[test]
    fn test_signed_callback_verifies() {
        let signed = SignedObject::new(confirmed(), KEY).unwrap();
        let parsed =
            SignedObject::<PaymentCallback>::from_header_and_body(&signed.to_header(), signed.json)
                .unwrap();
        assert_eq!(parsed.verify(KEY).unwrap(), confirmed());
    }

    #[test]
    fn test_tampered_body_is_rejected() {
        let signed = SignedObject::new(confirmed(), KEY).unwrap();
        let forged = signed.json.replace("pay_123", "pay_999");
        let parsed =
            SignedObject::<PaymentCallback>::from_header_and_body(&signed.to_header(), forged)
                .unwrap();
        assert!(matches!(
            parsed.verify(KEY),
            Err(SignatureError::SignatureMismatch)
        ));
    }

    #[test]
    fn test_wrong_key_is_rejected() {
        let signed = SignedObject::new(confirmed(), KEY).unwrap();
        assert!(matches!(
            signed.verify(b"other-secret"),
            Err(SignatureError::SignatureMismatch)
        ));
    }

    #[test]
    fn test_stale_signature_is_rejected() {
        let old = time::OffsetDateTime::now_utc().unix_timestamp() - MAX_SIGNATURE_AGE - 1;
        let signed = SignedObject::new_at(confirmed(), KEY, old).unwrap();
        assert!(matches!(signed.verify(KEY), Err(SignatureError::Expired)));
    }

    #[test]
    fn test_future_dated_signature_is_rejected() {
        let signed = SignedObject::new_at(confirmed(), KEY, 10_000).unwrap();
        let now = 10_000 - MAX_CLOCK_SKEW - 1;
        assert!(matches!(
            signed.verify_at(KEY, now),
            Err(SignatureError::Expired)
        ));

        let signed = SignedObject::new_at(confirmed(), KEY, 10_000).unwrap();
        assert_eq!(signed.verify_at(KEY, 10_000 - 5).unwrap(), confirmed());
    }

    #[test]
    fn test_header_parsing() {
        assert!(matches!(
            "no-dot".parse::<SignatureHeader>(),
            Err(SignatureError::InvalidFormat)
        ));
        assert!(matches!(
            "abc.AAAA".parse::<SignatureHeader>(),
            Err(SignatureError::InvalidFormat)
        ));
        assert!(matches!(
            "42.!!".parse::<SignatureHeader>(),
            Err(SignatureError::InvalidBase64)
        ));
        let header = SignatureHeader {
            timestamp: 42,
            mac: vec![1, 2, 3].into_boxed_slice(),
        };
        assert_eq!(header.to_string().parse::<SignatureHeader>().unwrap(), header);
    }
}
