//! Webhook signature verification over the raw request body.
//!
//! Two schemes are supported: Stripe's `Stripe-Signature` header (hex
//! HMAC-SHA256 over `"{t}.{body}"`) and Svix's three-header scheme used by the
//! identity provider (base64 HMAC-SHA256 over `"{id}.{timestamp}.{body}"`).

use {
    crate::domain::{error::VerificationError, event::VerifiedPayload},
    base64::{Engine, engine::general_purpose::STANDARD},
    chrono::Utc,
    hmac::{Hmac, Mac},
    sha2::Sha256,
    subtle::ConstantTimeEq,
};

type HmacSha256 = Hmac<Sha256>;

pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

pub const STRIPE_SIGNATURE_HEADER: &str = "Stripe-Signature";
pub const SVIX_ID_HEADER: &str = "svix-id";
pub const SVIX_TIMESTAMP_HEADER: &str = "svix-timestamp";
pub const SVIX_SIGNATURE_HEADER: &str = "svix-signature";

/// `timestamp` comes from the header before any signature is checked, so the
/// distance is computed without overflow.
fn check_timestamp(timestamp: i64, now: i64, tolerance: i64) -> Result<(), VerificationError> {
    let within = now
        .checked_sub(timestamp)
        .map(i64::unsigned_abs)
        .is_some_and(|skew| skew <= tolerance.unsigned_abs());
    if !within {
        return Err(VerificationError::TimestampOutOfRange);
    }
    Ok(())
}

fn mac_for(key: &[u8], parts: &[&[u8]]) -> Result<HmacSha256, VerificationError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|_| VerificationError::MalformedHeader("unusable signing key".into()))?;
    for part in parts {
        mac.update(part);
    }
    Ok(mac)
}

/// Parsed `Stripe-Signature` header: `t=<unix>,v1=<hex>[,v1=..][,v0=..]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StripeSignatureHeader {
    pub timestamp: i64,
    pub v1_signatures: Vec<Vec<u8>>,
}

impl StripeSignatureHeader {
    pub fn parse(header: &str) -> Result<Self, VerificationError> {
        let mut timestamp = None;
        let mut v1_signatures = Vec::new();

        for part in header.split(',') {
            let Some((key, value)) = part.trim().split_once('=') else {
                continue;
            };
            match key {
                "t" => {
                    timestamp = Some(value.parse::<i64>().map_err(|_| {
                        VerificationError::MalformedHeader("invalid timestamp".into())
                    })?);
                }
                // Undecodable entries can never match; skip them so one bad
                // entry does not hide a good one.
                "v1" => {
                    if let Ok(sig) = hex::decode(value) {
                        v1_signatures.push(sig);
                    }
                }
                _ => {}
            }
        }

        let timestamp = timestamp
            .ok_or_else(|| VerificationError::MalformedHeader("missing timestamp".into()))?;
        if v1_signatures.is_empty() {
            return Err(VerificationError::MalformedHeader(
                "no v1 signature".into(),
            ));
        }

        Ok(Self {
            timestamp,
            v1_signatures,
        })
    }
}

pub struct StripeSignatureVerifier {
    secret: Vec<u8>,
    tolerance_secs: i64,
}

impl std::fmt::Debug for StripeSignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeSignatureVerifier")
            .field("tolerance_secs", &self.tolerance_secs)
            .finish_non_exhaustive()
    }
}

impl StripeSignatureVerifier {
    /// Fails closed: an empty secret is `NotConfigured`, never "skip checks".
    pub fn new(secret: &str, tolerance_secs: i64) -> Result<Self, VerificationError> {
        if secret.trim().is_empty() {
            return Err(VerificationError::NotConfigured);
        }
        Ok(Self {
            secret: secret.as_bytes().to_vec(),
            tolerance_secs,
        })
    }

    pub fn verify(
        &self,
        body: &[u8],
        signature_header: Option<&str>,
    ) -> Result<VerifiedPayload, VerificationError> {
        self.verify_at(body, signature_header, Utc::now().timestamp())
    }

    pub fn verify_at(
        &self,
        body: &[u8],
        signature_header: Option<&str>,
        now: i64,
    ) -> Result<VerifiedPayload, VerificationError> {
        let header = signature_header
            .ok_or(VerificationError::MissingHeader(STRIPE_SIGNATURE_HEADER))?;
        let header = StripeSignatureHeader::parse(header)?;
        check_timestamp(header.timestamp, now, self.tolerance_secs)?;

        let timestamp = header.timestamp.to_string();
        let expected = mac_for(&self.secret, &[timestamp.as_bytes(), &b"."[..], body])?
            .finalize()
            .into_bytes();

        let matched = header
            .v1_signatures
            .iter()
            .any(|candidate| bool::from(expected.as_slice().ct_eq(candidate)));
        if !matched {
            return Err(VerificationError::InvalidSignature);
        }

        Ok(VerifiedPayload::new(body))
    }

    /// Builds a header value for `body`, in the format Stripe sends.
    pub fn sign(&self, body: &[u8], timestamp: i64) -> Result<String, VerificationError> {
        let ts = timestamp.to_string();
        let sig = mac_for(&self.secret, &[ts.as_bytes(), &b"."[..], body])?
            .finalize()
            .into_bytes();
        Ok(format!("t={ts},v1={}", hex::encode(sig)))
    }
}

/// Header values for the Svix scheme.
#[derive(Debug, Clone, Copy, Default)]
pub struct SvixHeaders<'a> {
    pub id: Option<&'a str>,
    pub timestamp: Option<&'a str>,
    pub signature: Option<&'a str>,
}

pub struct SvixSignatureVerifier {
    key: Vec<u8>,
    tolerance_secs: i64,
}

impl std::fmt::Debug for SvixSignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SvixSignatureVerifier")
            .field("tolerance_secs", &self.tolerance_secs)
            .finish_non_exhaustive()
    }
}

impl SvixSignatureVerifier {
    /// Accepts `whsec_<base64>` or the bare base64 key.
    pub fn new(secret: &str, tolerance_secs: i64) -> Result<Self, VerificationError> {
        let secret = secret.trim();
        if secret.is_empty() {
            return Err(VerificationError::NotConfigured);
        }
        let encoded = secret.strip_prefix("whsec_").unwrap_or(secret);
        let key = STANDARD
            .decode(encoded)
            .ok()
            .filter(|key| !key.is_empty())
            .ok_or(VerificationError::NotConfigured)?;
        Ok(Self {
            key,
            tolerance_secs,
        })
    }

    pub fn verify(
        &self,
        body: &[u8],
        headers: SvixHeaders<'_>,
    ) -> Result<VerifiedPayload, VerificationError> {
        self.verify_at(body, headers, Utc::now().timestamp())
    }

    pub fn verify_at(
        &self,
        body: &[u8],
        headers: SvixHeaders<'_>,
        now: i64,
    ) -> Result<VerifiedPayload, VerificationError> {
        let id = headers
            .id
            .ok_or(VerificationError::MissingHeader(SVIX_ID_HEADER))?;
        let raw_ts = headers
            .timestamp
            .ok_or(VerificationError::MissingHeader(SVIX_TIMESTAMP_HEADER))?;
        let signatures = headers
            .signature
            .ok_or(VerificationError::MissingHeader(SVIX_SIGNATURE_HEADER))?;

        let timestamp = raw_ts
            .trim()
            .parse::<i64>()
            .map_err(|_| VerificationError::MalformedHeader("invalid svix-timestamp".into()))?;
        check_timestamp(timestamp, now, self.tolerance_secs)?;

        let expected = mac_for(
            &self.key,
            &[id.as_bytes(), &b"."[..], raw_ts.trim().as_bytes(), &b"."[..], body],
        )?
        .finalize()
        .into_bytes();

        let matched = signatures
            .split_whitespace()
            .filter_map(|entry| entry.split_once(','))
            .filter(|(version, _)| *version == "v1")
            .filter_map(|(_, sig)| STANDARD.decode(sig).ok())
            .any(|candidate| bool::from(expected.as_slice().ct_eq(&candidate)));
        if !matched {
            return Err(VerificationError::InvalidSignature);
        }

        Ok(VerifiedPayload::new(body))
    }

    /// Returns the `svix-signature` value for `body`.
    pub fn sign(&self, id: &str, timestamp: i64, body: &[u8]) -> Result<String, VerificationError> {
        let ts = timestamp.to_string();
        let sig = mac_for(&self.key, &[id.as_bytes(), &b"."[..], ts.as_bytes(), &b"."[..], body])?
            .finalize()
            .into_bytes();
        Ok(format!("v1,{}", STANDARD.encode(sig)))
    }
}
