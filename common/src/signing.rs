//! HMAC signing and validation of agent link messages.
//!
//! A signed message has the form `timestamp|payload|signature`, where the
//! signature is the hex encoded HMAC-SHA256 of `timestamp|payload`. The payload
//! itself may contain `|`, so parsing splits on the first and the last separator.

use std::time::{SystemTime, UNIX_EPOCH};

use hmac::{Hmac, Mac as _};
use secrecy::{ExposeSecret as _, SecretString};
use sha2::Sha256;

/// Maximum clock skew, in seconds, accepted between signer and validator.
pub const ALLOWED_WINDOW: u64 = 30;

type HmacSha256 = Hmac<Sha256>;

fn keyed_mac(secret: &SecretString) -> HmacSha256 {
    // HMAC accepts keys of any length, so this cannot fail.
    match HmacSha256::new_from_slice(secret.expose_secret().as_bytes()) {
        Ok(mac) => mac,
        Err(_) => unreachable!("HMAC can take a key of any size"),
    }
}

/// Signs `message` and returns the hex encoded signature.
#[must_use]
pub fn sign_hmac(message: &str, secret: &SecretString) -> String {
    let mut mac = keyed_mac(secret);
    mac.update(message.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Wraps `payload` as `timestamp|payload|signature`.
#[must_use]
pub fn create_signed_message(payload: &str, secret: &SecretString) -> String {
    let message = format!("{}|{}", unix_time_seconds(), payload);
    let signature = sign_hmac(&message, secret);
    format!("{message}|{signature}")
}

/// Gets the current Unix timestamp in seconds.
///
/// A clock set before the epoch reads as 0, which every validator then rejects
/// as out of window.
#[must_use]
pub fn unix_time_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs())
}

/// A signed message split into its parts, before any verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedParts<'msg> {
    pub timestamp: u64,
    pub payload: &'msg str,
    pub signature: &'msg str,
}

/// Splits a signed message. Returns `None` if the framing is broken.
#[must_use]
pub fn parse_hmac_message(data: &str) -> Option<SignedParts<'_>> {
    let (timestamp, rest) = data.split_once('|')?;
    let (payload, signature) = rest.rsplit_once('|')?;
    Some(SignedParts {
        timestamp: timestamp.trim().parse().ok()?,
        payload,
        signature: signature.trim(),
    })
}

/// Outcome of validating a signed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HmacValidationResult {
    /// Signature and timestamp check out; carries the payload.
    Valid(String),
    InvalidTimestamp,
    InvalidHmac,
    MalformedMessage,
}

#[must_use]
pub fn is_timestamp_in_valid_range(timestamp: u64) -> bool {
    unix_time_seconds().abs_diff(timestamp) <= ALLOWED_WINDOW
}

/// Verifies framing, timestamp window and signature, in that order.
///
/// The signature comparison is constant time.
#[must_use]
pub fn validate_hmac_message(data: &str, secret: &SecretString) -> HmacValidationResult {
    let Some(parts) = parse_hmac_message(data) else {
        return HmacValidationResult::MalformedMessage;
    };
    if !is_timestamp_in_valid_range(parts.timestamp) {
        return HmacValidationResult::InvalidTimestamp;
    }
    let Ok(received) = hex::decode(parts.signature) else {
        return HmacValidationResult::InvalidHmac;
    };

    let mut mac = keyed_mac(secret);
    mac.update(format!("{}|{}", parts.timestamp, parts.payload).as_bytes());
    match mac.verify_slice(&received) {
        Ok(()) => HmacValidationResult::Valid(parts.payload.to_owned()),
        Err(_) => HmacValidationResult::InvalidHmac,
    }
}
