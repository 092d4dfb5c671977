//! Request validation utilities for the rack agent.
//!
//! Parses and validates incoming HMAC-signed requests from the region.

use core::str;

use metalfleet_common::{HmacValidationResult, RackRequest, validate_hmac_message};
use secrecy::SecretString;

/// Checks the signature of `data` and decodes the JSON request it carries.
///
/// # Errors
///
/// Returns a short reason for responses when the bytes aren't UTF-8, the
/// signature or timestamp is off, or the payload isn't a request.
pub fn validate_request(data: &[u8], secret: &SecretString) -> Result<RackRequest, &'static str> {
    let Ok(data_str) = str::from_utf8(data) else {
        return Err("Invalid UTF-8");
    };

    match validate_hmac_message(data_str, secret) {
        HmacValidationResult::Valid(payload) => {
            miniserde::json::from_str(&payload).map_err(|_| "Invalid request payload")
        }
        HmacValidationResult::InvalidTimestamp => Err("Timestamp out of range"),
        HmacValidationResult::InvalidHmac => Err("Invalid HMAC signature"),
        HmacValidationResult::MalformedMessage => Err("Invalid request format"),
    }
}
