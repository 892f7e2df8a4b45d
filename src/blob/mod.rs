//! Blob layer: the mutable-data envelope and signed tombstones.
//!
//! Every mutable object travels as a signed stable-JSON envelope of
//! `{fq_data_id, data, version, timestamp}`. The fully-qualified data id
//! namespaces data per writing device; tombstones are the signed delete
//! markers the gateway accepts in place of data.

use serde::{Deserialize, Serialize};

use crate::crypto::signatures;
use crate::error::Result;
use crate::types::now_ms;

/// Envelope version. Constant by convention; device-root timestamps carry
/// ordering.
pub const MUTABLE_DATA_VERSION: u64 = 1;

/// The byte sequence actually signed and transmitted for every mutable
/// object
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DataInfo {
    pub fq_data_id: String,
    pub data: String,
    pub version: u64,
    pub timestamp: u64,
}

/// Percent-encode with JS `escape` semantics: letters, digits, and
/// `@ * _ + - . /` pass through; every other byte becomes `%XX`.
pub(crate) fn js_escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z'
            | b'a'..=b'z'
            | b'0'..=b'9'
            | b'@'
            | b'*'
            | b'_'
            | b'+'
            | b'-'
            | b'.'
            | b'/' => out.push(byte as char),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

/// Device-scoped, percent-encoded data id: `device_id ":" data_id`, with
/// every `/` in `data_id` first rewritten to the literal sequence `\x2f`.
pub fn make_fully_qualified_data_id(device_id: &str, data_id: &str) -> String {
    let escaped_id = data_id.replace('/', "\\x2f");
    js_escape(&format!("{device_id}:{escaped_id}"))
}

/// Wrap a named payload in the mutable-data envelope.
///
/// `version` stays at 1 here; monotonicity lives in the device-root
/// timestamp.
pub fn make_data_info(
    data_id: &str,
    data_payload: &str,
    device_id: &str,
    fq_data_id: Option<String>,
) -> DataInfo {
    let fq_data_id =
        fq_data_id.unwrap_or_else(|| make_fully_qualified_data_id(device_id, data_id));
    DataInfo {
        fq_data_id,
        data: data_payload.to_string(),
        version: MUTABLE_DATA_VERSION,
        timestamp: now_ms(),
    }
}

/// Unsigned tombstone for a fully-qualified data id
pub fn make_data_tombstone(fq_data_id: &str) -> String {
    format!("delete-{}:{}", now_ms(), fq_data_id)
}

/// One tombstone per device for a shared data id
pub fn make_data_tombstones(device_ids: &[String], data_id: &str) -> Vec<String> {
    device_ids
        .iter()
        .map(|device_id| make_data_tombstone(&make_fully_qualified_data_id(device_id, data_id)))
        .collect()
}

/// Append the payload signature, colon-separated
pub fn sign_data_tombstone(tombstone: &str, private_key_hex: &str) -> Result<String> {
    let signature = signatures::sign_data_payload(tombstone, private_key_hex)?;
    Ok(format!("{tombstone}:{signature}"))
}

/// Extract `(timestamp, fq_data_id)` from an unsigned tombstone. Accepts
/// second- or millisecond-resolution timestamps. A non-matching string
/// yields `None`, never a panic.
pub fn parse_data_tombstone(tombstone: &str) -> Option<(u64, String)> {
    let rest = tombstone.strip_prefix("delete-")?;
    let (timestamp, fq_data_id) = rest.split_once(':')?;
    let timestamp = timestamp.parse::<u64>().ok()?;
    if fq_data_id.is_empty() {
        return None;
    }
    Some((timestamp, fq_data_id.to_string()))
}

/// Split a signed tombstone into its payload and base64 signature
pub fn parse_signed_data_tombstone(tombstone: &str) -> Option<(String, String)> {
    let (payload, signature) = tombstone.rsplit_once(':')?;
    // The payload must itself still parse as a tombstone
    parse_data_tombstone(payload)?;
    if signature.is_empty() {
        return None;
    }
    Some((payload.to_string(), signature.to_string()))
}
