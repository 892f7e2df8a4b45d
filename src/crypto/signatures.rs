// signatures.rs
//
// Deterministic ECDSA over secp256k1 in the gateway's wire form: low-S
// signatures encoded as R || S with each component left-zero-padded to
// 32 bytes, then base64. Any other encoding is rejected by peers.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use k256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use k256::ecdsa::Signature;

use crate::crypto::hash;
use crate::crypto::keys;
use crate::error::{DatastoreError, Result};

/// Sign a precomputed SHA-256 digest.
///
/// RFC 6979 deterministic nonces, normalized to the canonical low-S form.
/// The fixed-size R || S serialization keeps each component zero-padded to
/// 32 bytes.
pub fn sign_hash(digest: &[u8; 32], private_key_hex: &str) -> Result<String> {
    let key = keys::decode_private_key(private_key_hex)?;
    let signature: Signature = key
        .sign_prehash(digest)
        .map_err(|e| DatastoreError::crypto(format!("Signing failed: {e}")))?;
    let signature = signature.normalize_s().unwrap_or(signature);
    Ok(BASE64.encode(signature.to_bytes()))
}

/// Sign raw bytes: SHA-256, then ECDSA
pub fn sign_raw_data(data: &[u8], private_key_hex: &str) -> Result<String> {
    sign_hash(&hash::sha256_bytes(data), private_key_hex)
}

/// Sign a payload string under the canonical `len:payload,` framing
pub fn sign_data_payload(payload: &str, private_key_hex: &str) -> Result<String> {
    sign_hash(
        &hash::hash_data_payload_bytes(payload.as_bytes()),
        private_key_hex,
    )
}

/// Verify an R || S base64 signature over raw bytes
pub fn verify_raw_data(data: &[u8], pubkey_hex: &str, signature_b64: &str) -> Result<bool> {
    verify_hash(&hash::sha256_bytes(data), pubkey_hex, signature_b64)
}

/// Verify a framed-payload signature
pub fn verify_data_payload(payload: &str, pubkey_hex: &str, signature_b64: &str) -> Result<bool> {
    verify_hash(
        &hash::hash_data_payload_bytes(payload.as_bytes()),
        pubkey_hex,
        signature_b64,
    )
}

fn verify_hash(digest: &[u8; 32], pubkey_hex: &str, signature_b64: &str) -> Result<bool> {
    let raw = BASE64
        .decode(signature_b64)
        .map_err(|e| DatastoreError::crypto(format!("Invalid signature base64: {e}")))?;
    if raw.len() != 64 {
        return Err(DatastoreError::crypto(format!(
            "Invalid signature length: {} bytes",
            raw.len()
        )));
    }
    let signature = Signature::from_slice(&raw)
        .map_err(|e| DatastoreError::crypto(format!("Invalid signature: {e}")))?;
    let signature = signature.normalize_s().unwrap_or(signature);
    let key = keys::decode_public_key(pubkey_hex)?;
    Ok(key.verify_prehash(digest, &signature).is_ok())
}
