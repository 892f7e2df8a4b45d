// keys.rs
//
// secp256k1 key decoding and datastore-id derivation. A datastore id is the
// Base58Check address of the owning keypair and must match byte-for-byte
// across every client that derives it.

use k256::ecdsa::{SigningKey, VerifyingKey};
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use crate::error::{DatastoreError, Result};

/// P2PKH version byte prepended before Base58Check encoding
pub const ADDRESS_VERSION_BYTE: u8 = 0x00;

/// Decode a hex private key into a signing key.
///
/// Accepts the 32-byte raw scalar, or the 33-byte form carrying a trailing
/// 0x01 compressed-format marker, which is stripped before use.
pub fn decode_private_key(private_key_hex: &str) -> Result<SigningKey> {
    let mut raw = hex::decode(private_key_hex)
        .map_err(|e| DatastoreError::crypto(format!("Invalid private key hex: {e}")))?;

    if raw.len() == 33 && raw[32] == 0x01 {
        raw.truncate(32);
    }
    if raw.len() != 32 {
        raw.zeroize();
        return Err(DatastoreError::crypto(format!(
            "Invalid private key length: {} bytes",
            private_key_hex.len() / 2
        )));
    }

    let key = SigningKey::from_slice(&raw)
        .map_err(|e| DatastoreError::crypto(format!("Invalid private key scalar: {e}")));
    raw.zeroize();
    key
}

/// Generate a fresh random private key, hex-encoded
pub fn generate_private_key() -> String {
    let key = SigningKey::random(&mut rand::thread_rng());
    hex::encode(key.to_bytes())
}

/// Uncompressed public key (65 bytes, 0x04 || X || Y), hex-encoded.
/// This is the form fed into datastore-id derivation.
pub fn public_key_hex(key: &SigningKey) -> String {
    let point = key.verifying_key().to_encoded_point(false);
    hex::encode(point.as_bytes())
}

/// Parse a hex public key in any valid SEC1 encoding
pub fn decode_public_key(pubkey_hex: &str) -> Result<VerifyingKey> {
    let raw = hex::decode(pubkey_hex)
        .map_err(|e| DatastoreError::crypto(format!("Invalid public key hex: {e}")))?;
    VerifyingKey::from_sec1_bytes(&raw)
        .map_err(|e| DatastoreError::crypto(format!("Invalid public key: {e}")))
}

/// Base58Check address of a hex public key:
/// RIPEMD160(SHA256(pubkey-bytes)) behind the P2PKH version byte.
pub fn public_key_to_address(pubkey_hex: &str) -> Result<String> {
    let raw = hex::decode(pubkey_hex)
        .map_err(|e| DatastoreError::crypto(format!("Invalid public key hex: {e}")))?;
    let sha = Sha256::digest(&raw);
    let hash160 = Ripemd160::digest(sha);
    Ok(bs58::encode(hash160.as_slice())
        .with_check_version(ADDRESS_VERSION_BYTE)
        .into_string())
}

/// Datastore id for a hex public key
pub fn datastore_get_id(pubkey_hex: &str) -> Result<String> {
    public_key_to_address(pubkey_hex)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Well-known secp256k1 test scalar
    const PRIV_HEX: &str = "a5c61c6ca7b3e7e55edee68566aeab22e4da26baa285c7bd10e8d2218aa3b229";

    #[test]
    fn test_compressed_marker_is_stripped() {
        let plain = decode_private_key(PRIV_HEX).unwrap();
        let flagged = decode_private_key(&format!("{PRIV_HEX}01")).unwrap();
        assert_eq!(plain.to_bytes(), flagged.to_bytes());
    }

    #[test]
    fn test_bad_key_lengths_rejected() {
        assert!(decode_private_key("abcd").is_err());
        // 33 bytes without the 0x01 marker is not a valid key
        assert!(decode_private_key(&format!("{PRIV_HEX}02")).is_err());
        assert!(decode_private_key("not hex").is_err());
    }

    #[test]
    fn test_public_key_is_uncompressed() {
        let key = decode_private_key(PRIV_HEX).unwrap();
        let pubkey = public_key_hex(&key);
        assert_eq!(pubkey.len(), 130);
        assert!(pubkey.starts_with("04"));
        decode_public_key(&pubkey).unwrap();
    }

    #[test]
    fn test_address_is_deterministic() {
        let key = decode_private_key(PRIV_HEX).unwrap();
        let pubkey = public_key_hex(&key);
        let addr1 = public_key_to_address(&pubkey).unwrap();
        let addr2 = datastore_get_id(&pubkey).unwrap();
        assert_eq!(addr1, addr2);
        // Version byte 0x00 puts addresses in the leading-'1' Base58 range
        assert!(addr1.starts_with('1'));
        // Base58Check: version + hash160 + 4-byte checksum is 25 bytes
        let decoded = bs58::decode(&addr1)
            .with_check(Some(ADDRESS_VERSION_BYTE))
            .into_vec()
            .unwrap();
        assert_eq!(decoded.len(), 21);
    }

    #[test]
    fn test_generated_keys_round_trip() {
        let priv_hex = generate_private_key();
        let key = decode_private_key(&priv_hex).unwrap();
        assert_eq!(hex::encode(key.to_bytes()), priv_hex);
    }
}
