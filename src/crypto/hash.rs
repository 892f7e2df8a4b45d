// hash.rs
//
// Content hashing for the datastore wire format. The framed payload hash is
// the one fed into every signature; the framing is part of the protocol.

use sha2::{Digest, Sha256};

/// SHA-256 of raw bytes
pub fn sha256_bytes(data: &[u8]) -> [u8; 32] {
    let digest = Sha256::digest(data);
    digest.into()
}

/// SHA-256 of raw bytes, hex-encoded
///
/// # Arguments
/// * `data` - The data to hash
///
/// # Returns
/// * `String` - Lowercase hex digest
pub fn hash_raw_data(data: &[u8]) -> String {
    hex::encode(sha256_bytes(data))
}

/// Frame a payload as `len ":" payload ","`, with the length as ASCII
/// decimal bytes. Peers hash the identical framing.
pub fn frame_data_payload(data: &[u8]) -> Vec<u8> {
    let len_ascii = data.len().to_string();
    let mut framed = Vec::with_capacity(len_ascii.len() + data.len() + 2);
    framed.extend_from_slice(len_ascii.as_bytes());
    framed.push(b':');
    framed.extend_from_slice(data);
    framed.push(b',');
    framed
}

/// SHA-256 over the framed payload
pub fn hash_data_payload_bytes(data: &[u8]) -> [u8; 32] {
    sha256_bytes(&frame_data_payload(data))
}

/// SHA-256 over the framed payload, hex-encoded
pub fn hash_data_payload(data: &[u8]) -> String {
    hex::encode(hash_data_payload_bytes(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_format() {
        assert_eq!(frame_data_payload(b"hello world"), b"11:hello world,");
        assert_eq!(frame_data_payload(b""), b"0:,");
    }

    #[test]
    fn test_hash_data_payload_matches_manual_framing() {
        let data = b"hello world";
        let manual = hash_raw_data(b"11:hello world,");
        assert_eq!(hash_data_payload(data), manual);
    }

    #[test]
    fn test_hash_raw_data_known_vector() {
        // sha256("abc")
        assert_eq!(
            hash_raw_data(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_empty_payload_hashes() {
        // The empty payload still frames to "0:,"
        assert_eq!(hash_data_payload(b""), hash_raw_data(b"0:,"));
    }
}
