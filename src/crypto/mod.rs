//! # Datastore Cryptography Module
//!
//! Cryptographic primitives for the datastore wire protocol:
//!
//! * secp256k1 keypair decoding and datastore-id (address) derivation
//! * Canonical payload framing and SHA-256 content hashing
//! * Deterministic low-S ECDSA signatures in the gateway's R||S base64 form
//! * Stable JSON serialization for everything that gets signed
//!
//! Every byte produced here is part of the protocol: peers recompute the
//! same hashes and signatures, so none of these encodings may drift.

pub mod hash;
pub mod keys;
pub mod signatures;
pub mod stable_json;

pub use hash::{hash_data_payload, hash_raw_data};
pub use keys::{datastore_get_id, decode_private_key, generate_private_key, public_key_hex};
pub use signatures::{sign_data_payload, sign_raw_data, verify_raw_data};
pub use stable_json::{stable_json, stable_stringify};
