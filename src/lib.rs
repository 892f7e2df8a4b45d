// Datastore Client
//
// This crate implements the client side of a content-addressed, multi-device,
// multi-reader personal datastore served by a remote storage gateway. Each
// datastore belongs to a secp256k1 keypair; its contents are a flat namespace
// of named files whose authoritative metadata lives in per-device "device
// root" directory pages, with the bulk data replicated through storage
// drivers chosen by a replication policy.
//
// # Architecture
//
// The client is built around a protocol core whose bytes must match every
// other implementation exactly:
//
// * **Crypto & Encoding**: canonical payload framing, low-S ECDSA signing,
//   stable JSON, datastore-id derivation
// * **Blob Layer**: the mutable-data envelope and signed tombstones
// * **Inode Model**: pure device-root page transformations
// * **Replication Policy**: driver selection over capability classes
// * **Session & Gateway**: durable mount cache and typed HTTP bindings
// * **Lifecycle & Files**: create/mount state machines and the file API
//
// # Usage
//
// ```rust,no_run
// use datastore_client::config::ClientConfig;
// use datastore_client::datastore::DatastoreClient;
// use datastore_client::policy::ReplicationStrategy;
// use datastore_client::session::MemorySessionStore;
// use std::sync::Arc;
//
// async fn example(session_token: &str) -> Result<(), Box<dyn std::error::Error>> {
//     let client = DatastoreClient::new(
//         ClientConfig::default(),
//         session_token,
//         Arc::new(MemorySessionStore::new()),
//     )?;
//
//     let strategy = ReplicationStrategy { local: 1, ..Default::default() };
//     client.put_file("/file1", b"hello world", &strategy).await?;
//     let bytes = client.get_file("/file1", &Default::default()).await?;
//     assert_eq!(bytes, b"hello world");
//
//     Ok(())
// }
// ```
//
// # Modules Overview

/// Blob layer for the datastore client.
///
/// Wraps named payloads in the mutable-data envelope the gateway signs and
/// verifies, derives fully-qualified (device-scoped, percent-encoded) data
/// ids, and produces and parses signed tombstones.
pub mod blob;

/// Client configuration.
///
/// Gateway endpoint and session-store settings, loaded from TOML files or
/// the environment.
pub mod config;

/// Cryptographic primitives for the datastore client.
///
/// secp256k1 key handling and datastore-id derivation, canonical payload
/// hashing, deterministic low-S ECDSA signatures, and the stable JSON
/// serialization everything signed runs through.
///
/// # Features
///
/// * Private keys with or without the trailing compressed-format marker
/// * Uncompressed public keys and Base58Check datastore ids
/// * `len:payload,` framed SHA-256 content hashing
/// * R || S base64 signature encoding with fixed 32-byte components
pub mod crypto;

/// Datastore lifecycle and file operations.
///
/// The create/delete request builders, the mount and mount-or-create state
/// machines with partial-failure recovery, and the file API composed on
/// top of them.
///
/// # Features
///
/// * Byte-exact signed create bundles for `POST /v1/stores`
/// * Mount contexts cached per (owner, app) in the durable session store
/// * Partial-create flags forcing idempotent create retries
/// * `put_file` / `get_file` / `delete_file` / `list_files` / `get_file_urls`
pub mod datastore;

/// Error types for the datastore client.
///
/// A single error enum covering the stable wire-independent taxonomy
/// (NotFound, Exists, Permission, Access, Invalid, RemoteIo, ...) plus the
/// ambient kinds, with POSIX errno names and the inbound status-code
/// mapping.
pub mod error;

/// Gateway API bindings.
///
/// One HTTP request helper owning auth, the status-to-error mapping, and
/// response schema validation, with typed wrappers for every gateway
/// endpoint.
pub mod gateway;

/// Device-root page model.
///
/// The per-device directory page and its pure transformations: insert,
/// remove (tombstone), lookup, and envelope serialization. Timestamps are
/// strictly monotonic per (device, root_uuid).
pub mod inode;

/// Logging setup helper.
pub mod logging;

/// Replication policy.
///
/// Storage capability classes, concern-to-count replication strategies,
/// and the greedy driver selection over the stable driver enumeration.
pub mod policy;

/// Schema registry.
///
/// Declarative validators for every wire structure; the only place the
/// higher layers learn what the gateway accepts.
pub mod schema;

/// Session and mount cache.
///
/// Session-token decoding and the durable whole-blob session store holding
/// cached mount contexts, partial-create flags, and the device-root
/// version map.
pub mod session;

/// Common types used throughout the datastore client.
pub mod types;

// Re-export commonly used types for convenience
pub use datastore::{DatastoreClient, MountOptions};
pub use error::{DatastoreError, Result};
pub use policy::ReplicationStrategy;
pub use types::{DatastoreDescriptor, DatastoreKind, DevicePublicKey, MountContext};
