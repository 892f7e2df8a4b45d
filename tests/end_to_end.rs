// End-to-end scenarios against a live gateway.
//
// These tests need a storage gateway listening on localhost:6270 that
// accepts the test session below, so they are ignored by default:
//
//     cargo test -- --ignored

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use std::sync::Arc;

use datastore_client::config::ClientConfig;
use datastore_client::crypto::{datastore_get_id, decode_private_key, generate_private_key, public_key_hex};
use datastore_client::datastore::DatastoreClient;
use datastore_client::session::MemorySessionStore;
use datastore_client::{DatastoreError, MountOptions, ReplicationStrategy};

/// A writer-mode session token for a fresh keypair: the session's user id
/// is the datastore id, so mounts resolve in single-reader mode.
fn writer_session_token() -> String {
    let app_private_key = generate_private_key();
    let pubkey = public_key_hex(&decode_private_key(&app_private_key).unwrap());
    let datastore_id = datastore_get_id(&pubkey).unwrap();

    let payload = serde_json::json!({
        "api_endpoint": "http://localhost:6270",
        "app_domain": "https://files.app",
        "app_user_id": datastore_id,
        "blockchain_id": "alice.id",
        "device_id": "test-device",
        "app_private_key": app_private_key,
        "storage": {
            "classes": {
                "read_local": ["disk"],
                "write_local": ["disk"]
            },
            "preferences": {}
        }
    });
    let body = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&payload).unwrap());
    format!("eyJhbGciOiJFUzI1NksifQ.{body}.c2ln")
}

fn client() -> DatastoreClient {
    DatastoreClient::new(
        ClientConfig::default(),
        &writer_session_token(),
        Arc::new(MemorySessionStore::new()),
    )
    .unwrap()
}

fn local_strategy() -> ReplicationStrategy {
    ReplicationStrategy {
        local: 1,
        ..Default::default()
    }
}

#[tokio::test]
#[ignore = "needs a gateway on localhost:6270"]
async fn create_put_get_round_trip() {
    let client = client();

    client
        .put_file("/file1", b"hello world", &local_strategy())
        .await
        .unwrap();
    let bytes = client
        .get_file("/file1", &MountOptions::default())
        .await
        .unwrap();
    assert_eq!(bytes, b"hello world");
}

#[tokio::test]
#[ignore = "needs a gateway on localhost:6270"]
async fn mount_or_create_is_idempotent() {
    let client = client();

    let first = client
        .datastore_mount_or_create(&local_strategy())
        .await
        .unwrap();
    let second = client
        .datastore_mount_or_create(&local_strategy())
        .await
        .unwrap();

    assert_eq!(first.datastore_id, second.datastore_id);
    assert!(first.created);
    assert!(!second.created);
}

#[tokio::test]
#[ignore = "needs a gateway on localhost:6270"]
async fn delete_then_get_is_not_found() {
    let client = client();

    client.put_file("/f", b"x", &local_strategy()).await.unwrap();
    client
        .delete_file("/f", &MountOptions::default())
        .await
        .unwrap();

    let err = client
        .get_file("/f", &MountOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, DatastoreError::NotFound(_)));
}

#[tokio::test]
#[ignore = "needs a gateway on localhost:6270"]
async fn listing_names_both_files() {
    let client = client();

    client.put_file("/a", b"1", &local_strategy()).await.unwrap();
    client.put_file("/b", b"2", &local_strategy()).await.unwrap();

    let listing = client.list_files(&MountOptions::default()).await.unwrap();
    assert!(listing.contains_key("a"));
    assert!(listing.contains_key("b"));
}

#[tokio::test]
#[ignore = "needs a gateway on localhost:6270"]
async fn partial_create_flag_forces_recreate() {
    let client = client();

    client
        .datastore_mount_or_create(&local_strategy())
        .await
        .unwrap();

    // Force the retry state: mount must now claim absence, so the next
    // mount-or-create issues a fresh (idempotent) create and clears it
    client.datastore_create_set_retry().await.unwrap();
    assert!(client
        .datastore_mount(&MountOptions::default())
        .await
        .unwrap()
        .is_none());

    let ctx = client
        .datastore_mount_or_create(&local_strategy())
        .await
        .unwrap();
    assert!(ctx.created);

    // And the flag is gone
    assert!(client
        .datastore_mount(&MountOptions::default())
        .await
        .unwrap()
        .is_some());
}
