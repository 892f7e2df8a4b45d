//! Session and mount cache.
//!
//! The per-(user, app) mount context, the partial-create failure flags, and
//! the device-root version map all live in one durable key-value blob,
//! mirroring the single well-known local-storage entry the gateway clients
//! share. Writes are read-modify-write on the whole blob; two concurrent
//! writers are not supported.

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::debug;

use crate::error::{DatastoreError, Result};
use crate::policy::DriverClassification;
use crate::types::MountContext;

/// Storage capabilities advertised by the gateway session: driver
/// classification plus per-app driver preferences
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SessionStorage {
    #[serde(default)]
    pub classes: DriverClassification,

    #[serde(default)]
    pub preferences: BTreeMap<String, Vec<String>>,
}

/// Claims of a gateway session token. The token is decoded, not verified;
/// the gateway checks the signature on every request it authenticates.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GatewaySession {
    #[serde(default)]
    pub api_endpoint: Option<String>,

    #[serde(default)]
    pub app_domain: Option<String>,

    #[serde(default)]
    pub app_user_id: Option<String>,

    #[serde(default)]
    pub blockchain_id: Option<String>,

    #[serde(default)]
    pub device_id: Option<String>,

    #[serde(default)]
    pub app_private_key: Option<String>,

    #[serde(default)]
    pub storage: SessionStorage,
}

impl GatewaySession {
    /// Application name: the app domain with any scheme prefix stripped
    pub fn app_name(&self) -> Option<String> {
        self.app_domain.as_ref().map(|domain| {
            domain
                .trim_start_matches("https://")
                .trim_start_matches("http://")
                .trim_end_matches('/')
                .to_string()
        })
    }
}

/// Decode a JWT's payload segment without verifying its signature
pub fn decode_jwt_payload(token: &str) -> Result<serde_json::Value> {
    let payload = token
        .split('.')
        .nth(1)
        .ok_or_else(|| DatastoreError::Invalid("Malformed token".to_string()))?;
    let raw = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| DatastoreError::Invalid(format!("Invalid token base64: {e}")))?;
    serde_json::from_slice(&raw)
        .map_err(|e| DatastoreError::Invalid(format!("Invalid token payload: {e}")))
}

/// Decode the payload segment of a session token JWT
pub fn decode_session_token(token: &str) -> Result<GatewaySession> {
    let value = decode_jwt_payload(token)?;
    serde_json::from_value(value)
        .map_err(|e| DatastoreError::Invalid(format!("Invalid session token payload: {e}")))
}

/// The whole durable blob, as persisted under the well-known storage key
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SessionData {
    #[serde(rename = "coreSessionToken", default, skip_serializing_if = "Option::is_none")]
    pub core_session_token: Option<String>,

    #[serde(rename = "appPrivateKey", default, skip_serializing_if = "Option::is_none")]
    pub app_private_key: Option<String>,

    /// `<owner>/<app>` -> cached mount context
    #[serde(default)]
    pub datastore_contexts: BTreeMap<String, MountContext>,

    /// `<blockchain_id>/<app>` -> true while a create's outcome is unknown
    #[serde(default)]
    pub partial_create_failures: BTreeMap<String, bool>,

    /// `<datastore_id>.<root_uuid>.<device_id>` -> last observed root
    /// timestamp
    #[serde(default)]
    pub device_root_versions: BTreeMap<String, u64>,
}

/// Durable whole-blob storage for `SessionData`
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self) -> Result<SessionData>;
    async fn save(&self, data: &SessionData) -> Result<()>;
}

/// In-memory session store, for tests and ephemeral processes
#[derive(Default)]
pub struct MemorySessionStore {
    data: RwLock<SessionData>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self) -> Result<SessionData> {
        Ok(self.data.read().clone())
    }

    async fn save(&self, data: &SessionData) -> Result<()> {
        *self.data.write() = data.clone();
        Ok(())
    }
}

/// File-backed session store: one JSON blob, rewritten whole on each save
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn load(&self) -> Result<SessionData> {
        match tokio::fs::read(&self.path).await {
            Ok(raw) => serde_json::from_slice(&raw)
                .map_err(|e| DatastoreError::storage(format!("Corrupt session blob: {e}"))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(SessionData::default()),
            Err(e) => Err(DatastoreError::storage(format!(
                "Failed to read session blob: {e}"
            ))),
        }
    }

    async fn save(&self, data: &SessionData) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DatastoreError::storage(format!("Failed to create {parent:?}: {e}")))?;
        }
        let raw = serde_json::to_vec_pretty(data)?;
        tokio::fs::write(&self.path, raw)
            .await
            .map_err(|e| DatastoreError::storage(format!("Failed to write session blob: {e}")))
    }
}

/// Read-modify-write helpers over a session store
pub struct SessionCache {
    store: std::sync::Arc<dyn SessionStore>,
}

impl SessionCache {
    pub fn new(store: std::sync::Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    fn context_key(owner: &str, app_name: &str) -> String {
        format!("{owner}/{app_name}")
    }

    fn version_key(datastore_id: &str, root_uuid: &str, device_id: &str) -> String {
        format!("{datastore_id}.{root_uuid}.{device_id}")
    }

    pub async fn get_mount_context(
        &self,
        owner: &str,
        app_name: &str,
    ) -> Result<Option<MountContext>> {
        let data = self.store.load().await?;
        Ok(data
            .datastore_contexts
            .get(&Self::context_key(owner, app_name))
            .cloned())
    }

    pub async fn put_mount_context(&self, ctx: &MountContext) -> Result<()> {
        let mut data = self.store.load().await?;
        debug!(key = %ctx.cache_key(), datastore_id = %ctx.datastore_id, "caching mount context");
        data.datastore_contexts.insert(ctx.cache_key(), ctx.clone());
        self.store.save(&data).await
    }

    pub async fn delete_mount_context(&self, owner: &str, app_name: &str) -> Result<()> {
        let mut data = self.store.load().await?;
        data.datastore_contexts
            .remove(&Self::context_key(owner, app_name));
        self.store.save(&data).await
    }

    /// Whether a create for `(blockchain_id, app)` is pending retry
    pub async fn partial_create_failure(&self, owner: &str, app_name: &str) -> Result<bool> {
        let data = self.store.load().await?;
        Ok(data
            .partial_create_failures
            .get(&Self::context_key(owner, app_name))
            .copied()
            .unwrap_or(false))
    }

    pub async fn set_partial_create_failure(&self, owner: &str, app_name: &str) -> Result<()> {
        let mut data = self.store.load().await?;
        debug!(owner, app_name, "recording partial datastore create");
        data.partial_create_failures
            .insert(Self::context_key(owner, app_name), true);
        self.store.save(&data).await
    }

    pub async fn clear_partial_create_failure(&self, owner: &str, app_name: &str) -> Result<()> {
        let mut data = self.store.load().await?;
        data.partial_create_failures
            .remove(&Self::context_key(owner, app_name));
        self.store.save(&data).await
    }

    pub async fn device_root_version(
        &self,
        datastore_id: &str,
        root_uuid: &str,
        device_id: &str,
    ) -> Result<Option<u64>> {
        let data = self.store.load().await?;
        Ok(data
            .device_root_versions
            .get(&Self::version_key(datastore_id, root_uuid, device_id))
            .copied())
    }

    /// Record an observed root timestamp. Never moves backwards.
    pub async fn put_device_root_version(
        &self,
        datastore_id: &str,
        root_uuid: &str,
        device_id: &str,
        timestamp: u64,
    ) -> Result<()> {
        let mut data = self.store.load().await?;
        let key = Self::version_key(datastore_id, root_uuid, device_id);
        let next = data
            .device_root_versions
            .get(&key)
            .map_or(timestamp, |old| timestamp.max(*old));
        data.device_root_versions.insert(key, next);
        self.store.save(&data).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DatastoreDescriptor, DatastoreKind};
    use std::sync::Arc;

    fn context(owner: Option<&str>) -> MountContext {
        MountContext {
            host: "localhost".into(),
            port: 6270,
            scheme: "http".into(),
            blockchain_id: owner.map(str::to_string),
            app_name: "files.app".into(),
            datastore_id: "1Ds".into(),
            device_id: "dev-1".into(),
            privkey_hex: None,
            app_public_keys: vec![],
            datastore: DatastoreDescriptor {
                kind: DatastoreKind::Datastore,
                pubkey: "04ab".into(),
                drivers: vec![],
                device_ids: vec![],
                root_uuid: "11111111-2222-4333-8444-555555555555".into(),
            },
            created: false,
            creation_urls: None,
        }
    }

    fn make_token(payload: serde_json::Value) -> String {
        let body = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&payload).unwrap());
        format!("eyJhbGciOiJFUzI1NksifQ.{body}.c2ln")
    }

    #[test]
    fn test_decode_session_token() {
        let token = make_token(serde_json::json!({
            "api_endpoint": "http://localhost:6270",
            "app_domain": "https://files.app",
            "app_user_id": "1Ds",
            "blockchain_id": "alice.id",
            "device_id": "dev-1",
            "storage": {
                "classes": {"read_local": ["disk"]},
                "preferences": {"files.app": ["disk"]}
            }
        }));
        let session = decode_session_token(&token).unwrap();
        assert_eq!(session.app_name().unwrap(), "files.app");
        assert_eq!(session.app_user_id.as_deref(), Some("1Ds"));
        assert_eq!(
            session.storage.preferences.get("files.app"),
            Some(&vec!["disk".to_string()])
        );
        assert_eq!(
            session
                .storage
                .classes
                .get(&crate::policy::StorageClass::ReadLocal),
            Some(&vec!["disk".to_string()])
        );
    }

    #[test]
    fn test_decode_rejects_malformed_tokens() {
        assert!(decode_session_token("no-dots-here").is_err());
        assert!(decode_session_token("a.!!!.c").is_err());
    }

    #[tokio::test]
    async fn test_mount_context_cache_round_trip() {
        let cache = SessionCache::new(Arc::new(MemorySessionStore::new()));
        assert!(cache
            .get_mount_context("alice.id", "files.app")
            .await
            .unwrap()
            .is_none());

        cache.put_mount_context(&context(Some("alice.id"))).await.unwrap();
        let cached = cache
            .get_mount_context("alice.id", "files.app")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cached.datastore_id, "1Ds");

        cache.delete_mount_context("alice.id", "files.app").await.unwrap();
        assert!(cache
            .get_mount_context("alice.id", "files.app")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_partial_create_flag_lifecycle() {
        let cache = SessionCache::new(Arc::new(MemorySessionStore::new()));
        assert!(!cache.partial_create_failure("alice.id", "files.app").await.unwrap());

        cache.set_partial_create_failure("alice.id", "files.app").await.unwrap();
        assert!(cache.partial_create_failure("alice.id", "files.app").await.unwrap());

        cache.clear_partial_create_failure("alice.id", "files.app").await.unwrap();
        assert!(!cache.partial_create_failure("alice.id", "files.app").await.unwrap());
    }

    #[tokio::test]
    async fn test_device_root_version_is_monotonic() {
        let cache = SessionCache::new(Arc::new(MemorySessionStore::new()));
        cache
            .put_device_root_version("1Ds", "uuid", "dev-1", 100)
            .await
            .unwrap();
        cache
            .put_device_root_version("1Ds", "uuid", "dev-1", 50)
            .await
            .unwrap();
        assert_eq!(
            cache.device_root_version("1Ds", "uuid", "dev-1").await.unwrap(),
            Some(100)
        );
    }

    #[tokio::test]
    async fn test_file_store_whole_blob_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let store = FileSessionStore::new(&path);

        // Missing file loads as the empty blob
        assert!(store.load().await.unwrap().datastore_contexts.is_empty());

        let mut data = SessionData::default();
        data.core_session_token = Some("token".into());
        data.datastore_contexts
            .insert("alice.id/files.app".into(), context(Some("alice.id")));
        store.save(&data).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.core_session_token.as_deref(), Some("token"));
        assert!(loaded.datastore_contexts.contains_key("alice.id/files.app"));

        // The blob uses the well-known field names
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("coreSessionToken"));
    }

    #[tokio::test]
    async fn test_file_store_rejects_corrupt_blob() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, b"{not json").unwrap();
        let store = FileSessionStore::new(&path);
        assert!(matches!(
            store.load().await,
            Err(DatastoreError::Storage(_))
        ));
    }
}
