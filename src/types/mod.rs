// Types module for the datastore client
//
// This module defines common types used throughout the datastore client.

use serde::{Deserialize, Serialize};

use crate::error::{DatastoreError, Result};

/// Milliseconds since the Unix epoch
pub fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis() as u64
}

/// The kind of namespace a descriptor declares
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DatastoreKind {
    Datastore,
    Collection,
}

/// Datastore descriptor, signed once at creation and immutable thereafter
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatastoreDescriptor {
    /// `"datastore"` or `"collection"`
    #[serde(rename = "type")]
    pub kind: DatastoreKind,

    /// Uncompressed public key, hex
    pub pubkey: String,

    /// Ordered list of driver names replicating this datastore
    pub drivers: Vec<String>,

    /// Device identifiers spanning the datastore
    pub device_ids: Vec<String>,

    /// UUIDv4 identifying the logical root directory across all devices
    pub root_uuid: String,
}

/// A peer device and the public key it signs with
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DevicePublicKey {
    pub device_id: String,
    pub public_key: String,
}

/// Replica URL lists returned by a successful datastore create
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct DatastoreUrls {
    #[serde(default)]
    pub datastore_urls: Vec<String>,

    #[serde(default)]
    pub root_urls: Vec<String>,
}

/// Per-(owner, app) handle binding a datastore to this client's keys,
/// device id, and gateway. Cached in the durable session store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MountContext {
    pub host: String,
    pub port: u16,
    pub scheme: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blockchain_id: Option<String>,

    pub app_name: String,
    pub datastore_id: String,
    pub device_id: String,

    /// This device's private key, present iff the context can write
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub privkey_hex: Option<String>,

    /// Peer devices and their app public keys
    #[serde(default)]
    pub app_public_keys: Vec<DevicePublicKey>,

    /// The current datastore descriptor
    pub datastore: DatastoreDescriptor,

    /// Set when this mount created the datastore
    #[serde(default)]
    pub created: bool,

    /// Replica URLs attached after a create
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_urls: Option<DatastoreUrls>,
}

impl MountContext {
    /// Gateway base endpoint for this context
    pub fn gateway_endpoint(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }

    pub fn is_writer(&self) -> bool {
        self.privkey_hex.is_some()
    }

    /// Cache key: owner (blockchain id if present, datastore id otherwise)
    /// joined with the app name
    pub fn cache_key(&self) -> String {
        let owner = self
            .blockchain_id
            .clone()
            .unwrap_or_else(|| self.datastore_id.clone());
        format!("{}/{}", owner, self.app_name)
    }
}

/// Request body for every mutation endpoint. `headers`, `payloads`, and
/// `signatures` correspond positionally and must be equal length.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WriteRequestBody {
    pub headers: Vec<String>,
    pub payloads: Vec<String>,
    pub signatures: Vec<String>,
    pub tombstones: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datastore_str: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datastore_sig: Option<String>,
}

impl WriteRequestBody {
    /// Enforce the 1:1 positional correspondence before the body leaves the
    /// client
    pub fn check_positional(&self) -> Result<()> {
        if self.headers.len() != self.payloads.len()
            || self.payloads.len() != self.signatures.len()
        {
            return Err(DatastoreError::validation(format!(
                "Mismatched write body: {} headers, {} payloads, {} signatures",
                self.headers.len(),
                self.payloads.len(),
                self.signatures.len()
            )));
        }
        Ok(())
    }
}

/// Request body of `POST /v1/stores`: the three signed artifacts of a
/// datastore create
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDatastoreBody {
    /// Signed envelope over the stable-JSON descriptor
    pub datastore_info: String,
    pub datastore_sig: String,

    /// Signed envelope over the stable-JSON empty device root
    pub root: String,
    pub root_sig: String,

    /// One signed tombstone per device id, kept for later cleanup
    pub root_tombstones: Vec<String>,
}

/// Request body of `DELETE /v1/stores`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteDatastoreBody {
    pub datastore_tombstones: Vec<String>,
    pub root_tombstones: Vec<String>,
}

/// Response of `POST /v1/stores`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutDatastoreResponse {
    pub status: bool,

    #[serde(default)]
    pub datastore_urls: Vec<String>,

    #[serde(default)]
    pub root_urls: Vec<String>,
}

/// Response of file and device-root mutations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutFileResponse {
    pub status: bool,

    #[serde(default)]
    pub urls: Vec<String>,
}

/// Response of `GET /v1/stores/<id>`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetDatastoreResponse {
    pub datastore: DatastoreDescriptor,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_wire_names() {
        assert_eq!(
            serde_json::to_string(&DatastoreKind::Datastore).unwrap(),
            r#""datastore""#
        );
        assert_eq!(
            serde_json::to_string(&DatastoreKind::Collection).unwrap(),
            r#""collection""#
        );
    }

    #[test]
    fn test_descriptor_type_field_name() {
        let descriptor = DatastoreDescriptor {
            kind: DatastoreKind::Datastore,
            pubkey: "04ab".into(),
            drivers: vec!["disk".into()],
            device_ids: vec!["dev-1".into()],
            root_uuid: "0c51a948-29a5-4226-93a4-a3c4e1121adf".into(),
        };
        let value = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(value["type"], "datastore");
        let back: DatastoreDescriptor = serde_json::from_value(value).unwrap();
        assert_eq!(back, descriptor);
    }

    #[test]
    fn test_write_body_positional_check() {
        let mut body = WriteRequestBody {
            headers: vec!["h".into()],
            payloads: vec!["p".into()],
            signatures: vec!["s".into()],
            ..Default::default()
        };
        assert!(body.check_positional().is_ok());
        body.signatures.clear();
        assert!(body.check_positional().is_err());
    }

    #[test]
    fn test_cache_key_prefers_blockchain_id() {
        let descriptor = DatastoreDescriptor {
            kind: DatastoreKind::Datastore,
            pubkey: "04ab".into(),
            drivers: vec![],
            device_ids: vec![],
            root_uuid: "u".into(),
        };
        let mut ctx = MountContext {
            host: "localhost".into(),
            port: 6270,
            scheme: "http".into(),
            blockchain_id: Some("alice.id".into()),
            app_name: "files.app".into(),
            datastore_id: "1Ds".into(),
            device_id: "dev-1".into(),
            privkey_hex: None,
            app_public_keys: vec![],
            datastore: descriptor,
            created: false,
            creation_urls: None,
        };
        assert_eq!(ctx.cache_key(), "alice.id/files.app");
        ctx.blockchain_id = None;
        assert_eq!(ctx.cache_key(), "1Ds/files.app");
        assert_eq!(ctx.gateway_endpoint(), "http://localhost:6270");
    }
}
