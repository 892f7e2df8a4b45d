//! Datastore lifecycle.
//!
//! Creating a datastore means producing three byte-exact signed artifacts
//! (descriptor envelope, empty device-root envelope, per-device root
//! tombstones) and POSTing them as one bundle. Mounting resolves the
//! per-(owner, app) context, preferring the durable cache, and honors the
//! partial-create flag so an ambiguous create is retried instead of
//! half-trusted.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::blob;
use crate::config::ClientConfig;
use crate::crypto::{keys, signatures, stable_json};
use crate::error::{DatastoreError, Result};
use crate::gateway::GatewayClient;
use crate::inode::{self, DeviceRoot};
use crate::policy::{select_drivers, ReplicationStrategy};
use crate::session::{decode_jwt_payload, decode_session_token, GatewaySession, SessionCache, SessionStore};
use crate::types::{
    CreateDatastoreBody, DatastoreDescriptor, DatastoreKind, DatastoreUrls, DeleteDatastoreBody,
    DevicePublicKey, MountContext, PutDatastoreResponse,
};

pub mod files;

/// The signed bundle a create produces, plus the locally-known state it
/// was derived from
#[derive(Debug, Clone)]
pub struct DatastoreCreateRequest {
    pub datastore_id: String,
    pub datastore: DatastoreDescriptor,
    pub root: DeviceRoot,
    pub body: CreateDatastoreBody,
}

/// Signed tombstones deleting a datastore and its root pages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatastoreDeleteRequest {
    pub datastore_tombstones: Vec<String>,
    pub root_tombstones: Vec<String>,
}

/// Produce the signed create bundle for `POST /v1/stores`.
///
/// Pure except for the timestamps embedded in the envelopes; every byte of
/// the output is what the gateway verifies.
pub fn datastore_create_request(
    kind: DatastoreKind,
    private_key_hex: &str,
    drivers: &[String],
    device_id: &str,
    all_device_ids: &[String],
) -> Result<DatastoreCreateRequest> {
    let key = keys::decode_private_key(private_key_hex)?;
    let pubkey = keys::public_key_hex(&key);
    let datastore_id = keys::datastore_get_id(&pubkey)?;
    let root_uuid = Uuid::new_v4().to_string();

    let datastore = DatastoreDescriptor {
        kind,
        pubkey,
        drivers: drivers.to_vec(),
        device_ids: all_device_ids.to_vec(),
        root_uuid: root_uuid.clone(),
    };

    // Descriptor rides in its own mutable-data envelope, keyed by the
    // datastore id
    let datastore_str = stable_json(&datastore)?;
    let datastore_info = blob::make_data_info(&datastore_id, &datastore_str, device_id, None);
    let datastore_blob = stable_json(&datastore_info)?;
    let datastore_sig = signatures::sign_data_payload(&datastore_blob, private_key_hex)?;

    let root = inode::make_empty_device_root(&datastore_id, &[]);
    let root_info = inode::device_root_serialize(device_id, &datastore_id, &root_uuid, &root)?;
    let root_blob = stable_json(&root_info)?;
    let root_sig = signatures::sign_data_payload(&root_blob, private_key_hex)?;

    let root_data_id = inode::device_root_data_id(&datastore_id, &root_uuid);
    let root_tombstones = blob::make_data_tombstones(all_device_ids, &root_data_id)
        .iter()
        .map(|t| blob::sign_data_tombstone(t, private_key_hex))
        .collect::<Result<Vec<_>>>()?;

    Ok(DatastoreCreateRequest {
        datastore_id,
        datastore,
        root,
        body: CreateDatastoreBody {
            datastore_info: datastore_blob,
            datastore_sig,
            root: root_blob,
            root_sig,
            root_tombstones,
        },
    })
}

/// Produce the signed tombstones deleting a mounted datastore
pub fn datastore_delete_request(ctx: &MountContext) -> Result<DatastoreDeleteRequest> {
    let private_key_hex = ctx
        .privkey_hex
        .as_deref()
        .ok_or_else(|| DatastoreError::Permission("Mount context cannot write".to_string()))?;

    let device_ids = &ctx.datastore.device_ids;
    let root_data_id = inode::device_root_data_id(&ctx.datastore_id, &ctx.datastore.root_uuid);

    let datastore_tombstones = blob::make_data_tombstones(device_ids, &ctx.datastore_id)
        .iter()
        .map(|t| blob::sign_data_tombstone(t, private_key_hex))
        .collect::<Result<Vec<_>>>()?;
    let root_tombstones = blob::make_data_tombstones(device_ids, &root_data_id)
        .iter()
        .map(|t| blob::sign_data_tombstone(t, private_key_hex))
        .collect::<Result<Vec<_>>>()?;

    Ok(DatastoreDeleteRequest {
        datastore_tombstones,
        root_tombstones,
    })
}

/// Mount resolution inputs. All optional; anything absent is derived from
/// the session token.
#[derive(Debug, Clone, Default)]
pub struct MountOptions {
    pub datastore_id: Option<String>,
    pub device_id: Option<String>,
    pub data_pubkeys: Option<Vec<DevicePublicKey>>,
    pub blockchain_id: Option<String>,
    pub app_name: Option<String>,
}

/// The two reader modes a mount request can take
#[derive(Debug, Clone, PartialEq)]
enum MountTarget {
    /// Single-reader/writer: `GET /v1/stores/<id>?device_ids=…&device_pubkeys=…`
    ById {
        datastore_id: String,
        device_id: String,
        data_pubkeys: Vec<DevicePublicKey>,
        writable: bool,
    },
    /// Multi-reader: `GET /v1/stores/<app>?blockchain_id=<bid>`
    ByName {
        app_name: String,
        blockchain_id: String,
    },
}

fn resolve_mount_target(opts: &MountOptions, session: &GatewaySession) -> Result<MountTarget> {
    // Explicit single-reader parameters win
    if let (Some(datastore_id), Some(device_id), Some(data_pubkeys)) = (
        opts.datastore_id.as_ref(),
        opts.device_id.as_ref(),
        opts.data_pubkeys.as_ref(),
    ) {
        return Ok(MountTarget::ById {
            datastore_id: datastore_id.clone(),
            device_id: device_id.clone(),
            data_pubkeys: data_pubkeys.clone(),
            writable: false,
        });
    }

    // A session whose user id names the datastore mounts it directly as the
    // writing device
    if let (Some(app_user_id), Some(device_id), Some(app_private_key)) = (
        session.app_user_id.as_ref(),
        session.device_id.as_ref(),
        session.app_private_key.as_ref(),
    ) {
        let requested = opts.datastore_id.as_deref().unwrap_or(app_user_id);
        if requested == app_user_id {
            let key = keys::decode_private_key(app_private_key)?;
            let public_key = keys::public_key_hex(&key);
            return Ok(MountTarget::ById {
                datastore_id: app_user_id.clone(),
                device_id: device_id.clone(),
                data_pubkeys: vec![DevicePublicKey {
                    device_id: device_id.clone(),
                    public_key,
                }],
                writable: true,
            });
        }
    }

    let app_name = opts
        .app_name
        .clone()
        .or_else(|| session.app_name())
        .ok_or_else(|| DatastoreError::Invalid("Mount needs an app name".to_string()))?;
    let blockchain_id = opts
        .blockchain_id
        .clone()
        .or_else(|| session.blockchain_id.clone())
        .ok_or_else(|| {
            DatastoreError::Invalid("Mount needs a blockchain id or datastore id".to_string())
        })?;
    Ok(MountTarget::ByName {
        app_name,
        blockchain_id,
    })
}

/// Client for one user's datastores behind one gateway.
///
/// Holds the decoded session, the HTTP bindings, and the durable
/// session-store cache. All file operations hang off this type (see
/// [`files`]).
pub struct DatastoreClient {
    pub(crate) config: ClientConfig,
    pub(crate) gateway: GatewayClient,
    pub(crate) cache: SessionCache,
    pub(crate) session: GatewaySession,
    pub(crate) api_password: Option<String>,
}

impl DatastoreClient {
    /// Build a client from a gateway session token.
    ///
    /// The token's `api_endpoint` claim, when present, overrides the
    /// configured gateway address.
    pub fn new(
        config: ClientConfig,
        session_token: &str,
        store: Arc<dyn SessionStore>,
    ) -> Result<Self> {
        let session = decode_session_token(session_token)?;
        let config = match session.api_endpoint.as_deref() {
            Some(endpoint) => config.with_endpoint(endpoint)?,
            None => config,
        };
        let gateway = GatewayClient::new(&config)?.with_session_token(session_token);

        Ok(Self {
            config,
            gateway,
            cache: SessionCache::new(store),
            session,
            api_password: None,
        })
    }

    /// Attach the gateway API password for the administrative create path
    pub fn with_api_password(mut self, password: impl Into<String>) -> Self {
        self.api_password = Some(password.into());
        self
    }

    pub fn session(&self) -> &GatewaySession {
        &self.session
    }

    pub fn gateway(&self) -> &GatewayClient {
        &self.gateway
    }

    fn app_name(&self) -> Result<String> {
        self.session
            .app_name()
            .ok_or_else(|| DatastoreError::Invalid("Session names no application".to_string()))
    }

    /// Owner key for caches and flags: blockchain id when the session has
    /// one, datastore id otherwise
    fn owner_id(&self) -> Result<String> {
        self.session
            .blockchain_id
            .clone()
            .or_else(|| self.session.app_user_id.clone())
            .ok_or_else(|| DatastoreError::Invalid("Session names no owner".to_string()))
    }

    /// POST a create bundle to the gateway.
    ///
    /// With a session token the bundle authenticates itself; with only the
    /// API password the datastore public key rides as a query parameter.
    pub async fn datastore_create(
        &self,
        request: &DatastoreCreateRequest,
    ) -> Result<PutDatastoreResponse> {
        let gateway = match (&self.api_password, self.session.app_user_id.is_some()) {
            (Some(password), false) => self.gateway.clone().with_api_password(password.clone()),
            _ => self.gateway.clone(),
        };
        let datastore_pubkey = self
            .api_password
            .as_ref()
            .map(|_| request.datastore.pubkey.as_str());

        info!(datastore_id = %request.datastore_id, "creating datastore");
        let response = gateway.put_datastore(&request.body, datastore_pubkey).await?;
        if !response.status {
            return Err(DatastoreError::remote_io(
                "Gateway refused datastore create".to_string(),
            ));
        }
        Ok(response)
    }

    /// DELETE a mounted datastore and drop its cached context
    pub async fn datastore_delete(&self, ctx: &MountContext) -> Result<()> {
        let request = datastore_delete_request(ctx)?;
        let body = DeleteDatastoreBody {
            datastore_tombstones: request.datastore_tombstones,
            root_tombstones: request.root_tombstones,
        };
        self.gateway.delete_datastore(&body).await?;

        let owner = ctx
            .blockchain_id
            .clone()
            .unwrap_or_else(|| ctx.datastore_id.clone());
        self.cache.delete_mount_context(&owner, &ctx.app_name).await
    }

    /// Force the partial-create state: the next mount reports absence and
    /// `datastore_mount_or_create` retries the create.
    pub async fn datastore_create_set_retry(&self) -> Result<()> {
        self.cache
            .set_partial_create_failure(&self.owner_id()?, &self.app_name()?)
            .await
    }

    /// Resolve a mount context.
    ///
    /// `Ok(None)` means the datastore does not exist: the gateway returned
    /// 404, or a pending partial create forces that answer locally.
    pub async fn datastore_mount(&self, opts: &MountOptions) -> Result<Option<MountContext>> {
        let app_name = opts.app_name.clone().or_else(|| self.session.app_name());
        let app_name = match app_name {
            Some(name) => name,
            None => return Err(DatastoreError::Invalid("Mount needs an app name".to_string())),
        };
        // Mirrors MountContext::cache_key so lookups and stores agree
        let owner = opts
            .blockchain_id
            .clone()
            .or_else(|| self.session.blockchain_id.clone())
            .or_else(|| opts.datastore_id.clone())
            .or_else(|| self.session.app_user_id.clone())
            .ok_or_else(|| DatastoreError::Invalid("Mount needs an owner".to_string()))?;

        if self.cache.partial_create_failure(&owner, &app_name).await? {
            debug!(%owner, %app_name, "partial create pending; reporting absent");
            return Ok(None);
        }

        if let Some(ctx) = self.cache.get_mount_context(&owner, &app_name).await? {
            return Ok(Some(ctx));
        }

        let target = resolve_mount_target(opts, &self.session)?;
        let fetched = match &target {
            MountTarget::ById {
                datastore_id,
                data_pubkeys,
                ..
            } => {
                let device_ids: Vec<String> =
                    data_pubkeys.iter().map(|p| p.device_id.clone()).collect();
                let device_pubkeys: Vec<String> =
                    data_pubkeys.iter().map(|p| p.public_key.clone()).collect();
                self.gateway
                    .get_datastore_by_id(datastore_id, &device_ids, &device_pubkeys)
                    .await
            }
            MountTarget::ByName {
                app_name,
                blockchain_id,
            } => {
                self.gateway
                    .get_datastore_by_name(app_name, blockchain_id)
                    .await
            }
        };

        let descriptor = match fetched {
            Ok(response) => response.datastore,
            Err(DatastoreError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        let ctx = self.build_context(&app_name, &target, descriptor)?;
        self.cache.put_mount_context(&ctx).await?;
        Ok(Some(ctx))
    }

    fn build_context(
        &self,
        app_name: &str,
        target: &MountTarget,
        datastore: DatastoreDescriptor,
    ) -> Result<MountContext> {
        let (datastore_id, device_id, app_public_keys, privkey_hex) = match target {
            MountTarget::ById {
                datastore_id,
                device_id,
                data_pubkeys,
                writable,
            } => {
                let privkey = if *writable {
                    self.session.app_private_key.clone()
                } else {
                    None
                };
                (
                    datastore_id.clone(),
                    device_id.clone(),
                    data_pubkeys.clone(),
                    privkey,
                )
            }
            MountTarget::ByName { .. } => {
                let datastore_id = keys::datastore_get_id(&datastore.pubkey)?;
                let device_id = self.session.device_id.clone().unwrap_or_default();
                (datastore_id, device_id, Vec::new(), None)
            }
        };

        Ok(MountContext {
            host: self.config.host.clone(),
            port: self.config.port,
            scheme: self.config.scheme.clone(),
            blockchain_id: self.session.blockchain_id.clone(),
            app_name: app_name.to_string(),
            datastore_id,
            device_id,
            privkey_hex,
            app_public_keys,
            datastore,
            created: false,
            creation_urls: None,
        })
    }

    /// Mount, creating the datastore first when it does not exist.
    ///
    /// Driver choice: an explicit `strategy.drivers` list, else the
    /// session's per-app preference, else replication-strategy selection
    /// over the session's driver classification.
    pub async fn datastore_mount_or_create(
        &self,
        strategy: &ReplicationStrategy,
    ) -> Result<MountContext> {
        if let Some(ctx) = self.datastore_mount(&MountOptions::default()).await? {
            return Ok(ctx);
        }

        let app_name = self.app_name()?;
        let owner = self.owner_id()?;
        let app_private_key = self
            .session
            .app_private_key
            .clone()
            .ok_or_else(|| DatastoreError::Permission("Session carries no app key".to_string()))?;
        let device_id = self
            .session
            .device_id
            .clone()
            .ok_or_else(|| DatastoreError::Invalid("Session names no device".to_string()))?;

        let drivers = match &strategy.drivers {
            Some(drivers) => drivers.clone(),
            None => match self.session.storage.preferences.get(&app_name) {
                Some(preferred) => preferred.clone(),
                None => select_drivers(strategy, &self.session.storage.classes)?,
            },
        };

        let request = datastore_create_request(
            DatastoreKind::Datastore,
            &app_private_key,
            &drivers,
            &device_id,
            &[device_id.clone()],
        )?;

        // Any context cached before a forced retry points at the old
        // descriptor; the confirming mount must re-fetch
        self.cache.delete_mount_context(&owner, &app_name).await?;

        // Pessimistic: the flag is set before the create leaves, so a crash
        // between create and the confirming mount is retried, not trusted.
        self.cache
            .set_partial_create_failure(&owner, &app_name)
            .await?;
        let response = self.datastore_create(&request).await?;
        self.cache
            .clear_partial_create_failure(&owner, &app_name)
            .await?;

        match self.datastore_mount(&MountOptions::default()).await? {
            Some(mut ctx) => {
                ctx.created = true;
                ctx.creation_urls = Some(DatastoreUrls {
                    datastore_urls: response.datastore_urls,
                    root_urls: response.root_urls,
                });
                self.cache.put_mount_context(&ctx).await?;
                Ok(ctx)
            }
            None => {
                warn!(%owner, %app_name, "created datastore but mount sees nothing");
                self.cache
                    .set_partial_create_failure(&owner, &app_name)
                    .await?;
                Err(DatastoreError::remote_io(
                    "Datastore created but the confirming mount failed".to_string(),
                ))
            }
        }
    }

    /// Resolve the app public keys of every device advertising `app_name`,
    /// from the owner's profile keyfile. `overrides` short-circuits the
    /// lookup.
    pub async fn get_app_keys(
        &self,
        blockchain_id: &str,
        app_name: &str,
        overrides: Option<Vec<DevicePublicKey>>,
    ) -> Result<Vec<DevicePublicKey>> {
        if let Some(overrides) = overrides {
            return Ok(overrides);
        }

        let profile = self.gateway.get_profile(blockchain_id).await?;
        let keyfile_token = profile
            .get("keyfile")
            .and_then(|v| v.as_str())
            .ok_or_else(|| DatastoreError::remote_io("Profile carries no keyfile".to_string()))?;
        let keyfile = decode_jwt_payload(keyfile_token)?;
        Ok(app_keys_from_keyfile(&keyfile, app_name))
    }
}

/// Extract `keys.apps[device_id][app_name].public_key` for every device
/// that advertises the app
fn app_keys_from_keyfile(keyfile: &serde_json::Value, app_name: &str) -> Vec<DevicePublicKey> {
    let mut found = Vec::new();
    if let Some(devices) = keyfile.pointer("/keys/apps").and_then(|v| v.as_object()) {
        for (device_id, device_apps) in devices {
            if let Some(public_key) = device_apps
                .get(app_name)
                .and_then(|app| app.get("public_key"))
                .and_then(|key| key.as_str())
            {
                found.push(DevicePublicKey {
                    device_id: device_id.clone(),
                    public_key: public_key.to_string(),
                });
            }
        }
    }
    found
}
