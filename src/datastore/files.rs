//! File API: get, put, delete, list.
//!
//! Every write is the same three-hop chain: mount, edit the device root
//! page locally with the pure inode transforms, then push the signed file
//! data and the signed root. The root push is last; a cancellation between
//! the two leaves only orphan bytes that the next write of the same name
//! supersedes.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::blob;
use crate::crypto::{hash_data_payload, keys, signatures, stable_json};
use crate::error::{DatastoreError, Result};
use crate::inode::{self, DeviceRoot, FileEntry};
use crate::policy::ReplicationStrategy;
use crate::types::{MountContext, WriteRequestBody};

use super::{DatastoreClient, MountOptions};

/// A device root plus whether it was synthesized locally rather than
/// fetched
#[derive(Debug, Clone)]
pub struct DeviceRootInfo {
    pub root: DeviceRoot,
    pub created: bool,
}

/// The data id file contents are stored under
pub fn file_data_id(datastore_id: &str, name: &str) -> String {
    format!("{}/{}", datastore_id, name.trim_start_matches('/'))
}

/// The url-encoded key a file takes inside a device root page
pub fn root_file_name(name: &str) -> String {
    blob::js_escape(name.trim_start_matches('/'))
}

impl DatastoreClient {
    /// Stable-JSON descriptor plus its signature, attached to every
    /// mutation body
    fn signed_descriptor(&self, ctx: &MountContext) -> Result<(String, String)> {
        let private_key_hex = ctx
            .privkey_hex
            .as_deref()
            .ok_or_else(|| DatastoreError::Permission("Mount context cannot write".to_string()))?;
        let datastore_str = stable_json(&ctx.datastore)?;
        let datastore_sig = signatures::sign_data_payload(&datastore_str, private_key_hex)?;
        Ok((datastore_str, datastore_sig))
    }

    /// Locate this device's root page, synthesizing an empty one when no
    /// page is expected to exist yet.
    ///
    /// A page is expected iff this device's key is the descriptor's or a
    /// version of the page was observed before. A mount that just created
    /// the datastore also synthesizes, since the created root may not be
    /// served yet.
    pub async fn find_device_root_info(
        &self,
        ctx: &MountContext,
        device_id: &str,
    ) -> Result<DeviceRootInfo> {
        let device_pubkey = ctx
            .app_public_keys
            .iter()
            .find(|peer| peer.device_id == device_id)
            .map(|peer| peer.public_key.clone());

        // Compare through the address form so compressed and uncompressed
        // encodings of the same key agree
        let is_creator = match device_pubkey {
            Some(pubkey) => {
                keys::datastore_get_id(&pubkey)? == keys::datastore_get_id(&ctx.datastore.pubkey)?
            }
            None => false,
        };
        let seen_before = self
            .cache
            .device_root_version(&ctx.datastore_id, &ctx.datastore.root_uuid, device_id)
            .await?
            .is_some();
        let expected = is_creator || seen_before;

        match self
            .gateway
            .get_device_root(&ctx.datastore_id, device_id)
            .await
        {
            Ok(root) => Ok(DeviceRootInfo {
                root,
                created: false,
            }),
            Err(DatastoreError::NotFound(_)) if ctx.created || !expected => {
                debug!(device_id, "no device root on gateway; starting empty");
                Ok(DeviceRootInfo {
                    root: inode::make_empty_device_root(&ctx.datastore_id, &[]),
                    created: true,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Sign and push a device root page, then record its timestamp in the
    /// version map
    async fn push_device_root(
        &self,
        ctx: &MountContext,
        root: &DeviceRoot,
        sync: bool,
    ) -> Result<()> {
        let private_key_hex = ctx
            .privkey_hex
            .as_deref()
            .ok_or_else(|| DatastoreError::Permission("Mount context cannot write".to_string()))?;

        let info = inode::device_root_serialize(
            &ctx.device_id,
            &ctx.datastore_id,
            &ctx.datastore.root_uuid,
            root,
        )?;
        let header_blob = stable_json(&info)?;
        let signature = signatures::sign_data_payload(&header_blob, private_key_hex)?;
        let (datastore_str, datastore_sig) = self.signed_descriptor(ctx)?;

        let body = WriteRequestBody {
            headers: vec![header_blob],
            payloads: vec![BASE64.encode(info.data.as_bytes())],
            signatures: vec![signature],
            tombstones: vec![],
            datastore_str: Some(datastore_str),
            datastore_sig: Some(datastore_sig),
        };
        self.gateway
            .put_device_root(&ctx.datastore_id, sync, &body)
            .await?;

        self.cache
            .put_device_root_version(
                &ctx.datastore_id,
                &ctx.datastore.root_uuid,
                &ctx.device_id,
                root.timestamp,
            )
            .await
    }

    async fn mount_for_read(&self, opts: &MountOptions) -> Result<MountContext> {
        self.datastore_mount(opts).await?.ok_or_else(|| {
            DatastoreError::not_found("No such datastore for this application".to_string())
        })
    }

    /// Store `data` under `name`, creating the datastore on first use.
    ///
    /// Returns the replica URLs the gateway stored the bytes at.
    pub async fn put_file(
        &self,
        name: &str,
        data: &[u8],
        strategy: &ReplicationStrategy,
    ) -> Result<Vec<String>> {
        let ctx = self.datastore_mount_or_create(strategy).await?;
        let private_key_hex = ctx
            .privkey_hex
            .as_deref()
            .ok_or_else(|| DatastoreError::Permission("Mount context cannot write".to_string()))?;

        let root_info = self.find_device_root_info(&ctx, &ctx.device_id).await?;

        let file_hash = hash_data_payload(data);
        let data_id = file_data_id(&ctx.datastore_id, name);

        // Provisional entry: the gateway fills in the replica URLs
        let provisional = FileEntry::new(vec![], file_hash.clone());
        let header_info = blob::make_data_info(
            &data_id,
            &stable_json(&provisional)?,
            &ctx.device_id,
            None,
        );
        let header_blob = stable_json(&header_info)?;
        let header_sig = signatures::sign_data_payload(&header_blob, private_key_hex)?;
        let (datastore_str, datastore_sig) = self.signed_descriptor(&ctx)?;

        let body = WriteRequestBody {
            headers: vec![header_blob],
            payloads: vec![BASE64.encode(data)],
            signatures: vec![header_sig],
            tombstones: vec![],
            datastore_str: Some(datastore_str),
            datastore_sig: Some(datastore_sig),
        };

        info!(name, datastore_id = %ctx.datastore_id, bytes = data.len(), "putting file");
        let response = self.gateway.put_file(&ctx.datastore_id, name, &body).await?;
        if !response.status {
            return Err(DatastoreError::remote_io(format!(
                "Gateway refused file write for {name}"
            )));
        }

        // Install the final entry, now pointing at the real replicas
        let entry = FileEntry::new(response.urls.clone(), file_hash);
        let next_root = inode::device_root_insert(&root_info.root, &root_file_name(name), entry);
        self.push_device_root(&ctx, &next_root, false).await?;

        Ok(response.urls)
    }

    /// Delete `name`: per-device signed tombstones to the gateway, then the
    /// updated root
    pub async fn delete_file(&self, name: &str, opts: &MountOptions) -> Result<()> {
        let ctx = self.mount_for_read(opts).await?;
        let private_key_hex = ctx
            .privkey_hex
            .as_deref()
            .ok_or_else(|| DatastoreError::Permission("Mount context cannot write".to_string()))?;

        let root_info = self.find_device_root_info(&ctx, &ctx.device_id).await?;
        let root_name = root_file_name(name);
        if inode::device_root_lookup(&root_info.root, &root_name).is_none() {
            return Err(DatastoreError::not_found(format!("No such file: {name}")));
        }

        let data_id = file_data_id(&ctx.datastore_id, name);
        let device_ids: Vec<String> = if ctx.datastore.device_ids.is_empty() {
            vec![ctx.device_id.clone()]
        } else {
            ctx.datastore.device_ids.clone()
        };
        let signed_tombstones = blob::make_data_tombstones(&device_ids, &data_id)
            .iter()
            .map(|t| blob::sign_data_tombstone(t, private_key_hex))
            .collect::<Result<Vec<_>>>()?;

        // This device's tombstone mirrors into its own root page
        let own_fq_id = blob::make_fully_qualified_data_id(&ctx.device_id, &data_id);
        let own_tombstone = signed_tombstones
            .iter()
            .find(|t| t.contains(&own_fq_id))
            .cloned()
            .unwrap_or_else(|| signed_tombstones[0].clone());
        let next_root = inode::device_root_remove(&root_info.root, &root_name, &own_tombstone);

        let (datastore_str, datastore_sig) = self.signed_descriptor(&ctx)?;
        let body = WriteRequestBody {
            headers: vec![],
            payloads: vec![],
            signatures: vec![],
            tombstones: signed_tombstones,
            datastore_str: Some(datastore_str),
            datastore_sig: Some(datastore_sig),
        };

        info!(name, datastore_id = %ctx.datastore_id, "deleting file");
        self.gateway.delete_file(&ctx.datastore_id, name, &body).await?;
        self.push_device_root(&ctx, &next_root, false).await
    }

    /// Fetch the raw bytes of `name`
    pub async fn get_file(&self, name: &str, opts: &MountOptions) -> Result<Vec<u8>> {
        let ctx = self.mount_for_read(opts).await?;
        self.gateway.get_file(&ctx.datastore_id, name).await
    }

    /// Fetch the replica URLs recorded in the file's header
    pub async fn get_file_urls(&self, name: &str, opts: &MountOptions) -> Result<Vec<String>> {
        let ctx = self.mount_for_read(opts).await?;
        let header = self
            .gateway
            .get_file_header(&ctx.datastore_id, name, &ctx.device_id)
            .await?;
        Ok(header.urls)
    }

    /// List the aggregate root: every live file name and its entry
    pub async fn list_files(&self, opts: &MountOptions) -> Result<BTreeMap<String, FileEntry>> {
        let ctx = self.mount_for_read(opts).await?;
        self.gateway.get_listing(&ctx.datastore_id).await
    }
}
