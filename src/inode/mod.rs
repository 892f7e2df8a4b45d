//! Device-root page model.
//!
//! Each writing device maintains one root page: the directory of every file
//! that device believes exists, plus per-file tombstones. All transforms
//! here are pure; callers sign and transmit the results. The page timestamp
//! is strictly monotonic per (device, root_uuid), which is what lets
//! readers pick a winner between two copies of the same root.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::blob::{self, parse_data_tombstone, DataInfo};
use crate::types::now_ms;

/// Protocol version stamped on root pages and file entries
pub const PROTO_VERSION: u64 = 2;

/// Page type marker for a leaf directory page
pub const ROOT_DIRECTORY_LEAF: u64 = 1;

/// Authoritative metadata for one file, as stored in a device root
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileEntry {
    pub proto_version: u64,

    /// Replica URLs where the bulk data lives
    pub urls: Vec<String>,

    /// Framed-payload SHA-256 of the file contents, hex
    pub data_hash: String,

    /// Milliseconds; compared against tombstone timestamps on read
    pub timestamp: u64,
}

impl FileEntry {
    pub fn new(urls: Vec<String>, data_hash: String) -> Self {
        FileEntry {
            proto_version: PROTO_VERSION,
            urls,
            data_hash,
            timestamp: now_ms(),
        }
    }
}

/// One device's directory page
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceRoot {
    pub proto_version: u64,

    #[serde(rename = "type")]
    pub page_type: u64,

    /// Datastore id
    pub owner: String,

    /// Reader addresses; empty in single-reader mode
    pub readers: Vec<String>,

    /// Monotonic milliseconds
    pub timestamp: u64,

    /// url-encoded file name -> entry
    pub files: BTreeMap<String, FileEntry>,

    /// url-encoded file name -> signed tombstone
    pub tombstones: BTreeMap<String, String>,
}

/// The data id a device root is stored under
pub fn device_root_data_id(datastore_id: &str, root_uuid: &str) -> String {
    format!("{datastore_id}.{root_uuid}")
}

/// Fresh, empty root page for a datastore
pub fn make_empty_device_root(datastore_id: &str, readers: &[String]) -> DeviceRoot {
    DeviceRoot {
        proto_version: PROTO_VERSION,
        page_type: ROOT_DIRECTORY_LEAF,
        owner: datastore_id.to_string(),
        readers: readers.to_vec(),
        timestamp: now_ms(),
        files: BTreeMap::new(),
        tombstones: BTreeMap::new(),
    }
}

// Each edit advances strictly past both the old page and the wall clock.
fn advance_timestamp(old: u64) -> u64 {
    std::cmp::max(now_ms(), old + 1)
}

/// Clone with `files[name] = entry` and an advanced timestamp
pub fn device_root_insert(root: &DeviceRoot, name: &str, entry: FileEntry) -> DeviceRoot {
    let mut next = root.clone();
    next.files.insert(name.to_string(), entry);
    next.timestamp = advance_timestamp(root.timestamp);
    next
}

/// Clone with `tombstones[name] = tombstone` and an advanced timestamp.
///
/// The `files` entry is retained; readers resolve deletion by comparing the
/// tombstone timestamp against the entry timestamp.
pub fn device_root_remove(root: &DeviceRoot, name: &str, tombstone: &str) -> DeviceRoot {
    let mut next = root.clone();
    next.tombstones
        .insert(name.to_string(), tombstone.to_string());
    next.timestamp = advance_timestamp(root.timestamp);
    next
}

/// Whether `name` currently exists in this root: present in `files` and not
/// shadowed by a tombstone with a later timestamp.
pub fn device_root_lookup<'a>(root: &'a DeviceRoot, name: &str) -> Option<&'a FileEntry> {
    let entry = root.files.get(name)?;
    // Signed tombstones still parse; the signature rides after the id
    match root.tombstones.get(name).and_then(|t| parse_data_tombstone(t)) {
        Some((tombstone_ts, _)) if tombstone_ts > entry.timestamp => None,
        _ => Some(entry),
    }
}

/// The mutable-data envelope carrying a serialized root page
pub fn device_root_serialize(
    device_id: &str,
    datastore_id: &str,
    root_uuid: &str,
    root: &DeviceRoot,
) -> crate::error::Result<DataInfo> {
    let data_id = device_root_data_id(datastore_id, root_uuid);
    let payload = crate::crypto::stable_json(root)?;
    Ok(blob::make_data_info(&data_id, &payload, device_id, None))
}
