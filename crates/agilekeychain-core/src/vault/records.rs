//! Typed on-disk records and their codecs.
//!
//! Every file in a vault is decoded into one of these structs at the
//! [`Repository`](super::Repository) boundary. Decode failures are reported as
//! `VaultError::InvalidVault` immediately; nothing downstream inspects raw
//! JSON or property-list values.
//!
//! Base64 fields are decoded leniently: the applications that write these
//! vaults terminate strings with a NUL byte and sometimes wrap them, so NULs
//! and ASCII whitespace are discarded before decoding. Written records always
//! carry plain padded base64.

use std::fs;
use std::io::Write;
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::de::{self, DeserializeOwned};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use serde_with::base64::Base64;
use serde_with::{DeserializeAs, SerializeAs, serde_as};
use tempfile::NamedTempFile;
use tracing::{debug, trace};

use super::error::VaultError;
use super::layout::KeysFormat;

/// Base64 adapter that tolerates embedded NUL bytes and whitespace.
pub struct LenientBase64;

impl SerializeAs<Vec<u8>> for LenientBase64 {
    fn serialize_as<S: Serializer>(source: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error> {
        <Base64 as SerializeAs<Vec<u8>>>::serialize_as(source, serializer)
    }
}

impl<'de> DeserializeAs<'de, Vec<u8>> for LenientBase64 {
    fn deserialize_as<D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        decode_lenient_base64(&encoded).map_err(de::Error::custom)
    }
}

/// Decode base64 after dropping NUL bytes and ASCII whitespace.
pub fn decode_lenient_base64(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let cleaned: Vec<u8> = encoded
        .bytes()
        .filter(|b| *b != 0 && !b.is_ascii_whitespace())
        .collect();
    STANDARD.decode(cleaned)
}

/// The keys record: security level registrations plus every key.
///
/// Stored as `encryptionKeys.js` (JSON) or `1password.keys` (property list).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeysRecord {
    #[serde(rename = "SL3", default, skip_serializing_if = "Option::is_none")]
    pub sl3: Option<String>,
    #[serde(rename = "SL5", default, skip_serializing_if = "Option::is_none")]
    pub sl5: Option<String>,
    #[serde(default)]
    pub list: Vec<KeyRecord>,
}

/// One encrypted master key.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRecord {
    pub identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(alias = "encrypted")]
    #[serde_as(as = "LenientBase64")]
    pub data: Vec<u8>,
    #[serde_as(as = "LenientBase64")]
    pub validation: Vec<u8>,
    /// Present only in generation-4 records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iterations: Option<u32>,
}

/// One `<uuid>.1password` item record.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRecord {
    /// Older records omit this; the file name is authoritative.
    #[serde(default)]
    pub uuid: String,
    #[serde(rename = "keyID")]
    pub key_id: String,
    #[serde_as(as = "LenientBase64")]
    pub encrypted: Vec<u8>,
    #[serde(flatten)]
    pub metadata: ItemMetadata,
}

/// Unencrypted item fields.
///
/// Fields this crate does not interpret (`securityLevel`, `contentsHash`,
/// `folderUuid`, ...) are carried in `extra` and written back unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemMetadata {
    #[serde(rename = "typeName", default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(rename = "createdAt", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(rename = "updatedAt", default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One row of the `contents.js` index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ContentsRow", into = "ContentsRow")]
pub struct ContentsEntry {
    pub uuid: String,
    pub type_name: String,
    pub title: String,
    pub location: String,
    pub updated_at: i64,
    pub folder_uuid: String,
    pub password_strength: i64,
    pub trashed: bool,
}

impl ContentsEntry {
    /// Index row for a freshly written item record.
    pub fn for_record(record: &ItemRecord) -> Self {
        let metadata = &record.metadata;
        Self {
            uuid: record.uuid.clone(),
            type_name: metadata.type_name.clone().unwrap_or_default(),
            title: metadata.title.clone().unwrap_or_default(),
            location: metadata.location.clone().unwrap_or_default(),
            updated_at: metadata.updated_at.or(metadata.created_at).unwrap_or_default(),
            folder_uuid: metadata
                .extra
                .get("folderUuid")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            password_strength: 0,
            trashed: metadata
                .extra
                .get("trashed")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct ContentsRow(String, String, String, String, i64, String, i64, String);

impl From<ContentsRow> for ContentsEntry {
    fn from(row: ContentsRow) -> Self {
        let ContentsRow(uuid, type_name, title, location, updated_at, folder_uuid, strength, trashed) =
            row;
        Self {
            uuid,
            type_name,
            title,
            location,
            updated_at,
            folder_uuid,
            password_strength: strength,
            trashed: trashed == "Y",
        }
    }
}

impl From<ContentsEntry> for ContentsRow {
    fn from(entry: ContentsEntry) -> Self {
        ContentsRow(
            entry.uuid,
            entry.type_name,
            entry.title,
            entry.location,
            entry.updated_at,
            entry.folder_uuid,
            entry.password_strength,
            if entry.trashed { "Y" } else { "N" }.to_string(),
        )
    }
}

/// Decode a keys record in either on-disk format.
///
/// Property lists written by the desktop application contain raw NUL bytes
/// that XML parsers reject, so they are stripped first.
pub fn decode_keys(bytes: &[u8], format: KeysFormat, path: &Path) -> Result<KeysRecord, VaultError> {
    let record: KeysRecord = match format {
        KeysFormat::Json => {
            serde_json::from_slice(bytes).map_err(|e| VaultError::invalid_vault(path, e))?
        }
        KeysFormat::Plist => {
            let cleaned: Vec<u8> = bytes.iter().copied().filter(|b| *b != 0).collect();
            plist::from_bytes(&cleaned).map_err(|e| VaultError::invalid_vault(path, e))?
        }
    };
    trace!(?format, keys = record.list.len(), "decoded keys record");
    Ok(record)
}

/// Encode a keys record for `format`.
pub fn encode_keys(record: &KeysRecord, format: KeysFormat) -> Result<Vec<u8>, VaultError> {
    match format {
        KeysFormat::Json => encode_json(record),
        KeysFormat::Plist => {
            let mut buf = Vec::new();
            plist::to_writer_xml(&mut buf, record)
                .map_err(|e| VaultError::Encode(e.to_string()))?;
            Ok(buf)
        }
    }
}

pub fn encode_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, VaultError> {
    serde_json::to_vec(value).map_err(|e| VaultError::Encode(e.to_string()))
}

/// Read and decode a JSON file, mapping parse failures to `InvalidVault`.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, VaultError> {
    let bytes = fs::read(path).map_err(|e| VaultError::invalid_vault(path, e))?;
    serde_json::from_slice(&bytes).map_err(|e| VaultError::invalid_vault(path, e))
}

/// Replace `path` with `contents` via a temporary file in the same directory.
///
/// Readers see either the old file or the new one, never a partial write.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), VaultError> {
    let dir = path
        .parent()
        .ok_or_else(|| VaultError::invalid_vault(path, "path has no parent directory"))?;
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(contents)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| VaultError::Io(e.error))?;
    debug!(path = %path.display(), bytes = contents.len(), "wrote file atomically");
    Ok(())
}
