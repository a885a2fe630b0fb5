//! Schema Module
//!
//! Versioned description of a store's collections, persisted in `MANIFEST`.
//!
//! ## Manifest Format
//! ```text
//! ┌──────────┬─────────┬─────────┬──────────────────────┐
//! │Magic (4) │ CRC (4) │ Len (4) │ bincode(Schema)      │
//! └──────────┴─────────┴─────────┴──────────────────────┘
//! ```
//!
//! The manifest is replaced atomically (write to `MANIFEST.tmp`, fsync,
//! rename), so a reader sees either the old schema or the new one.

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, StringDbError};

/// Name of the record collection
pub const RECORD_COLLECTION: &str = "strings";

/// Name of the optional secondary index over record values
pub const VALUE_INDEX: &str = "value";

const MANIFEST_MAGIC: &[u8; 4] = b"STDM";
const MANIFEST_HEADER_SIZE: usize = 12;

/// Persisted schema of one store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub name: String,
    pub version: u32,
    /// Length of every stored value, fixed when the store is created
    pub record_length: usize,
    pub collections: Vec<CollectionDef>,
}

/// A record collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionDef {
    pub name: String,
    /// Keys are allocated by the store
    pub auto_increment: bool,
    pub indexes: Vec<IndexDef>,
}

/// A secondary index declared on a collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDef {
    pub name: String,
    /// Record field the index covers
    pub key_path: String,
    pub unique: bool,
}

/// What happened to the schema while opening
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaChange {
    /// On-disk schema already at the requested version
    Unchanged,
    /// No schema existed; version created from scratch
    Created { version: u32 },
    /// Existing schema moved to a newer version
    Upgraded { from: u32, to: u32 },
}

impl Schema {
    fn empty(name: &str, record_length: usize) -> Self {
        Self {
            name: name.to_string(),
            version: 0,
            record_length,
            collections: Vec::new(),
        }
    }

    pub fn collection(&self, name: &str) -> Option<&CollectionDef> {
        self.collections.iter().find(|c| c.name == name)
    }

    /// True if the record collection declares the value index
    pub fn has_value_index(&self) -> bool {
        self.collection(RECORD_COLLECTION)
            .is_some_and(|c| c.indexes.iter().any(|i| i.name == VALUE_INDEX))
    }
}

/// Bring `existing` up to `requested`, creating what is missing
///
/// Returns the schema to persist and what changed. Asking for a version
/// below the stored one fails with `VersionError`; a `record_length` other
/// than the one the store was created with fails with `Config`.
pub fn upgrade(
    existing: Option<Schema>,
    name: &str,
    requested: u32,
    value_index: bool,
    record_length: usize,
) -> Result<(Schema, SchemaChange)> {
    if let Some(stored) = existing.as_ref().map(|s| s.record_length) {
        if stored != record_length {
            return Err(StringDbError::Config(format!(
                "store {} holds records of length {}, not {}",
                name, stored, record_length
            )));
        }
    }

    let stored_version = existing.as_ref().map(|s| s.version);

    match stored_version {
        Some(v) if v > requested => {
            return Err(StringDbError::VersionError {
                requested,
                existing: v,
            })
        }
        Some(v) if v == requested => {
            let schema = existing.unwrap_or_else(|| Schema::empty(name, record_length));
            return Ok((schema, SchemaChange::Unchanged));
        }
        _ => {}
    }

    let mut schema = existing.unwrap_or_else(|| Schema::empty(name, record_length));

    if schema.collection(RECORD_COLLECTION).is_none() {
        info!(collection = RECORD_COLLECTION, "creating record collection");
        schema.collections.push(CollectionDef {
            name: RECORD_COLLECTION.to_string(),
            auto_increment: true,
            indexes: Vec::new(),
        });
    }

    if value_index && !schema.has_value_index() {
        if let Some(collection) = schema
            .collections
            .iter_mut()
            .find(|c| c.name == RECORD_COLLECTION)
        {
            info!(index = VALUE_INDEX, "creating value index");
            collection.indexes.push(IndexDef {
                name: VALUE_INDEX.to_string(),
                key_path: "value".to_string(),
                unique: false,
            });
        }
    }

    let change = match stored_version {
        Some(from) => SchemaChange::Upgraded {
            from,
            to: requested,
        },
        None => SchemaChange::Created { version: requested },
    };
    schema.version = requested;

    Ok((schema, change))
}

/// Read the manifest, `None` if the store has never been created
pub fn load_manifest(path: &Path) -> Result<Option<Schema>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StringDbError::OpenFailed(format!(
            "cannot read {}: {}",
            path.display(),
            e
        ))),
    };

    if bytes.len() < MANIFEST_HEADER_SIZE || &bytes[0..4] != MANIFEST_MAGIC {
        return Err(StringDbError::OpenFailed(format!(
            "{} is not a StringDB manifest",
            path.display()
        )));
    }

    let crc = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    let len = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
    let payload = bytes
        .get(MANIFEST_HEADER_SIZE..MANIFEST_HEADER_SIZE + len)
        .ok_or_else(|| StringDbError::OpenFailed("truncated manifest".into()))?;

    if crc32fast::hash(payload) != crc {
        return Err(StringDbError::OpenFailed("manifest checksum mismatch".into()));
    }

    let schema = bincode::deserialize(payload)
        .map_err(|e| StringDbError::OpenFailed(format!("undecodable manifest: {}", e)))?;
    Ok(Some(schema))
}

/// Atomically replace the manifest
pub fn store_manifest(path: &Path, schema: &Schema) -> Result<()> {
    let payload = bincode::serialize(schema)?;
    let tmp_path = path.with_extension("tmp");

    let write = || -> std::io::Result<()> {
        let mut file = File::create(&tmp_path)?;
        file.write_all(MANIFEST_MAGIC)?;
        file.write_all(&crc32fast::hash(&payload).to_le_bytes())?;
        file.write_all(&(payload.len() as u32).to_le_bytes())?;
        file.write_all(&payload)?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)
    };

    write().map_err(|e| {
        StringDbError::UpgradeFailed(format!("cannot write {}: {}", path.display(), e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_fresh_store_gets_record_collection() {
        let (schema, change) = upgrade(None, "stringDB", 1, false, 100).unwrap();

        assert_eq!(change, SchemaChange::Created { version: 1 });
        let strings = schema.collection(RECORD_COLLECTION).unwrap();
        assert!(strings.auto_increment);
        assert!(!schema.has_value_index());
    }

    #[test]
    fn test_same_version_is_unchanged() {
        let (v1, _) = upgrade(None, "stringDB", 1, false, 100).unwrap();
        let (again, change) = upgrade(Some(v1.clone()), "stringDB", 1, true, 100).unwrap();

        assert_eq!(change, SchemaChange::Unchanged);
        assert_eq!(again, v1);
    }

    #[test]
    fn test_upgrade_adds_value_index() {
        let (v1, _) = upgrade(None, "stringDB", 1, false, 100).unwrap();
        let (v2, change) = upgrade(Some(v1), "stringDB", 2, true, 100).unwrap();

        assert_eq!(change, SchemaChange::Upgraded { from: 1, to: 2 });
        assert!(v2.has_value_index());
        assert_eq!(v2.collections.len(), 1);
    }

    #[test]
    fn test_downgrade_rejected() {
        let (v2, _) = upgrade(None, "stringDB", 2, false, 100).unwrap();
        let err = upgrade(Some(v2), "stringDB", 1, false, 100).unwrap_err();
        assert!(matches!(
            err,
            StringDbError::VersionError {
                requested: 1,
                existing: 2
            }
        ));
    }

    #[test]
    fn test_record_length_is_fixed_at_creation() {
        let (v1, _) = upgrade(None, "stringDB", 1, false, 100).unwrap();
        assert_eq!(v1.record_length, 100);

        let err = upgrade(Some(v1.clone()), "stringDB", 1, false, 20).unwrap_err();
        assert!(matches!(err, StringDbError::Config(_)));

        let (v2, _) = upgrade(Some(v1), "stringDB", 2, false, 100).unwrap();
        assert_eq!(v2.record_length, 100);
    }

    #[test]
    fn test_manifest_round_trip_and_corruption() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("MANIFEST");
        assert!(load_manifest(&path).unwrap().is_none());

        let (schema, _) = upgrade(None, "stringDB", 1, true, 100).unwrap();
        store_manifest(&path, &schema).unwrap();
        assert_eq!(load_manifest(&path).unwrap(), Some(schema));

        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        fs::write(&path, bytes).unwrap();
        assert!(matches!(load_manifest(&path), Err(StringDbError::OpenFailed(_))));
    }
}
