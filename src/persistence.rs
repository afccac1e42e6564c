//! # RocksDB Node Store
//!
//! Persistent node property store. Each sink transaction accumulates its
//! writes in a `WriteBatch` that is applied atomically on commit.
//!
//! Layout:
//! - `node_properties`: `original_id (u64 BE) ‖ key_id (u32 BE)` → bincode `PropertyValue`
//! - `metadata`: storage manifest and the property key registry

use crate::config::{ExportConfig, StorageConfig};
use crate::error::{ExportError, Result as ExportResult};
use crate::model::{OriginalId, PropertyKeyId, PropertyValue};
use crate::sink::{PropertySink, SinkTransaction};
use crate::store::KeyRegistry;
use anyhow::{anyhow, Result};
use parking_lot::Mutex;
use rocksdb::{
    checkpoint::Checkpoint, ColumnFamilyDescriptor, IteratorMode, Options, WriteBatch, DB,
};
use std::path::Path;
use tracing::debug;

const CF_NODE_PROPERTIES: &str = "node_properties";
const CF_METADATA: &str = "metadata";

const KEY_MANIFEST: &[u8] = b"manifest";
const KEY_PROPERTY_KEYS: &[u8] = b"property_keys";

const STORAGE_FORMAT_VERSION: u32 = 1;

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct StorageManifest {
    format_version: u32,
    app_version: String,
}

#[derive(Debug, Clone, Copy)]
pub struct RocksOpenOptions {
    pub create_if_missing: bool,
    pub repair: bool,
}

impl Default for RocksOpenOptions {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            repair: false,
        }
    }
}

impl From<&StorageConfig> for RocksOpenOptions {
    fn from(config: &StorageConfig) -> Self {
        Self {
            create_if_missing: config.create_if_missing,
            ..Self::default()
        }
    }
}

pub struct RocksNodeStore {
    db: DB,
    keys: Mutex<KeyRegistry>,
}

impl RocksNodeStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_options(path, RocksOpenOptions::default())
    }

    /// Open the store at `config.storage.path`
    pub fn from_config(config: &ExportConfig) -> Result<Self> {
        let path = config
            .storage
            .path
            .as_deref()
            .ok_or_else(|| anyhow!("storage.path is not configured"))?;
        Self::open_with_options(path, RocksOpenOptions::from(&config.storage))
    }

    pub fn open_with_options(path: impl AsRef<Path>, options: RocksOpenOptions) -> Result<Self> {
        if options.repair {
            repair_db(path.as_ref())?;
        }
        let db = open_db(path, options.create_if_missing)?;
        validate_or_init_manifest(&db)?;
        let keys = load_key_registry(&db)?;
        Ok(Self {
            db,
            keys: Mutex::new(keys),
        })
    }

    /// Committed value of `key` on `node`
    pub fn get_property(
        &self,
        node: OriginalId,
        key: PropertyKeyId,
    ) -> Result<Option<PropertyValue>> {
        let cf = self
            .db
            .cf_handle(CF_NODE_PROPERTIES)
            .ok_or_else(|| anyhow!("missing node_properties column family"))?;
        match self.db.get_cf(cf, encode_property_key(node, key))? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Look up a registered property key without creating it
    pub fn property_key(&self, name: &str) -> Option<PropertyKeyId> {
        self.keys.lock().get(name)
    }

    /// All committed values of `key`, ordered by node
    pub fn property_values(&self, key: PropertyKeyId) -> Result<Vec<(OriginalId, PropertyValue)>> {
        let cf = self
            .db
            .cf_handle(CF_NODE_PROPERTIES)
            .ok_or_else(|| anyhow!("missing node_properties column family"))?;
        let mut values = Vec::new();
        for entry in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (raw_key, raw_value) = entry?;
            let Some((node, entry_key)) = decode_property_key(&raw_key) else {
                continue;
            };
            if entry_key == key {
                values.push((node, bincode::deserialize(&raw_value)?));
            }
        }
        Ok(values)
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    pub fn checkpoint(&self, path: impl AsRef<Path>) -> Result<()> {
        let checkpoint = Checkpoint::new(&self.db)?;
        checkpoint.create_checkpoint(path)?;
        Ok(())
    }

    fn persist_key_names(&self, names: &[String]) -> ExportResult<()> {
        let metadata_cf = self
            .db
            .cf_handle(CF_METADATA)
            .ok_or_else(|| ExportError::transaction("missing metadata column family"))?;
        let bytes = bincode::serialize(names)?;
        self.db.put_cf(metadata_cf, KEY_PROPERTY_KEYS, bytes)?;
        Ok(())
    }
}

impl PropertySink for RocksNodeStore {
    type Tx<'a> = RocksTransaction<'a>;

    fn property_key_id(&self, name: &str) -> ExportResult<PropertyKeyId> {
        if name.is_empty() {
            return Err(ExportError::PropertyKey {
                name: name.to_string(),
                reason: "empty property key".to_string(),
            });
        }
        let mut keys = self.keys.lock();
        if let Some(id) = keys.get(name) {
            return Ok(id);
        }
        let id = keys
            .register_with(name, |names| self.persist_key_names(names))
            .map_err(|e| ExportError::PropertyKey {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
        debug!(name, key = %id, "registered property key");
        Ok(id)
    }

    fn open(&self) -> ExportResult<RocksTransaction<'_>> {
        if self.db.cf_handle(CF_NODE_PROPERTIES).is_none() {
            return Err(ExportError::transaction("missing node_properties column family"));
        }
        Ok(RocksTransaction {
            db: &self.db,
            batch: WriteBatch::default(),
        })
    }
}

/// Transaction buffering writes in a RocksDB `WriteBatch`
pub struct RocksTransaction<'a> {
    db: &'a DB,
    batch: WriteBatch,
}

impl SinkTransaction for RocksTransaction<'_> {
    fn set_property(
        &mut self,
        node: OriginalId,
        key: PropertyKeyId,
        value: PropertyValue,
    ) -> ExportResult<()> {
        let cf = self.db.cf_handle(CF_NODE_PROPERTIES).ok_or_else(|| {
            ExportError::write(node, key, "missing node_properties column family")
        })?;
        let bytes = bincode::serialize(&value)?;
        self.batch.put_cf(cf, encode_property_key(node, key), bytes);
        Ok(())
    }

    fn commit(self) -> ExportResult<()> {
        self.db
            .write(self.batch)
            .map_err(|e| ExportError::transaction(format!("commit failed: {e}")))
    }

    fn rollback(self) {
        // Nothing reached the database; dropping the batch discards it.
    }
}

fn open_db(path: impl AsRef<Path>, create_if_missing: bool) -> Result<DB> {
    let mut options = Options::default();
    options.create_if_missing(create_if_missing);
    options.create_missing_column_families(true);
    options.set_paranoid_checks(true);
    let cfs = vec![
        ColumnFamilyDescriptor::new(CF_NODE_PROPERTIES, Options::default()),
        ColumnFamilyDescriptor::new(CF_METADATA, Options::default()),
    ];
    Ok(DB::open_cf_descriptors(&options, path, cfs)?)
}

fn repair_db(path: &Path) -> Result<()> {
    let mut options = Options::default();
    options.create_if_missing(true);
    DB::repair(&options, path)?;
    Ok(())
}

fn validate_or_init_manifest(db: &DB) -> Result<()> {
    let metadata_cf = db
        .cf_handle(CF_METADATA)
        .ok_or_else(|| anyhow!("missing metadata column family"))?;
    if let Some(bytes) = db.get_cf(metadata_cf, KEY_MANIFEST)? {
        let manifest: StorageManifest = bincode::deserialize(&bytes)?;
        if manifest.format_version != STORAGE_FORMAT_VERSION {
            return Err(anyhow!(
                "storage format version mismatch: expected {}, found {}",
                STORAGE_FORMAT_VERSION,
                manifest.format_version
            ));
        }
        return Ok(());
    }

    let manifest = StorageManifest {
        format_version: STORAGE_FORMAT_VERSION,
        app_version: env!("CARGO_PKG_VERSION").to_string(),
    };
    let bytes = bincode::serialize(&manifest)?;
    db.put_cf(metadata_cf, KEY_MANIFEST, bytes)?;
    Ok(())
}

fn load_key_registry(db: &DB) -> Result<KeyRegistry> {
    let metadata_cf = db
        .cf_handle(CF_METADATA)
        .ok_or_else(|| anyhow!("missing metadata column family"))?;
    let mut registry = KeyRegistry::default();
    if let Some(bytes) = db.get_cf(metadata_cf, KEY_PROPERTY_KEYS)? {
        let names: Vec<String> = bincode::deserialize(&bytes)?;
        for name in &names {
            registry.get_or_create(name);
        }
    }
    Ok(registry)
}

fn encode_property_key(node: OriginalId, key: PropertyKeyId) -> [u8; 12] {
    let mut out = [0u8; 12];
    out[..8].copy_from_slice(&node.0.to_be_bytes());
    out[8..].copy_from_slice(&key.0.to_be_bytes());
    out
}

fn decode_property_key(raw: &[u8]) -> Option<(OriginalId, PropertyKeyId)> {
    if raw.len() != 12 {
        return None;
    }
    let node = u64::from_be_bytes(raw[..8].try_into().ok()?);
    let key = u32::from_be_bytes(raw[8..].try_into().ok()?);
    Some((OriginalId(node), PropertyKeyId(key)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_WRITE_PROPERTY;
    use tempfile::tempdir;

    #[test]
    fn test_property_key_encoding() {
        let raw = encode_property_key(OriginalId(0x0102_0304_0506_0708), PropertyKeyId(9));
        assert_eq!(&raw[..8], &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(
            decode_property_key(&raw),
            Some((OriginalId(0x0102_0304_0506_0708), PropertyKeyId(9)))
        );
        assert_eq!(decode_property_key(&raw[..11]), None);
    }

    #[test]
    fn test_commit_and_rollback() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let store = RocksNodeStore::open(dir.path())?;
        let key = store.property_key_id("component")?;

        let mut tx = store.open()?;
        tx.set_property(OriginalId(5), key, PropertyValue(2))?;
        tx.commit()?;

        let mut tx = store.open()?;
        tx.set_property(OriginalId(6), key, PropertyValue(2))?;
        tx.rollback();

        assert_eq!(store.get_property(OriginalId(5), key)?, Some(PropertyValue(2)));
        assert_eq!(store.get_property(OriginalId(6), key)?, None);
        assert_eq!(store.property_values(key)?.len(), 1);
        Ok(())
    }

    #[test]
    fn test_reopen_keeps_keys_and_values() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let (component, community) = {
            let store = RocksNodeStore::open(dir.path())?;
            let component = store.property_key_id("component")?;
            let community = store.property_key_id("community")?;
            let mut tx = store.open()?;
            tx.set_property(OriginalId(1), community, PropertyValue(-4))?;
            tx.commit()?;
            store.flush()?;
            (component, community)
        };

        let store = RocksNodeStore::open(dir.path())?;
        assert_eq!(store.property_key("component"), Some(component));
        assert_eq!(store.property_key_id("community")?, community);
        assert_eq!(
            store.get_property(OriginalId(1), community)?,
            Some(PropertyValue(-4))
        );
        Ok(())
    }

    #[test]
    fn test_from_config() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let mut config = ExportConfig::default();
        assert!(RocksNodeStore::from_config(&config).is_err());

        config.storage.path = Some(dir.path().join("missing"));
        config.storage.create_if_missing = false;
        assert!(RocksNodeStore::from_config(&config).is_err());

        config.storage.create_if_missing = true;
        let store = RocksNodeStore::from_config(&config)?;
        let key = store.property_key_id(&config.write_property)?;
        assert_eq!(store.property_key(DEFAULT_WRITE_PROPERTY), Some(key));
        Ok(())
    }

    #[test]
    fn test_checkpoint() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let store = RocksNodeStore::open(dir.path().join("db"))?;
        let key = store.property_key_id("component")?;
        let mut tx = store.open()?;
        tx.set_property(OriginalId(1), key, PropertyValue(1))?;
        tx.commit()?;

        let snapshot = dir.path().join("snapshot");
        store.checkpoint(&snapshot)?;
        let restored = RocksNodeStore::open(&snapshot)?;
        assert_eq!(restored.get_property(OriginalId(1), key)?, Some(PropertyValue(1)));
        Ok(())
    }
}
