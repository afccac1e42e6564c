//! # Store Module
//!
//! In-memory transactional node property store. Transactions buffer their
//! writes and apply them atomically on commit; rolled back transactions leave
//! no trace.

use crate::error::{ExportError, Result};
use crate::model::{OriginalId, PropertyKeyId, PropertyValue};
use crate::sink::{PropertySink, SinkTransaction};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Registry of property key names, assigning dense tokens in first-seen order
#[derive(Debug, Default)]
pub(crate) struct KeyRegistry {
    ids: FxHashMap<String, PropertyKeyId>,
    names: Vec<String>,
}

impl KeyRegistry {
    pub(crate) fn get_or_create(&mut self, name: &str) -> PropertyKeyId {
        if let Some(&id) = self.ids.get(name) {
            return id;
        }
        let id = PropertyKeyId(self.names.len() as u32);
        self.names.push(name.to_string());
        self.ids.insert(name.to_string(), id);
        id
    }

    pub(crate) fn get(&self, name: &str) -> Option<PropertyKeyId> {
        self.ids.get(name).copied()
    }

    pub(crate) fn name(&self, id: PropertyKeyId) -> Option<&str> {
        self.names.get(id.0 as usize).map(String::as_str)
    }

    /// Names in token order
    pub(crate) fn names(&self) -> &[String] {
        &self.names
    }

    /// Register `name`, handing the would-be name list to `persist` first.
    ///
    /// The registry only changes once `persist` succeeds, so a token is never
    /// handed out that the backing store does not know about.
    pub(crate) fn register_with<F>(&mut self, name: &str, persist: F) -> Result<PropertyKeyId>
    where
        F: FnOnce(&[String]) -> Result<()>,
    {
        if let Some(id) = self.get(name) {
            return Ok(id);
        }
        let mut staged = self.names.clone();
        staged.push(name.to_string());
        persist(&staged)?;
        Ok(self.get_or_create(name))
    }
}

/// Store counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub commits: u64,
    pub rollbacks: u64,
    pub open_transactions: usize,
    pub writes_committed: u64,
    pub property_count: usize,
}

/// Thread-safe in-memory node store
#[derive(Debug, Default)]
pub struct MemoryNodeStore {
    properties: RwLock<FxHashMap<(OriginalId, PropertyKeyId), PropertyValue>>,
    keys: Mutex<KeyRegistry>,
    commits: AtomicU64,
    rollbacks: AtomicU64,
    writes_committed: AtomicU64,
    open_transactions: AtomicUsize,
}

impl MemoryNodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed value of `key` on `node`
    pub fn get_property(&self, node: OriginalId, key: PropertyKeyId) -> Option<PropertyValue> {
        self.properties.read().get(&(node, key)).copied()
    }

    /// Committed value of the property named `name` on `node`
    pub fn get_property_by_name(&self, node: OriginalId, name: &str) -> Option<PropertyValue> {
        let key = self.keys.lock().get(name)?;
        self.get_property(node, key)
    }

    /// All committed values of `key`, ordered by node
    pub fn property_values(&self, key: PropertyKeyId) -> Vec<(OriginalId, PropertyValue)> {
        let mut values: Vec<(OriginalId, PropertyValue)> = self
            .properties
            .read()
            .iter()
            .filter(|((_, k), _)| *k == key)
            .map(|((node, _), value)| (*node, *value))
            .collect();
        values.sort_unstable_by_key(|(node, _)| *node);
        values
    }

    pub fn property_key_name(&self, key: PropertyKeyId) -> Option<String> {
        self.keys.lock().name(key).map(str::to_string)
    }

    pub fn property_count(&self) -> usize {
        self.properties.read().len()
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            commits: self.commits.load(Ordering::Relaxed),
            rollbacks: self.rollbacks.load(Ordering::Relaxed),
            open_transactions: self.open_transactions.load(Ordering::Relaxed),
            writes_committed: self.writes_committed.load(Ordering::Relaxed),
            property_count: self.property_count(),
        }
    }
}

impl PropertySink for MemoryNodeStore {
    type Tx<'a> = MemoryTransaction<'a>;

    fn property_key_id(&self, name: &str) -> Result<PropertyKeyId> {
        if name.is_empty() {
            return Err(ExportError::PropertyKey {
                name: name.to_string(),
                reason: "empty property key".to_string(),
            });
        }
        Ok(self.keys.lock().get_or_create(name))
    }

    fn open(&self) -> Result<MemoryTransaction<'_>> {
        self.open_transactions.fetch_add(1, Ordering::Relaxed);
        Ok(MemoryTransaction {
            store: self,
            pending: Vec::new(),
        })
    }
}

/// Transaction against a [`MemoryNodeStore`]
#[derive(Debug)]
pub struct MemoryTransaction<'a> {
    store: &'a MemoryNodeStore,
    pending: Vec<(OriginalId, PropertyKeyId, PropertyValue)>,
}

impl MemoryTransaction<'_> {
    /// Number of buffered, uncommitted writes
    pub fn pending_writes(&self) -> usize {
        self.pending.len()
    }
}

impl SinkTransaction for MemoryTransaction<'_> {
    fn set_property(
        &mut self,
        node: OriginalId,
        key: PropertyKeyId,
        value: PropertyValue,
    ) -> Result<()> {
        self.pending.push((node, key, value));
        Ok(())
    }

    fn commit(self) -> Result<()> {
        let written = self.pending.len() as u64;
        {
            let mut properties = self.store.properties.write();
            properties.reserve(self.pending.len());
            for (node, key, value) in self.pending {
                properties.insert((node, key), value);
            }
        }
        self.store
            .writes_committed
            .fetch_add(written, Ordering::Relaxed);
        self.store.commits.fetch_add(1, Ordering::Relaxed);
        self.store.open_transactions.fetch_sub(1, Ordering::Relaxed);
        Ok(())
    }

    fn rollback(self) {
        self.store.rollbacks.fetch_add(1, Ordering::Relaxed);
        self.store.open_transactions.fetch_sub(1, Ordering::Relaxed);
    }
}
