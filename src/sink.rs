//! # Write Sink
//!
//! Boundary to the node store that receives exported properties. A sink hands
//! out scoped transactions; each export partition writes through exactly one.

use crate::error::Result;
use crate::model::{OriginalId, PropertyKeyId, PropertyValue};
use tracing::warn;

/// A node store that accepts property writes inside transactions.
pub trait PropertySink: Sync {
    type Tx<'a>: SinkTransaction
    where
        Self: 'a;

    /// Resolve (or register) the storage token for a property key name.
    fn property_key_id(&self, name: &str) -> Result<PropertyKeyId>;

    /// Open a new transaction.
    fn open(&self) -> Result<Self::Tx<'_>>;
}

/// A scoped unit of work against the node store.
///
/// Writes become visible only after [`commit`](SinkTransaction::commit).
pub trait SinkTransaction: Send {
    fn set_property(
        &mut self,
        node: OriginalId,
        key: PropertyKeyId,
        value: PropertyValue,
    ) -> Result<()>;

    fn commit(self) -> Result<()>;

    fn rollback(self);
}

/// Owns an open transaction and rolls it back on drop unless committed.
///
/// Covers every exit path of a partition worker: early return on a write
/// error, cancellation, and unwinding out of a panicking value function.
pub struct TransactionGuard<T: SinkTransaction> {
    tx: Option<T>,
}

impl<T: SinkTransaction> TransactionGuard<T> {
    pub fn new(tx: T) -> Self {
        Self { tx: Some(tx) }
    }

    #[inline]
    pub fn set_property(
        &mut self,
        node: OriginalId,
        key: PropertyKeyId,
        value: PropertyValue,
    ) -> Result<()> {
        match self.tx.as_mut() {
            Some(tx) => tx.set_property(node, key, value),
            None => unreachable!("transaction already released"),
        }
    }

    pub fn commit(mut self) -> Result<()> {
        match self.tx.take() {
            Some(tx) => tx.commit(),
            None => Ok(()),
        }
    }

    pub fn rollback(mut self) {
        if let Some(tx) = self.tx.take() {
            tx.rollback();
        }
    }
}

impl<T: SinkTransaction> Drop for TransactionGuard<T> {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            if std::thread::panicking() {
                warn!("rolling back transaction while unwinding");
            }
            tx.rollback();
        }
    }
}
