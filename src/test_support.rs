use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustc_hash::FxHashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use dss_export::{
    DisjointSetStruct, ExportError, NodeId, OriginalId, PropertyKeyId, PropertySink,
    PropertyValue, SinkTransaction,
};

/// Sink wrapper that injects failures into an inner sink.
#[allow(dead_code)]
pub struct FaultySink<S> {
    inner: S,
    fail_nodes: FxHashSet<OriginalId>,
    failing_opens: AtomicUsize,
    fail_commits: bool,
}

#[allow(dead_code)]
impl<S: PropertySink> FaultySink<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            fail_nodes: FxHashSet::default(),
            failing_opens: AtomicUsize::new(0),
            fail_commits: false,
        }
    }

    /// Reject writes to these nodes
    pub fn failing_writes(mut self, nodes: impl IntoIterator<Item = OriginalId>) -> Self {
        self.fail_nodes.extend(nodes);
        self
    }

    /// Fail the next `count` transaction opens
    pub fn failing_opens(self, count: usize) -> Self {
        self.failing_opens.store(count, Ordering::Relaxed);
        self
    }

    /// Fail every commit
    pub fn failing_commits(mut self) -> Self {
        self.fail_commits = true;
        self
    }

    /// Stop injecting failures
    pub fn heal(&mut self) {
        self.fail_nodes.clear();
        self.failing_opens.store(0, Ordering::Relaxed);
        self.fail_commits = false;
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: PropertySink> PropertySink for FaultySink<S> {
    type Tx<'a>
        = FaultyTx<'a, S::Tx<'a>>
    where
        Self: 'a;

    fn property_key_id(&self, name: &str) -> dss_export::Result<PropertyKeyId> {
        self.inner.property_key_id(name)
    }

    fn open(&self) -> dss_export::Result<Self::Tx<'_>> {
        let remaining = self.failing_opens.load(Ordering::Relaxed);
        if remaining > 0
            && self
                .failing_opens
                .compare_exchange(remaining, remaining - 1, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
        {
            return Err(ExportError::transaction("injected open failure"));
        }
        Ok(FaultyTx {
            inner: self.inner.open()?,
            fail_nodes: &self.fail_nodes,
            fail_commit: self.fail_commits,
        })
    }
}

pub struct FaultyTx<'a, T> {
    inner: T,
    fail_nodes: &'a FxHashSet<OriginalId>,
    fail_commit: bool,
}

impl<T: SinkTransaction> SinkTransaction for FaultyTx<'_, T> {
    fn set_property(
        &mut self,
        node: OriginalId,
        key: PropertyKeyId,
        value: PropertyValue,
    ) -> dss_export::Result<()> {
        if self.fail_nodes.contains(&node) {
            return Err(ExportError::write(node, key, "injected write failure"));
        }
        self.inner.set_property(node, key, value)
    }

    fn commit(self) -> dss_export::Result<()> {
        if self.fail_commit {
            self.inner.rollback();
            return Err(ExportError::transaction("injected commit failure"));
        }
        self.inner.commit()
    }

    fn rollback(self) {
        self.inner.rollback();
    }
}

/// Sink that keeps, per committed transaction, the nodes in write order.
#[allow(dead_code)]
#[derive(Default)]
pub struct RecordingSink {
    committed: Mutex<Vec<Vec<OriginalId>>>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transactions(&self) -> Vec<Vec<OriginalId>> {
        self.committed.lock().clone()
    }
}

impl PropertySink for RecordingSink {
    type Tx<'a> = RecordingTx<'a>;

    fn property_key_id(&self, _name: &str) -> dss_export::Result<PropertyKeyId> {
        Ok(PropertyKeyId(0))
    }

    fn open(&self) -> dss_export::Result<RecordingTx<'_>> {
        Ok(RecordingTx {
            sink: self,
            writes: Vec::new(),
        })
    }
}

pub struct RecordingTx<'a> {
    sink: &'a RecordingSink,
    writes: Vec<OriginalId>,
}

impl SinkTransaction for RecordingTx<'_> {
    fn set_property(
        &mut self,
        node: OriginalId,
        _key: PropertyKeyId,
        _value: PropertyValue,
    ) -> dss_export::Result<()> {
        self.writes.push(node);
        Ok(())
    }

    fn commit(self) -> dss_export::Result<()> {
        self.sink.committed.lock().push(self.writes);
        Ok(())
    }

    fn rollback(self) {}
}

/// Random union pairs over `[0, n)`
#[allow(dead_code)]
pub fn random_unions(n: u32, count: usize, seed: u64) -> Vec<(NodeId, NodeId)> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            let a = rng.random_range(0..n);
            let b = rng.random_range(0..n);
            (NodeId(a), NodeId(b))
        })
        .collect()
}

/// Build a union-find structure from `unions`
#[allow(dead_code)]
pub fn build_dsu(n: usize, unions: &[(NodeId, NodeId)]) -> DisjointSetStruct {
    let mut dsu = DisjointSetStruct::new(n);
    for &(a, b) in unions {
        dsu.union(a, b);
    }
    dsu
}

/// Component labels computed by graph traversal, independent of the DSU.
///
/// Two ids share a label iff they are connected by a chain of unions.
#[allow(dead_code)]
pub fn reference_labels(n: usize, unions: &[(NodeId, NodeId)]) -> Vec<usize> {
    let mut adjacency = vec![Vec::new(); n];
    for &(a, b) in unions {
        adjacency[a.0 as usize].push(b.0 as usize);
        adjacency[b.0 as usize].push(a.0 as usize);
    }

    let mut labels = vec![usize::MAX; n];
    for start in 0..n {
        if labels[start] != usize::MAX {
            continue;
        }
        labels[start] = start;
        let mut stack = vec![start];
        while let Some(node) = stack.pop() {
            for &next in &adjacency[node] {
                if labels[next] == usize::MAX {
                    labels[next] = start;
                    stack.push(next);
                }
            }
        }
    }
    labels
}
