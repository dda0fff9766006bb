use legato_domain_eval::{ComboState, HeldNote, Judge, PedalEvent, StudentNote};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;

/// Immutable view of a running performance, published by the capture
/// thread after every batch that changed something.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PerformanceSnapshot {
    pub notes: Vec<StudentNote>,
    pub pedals: Vec<PedalEvent>,
    pub held: Vec<HeldNote>,
    pub pedal_down: bool,
    pub combo: ComboState,
}

impl PerformanceSnapshot {
    pub fn from_judge(judge: &Judge, held: Vec<HeldNote>, pedal_down: bool) -> Self {
        Self {
            notes: judge.notes().to_vec(),
            pedals: judge.pedals().to_vec(),
            held,
            pedal_down,
            combo: judge.combo(),
        }
    }
}

/// Write side. While recording only the capture thread publishes.
#[derive(Clone, Default)]
pub struct SnapshotCell {
    inner: Arc<Mutex<Arc<PerformanceSnapshot>>>,
}

impl SnapshotCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, snapshot: PerformanceSnapshot) {
        *self.inner.lock() = Arc::new(snapshot);
    }

    pub fn clear(&self) {
        self.publish(PerformanceSnapshot::default());
    }

    pub fn reader(&self) -> SnapshotReader {
        SnapshotReader {
            inner: self.inner.clone(),
        }
    }
}

#[derive(Clone)]
pub struct SnapshotReader {
    inner: Arc<Mutex<Arc<PerformanceSnapshot>>>,
}

impl SnapshotReader {
    pub fn latest(&self) -> Arc<PerformanceSnapshot> {
        self.inner.lock().clone()
    }
}
