use serde::{Deserialize, Serialize};

use crate::Labels;

/// Lifecycle phase of a workload as observed from the cluster.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WorkloadPhase {
    Creating,
    Ready,
    Deleting,
}

/// Snapshot of a workload's replica counters.
///
/// Owned by the cluster substrate. Berth never caches one of these: every decision is made on a
/// fresh read or on an object carried by a watch event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadState {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub labels: Labels,
    pub desired_replicas: u32,
    pub ready_replicas: u32,
    pub available_replicas: u32,
    /// Set once deletion has been requested.
    #[serde(default)]
    pub deleting: bool,
}

impl WorkloadState {
    /// `ready == available == desired`.
    pub fn is_ready(&self) -> bool {
        self.ready_replicas == self.available_replicas
            && self.available_replicas == self.desired_replicas
    }

    pub fn phase(&self) -> WorkloadPhase {
        if self.deleting {
            WorkloadPhase::Deleting
        } else if self.is_ready() {
            WorkloadPhase::Ready
        } else {
            WorkloadPhase::Creating
        }
    }
}

/// Kind of change carried by a watch event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WatchEventKind {
    Added,
    Modified,
    Deleted,
}

/// One entry of a workload change stream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchEvent {
    pub kind: WatchEventKind,
    pub object: WorkloadState,
}

impl WatchEvent {
    pub fn new(kind: WatchEventKind, object: WorkloadState) -> Self {
        Self { kind, object }
    }
}
