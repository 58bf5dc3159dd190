//! Resource barriers and fixed-capacity barrier batching.

use std::fmt;
use std::sync::Arc;

use crate::resource::Resource;
use crate::state::{ALL_SUBRESOURCES, ResourceStates};

/// Maximum number of barriers a batch holds between flushes.
pub const MAX_BATCHED_BARRIERS: usize = 64;

/// A synchronization point recorded into a command list.
#[derive(Clone)]
pub enum ResourceBarrier {
    /// Change the usage state of a resource or one of its subresources.
    Transition {
        resource: Arc<Resource>,
        subresource: u32,
        before: ResourceStates,
        after: ResourceStates,
    },
    /// Switch which of two placed resources owns aliased memory.
    Aliasing {
        before: Option<Arc<Resource>>,
        after: Option<Arc<Resource>>,
    },
    /// Order unordered-access writes. `None` orders all UAV accesses.
    Uav { resource: Option<Arc<Resource>> },
}

impl ResourceBarrier {
    pub fn is_transition(&self) -> bool {
        matches!(self, Self::Transition { .. })
    }
}

impl fmt::Debug for ResourceBarrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transition {
                resource,
                subresource,
                before,
                after,
            } => {
                let mut s = f.debug_struct("Transition");
                s.field("resource", &resource.name());
                if *subresource == ALL_SUBRESOURCES {
                    s.field("subresource", &"all");
                } else {
                    s.field("subresource", subresource);
                }
                s.field("before", before).field("after", after).finish()
            }
            Self::Aliasing { before, after } => f
                .debug_struct("Aliasing")
                .field("before", &before.as_ref().map(|r| r.name()))
                .field("after", &after.as_ref().map(|r| r.name()))
                .finish(),
            Self::Uav { resource } => f
                .debug_struct("Uav")
                .field("resource", &resource.as_ref().map(|r| r.name()))
                .finish(),
        }
    }
}

/// Barriers accumulated by a command list until the next flush.
///
/// The batch holds at most [`MAX_BATCHED_BARRIERS`] entries. Callers flush
/// before it fills; pushing into a full batch is a contract violation.
#[derive(Debug)]
pub struct ResourceBarrierBatch {
    barriers: Vec<ResourceBarrier>,
}

impl ResourceBarrierBatch {
    pub fn new() -> Self {
        Self {
            barriers: Vec::with_capacity(MAX_BATCHED_BARRIERS),
        }
    }

    /// Append a barrier.
    ///
    /// # Panics
    ///
    /// Panics if the batch already holds [`MAX_BATCHED_BARRIERS`] barriers.
    pub fn push(&mut self, barrier: ResourceBarrier) {
        assert!(
            self.barriers.len() < MAX_BATCHED_BARRIERS,
            "Resource barrier batch overflow: flush before exceeding {MAX_BATCHED_BARRIERS} barriers"
        );
        self.barriers.push(barrier);
    }

    pub fn len(&self) -> usize {
        self.barriers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.barriers.is_empty()
    }

    /// Free slots left before the batch must be flushed.
    pub fn remaining(&self) -> usize {
        MAX_BATCHED_BARRIERS - self.barriers.len()
    }

    pub fn as_slice(&self) -> &[ResourceBarrier] {
        &self.barriers
    }

    pub fn clear(&mut self) {
        self.barriers.clear();
    }
}

impl Default for ResourceBarrierBatch {
    fn default() -> Self {
        Self::new()
    }
}
