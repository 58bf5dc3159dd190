//! Command-list-local resource state tracking.

use std::collections::HashMap;
use std::sync::Arc;

use crate::resource::{Resource, ResourceUid};
use crate::state::{ALL_SUBRESOURCES, ResourceStates, SubresourceStates};

use super::barrier::{ResourceBarrier, ResourceBarrierBatch};

/// A transition requested before the list knew the resource's state.
///
/// The real "before" state depends on what earlier lists on the queue left
/// behind, so it is resolved only when the list is submitted.
#[derive(Debug, Clone)]
pub struct PendingResourceBarrier {
    pub resource: Arc<Resource>,
    pub state: ResourceStates,
    pub subresource: u32,
}

#[derive(Debug)]
struct TrackedResource {
    resource: Arc<Resource>,
    state: SubresourceStates,
}

/// States of every resource touched by one command list.
#[derive(Debug, Default)]
pub struct ResourceStateTracker {
    resources: HashMap<ResourceUid, TrackedResource>,
}

impl ResourceStateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request `resource` (or one subresource of it) to be in `target`.
    ///
    /// Unknown list-local states produce pending barriers; known states that
    /// differ from `target` produce immediate transitions in `batch`. The
    /// list-local state is updated either way.
    ///
    /// `flush` is called whenever `batch` is full and another transition has
    /// to go in, so a whole-resource request on a texture with more
    /// subresources than the batch holds never overflows it.
    pub fn transition(
        &mut self,
        resource: &Arc<Resource>,
        target: ResourceStates,
        subresource: u32,
        batch: &mut ResourceBarrierBatch,
        pending: &mut Vec<PendingResourceBarrier>,
        flush: &mut dyn FnMut(&mut ResourceBarrierBatch),
    ) {
        let tracked = self
            .resources
            .entry(resource.uid())
            .or_insert_with(|| TrackedResource {
                resource: resource.clone(),
                state: SubresourceStates::unknown(resource.subresource_count()),
            });

        let mut request = |subresource: u32, before: Option<ResourceStates>| match before {
            None => pending.push(PendingResourceBarrier {
                resource: resource.clone(),
                state: target,
                subresource,
            }),
            Some(before) if before != target => {
                if batch.remaining() == 0 {
                    flush(batch);
                }
                batch.push(ResourceBarrier::Transition {
                    resource: resource.clone(),
                    subresource,
                    before,
                    after: target,
                });
            }
            Some(_) => {}
        };

        if subresource == ALL_SUBRESOURCES && !tracked.state.is_uniform() {
            for (index, before) in tracked.state.iter() {
                request(index, before);
            }
        } else {
            request(subresource, tracked.state.subresource_state(subresource_or_first(subresource)));
        }

        tracked.state.set_subresource_state(subresource, target);
    }

    /// List-local state of a resource, if this list touched it.
    pub fn state(&self, uid: ResourceUid) -> Option<&SubresourceStates> {
        self.resources.get(&uid).map(|tracked| &tracked.state)
    }

    /// Every resource this list touched.
    pub fn resources(&self) -> impl Iterator<Item = &Arc<Resource>> {
        self.resources.values().map(|tracked| &tracked.resource)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn clear(&mut self) {
        self.resources.clear();
    }
}

/// Uniform trackers answer for any index; `ALL_SUBRESOURCES` maps to slot 0.
fn subresource_or_first(subresource: u32) -> u32 {
    if subresource == ALL_SUBRESOURCES {
        0
    } else {
        subresource
    }
}
