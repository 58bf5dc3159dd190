//! Command list recording with deferred barrier resolution.
//!
//! A [`CommandListHandle`] is one recording context. It owns:
//!
//! - a [`ResourceStateTracker`] with the state of every resource it touched,
//! - the [`PendingResourceBarrier`]s recorded on first touch,
//! - a [`ResourceBarrierBatch`] flushed as a single native barrier call.
//!
//! Lists are obtained from and returned to a
//! [`CommandQueue`](crate::queue::CommandQueue), which resolves the pending
//! barriers against the queue-global state at submission.

mod allocator;
mod barrier;
mod tracker;

pub use allocator::{CommandAllocator, CommandAllocatorPool};
pub use barrier::{MAX_BATCHED_BARRIERS, ResourceBarrier, ResourceBarrierBatch};
pub use tracker::{PendingResourceBarrier, ResourceStateTracker};

use std::sync::Arc;

use cinder_core::pool::Poolable;

use crate::backend::{GpuBackend, GpuCommandList};
use crate::error::GraphicsError;
use crate::queue::QueueKind;
use crate::resource::{Resource, ResourceUid};
use crate::state::{ResourceStates, SubresourceStates};

/// Recording state recycled between command lists.
///
/// Holds a reference to every resource the list touched. After submission it
/// stays with the list's allocator until the GPU is done with them.
#[derive(Debug, Default)]
pub struct CommandListState {
    tracker: ResourceStateTracker,
    pending: Vec<PendingResourceBarrier>,
    batch: ResourceBarrierBatch,
    /// Resources named only by aliasing and UAV barriers.
    untracked: Vec<Arc<Resource>>,
}

impl CommandListState {
    /// Resources this state keeps alive.
    pub fn referenced_resource_count(&self) -> usize {
        self.tracker.len() + self.untracked.len()
    }
}

impl Poolable for CommandListState {
    fn new_empty() -> Self {
        Self::default()
    }

    fn reset(&mut self) {
        self.tracker.clear();
        self.pending.clear();
        self.batch.clear();
        self.untracked.clear();
    }
}

/// A command list being recorded for a queue.
pub struct CommandListHandle {
    label: String,
    kind: QueueKind,
    backend: Arc<dyn GpuBackend>,
    native: GpuCommandList,
    allocator: CommandAllocator,
    state: CommandListState,
    closed: bool,
}

impl CommandListHandle {
    pub(crate) fn new(
        label: impl Into<String>,
        kind: QueueKind,
        backend: Arc<dyn GpuBackend>,
        native: GpuCommandList,
        allocator: CommandAllocator,
        state: CommandListState,
    ) -> Self {
        Self {
            label: label.into(),
            kind,
            backend,
            native,
            allocator,
            state,
            closed: false,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn kind(&self) -> QueueKind {
        self.kind
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Request a state transition for a resource or one of its subresources.
    ///
    /// A full batch is flushed in the middle of the request, so addressing
    /// every subresource of a large texture is always safe.
    ///
    /// # Panics
    ///
    /// Panics if the list is closed.
    pub fn transition_barrier(
        &mut self,
        resource: &Arc<Resource>,
        state: ResourceStates,
        subresource: u32,
    ) {
        assert!(!self.closed, "Command list '{}' is closed", self.label);
        let CommandListState {
            tracker,
            pending,
            batch,
            ..
        } = &mut self.state;
        let backend = &self.backend;
        let native = &mut self.native;
        let label = &self.label;
        tracker.transition(
            resource,
            state,
            subresource,
            batch,
            pending,
            &mut |full: &mut ResourceBarrierBatch| {
                log::trace!(
                    "CommandList '{label}': batch full, flushing {} barriers",
                    full.len()
                );
                backend.record_barriers(native, full.as_slice());
                full.clear();
            },
        );
    }

    /// Record an aliasing barrier between two placed resources.
    pub fn aliasing_barrier(&mut self, before: Option<&Arc<Resource>>, after: Option<&Arc<Resource>>) {
        assert!(!self.closed, "Command list '{}' is closed", self.label);
        self.reserve_barrier();
        self.state
            .untracked
            .extend(before.into_iter().chain(after).cloned());
        self.state.batch.push(ResourceBarrier::Aliasing {
            before: before.cloned(),
            after: after.cloned(),
        });
    }

    /// Record an unordered-access barrier. `None` orders every UAV access.
    pub fn uav_barrier(&mut self, resource: Option<&Arc<Resource>>) {
        assert!(!self.closed, "Command list '{}' is closed", self.label);
        self.reserve_barrier();
        self.state.untracked.extend(resource.cloned());
        self.state.batch.push(ResourceBarrier::Uav {
            resource: resource.cloned(),
        });
    }

    fn reserve_barrier(&mut self) {
        if self.state.batch.remaining() == 0 {
            self.flush_resource_barriers();
        }
    }

    /// Record all batched barriers as one native call and clear the batch.
    pub fn flush_resource_barriers(&mut self) {
        if self.state.batch.is_empty() {
            return;
        }
        cinder_core::profile_scope!("flush_resource_barriers");
        log::trace!(
            "CommandList '{}': flushing {} barriers",
            self.label,
            self.state.batch.len()
        );
        self.backend
            .record_barriers(&mut self.native, self.state.batch.as_slice());
        self.state.batch.clear();
    }

    /// Barriers waiting in the batch.
    pub fn batched_barrier_count(&self) -> usize {
        self.state.batch.len()
    }

    /// Transitions deferred until submission.
    pub fn pending_barriers(&self) -> &[PendingResourceBarrier] {
        &self.state.pending
    }

    /// List-local state of a resource, if this list touched it.
    pub fn resource_state(&self, uid: ResourceUid) -> Option<&SubresourceStates> {
        self.state.tracker.state(uid)
    }

    /// Flush remaining barriers and finish recording.
    ///
    /// Closing an already closed list does nothing.
    pub fn close(&mut self) -> Result<(), GraphicsError> {
        if self.closed {
            return Ok(());
        }
        self.flush_resource_barriers();
        self.backend.end_command_list(&mut self.native)?;
        self.closed = true;
        Ok(())
    }

    /// Record resolved transitions directly, bypassing state tracking.
    pub(crate) fn record_resolved_barriers(&mut self, barriers: Vec<ResourceBarrier>) {
        for chunk in barriers.chunks(MAX_BATCHED_BARRIERS) {
            self.backend.record_barriers(&mut self.native, chunk);
        }
    }

    pub(crate) fn native(&self) -> &GpuCommandList {
        &self.native
    }

    pub(crate) fn into_parts(self) -> (GpuCommandList, CommandAllocator, CommandListState) {
        (self.native, self.allocator, self.state)
    }
}

impl std::fmt::Debug for CommandListHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandListHandle")
            .field("label", &self.label)
            .field("kind", &self.kind)
            .field("closed", &self.closed)
            .field("pending", &self.state.pending.len())
            .field("batched", &self.state.batch.len())
            .finish_non_exhaustive()
    }
}
