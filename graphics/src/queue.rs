//! Command queues and submission-time barrier resolution.
//!
//! A [`CommandQueue`] owns one hardware queue and the [`Fence`] it signals.
//! Command lists come from the queue ([`CommandQueue::request_command_list`])
//! and go back to it through [`CommandQueue::execute_command_lists`] or
//! [`CommandQueue::discard_command_list`].
//!
//! # Barrier resolution
//!
//! A list does not know what state earlier lists left a resource in, so its
//! first touch of every resource is recorded as a pending barrier. On
//! submission each pending barrier is resolved against the queue-global state
//! stored in the [`Resource`](crate::resource::Resource). When anything needs a
//! transition, a short barrier-only list is recorded and submitted immediately
//! before the list that needs it:
//!
//! ```text
//! submit([barriers(A)?, A, barriers(B)?, B, ...]) -> signal(fence, n)
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::backend::{GpuBackend, GpuCommandList, GpuQueue};
use crate::command::{CommandAllocatorPool, CommandListHandle, ResourceBarrier};
use crate::error::GraphicsError;
use crate::resource::{Resource, ResourceUid};
use crate::state::{SubresourceStates, resolve_pending_barrier};
use crate::sync::{Fence, SyncHandle};

/// Kind of work a queue accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueKind {
    /// Graphics, compute and copy work.
    Graphics,
    /// Compute and copy work.
    Compute,
    /// Copy work only.
    Copy,
}

/// Descriptor for creating a command queue.
#[derive(Debug, Clone)]
pub struct CommandQueueDescriptor {
    pub label: Option<String>,
    pub kind: QueueKind,
}

impl CommandQueueDescriptor {
    pub fn new(kind: QueueKind) -> Self {
        Self { label: None, kind }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

impl Default for CommandQueueDescriptor {
    fn default() -> Self {
        Self::new(QueueKind::Graphics)
    }
}

/// A hardware submission queue with its fence and recording pools.
///
/// Dropping the queue blocks until the GPU has finished everything submitted
/// to it.
pub struct CommandQueue {
    label: String,
    kind: QueueKind,
    backend: Arc<dyn GpuBackend>,
    native: GpuQueue,
    fence: Arc<Fence>,
    allocator_pool: CommandAllocatorPool,
    /// Serializes barrier resolution, submission and signaling.
    submit_lock: Mutex<()>,
}

impl CommandQueue {
    pub fn new(
        backend: Arc<dyn GpuBackend>,
        descriptor: &CommandQueueDescriptor,
    ) -> Result<Self, GraphicsError> {
        let label = descriptor
            .label
            .clone()
            .unwrap_or_else(|| format!("{:?} queue", descriptor.kind));
        let native = backend.create_queue(descriptor.kind)?;
        let fence = Arc::new(Fence::new(backend.clone(), format!("{label} fence"))?);
        log::debug!("Created command queue '{label}' ({:?})", descriptor.kind);

        Ok(Self {
            label,
            kind: descriptor.kind,
            allocator_pool: CommandAllocatorPool::new(backend.clone(), descriptor.kind),
            backend,
            native,
            fence,
            submit_lock: Mutex::new(()),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn kind(&self) -> QueueKind {
        self.kind
    }

    pub fn fence(&self) -> &Arc<Fence> {
        &self.fence
    }

    pub fn native(&self) -> &GpuQueue {
        &self.native
    }

    /// Allocators parked in this queue's pool, in flight or reusable.
    pub fn allocator_count(&self) -> usize {
        self.allocator_pool.len()
    }

    /// Start recording a new command list for this queue.
    pub fn request_command_list(
        &self,
        label: impl Into<String>,
    ) -> Result<CommandListHandle, GraphicsError> {
        let label = label.into();
        let (allocator, state) = self.allocator_pool.request()?;
        let native = match self.backend.begin_command_list(allocator.native(), &label) {
            Ok(native) => native,
            Err(err) => {
                self.allocator_pool.discard(allocator, state);
                return Err(err);
            }
        };
        Ok(CommandListHandle::new(
            label,
            self.kind,
            self.backend.clone(),
            native,
            allocator,
            state,
        ))
    }

    /// Drop a list without submitting it.
    ///
    /// Its allocator keeps the sync handle of its previous submission.
    pub fn discard_command_list(&self, list: CommandListHandle) {
        let (_, allocator, state) = list.into_parts();
        self.allocator_pool.discard(allocator, state);
    }

    /// Submit command lists in order and signal the fence once.
    ///
    /// Every list is closed first. Pending barriers are resolved against the
    /// queue-global resource states; lists that need transitions get a
    /// barrier-only list placed immediately before them. All lists go to the
    /// device in a single submission, and the queue-global states are only
    /// updated once the device has accepted it.
    ///
    /// Every resource a list touched stays alive until the returned handle
    /// completes. Blocks until the GPU has finished when
    /// `wait_for_completion` is set.
    ///
    /// # Errors
    ///
    /// If recording the barrier lists or the submission itself fails, the
    /// lists go back to the pool unsubmitted and resource states are left as
    /// they were.
    pub fn execute_command_lists(
        &self,
        lists: impl IntoIterator<Item = CommandListHandle>,
        wait_for_completion: bool,
    ) -> Result<SyncHandle, GraphicsError> {
        cinder_core::profile_scope!("execute_command_lists");

        let mut lists: Vec<CommandListHandle> = lists.into_iter().collect();
        let mut closed = Ok(());
        for list in &mut lists {
            assert_eq!(
                list.kind(),
                self.kind,
                "Command list '{}' submitted to a {:?} queue",
                list.label(),
                self.kind
            );
            if closed.is_ok() {
                closed = list.close();
            }
        }
        if let Err(err) = closed {
            for list in lists {
                self.discard_command_list(list);
            }
            return Err(err);
        }

        let sync = {
            let _submission = self.submit_lock.lock();

            let mut staged = HashMap::new();
            let planned: Vec<(Vec<ResourceBarrier>, CommandListHandle)> = lists
                .into_iter()
                .map(|list| (resolve_list_barriers(&list, &mut staged), list))
                .collect();

            let mut ordered = Vec::with_capacity(planned.len() * 2);
            let mut failure = None;
            for (barriers, list) in planned {
                if failure.is_none() && !barriers.is_empty() {
                    log::trace!(
                        "Queue '{}': {} transitions ahead of '{}'",
                        self.label,
                        barriers.len(),
                        list.label()
                    );
                    match self.record_barrier_list(list.label(), barriers) {
                        Ok(barrier_list) => ordered.push(barrier_list),
                        Err(err) => failure = Some(err),
                    }
                }
                ordered.push(list);
            }

            let submitted = match failure {
                Some(err) => Err(err),
                None => {
                    let natives: Vec<&GpuCommandList> =
                        ordered.iter().map(|list| list.native()).collect();
                    self.backend.submit(&self.native, &natives)
                }
            };
            if let Err(err) = submitted {
                log::error!("Queue '{}': submission failed: {err}", self.label);
                for list in ordered {
                    self.discard_command_list(list);
                }
                return Err(err);
            }

            for (_, StagedState { resource, state }) in staged {
                *resource.lock_global_state() = state;
            }

            let value = self.fence.signal_next();
            let signaled = self
                .backend
                .queue_signal(&self.native, self.fence.native(), value);
            cinder_core::profile_plot!("queue_fence_value", value);
            let sync = SyncHandle::new(self.fence.clone(), value);

            log::trace!(
                "Queue '{}': submitted {} lists, fence value {value}",
                self.label,
                ordered.len()
            );

            for list in ordered {
                let (_, allocator, state) = list.into_parts();
                self.allocator_pool.retire(allocator, sync.clone(), state);
            }
            signaled?;
            sync
        };

        if wait_for_completion {
            sync.wait_for_completion()?;
        }
        Ok(sync)
    }

    /// Record already resolved transitions into a closed list of their own.
    fn record_barrier_list(
        &self,
        label: &str,
        barriers: Vec<ResourceBarrier>,
    ) -> Result<CommandListHandle, GraphicsError> {
        let mut barrier_list = self.request_command_list(format!("{label} barriers"))?;
        barrier_list.record_resolved_barriers(barriers);
        if let Err(err) = barrier_list.close() {
            self.discard_command_list(barrier_list);
            return Err(err);
        }
        Ok(barrier_list)
    }

    /// Signal the fence with its next value.
    pub fn signal(&self) -> Result<SyncHandle, GraphicsError> {
        let _submission = self.submit_lock.lock();
        let value = self.fence.signal_next();
        self.backend
            .queue_signal(&self.native, self.fence.native(), value)?;
        Ok(SyncHandle::new(self.fence.clone(), value))
    }

    /// Make later work on this queue wait, on the GPU, for everything
    /// `other` has signaled so far.
    pub fn wait(&self, other: &CommandQueue) -> Result<(), GraphicsError> {
        let value = other.fence.last_signaled_value();
        if value == 0 {
            return Ok(());
        }
        let _submission = self.submit_lock.lock();
        self.backend
            .queue_wait(&self.native, other.fence.native(), value)
    }

    /// Make later work on this queue wait, on the GPU, for a sync handle.
    ///
    /// Invalid handles are ignored.
    pub fn wait_for_sync_handle(&self, handle: &SyncHandle) -> Result<(), GraphicsError> {
        let Some(fence) = handle.fence() else {
            return Ok(());
        };
        let _submission = self.submit_lock.lock();
        self.backend
            .queue_wait(&self.native, fence.native(), handle.value())
    }

    /// Block the calling thread until this queue's fence reaches `value`.
    pub fn host_wait_for_value(&self, value: u64) -> Result<(), GraphicsError> {
        self.fence.host_wait(value)
    }

    pub fn completed_value(&self) -> u64 {
        self.fence.completed_value()
    }

    /// Signal and block until all work submitted so far has completed.
    pub fn flush(&self) -> Result<(), GraphicsError> {
        self.signal()?.wait_for_completion()
    }
}

/// Queue-global state a submission will publish for one resource.
struct StagedState {
    resource: Arc<Resource>,
    state: SubresourceStates,
}

/// Resolve a closed list's pending barriers.
///
/// Resolution starts from the state staged by earlier lists of the same
/// submission, or the published global state, and stages the list's final
/// states in turn.
fn resolve_list_barriers(
    list: &CommandListHandle,
    staged: &mut HashMap<ResourceUid, StagedState>,
) -> Vec<ResourceBarrier> {
    let mut barriers = Vec::new();
    for pending in list.pending_barriers() {
        let Some(local) = list.resource_state(pending.resource.uid()) else {
            unreachable!(
                "Pending barrier for '{}' without list-local state",
                pending.resource.name()
            );
        };

        let entry = staged
            .entry(pending.resource.uid())
            .or_insert_with(|| StagedState {
                resource: pending.resource.clone(),
                state: pending.resource.global_state(),
            });
        let (transitions, new_global) =
            resolve_pending_barrier(pending.state, pending.subresource, local, &entry.state);
        entry.state = new_global;

        barriers.extend(
            transitions
                .into_iter()
                .map(|transition| ResourceBarrier::Transition {
                    resource: pending.resource.clone(),
                    subresource: transition.subresource,
                    before: transition.before,
                    after: transition.after,
                }),
        );
    }
    barriers
}

impl Drop for CommandQueue {
    fn drop(&mut self) {
        let last = self.fence.last_signaled_value();
        if !self.fence.is_complete(last) {
            log::debug!(
                "Command queue '{}': waiting for fence value {last} before teardown",
                self.label
            );
        }
        if let Err(err) = self.fence.host_wait(last) {
            log::error!(
                "Command queue '{}' dropped with work in flight (fence {} of {last}): {err}",
                self.label,
                self.fence.completed_value()
            );
        }
    }
}

impl std::fmt::Debug for CommandQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandQueue")
            .field("label", &self.label)
            .field("kind", &self.kind)
            .field("fence", &self.fence)
            .field("allocators", &self.allocator_pool)
            .finish_non_exhaustive()
    }
}
