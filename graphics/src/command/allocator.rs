//! Command allocators and their completion-gated pool.

use std::collections::VecDeque;
use std::sync::Arc;

use cinder_core::pool::RecyclePool;
use parking_lot::Mutex;

use crate::backend::{GpuBackend, GpuCommandAllocator};
use crate::error::GraphicsError;
use crate::queue::QueueKind;
use crate::sync::SyncHandle;

use super::CommandListState;

/// Backing memory for one command list at a time.
///
/// Stamped with the [`SyncHandle`] of the last submission that used it. Its
/// memory may only be reclaimed once that handle has completed. Until then it
/// also keeps the recording state of that submission, and with it every
/// resource the list referenced.
#[derive(Debug)]
pub struct CommandAllocator {
    native: GpuCommandAllocator,
    sync: SyncHandle,
    retained: Option<CommandListState>,
}

impl CommandAllocator {
    pub fn native(&self) -> &GpuCommandAllocator {
        &self.native
    }

    pub fn sync_handle(&self) -> &SyncHandle {
        &self.sync
    }

    /// Returns true if no submitted work still references this allocator.
    pub fn is_reusable(&self) -> bool {
        self.sync.is_settled()
    }

    /// Number of resources kept alive for the last submission.
    pub fn retained_resource_count(&self) -> usize {
        self.retained
            .as_ref()
            .map_or(0, CommandListState::referenced_resource_count)
    }
}

/// Recycles command allocators once the GPU has finished with them.
///
/// Allocators are handed back in submission order, so only the oldest one can
/// be the first to complete. Requests check that one and create a new
/// allocator when it is still in flight.
///
/// The pool also recycles the recording state paired with each allocator.
/// State retired with a submission goes back to the free list only when its
/// allocator is reused.
pub struct CommandAllocatorPool {
    backend: Arc<dyn GpuBackend>,
    kind: QueueKind,
    free: Mutex<VecDeque<CommandAllocator>>,
    states: RecyclePool<CommandListState>,
}

impl CommandAllocatorPool {
    pub fn new(backend: Arc<dyn GpuBackend>, kind: QueueKind) -> Self {
        Self {
            backend,
            kind,
            free: Mutex::new(VecDeque::new()),
            states: RecyclePool::new(),
        }
    }

    pub fn kind(&self) -> QueueKind {
        self.kind
    }

    /// Get an allocator whose previous work has completed, reset and ready,
    /// with empty recording state.
    pub fn request(&self) -> Result<(CommandAllocator, CommandListState), GraphicsError> {
        let reusable = {
            let mut free = self.free.lock();
            match free.front() {
                Some(front) if front.is_reusable() => free.pop_front(),
                _ => None,
            }
        };

        let allocator = match reusable {
            Some(mut allocator) => {
                assert!(
                    allocator.is_reusable(),
                    "Command allocator reused before its last submission completed"
                );
                if let Some(state) = allocator.retained.take() {
                    self.states.release(state);
                }
                self.backend.reset_command_allocator(&allocator.native)?;
                allocator
            }
            None => {
                log::debug!(
                    "CommandAllocatorPool({:?}): creating allocator ({} waiting on the GPU)",
                    self.kind,
                    self.free.lock().len()
                );
                let native = self.backend.create_command_allocator(self.kind)?;
                CommandAllocator {
                    native,
                    sync: SyncHandle::invalid(),
                    retained: None,
                }
            }
        };
        Ok((allocator, self.states.acquire()))
    }

    /// Park an allocator used by a submission, with the state of the list
    /// recorded from it. Both are held until `sync` completes.
    pub fn retire(&self, mut allocator: CommandAllocator, sync: SyncHandle, state: CommandListState) {
        allocator.sync = sync;
        allocator.retained = Some(state);
        self.free.lock().push_back(allocator);
    }

    /// Return an allocator whose list was never submitted.
    ///
    /// The allocator keeps the sync handle of its previous submission.
    pub fn discard(&self, allocator: CommandAllocator, state: CommandListState) {
        self.states.release(state);
        self.free.lock().push_back(allocator);
    }

    /// Number of allocators parked in the pool.
    pub fn len(&self) -> usize {
        self.free.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.free.lock().is_empty()
    }
}

impl std::fmt::Debug for CommandAllocatorPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandAllocatorPool")
            .field("kind", &self.kind)
            .field("free", &self.len())
            .field("free_states", &self.states.free_count())
            .finish_non_exhaustive()
    }
}
