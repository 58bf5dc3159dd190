//! Dummy GPU backend for testing and development.
//!
//! This backend doesn't perform actual GPU operations. Instead it keeps an
//! in-order log of every queue operation (submissions with the full contents
//! of each command list, signals, waits) so that tests can assert exactly
//! which barriers were recorded and in which list they landed.
//!
//! Fences either complete as soon as they are signaled (the default, like an
//! infinitely fast GPU) or only when a test completes them by hand, see
//! [`DummyBackend::with_manual_fences`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::{Condvar, Mutex};

use crate::command::ResourceBarrier;
use crate::error::GraphicsError;
use crate::queue::QueueKind;
use crate::resource::ResourceUid;
use crate::state::ResourceStates;
use crate::types::{BufferDescriptor, TextureDescriptor, TextureViewDescriptor};

use super::{
    GpuBackend, GpuBuffer, GpuCommandAllocator, GpuCommandList, GpuFence, GpuQueue, GpuTexture,
    GpuTextureView,
};

/// A barrier as seen by the dummy device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BarrierRecord {
    Transition {
        resource: ResourceUid,
        subresource: u32,
        before: ResourceStates,
        after: ResourceStates,
    },
    Aliasing {
        before: Option<ResourceUid>,
        after: Option<ResourceUid>,
    },
    Uav {
        resource: Option<ResourceUid>,
    },
}

impl From<&ResourceBarrier> for BarrierRecord {
    fn from(barrier: &ResourceBarrier) -> Self {
        match barrier {
            ResourceBarrier::Transition {
                resource,
                subresource,
                before,
                after,
            } => Self::Transition {
                resource: resource.uid(),
                subresource: *subresource,
                before: *before,
                after: *after,
            },
            ResourceBarrier::Aliasing { before, after } => Self::Aliasing {
                before: before.as_ref().map(|r| r.uid()),
                after: after.as_ref().map(|r| r.uid()),
            },
            ResourceBarrier::Uav { resource } => Self::Uav {
                resource: resource.as_ref().map(|r| r.uid()),
            },
        }
    }
}

/// A native command recorded into a dummy command list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DummyCommand {
    /// One native barrier call carrying a whole batch.
    Barriers(Vec<BarrierRecord>),
}

/// Contents of a dummy command list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DummyCommandList {
    pub label: String,
    pub allocator: u64,
    pub commands: Vec<DummyCommand>,
    pub closed: bool,
}

impl DummyCommandList {
    /// All transitions recorded into this list, in order.
    pub fn transitions(&self) -> Vec<&BarrierRecord> {
        self.barriers()
            .filter(|barrier| matches!(barrier, BarrierRecord::Transition { .. }))
            .collect()
    }

    /// All barriers recorded into this list, in order.
    pub fn barriers(&self) -> impl Iterator<Item = &BarrierRecord> {
        self.commands.iter().flat_map(|command| match command {
            DummyCommand::Barriers(barriers) => barriers.iter(),
        })
    }

    /// Number of native barrier calls (flushes) in this list.
    pub fn barrier_call_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|command| matches!(command, DummyCommand::Barriers(_)))
            .count()
    }
}

/// One operation observed on a dummy queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueOperation {
    Submit {
        queue: u64,
        lists: Vec<DummyCommandList>,
    },
    Signal {
        queue: u64,
        fence: u64,
        value: u64,
    },
    Wait {
        queue: u64,
        fence: u64,
        value: u64,
    },
}

/// Fence state shared between the backend and whoever completes it.
#[derive(Debug)]
pub struct DummyFence {
    id: u64,
    completed: Mutex<u64>,
    condvar: Condvar,
}

impl DummyFence {
    fn new(id: u64, initial_value: u64) -> Self {
        Self {
            id,
            completed: Mutex::new(initial_value),
            condvar: Condvar::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn completed_value(&self) -> u64 {
        *self.completed.lock()
    }

    /// Advance the completed value to `value` and wake host waiters.
    ///
    /// Completed values never move backwards.
    pub fn complete(&self, value: u64) {
        let mut completed = self.completed.lock();
        if value > *completed {
            *completed = value;
            self.condvar.notify_all();
        }
    }

    fn wait(&self, value: u64) {
        let mut completed = self.completed.lock();
        while *completed < value {
            self.condvar.wait(&mut completed);
        }
    }
}

/// Dummy GPU backend.
#[derive(Debug)]
pub struct DummyBackend {
    manual_fences: bool,
    device_lost: AtomicBool,
    next_id: AtomicU64,
    operations: Mutex<Vec<QueueOperation>>,
}

impl DummyBackend {
    /// Create a backend whose fences complete as soon as they are signaled.
    pub fn new() -> Self {
        Self {
            manual_fences: false,
            device_lost: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
            operations: Mutex::new(Vec::new()),
        }
    }

    /// Create a backend whose fences only advance through [`Self::complete_fence`].
    pub fn with_manual_fences() -> Self {
        Self {
            manual_fences: true,
            ..Self::new()
        }
    }

    /// Complete a fence up to `value`, as if the GPU had finished that work.
    pub fn complete_fence(&self, fence: &GpuFence, value: u64) {
        match fence {
            GpuFence::Dummy(state) => state.complete(value),
            #[cfg(feature = "vulkan-backend")]
            GpuFence::Vulkan(_) => panic!("Vulkan fence passed to DummyBackend"),
        }
    }

    /// Make every following queue operation fail with [`GraphicsError::DeviceLost`].
    pub fn lose_device(&self) {
        log::warn!("DummyBackend: simulating device loss");
        self.device_lost.store(true, Ordering::Release);
    }

    /// Snapshot of every queue operation so far.
    pub fn operations(&self) -> Vec<QueueOperation> {
        self.operations.lock().clone()
    }

    /// The command lists of every submission so far, one entry per submit call.
    pub fn submissions(&self) -> Vec<Vec<DummyCommandList>> {
        self.operations
            .lock()
            .iter()
            .filter_map(|op| match op {
                QueueOperation::Submit { lists, .. } => Some(lists.clone()),
                _ => None,
            })
            .collect()
    }

    /// Forget all recorded operations.
    pub fn clear_operations(&self) {
        self.operations.lock().clear();
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn check_device(&self) -> Result<(), GraphicsError> {
        if self.device_lost.load(Ordering::Acquire) {
            Err(GraphicsError::DeviceLost)
        } else {
            Ok(())
        }
    }
}

impl Default for DummyBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn dummy_fence(fence: &GpuFence) -> Result<&Arc<DummyFence>, GraphicsError> {
    match fence {
        GpuFence::Dummy(state) => Ok(state),
        #[cfg(feature = "vulkan-backend")]
        _ => Err(GraphicsError::InvalidParameter(
            "fence does not belong to the dummy backend".into(),
        )),
    }
}

fn dummy_queue_id(queue: &GpuQueue) -> Result<u64, GraphicsError> {
    match queue {
        GpuQueue::Dummy { id, .. } => Ok(*id),
        #[cfg(feature = "vulkan-backend")]
        _ => Err(GraphicsError::InvalidParameter(
            "queue does not belong to the dummy backend".into(),
        )),
    }
}

impl GpuBackend for DummyBackend {
    fn name(&self) -> &'static str {
        "Dummy"
    }

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<GpuBuffer, GraphicsError> {
        log::trace!(
            "DummyBackend: creating buffer {:?} (size: {})",
            descriptor.label,
            descriptor.size
        );
        Ok(GpuBuffer::Dummy)
    }

    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<GpuTexture, GraphicsError> {
        log::trace!(
            "DummyBackend: creating texture {:?} ({}x{}x{}, {} mips, {} layers)",
            descriptor.label,
            descriptor.size.width,
            descriptor.size.height,
            descriptor.size.depth,
            descriptor.mip_level_count,
            descriptor.array_layer_count
        );
        Ok(GpuTexture::Dummy)
    }

    fn create_texture_view(
        &self,
        _texture: &GpuTexture,
        texture_descriptor: &TextureDescriptor,
        view: &TextureViewDescriptor,
    ) -> Result<GpuTextureView, GraphicsError> {
        if view.base_mip_level + view.mip_level_count > texture_descriptor.mip_level_count {
            return Err(GraphicsError::InvalidParameter(format!(
                "view mips {}..{} exceed texture mip count {}",
                view.base_mip_level,
                view.base_mip_level + view.mip_level_count,
                texture_descriptor.mip_level_count
            )));
        }
        Ok(GpuTextureView::Dummy(*view))
    }

    fn create_fence(&self, initial_value: u64) -> Result<GpuFence, GraphicsError> {
        Ok(GpuFence::Dummy(Arc::new(DummyFence::new(
            self.next_id(),
            initial_value,
        ))))
    }

    fn fence_completed_value(&self, fence: &GpuFence) -> Result<u64, GraphicsError> {
        self.check_device()?;
        Ok(dummy_fence(fence)?.completed_value())
    }

    fn wait_fence(&self, fence: &GpuFence, value: u64) -> Result<(), GraphicsError> {
        self.check_device()?;
        dummy_fence(fence)?.wait(value);
        Ok(())
    }

    fn create_queue(&self, kind: QueueKind) -> Result<GpuQueue, GraphicsError> {
        Ok(GpuQueue::Dummy {
            id: self.next_id(),
            kind,
        })
    }

    fn create_command_allocator(
        &self,
        kind: QueueKind,
    ) -> Result<GpuCommandAllocator, GraphicsError> {
        let id = self.next_id();
        log::trace!("DummyBackend: creating {kind:?} command allocator {id}");
        Ok(GpuCommandAllocator::Dummy { id })
    }

    fn reset_command_allocator(
        &self,
        _allocator: &GpuCommandAllocator,
    ) -> Result<(), GraphicsError> {
        Ok(())
    }

    fn begin_command_list(
        &self,
        allocator: &GpuCommandAllocator,
        label: &str,
    ) -> Result<GpuCommandList, GraphicsError> {
        let allocator = match allocator {
            GpuCommandAllocator::Dummy { id } => *id,
            #[cfg(feature = "vulkan-backend")]
            _ => {
                return Err(GraphicsError::InvalidParameter(
                    "allocator does not belong to the dummy backend".into(),
                ));
            }
        };
        Ok(GpuCommandList::Dummy(DummyCommandList {
            label: label.to_owned(),
            allocator,
            commands: Vec::new(),
            closed: false,
        }))
    }

    fn record_barriers(&self, list: &mut GpuCommandList, barriers: &[ResourceBarrier]) {
        if let GpuCommandList::Dummy(list) = list {
            assert!(!list.closed, "Recording into closed command list '{}'", list.label);
            list.commands.push(DummyCommand::Barriers(
                barriers.iter().map(BarrierRecord::from).collect(),
            ));
        }
    }

    fn end_command_list(&self, list: &mut GpuCommandList) -> Result<(), GraphicsError> {
        if let GpuCommandList::Dummy(list) = list {
            list.closed = true;
        }
        Ok(())
    }

    fn submit(&self, queue: &GpuQueue, lists: &[&GpuCommandList]) -> Result<(), GraphicsError> {
        self.check_device()?;
        let queue = dummy_queue_id(queue)?;
        let mut recorded = Vec::with_capacity(lists.len());
        for list in lists {
            match list {
                GpuCommandList::Dummy(list) => {
                    if !list.closed {
                        return Err(GraphicsError::InvalidParameter(format!(
                            "command list '{}' submitted while still recording",
                            list.label
                        )));
                    }
                    recorded.push(list.clone());
                }
                #[cfg(feature = "vulkan-backend")]
                _ => {
                    return Err(GraphicsError::InvalidParameter(
                        "command list does not belong to the dummy backend".into(),
                    ));
                }
            }
        }
        log::trace!(
            "DummyBackend: queue {queue} executing {} command lists",
            recorded.len()
        );
        self.operations.lock().push(QueueOperation::Submit {
            queue,
            lists: recorded,
        });
        Ok(())
    }

    fn queue_signal(
        &self,
        queue: &GpuQueue,
        fence: &GpuFence,
        value: u64,
    ) -> Result<(), GraphicsError> {
        self.check_device()?;
        let queue = dummy_queue_id(queue)?;
        let fence = dummy_fence(fence)?;
        self.operations.lock().push(QueueOperation::Signal {
            queue,
            fence: fence.id(),
            value,
        });
        if !self.manual_fences {
            fence.complete(value);
        }
        Ok(())
    }

    fn queue_wait(
        &self,
        queue: &GpuQueue,
        fence: &GpuFence,
        value: u64,
    ) -> Result<(), GraphicsError> {
        self.check_device()?;
        let queue = dummy_queue_id(queue)?;
        let fence = dummy_fence(fence)?;
        self.operations.lock().push(QueueOperation::Wait {
            queue,
            fence: fence.id(),
            value,
        });
        Ok(())
    }
}
