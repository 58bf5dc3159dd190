//! GPU backend abstraction layer.
//!
//! This module provides a trait-based abstraction over the native graphics
//! driver. Everything above it (command lists, queues, fences, the render
//! graph) talks to the device only through [`GpuBackend`].
//!
//! # Available Backends
//!
//! - `dummy` (default): records every call for inspection and simulates fences
//! - `vulkan-backend`: native Vulkan via ash, driving an externally created device
//!
//! # Architecture
//!
//! Each backend implements the [`GpuBackend`] trait, which provides:
//! - Resource and view creation
//! - Command allocator and command list recording
//! - Queue submission, signal and wait
//! - Fence (timeline) queries and host waits
//!
//! Native objects are returned as `Gpu*` enums with one variant per backend.

#[cfg(feature = "vulkan-backend")]
pub mod vulkan;

pub mod dummy;

use std::sync::Arc;

use crate::command::ResourceBarrier;
use crate::error::GraphicsError;
use crate::queue::QueueKind;
use crate::types::{BufferDescriptor, TextureDescriptor, TextureViewDescriptor};

pub use dummy::DummyBackend;

/// Handle to a GPU buffer.
pub enum GpuBuffer {
    /// Dummy backend (no GPU allocation)
    Dummy,
    /// Vulkan backend buffer
    #[cfg(feature = "vulkan-backend")]
    Vulkan(vulkan::VulkanBuffer),
}

impl std::fmt::Debug for GpuBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dummy => write!(f, "GpuBuffer::Dummy"),
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan(buffer) => f.debug_tuple("GpuBuffer::Vulkan").field(buffer).finish(),
        }
    }
}

/// Handle to a GPU texture.
pub enum GpuTexture {
    /// Dummy backend (no GPU allocation)
    Dummy,
    /// Vulkan backend image
    #[cfg(feature = "vulkan-backend")]
    Vulkan(vulkan::VulkanImage),
}

impl std::fmt::Debug for GpuTexture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dummy => write!(f, "GpuTexture::Dummy"),
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan(image) => f.debug_tuple("GpuTexture::Vulkan").field(image).finish(),
        }
    }
}

/// Handle to a view over texture subresources.
pub enum GpuTextureView {
    /// Dummy backend view
    Dummy(TextureViewDescriptor),
    /// Vulkan backend image view
    #[cfg(feature = "vulkan-backend")]
    Vulkan(vulkan::VulkanImageView),
}

impl std::fmt::Debug for GpuTextureView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dummy(desc) => f.debug_tuple("GpuTextureView::Dummy").field(desc).finish(),
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan(view) => f.debug_tuple("GpuTextureView::Vulkan").field(view).finish(),
        }
    }
}

/// Handle to a monotonically increasing GPU fence.
pub enum GpuFence {
    /// Dummy backend fence, completed by the backend or by tests
    Dummy(Arc<dummy::DummyFence>),
    /// Vulkan timeline semaphore
    #[cfg(feature = "vulkan-backend")]
    Vulkan(vulkan::VulkanTimeline),
}

impl std::fmt::Debug for GpuFence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dummy(fence) => f.debug_tuple("GpuFence::Dummy").field(fence).finish(),
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan(timeline) => f.debug_tuple("GpuFence::Vulkan").field(timeline).finish(),
        }
    }
}

/// Handle to a hardware submission queue.
pub enum GpuQueue {
    /// Dummy queue, identified for the operation log
    Dummy { id: u64, kind: QueueKind },
    /// Vulkan queue
    #[cfg(feature = "vulkan-backend")]
    Vulkan(vulkan::VulkanQueue),
}

impl std::fmt::Debug for GpuQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dummy { id, kind } => f
                .debug_struct("GpuQueue::Dummy")
                .field("id", id)
                .field("kind", kind)
                .finish(),
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan(queue) => f.debug_tuple("GpuQueue::Vulkan").field(queue).finish(),
        }
    }
}

/// Handle to the memory command lists are recorded into.
pub enum GpuCommandAllocator {
    /// Dummy allocator
    Dummy { id: u64 },
    /// Vulkan command pool
    #[cfg(feature = "vulkan-backend")]
    Vulkan(vulkan::VulkanCommandPool),
}

impl std::fmt::Debug for GpuCommandAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dummy { id } => f
                .debug_struct("GpuCommandAllocator::Dummy")
                .field("id", id)
                .finish(),
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan(pool) => f
                .debug_tuple("GpuCommandAllocator::Vulkan")
                .field(pool)
                .finish(),
        }
    }
}

/// Handle to a command list in the recording or executable state.
pub enum GpuCommandList {
    /// Dummy list that keeps every recorded command
    Dummy(dummy::DummyCommandList),
    /// Vulkan command buffer
    #[cfg(feature = "vulkan-backend")]
    Vulkan(vulkan::VulkanCommandBuffer),
}

impl std::fmt::Debug for GpuCommandList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dummy(list) => f.debug_tuple("GpuCommandList::Dummy").field(list).finish(),
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan(buffer) => f
                .debug_tuple("GpuCommandList::Vulkan")
                .field(buffer)
                .finish(),
        }
    }
}

/// GPU backend trait for abstracting different GPU APIs.
///
/// Implementations must be usable from several recording threads at once.
pub trait GpuBackend: Send + Sync + 'static {
    /// Get the backend name.
    fn name(&self) -> &'static str;

    /// Create a buffer resource.
    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<GpuBuffer, GraphicsError>;

    /// Create a texture resource.
    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<GpuTexture, GraphicsError>;

    /// Create a view over a range of a texture's subresources.
    fn create_texture_view(
        &self,
        texture: &GpuTexture,
        texture_descriptor: &TextureDescriptor,
        view: &TextureViewDescriptor,
    ) -> Result<GpuTextureView, GraphicsError>;

    /// Create a fence whose completed value starts at `initial_value`.
    fn create_fence(&self, initial_value: u64) -> Result<GpuFence, GraphicsError>;

    /// Query the highest value the GPU has completed on a fence.
    fn fence_completed_value(&self, fence: &GpuFence) -> Result<u64, GraphicsError>;

    /// Block the calling thread until the fence reaches `value`. Never times out.
    fn wait_fence(&self, fence: &GpuFence, value: u64) -> Result<(), GraphicsError>;

    /// Get a hardware queue of the requested kind.
    fn create_queue(&self, kind: QueueKind) -> Result<GpuQueue, GraphicsError>;

    /// Create a command allocator for lists submitted to queues of `kind`.
    fn create_command_allocator(
        &self,
        kind: QueueKind,
    ) -> Result<GpuCommandAllocator, GraphicsError>;

    /// Reclaim all memory of an allocator. Its lists must have completed.
    fn reset_command_allocator(&self, allocator: &GpuCommandAllocator)
    -> Result<(), GraphicsError>;

    /// Start recording a new command list from `allocator`.
    fn begin_command_list(
        &self,
        allocator: &GpuCommandAllocator,
        label: &str,
    ) -> Result<GpuCommandList, GraphicsError>;

    /// Record a batch of barriers as one native barrier call.
    fn record_barriers(&self, list: &mut GpuCommandList, barriers: &[ResourceBarrier]);

    /// Finish recording so the list can be submitted.
    fn end_command_list(&self, list: &mut GpuCommandList) -> Result<(), GraphicsError>;

    /// Submit closed command lists to a queue, in order, as one native call.
    fn submit(&self, queue: &GpuQueue, lists: &[&GpuCommandList]) -> Result<(), GraphicsError>;

    /// Signal `fence` to `value` once all prior work on `queue` has completed.
    fn queue_signal(&self, queue: &GpuQueue, fence: &GpuFence, value: u64)
    -> Result<(), GraphicsError>;

    /// Make later work on `queue` wait on the GPU until `fence` reaches `value`.
    fn queue_wait(&self, queue: &GpuQueue, fence: &GpuFence, value: u64)
    -> Result<(), GraphicsError>;
}

/// Creates the default backend for this build.
///
/// The Vulkan backend needs a device created by the application, so it is
/// constructed through `VulkanBackend::new` instead.
pub fn create_backend() -> Arc<dyn GpuBackend> {
    log::info!("Using dummy backend");
    Arc::new(DummyBackend::new())
}

/// Check if a real GPU backend was compiled in.
pub fn has_gpu_backend() -> bool {
    cfg!(feature = "vulkan-backend")
}
