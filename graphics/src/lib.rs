//! # Cinder Graphics
//!
//! Render graph and GPU synchronization core of the Cinder engine.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`RenderGraph`] - Declarative passes with inferred ordering, levels and resource states
//! - [`CommandQueue`] - Submission with automatic cross-list state resolution
//! - [`CommandListHandle`] - Recording with per-list state tracking and barrier batching
//! - [`Fence`] / [`SyncHandle`] - Monotonic GPU timelines and waitable submission points
//! - [`GpuBackend`] - Trait for native backends: Dummy (for testing) and Vulkan
//!
//! ## Example
//!
//! ```ignore
//! use cinder_graphics::{CommandQueueDescriptor, GraphicsDevice, RenderGraph, RenderGraphConfig};
//!
//! let device = GraphicsDevice::dummy();
//! let queue = device.create_queue(&CommandQueueDescriptor::default())?;
//! let mut graph = RenderGraph::new(device, RenderGraphConfig::default());
//! // graph.add_render_pass(...)
//!
//! let mut list = queue.request_command_list("frame")?;
//! graph.execute(&mut list)?;
//! let sync = queue.execute_command_lists([list], false)?;
//! graph.track_submission(&sync);
//! ```

pub mod backend;
pub mod command;
pub mod device;
pub mod error;
pub mod graph;
pub mod profiling;
pub mod queue;
pub mod resource;
pub mod state;
pub mod sync;
pub mod types;

// Re-export main types for convenience
pub use backend::{DummyBackend, GpuBackend, create_backend};
pub use command::{CommandListHandle, ResourceBarrier};
pub use device::{DeviceLimits, GraphicsDevice};
pub use error::{GraphError, GraphicsError};
pub use graph::{
    PassHandle, RenderGraph, RenderGraphConfig, RenderGraphRegistry, RenderGraphScheduler,
    RenderPass, RenderTargetDesc, ResourceHandle, RgBufferDesc, RgTextureDesc, TextureSize,
};
pub use queue::{CommandQueue, CommandQueueDescriptor, QueueKind};
pub use resource::{Resource, ResourceUid};
pub use state::{ALL_SUBRESOURCES, ResourceStates, SubresourceStates};
pub use sync::{Fence, SyncHandle, SyncStatus};
pub use types::{
    BufferDescriptor, BufferUsage, Extent3d, Resolution, TextureDescriptor, TextureFormat,
    TextureUsage,
};

/// Graphics library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the graphics subsystem.
pub fn init() {
    log::info!("Cinder Graphics v{} initialized", VERSION);
}
