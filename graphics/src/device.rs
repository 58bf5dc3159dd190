//! Graphics device.
//!
//! The [`GraphicsDevice`] is the entry point for creating GPU resources,
//! fences and command queues on top of a [`GpuBackend`].

use std::sync::Arc;

use crate::backend::{GpuBackend, GpuTextureView, create_backend};
use crate::error::GraphicsError;
use crate::queue::{CommandQueue, CommandQueueDescriptor};
use crate::resource::{GpuResource, Resource, ResourceDesc};
use crate::state::ResourceStates;
use crate::sync::Fence;
use crate::types::{BufferDescriptor, TextureDescriptor, TextureViewDescriptor};

/// Limits enforced on resource creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceLimits {
    /// Maximum texture dimension.
    pub max_texture_dimension: u32,
    /// Maximum buffer size.
    pub max_buffer_size: u64,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self {
            max_texture_dimension: 16384,
            max_buffer_size: 1 << 30, // 1 GB
        }
    }
}

/// A graphics device for creating GPU resources.
///
/// Cheap to clone; every clone talks to the same backend.
///
/// # Example
///
/// ```ignore
/// let device = GraphicsDevice::dummy();
/// let buffer = device.create_buffer(
///     &BufferDescriptor::new(1024, BufferUsage::STORAGE),
///     ResourceStates::COMMON,
/// )?;
/// let queue = device.create_queue(&CommandQueueDescriptor::new(QueueKind::Graphics))?;
/// ```
#[derive(Clone)]
pub struct GraphicsDevice {
    backend: Arc<dyn GpuBackend>,
    limits: DeviceLimits,
}

impl GraphicsDevice {
    pub fn new(backend: Arc<dyn GpuBackend>) -> Self {
        log::info!("GraphicsDevice: using {} backend", backend.name());
        Self {
            backend,
            limits: DeviceLimits::default(),
        }
    }

    /// A device on the default backend of this build.
    pub fn dummy() -> Self {
        Self::new(create_backend())
    }

    pub fn with_limits(mut self, limits: DeviceLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn backend(&self) -> &Arc<dyn GpuBackend> {
        &self.backend
    }

    pub fn limits(&self) -> &DeviceLimits {
        &self.limits
    }

    /// Create a GPU buffer whose queue-global state starts at `initial_state`.
    ///
    /// # Errors
    ///
    /// Returns an error if the size is zero or exceeds device limits, or if
    /// the backend fails to allocate.
    pub fn create_buffer(
        &self,
        descriptor: &BufferDescriptor,
        initial_state: ResourceStates,
    ) -> Result<Arc<Resource>, GraphicsError> {
        if descriptor.size == 0 {
            return Err(GraphicsError::InvalidParameter(
                "buffer size cannot be zero".to_string(),
            ));
        }
        if descriptor.size > self.limits.max_buffer_size {
            return Err(GraphicsError::InvalidParameter(format!(
                "buffer size {} exceeds maximum {}",
                descriptor.size, self.limits.max_buffer_size
            )));
        }

        let native = self.backend.create_buffer(descriptor)?;
        log::trace!(
            "GraphicsDevice: created buffer {:?}, size={}",
            descriptor.label,
            descriptor.size
        );
        Ok(Arc::new(Resource::new(
            ResourceDesc::Buffer(descriptor.clone()),
            GpuResource::Buffer(native),
            initial_state,
        )))
    }

    /// Create a GPU texture whose queue-global state starts at `initial_state`.
    ///
    /// # Errors
    ///
    /// Returns an error if the dimensions are zero or exceed device limits, or
    /// if the backend fails to allocate.
    pub fn create_texture(
        &self,
        descriptor: &TextureDescriptor,
        initial_state: ResourceStates,
    ) -> Result<Arc<Resource>, GraphicsError> {
        let max_dim = self.limits.max_texture_dimension;
        let size = descriptor.size;
        if size.width > max_dim || size.height > max_dim || size.depth > max_dim {
            return Err(GraphicsError::InvalidParameter(format!(
                "texture dimension exceeds maximum {max_dim}"
            )));
        }
        if size.width == 0 || size.height == 0 || size.depth == 0 {
            return Err(GraphicsError::InvalidParameter(
                "texture dimensions cannot be zero".to_string(),
            ));
        }
        if descriptor.mip_level_count == 0 || descriptor.array_layer_count == 0 {
            return Err(GraphicsError::InvalidParameter(
                "texture must have at least one mip level and array layer".to_string(),
            ));
        }

        let native = self.backend.create_texture(descriptor)?;
        log::trace!(
            "GraphicsDevice: created texture {:?}, size={}x{}",
            descriptor.label,
            size.width,
            size.height
        );
        Ok(Arc::new(Resource::new(
            ResourceDesc::Texture(descriptor.clone()),
            GpuResource::Texture(native),
            initial_state,
        )))
    }

    /// Create a view over a range of a texture's subresources.
    pub fn create_texture_view(
        &self,
        texture: &Resource,
        view: &TextureViewDescriptor,
    ) -> Result<GpuTextureView, GraphicsError> {
        match (texture.native(), texture.texture_descriptor()) {
            (GpuResource::Texture(native), Some(descriptor)) => {
                self.backend.create_texture_view(native, descriptor, view)
            }
            _ => Err(GraphicsError::InvalidParameter(format!(
                "cannot create a texture view of buffer '{}'",
                texture.name()
            ))),
        }
    }

    pub fn create_fence(&self, label: impl Into<String>) -> Result<Arc<Fence>, GraphicsError> {
        Ok(Arc::new(Fence::new(self.backend.clone(), label)?))
    }

    pub fn create_queue(
        &self,
        descriptor: &CommandQueueDescriptor,
    ) -> Result<CommandQueue, GraphicsError> {
        CommandQueue::new(self.backend.clone(), descriptor)
    }
}

impl std::fmt::Debug for GraphicsDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphicsDevice")
            .field("backend", &self.backend.name())
            .field("limits", &self.limits)
            .finish()
    }
}

static_assertions::assert_impl_all!(GraphicsDevice: Send, Sync);
static_assertions::assert_impl_all!(Resource: Send, Sync);
static_assertions::assert_impl_all!(CommandQueue: Send, Sync);
