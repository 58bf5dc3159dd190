//! Native Vulkan backend implementation using ash.
//!
//! The backend drives a device created by the application. It needs Vulkan
//! 1.2 with the `timelineSemaphore` feature enabled: every [`Fence`] is a
//! timeline semaphore and queue waits and signals are timeline submissions.
//!
//! All queue kinds are served by one queue family. Queues of the same family
//! share the native `VkQueue`, so submissions are serialized inside the
//! backend.
//!
//! [`Fence`]: crate::sync::Fence

mod allocator;
pub mod barriers;
pub(crate) mod conversion;


use ash::vk;
use gpu_allocator::vulkan::Allocation;
use parking_lot::Mutex;

use crate::command::ResourceBarrier;
use crate::error::GraphicsError;
use crate::queue::QueueKind;
use crate::types::{BufferDescriptor, TextureDescriptor, TextureViewDescriptor};

use super::{
    GpuBackend, GpuBuffer, GpuCommandAllocator, GpuCommandList, GpuFence, GpuQueue, GpuTexture,
    GpuTextureView,
};

use self::allocator::SharedAllocator;
use self::barriers::VulkanBarrierBatch;
use self::conversion::{
    convert_buffer_usage, convert_texture_format, convert_texture_usage, queue_flags,
    view_subresource_range,
};

/// Map a Vulkan error, keeping device loss and memory exhaustion distinct.
fn vk_error(
    result: vk::Result,
    context: &str,
    wrap: impl FnOnce(String) -> GraphicsError,
) -> GraphicsError {
    match result {
        vk::Result::ERROR_DEVICE_LOST => GraphicsError::DeviceLost,
        vk::Result::ERROR_OUT_OF_DEVICE_MEMORY | vk::Result::ERROR_OUT_OF_HOST_MEMORY => {
            GraphicsError::OutOfMemory
        }
        other => wrap(format!("{context}: {other:?}")),
    }
}

/// A Vulkan buffer with its memory.
pub struct VulkanBuffer {
    device: ash::Device,
    raw: vk::Buffer,
    allocation: Option<Allocation>,
    allocator: SharedAllocator,
}

impl VulkanBuffer {
    pub fn raw(&self) -> vk::Buffer {
        self.raw
    }
}

impl Drop for VulkanBuffer {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            allocator::free(&self.allocator, allocation);
        }
        unsafe { self.device.destroy_buffer(self.raw, None) };
    }
}

impl std::fmt::Debug for VulkanBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanBuffer").field("raw", &self.raw).finish()
    }
}

/// A Vulkan image with its memory.
pub struct VulkanImage {
    device: ash::Device,
    raw: vk::Image,
    format: vk::Format,
    allocation: Option<Allocation>,
    allocator: SharedAllocator,
}

impl VulkanImage {
    pub fn raw(&self) -> vk::Image {
        self.raw
    }

    pub fn format(&self) -> vk::Format {
        self.format
    }
}

impl Drop for VulkanImage {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            allocator::free(&self.allocator, allocation);
        }
        unsafe { self.device.destroy_image(self.raw, None) };
    }
}

impl std::fmt::Debug for VulkanImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanImage")
            .field("raw", &self.raw)
            .field("format", &self.format)
            .finish()
    }
}

/// An image view owned by the render graph registry.
pub struct VulkanImageView {
    device: ash::Device,
    raw: vk::ImageView,
}

impl VulkanImageView {
    pub fn raw(&self) -> vk::ImageView {
        self.raw
    }
}

impl Drop for VulkanImageView {
    fn drop(&mut self) {
        unsafe { self.device.destroy_image_view(self.raw, None) };
    }
}

impl std::fmt::Debug for VulkanImageView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanImageView").field("raw", &self.raw).finish()
    }
}

/// A timeline semaphore backing a fence.
pub struct VulkanTimeline {
    device: ash::Device,
    raw: vk::Semaphore,
}

impl VulkanTimeline {
    pub fn raw(&self) -> vk::Semaphore {
        self.raw
    }
}

impl Drop for VulkanTimeline {
    fn drop(&mut self) {
        unsafe { self.device.destroy_semaphore(self.raw, None) };
    }
}

impl std::fmt::Debug for VulkanTimeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanTimeline").field("raw", &self.raw).finish()
    }
}

/// A queue with the GPU waits its next submission must carry.
pub struct VulkanQueue {
    raw: vk::Queue,
    kind: QueueKind,
    pending_waits: Mutex<Vec<(vk::Semaphore, u64)>>,
}

impl VulkanQueue {
    pub fn raw(&self) -> vk::Queue {
        self.raw
    }

    pub fn kind(&self) -> QueueKind {
        self.kind
    }
}

impl std::fmt::Debug for VulkanQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanQueue")
            .field("raw", &self.raw)
            .field("kind", &self.kind)
            .field("pending_waits", &self.pending_waits.lock().len())
            .finish()
    }
}

/// A command pool and the command buffers allocated from it.
///
/// Buffers handed out since the last reset are kept apart; a reset makes
/// all of them available again.
pub struct VulkanCommandPool {
    device: ash::Device,
    raw: vk::CommandPool,
    free: Mutex<Vec<vk::CommandBuffer>>,
    in_use: Mutex<Vec<vk::CommandBuffer>>,
}

impl VulkanCommandPool {
    pub fn raw(&self) -> vk::CommandPool {
        self.raw
    }

    fn acquire(&self) -> Result<vk::CommandBuffer, GraphicsError> {
        let buffer = match self.free.lock().pop() {
            Some(buffer) => buffer,
            None => {
                let info = vk::CommandBufferAllocateInfo::default()
                    .command_pool(self.raw)
                    .level(vk::CommandBufferLevel::PRIMARY)
                    .command_buffer_count(1);
                let buffers = unsafe { self.device.allocate_command_buffers(&info) }.map_err(
                    |e| vk_error(e, "Failed to allocate command buffer", GraphicsError::Internal),
                )?;
                buffers.into_iter().next().ok_or_else(|| {
                    GraphicsError::Internal("No command buffer was allocated".into())
                })?
            }
        };
        self.in_use.lock().push(buffer);
        Ok(buffer)
    }

    fn reset(&self) -> Result<(), GraphicsError> {
        unsafe {
            self.device
                .reset_command_pool(self.raw, vk::CommandPoolResetFlags::empty())
        }
        .map_err(|e| vk_error(e, "Failed to reset command pool", GraphicsError::Internal))?;
        let mut in_use = self.in_use.lock();
        self.free.lock().append(&mut in_use);
        Ok(())
    }
}

impl Drop for VulkanCommandPool {
    fn drop(&mut self) {
        unsafe { self.device.destroy_command_pool(self.raw, None) };
    }
}

impl std::fmt::Debug for VulkanCommandPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanCommandPool")
            .field("raw", &self.raw)
            .field("in_use", &self.in_use.lock().len())
            .finish()
    }
}

/// A primary command buffer. Its memory belongs to the pool it came from.
#[derive(Debug)]
pub struct VulkanCommandBuffer {
    raw: vk::CommandBuffer,
    label: String,
}

impl VulkanCommandBuffer {
    pub fn raw(&self) -> vk::CommandBuffer {
        self.raw
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

/// Vulkan-based GPU backend using ash.
///
/// The backend does not own the instance or device: the application must
/// keep them alive until every object created through the backend has been
/// dropped, and destroy them afterwards.
pub struct VulkanBackend {
    device: ash::Device,
    queue_family_index: u32,
    queue_family_flags: vk::QueueFlags,
    allocator: SharedAllocator,
    submit_lock: Mutex<()>,
}

impl std::fmt::Debug for VulkanBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanBackend")
            .field("queue_family_index", &self.queue_family_index)
            .field("queue_family_flags", &self.queue_family_flags)
            .finish()
    }
}

impl VulkanBackend {
    /// Wrap an application-created device.
    ///
    /// `queue_family_index` is the family every queue is taken from; it must
    /// support graphics and compute.
    pub fn new(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        device: ash::Device,
        queue_family_index: u32,
    ) -> Result<Self, GraphicsError> {
        let families =
            unsafe { instance.get_physical_device_queue_family_properties(physical_device) };
        let queue_family_flags = families
            .get(queue_family_index as usize)
            .map(|family| family.queue_flags)
            .ok_or_else(|| {
                GraphicsError::InitializationFailed(format!(
                    "Queue family {queue_family_index} does not exist"
                ))
            })?;
        let required = queue_flags(QueueKind::Graphics) | queue_flags(QueueKind::Compute);
        if !queue_family_flags.contains(required) {
            return Err(GraphicsError::InitializationFailed(format!(
                "Queue family {queue_family_index} lacks {required:?}"
            )));
        }

        let allocator = allocator::create_allocator(instance, physical_device, device.clone())?;

        log::info!("Vulkan backend initialized (queue family {queue_family_index})");

        Ok(Self {
            device,
            queue_family_index,
            queue_family_flags,
            allocator,
            submit_lock: Mutex::new(()),
        })
    }

    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    pub fn queue_family_index(&self) -> u32 {
        self.queue_family_index
    }

    fn submit_raw(
        &self,
        queue: &VulkanQueue,
        command_buffers: &[vk::CommandBuffer],
        signal: Option<(vk::Semaphore, u64)>,
    ) -> Result<(), GraphicsError> {
        let _submission = self.submit_lock.lock();
        let waits = std::mem::take(&mut *queue.pending_waits.lock());

        let wait_semaphores: Vec<vk::Semaphore> = waits.iter().map(|(s, _)| *s).collect();
        let wait_values: Vec<u64> = waits.iter().map(|(_, v)| *v).collect();
        let wait_stages = vec![vk::PipelineStageFlags::ALL_COMMANDS; waits.len()];
        let signal_semaphores: Vec<vk::Semaphore> = signal.iter().map(|(s, _)| *s).collect();
        let signal_values: Vec<u64> = signal.iter().map(|(_, v)| *v).collect();

        let mut timeline_info = vk::TimelineSemaphoreSubmitInfo::default()
            .wait_semaphore_values(&wait_values)
            .signal_semaphore_values(&signal_values);
        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(command_buffers)
            .signal_semaphores(&signal_semaphores)
            .push_next(&mut timeline_info);

        unsafe {
            self.device
                .queue_submit(queue.raw, &[submit_info], vk::Fence::null())
        }
        .map_err(|e| vk_error(e, "Queue submission failed", GraphicsError::SubmissionFailed))
    }
}

impl GpuBackend for VulkanBackend {
    fn name(&self) -> &'static str {
        "Vulkan"
    }

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<GpuBuffer, GraphicsError> {
        let buffer_info = vk::BufferCreateInfo::default()
            .size(descriptor.size)
            .usage(convert_buffer_usage(descriptor.usage))
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let raw = unsafe { self.device.create_buffer(&buffer_info, None) }.map_err(|e| {
            vk_error(e, "Failed to create buffer", GraphicsError::ResourceCreationFailed)
        })?;

        let requirements = unsafe { self.device.get_buffer_memory_requirements(raw) };
        let name = descriptor.label.as_deref().unwrap_or("buffer");
        let allocation = match allocator::allocate(&self.allocator, name, requirements, true) {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { self.device.destroy_buffer(raw, None) };
                return Err(e);
            }
        };
        if let Err(e) = unsafe {
            self.device
                .bind_buffer_memory(raw, allocation.memory(), allocation.offset())
        } {
            allocator::free(&self.allocator, allocation);
            unsafe { self.device.destroy_buffer(raw, None) };
            return Err(vk_error(
                e,
                "Failed to bind buffer memory",
                GraphicsError::ResourceCreationFailed,
            ));
        }

        Ok(GpuBuffer::Vulkan(VulkanBuffer {
            device: self.device.clone(),
            raw,
            allocation: Some(allocation),
            allocator: self.allocator.clone(),
        }))
    }

    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<GpuTexture, GraphicsError> {
        let format = convert_texture_format(descriptor.format);
        let image_info = vk::ImageCreateInfo::default()
            .image_type(if descriptor.size.depth > 1 {
                vk::ImageType::TYPE_3D
            } else {
                vk::ImageType::TYPE_2D
            })
            .format(format)
            .extent(vk::Extent3D {
                width: descriptor.size.width,
                height: descriptor.size.height,
                depth: descriptor.size.depth.max(1),
            })
            .mip_levels(descriptor.mip_level_count.max(1))
            .array_layers(descriptor.array_layer_count.max(1))
            .samples(vk::SampleCountFlags::from_raw(descriptor.sample_count.max(1)))
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(convert_texture_usage(descriptor.usage, descriptor.format))
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let raw = unsafe { self.device.create_image(&image_info, None) }.map_err(|e| {
            vk_error(e, "Failed to create image", GraphicsError::ResourceCreationFailed)
        })?;

        let requirements = unsafe { self.device.get_image_memory_requirements(raw) };
        let name = descriptor.label.as_deref().unwrap_or("texture");
        let allocation = match allocator::allocate(&self.allocator, name, requirements, false) {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { self.device.destroy_image(raw, None) };
                return Err(e);
            }
        };
        if let Err(e) = unsafe {
            self.device
                .bind_image_memory(raw, allocation.memory(), allocation.offset())
        } {
            allocator::free(&self.allocator, allocation);
            unsafe { self.device.destroy_image(raw, None) };
            return Err(vk_error(
                e,
                "Failed to bind image memory",
                GraphicsError::ResourceCreationFailed,
            ));
        }

        Ok(GpuTexture::Vulkan(VulkanImage {
            device: self.device.clone(),
            raw,
            format,
            allocation: Some(allocation),
            allocator: self.allocator.clone(),
        }))
    }

    fn create_texture_view(
        &self,
        texture: &GpuTexture,
        texture_descriptor: &TextureDescriptor,
        view: &TextureViewDescriptor,
    ) -> Result<GpuTextureView, GraphicsError> {
        let GpuTexture::Vulkan(image) = texture else {
            return Err(GraphicsError::InvalidParameter(
                "texture was not created by the Vulkan backend".into(),
            ));
        };
        let view_type = if texture_descriptor.size.depth > 1 {
            vk::ImageViewType::TYPE_3D
        } else if view.array_layer_count > 1 {
            vk::ImageViewType::TYPE_2D_ARRAY
        } else {
            vk::ImageViewType::TYPE_2D
        };
        let info = vk::ImageViewCreateInfo::default()
            .image(image.raw)
            .view_type(view_type)
            .format(image.format)
            .components(vk::ComponentMapping::default())
            .subresource_range(view_subresource_range(texture_descriptor.format, view));

        let raw = unsafe { self.device.create_image_view(&info, None) }.map_err(|e| {
            vk_error(e, "Failed to create image view", GraphicsError::ResourceCreationFailed)
        })?;
        Ok(GpuTextureView::Vulkan(VulkanImageView {
            device: self.device.clone(),
            raw,
        }))
    }

    fn create_fence(&self, initial_value: u64) -> Result<GpuFence, GraphicsError> {
        let mut type_info = vk::SemaphoreTypeCreateInfo::default()
            .semaphore_type(vk::SemaphoreType::TIMELINE)
            .initial_value(initial_value);
        let info = vk::SemaphoreCreateInfo::default().push_next(&mut type_info);
        let raw = unsafe { self.device.create_semaphore(&info, None) }.map_err(|e| {
            vk_error(e, "Failed to create timeline semaphore", GraphicsError::ResourceCreationFailed)
        })?;
        Ok(GpuFence::Vulkan(VulkanTimeline {
            device: self.device.clone(),
            raw,
        }))
    }

    fn fence_completed_value(&self, fence: &GpuFence) -> Result<u64, GraphicsError> {
        let GpuFence::Vulkan(timeline) = fence else {
            return Err(GraphicsError::InvalidParameter(
                "fence was not created by the Vulkan backend".into(),
            ));
        };
        unsafe { self.device.get_semaphore_counter_value(timeline.raw) }
            .map_err(|e| vk_error(e, "Failed to query fence", GraphicsError::Internal))
    }

    fn wait_fence(&self, fence: &GpuFence, value: u64) -> Result<(), GraphicsError> {
        let GpuFence::Vulkan(timeline) = fence else {
            return Err(GraphicsError::InvalidParameter(
                "fence was not created by the Vulkan backend".into(),
            ));
        };
        let semaphores = [timeline.raw];
        let values = [value];
        let info = vk::SemaphoreWaitInfo::default()
            .semaphores(&semaphores)
            .values(&values);
        unsafe { self.device.wait_semaphores(&info, u64::MAX) }
            .map_err(|e| vk_error(e, "Failed to wait for fence", GraphicsError::Internal))
    }

    fn create_queue(&self, kind: QueueKind) -> Result<GpuQueue, GraphicsError> {
        // Graphics and compute families always accept transfer work.
        let supported = match kind {
            QueueKind::Copy => self.queue_family_flags.intersects(
                queue_flags(QueueKind::Copy)
                    | queue_flags(QueueKind::Graphics)
                    | queue_flags(QueueKind::Compute),
            ),
            _ => self.queue_family_flags.contains(queue_flags(kind)),
        };
        if !supported {
            return Err(GraphicsError::InitializationFailed(format!(
                "Queue family {} cannot run {kind:?} work",
                self.queue_family_index
            )));
        }
        let raw = unsafe { self.device.get_device_queue(self.queue_family_index, 0) };
        Ok(GpuQueue::Vulkan(VulkanQueue {
            raw,
            kind,
            pending_waits: Mutex::new(Vec::new()),
        }))
    }

    fn create_command_allocator(
        &self,
        _kind: QueueKind,
    ) -> Result<GpuCommandAllocator, GraphicsError> {
        let info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(self.queue_family_index)
            .flags(vk::CommandPoolCreateFlags::TRANSIENT);
        let raw = unsafe { self.device.create_command_pool(&info, None) }.map_err(|e| {
            vk_error(e, "Failed to create command pool", GraphicsError::InitializationFailed)
        })?;
        Ok(GpuCommandAllocator::Vulkan(VulkanCommandPool {
            device: self.device.clone(),
            raw,
            free: Mutex::new(Vec::new()),
            in_use: Mutex::new(Vec::new()),
        }))
    }

    fn reset_command_allocator(
        &self,
        allocator: &GpuCommandAllocator,
    ) -> Result<(), GraphicsError> {
        match allocator {
            GpuCommandAllocator::Vulkan(pool) => pool.reset(),
            _ => Err(GraphicsError::InvalidParameter(
                "command allocator was not created by the Vulkan backend".into(),
            )),
        }
    }

    fn begin_command_list(
        &self,
        allocator: &GpuCommandAllocator,
        label: &str,
    ) -> Result<GpuCommandList, GraphicsError> {
        let GpuCommandAllocator::Vulkan(pool) = allocator else {
            return Err(GraphicsError::InvalidParameter(
                "command allocator was not created by the Vulkan backend".into(),
            ));
        };
        let raw = pool.acquire()?;
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { self.device.begin_command_buffer(raw, &begin_info) }
            .map_err(|e| vk_error(e, "Failed to begin command buffer", GraphicsError::Internal))?;
        Ok(GpuCommandList::Vulkan(VulkanCommandBuffer {
            raw,
            label: label.to_owned(),
        }))
    }

    fn record_barriers(&self, list: &mut GpuCommandList, barriers: &[ResourceBarrier]) {
        let GpuCommandList::Vulkan(buffer) = list else {
            log::error!("Barriers recorded into a command list of another backend");
            return;
        };
        VulkanBarrierBatch::from_barriers(barriers).record(&self.device, buffer.raw);
    }

    fn end_command_list(&self, list: &mut GpuCommandList) -> Result<(), GraphicsError> {
        let GpuCommandList::Vulkan(buffer) = list else {
            return Err(GraphicsError::InvalidParameter(
                "command list was not created by the Vulkan backend".into(),
            ));
        };
        unsafe { self.device.end_command_buffer(buffer.raw) }.map_err(|e| {
            vk_error(
                e,
                &format!("Failed to close command buffer '{}'", buffer.label),
                GraphicsError::Internal,
            )
        })
    }

    fn submit(&self, queue: &GpuQueue, lists: &[&GpuCommandList]) -> Result<(), GraphicsError> {
        let GpuQueue::Vulkan(queue) = queue else {
            return Err(GraphicsError::InvalidParameter(
                "queue was not created by the Vulkan backend".into(),
            ));
        };
        let command_buffers = lists
            .iter()
            .map(|list| match list {
                GpuCommandList::Vulkan(buffer) => Ok(buffer.raw),
                _ => Err(GraphicsError::InvalidParameter(
                    "command list was not created by the Vulkan backend".into(),
                )),
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.submit_raw(queue, &command_buffers, None)
    }

    fn queue_signal(
        &self,
        queue: &GpuQueue,
        fence: &GpuFence,
        value: u64,
    ) -> Result<(), GraphicsError> {
        let (GpuQueue::Vulkan(queue), GpuFence::Vulkan(timeline)) = (queue, fence) else {
            return Err(GraphicsError::InvalidParameter(
                "queue or fence was not created by the Vulkan backend".into(),
            ));
        };
        self.submit_raw(queue, &[], Some((timeline.raw, value)))
    }

    fn queue_wait(
        &self,
        queue: &GpuQueue,
        fence: &GpuFence,
        value: u64,
    ) -> Result<(), GraphicsError> {
        let (GpuQueue::Vulkan(queue), GpuFence::Vulkan(timeline)) = (queue, fence) else {
            return Err(GraphicsError::InvalidParameter(
                "queue or fence was not created by the Vulkan backend".into(),
            ));
        };
        queue.pending_waits.lock().push((timeline.raw, value));
        Ok(())
    }
}
