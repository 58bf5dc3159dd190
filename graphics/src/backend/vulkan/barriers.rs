//! Translation of resource barriers into Vulkan pipeline barriers.
//!
//! A flushed batch of [`ResourceBarrier`]s becomes a single
//! `vkCmdPipelineBarrier` call. Every state maps to an image layout, an
//! access mask and a set of pipeline stages; the stage masks of the call are
//! the union over the batch.

use ash::vk;

use crate::backend::{GpuBuffer, GpuTexture};
use crate::command::ResourceBarrier;
use crate::resource::{GpuResource, Resource};
use crate::state::{ALL_SUBRESOURCES, ResourceStates};

use super::conversion::aspect_mask;

/// Image layout a texture must be in for `state`.
///
/// The common state maps to `GENERAL`, except as the source of a transition
/// where the previous contents are discarded (`UNDEFINED`).
pub fn image_layout(state: ResourceStates, as_source: bool) -> vk::ImageLayout {
    if state.is_empty() {
        return if as_source {
            vk::ImageLayout::UNDEFINED
        } else {
            vk::ImageLayout::GENERAL
        };
    }
    if state == ResourceStates::RENDER_TARGET {
        return vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL;
    }
    if state.contains(ResourceStates::DEPTH_WRITE) {
        return vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL;
    }
    if state == ResourceStates::COPY_DEST {
        return vk::ImageLayout::TRANSFER_DST_OPTIMAL;
    }
    if state == ResourceStates::COPY_SOURCE {
        return vk::ImageLayout::TRANSFER_SRC_OPTIMAL;
    }
    if state == ResourceStates::PRESENT {
        return vk::ImageLayout::PRESENT_SRC_KHR;
    }
    if state.contains(ResourceStates::DEPTH_READ)
        && (state - ResourceStates::DEPTH_READ - ResourceStates::ALL_SHADER_RESOURCE).is_empty()
    {
        return vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL;
    }
    if ResourceStates::ALL_SHADER_RESOURCE.contains(state) {
        return vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL;
    }
    vk::ImageLayout::GENERAL
}

/// Memory accesses performed in `state`.
pub fn access_mask(state: ResourceStates) -> vk::AccessFlags {
    let mut access = vk::AccessFlags::empty();
    for (flag, mask) in [
        (
            ResourceStates::VERTEX_AND_CONSTANT_BUFFER,
            vk::AccessFlags::VERTEX_ATTRIBUTE_READ | vk::AccessFlags::UNIFORM_READ,
        ),
        (ResourceStates::INDEX_BUFFER, vk::AccessFlags::INDEX_READ),
        (
            ResourceStates::RENDER_TARGET,
            vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        ),
        (
            ResourceStates::UNORDERED_ACCESS,
            vk::AccessFlags::SHADER_READ | vk::AccessFlags::SHADER_WRITE,
        ),
        (
            ResourceStates::DEPTH_WRITE,
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        ),
        (
            ResourceStates::DEPTH_READ,
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ,
        ),
        (ResourceStates::NON_PIXEL_SHADER_RESOURCE, vk::AccessFlags::SHADER_READ),
        (ResourceStates::PIXEL_SHADER_RESOURCE, vk::AccessFlags::SHADER_READ),
        (
            ResourceStates::INDIRECT_ARGUMENT,
            vk::AccessFlags::INDIRECT_COMMAND_READ,
        ),
        (ResourceStates::COPY_DEST, vk::AccessFlags::TRANSFER_WRITE),
        (ResourceStates::COPY_SOURCE, vk::AccessFlags::TRANSFER_READ),
    ] {
        if state.contains(flag) {
            access |= mask;
        }
    }
    access
}

/// Pipeline stages that touch a resource in `state`.
pub fn stage_mask(state: ResourceStates) -> vk::PipelineStageFlags {
    let shader_stages = vk::PipelineStageFlags::VERTEX_SHADER
        | vk::PipelineStageFlags::FRAGMENT_SHADER
        | vk::PipelineStageFlags::COMPUTE_SHADER;
    let mut stages = vk::PipelineStageFlags::empty();
    for (flag, mask) in [
        (
            ResourceStates::VERTEX_AND_CONSTANT_BUFFER,
            vk::PipelineStageFlags::VERTEX_INPUT | shader_stages,
        ),
        (ResourceStates::INDEX_BUFFER, vk::PipelineStageFlags::VERTEX_INPUT),
        (
            ResourceStates::RENDER_TARGET,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        ),
        (ResourceStates::UNORDERED_ACCESS, shader_stages),
        (
            ResourceStates::DEPTH_WRITE | ResourceStates::DEPTH_READ,
            vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
                | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
        ),
        (
            ResourceStates::NON_PIXEL_SHADER_RESOURCE,
            vk::PipelineStageFlags::VERTEX_SHADER | vk::PipelineStageFlags::COMPUTE_SHADER,
        ),
        (
            ResourceStates::PIXEL_SHADER_RESOURCE,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
        ),
        (
            ResourceStates::INDIRECT_ARGUMENT,
            vk::PipelineStageFlags::DRAW_INDIRECT,
        ),
        (
            ResourceStates::COPY_DEST | ResourceStates::COPY_SOURCE,
            vk::PipelineStageFlags::TRANSFER,
        ),
    ] {
        if state.intersects(flag) {
            stages |= mask;
        }
    }
    stages
}

/// Barriers of one flush, ready for a single `vkCmdPipelineBarrier`.
#[derive(Debug, Default)]
pub struct VulkanBarrierBatch {
    memory: Vec<vk::MemoryBarrier<'static>>,
    buffers: Vec<vk::BufferMemoryBarrier<'static>>,
    images: Vec<vk::ImageMemoryBarrier<'static>>,
    src_stage_mask: vk::PipelineStageFlags,
    dst_stage_mask: vk::PipelineStageFlags,
}

impl VulkanBarrierBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_barriers(barriers: &[ResourceBarrier]) -> Self {
        let mut batch = Self::new();
        for barrier in barriers {
            batch.add(barrier);
        }
        batch
    }

    pub fn add(&mut self, barrier: &ResourceBarrier) {
        match barrier {
            ResourceBarrier::Transition {
                resource,
                subresource,
                before,
                after,
            } => self.add_transition(resource, *subresource, *before, *after),
            ResourceBarrier::Aliasing { .. } => {
                // Placed resources share memory; order everything before against everything after.
                self.add_memory(
                    vk::AccessFlags::MEMORY_WRITE,
                    vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE,
                    vk::PipelineStageFlags::ALL_COMMANDS,
                    vk::PipelineStageFlags::ALL_COMMANDS,
                );
            }
            ResourceBarrier::Uav { .. } => {
                let stages = stage_mask(ResourceStates::UNORDERED_ACCESS);
                self.add_memory(
                    vk::AccessFlags::SHADER_WRITE,
                    vk::AccessFlags::SHADER_READ | vk::AccessFlags::SHADER_WRITE,
                    stages,
                    stages,
                );
            }
        }
    }

    fn add_memory(
        &mut self,
        src_access: vk::AccessFlags,
        dst_access: vk::AccessFlags,
        src_stages: vk::PipelineStageFlags,
        dst_stages: vk::PipelineStageFlags,
    ) {
        self.memory.push(
            vk::MemoryBarrier::default()
                .src_access_mask(src_access)
                .dst_access_mask(dst_access),
        );
        self.src_stage_mask |= src_stages;
        self.dst_stage_mask |= dst_stages;
    }

    fn add_transition(
        &mut self,
        resource: &Resource,
        subresource: u32,
        before: ResourceStates,
        after: ResourceStates,
    ) {
        match resource.native() {
            GpuResource::Buffer(GpuBuffer::Vulkan(buffer)) => {
                self.buffers.push(
                    vk::BufferMemoryBarrier::default()
                        .src_access_mask(access_mask(before))
                        .dst_access_mask(access_mask(after))
                        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                        .buffer(buffer.raw())
                        .offset(0)
                        .size(vk::WHOLE_SIZE),
                );
            }
            GpuResource::Texture(GpuTexture::Vulkan(image)) => {
                let Some(desc) = resource.texture_descriptor() else {
                    return;
                };
                let mip_levels = desc.mip_level_count.max(1);
                let range = if subresource == ALL_SUBRESOURCES {
                    vk::ImageSubresourceRange {
                        aspect_mask: aspect_mask(desc.format),
                        base_mip_level: 0,
                        level_count: vk::REMAINING_MIP_LEVELS,
                        base_array_layer: 0,
                        layer_count: vk::REMAINING_ARRAY_LAYERS,
                    }
                } else {
                    vk::ImageSubresourceRange {
                        aspect_mask: aspect_mask(desc.format),
                        base_mip_level: subresource % mip_levels,
                        level_count: 1,
                        base_array_layer: subresource / mip_levels,
                        layer_count: 1,
                    }
                };
                self.images.push(
                    vk::ImageMemoryBarrier::default()
                        .old_layout(image_layout(before, true))
                        .new_layout(image_layout(after, false))
                        .src_access_mask(access_mask(before))
                        .dst_access_mask(access_mask(after))
                        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                        .image(image.raw())
                        .subresource_range(range),
                );
            }
            _ => {
                log::warn!(
                    "Skipping transition of '{}': not a Vulkan resource",
                    resource.name()
                );
                return;
            }
        }
        self.src_stage_mask |= stage_mask(before);
        self.dst_stage_mask |= stage_mask(after);
    }

    pub fn is_empty(&self) -> bool {
        self.memory.is_empty() && self.buffers.is_empty() && self.images.is_empty()
    }

    pub fn len(&self) -> usize {
        self.memory.len() + self.buffers.len() + self.images.len()
    }

    /// Record the batch as one pipeline barrier. Does nothing if empty.
    pub fn record(&self, device: &ash::Device, command_buffer: vk::CommandBuffer) {
        if self.is_empty() {
            return;
        }
        // Transitions out of the common state have nothing to wait on.
        let src_stage_mask = if self.src_stage_mask.is_empty() {
            vk::PipelineStageFlags::TOP_OF_PIPE
        } else {
            self.src_stage_mask
        };
        let dst_stage_mask = if self.dst_stage_mask.is_empty() {
            vk::PipelineStageFlags::BOTTOM_OF_PIPE
        } else {
            self.dst_stage_mask
        };

        unsafe {
            device.cmd_pipeline_barrier(
                command_buffer,
                src_stage_mask,
                dst_stage_mask,
                vk::DependencyFlags::empty(),
                &self.memory,
                &self.buffers,
                &self.images,
            );
        }
    }
}
