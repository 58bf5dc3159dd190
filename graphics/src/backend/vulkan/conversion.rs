//! Translation of Cinder descriptors into Vulkan create-info values.

use ash::vk;

use crate::queue::QueueKind;
use crate::types::{BufferUsage, TextureFormat, TextureUsage, TextureViewDescriptor, TextureViewKind};

const BUFFER_USAGE: [(BufferUsage, vk::BufferUsageFlags); 7] = [
    (BufferUsage::VERTEX, vk::BufferUsageFlags::VERTEX_BUFFER),
    (BufferUsage::INDEX, vk::BufferUsageFlags::INDEX_BUFFER),
    (BufferUsage::UNIFORM, vk::BufferUsageFlags::UNIFORM_BUFFER),
    (BufferUsage::STORAGE, vk::BufferUsageFlags::STORAGE_BUFFER),
    (BufferUsage::INDIRECT, vk::BufferUsageFlags::INDIRECT_BUFFER),
    (BufferUsage::COPY_SRC, vk::BufferUsageFlags::TRANSFER_SRC),
    (BufferUsage::COPY_DST, vk::BufferUsageFlags::TRANSFER_DST),
];

const TEXTURE_USAGE: [(TextureUsage, vk::ImageUsageFlags); 4] = [
    (TextureUsage::COPY_SRC, vk::ImageUsageFlags::TRANSFER_SRC),
    (TextureUsage::COPY_DST, vk::ImageUsageFlags::TRANSFER_DST),
    (TextureUsage::TEXTURE_BINDING, vk::ImageUsageFlags::SAMPLED),
    (TextureUsage::STORAGE_BINDING, vk::ImageUsageFlags::STORAGE),
];

pub fn convert_buffer_usage(usage: BufferUsage) -> vk::BufferUsageFlags {
    BUFFER_USAGE
        .iter()
        .filter(|(flag, _)| usage.contains(*flag))
        .fold(vk::BufferUsageFlags::empty(), |acc, (_, vk_flag)| acc | *vk_flag)
}

pub fn convert_texture_format(format: TextureFormat) -> vk::Format {
    match format {
        TextureFormat::R32Float => vk::Format::R32_SFLOAT,
        TextureFormat::Rg16Float => vk::Format::R16G16_SFLOAT,
        TextureFormat::Rgba8Unorm => vk::Format::R8G8B8A8_UNORM,
        TextureFormat::Rgba8UnormSrgb => vk::Format::R8G8B8A8_SRGB,
        TextureFormat::Bgra8Unorm => vk::Format::B8G8R8A8_UNORM,
        TextureFormat::Rgba16Float => vk::Format::R16G16B16A16_SFLOAT,
        TextureFormat::Rgba32Float => vk::Format::R32G32B32A32_SFLOAT,
        TextureFormat::Depth32Float => vk::Format::D32_SFLOAT,
        TextureFormat::Depth24PlusStencil8 => vk::Format::D24_UNORM_S8_UINT,
        TextureFormat::Depth32FloatStencil8 => vk::Format::D32_SFLOAT_S8_UINT,
    }
}

/// `RENDER_ATTACHMENT` becomes a color or depth attachment depending on the format.
pub fn convert_texture_usage(usage: TextureUsage, format: TextureFormat) -> vk::ImageUsageFlags {
    let mut flags = TEXTURE_USAGE
        .iter()
        .filter(|(flag, _)| usage.contains(*flag))
        .fold(vk::ImageUsageFlags::empty(), |acc, (_, vk_flag)| acc | *vk_flag);
    if usage.contains(TextureUsage::RENDER_ATTACHMENT) {
        flags |= if format.is_depth_stencil() {
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT
        } else {
            vk::ImageUsageFlags::COLOR_ATTACHMENT
        };
    }
    flags
}

/// Aspects covered by barriers and views of a texture.
pub fn aspect_mask(format: TextureFormat) -> vk::ImageAspectFlags {
    if format.has_stencil() {
        vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
    } else if format.is_depth_stencil() {
        vk::ImageAspectFlags::DEPTH
    } else {
        vk::ImageAspectFlags::COLOR
    }
}

/// Subresource range selected by a view descriptor.
///
/// Shader resource views of depth formats only see the depth aspect.
pub fn view_subresource_range(
    format: TextureFormat,
    view: &TextureViewDescriptor,
) -> vk::ImageSubresourceRange {
    let aspect = match view.kind {
        TextureViewKind::ShaderResource if format.is_depth_stencil() => {
            vk::ImageAspectFlags::DEPTH
        }
        _ => aspect_mask(format),
    };
    vk::ImageSubresourceRange {
        aspect_mask: aspect,
        base_mip_level: view.base_mip_level,
        level_count: view.mip_level_count,
        base_array_layer: view.base_array_layer,
        layer_count: view.array_layer_count,
    }
}

/// Queue capability a family must expose for a queue kind.
pub fn queue_flags(kind: QueueKind) -> vk::QueueFlags {
    match kind {
        QueueKind::Graphics => vk::QueueFlags::GRAPHICS,
        QueueKind::Compute => vk::QueueFlags::COMPUTE,
        QueueKind::Copy => vk::QueueFlags::TRANSFER,
    }
}
