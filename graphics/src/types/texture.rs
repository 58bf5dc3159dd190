//! Texture descriptors and the resource states their usage implies.

use bitflags::bitflags;

use super::Extent3d;
use crate::state::ResourceStates;

/// Pixel format of a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum TextureFormat {
    R32Float,
    Rg16Float,
    #[default]
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Bgra8Unorm,
    Rgba16Float,
    Rgba32Float,
    Depth32Float,
    Depth24PlusStencil8,
    Depth32FloatStencil8,
}

impl TextureFormat {
    /// Depth formats, with or without stencil.
    pub fn is_depth_stencil(self) -> bool {
        matches!(
            self,
            Self::Depth32Float | Self::Depth24PlusStencil8 | Self::Depth32FloatStencil8
        )
    }

    pub fn has_stencil(self) -> bool {
        matches!(self, Self::Depth24PlusStencil8 | Self::Depth32FloatStencil8)
    }
}

bitflags! {
    /// What a texture may be used for over its lifetime.
    ///
    /// Usage decides which views are created when a graph texture is
    /// realized and which states the graph moves it into.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TextureUsage: u32 {
        const COPY_SRC = 1 << 0;
        const COPY_DST = 1 << 1;
        /// Sampled from shaders.
        const TEXTURE_BINDING = 1 << 2;
        /// Unordered access from shaders.
        const STORAGE_BINDING = 1 << 3;
        /// Color or depth attachment, depending on the format.
        const RENDER_ATTACHMENT = 1 << 4;
    }
}

/// Descriptor for creating a texture.
///
/// Subresources are numbered mip-major within each array layer:
/// `mip + layer * mip_level_count`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextureDescriptor {
    pub label: Option<String>,
    pub size: Extent3d,
    pub mip_level_count: u32,
    pub array_layer_count: u32,
    pub sample_count: u32,
    pub format: TextureFormat,
    pub usage: TextureUsage,
}

impl TextureDescriptor {
    pub fn new_2d(width: u32, height: u32, format: TextureFormat, usage: TextureUsage) -> Self {
        Self {
            size: Extent3d::new_2d(width, height),
            format,
            usage,
            ..Self::default()
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_mip_levels(mut self, count: u32) -> Self {
        self.mip_level_count = count;
        self
    }

    pub fn with_array_layers(mut self, count: u32) -> Self {
        self.array_layer_count = count;
        self
    }

    pub fn with_sample_count(mut self, count: u32) -> Self {
        self.sample_count = count;
        self
    }

    /// Number of independently tracked subresources (mips times layers).
    pub fn subresource_count(&self) -> u32 {
        self.mip_level_count.max(1) * self.array_layer_count.max(1)
    }

    /// Flat subresource index of a mip level within an array layer.
    pub fn subresource_index(&self, mip_level: u32, array_layer: u32) -> u32 {
        debug_assert!(mip_level < self.mip_level_count.max(1), "Mip level out of range");
        debug_assert!(array_layer < self.array_layer_count.max(1), "Array layer out of range");
        mip_level + array_layer * self.mip_level_count.max(1)
    }

    /// State a pass needs to read this texture.
    pub fn read_state(&self) -> ResourceStates {
        if self.usage.contains(TextureUsage::TEXTURE_BINDING) {
            ResourceStates::ALL_SHADER_RESOURCE
        } else if self.format.is_depth_stencil() {
            ResourceStates::DEPTH_READ
        } else {
            ResourceStates::COPY_SOURCE
        }
    }

    /// State a pass needs to write this texture: every write its usage allows.
    pub fn write_state(&self) -> ResourceStates {
        let mut state = ResourceStates::COMMON;
        if self.usage.contains(TextureUsage::RENDER_ATTACHMENT) {
            state |= if self.format.is_depth_stencil() {
                ResourceStates::DEPTH_WRITE
            } else {
                ResourceStates::RENDER_TARGET
            };
        }
        if self.usage.contains(TextureUsage::STORAGE_BINDING) {
            state |= ResourceStates::UNORDERED_ACCESS;
        }
        if state.is_empty() {
            ResourceStates::COPY_DEST
        } else {
            state
        }
    }
}

impl Default for TextureDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            size: Extent3d::new_2d(1, 1),
            mip_level_count: 1,
            array_layer_count: 1,
            sample_count: 1,
            format: TextureFormat::default(),
            usage: TextureUsage::empty(),
        }
    }
}
