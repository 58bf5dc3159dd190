//! Texture view descriptors.

/// How a texture view binds the texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureViewKind {
    /// Sampled read access.
    ShaderResource,
    /// Storage (unordered access) read/write of a single mip.
    UnorderedAccess,
    /// Color attachment.
    RenderTarget,
    /// Depth/stencil attachment.
    DepthStencil,
}

/// Descriptor for a view over a range of texture subresources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureViewDescriptor {
    pub kind: TextureViewKind,
    pub base_mip_level: u32,
    pub mip_level_count: u32,
    pub base_array_layer: u32,
    pub array_layer_count: u32,
}

impl TextureViewDescriptor {
    /// View covering every mip and layer of a texture.
    pub fn whole(kind: TextureViewKind, mip_level_count: u32, array_layer_count: u32) -> Self {
        Self {
            kind,
            base_mip_level: 0,
            mip_level_count,
            base_array_layer: 0,
            array_layer_count,
        }
    }

    /// View of a single mip level across every layer.
    pub fn mip(kind: TextureViewKind, mip_level: u32, array_layer_count: u32) -> Self {
        Self {
            kind,
            base_mip_level: mip_level,
            mip_level_count: 1,
            base_array_layer: 0,
            array_layer_count,
        }
    }
}
