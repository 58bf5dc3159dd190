//! Virtual resources declared by render passes.

use crate::state::ResourceStates;
use crate::types::{BufferDescriptor, Extent3d, Resolution, TextureDescriptor};

use super::handle::{HandleState, ResourceHandle, ResourceId, ResourceKind};

/// Describes texture dimensions that can be relative to a graph resolution.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum TextureSize {
    /// The descriptor's own size.
    #[default]
    Absolute,
    /// Scaled from the render resolution (1.0 = full resolution).
    RenderRelative(f32),
    /// Scaled from the viewport resolution (1.0 = full resolution).
    ViewportRelative(f32),
}

impl TextureSize {
    /// Resolve against the current resolutions. Depth is kept from `size`.
    pub fn resolve(&self, size: Extent3d, render: Resolution, viewport: Resolution) -> Extent3d {
        let scaled = match *self {
            TextureSize::Absolute => return size,
            TextureSize::RenderRelative(scale) => render.scaled(scale),
            TextureSize::ViewportRelative(scale) => viewport.scaled(scale),
        };
        Extent3d::new_3d(scaled.width, scaled.height, size.depth)
    }

    pub fn is_render_relative(&self) -> bool {
        matches!(self, TextureSize::RenderRelative(_))
    }

    pub fn is_viewport_relative(&self) -> bool {
        matches!(self, TextureSize::ViewportRelative(_))
    }
}

/// Render graph texture description.
#[derive(Debug, Clone, PartialEq)]
pub struct RgTextureDesc {
    pub texture: TextureDescriptor,
    pub size: TextureSize,
}

impl RgTextureDesc {
    /// A texture with exactly the descriptor's size.
    pub fn absolute(texture: TextureDescriptor) -> Self {
        Self {
            texture,
            size: TextureSize::Absolute,
        }
    }

    /// A texture sized from the render resolution.
    pub fn render_relative(texture: TextureDescriptor, scale: f32) -> Self {
        Self {
            texture,
            size: TextureSize::RenderRelative(scale),
        }
    }

    /// A texture sized from the viewport resolution.
    pub fn viewport_relative(texture: TextureDescriptor, scale: f32) -> Self {
        Self {
            texture,
            size: TextureSize::ViewportRelative(scale),
        }
    }

    /// The descriptor to realize at the given resolutions.
    pub fn resolve(&self, render: Resolution, viewport: Resolution) -> TextureDescriptor {
        let mut texture = self.texture.clone();
        texture.size = self.size.resolve(texture.size, render, viewport);
        texture
    }
}

impl From<TextureDescriptor> for RgTextureDesc {
    fn from(texture: TextureDescriptor) -> Self {
        Self::absolute(texture)
    }
}

/// Render graph buffer description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgBufferDesc {
    pub buffer: BufferDescriptor,
}

impl From<BufferDescriptor> for RgBufferDesc {
    fn from(buffer: BufferDescriptor) -> Self {
        Self { buffer }
    }
}

/// A set of attachments rendered to together.
///
/// Attachments are textures created by the graph. Creating the render target
/// counts as a write to each of them.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RenderTargetDesc {
    pub label: Option<String>,
    pub color_attachments: Vec<ResourceHandle>,
    pub depth_attachment: Option<ResourceHandle>,
}

impl RenderTargetDesc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_color(mut self, attachment: ResourceHandle) -> Self {
        self.color_attachments.push(attachment);
        self
    }

    pub fn with_depth(mut self, attachment: ResourceHandle) -> Self {
        self.depth_attachment = Some(attachment);
        self
    }

    /// All attachments, colors first.
    pub fn attachments(&self) -> impl Iterator<Item = &ResourceHandle> {
        self.color_attachments
            .iter()
            .chain(self.depth_attachment.iter())
    }
}

/// Description stored for a virtual resource until it is realized.
#[derive(Debug, Clone, PartialEq)]
pub enum VirtualDesc {
    Buffer(RgBufferDesc),
    Texture(RgTextureDesc),
    RenderTarget(RenderTargetDesc),
}

impl VirtualDesc {
    pub fn kind(&self) -> ResourceKind {
        match self {
            VirtualDesc::Buffer(_) => ResourceKind::Buffer,
            VirtualDesc::Texture(_) => ResourceKind::Texture,
            VirtualDesc::RenderTarget(_) => ResourceKind::RenderTarget,
        }
    }

    pub fn label(&self) -> Option<&str> {
        match self {
            VirtualDesc::Buffer(desc) => desc.buffer.label.as_deref(),
            VirtualDesc::Texture(desc) => desc.texture.label.as_deref(),
            VirtualDesc::RenderTarget(desc) => desc.label.as_deref(),
        }
    }

    /// State a resource must be in to be read by a pass.
    ///
    /// Render targets have no state of their own; their attachments do.
    pub fn read_state(&self) -> Option<ResourceStates> {
        match self {
            VirtualDesc::Buffer(desc) => Some(desc.buffer.read_state()),
            VirtualDesc::Texture(desc) => Some(desc.texture.read_state()),
            VirtualDesc::RenderTarget(_) => None,
        }
    }

    /// State a resource must be in to be written by a pass.
    ///
    /// Textures get the union of every write state their usage allows.
    pub fn write_state(&self) -> Option<ResourceStates> {
        match self {
            VirtualDesc::Buffer(desc) => Some(desc.buffer.write_state()),
            VirtualDesc::Texture(desc) => Some(desc.texture.write_state()),
            VirtualDesc::RenderTarget(_) => None,
        }
    }
}

/// One entry of the graph's resource table.
#[derive(Debug, Clone)]
pub struct VirtualResource {
    pub(crate) desc: VirtualDesc,
    /// Latest version written.
    pub(crate) version: u32,
    /// Needs (re)realization before the next execution.
    pub(crate) dirty: bool,
}

impl VirtualResource {
    pub fn desc(&self) -> &VirtualDesc {
        &self.desc
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}

/// Virtual resources of one graph, one id space per kind.
#[derive(Debug, Default)]
pub(crate) struct ResourceTable {
    buffers: Vec<VirtualResource>,
    textures: Vec<VirtualResource>,
    render_targets: Vec<VirtualResource>,
}

impl ResourceTable {
    fn entries(&self, kind: ResourceKind) -> &Vec<VirtualResource> {
        match kind {
            ResourceKind::Buffer => &self.buffers,
            ResourceKind::Texture => &self.textures,
            ResourceKind::RenderTarget => &self.render_targets,
        }
    }

    fn entries_mut(&mut self, kind: ResourceKind) -> &mut Vec<VirtualResource> {
        match kind {
            ResourceKind::Buffer => &mut self.buffers,
            ResourceKind::Texture => &mut self.textures,
            ResourceKind::RenderTarget => &mut self.render_targets,
        }
    }

    /// Add a resource at version 0, dirty.
    pub fn insert(&mut self, desc: VirtualDesc) -> ResourceHandle {
        let kind = desc.kind();
        let entries = self.entries_mut(kind);
        let id = entries.len() as u32;
        entries.push(VirtualResource {
            desc,
            version: 0,
            dirty: true,
        });
        ResourceHandle::new(kind, id, 0, HandleState::Dirty)
    }

    /// # Panics
    ///
    /// Panics if the resource does not belong to this graph.
    pub fn get(&self, id: ResourceId) -> &VirtualResource {
        self.entries(id.kind)
            .get(id.id as usize)
            .unwrap_or_else(|| panic!("Unknown render graph resource {id:?}"))
    }

    pub fn get_mut(&mut self, id: ResourceId) -> &mut VirtualResource {
        self.entries_mut(id.kind)
            .get_mut(id.id as usize)
            .unwrap_or_else(|| panic!("Unknown render graph resource {id:?}"))
    }

    pub fn contains(&self, id: ResourceId) -> bool {
        (id.id as usize) < self.entries(id.kind).len()
    }

    /// The handle state a pass observes for a resource right now.
    pub fn handle_state(&self, id: ResourceId) -> HandleState {
        if self.get(id).dirty {
            HandleState::Dirty
        } else {
            HandleState::Ready
        }
    }

    /// Bump a resource's version by one and return the new version.
    pub fn bump_version(&mut self, id: ResourceId) -> u32 {
        let entry = self.get_mut(id);
        entry.version += 1;
        entry.version
    }

    /// Every resource with its id, buffers first, render targets last.
    pub fn iter(&self) -> impl Iterator<Item = (ResourceId, &VirtualResource)> {
        [
            ResourceKind::Buffer,
            ResourceKind::Texture,
            ResourceKind::RenderTarget,
        ]
        .into_iter()
        .flat_map(move |kind| {
            self.entries(kind)
                .iter()
                .enumerate()
                .map(move |(id, entry)| {
                    (
                        ResourceId {
                            kind,
                            id: id as u32,
                        },
                        entry,
                    )
                })
        })
    }

    /// Ids of every dirty resource, in realization order.
    pub fn dirty_ids(&self) -> Vec<ResourceId> {
        self.iter()
            .filter(|(_, entry)| entry.dirty)
            .map(|(id, _)| id)
            .collect()
    }

    pub fn has_dirty(&self) -> bool {
        self.iter().any(|(_, entry)| entry.dirty)
    }

    /// Mark resources sized from a changed resolution dirty, and every render
    /// target with a dirty attachment. Returns the number of newly dirty entries.
    pub fn invalidate_relative(&mut self, render_changed: bool, viewport_changed: bool) -> usize {
        let mut count = 0;
        for entry in &mut self.textures {
            let VirtualDesc::Texture(desc) = &entry.desc else {
                continue;
            };
            let affected = (render_changed && desc.size.is_render_relative())
                || (viewport_changed && desc.size.is_viewport_relative());
            if affected && !entry.dirty {
                entry.dirty = true;
                count += 1;
            }
        }

        let textures = &self.textures;
        for entry in &mut self.render_targets {
            let VirtualDesc::RenderTarget(desc) = &entry.desc else {
                continue;
            };
            let affected = desc.attachments().any(|attachment| {
                textures
                    .get(attachment.id() as usize)
                    .is_some_and(|texture| texture.dirty)
            });
            if affected && !entry.dirty {
                entry.dirty = true;
                count += 1;
            }
        }
        count
    }

    pub fn len(&self) -> usize {
        self.buffers.len() + self.textures.len() + self.render_targets.len()
    }

    pub fn clear(&mut self) {
        self.buffers.clear();
        self.textures.clear();
        self.render_targets.clear();
    }
}
