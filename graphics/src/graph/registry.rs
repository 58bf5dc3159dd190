//! Realization of virtual graph resources.
//!
//! The [`RenderGraphRegistry`] turns dirty entries of the graph's resource
//! table into device resources and views. Views get indices from one
//! [`IndexPool`] per view kind, standing in for descriptor heap slots.
//!
//! When a resource is realized again (after a resolution change) the old
//! resource and its views are retired, not dropped: they stay alive, and
//! their indices stay taken, until the last submission reported through
//! [`RenderGraphRegistry::track_submission`] has completed.

use std::collections::HashMap;
use std::sync::Arc;

use cinder_core::index_pool::IndexPool;

use crate::backend::GpuTextureView;
use crate::device::GraphicsDevice;
use crate::error::GraphicsError;
use crate::resource::Resource;
use crate::state::ResourceStates;
use crate::sync::SyncHandle;
use crate::types::{
    Extent3d, Resolution, TextureDescriptor, TextureUsage, TextureViewDescriptor, TextureViewKind,
};

use super::handle::{ResourceHandle, ResourceId, ResourceKind};
use super::resource::{ResourceTable, VirtualDesc};

/// A texture view and the descriptor index it occupies.
#[derive(Debug)]
pub struct TextureView {
    index: u32,
    desc: TextureViewDescriptor,
    native: GpuTextureView,
}

impl TextureView {
    /// Descriptor index within the pool of its kind.
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn desc(&self) -> &TextureViewDescriptor {
        &self.desc
    }

    pub fn native(&self) -> &GpuTextureView {
        &self.native
    }
}

#[derive(Debug)]
struct RealizedTexture {
    resource: Arc<Resource>,
    shader_resource: Option<TextureView>,
    unordered_access: Vec<TextureView>,
    render_target: Option<TextureView>,
    depth_stencil: Option<TextureView>,
}

/// Attachments of a realized render target.
#[derive(Debug, Clone)]
pub struct RenderTarget {
    pub color_attachments: Vec<Arc<Resource>>,
    /// Render target view index of each color attachment.
    pub color_views: Vec<u32>,
    pub depth_attachment: Option<Arc<Resource>>,
    /// Depth-stencil view index of the depth attachment.
    pub depth_view: Option<u32>,
    /// Size of the first attachment.
    pub extent: Extent3d,
}

#[derive(Debug)]
enum Realized {
    Buffer(Arc<Resource>),
    Texture(RealizedTexture),
    RenderTarget(RenderTarget),
}

/// Device resources and views behind a graph's virtual handles.
pub struct RenderGraphRegistry {
    device: GraphicsDevice,
    entries: HashMap<ResourceId, Realized>,
    /// Replaced entries and the submission that may still use them.
    retired: Vec<(SyncHandle, Realized)>,
    last_submission: SyncHandle,
    srv_pool: IndexPool,
    uav_pool: IndexPool,
    rtv_pool: IndexPool,
    dsv_pool: IndexPool,
}

impl RenderGraphRegistry {
    pub fn new(device: GraphicsDevice) -> Self {
        Self {
            device,
            entries: HashMap::new(),
            retired: Vec::new(),
            last_submission: SyncHandle::invalid(),
            srv_pool: IndexPool::new(),
            uav_pool: IndexPool::new(),
            rtv_pool: IndexPool::new(),
            dsv_pool: IndexPool::new(),
        }
    }

    /// Record the submission of work that used the realized resources.
    ///
    /// Entries replaced after this call are kept until `sync` completes.
    pub fn track_submission(&mut self, sync: &SyncHandle) {
        self.last_submission = sync.clone();
    }

    /// Release retired entries whose submission has completed. Returns how
    /// many were released.
    pub fn release_completed(&mut self) -> usize {
        let (done, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.retired)
            .into_iter()
            .partition(|(sync, _)| sync.is_settled());
        self.retired = waiting;
        let count = done.len();
        for (_, realized) in done {
            self.release(realized);
        }
        if count > 0 {
            log::trace!("RenderGraphRegistry: released {count} retired resources");
        }
        count
    }

    /// Entries replaced while still in use by the GPU.
    pub fn retired_count(&self) -> usize {
        self.retired.len()
    }

    fn retire(&mut self, realized: Realized) {
        if self.last_submission.is_settled() {
            self.release(realized);
        } else {
            self.retired.push((self.last_submission.clone(), realized));
        }
    }

    pub fn device(&self) -> &GraphicsDevice {
        &self.device
    }

    /// Realize every dirty resource of `resources` and mark it clean.
    ///
    /// Returns the number of resources realized.
    pub(crate) fn realize(
        &mut self,
        resources: &mut ResourceTable,
        render: Resolution,
        viewport: Resolution,
    ) -> Result<usize, GraphicsError> {
        self.release_completed();
        let dirty = resources.dirty_ids();
        for &id in &dirty {
            let realized = match resources.get(id).desc() {
                VirtualDesc::Buffer(desc) => Realized::Buffer(
                    self.device
                        .create_buffer(&desc.buffer, ResourceStates::COMMON)?,
                ),
                VirtualDesc::Texture(desc) => {
                    Realized::Texture(self.realize_texture(desc.resolve(render, viewport))?)
                }
                VirtualDesc::RenderTarget(desc) => {
                    let color: Vec<ResourceId> = desc
                        .color_attachments
                        .iter()
                        .map(|handle| handle.resource_id())
                        .collect();
                    let depth = desc.depth_attachment.map(|handle| handle.resource_id());
                    Realized::RenderTarget(self.realize_render_target(&color, depth)?)
                }
            };

            log::debug!(
                "RenderGraphRegistry: realized {id:?} '{}'",
                resources.get(id).desc().label().unwrap_or("<unnamed>")
            );
            if let Some(previous) = self.entries.insert(id, realized) {
                self.retire(previous);
            }
            resources.get_mut(id).dirty = false;
        }
        Ok(dirty.len())
    }

    fn realize_texture(
        &self,
        descriptor: TextureDescriptor,
    ) -> Result<RealizedTexture, GraphicsError> {
        let resource = self
            .device
            .create_texture(&descriptor, ResourceStates::COMMON)?;
        let mips = descriptor.mip_level_count;
        let layers = descriptor.array_layer_count;
        let usage = descriptor.usage;
        let depth = descriptor.format.is_depth_stencil();

        let shader_resource = if usage.contains(TextureUsage::TEXTURE_BINDING) {
            let view = TextureViewDescriptor::whole(TextureViewKind::ShaderResource, mips, layers);
            Some(self.create_view(&resource, view, &self.srv_pool)?)
        } else {
            None
        };

        let mut unordered_access = Vec::new();
        if usage.contains(TextureUsage::STORAGE_BINDING) {
            for mip in 0..mips {
                let view = TextureViewDescriptor::mip(TextureViewKind::UnorderedAccess, mip, layers);
                unordered_access.push(self.create_view(&resource, view, &self.uav_pool)?);
            }
        }

        let attachment = usage.contains(TextureUsage::RENDER_ATTACHMENT);
        let render_target = if attachment && !depth {
            let view = TextureViewDescriptor::mip(TextureViewKind::RenderTarget, 0, layers);
            Some(self.create_view(&resource, view, &self.rtv_pool)?)
        } else {
            None
        };
        let depth_stencil = if attachment && depth {
            let view = TextureViewDescriptor::mip(TextureViewKind::DepthStencil, 0, layers);
            Some(self.create_view(&resource, view, &self.dsv_pool)?)
        } else {
            None
        };

        Ok(RealizedTexture {
            resource,
            shader_resource,
            unordered_access,
            render_target,
            depth_stencil,
        })
    }

    fn create_view(
        &self,
        resource: &Resource,
        desc: TextureViewDescriptor,
        pool: &IndexPool,
    ) -> Result<TextureView, GraphicsError> {
        let native = self.device.create_texture_view(resource, &desc)?;
        Ok(TextureView {
            index: pool.allocate(),
            desc,
            native,
        })
    }

    fn realize_render_target(
        &self,
        color: &[ResourceId],
        depth: Option<ResourceId>,
    ) -> Result<RenderTarget, GraphicsError> {
        let mut target = RenderTarget {
            color_attachments: Vec::with_capacity(color.len()),
            color_views: Vec::with_capacity(color.len()),
            depth_attachment: None,
            depth_view: None,
            extent: Extent3d::default(),
        };

        for &id in color {
            let texture = self.realized_texture(id);
            let view = texture.render_target.as_ref().ok_or_else(|| {
                GraphicsError::InvalidParameter(format!(
                    "color attachment '{}' is not renderable",
                    texture.resource.name()
                ))
            })?;
            target.color_views.push(view.index);
            target.color_attachments.push(texture.resource.clone());
        }

        if let Some(id) = depth {
            let texture = self.realized_texture(id);
            let view = texture.depth_stencil.as_ref().ok_or_else(|| {
                GraphicsError::InvalidParameter(format!(
                    "depth attachment '{}' is not a depth-stencil target",
                    texture.resource.name()
                ))
            })?;
            target.depth_view = Some(view.index);
            target.depth_attachment = Some(texture.resource.clone());
        }

        target.extent = target
            .color_attachments
            .iter()
            .chain(target.depth_attachment.iter())
            .find_map(|resource| resource.texture_descriptor())
            .map(|desc| desc.size)
            .unwrap_or_default();
        Ok(target)
    }

    fn release(&self, realized: Realized) {
        if let Realized::Texture(texture) = realized {
            if let Some(view) = texture.shader_resource {
                self.srv_pool.free(view.index);
            }
            for view in texture.unordered_access {
                self.uav_pool.free(view.index);
            }
            if let Some(view) = texture.render_target {
                self.rtv_pool.free(view.index);
            }
            if let Some(view) = texture.depth_stencil {
                self.dsv_pool.free(view.index);
            }
        }
    }

    fn entry(&self, id: ResourceId) -> &Realized {
        self.entries
            .get(&id)
            .unwrap_or_else(|| panic!("Render graph resource {id:?} has not been realized"))
    }

    fn realized_texture(&self, id: ResourceId) -> &RealizedTexture {
        match self.entry(id) {
            Realized::Texture(texture) => texture,
            _ => panic!("Render graph resource {id:?} is not a texture"),
        }
    }

    /// Returns true if the resource has been realized.
    pub fn contains(&self, id: ResourceId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Number of realized resources.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The device buffer or texture behind a resource.
    ///
    /// # Panics
    ///
    /// Panics if the resource is unrealized or is a render target.
    pub fn resource(&self, id: ResourceId) -> &Arc<Resource> {
        match self.entry(id) {
            Realized::Buffer(resource) => resource,
            Realized::Texture(texture) => &texture.resource,
            Realized::RenderTarget(_) => {
                panic!("Render target {id:?} has no single backing resource")
            }
        }
    }

    /// # Panics
    ///
    /// Panics if the handle is not a realized buffer.
    pub fn buffer(&self, handle: ResourceHandle) -> &Arc<Resource> {
        assert_eq!(handle.kind(), ResourceKind::Buffer, "{handle:?} is not a buffer");
        self.resource(handle.resource_id())
    }

    /// # Panics
    ///
    /// Panics if the handle is not a realized texture.
    pub fn texture(&self, handle: ResourceHandle) -> &Arc<Resource> {
        &self.realized_texture(handle.resource_id()).resource
    }

    /// Shader resource view over the whole texture.
    ///
    /// # Panics
    ///
    /// Panics if the texture was not created with `TEXTURE_BINDING`.
    pub fn shader_resource_view(&self, handle: ResourceHandle) -> &TextureView {
        self.realized_texture(handle.resource_id())
            .shader_resource
            .as_ref()
            .unwrap_or_else(|| panic!("{handle:?} has no shader resource view"))
    }

    /// Unordered access view of one mip level.
    ///
    /// # Panics
    ///
    /// Panics if the texture was not created with `STORAGE_BINDING` or the
    /// mip level is out of range.
    pub fn unordered_access_view(&self, handle: ResourceHandle, mip_level: u32) -> &TextureView {
        self.realized_texture(handle.resource_id())
            .unordered_access
            .get(mip_level as usize)
            .unwrap_or_else(|| panic!("{handle:?} has no unordered access view for mip {mip_level}"))
    }

    /// # Panics
    ///
    /// Panics if the handle is not a realized render target.
    pub fn render_target(&self, handle: ResourceHandle) -> &RenderTarget {
        match self.entry(handle.resource_id()) {
            Realized::RenderTarget(target) => target,
            _ => panic!("{handle:?} is not a render target"),
        }
    }

    /// Descriptor indices in use, as (srv, uav, rtv, dsv).
    pub fn descriptor_counts(&self) -> (u32, u32, u32, u32) {
        (
            self.srv_pool.allocated_count(),
            self.uav_pool.allocated_count(),
            self.rtv_pool.allocated_count(),
            self.dsv_pool.allocated_count(),
        )
    }

    /// Retire every realized resource.
    ///
    /// View indices return to their pools once the last tracked submission
    /// has completed.
    pub fn clear(&mut self) {
        for (_, realized) in std::mem::take(&mut self.entries) {
            self.retire(realized);
        }
        self.release_completed();
    }
}

impl Drop for RenderGraphRegistry {
    fn drop(&mut self) {
        if let Err(err) = self.last_submission.wait_for_completion() {
            log::error!("RenderGraphRegistry dropped while its resources may be in use: {err}");
        }
    }
}

impl std::fmt::Debug for RenderGraphRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderGraphRegistry")
            .field("device", &self.device)
            .field("realized", &self.entries.len())
            .field("descriptors", &self.descriptor_counts())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::resource::{RenderTargetDesc, RgTextureDesc};
    use crate::types::{BufferDescriptor, BufferUsage, TextureFormat};

    const RENDER: Resolution = Resolution {
        width: 1920,
        height: 1080,
    };
    const VIEWPORT: Resolution = Resolution {
        width: 1280,
        height: 720,
    };

    fn registry() -> RenderGraphRegistry {
        RenderGraphRegistry::new(GraphicsDevice::dummy())
    }

    #[test]
    fn test_realizes_dirty_entries_once() {
        let mut registry = registry();
        let mut table = ResourceTable::default();
        let buffer = table.insert(VirtualDesc::Buffer(
            BufferDescriptor::new(64, BufferUsage::STORAGE).into(),
        ));

        assert_eq!(registry.realize(&mut table, RENDER, VIEWPORT).unwrap(), 1);
        assert_eq!(registry.realize(&mut table, RENDER, VIEWPORT).unwrap(), 0);
        assert_eq!(registry.buffer(buffer).subresource_count(), 1);
        assert_eq!(
            registry.buffer(buffer).global_state().uniform_state(),
            Some(ResourceStates::COMMON)
        );
    }

    #[test]
    fn test_texture_views_per_usage() {
        let mut registry = registry();
        let mut table = ResourceTable::default();
        let texture = table.insert(VirtualDesc::Texture(RgTextureDesc::absolute(
            TextureDescriptor::new_2d(
                64,
                64,
                TextureFormat::Rgba16Float,
                TextureUsage::TEXTURE_BINDING | TextureUsage::STORAGE_BINDING,
            )
            .with_mip_levels(3),
        )));
        registry.realize(&mut table, RENDER, VIEWPORT).unwrap();

        assert_eq!(registry.descriptor_counts(), (1, 3, 0, 0));
        assert_eq!(registry.unordered_access_view(texture, 2).desc().base_mip_level, 2);
        assert_eq!(
            registry.shader_resource_view(texture).desc().kind,
            TextureViewKind::ShaderResource
        );
    }

    #[test]
    fn test_relative_texture_follows_resolution() {
        let mut registry = registry();
        let mut table = ResourceTable::default();
        let texture = table.insert(VirtualDesc::Texture(RgTextureDesc::render_relative(
            TextureDescriptor::new_2d(
                1,
                1,
                TextureFormat::Rgba8Unorm,
                TextureUsage::TEXTURE_BINDING,
            ),
            0.5,
        )));
        registry.realize(&mut table, RENDER, VIEWPORT).unwrap();
        let first = registry.texture(texture).clone();
        assert_eq!(
            first.texture_descriptor().unwrap().size,
            Extent3d::new_2d(960, 540)
        );

        table.invalidate_relative(true, false);
        registry
            .realize(&mut table, Resolution::new(800, 600), VIEWPORT)
            .unwrap();
        let second = registry.texture(texture);
        assert_ne!(first.uid(), second.uid());
        assert_eq!(
            second.texture_descriptor().unwrap().size,
            Extent3d::new_2d(400, 300)
        );
        // The old view index went back to its pool.
        assert_eq!(registry.descriptor_counts().0, 1);
    }

    #[test]
    fn test_replaced_texture_waits_for_tracked_submission() {
        let backend = Arc::new(crate::backend::DummyBackend::with_manual_fences());
        let mut registry = RenderGraphRegistry::new(GraphicsDevice::new(backend.clone()));
        let fence = Arc::new(crate::sync::Fence::new(backend.clone(), "frame").unwrap());
        let mut table = ResourceTable::default();
        let texture = table.insert(VirtualDesc::Texture(RgTextureDesc::render_relative(
            TextureDescriptor::new_2d(
                1,
                1,
                TextureFormat::Rgba8Unorm,
                TextureUsage::TEXTURE_BINDING | TextureUsage::STORAGE_BINDING,
            ),
            1.0,
        )));
        registry.realize(&mut table, RENDER, VIEWPORT).unwrap();
        let old = Arc::downgrade(registry.texture(texture));
        registry.track_submission(&SyncHandle::new(fence.clone(), 1));

        table.invalidate_relative(true, false);
        registry
            .realize(&mut table, Resolution::new(800, 600), VIEWPORT)
            .unwrap();
        assert_eq!(registry.retired_count(), 1);
        assert!(old.upgrade().is_some());
        // Old and new views both hold their indices.
        assert_eq!(registry.descriptor_counts(), (2, 2, 0, 0));
        assert_eq!(registry.release_completed(), 0);

        backend.complete_fence(fence.native(), 1);
        assert_eq!(registry.release_completed(), 1);
        assert_eq!(registry.retired_count(), 0);
        assert!(old.upgrade().is_none());
        assert_eq!(registry.descriptor_counts(), (1, 1, 0, 0));
    }

    #[test]
    fn test_render_target_collects_attachment_views() {
        let mut registry = registry();
        let mut table = ResourceTable::default();
        let color = table.insert(VirtualDesc::Texture(RgTextureDesc::absolute(
            TextureDescriptor::new_2d(
                320,
                240,
                TextureFormat::Rgba8Unorm,
                TextureUsage::RENDER_ATTACHMENT,
            ),
        )));
        let depth = table.insert(VirtualDesc::Texture(RgTextureDesc::absolute(
            TextureDescriptor::new_2d(
                320,
                240,
                TextureFormat::Depth32Float,
                TextureUsage::RENDER_ATTACHMENT,
            ),
        )));
        let target = table.insert(VirtualDesc::RenderTarget(
            RenderTargetDesc::new().with_color(color).with_depth(depth),
        ));
        registry.realize(&mut table, RENDER, VIEWPORT).unwrap();

        let realized = registry.render_target(target);
        assert_eq!(realized.color_views, vec![0]);
        assert_eq!(realized.depth_view, Some(0));
        assert_eq!(realized.extent, Extent3d::new_2d(320, 240));
    }

    #[test]
    fn test_non_renderable_attachment_is_an_error() {
        let mut registry = registry();
        let mut table = ResourceTable::default();
        let color = table.insert(VirtualDesc::Texture(RgTextureDesc::absolute(
            TextureDescriptor::new_2d(8, 8, TextureFormat::Rgba8Unorm, TextureUsage::COPY_DST),
        )));
        table.insert(VirtualDesc::RenderTarget(
            RenderTargetDesc::new().with_color(color),
        ));
        let result = registry.realize(&mut table, RENDER, VIEWPORT);
        assert!(matches!(result, Err(GraphicsError::InvalidParameter(_))));
    }

    #[test]
    #[should_panic(expected = "has not been realized")]
    fn test_unrealized_handle_panics() {
        let registry = registry();
        let mut table = ResourceTable::default();
        let buffer = table.insert(VirtualDesc::Buffer(
            BufferDescriptor::new(64, BufferUsage::STORAGE).into(),
        ));
        registry.buffer(buffer);
    }

    #[test]
    fn test_clear_returns_descriptors() {
        let mut registry = registry();
        let mut table = ResourceTable::default();
        table.insert(VirtualDesc::Texture(RgTextureDesc::absolute(
            TextureDescriptor::new_2d(
                8,
                8,
                TextureFormat::Rgba8Unorm,
                TextureUsage::TEXTURE_BINDING | TextureUsage::RENDER_ATTACHMENT,
            ),
        )));
        registry.realize(&mut table, RENDER, VIEWPORT).unwrap();
        assert_eq!(registry.descriptor_counts(), (1, 0, 1, 0));
        registry.clear();
        assert!(registry.is_empty());
        assert_eq!(registry.descriptor_counts(), (0, 0, 0, 0));
    }
}
