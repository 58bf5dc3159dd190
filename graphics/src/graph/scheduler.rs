//! Per-pass resource declaration.

use std::any::Any;

use cinder_core::scope::TypeMap;

use crate::types::Resolution;

use super::handle::{ResourceHandle, ResourceKind};
use super::pass::RenderPass;
use super::resource::{RenderTargetDesc, ResourceTable, RgBufferDesc, RgTextureDesc, VirtualDesc};

/// Declares the resources one pass creates, reads and writes.
///
/// A scheduler exists only while the graph runs a pass's setup closure, and
/// always records into that pass.
///
/// ```ignore
/// graph.add_render_pass("lighting", |scheduler| {
///     let gbuffer = scheduler.scope_of::<GBuffer>("gbuffer").copied().unwrap();
///     let albedo = scheduler.read(gbuffer.albedo);
///     let hdr = scheduler.create_texture(RgTextureDesc::render_relative(desc, 1.0));
///     move |registry, list| { /* record */ }
/// })?;
/// ```
pub struct RenderGraphScheduler<'g> {
    pub(crate) pass: &'g mut RenderPass,
    pub(crate) resources: &'g mut ResourceTable,
    pub(crate) passes: &'g [RenderPass],
    pub(crate) render_resolution: Resolution,
    pub(crate) viewport_resolution: Resolution,
}

impl RenderGraphScheduler<'_> {
    /// Name of the pass being declared.
    pub fn pass_name(&self) -> &str {
        self.pass.name()
    }

    pub fn render_resolution(&self) -> Resolution {
        self.render_resolution
    }

    pub fn viewport_resolution(&self) -> Resolution {
        self.viewport_resolution
    }

    /// Create a buffer written by this pass.
    pub fn create_buffer(&mut self, desc: impl Into<RgBufferDesc>) -> ResourceHandle {
        self.create(VirtualDesc::Buffer(desc.into()))
    }

    /// Create a texture written by this pass.
    pub fn create_texture(&mut self, desc: impl Into<RgTextureDesc>) -> ResourceHandle {
        self.create(VirtualDesc::Texture(desc.into()))
    }

    /// Create a render target over existing textures.
    ///
    /// Each attachment is written by this pass; the descriptor stored for the
    /// render target refers to the new attachment versions.
    pub fn create_render_target(&mut self, mut desc: RenderTargetDesc) -> ResourceHandle {
        for attachment in desc
            .color_attachments
            .iter_mut()
            .chain(desc.depth_attachment.iter_mut())
        {
            assert_eq!(
                attachment.kind(),
                ResourceKind::Texture,
                "Render target attachment {attachment:?} is not a texture"
            );
            *attachment = self.write(*attachment);
        }
        self.create(VirtualDesc::RenderTarget(desc))
    }

    fn create(&mut self, desc: VirtualDesc) -> ResourceHandle {
        let handle = self.resources.insert(desc);
        log::trace!("Pass '{}' creates {handle:?}", self.pass.name());
        self.pass.add_write(handle);
        handle
    }

    /// Declare that this pass reads `handle`.
    ///
    /// # Panics
    ///
    /// Panics if the handle does not belong to this graph.
    pub fn read(&mut self, handle: ResourceHandle) -> ResourceHandle {
        let latest = self.resources.get(handle.resource_id()).version();
        if handle.version() < latest {
            log::warn!(
                "Pass '{}' reads {handle:?}, but v{latest} has since been written",
                self.pass.name()
            );
        }
        let handle = ResourceHandle::new(
            handle.kind(),
            handle.id(),
            handle.version(),
            self.resources.handle_state(handle.resource_id()),
        );
        self.pass.add_read(handle);
        handle
    }

    /// Declare that this pass writes `handle` and get the new version.
    ///
    /// The version is one past the latest written version of the resource.
    /// The consumed version counts as read, so the pass runs after whoever
    /// produced it.
    ///
    /// # Panics
    ///
    /// Panics if the handle does not belong to this graph.
    pub fn write(&mut self, handle: ResourceHandle) -> ResourceHandle {
        let consumed = self.read(handle);
        let version = self.resources.bump_version(handle.resource_id());
        let written = consumed.with_version(version);
        log::trace!("Pass '{}' writes {written:?}", self.pass.name());
        self.pass.add_write(written);
        written
    }

    /// Pass-local storage, readable by later passes through [`Self::scope_of`].
    pub fn scope(&self) -> &TypeMap {
        &self.pass.scope
    }

    pub fn scope_mut(&mut self) -> &mut TypeMap {
        &mut self.pass.scope
    }

    /// Read a value stored in an earlier pass's scope.
    pub fn scope_of<T: Any + Send>(&self, pass_name: &str) -> Option<&T> {
        self.passes
            .iter()
            .find(|pass| pass.name() == pass_name)
            .and_then(|pass| pass.scope.get::<T>())
    }
}
