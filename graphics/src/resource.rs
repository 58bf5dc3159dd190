//! Realized GPU resources.
//!
//! A [`Resource`] is a buffer or texture that exists on the device. It is
//! shared as `Arc<Resource>`: the registry owns one reference, and every
//! command list that touches the resource holds another until the list has
//! been submitted and recycled, so a resource never dies under in-flight work.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, MutexGuard};

use crate::backend::{GpuBuffer, GpuTexture};
use crate::state::{ResourceStates, SubresourceStates};
use crate::types::{BufferDescriptor, TextureDescriptor};

/// Process-unique identity of a realized resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceUid(u64);

impl ResourceUid {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

/// Creation parameters of a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceDesc {
    Buffer(BufferDescriptor),
    Texture(TextureDescriptor),
}

impl ResourceDesc {
    pub fn label(&self) -> Option<&str> {
        match self {
            Self::Buffer(desc) => desc.label.as_deref(),
            Self::Texture(desc) => desc.label.as_deref(),
        }
    }

    pub fn subresource_count(&self) -> u32 {
        match self {
            Self::Buffer(_) => 1,
            Self::Texture(desc) => desc.subresource_count(),
        }
    }
}

/// Backend object behind a resource.
#[derive(Debug)]
pub enum GpuResource {
    Buffer(GpuBuffer),
    Texture(GpuTexture),
}

/// A buffer or texture living on the device, with its queue-global state.
pub struct Resource {
    uid: ResourceUid,
    desc: ResourceDesc,
    global_state: Mutex<SubresourceStates>,
    native: GpuResource,
}

impl Resource {
    pub(crate) fn new(desc: ResourceDesc, native: GpuResource, initial_state: ResourceStates) -> Self {
        let global_state = SubresourceStates::new(desc.subresource_count(), initial_state);
        Self {
            uid: ResourceUid::next(),
            desc,
            global_state: Mutex::new(global_state),
            native,
        }
    }

    pub fn uid(&self) -> ResourceUid {
        self.uid
    }

    pub fn desc(&self) -> &ResourceDesc {
        &self.desc
    }

    /// Debug label, or `"<unnamed>"`.
    pub fn name(&self) -> &str {
        self.desc.label().unwrap_or("<unnamed>")
    }

    pub fn is_texture(&self) -> bool {
        matches!(self.desc, ResourceDesc::Texture(_))
    }

    pub fn texture_descriptor(&self) -> Option<&TextureDescriptor> {
        match &self.desc {
            ResourceDesc::Texture(desc) => Some(desc),
            ResourceDesc::Buffer(_) => None,
        }
    }

    pub fn buffer_descriptor(&self) -> Option<&BufferDescriptor> {
        match &self.desc {
            ResourceDesc::Buffer(desc) => Some(desc),
            ResourceDesc::Texture(_) => None,
        }
    }

    pub fn subresource_count(&self) -> u32 {
        self.desc.subresource_count()
    }

    /// Snapshot of the queue-global state.
    pub fn global_state(&self) -> SubresourceStates {
        self.global_state.lock().clone()
    }

    /// Lock the queue-global state. Only queue submission mutates it.
    pub(crate) fn lock_global_state(&self) -> MutexGuard<'_, SubresourceStates> {
        self.global_state.lock()
    }

    pub fn native(&self) -> &GpuResource {
        &self.native
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("uid", &self.uid)
            .field("name", &self.name())
            .field("subresources", &self.subresource_count())
            .finish_non_exhaustive()
    }
}
