//! Virtual resource handles for the render graph.

use std::fmt;
use std::hash::{Hash, Hasher};

/// Kind of resource a handle refers to. Each kind has its own id space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Buffer,
    Texture,
    RenderTarget,
}

/// Whether the handle's resource had been realized when the handle was issued.
///
/// Informational only; the graph's resource table decides what is dirty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleState {
    Dirty,
    Ready,
}

/// Version-insensitive identity of a graph resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId {
    pub kind: ResourceKind,
    pub id: u32,
}

/// A versioned reference to a graph resource.
///
/// Every write produces a new handle with the version bumped by one, so a
/// pass that reads an old handle can be told apart from one that reads the
/// latest contents. Equality and hashing use kind, id and version; use
/// [`ResourceHandle::resource_id`] to compare resources regardless of version.
#[derive(Clone, Copy)]
pub struct ResourceHandle {
    kind: ResourceKind,
    state: HandleState,
    version: u32,
    id: u32,
}

impl ResourceHandle {
    pub(crate) fn new(kind: ResourceKind, id: u32, version: u32, state: HandleState) -> Self {
        Self {
            kind,
            state,
            version,
            id,
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn state(&self) -> HandleState {
        self.state
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Index into the per-kind resource table.
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn resource_id(&self) -> ResourceId {
        ResourceId {
            kind: self.kind,
            id: self.id,
        }
    }

    /// Returns true if both handles refer to the same resource, at any version.
    pub fn same_resource(&self, other: &ResourceHandle) -> bool {
        self.resource_id() == other.resource_id()
    }

    pub(crate) fn with_version(self, version: u32) -> Self {
        Self { version, ..self }
    }
}

impl PartialEq for ResourceHandle {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.id == other.id && self.version == other.version
    }
}

impl Eq for ResourceHandle {}

impl Hash for ResourceHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
        self.id.hash(state);
        self.version.hash(state);
    }
}

impl fmt::Debug for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({}.v{})", self.kind, self.id, self.version)
    }
}

/// Handle to a pass in the render graph.
///
/// `PassHandle` is `Copy` and cheap to pass around. It is only valid within
/// the `RenderGraph` that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PassHandle(u32);

impl PassHandle {
    pub(crate) fn new(index: usize) -> Self {
        Self(index as u32)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}
