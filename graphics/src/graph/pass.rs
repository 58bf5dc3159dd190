//! Render passes.

use std::collections::BTreeSet;
use std::fmt;

use cinder_core::scope::TypeMap;

use crate::command::CommandListHandle;

use super::handle::{PassHandle, ResourceHandle, ResourceId};
use super::registry::RenderGraphRegistry;

/// Callback that records a pass's commands.
pub type ExecuteFn = Box<dyn FnMut(&RenderGraphRegistry, &mut CommandListHandle)>;

/// A named unit of GPU work with declared resource reads and writes.
///
/// Passes are created by [`RenderGraph::add_render_pass`](super::RenderGraph::add_render_pass)
/// and live as long as the graph. The topological index and level are
/// assigned by `setup()`.
pub struct RenderPass {
    name: String,
    handle: PassHandle,
    pub(crate) reads: Vec<ResourceHandle>,
    pub(crate) writes: Vec<ResourceHandle>,
    pub(crate) dependencies: BTreeSet<ResourceId>,
    pub(crate) topological_index: Option<usize>,
    pub(crate) level: Option<usize>,
    pub(crate) execute: Option<ExecuteFn>,
    pub(crate) scope: TypeMap,
}

impl RenderPass {
    pub(crate) fn new(name: String, handle: PassHandle) -> Self {
        Self {
            name,
            handle,
            reads: Vec::new(),
            writes: Vec::new(),
            dependencies: BTreeSet::new(),
            topological_index: None,
            level: None,
            execute: None,
            scope: TypeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handle(&self) -> PassHandle {
        self.handle
    }

    /// Versioned handles this pass reads.
    pub fn reads(&self) -> &[ResourceHandle] {
        &self.reads
    }

    /// Versioned handles this pass writes.
    pub fn writes(&self) -> &[ResourceHandle] {
        &self.writes
    }

    /// Every resource this pass reads or writes.
    pub fn dependencies(&self) -> &BTreeSet<ResourceId> {
        &self.dependencies
    }

    pub fn has_dependencies(&self) -> bool {
        !self.dependencies.is_empty()
    }

    /// Position in the topological order of the last setup.
    pub fn topological_index(&self) -> Option<usize> {
        self.topological_index
    }

    /// Dependency level assigned by the last setup.
    pub fn level(&self) -> Option<usize> {
        self.level
    }

    pub fn scope(&self) -> &TypeMap {
        &self.scope
    }

    pub fn reads_resource(&self, id: ResourceId) -> bool {
        self.reads.iter().any(|handle| handle.resource_id() == id)
    }

    pub fn writes_resource(&self, id: ResourceId) -> bool {
        self.writes.iter().any(|handle| handle.resource_id() == id)
    }

    pub(crate) fn add_read(&mut self, handle: ResourceHandle) {
        if !self.reads.contains(&handle) {
            self.reads.push(handle);
        }
        self.dependencies.insert(handle.resource_id());
    }

    pub(crate) fn add_write(&mut self, handle: ResourceHandle) {
        if !self.writes.contains(&handle) {
            self.writes.push(handle);
        }
        self.dependencies.insert(handle.resource_id());
    }
}

impl fmt::Debug for RenderPass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderPass")
            .field("name", &self.name)
            .field("handle", &self.handle)
            .field("reads", &self.reads)
            .field("writes", &self.writes)
            .field("topological_index", &self.topological_index)
            .field("level", &self.level)
            .finish_non_exhaustive()
    }
}
