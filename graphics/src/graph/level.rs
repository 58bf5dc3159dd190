//! Dependency levels.

use std::collections::BTreeSet;

use crate::state::ResourceStates;

use super::handle::{PassHandle, ResourceId};
use super::pass::RenderPass;
use super::resource::ResourceTable;

/// Passes at the same longest-path distance from a source pass.
///
/// No edge connects two passes of one level, so they may be recorded in any
/// order. The level's transitions are requested once, before any of its
/// passes runs.
#[derive(Debug, Clone, Default)]
pub struct DependencyLevel {
    index: usize,
    passes: Vec<PassHandle>,
    reads: BTreeSet<ResourceId>,
    writes: BTreeSet<ResourceId>,
    transitions: Vec<(ResourceId, ResourceStates)>,
}

impl DependencyLevel {
    pub(crate) fn new(index: usize) -> Self {
        Self {
            index,
            ..Default::default()
        }
    }

    pub(crate) fn add_pass(&mut self, pass: &RenderPass) {
        self.passes.push(pass.handle());
        self.reads
            .extend(pass.reads().iter().map(|handle| handle.resource_id()));
        self.writes
            .extend(pass.writes().iter().map(|handle| handle.resource_id()));
    }

    /// Infer the state of every resource the level touches.
    ///
    /// A resource both read and written within the level takes its write
    /// state. Render targets are skipped; their attachments carry the state.
    pub(crate) fn build_transitions(&mut self, resources: &ResourceTable) {
        self.transitions.clear();
        for &id in &self.writes {
            if let Some(state) = resources.get(id).desc().write_state() {
                self.transitions.push((id, state));
            }
        }
        for &id in self.reads.difference(&self.writes) {
            if let Some(state) = resources.get(id).desc().read_state() {
                self.transitions.push((id, state));
            }
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Member passes, in topological order.
    pub fn passes(&self) -> &[PassHandle] {
        &self.passes
    }

    pub fn reads(&self) -> &BTreeSet<ResourceId> {
        &self.reads
    }

    pub fn writes(&self) -> &BTreeSet<ResourceId> {
        &self.writes
    }

    /// States each touched resource must be in before the level runs.
    pub fn transitions(&self) -> &[(ResourceId, ResourceStates)] {
        &self.transitions
    }

    /// The state required for one resource, if the level touches it.
    pub fn required_state(&self, id: ResourceId) -> Option<ResourceStates> {
        self.transitions
            .iter()
            .find(|(resource, _)| *resource == id)
            .map(|(_, state)| *state)
    }
}
