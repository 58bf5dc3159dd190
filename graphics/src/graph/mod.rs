//! Render graph infrastructure.
//!
//! The render graph lets rendering code declare a frame as named passes with
//! the resources each one creates, reads and writes. From those declarations
//! the graph works out:
//!
//! - the order passes must run in (topological sort of read/write edges),
//! - which passes are independent (dependency levels),
//! - which state every resource must be in before each level runs.
//!
//! # Lifecycle
//!
//! | Step | Method | Work |
//! |------|--------|------|
//! | Declare | [`RenderGraph::add_render_pass`] | Run the pass's setup closure against a [`RenderGraphScheduler`] |
//! | Setup | [`RenderGraph::setup`] | Edges, topological order, longest paths, levels |
//! | Compile | [`RenderGraph::compile`] | Realize dirty resources through the [`RenderGraphRegistry`] |
//! | Execute | [`RenderGraph::execute`] | Per level: transitions, flush, pass callbacks |
//!
//! Setup only needs to run again when passes are added. Compile runs again
//! when resources become dirty, for example after
//! [`RenderGraph::set_resolution`]. Resources a compile replaces are kept
//! until the submission reported through [`RenderGraph::track_submission`]
//! completes.
//!
//! # Example
//!
//! ```ignore
//! let mut graph = RenderGraph::new(device, RenderGraphConfig::default());
//!
//! graph.add_render_pass("gbuffer", |scheduler| {
//!     let albedo = scheduler.create_texture(RgTextureDesc::render_relative(albedo_desc, 1.0));
//!     scheduler.scope_mut().insert(GBuffer { albedo });
//!     move |registry, list| { /* record */ }
//! })?;
//!
//! graph.add_render_pass("lighting", |scheduler| {
//!     let gbuffer = *scheduler.scope_of::<GBuffer>("gbuffer").unwrap();
//!     scheduler.read(gbuffer.albedo);
//!     move |registry, list| { /* record */ }
//! })?;
//!
//! graph.setup()?;
//! graph.execute(&mut list)?;
//! let sync = queue.execute_command_lists([list], false)?;
//! graph.track_submission(&sync);
//! ```

mod handle;
mod level;
mod pass;
mod registry;
mod resource;
mod scheduler;

use std::any::Any;
use std::collections::{BTreeSet, HashMap};
use std::fmt::Write;

use crate::command::CommandListHandle;
use crate::device::GraphicsDevice;
use crate::error::{GraphError, GraphicsError};
use crate::state::ALL_SUBRESOURCES;
use crate::sync::SyncHandle;
use crate::types::Resolution;

pub use handle::{HandleState, PassHandle, ResourceHandle, ResourceId, ResourceKind};
pub use level::DependencyLevel;
pub use pass::{ExecuteFn, RenderPass};
pub use registry::{RenderGraphRegistry, RenderTarget, TextureView};
pub use resource::{
    RenderTargetDesc, RgBufferDesc, RgTextureDesc, TextureSize, VirtualDesc, VirtualResource,
};
pub use scheduler::RenderGraphScheduler;

use resource::ResourceTable;

/// Resolutions relative textures are sized from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderGraphConfig {
    /// Internal render resolution.
    pub render_resolution: Resolution,
    /// Output viewport resolution.
    pub viewport_resolution: Resolution,
}

impl RenderGraphConfig {
    pub fn with_render_resolution(mut self, width: u32, height: u32) -> Self {
        self.render_resolution = Resolution::new(width, height);
        self
    }

    pub fn with_viewport_resolution(mut self, width: u32, height: u32) -> Self {
        self.viewport_resolution = Resolution::new(width, height);
        self
    }
}

impl Default for RenderGraphConfig {
    fn default() -> Self {
        Self {
            render_resolution: Resolution::new(1280, 720),
            viewport_resolution: Resolution::new(1280, 720),
        }
    }
}

/// The render graph describes a frame's passes and their resources.
///
/// Passes and levels live in two arrays owned by the graph; a pass refers to
/// its level by index.
pub struct RenderGraph {
    config: RenderGraphConfig,
    passes: Vec<RenderPass>,
    names: HashMap<String, PassHandle>,
    resources: ResourceTable,
    registry: RenderGraphRegistry,
    /// Dependency edges as (producer, consumer) pairs, sorted.
    edges: Vec<(PassHandle, PassHandle)>,
    topological_order: Vec<PassHandle>,
    levels: Vec<DependencyLevel>,
    needs_setup: bool,
}

impl RenderGraph {
    pub fn new(device: GraphicsDevice, config: RenderGraphConfig) -> Self {
        Self {
            config,
            passes: Vec::new(),
            names: HashMap::new(),
            resources: ResourceTable::default(),
            registry: RenderGraphRegistry::new(device),
            edges: Vec::new(),
            topological_order: Vec::new(),
            levels: Vec::new(),
            needs_setup: false,
        }
    }

    /// Add a pass and declare its resources.
    ///
    /// `setup` receives a scheduler bound to the new pass and returns the
    /// callback that records the pass's commands at execution time.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::DuplicatePassName`] if a pass with this name
    /// already exists. The setup closure is not run in that case.
    pub fn add_render_pass<S, E>(
        &mut self,
        name: impl Into<String>,
        setup: S,
    ) -> Result<PassHandle, GraphError>
    where
        S: FnOnce(&mut RenderGraphScheduler<'_>) -> E,
        E: FnMut(&RenderGraphRegistry, &mut CommandListHandle) + 'static,
    {
        let name = name.into();
        if self.names.contains_key(&name) {
            return Err(GraphError::DuplicatePassName(name));
        }

        let handle = PassHandle::new(self.passes.len());
        let mut pass = RenderPass::new(name.clone(), handle);
        let execute = {
            let mut scheduler = RenderGraphScheduler {
                pass: &mut pass,
                resources: &mut self.resources,
                passes: &self.passes,
                render_resolution: self.config.render_resolution,
                viewport_resolution: self.config.viewport_resolution,
            };
            setup(&mut scheduler)
        };
        pass.execute = Some(Box::new(execute));

        log::trace!(
            "RenderGraph: added pass '{name}' ({} reads, {} writes)",
            pass.reads.len(),
            pass.writes.len()
        );
        self.passes.push(pass);
        self.names.insert(name, handle);
        self.needs_setup = true;
        Ok(handle)
    }

    /// Build edges, the topological order and the dependency levels.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::CyclicDependency`] if the declared reads and
    /// writes form a cycle.
    pub fn setup(&mut self) -> Result<(), GraphError> {
        cinder_core::profile_scope!("render_graph_setup");

        let adjacency = self.build_edges();
        let order = topological_sort(&adjacency).map_err(|pass| {
            GraphError::CyclicDependency(self.passes[pass].name().to_owned())
        })?;

        for (index, &pass) in order.iter().enumerate() {
            self.passes[pass].topological_index = Some(index);
        }

        // Longest path from any source, relaxed once over the topological order.
        let mut distance = vec![0usize; self.passes.len()];
        for &from in &order {
            for &to in &adjacency[from] {
                distance[to] = distance[to].max(distance[from] + 1);
            }
        }

        let level_count = distance.iter().max().map_or(0, |max| max + 1);
        self.levels = (0..level_count).map(DependencyLevel::new).collect();
        for &pass in &order {
            let level = distance[pass];
            self.passes[pass].level = Some(level);
            self.levels[level].add_pass(&self.passes[pass]);
        }
        for level in &mut self.levels {
            level.build_transitions(&self.resources);
        }

        self.topological_order = order.into_iter().map(PassHandle::new).collect();
        self.needs_setup = false;

        log::debug!(
            "RenderGraph: setup {} passes, {} edges, {} levels",
            self.passes.len(),
            self.edges.len(),
            self.levels.len()
        );
        Ok(())
    }

    /// Edge `i -> j` when `j` reads a version `i` wrote, when `i` reads a
    /// version older than one `j` writes, or when both write a resource and
    /// `i` wrote the older version. Returns the adjacency list.
    fn build_edges(&mut self) -> Vec<Vec<usize>> {
        let mut edges = BTreeSet::new();
        for (i, producer) in self.passes.iter().enumerate() {
            if !producer.has_dependencies() {
                continue;
            }
            for (j, consumer) in self.passes.iter().enumerate() {
                if i == j {
                    continue;
                }
                let read_after_write = consumer
                    .reads()
                    .iter()
                    .any(|read| producer.writes().contains(read));
                if read_after_write {
                    edges.insert((i, j));
                }

                // `consumer` must read the old contents before `producer` replaces them.
                let write_after_read = producer.writes().iter().any(|write| {
                    consumer.reads().iter().any(|read| {
                        read.same_resource(write) && read.version() < write.version()
                    })
                });
                if write_after_read {
                    edges.insert((j, i));
                }

                // Writes of one resource land in version order, even when a
                // pass wrote through a stale handle.
                let write_after_write = producer.writes().iter().any(|write| {
                    consumer.writes().iter().any(|later| {
                        later.same_resource(write) && write.version() < later.version()
                    })
                });
                if write_after_write {
                    edges.insert((i, j));
                }
            }
        }

        let mut adjacency = vec![Vec::new(); self.passes.len()];
        for &(from, to) in &edges {
            adjacency[from].push(to);
        }
        self.edges = edges
            .into_iter()
            .map(|(from, to)| (PassHandle::new(from), PassHandle::new(to)))
            .collect();
        adjacency
    }

    /// Realize every dirty resource. Returns how many were realized.
    pub fn compile(&mut self) -> Result<usize, GraphicsError> {
        cinder_core::profile_scope!("render_graph_compile");
        let count = self.registry.realize(
            &mut self.resources,
            self.config.render_resolution,
            self.config.viewport_resolution,
        )?;
        if count > 0 {
            log::debug!("RenderGraph: realized {count} resources");
        }
        Ok(count)
    }

    /// Record every level into `list`.
    ///
    /// Sets the graph up again if passes were added, and compiles if any
    /// resource is dirty. Each level's transitions are requested on the list
    /// and flushed before its passes are recorded.
    pub fn execute(&mut self, list: &mut CommandListHandle) -> Result<(), GraphicsError> {
        cinder_core::profile_scope!("render_graph_execute");
        if self.needs_setup {
            self.setup()?;
        }
        if self.resources.has_dirty() {
            self.compile()?;
        }

        for level in &self.levels {
            for &(id, state) in level.transitions() {
                list.transition_barrier(self.registry.resource(id), state, ALL_SUBRESOURCES);
            }
            list.flush_resource_barriers();

            for &handle in level.passes() {
                let pass = &mut self.passes[handle.index()];
                if let Some(execute) = pass.execute.as_mut() {
                    cinder_core::profile_scope!("render_pass");
                    execute(&self.registry, list);
                }
            }
        }
        Ok(())
    }

    /// Update the graph resolutions.
    ///
    /// Textures sized from a resolution that changed (and render targets
    /// using them) are realized again before the next execution. Returns
    /// true if anything changed.
    pub fn set_resolution(
        &mut self,
        render_width: u32,
        render_height: u32,
        viewport_width: u32,
        viewport_height: u32,
    ) -> bool {
        let render = Resolution::new(render_width, render_height);
        let viewport = Resolution::new(viewport_width, viewport_height);
        let render_changed = render != self.config.render_resolution;
        let viewport_changed = viewport != self.config.viewport_resolution;
        if !render_changed && !viewport_changed {
            return false;
        }

        self.config.render_resolution = render;
        self.config.viewport_resolution = viewport;
        let invalidated = self
            .resources
            .invalidate_relative(render_changed, viewport_changed);
        log::debug!(
            "RenderGraph: resolution {render_width}x{render_height} (viewport \
             {viewport_width}x{viewport_height}), {invalidated} resources invalidated"
        );
        true
    }

    pub fn config(&self) -> &RenderGraphConfig {
        &self.config
    }

    pub fn pass(&self, name: &str) -> Option<&RenderPass> {
        self.names.get(name).map(|handle| &self.passes[handle.index()])
    }

    /// # Panics
    ///
    /// Panics if the handle was not issued by this graph.
    pub fn pass_by_handle(&self, handle: PassHandle) -> &RenderPass {
        &self.passes[handle.index()]
    }

    pub fn passes(&self) -> &[RenderPass] {
        &self.passes
    }

    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    /// Read a value from a pass's scope.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownPass`] if no pass has this name.
    pub fn scope_of<T: Any + Send>(&self, pass_name: &str) -> Result<Option<&T>, GraphError> {
        self.pass(pass_name)
            .map(|pass| pass.scope().get::<T>())
            .ok_or_else(|| GraphError::UnknownPass(pass_name.to_owned()))
    }

    /// Levels of the last setup, in execution order.
    pub fn levels(&self) -> &[DependencyLevel] {
        &self.levels
    }

    pub fn topological_order(&self) -> &[PassHandle] {
        &self.topological_order
    }

    /// Dependency edges of the last setup as (producer, consumer) pairs.
    pub fn edges(&self) -> &[(PassHandle, PassHandle)] {
        &self.edges
    }

    pub fn registry(&self) -> &RenderGraphRegistry {
        &self.registry
    }

    /// Report the submission of a list this graph was executed into.
    ///
    /// Resources replaced by a later compile stay alive until `sync`
    /// completes.
    pub fn track_submission(&mut self, sync: &SyncHandle) {
        self.registry.track_submission(sync);
    }

    /// Virtual resource behind a handle.
    ///
    /// # Panics
    ///
    /// Panics if the handle does not belong to this graph.
    pub fn resource(&self, handle: ResourceHandle) -> &VirtualResource {
        self.resources.get(handle.resource_id())
    }

    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    /// Remove every pass and retire every realized resource.
    pub fn clear(&mut self) {
        self.passes.clear();
        self.names.clear();
        self.resources.clear();
        self.registry.clear();
        self.edges.clear();
        self.topological_order.clear();
        self.levels.clear();
        self.needs_setup = false;
    }

    /// Graphviz description of passes grouped by level, with their edges.
    pub fn export_dot(&self) -> String {
        let mut dot = String::from("digraph RenderGraph {\n    rankdir=LR;\n");
        for level in &self.levels {
            let _ = writeln!(dot, "    subgraph cluster_{} {{", level.index());
            let _ = writeln!(dot, "        label=\"Level {}\";", level.index());
            for handle in level.passes() {
                let _ = writeln!(
                    dot,
                    "        p{} [label=\"{}\"];",
                    handle.index(),
                    self.passes[handle.index()].name()
                );
            }
            dot.push_str("    }\n");
        }
        for (from, to) in &self.edges {
            let _ = writeln!(dot, "    p{} -> p{};", from.index(), to.index());
        }
        dot.push_str("}\n");
        dot
    }
}

impl std::fmt::Debug for RenderGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderGraph")
            .field("config", &self.config)
            .field("passes", &self.passes.len())
            .field("resources", &self.resources.len())
            .field("levels", &self.levels.len())
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    New,
    OnStack,
    Done,
}

/// Iterative depth-first topological sort.
///
/// Roots and children are visited from the highest index down, so reversing
/// the postorder keeps independent passes in declaration order. Returns a
/// pass on a cycle if there is one.
fn topological_sort(adjacency: &[Vec<usize>]) -> Result<Vec<usize>, usize> {
    let mut visits = vec![Visit::New; adjacency.len()];
    let mut postorder = Vec::with_capacity(adjacency.len());
    let mut stack: Vec<(usize, usize)> = Vec::new();

    for root in (0..adjacency.len()).rev() {
        if visits[root] != Visit::New {
            continue;
        }
        visits[root] = Visit::OnStack;
        stack.push((root, 0));

        while let Some((node, cursor)) = stack.last_mut() {
            let node = *node;
            let children = &adjacency[node];
            if *cursor == children.len() {
                visits[node] = Visit::Done;
                postorder.push(node);
                stack.pop();
                continue;
            }
            let child = children[children.len() - 1 - *cursor];
            *cursor += 1;
            match visits[child] {
                Visit::New => {
                    visits[child] = Visit::OnStack;
                    stack.push((child, 0));
                }
                Visit::OnStack => return Err(child),
                Visit::Done => {}
            }
        }
    }

    postorder.reverse();
    Ok(postorder)
}
