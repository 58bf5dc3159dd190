//! Common utilities for graphics integration tests.
//!
//! Everything runs on the dummy backend, which records every native call so
//! tests can assert exactly which barriers landed in which list.

#![allow(dead_code)]

use std::sync::Arc;

use cinder_graphics::backend::dummy::DummyCommandList;
use cinder_graphics::{
    BufferDescriptor, BufferUsage, CommandListHandle, CommandQueue, CommandQueueDescriptor,
    DummyBackend, GraphicsDevice, PassHandle, QueueKind, RenderGraph, RenderGraphConfig,
    RenderGraphRegistry, ResourceHandle, RgTextureDesc, TextureDescriptor, TextureFormat,
    TextureUsage,
};

/// Route `log` output through the test harness.
pub fn init_logging() {
    let _ = env_logger::builder()
        .is_test(true)
        .filter_level(log::LevelFilter::Trace)
        .try_init();
}

// ============================================================================
// Test Context
// ============================================================================

/// A dummy device with a graphics queue.
pub struct TestContext {
    /// The backend, for inspecting submissions and completing fences.
    pub backend: Arc<DummyBackend>,
    pub device: GraphicsDevice,
    pub queue: CommandQueue,
}

impl TestContext {
    /// Fences complete as soon as they are signaled.
    pub fn new() -> Self {
        Self::with_backend(DummyBackend::new())
    }

    /// Fences only advance through [`DummyBackend::complete_fence`].
    pub fn with_manual_fences() -> Self {
        Self::with_backend(DummyBackend::with_manual_fences())
    }

    fn with_backend(backend: DummyBackend) -> Self {
        init_logging();
        let backend = Arc::new(backend);
        let device = GraphicsDevice::new(backend.clone());
        let queue = device
            .create_queue(&CommandQueueDescriptor::new(QueueKind::Graphics).with_label("main"))
            .expect("Failed to create queue");
        Self {
            backend,
            device,
            queue,
        }
    }

    pub fn graph(&self) -> RenderGraph {
        RenderGraph::new(self.device.clone(), RenderGraphConfig::default())
    }

    pub fn list(&self, label: &str) -> CommandListHandle {
        self.queue
            .request_command_list(label)
            .expect("Failed to request command list")
    }

    /// Labels of the lists in the most recent submission, in order.
    pub fn last_submission(&self) -> Vec<DummyCommandList> {
        self.backend
            .submissions()
            .pop()
            .expect("Nothing was submitted")
    }

    pub fn last_submission_labels(&self) -> Vec<String> {
        self.last_submission()
            .into_iter()
            .map(|list| list.label)
            .collect()
    }
}

// ============================================================================
// Resource descriptors
// ============================================================================

/// A sampled color target at render resolution.
pub fn color_target() -> RgTextureDesc {
    RgTextureDesc::render_relative(
        TextureDescriptor::new_2d(
            1,
            1,
            TextureFormat::Rgba16Float,
            TextureUsage::TEXTURE_BINDING | TextureUsage::RENDER_ATTACHMENT,
        ),
        1.0,
    )
}

/// A sampled depth target at render resolution.
pub fn depth_target() -> RgTextureDesc {
    RgTextureDesc::render_relative(
        TextureDescriptor::new_2d(
            1,
            1,
            TextureFormat::Depth32Float,
            TextureUsage::TEXTURE_BINDING | TextureUsage::RENDER_ATTACHMENT,
        ),
        1.0,
    )
}

pub fn storage_buffer(size: u64) -> BufferDescriptor {
    BufferDescriptor::new(size, BufferUsage::STORAGE)
}

// ============================================================================
// Graph helpers
// ============================================================================

/// Handles a pass published for the passes after it.
#[derive(Debug, Clone, Copy)]
pub struct Outputs(pub ResourceHandle);

/// Execute callback that records nothing.
pub fn noop() -> impl FnMut(&RenderGraphRegistry, &mut CommandListHandle) + 'static {
    |_: &RenderGraphRegistry, _: &mut CommandListHandle| {}
}

/// Add a pass creating a color target, published as [`Outputs`].
pub fn add_producer(graph: &mut RenderGraph, name: &str) -> PassHandle {
    graph
        .add_render_pass(name, |scheduler| {
            let texture = scheduler.create_texture(color_target());
            scheduler.scope_mut().insert(Outputs(texture));
            noop()
        })
        .expect("Failed to add producer")
}

/// Add a pass reading the [`Outputs`] of `source`.
pub fn add_reader(graph: &mut RenderGraph, name: &str, source: &str) -> PassHandle {
    let source = source.to_owned();
    graph
        .add_render_pass(name, move |scheduler| {
            let Outputs(texture) = *scheduler
                .scope_of::<Outputs>(&source)
                .expect("Source pass has no outputs");
            scheduler.read(texture);
            noop()
        })
        .expect("Failed to add reader")
}

/// Add a pass writing the [`Outputs`] of `source` and publishing the new version.
pub fn add_writer(graph: &mut RenderGraph, name: &str, source: &str) -> PassHandle {
    let source = source.to_owned();
    graph
        .add_render_pass(name, move |scheduler| {
            let Outputs(texture) = *scheduler
                .scope_of::<Outputs>(&source)
                .expect("Source pass has no outputs");
            let written = scheduler.write(texture);
            scheduler.scope_mut().insert(Outputs(written));
            noop()
        })
        .expect("Failed to add writer")
}

/// Level index of a pass after setup.
pub fn level_of(graph: &RenderGraph, name: &str) -> usize {
    graph
        .pass(name)
        .and_then(|pass| pass.level())
        .unwrap_or_else(|| panic!("Pass '{name}' has no level"))
}
