//! Render graph integration tests.
//!
//! Graphs are declared through the public pass API and checked for ordering,
//! level assignment and the barriers their execution records.
//!
//! ```bash
//! cargo test --test render_graph_tests
//! ```

mod common;

use std::collections::HashMap;

use rstest::rstest;

use cinder_graphics::backend::dummy::{BarrierRecord, DummyCommand};
use cinder_graphics::command::MAX_BATCHED_BARRIERS;
use cinder_graphics::{
    ALL_SUBRESOURCES, CommandListHandle, GraphError, RenderGraph, RenderGraphRegistry,
    RenderTargetDesc, ResourceStates, RgTextureDesc, TextureDescriptor, TextureFormat,
    TextureUsage,
};

use common::{
    Outputs, TestContext, add_producer, add_reader, add_writer, color_target, depth_target,
    level_of, noop, storage_buffer,
};

/// Topological positions precede along every edge, levels strictly increase
/// along every edge, and no edge joins two passes of one level.
fn assert_schedule_valid(graph: &RenderGraph) {
    assert_eq!(graph.topological_order().len(), graph.pass_count());
    for &(from, to) in graph.edges() {
        let from = graph.pass_by_handle(from);
        let to = graph.pass_by_handle(to);
        assert!(
            from.topological_index() < to.topological_index(),
            "'{}' must come before '{}'",
            from.name(),
            to.name()
        );
        assert!(
            from.level() < to.level(),
            "'{}' must be in an earlier level than '{}'",
            from.name(),
            to.name()
        );
    }

    let mut seen = 0;
    for (index, level) in graph.levels().iter().enumerate() {
        assert_eq!(level.index(), index);
        assert!(!level.passes().is_empty(), "Level {index} is empty");
        seen += level.passes().len();
        for &pass in level.passes() {
            assert_eq!(graph.pass_by_handle(pass).level(), Some(index));
        }
    }
    assert_eq!(seen, graph.pass_count());
}

// ============================================================================
// Scheduling
// ============================================================================

/// Scenario: P1 writes R, P2 reads R, P3 writes an unrelated R2.
#[test]
fn test_independent_writer_shares_first_level() {
    let ctx = TestContext::new();
    let mut graph = ctx.graph();
    add_producer(&mut graph, "p1");
    add_reader(&mut graph, "p2", "p1");
    add_producer(&mut graph, "p3");
    graph.setup().unwrap();

    assert_eq!(level_of(&graph, "p1"), 0);
    assert_eq!(level_of(&graph, "p3"), 0);
    assert_eq!(level_of(&graph, "p2"), 1);
    assert_eq!(graph.levels().len(), 2);
    assert_schedule_valid(&graph);
}

/// Scenario: reads before any write see version 0, each write adds one.
#[test]
fn test_versions_bump_by_one_per_write() {
    let ctx = TestContext::new();
    let mut graph = ctx.graph();
    add_producer(&mut graph, "create");

    let versions = std::sync::Arc::new(parking_lot::Mutex::new(Vec::new()));
    let recorded = versions.clone();
    graph
        .add_render_pass("writes", move |scheduler| {
            let Outputs(texture) = *scheduler.scope_of::<Outputs>("create").unwrap();
            let read = scheduler.read(texture);
            let first = scheduler.write(texture);
            let second = scheduler.write(first);
            recorded
                .lock()
                .extend([read.version(), first.version(), second.version()]);
            assert!(first.same_resource(&second));
            assert_ne!(first, second);
            noop()
        })
        .unwrap();

    assert_eq!(*versions.lock(), vec![0, 1, 2]);
}

/// How a pass in a generated graph touches the graph.
#[derive(Debug, Clone, Copy)]
enum Decl {
    Create,
    Read(&'static str),
    Write(&'static str),
}

use Decl::{Create, Read, Write};

#[rstest]
#[case::chain(&[("a", Create), ("b", Write("a")), ("c", Write("b")), ("d", Write("c"))], 4)]
#[case::fan_out(&[("a", Create), ("b", Read("a")), ("c", Read("a")), ("d", Read("a"))], 2)]
#[case::independent(&[("a", Create), ("b", Create), ("c", Create)], 1)]
#[case::two_chains(&[("a", Create), ("b", Create), ("c", Write("a")), ("d", Write("c")), ("e", Write("b"))], 3)]
#[case::read_then_overwrite(&[("a", Create), ("b", Read("a")), ("c", Write("a")), ("d", Read("c"))], 4)]
fn test_schedule_shapes(#[case] passes: &[(&str, Decl)], #[case] expected_levels: usize) {
    let ctx = TestContext::new();
    let mut graph = ctx.graph();
    for &(name, decl) in passes {
        match decl {
            Create => add_producer(&mut graph, name),
            Read(source) => add_reader(&mut graph, name, source),
            Write(source) => add_writer(&mut graph, name, source),
        };
    }
    graph.setup().unwrap();

    assert_eq!(graph.levels().len(), expected_levels);
    assert_schedule_valid(&graph);
}

#[test]
fn test_reader_runs_before_overwrite() {
    let ctx = TestContext::new();
    let mut graph = ctx.graph();
    add_producer(&mut graph, "create");
    add_reader(&mut graph, "sample", "create");
    add_writer(&mut graph, "overwrite", "create");
    graph.setup().unwrap();

    let sample = graph.pass("sample").unwrap().handle();
    let overwrite = graph.pass("overwrite").unwrap().handle();
    assert!(graph.edges().contains(&(sample, overwrite)));
    assert_eq!(level_of(&graph, "sample"), 1);
    assert_eq!(level_of(&graph, "overwrite"), 2);
}

#[test]
fn test_diamond_joins_at_deepest_branch() {
    let ctx = TestContext::new();
    let mut graph = ctx.graph();
    add_producer(&mut graph, "gbuffer");
    graph
        .add_render_pass("ssao", |scheduler| {
            let Outputs(gbuffer) = *scheduler.scope_of::<Outputs>("gbuffer").unwrap();
            scheduler.read(gbuffer);
            let ao = scheduler.create_texture(color_target());
            scheduler.scope_mut().insert(Outputs(ao));
            noop()
        })
        .unwrap();
    add_producer(&mut graph, "shadows");
    add_writer(&mut graph, "shadows_blur", "shadows");
    graph
        .add_render_pass("lighting", |scheduler| {
            for source in ["gbuffer", "ssao", "shadows_blur"] {
                let Outputs(input) = *scheduler.scope_of::<Outputs>(source).unwrap();
                scheduler.read(input);
            }
            noop()
        })
        .unwrap();
    graph.setup().unwrap();

    assert_eq!(level_of(&graph, "gbuffer"), 0);
    assert_eq!(level_of(&graph, "shadows"), 0);
    assert_eq!(level_of(&graph, "ssao"), 1);
    assert_eq!(level_of(&graph, "shadows_blur"), 1);
    assert_eq!(level_of(&graph, "lighting"), 2);
    assert_eq!(graph.edges().len(), 5);
    assert_schedule_valid(&graph);
}

/// Scenario: adding a pass keeps the existing level assignment.
#[rstest]
#[case::reads_second_level("p2")]
#[case::reads_independent("p3")]
fn test_setup_again_preserves_levels(#[case] source: &str) {
    let ctx = TestContext::new();
    let mut graph = ctx.graph();
    add_producer(&mut graph, "p1");
    add_writer(&mut graph, "p2", "p1");
    add_producer(&mut graph, "p3");
    graph.setup().unwrap();

    let before: HashMap<String, usize> = ["p1", "p2", "p3"]
        .iter()
        .map(|name| (name.to_string(), level_of(&graph, name)))
        .collect();
    let edges_before = graph.edges().to_vec();

    add_reader(&mut graph, "p4", source);
    graph.setup().unwrap();

    for (name, level) in &before {
        assert_eq!(level_of(&graph, name), *level, "'{name}' moved");
    }
    assert_eq!(level_of(&graph, "p4"), level_of(&graph, source) + 1);
    let p4 = graph.pass("p4").unwrap().handle();
    let new_edges: Vec<_> = graph
        .edges()
        .iter()
        .filter(|edge| !edges_before.contains(edge))
        .collect();
    assert!(new_edges.iter().all(|(from, to)| *from == p4 || *to == p4));
    assert_schedule_valid(&graph);
}

#[test]
fn test_stale_write_cycle_is_reported() {
    let ctx = TestContext::new();
    let mut graph = ctx.graph();
    add_producer(&mut graph, "create");
    add_writer(&mut graph, "first", "create");
    // Overwrites contents "first" already replaced, so it can run neither
    // before nor after "first".
    add_writer(&mut graph, "second", "create");
    add_reader(&mut graph, "sample", "second");

    assert!(matches!(
        graph.setup(),
        Err(GraphError::CyclicDependency(_))
    ));
}

#[test]
fn test_writers_of_one_resource_never_share_a_level() {
    let ctx = TestContext::new();
    let mut graph = ctx.graph();
    add_producer(&mut graph, "create");
    add_writer(&mut graph, "first", "create");
    add_reader(&mut graph, "sample", "first");
    add_writer(&mut graph, "second", "first");
    add_writer(&mut graph, "third", "second");
    graph.setup().unwrap();

    let create = graph.pass("create").unwrap().handle();
    let third = graph.pass("third").unwrap().handle();
    assert!(graph.edges().contains(&(create, third)));
    let levels: Vec<usize> = ["create", "first", "second", "third"]
        .iter()
        .map(|name| level_of(&graph, name))
        .collect();
    assert_eq!(levels, vec![0, 1, 3, 4]);
    assert_eq!(level_of(&graph, "sample"), 2);
    assert_schedule_valid(&graph);
}

#[test]
fn test_stale_read_cycle_is_reported() {
    let ctx = TestContext::new();
    let mut graph = ctx.graph();
    add_producer(&mut graph, "create");
    graph
        .add_render_pass("overwrite", |scheduler| {
            let Outputs(texture) = *scheduler.scope_of::<Outputs>("create").unwrap();
            scheduler.write(texture);
            let side = scheduler.create_buffer(storage_buffer(256));
            scheduler.scope_mut().insert(Outputs(side));
            noop()
        })
        .unwrap();
    graph
        .add_render_pass("late", |scheduler| {
            let Outputs(texture) = *scheduler.scope_of::<Outputs>("create").unwrap();
            let Outputs(side) = *scheduler.scope_of::<Outputs>("overwrite").unwrap();
            scheduler.read(side);
            // Reads the contents "overwrite" already replaced.
            scheduler.read(texture);
            noop()
        })
        .unwrap();

    assert!(matches!(
        graph.setup(),
        Err(GraphError::CyclicDependency(_))
    ));
}

#[test]
fn test_duplicate_pass_is_rejected_without_running_setup() {
    let ctx = TestContext::new();
    let mut graph = ctx.graph();
    add_producer(&mut graph, "main");
    let mut ran = false;
    let result = graph.add_render_pass("main", |_| {
        ran = true;
        noop()
    });
    assert_eq!(result, Err(GraphError::DuplicatePassName("main".into())));
    assert!(!ran);
    assert_eq!(graph.pass_count(), 1);
}

// ============================================================================
// Required states
// ============================================================================

#[test]
fn test_level_states_follow_usage() {
    let ctx = TestContext::new();
    let mut graph = ctx.graph();
    graph
        .add_render_pass("depth_prepass", |scheduler| {
            let depth = scheduler.create_texture(depth_target());
            let particles = scheduler.create_buffer(storage_buffer(1024));
            scheduler.scope_mut().insert(Outputs(depth));
            scheduler.scope_mut().insert((depth, particles));
            noop()
        })
        .unwrap();
    graph
        .add_render_pass("forward", |scheduler| {
            let (depth, particles) = *scheduler
                .scope_of::<(cinder_graphics::ResourceHandle, cinder_graphics::ResourceHandle)>(
                    "depth_prepass",
                )
                .unwrap();
            scheduler.read(depth);
            scheduler.read(particles);
            let color = scheduler.create_texture(color_target());
            scheduler.create_render_target(RenderTargetDesc::new().with_color(color));
            noop()
        })
        .unwrap();
    graph.setup().unwrap();

    let first = &graph.levels()[0];
    let second = &graph.levels()[1];
    let (depth, particles) = *graph
        .scope_of::<(cinder_graphics::ResourceHandle, cinder_graphics::ResourceHandle)>(
            "depth_prepass",
        )
        .unwrap()
        .unwrap();

    assert_eq!(
        first.required_state(depth.resource_id()),
        Some(ResourceStates::DEPTH_WRITE)
    );
    assert_eq!(
        first.required_state(particles.resource_id()),
        Some(ResourceStates::UNORDERED_ACCESS)
    );
    // Sampled depth reads as a shader resource.
    assert_eq!(
        second.required_state(depth.resource_id()),
        Some(ResourceStates::ALL_SHADER_RESOURCE)
    );
    assert_eq!(
        second.required_state(particles.resource_id()),
        Some(ResourceStates::ALL_SHADER_RESOURCE)
    );
    // Color target and its render target: only the texture gets a state.
    assert_eq!(second.transitions().len(), 3);
}

// ============================================================================
// Execution
// ============================================================================

#[test]
fn test_execute_resolves_first_use_at_submission() {
    let ctx = TestContext::new();
    let mut graph = ctx.graph();
    add_producer(&mut graph, "p1");
    add_reader(&mut graph, "p2", "p1");
    add_producer(&mut graph, "p3");

    let mut list = ctx.list("frame");
    graph.execute(&mut list).unwrap();
    ctx.queue.execute_command_lists([list], true).unwrap();

    let Outputs(r) = *graph.scope_of::<Outputs>("p1").unwrap().unwrap();
    let Outputs(r2) = *graph.scope_of::<Outputs>("p3").unwrap().unwrap();
    let r = graph.registry().texture(r).clone();
    let r2 = graph.registry().texture(r2).clone();

    let submission = ctx.last_submission();
    let labels: Vec<&str> = submission.iter().map(|list| list.label.as_str()).collect();
    assert_eq!(labels, ["frame barriers", "frame"]);

    // First touches are unknown to the list and resolved against COMMON.
    let barrier_list = &submission[0];
    assert_eq!(barrier_list.transitions().len(), 2);
    assert!(barrier_list.barriers().all(|barrier| matches!(
        barrier,
        BarrierRecord::Transition {
            before: ResourceStates::COMMON,
            after: ResourceStates::RENDER_TARGET,
            ..
        }
    )));

    // Level 1 reads R; the list already knows it is a render target.
    let frame = &submission[1];
    assert_eq!(frame.barrier_call_count(), 1);
    assert_eq!(
        frame.transitions(),
        vec![&BarrierRecord::Transition {
            resource: r.uid(),
            subresource: ALL_SUBRESOURCES,
            before: ResourceStates::RENDER_TARGET,
            after: ResourceStates::ALL_SHADER_RESOURCE,
        }]
    );

    assert_eq!(
        r.global_state().uniform_state(),
        Some(ResourceStates::ALL_SHADER_RESOURCE)
    );
    assert_eq!(
        r2.global_state().uniform_state(),
        Some(ResourceStates::RENDER_TARGET)
    );
}

#[test]
fn test_whole_texture_read_after_mip_write_splits_batches() {
    let ctx = TestContext::new();
    let mut graph = ctx.graph();
    graph
        .add_render_pass("mips", |scheduler| {
            let desc = TextureDescriptor::new_2d(
                256,
                256,
                TextureFormat::Rgba16Float,
                TextureUsage::STORAGE_BINDING | TextureUsage::TEXTURE_BINDING,
            )
            .with_label("pyramid")
            .with_mip_levels(9)
            .with_array_layers(8);
            let pyramid = scheduler.create_texture(RgTextureDesc::absolute(desc));
            scheduler.scope_mut().insert(Outputs(pyramid));
            move |registry: &RenderGraphRegistry, list: &mut CommandListHandle| {
                list.transition_barrier(registry.texture(pyramid), ResourceStates::COPY_DEST, 0);
            }
        })
        .unwrap();
    add_reader(&mut graph, "sample", "mips");

    let mut list = ctx.list("frame");
    graph.execute(&mut list).unwrap();
    ctx.queue.execute_command_lists([list], false).unwrap();

    let submission = ctx.last_submission();
    let frame = submission.last().unwrap();
    // Mip 0 of layer 0 into COPY_DEST, then all 72 subresources into a read state.
    assert_eq!(frame.transitions().len(), 73);
    let calls: Vec<usize> = frame
        .commands
        .iter()
        .map(|DummyCommand::Barriers(barriers)| barriers.len())
        .collect();
    assert_eq!(calls, vec![MAX_BATCHED_BARRIERS, 73 - MAX_BATCHED_BARRIERS]);
}

#[test]
fn test_second_frame_only_transitions_changed_resources() {
    let ctx = TestContext::new();
    let mut graph = ctx.graph();
    add_producer(&mut graph, "p1");
    add_reader(&mut graph, "p2", "p1");
    add_producer(&mut graph, "p3");

    for frame in 0..2 {
        let mut list = ctx.list(&format!("frame {frame}"));
        graph.execute(&mut list).unwrap();
        ctx.queue.execute_command_lists([list], false).unwrap();
    }

    let Outputs(r) = *graph.scope_of::<Outputs>("p1").unwrap().unwrap();
    let r = graph.registry().texture(r).clone();
    let submission = ctx.last_submission();
    assert_eq!(submission.len(), 2);
    assert_eq!(
        submission[0].transitions(),
        vec![&BarrierRecord::Transition {
            resource: r.uid(),
            subresource: ALL_SUBRESOURCES,
            before: ResourceStates::ALL_SHADER_RESOURCE,
            after: ResourceStates::RENDER_TARGET,
        }]
    );
}

#[test]
fn test_resize_realizes_relative_textures_again() {
    let ctx = TestContext::new();
    let mut graph = ctx.graph();
    add_producer(&mut graph, "p1");

    let mut list = ctx.list("frame");
    graph.execute(&mut list).unwrap();
    ctx.queue.execute_command_lists([list], false).unwrap();

    let Outputs(texture) = *graph.scope_of::<Outputs>("p1").unwrap().unwrap();
    let before = graph.registry().texture(texture).uid();

    assert!(graph.set_resolution(640, 360, 1280, 720));
    let mut list = ctx.list("resized");
    graph.execute(&mut list).unwrap();
    ctx.queue.execute_command_lists([list], false).unwrap();

    let resized = graph.registry().texture(texture);
    assert_ne!(resized.uid(), before);
    let size = resized.texture_descriptor().unwrap().size;
    assert_eq!((size.width, size.height), (640, 360));
    // A new resource starts over from COMMON.
    assert_eq!(ctx.last_submission_labels(), ["resized barriers", "resized"]);
}

#[test]
fn test_resize_keeps_old_texture_until_frame_completes() {
    let ctx = TestContext::with_manual_fences();
    let mut graph = ctx.graph();
    add_producer(&mut graph, "p1");

    let mut list = ctx.list("frame");
    graph.execute(&mut list).unwrap();
    let sync = ctx.queue.execute_command_lists([list], false).unwrap();
    graph.track_submission(&sync);

    let Outputs(texture) = *graph.scope_of::<Outputs>("p1").unwrap().unwrap();
    let old = std::sync::Arc::downgrade(graph.registry().texture(texture));
    let views_before = graph.registry().descriptor_counts();

    graph.set_resolution(640, 360, 1280, 720);
    graph.compile().unwrap();
    assert_eq!(graph.registry().retired_count(), 1);
    assert!(old.upgrade().is_some(), "Replaced texture freed while in flight");
    assert_eq!(graph.registry().descriptor_counts().0, views_before.0 * 2);

    ctx.backend
        .complete_fence(ctx.queue.fence().native(), sync.value());
    graph.compile().unwrap();
    assert_eq!(graph.registry().retired_count(), 0);
    assert_eq!(graph.registry().descriptor_counts(), views_before);
    // The frame's command allocators still hold it until they are reused.
    ctx.queue.discard_command_list(ctx.list("next"));
    ctx.queue.discard_command_list(ctx.list("next"));
    assert!(old.upgrade().is_none());
}

#[test]
fn test_export_dot_lists_every_pass_and_edge() {
    let ctx = TestContext::new();
    let mut graph = ctx.graph();
    add_producer(&mut graph, "p1");
    add_reader(&mut graph, "p2", "p1");
    graph.setup().unwrap();

    let dot = graph.export_dot();
    assert!(dot.contains("label=\"p1\""));
    assert!(dot.contains("label=\"p2\""));
    assert!(dot.contains("p0 -> p1;"));
    assert!(dot.contains("cluster_1"));
}
