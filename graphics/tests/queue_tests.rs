//! Command queue and synchronization integration tests.
//!
//! ```bash
//! cargo test --test queue_tests
//! ```

mod common;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rstest::rstest;

use cinder_graphics::backend::dummy::{BarrierRecord, QueueOperation};
use cinder_graphics::backend::{GpuFence, GpuQueue};
use cinder_graphics::state::resolve_pending_barrier;
use cinder_graphics::{
    ALL_SUBRESOURCES, CommandQueueDescriptor, GraphicsError, QueueKind, Resource,
    ResourceStates, SubresourceStates, SyncStatus, TextureDescriptor, TextureFormat,
    TextureUsage,
};

use common::TestContext;

fn texture(ctx: &TestContext, mips: u32, initial: ResourceStates) -> Arc<Resource> {
    let descriptor = TextureDescriptor::new_2d(
        256,
        256,
        TextureFormat::Rgba8Unorm,
        TextureUsage::TEXTURE_BINDING | TextureUsage::RENDER_ATTACHMENT,
    )
    .with_mip_levels(mips)
    .with_label("test texture");
    ctx.device
        .create_texture(&descriptor, initial)
        .expect("Failed to create texture")
}

fn queue_id(queue: &GpuQueue) -> u64 {
    let GpuQueue::Dummy { id, .. } = queue else {
        panic!("Not a dummy queue");
    };
    *id
}

fn fence_id(fence: &GpuFence) -> u64 {
    let GpuFence::Dummy(fence) = fence else {
        panic!("Not a dummy fence");
    };
    fence.id()
}

// ============================================================================
// Submission-time resolution
// ============================================================================

/// A first use gets a barrier list only when the global state differs.
#[rstest]
#[case::from_common(ResourceStates::COMMON, &["work barriers", "work"])]
#[case::already_there(ResourceStates::RENDER_TARGET, &["work"])]
fn test_first_use_barrier_list(#[case] initial: ResourceStates, #[case] expected: &[&str]) {
    let ctx = TestContext::new();
    let texture = texture(&ctx, 1, initial);

    let mut list = ctx.list("work");
    list.transition_barrier(&texture, ResourceStates::RENDER_TARGET, ALL_SUBRESOURCES);
    assert_eq!(list.pending_barriers().len(), 1);
    assert_eq!(list.batched_barrier_count(), 0);
    ctx.queue.execute_command_lists([list], false).unwrap();

    assert_eq!(ctx.last_submission_labels(), expected);
    assert_eq!(
        texture.global_state().uniform_state(),
        Some(ResourceStates::RENDER_TARGET)
    );
}

#[test]
fn test_barrier_list_carries_the_resolved_transition() {
    let ctx = TestContext::new();
    let texture = texture(&ctx, 1, ResourceStates::COMMON);

    let mut list = ctx.list("work");
    list.transition_barrier(&texture, ResourceStates::RENDER_TARGET, ALL_SUBRESOURCES);
    list.transition_barrier(&texture, ResourceStates::PIXEL_SHADER_RESOURCE, ALL_SUBRESOURCES);
    ctx.queue.execute_command_lists([list], false).unwrap();

    let submission = ctx.last_submission();
    assert_eq!(
        submission[0].transitions(),
        vec![&BarrierRecord::Transition {
            resource: texture.uid(),
            subresource: ALL_SUBRESOURCES,
            before: ResourceStates::COMMON,
            after: ResourceStates::RENDER_TARGET,
        }]
    );
    // The second transition is known to the list and recorded in place.
    assert_eq!(
        submission[1].transitions(),
        vec![&BarrierRecord::Transition {
            resource: texture.uid(),
            subresource: ALL_SUBRESOURCES,
            before: ResourceStates::RENDER_TARGET,
            after: ResourceStates::PIXEL_SHADER_RESOURCE,
        }]
    );
    assert_eq!(
        texture.global_state().uniform_state(),
        Some(ResourceStates::PIXEL_SHADER_RESOURCE)
    );
}

#[test]
fn test_lists_in_one_submission_see_each_others_states() {
    let ctx = TestContext::new();
    let texture = texture(&ctx, 1, ResourceStates::COMMON);

    let mut first = ctx.list("first");
    first.transition_barrier(&texture, ResourceStates::RENDER_TARGET, ALL_SUBRESOURCES);
    let mut second = ctx.list("second");
    second.transition_barrier(&texture, ResourceStates::RENDER_TARGET, ALL_SUBRESOURCES);
    ctx.queue.execute_command_lists([first, second], false).unwrap();

    // The second list finds the resource already where it needs it.
    assert_eq!(
        ctx.last_submission_labels(),
        ["first barriers", "first", "second"]
    );
}

#[test]
fn test_repeated_transition_adds_no_barrier() {
    let ctx = TestContext::new();
    let texture = texture(&ctx, 1, ResourceStates::COMMON);

    let mut list = ctx.list("work");
    list.transition_barrier(&texture, ResourceStates::COPY_DEST, ALL_SUBRESOURCES);
    list.transition_barrier(&texture, ResourceStates::PIXEL_SHADER_RESOURCE, ALL_SUBRESOURCES);
    assert_eq!(list.batched_barrier_count(), 1);
    list.transition_barrier(&texture, ResourceStates::PIXEL_SHADER_RESOURCE, ALL_SUBRESOURCES);
    assert_eq!(list.batched_barrier_count(), 1);
    assert_eq!(list.pending_barriers().len(), 1);
}

#[test]
fn test_per_mip_then_whole_resource_ends_uniform() {
    let ctx = TestContext::new();
    let texture = texture(&ctx, 4, ResourceStates::COMMON);

    let mut list = ctx.list("mips");
    list.transition_barrier(&texture, ResourceStates::COPY_DEST, 0);
    list.transition_barrier(&texture, ResourceStates::COPY_DEST, 1);
    list.transition_barrier(&texture, ResourceStates::PIXEL_SHADER_RESOURCE, 1);
    list.transition_barrier(
        &texture,
        ResourceStates::PIXEL_SHADER_RESOURCE,
        ALL_SUBRESOURCES,
    );
    ctx.queue.execute_command_lists([list], false).unwrap();

    let global = texture.global_state();
    assert_eq!(global.subresource_count(), 4);
    for (_, state) in global.iter() {
        assert_eq!(state, Some(ResourceStates::PIXEL_SHADER_RESOURCE));
    }

    // Subresource 0 left COPY_DEST inside the list; 1 was already read-only.
    let submission = ctx.last_submission();
    let in_list = submission.last().unwrap().transitions();
    assert!(in_list.contains(&&BarrierRecord::Transition {
        resource: texture.uid(),
        subresource: 0,
        before: ResourceStates::COPY_DEST,
        after: ResourceStates::PIXEL_SHADER_RESOURCE,
    }));
}

#[test]
fn test_resolve_pending_barrier_on_split_global_state() {
    let mut global = SubresourceStates::new(3, ResourceStates::COMMON);
    global.set_subresource_state(1, ResourceStates::PIXEL_SHADER_RESOURCE);
    let local = SubresourceStates::new(3, ResourceStates::PIXEL_SHADER_RESOURCE);

    let (transitions, new_global) = resolve_pending_barrier(
        ResourceStates::PIXEL_SHADER_RESOURCE,
        ALL_SUBRESOURCES,
        &local,
        &global,
    );

    let touched: Vec<u32> = transitions.iter().map(|t| t.subresource).collect();
    assert_eq!(touched, vec![0, 2]);
    assert_eq!(
        new_global.uniform_state(),
        Some(ResourceStates::PIXEL_SHADER_RESOURCE)
    );
}

// ============================================================================
// Fences
// ============================================================================

#[test]
fn test_fence_values_strictly_increase() {
    let ctx = TestContext::new();
    let mut previous = 0;
    for index in 0..5 {
        let list = ctx.list(&format!("list {index}"));
        let sync = ctx.queue.execute_command_lists([list], false).unwrap();
        assert!(sync.value() > previous);
        previous = sync.value();
    }
    let signal = ctx.queue.signal().unwrap();
    assert_eq!(signal.value(), previous + 1);
    assert_eq!(ctx.queue.completed_value(), signal.value());
}

#[test]
fn test_host_wait_unblocks_when_gpu_completes() {
    let ctx = TestContext::with_manual_fences();
    let list = ctx.list("slow");
    let sync = ctx.queue.execute_command_lists([list], false).unwrap();
    assert_eq!(sync.status(), SyncStatus::Pending);
    assert!(!sync.is_settled());

    let backend = ctx.backend.clone();
    let fence = ctx.queue.fence().clone();
    let target = sync.value();
    let gpu = thread::spawn(move || {
        for value in 1..=target {
            thread::sleep(Duration::from_millis(10));
            backend.complete_fence(fence.native(), value);
        }
    });

    sync.wait_for_completion().unwrap();
    assert!(ctx.queue.completed_value() >= target);
    assert_eq!(sync.status(), SyncStatus::Complete);
    gpu.join().unwrap();
}

#[test]
fn test_completed_value_never_moves_backwards() {
    let ctx = TestContext::with_manual_fences();
    ctx.queue.signal().unwrap();
    ctx.queue.signal().unwrap();

    let native = ctx.queue.fence().native();
    ctx.backend.complete_fence(native, 2);
    assert_eq!(ctx.queue.completed_value(), 2);
    ctx.backend.complete_fence(native, 1);
    assert_eq!(ctx.queue.completed_value(), 2);
}

#[test]
fn test_allocator_reused_only_after_completion() {
    let ctx = TestContext::with_manual_fences();
    let first = ctx
        .queue
        .execute_command_lists([ctx.list("first")], false)
        .unwrap();
    let second = ctx
        .queue
        .execute_command_lists([ctx.list("second")], false)
        .unwrap();
    assert_eq!(ctx.queue.allocator_count(), 2);

    ctx.backend
        .complete_fence(ctx.queue.fence().native(), second.value());
    assert!(first.is_complete());
    ctx.queue
        .execute_command_lists([ctx.list("third")], false)
        .unwrap();

    let allocators: Vec<u64> = ctx
        .backend
        .submissions()
        .iter()
        .map(|lists| lists[0].allocator)
        .collect();
    assert_ne!(allocators[0], allocators[1], "In-flight allocator was reused");
    assert_eq!(allocators[2], allocators[0]);
    assert_eq!(ctx.queue.allocator_count(), 2);

    ctx.backend.complete_fence(
        ctx.queue.fence().native(),
        ctx.queue.fence().last_signaled_value(),
    );
}

// ============================================================================
// Lifetimes
// ============================================================================

#[test]
fn test_resource_outlives_in_flight_submission() {
    let ctx = TestContext::with_manual_fences();
    let buffer = ctx
        .device
        .create_buffer(&common::storage_buffer(1024), ResourceStates::COMMON)
        .unwrap();
    let weak = Arc::downgrade(&buffer);

    let mut list = ctx.list("simulate");
    list.transition_barrier(&buffer, ResourceStates::UNORDERED_ACCESS, ALL_SUBRESOURCES);
    let sync = ctx.queue.execute_command_lists([list], false).unwrap();
    drop(buffer);

    assert!(!sync.is_complete());
    assert!(weak.upgrade().is_some(), "Resource freed while its submission is in flight");

    ctx.backend
        .complete_fence(ctx.queue.fence().native(), sync.value());
    // Reusing both allocators of the submission lets the resource go.
    ctx.queue.discard_command_list(ctx.list("next"));
    ctx.queue.discard_command_list(ctx.list("next"));
    assert!(weak.upgrade().is_none());
}

#[test]
fn test_queue_drop_blocks_until_gpu_completes() {
    let ctx = TestContext::with_manual_fences();
    let sync = ctx
        .queue
        .execute_command_lists([ctx.list("slow")], false)
        .unwrap();

    let TestContext { backend, queue, .. } = ctx;
    let fence = queue.fence().clone();
    let gpu = {
        let backend = backend.clone();
        let fence = fence.clone();
        let value = sync.value();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            backend.complete_fence(fence.native(), value);
        })
    };

    drop(queue);
    assert!(sync.is_complete(), "Queue dropped before its work completed");
    gpu.join().unwrap();
}

#[test]
fn test_cross_queue_wait_is_recorded() {
    let ctx = TestContext::new();
    let compute = ctx
        .device
        .create_queue(&CommandQueueDescriptor::new(QueueKind::Compute).with_label("async"))
        .unwrap();

    let list = compute.request_command_list("simulate").unwrap();
    let sync = compute.execute_command_lists([list], false).unwrap();
    ctx.queue.wait(&compute).unwrap();

    let expected = QueueOperation::Wait {
        queue: queue_id(ctx.queue.native()),
        fence: fence_id(compute.fence().native()),
        value: sync.value(),
    };
    assert!(ctx.backend.operations().contains(&expected));
}

#[test]
fn test_wait_on_unsignaled_queue_is_skipped() {
    let ctx = TestContext::new();
    let copy = ctx
        .device
        .create_queue(&CommandQueueDescriptor::new(QueueKind::Copy))
        .unwrap();
    ctx.queue.wait(&copy).unwrap();
    assert!(
        !ctx.backend
            .operations()
            .iter()
            .any(|op| matches!(op, QueueOperation::Wait { .. }))
    );
}

#[test]
fn test_device_lost_fails_submission() {
    let ctx = TestContext::new();
    let texture = texture(&ctx, 1, ResourceStates::COMMON);
    let mut list = ctx.list("doomed");
    list.transition_barrier(&texture, ResourceStates::RENDER_TARGET, ALL_SUBRESOURCES);
    ctx.backend.lose_device();
    assert_eq!(
        ctx.queue.execute_command_lists([list], false).unwrap_err(),
        GraphicsError::DeviceLost
    );
    assert_eq!(
        texture.global_state().uniform_state(),
        Some(ResourceStates::COMMON)
    );
    assert!(ctx.backend.submissions().is_empty());
}

#[test]
fn test_concurrent_submissions_get_distinct_values() {
    let ctx = Arc::new(TestContext::new());
    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let ctx = ctx.clone();
            thread::spawn(move || {
                (0..8)
                    .map(|index| {
                        let list = ctx.list(&format!("worker {worker} list {index}"));
                        ctx.queue
                            .execute_command_lists([list], false)
                            .unwrap()
                            .value()
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut values: Vec<u64> = handles
        .into_iter()
        .flat_map(|handle| handle.join().unwrap())
        .collect();
    values.sort_unstable();
    assert_eq!(values, (1..=32).collect::<Vec<_>>());
}
