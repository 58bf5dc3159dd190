//! Submission-time reconciliation of list-local and queue-global states.

use super::{ALL_SUBRESOURCES, ResourceStates, SubresourceStates};

/// A state change that must be recorded before a command list runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateTransition {
    /// Subresource index, or [`ALL_SUBRESOURCES`].
    pub subresource: u32,
    pub before: ResourceStates,
    pub after: ResourceStates,
}

/// Resolve one pending barrier of a command list against the queue-global state.
///
/// `target` and `subresource` are the request the list recorded when it first
/// touched the resource without knowing its state. `local` is the state the
/// list leaves the resource in after all of its own commands. `global` is the
/// queue-global state before this list runs.
///
/// Returns the transitions to record in the barrier-only list placed ahead of
/// the command list, and the queue-global state after the command list. The
/// new global state takes the list's own final state wherever the list knows
/// it, and falls back to `target` otherwise.
///
/// Unknown global subresources are treated as [`ResourceStates::COMMON`].
pub fn resolve_pending_barrier(
    target: ResourceStates,
    subresource: u32,
    local: &SubresourceStates,
    global: &SubresourceStates,
) -> (Vec<StateTransition>, SubresourceStates) {
    let global_state = |index: u32| {
        global
            .subresource_state(index)
            .unwrap_or(ResourceStates::COMMON)
    };

    let mut transitions = Vec::new();
    let mut new_global = global.clone();

    if subresource == ALL_SUBRESOURCES {
        if global.is_uniform() {
            let before = global.uniform_state().unwrap_or(ResourceStates::COMMON);
            if before != target {
                transitions.push(StateTransition {
                    subresource: ALL_SUBRESOURCES,
                    before,
                    after: target,
                });
            }
        } else {
            for index in 0..global.subresource_count() {
                let before = global_state(index);
                if before != target {
                    transitions.push(StateTransition {
                        subresource: index,
                        before,
                        after: target,
                    });
                }
            }
        }

        if local.is_uniform() {
            new_global.set_subresource_state(
                ALL_SUBRESOURCES,
                local.uniform_state().unwrap_or(target),
            );
        } else {
            for (index, state) in local.iter() {
                new_global.set_subresource_state(index, state.unwrap_or(target));
            }
        }
    } else {
        let before = global_state(subresource);
        if before != target {
            transitions.push(StateTransition {
                subresource,
                before,
                after: target,
            });
        }
        let after_list = local.subresource_state(subresource).unwrap_or(target);
        new_global.set_subresource_state(subresource, after_list);
    }

    (transitions, new_global)
}
