//! GPU synchronization primitives.
//!
//! A [`Fence`] is a monotonically increasing 64-bit counter. Queues advance it
//! by signaling new values once their submitted work completes; the host
//! polls or blocks on it. A [`SyncHandle`] pairs a fence with one target
//! value and answers "has this particular submission finished?".
//!
//! # States
//!
//! | State | Meaning |
//! |-------|---------|
//! | [`SyncStatus::Invalid`] | No fence bound; there is nothing to wait for |
//! | [`SyncStatus::Pending`] | Bound, the fence has not reached the target yet |
//! | [`SyncStatus::Complete`] | The fence's completed value is at least the target |
//!
//! Transitions happen only through queue signals and host polling or waits.
//! There is no cancellation and no timeout.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::backend::{GpuBackend, GpuFence};
use crate::error::GraphicsError;

/// Status of a [`SyncHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// No fence is bound.
    Invalid,
    /// The GPU has not reached the target value yet.
    Pending,
    /// The GPU has reached the target value.
    Complete,
}

/// CPU-GPU synchronization counter.
pub struct Fence {
    label: String,
    backend: Arc<dyn GpuBackend>,
    native: GpuFence,
    /// Last value handed out by [`Fence::signal_next`].
    last_signaled: AtomicU64,
    /// Highest completed value observed so far.
    completed: AtomicU64,
}

impl Fence {
    pub(crate) fn new(
        backend: Arc<dyn GpuBackend>,
        label: impl Into<String>,
    ) -> Result<Self, GraphicsError> {
        let native = backend.create_fence(0)?;
        Ok(Self {
            label: label.into(),
            backend,
            native,
            last_signaled: AtomicU64::new(0),
            completed: AtomicU64::new(0),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn native(&self) -> &GpuFence {
        &self.native
    }

    /// Reserve the next value to signal. Strictly increasing per fence.
    pub(crate) fn signal_next(&self) -> u64 {
        self.last_signaled.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Last value reserved for a signal.
    pub fn last_signaled_value(&self) -> u64 {
        self.last_signaled.load(Ordering::Acquire)
    }

    /// Query the device for the completed value and cache it.
    pub fn try_completed_value(&self) -> Result<u64, GraphicsError> {
        let value = self.backend.fence_completed_value(&self.native)?;
        let previous = self.completed.fetch_max(value, Ordering::AcqRel);
        Ok(previous.max(value))
    }

    /// Highest completed value, falling back to the cached one if the query fails.
    pub fn completed_value(&self) -> u64 {
        match self.try_completed_value() {
            Ok(value) => value,
            Err(err) => {
                log::error!("Fence '{}': completion query failed: {err}", self.label);
                self.completed.load(Ordering::Acquire)
            }
        }
    }

    /// Check whether the GPU has completed `value`.
    ///
    /// Only queries the device when the cached value is not high enough, so
    /// once this returns `true` for a value it keeps returning `true`.
    pub fn is_complete(&self, value: u64) -> bool {
        if value <= self.completed.load(Ordering::Acquire) {
            return true;
        }
        self.completed_value() >= value
    }

    /// Block the calling thread until the fence reaches `value`.
    pub fn host_wait(&self, value: u64) -> Result<(), GraphicsError> {
        if self.is_complete(value) {
            return Ok(());
        }
        log::trace!("Fence '{}': host waiting for value {value}", self.label);
        self.backend.wait_fence(&self.native, value)?;
        self.completed.fetch_max(value, Ordering::AcqRel);
        Ok(())
    }
}

impl fmt::Debug for Fence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fence")
            .field("label", &self.label)
            .field("last_signaled", &self.last_signaled.load(Ordering::Relaxed))
            .field("completed", &self.completed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// A fence paired with the value that marks one submission as finished.
///
/// The default handle is invalid and counts as already complete wherever
/// completion gates reuse.
#[derive(Debug, Clone, Default)]
pub struct SyncHandle {
    fence: Option<Arc<Fence>>,
    value: u64,
}

impl SyncHandle {
    pub fn new(fence: Arc<Fence>, value: u64) -> Self {
        Self {
            fence: Some(fence),
            value,
        }
    }

    /// A handle with no fence.
    pub fn invalid() -> Self {
        Self::default()
    }

    pub fn is_valid(&self) -> bool {
        self.fence.is_some()
    }

    pub fn fence(&self) -> Option<&Arc<Fence>> {
        self.fence.as_ref()
    }

    pub fn value(&self) -> u64 {
        self.value
    }

    pub fn status(&self) -> SyncStatus {
        match &self.fence {
            None => SyncStatus::Invalid,
            Some(fence) if fence.is_complete(self.value) => SyncStatus::Complete,
            Some(_) => SyncStatus::Pending,
        }
    }

    /// Returns true once the fence has reached the target value.
    ///
    /// Invalid handles are never complete; see [`SyncHandle::is_settled`].
    pub fn is_complete(&self) -> bool {
        self.status() == SyncStatus::Complete
    }

    /// Returns true if there is no outstanding GPU work behind this handle.
    pub fn is_settled(&self) -> bool {
        self.status() != SyncStatus::Pending
    }

    /// Block the calling thread until the target value is reached.
    ///
    /// Returns immediately for an invalid handle.
    pub fn wait_for_completion(&self) -> Result<(), GraphicsError> {
        match &self.fence {
            Some(fence) => fence.host_wait(self.value),
            None => Ok(()),
        }
    }
}
