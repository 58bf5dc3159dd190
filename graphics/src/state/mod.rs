//! GPU-visible resource states and per-subresource tracking.
//!
//! Every resource carries a [`SubresourceStates`] describing which usage the
//! GPU last left it in. The same type is used in two places:
//!
//! | Owner | Meaning |
//! |-------|---------|
//! | [`Resource`](crate::resource::Resource) | Queue-global state, authoritative across command lists |
//! | [`ResourceStateTracker`](crate::command::ResourceStateTracker) | Command-list-local state, `None` until first touched |
//!
//! The two are reconciled at submission time by [`resolve_pending_barrier`].

mod resolve;

pub use resolve::{StateTransition, resolve_pending_barrier};

use bitflags::bitflags;

/// Subresource index that addresses every subresource of a resource at once.
pub const ALL_SUBRESOURCES: u32 = u32::MAX;

bitflags! {
    /// GPU usage states a resource can be transitioned between.
    ///
    /// Read states may be combined. Write states are normally exclusive, but
    /// the render graph unions every write capability a resource has when one
    /// level writes it.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ResourceStates: u32 {
        const VERTEX_AND_CONSTANT_BUFFER = 1 << 0;
        const INDEX_BUFFER = 1 << 1;
        const RENDER_TARGET = 1 << 2;
        const UNORDERED_ACCESS = 1 << 3;
        const DEPTH_WRITE = 1 << 4;
        const DEPTH_READ = 1 << 5;
        const NON_PIXEL_SHADER_RESOURCE = 1 << 6;
        const PIXEL_SHADER_RESOURCE = 1 << 7;
        const INDIRECT_ARGUMENT = 1 << 8;
        const COPY_DEST = 1 << 9;
        const COPY_SOURCE = 1 << 10;
        const RAYTRACING_ACCELERATION_STRUCTURE = 1 << 11;
        const PRESENT = 1 << 12;

        /// Readable from any shader stage.
        const ALL_SHADER_RESOURCE =
            Self::NON_PIXEL_SHADER_RESOURCE.bits() | Self::PIXEL_SHADER_RESOURCE.bits();
        /// Every read-only state that may be combined.
        const GENERIC_READ = Self::VERTEX_AND_CONSTANT_BUFFER.bits()
            | Self::INDEX_BUFFER.bits()
            | Self::NON_PIXEL_SHADER_RESOURCE.bits()
            | Self::PIXEL_SHADER_RESOURCE.bits()
            | Self::INDIRECT_ARGUMENT.bits()
            | Self::COPY_SOURCE.bits();
    }
}

impl ResourceStates {
    /// Common state: no pending usage, valid for copies and presentation.
    pub const COMMON: Self = Self::empty();

    /// States that imply the GPU may write the resource.
    pub const WRITE_MASK: Self = Self::RENDER_TARGET
        .union(Self::UNORDERED_ACCESS)
        .union(Self::DEPTH_WRITE)
        .union(Self::COPY_DEST);

    /// Returns true if any write-capable state is set.
    pub fn is_write(self) -> bool {
        self.intersects(Self::WRITE_MASK)
    }

    /// Returns true if the state is non-empty and only contains read states.
    pub fn is_read_only(self) -> bool {
        !self.is_empty() && !self.is_write()
    }
}

impl Default for ResourceStates {
    fn default() -> Self {
        Self::COMMON
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Tracking {
    Uniform(Option<ResourceStates>),
    PerSubresource(Vec<Option<ResourceStates>>),
}

/// State of a resource, either uniform or tracked per subresource.
///
/// A state of `None` means "unknown": nothing has established what the GPU
/// last did with that subresource. Writing a single subresource of a
/// multi-subresource resource switches to per-subresource tracking, which
/// persists until the next [`ALL_SUBRESOURCES`] write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubresourceStates {
    subresource_count: u32,
    tracking: Tracking,
}

impl SubresourceStates {
    /// Create a tracker in a known uniform state.
    pub fn new(subresource_count: u32, state: ResourceStates) -> Self {
        Self {
            subresource_count: subresource_count.max(1),
            tracking: Tracking::Uniform(Some(state)),
        }
    }

    /// Create a tracker whose state is not yet known.
    pub fn unknown(subresource_count: u32) -> Self {
        Self {
            subresource_count: subresource_count.max(1),
            tracking: Tracking::Uniform(None),
        }
    }

    pub fn subresource_count(&self) -> u32 {
        self.subresource_count
    }

    /// Returns true while a single state describes every subresource.
    pub fn is_uniform(&self) -> bool {
        matches!(self.tracking, Tracking::Uniform(_))
    }

    /// The whole-resource state, or `None` when unknown or non-uniform.
    pub fn uniform_state(&self) -> Option<ResourceStates> {
        match &self.tracking {
            Tracking::Uniform(state) => *state,
            Tracking::PerSubresource(_) => None,
        }
    }

    /// State of one subresource. Uniform tracking answers for every index.
    ///
    /// # Panics
    ///
    /// Panics if `subresource` is out of range for a per-subresource tracker.
    pub fn subresource_state(&self, subresource: u32) -> Option<ResourceStates> {
        match &self.tracking {
            Tracking::Uniform(state) => *state,
            Tracking::PerSubresource(states) => states[subresource as usize],
        }
    }

    /// Set the state of one subresource, or of all with [`ALL_SUBRESOURCES`].
    pub fn set_subresource_state(&mut self, subresource: u32, state: ResourceStates) {
        if subresource == ALL_SUBRESOURCES {
            self.tracking = Tracking::Uniform(Some(state));
            return;
        }

        assert!(
            subresource < self.subresource_count,
            "Subresource {subresource} out of range ({} subresources)",
            self.subresource_count
        );

        if self.subresource_count == 1 {
            self.tracking = Tracking::Uniform(Some(state));
            return;
        }

        if let Tracking::Uniform(current) = self.tracking {
            self.tracking = Tracking::PerSubresource(vec![current; self.subresource_count as usize]);
        }
        if let Tracking::PerSubresource(states) = &mut self.tracking {
            states[subresource as usize] = Some(state);
        }
    }

    /// Iterate over `(subresource, state)` for every subresource.
    pub fn iter(&self) -> impl Iterator<Item = (u32, Option<ResourceStates>)> + '_ {
        (0..self.subresource_count).map(|index| (index, self.subresource_state(index)))
    }

    /// Returns true if any subresource has an unknown state.
    pub fn has_unknown(&self) -> bool {
        match &self.tracking {
            Tracking::Uniform(state) => state.is_none(),
            Tracking::PerSubresource(states) => states.iter().any(Option::is_none),
        }
    }
}
