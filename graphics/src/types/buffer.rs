//! Buffer descriptors.

use bitflags::bitflags;

use crate::state::ResourceStates;

bitflags! {
    /// What a buffer may be bound as.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BufferUsage: u32 {
        const VERTEX = 1 << 0;
        const INDEX = 1 << 1;
        const UNIFORM = 1 << 2;
        /// Read and written from shaders as unordered access.
        const STORAGE = 1 << 3;
        const INDIRECT = 1 << 4;
        const COPY_SRC = 1 << 5;
        const COPY_DST = 1 << 6;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct BufferDescriptor {
    pub label: Option<String>,
    /// Size in bytes.
    pub size: u64,
    pub usage: BufferUsage,
}

impl BufferDescriptor {
    pub fn new(size: u64, usage: BufferUsage) -> Self {
        Self {
            label: None,
            size,
            usage,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// State a pass needs to read this buffer.
    pub fn read_state(&self) -> ResourceStates {
        ResourceStates::ALL_SHADER_RESOURCE
    }

    /// State a pass needs to write this buffer.
    pub fn write_state(&self) -> ResourceStates {
        ResourceStates::UNORDERED_ACCESS
    }
}
