//! Common types and descriptors for graphics resources.
//!
//! This module contains format enums, usage flags, and descriptor structs
//! used throughout the graphics system.

mod buffer;
mod common;
mod texture;
mod view;

pub use buffer::{BufferDescriptor, BufferUsage};
pub use common::{Extent3d, Resolution};
pub use texture::{TextureDescriptor, TextureFormat, TextureUsage};
pub use view::{TextureViewDescriptor, TextureViewKind};
