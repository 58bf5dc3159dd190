//! Profiling support via Tracy.
//!
//! Re-exports the CPU profiling macros of [`cinder_core::profiling`]. Enable
//! the `profiling` feature of this crate to turn them on:
//!
//! ```toml
//! [dependencies]
//! cinder-graphics = { version = "0.1", features = ["profiling"] }
//! ```
//!
//! Submissions plot the fence value they signal as `queue_fence_value`.

pub use cinder_core::profiling::*;
