//! # Cinder Core
//!
//! Engine-agnostic utilities shared by the Cinder crates:
//!
//! - [`pool`] - recycling pools for per-submission scratch state
//! - [`index_pool`] - mutex-guarded index allocation for descriptor slots
//! - [`scope`] - typed heterogeneous storage for pass-local data
//! - [`profiling`] - optional Tracy instrumentation

pub mod index_pool;
pub mod pool;
pub mod profiling;
pub mod scope;

/// Core library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
