//! Tracy instrumentation.
//!
//! With the `profiling` feature the macros below open Tracy spans and plots;
//! without it they expand to nothing, apart from evaluating plotted values.
//!
//! ```ignore
//! fn submit(lists: &[CommandList]) {
//!     cinder_core::profile_scope!("submit");
//!     cinder_core::profile_plot!("lists_per_submit", lists.len());
//! }
//! ```

#[cfg(feature = "profiling")]
pub use tracy_client::{plot as tracy_plot, span as tracy_span};

#[cfg(feature = "profiling")]
mod enabled {
    /// Open a span that closes at the end of the enclosing scope.
    #[macro_export]
    macro_rules! profile_scope {
        ($name:expr) => {
            let _profile_span = $crate::profiling::tracy_span!($name);
        };
    }

    /// Add a sample to a named plot.
    #[macro_export]
    macro_rules! profile_plot {
        ($name:expr, $value:expr) => {
            $crate::profiling::tracy_plot!($name, $value as f64)
        };
    }
}

#[cfg(not(feature = "profiling"))]
mod disabled {
    #[macro_export]
    macro_rules! profile_scope {
        ($name:expr) => {};
    }

    #[macro_export]
    macro_rules! profile_plot {
        ($name:expr, $value:expr) => {
            let _ = $value;
        };
    }
}

pub use crate::{profile_plot, profile_scope};
