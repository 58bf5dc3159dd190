//! Graphics error types.

use thiserror::Error;

/// Errors that can occur while building a render graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// The declared reads and writes form a cycle. Holds a pass on the cycle.
    #[error("render graph contains a cyclic dependency through pass '{0}'")]
    CyclicDependency(String),
    /// A pass with this name was already added to the graph.
    #[error("render pass '{0}' is already registered")]
    DuplicatePassName(String),
    /// No pass with this name exists in the graph.
    #[error("render pass '{0}' does not exist")]
    UnknownPass(String),
}

/// Errors that can occur in the graphics system.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphicsError {
    /// Failed to initialize a backend object.
    #[error("initialization failed: {0}")]
    InitializationFailed(String),
    /// Failed to create a resource.
    #[error("resource creation failed: {0}")]
    ResourceCreationFailed(String),
    /// Out of GPU memory.
    #[error("out of GPU memory")]
    OutOfMemory,
    /// The GPU device was lost.
    #[error("GPU device lost")]
    DeviceLost,
    /// An invalid parameter was provided.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    /// A queue submission was rejected by the driver.
    #[error("submission failed: {0}")]
    SubmissionFailed(String),
    /// Render graph construction failed.
    #[error(transparent)]
    Graph(#[from] GraphError),
    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}
