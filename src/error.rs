//! Error types for ndspc.

use thiserror::Error;

/// ndspc error types.
///
/// The memory errors are fatal for the forward pass that raised them. The
/// training loop does not catch them: a run with an under-populated memory
/// crashes loudly instead of silently degrading the supervised signal.
#[derive(Error, Debug)]
pub enum NdspcError {
    /// No prototype batches have ever been added to the memory
    #[error("prototype memory is empty: no batches added before lookup")]
    MemoryEmpty,

    /// Index holds fewer vectors than the configured minimum
    #[error("memory not ready: {found} prototypes indexed, need at least {needed}")]
    MemoryNotReady { found: usize, needed: usize },

    /// Nearest-neighbor position fell outside the first prototype batch
    #[error("invalid neighbor index {index}: first prototype batch has {len} rows")]
    InvalidNeighborIndex { index: usize, len: usize },

    /// Invalid vector dimensions
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// Result type alias for ndspc operations.
pub type Result<T> = std::result::Result<T, NdspcError>;
