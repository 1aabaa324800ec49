use thiserror::Error;

/// Result alias for `canopy`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by clustering, storage and labeling primitives.
///
/// Pipeline entry points only surface [`Error::CapacityExceeded`] and I/O
/// failures in practice; degenerate batches are handled locally.
#[derive(Debug, Error)]
pub enum Error {
    /// Input was empty.
    #[error("empty input provided")]
    EmptyInput,

    /// Vector dimension mismatch.
    #[error("dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch {
        /// Expected dimension.
        expected: usize,
        /// Found dimension.
        found: usize,
    },

    /// Invalid number of clusters requested.
    #[error("cannot create {requested} clusters from {n_items} items")]
    InvalidClusterCount {
        /// Requested count.
        requested: usize,
        /// Number of items.
        n_items: usize,
    },

    /// Invalid parameter value.
    #[error("invalid parameter '{name}': {message}")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Error message.
        message: &'static str,
    },

    /// The vector store would grow past its configured capacity.
    ///
    /// Fatal: truncating would misalign term order and vector order.
    #[error("vector store capacity exceeded: requested {requested} slots, capacity {capacity}")]
    CapacityExceeded {
        /// Total slots the store would need.
        requested: usize,
        /// Configured capacity.
        capacity: usize,
    },

    /// A write targeted an index that was never reserved.
    #[error("index {index} is not reserved (store length {len})")]
    UnreservedIndex {
        /// Offending index.
        index: usize,
        /// Current store length.
        len: usize,
    },

    /// A persisted vector file failed validation.
    #[error("corrupt vector store: {0}")]
    CorruptStore(String),

    /// Filesystem failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failure.
    #[error(transparent)]
    Serde(#[from] serde_json::Error),

    /// Generic error with message.
    #[error("{0}")]
    Other(String),
}
