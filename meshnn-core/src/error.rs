//! Error types for `meshnn`.
//!
//! Every fallible public operation returns [`Result<T>`]. Error codes follow
//! the `MESH-XXX` pattern so a user can point a bug report at a specific
//! variant without quoting the whole message.

use thiserror::Error;

/// Result type alias for `meshnn` operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the index façade and its collaborators.
#[derive(Error, Debug)]
pub enum Error {
    /// `k < 1` was passed to `knn`/`range`, or a filter/param combination is
    /// otherwise nonsensical (MESH-001).
    #[error("[MESH-001] invalid argument: {0}")]
    InvalidArgument(String),

    /// `update`'s `indexes` and `new_labels` slices have different lengths
    /// (MESH-002).
    #[error("[MESH-002] update() received {indexes} indexes but {labels} labels")]
    LengthMismatch {
        /// Length of the `indexes` slice.
        indexes: usize,
        /// Length of the `new_labels` slice.
        labels: usize,
    },

    /// A vector's dimensionality does not match what the distance function
    /// has already validated against (MESH-003).
    #[error("[MESH-003] dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected dimension.
        expected: usize,
        /// Actual dimension.
        actual: usize,
    },

    /// An FFI handle does not name a live index (MESH-004, FFI only).
    #[error("[MESH-004] invalid or freed index handle")]
    InvalidHandle,

    /// `remove`/`remove_batch` called on an index built with
    /// `allow_removals = false` (MESH-005).
    #[error("[MESH-005] removal is not supported: index was built with allow_removals=false")]
    RemovalNotSupported,

    /// A snapshot failed schema validation or violated one of the §3
    /// invariants on load (MESH-006).
    #[error("[MESH-006] corrupt snapshot: {0}")]
    Corrupt(String),

    /// I/O failure while reading or writing a snapshot (MESH-007).
    #[error("[MESH-007] io error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot (de)serialization failure below the schema-validation level
    /// (MESH-008).
    #[error("[MESH-008] serialization error: {0}")]
    Serialization(String),

    /// Configuration could not be loaded or failed validation (MESH-009).
    #[error("[MESH-009] configuration error: {0}")]
    Config(String),

    /// An invariant was violated inside the locking protocol itself, this
    /// always indicates a bug in `meshnn-core`, not misuse by the caller
    /// (MESH-010).
    #[error("[MESH-010] internal error: {0}")]
    Internal(String),
}

impl Error {
    /// The `MESH-XXX` code for this error, without the surrounding brackets.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "MESH-001",
            Self::LengthMismatch { .. } => "MESH-002",
            Self::DimensionMismatch { .. } => "MESH-003",
            Self::InvalidHandle => "MESH-004",
            Self::RemovalNotSupported => "MESH-005",
            Self::Corrupt(_) => "MESH-006",
            Self::Io(_) => "MESH-007",
            Self::Serialization(_) => "MESH-008",
            Self::Config(_) => "MESH-009",
            Self::Internal(_) => "MESH-010",
        }
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
