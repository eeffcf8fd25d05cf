//! Error types returned by [`BinnedBuilder::build`](super::BinnedBuilder::build).

use thiserror::Error;

/// Reasons a build can fail without it being a defect in the builder.
///
/// Internal invariant violations (a child box escaping its parent, non-monotonic child indices,
/// arena overruns) are not represented here; they panic.
#[derive(Error, Debug)]
pub enum BuildError {
    /// The caller's cancellation callback asked the build to stop.
    #[error("build cancelled")]
    Cancelled,

    /// The registered primitive boxes are unusable.
    #[error("invalid input: {0}")]
    InvalidInput(#[from] InvalidInputKind),

    /// The build configuration is inconsistent.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the configuration error.
        message: String,
    },

    /// More primitives than leaves of `max_objects_per_leaf` can hold within `max_depth` levels.
    #[error(
        "depth limit exceeded: {count} objects do not fit in leaves of \
         {max_objects_per_leaf} within depth {depth}"
    )]
    DepthLimitExceeded {
        /// Configured maximum depth.
        depth: u32,
        /// Number of primitives registered.
        count: usize,
        /// Configured leaf capacity.
        max_objects_per_leaf: usize,
    },

    /// A dedicated worker pool for the build could not be created.
    #[error("failed to create build thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Details of an [`BuildError::InvalidInput`] rejection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidInputKind {
    /// The number of supplied boxes differs from the number the builder was created for.
    #[error("expected {expected} object AABBs, got {got}")]
    ObjectCountMismatch {
        /// Object count the builder was created with.
        expected: usize,
        /// Number of boxes actually supplied.
        got: usize,
    },

    /// Incremental registration never set this object's box.
    #[error("object {index} has no AABB set")]
    UnsetObject {
        /// Index of the missing object.
        index: usize,
    },

    /// An object's box has a NaN or infinite bound.
    #[error("object {index} has a non-finite AABB")]
    NonFiniteBounds {
        /// Index of the offending object.
        index: usize,
    },

    /// An object's box has `min > max` on some axis.
    #[error("object {index} has min > max")]
    InvertedBounds {
        /// Index of the offending object.
        index: usize,
    },

    /// Primitive indices are stored as `u32`.
    #[error("{count} objects do not fit in 32-bit primitive indices")]
    TooManyObjects {
        /// Number of objects registered.
        count: usize,
    },
}
