//! Bounding volume hierarchy construction and ray traversal.
//!
//! - `BinnedBuilder`: registers primitive boxes and builds a [`Tree`] with the binned surface
//!   area heuristic, forking large subtrees onto rayon
//! - `Tree`: flat, immutable node array plus the leaf primitive index array
//! - `Tree::trace`: closest-hit and any-hit ray queries through a caller-supplied
//!   [`RayLeafTester`]

mod build_config;
pub use self::build_config::*;

mod build_error;
pub use self::build_error::*;

mod build_stats;
pub use self::build_stats::*;

mod cancellation;
pub use self::cancellation::*;

mod node;
pub use self::node::Node;

mod node_arena;
pub use self::node_arena::{CHUNK_BYTE_BUDGET, LEAF_INDEX_CHUNK_CAPACITY, NODE_CHUNK_CAPACITY};

mod ray;
pub use self::ray::*;

mod split_evaluator;
pub use self::split_evaluator::TRAVERSAL_COST;

mod tree;
pub use self::tree::*;

mod tree_binned_builder;
pub use self::tree_binned_builder::{build_tree, BinnedBuilder};

mod tree_diagnostics;

mod tree_ray_cast;
pub use self::tree_ray_cast::*;

#[cfg(test)]
mod test_support;
