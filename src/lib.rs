//! Surface area heuristic bounding volume hierarchies over axis-aligned boxes.
//!
//! Build a [`trees::Tree`] with [`trees::BinnedBuilder`], then cast rays through it with
//! [`trees::Tree::closest_hit`] or [`trees::Tree::any_hit`].

pub mod trees;
pub mod utilities;
