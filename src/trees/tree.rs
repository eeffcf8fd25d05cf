use super::build_config::BuildConfig;
use super::build_stats::BuildStats;
use super::node::Node;
use crate::utilities::BoundingBox;

/// A built bounding volume hierarchy over a set of primitives.
///
/// Nodes are stored flat with the root at index 0, and every child index is larger than its
/// parent's. Leaves reference contiguous runs of `leaf_indices`, each of which is the index of a
/// primitive as registered with the builder. Every primitive appears in exactly one leaf.
/// The tree is immutable once built and can be traversed from any number of threads.
#[derive(Clone, Debug)]
pub struct Tree {
    root_aabb: BoundingBox,
    nodes: Vec<Node>,
    leaf_indices: Vec<u32>,
    stats: BuildStats,
    config: BuildConfig,
}

impl Tree {
    pub(crate) fn new(
        root_aabb: BoundingBox,
        nodes: Vec<Node>,
        leaf_indices: Vec<u32>,
        stats: BuildStats,
        config: BuildConfig,
    ) -> Self {
        debug_assert!(!nodes.is_empty(), "a tree always has a root node");
        Self {
            root_aabb,
            nodes,
            leaf_indices,
            stats,
            config,
        }
    }

    /// The tree over no primitives: a single leaf with no objects and an empty root box.
    pub(crate) fn empty(stats: BuildStats, config: BuildConfig) -> Self {
        Self::new(
            BoundingBox::empty(),
            vec![Node::Leaf {
                offset: 0,
                count: 0,
            }],
            Vec::new(),
            stats,
            config,
        )
    }

    /// Bounds of every primitive in the tree.
    #[inline]
    pub fn root_aabb(&self) -> &BoundingBox {
        &self.root_aabb
    }

    #[inline]
    pub fn root(&self) -> &Node {
        &self.nodes[0]
    }

    #[inline]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    #[inline]
    pub fn node(&self, index: u32) -> &Node {
        &self.nodes[index as usize]
    }

    #[inline]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Primitive indices of all leaves, concatenated.
    #[inline]
    pub fn leaf_indices(&self) -> &[u32] {
        &self.leaf_indices
    }

    /// Number of primitives the tree was built over.
    #[inline]
    pub fn primitive_count(&self) -> usize {
        self.leaf_indices.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.leaf_indices.is_empty()
    }

    pub fn stats(&self) -> &BuildStats {
        &self.stats
    }

    /// Configuration the tree was built with. Its depth and leaf size limits hold for every node.
    #[inline]
    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Stack entries a traversal of this tree can need at most.
    #[inline]
    pub fn traversal_stack_depth(&self) -> usize {
        self.stats.max_leaf_depth.max(1) as usize
    }

    /// Primitive indices referenced by a leaf node. Empty for interior nodes.
    #[inline]
    pub fn leaf_primitives(&self, node: &Node) -> &[u32] {
        match *node {
            Node::Leaf { offset, count } => {
                &self.leaf_indices[offset as usize..(offset + count) as usize]
            }
            Node::Interior { .. } => &[],
        }
    }

    /// Iterates over every leaf node with the primitives it holds.
    pub fn leaves(&self) -> impl Iterator<Item = (u32, &[u32])> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.is_leaf())
            .map(move |(index, node)| (index as u32, self.leaf_primitives(node)))
    }
}
