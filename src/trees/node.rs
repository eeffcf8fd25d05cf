use crate::utilities::BoundingBox;

/// A finished tree node, addressed by its index in [`Tree::nodes`](super::Tree::nodes).
///
/// Interior nodes hold both children's boxes so traversal can test them without touching the
/// children. The root's own box lives on the tree.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Node {
    /// `count` primitives starting at `offset` in the leaf index array.
    Leaf { offset: u32, count: u32 },
    Interior {
        left_aabb: BoundingBox,
        right_aabb: BoundingBox,
        /// Index of the left child. Always greater than this node's index.
        left: u32,
        /// Index of the right child. Always greater than this node's index.
        right: u32,
    },
}

impl Node {
    #[inline(always)]
    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf { .. })
    }

    /// Child indices of an interior node, `None` for a leaf.
    #[inline(always)]
    pub fn children(&self) -> Option<(u32, u32)> {
        match *self {
            Node::Interior { left, right, .. } => Some((left, right)),
            Node::Leaf { .. } => None,
        }
    }
}

/// Location of a slot inside the arena: chunk id plus index within the chunk.
///
/// The final flat index is `base_offset(chunk) + local`, known once all chunks are collected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct ChunkRef {
    pub chunk: u32,
    pub local: u32,
}

/// Node record as written during the build, before chunk-relative references are resolved.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum ArenaNode {
    /// Slot handed out to a parent but not yet filled by its child's build.
    Reserved,
    Leaf {
        first: ChunkRef,
        count: u32,
    },
    Interior {
        left_aabb: BoundingBox,
        right_aabb: BoundingBox,
        left: ChunkRef,
        right: ChunkRef,
    },
}
