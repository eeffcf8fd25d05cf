use std::collections::BTreeMap;
use std::mem::size_of;
use std::sync::{Mutex, PoisonError};

use crossbeam_utils::CachePadded;

use super::node::{ArenaNode, ChunkRef, Node};

/// Byte budget of one arena chunk.
pub const CHUNK_BYTE_BUDGET: usize = 1 << 16;

/// Node slots per node chunk.
pub const NODE_CHUNK_CAPACITY: usize = CHUNK_BYTE_BUDGET / size_of::<ArenaNode>() - 1;

/// Object indices per leaf index chunk. A leaf's indices never straddle two chunks, so no leaf may
/// hold more objects than this.
pub const LEAF_INDEX_CHUNK_CAPACITY: usize = CHUNK_BYTE_BUDGET / size_of::<u32>() - 16;

/// Fixed-capacity block of node slots, owned by exactly one build task at a time.
#[derive(Debug)]
pub(crate) struct NodeChunk {
    id: u32,
    nodes: Vec<ArenaNode>,
}

impl NodeChunk {
    #[inline(always)]
    fn free_slots(&self) -> usize {
        NODE_CHUNK_CAPACITY - self.nodes.len()
    }

    fn reserve(&mut self) -> ChunkRef {
        assert!(
            self.nodes.len() < NODE_CHUNK_CAPACITY,
            "node chunk {} overflowed its capacity of {}",
            self.id,
            NODE_CHUNK_CAPACITY
        );
        let local = self.nodes.len() as u32;
        self.nodes.push(ArenaNode::Reserved);
        ChunkRef {
            chunk: self.id,
            local,
        }
    }

    fn fill(&mut self, local: u32, node: ArenaNode) {
        let slot = &mut self.nodes[local as usize];
        debug_assert!(
            *slot == ArenaNode::Reserved,
            "slot {} of node chunk {} was written twice",
            local,
            self.id
        );
        *slot = node;
    }
}

/// Fixed-capacity block of object indices referenced by leaves.
#[derive(Debug)]
pub(crate) struct LeafIndexChunk {
    id: u32,
    indices: Vec<u32>,
}

impl LeafIndexChunk {
    #[inline(always)]
    fn free_slots(&self) -> usize {
        LEAF_INDEX_CHUNK_CAPACITY - self.indices.len()
    }
}

#[derive(Debug, Default)]
struct ChunkCounters {
    node_chunks: u32,
    leaf_chunks: u32,
}

/// Hands out arena chunks to build tasks.
///
/// Chunk ids are assigned in allocation order under a single lock. That lock is the only point
/// where build tasks synchronize, and it is only taken when a task's current chunk fills up.
/// Once assembled, chunks are laid out by id, so anything reserved after a slot ends up at a
/// larger final index than that slot.
#[derive(Debug, Default)]
pub(crate) struct ChunkedNodeArena {
    counters: CachePadded<Mutex<ChunkCounters>>,
}

impl ChunkedNodeArena {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_node_chunk(&self) -> NodeChunk {
        let id = {
            // The counters stay consistent even if a panicking task poisoned the lock.
            let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
            let id = counters.node_chunks;
            counters.node_chunks += 1;
            id
        };
        NodeChunk {
            id,
            nodes: Vec::with_capacity(NODE_CHUNK_CAPACITY),
        }
    }

    fn allocate_leaf_chunk(&self) -> LeafIndexChunk {
        let id = {
            let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
            let id = counters.leaf_chunks;
            counters.leaf_chunks += 1;
            id
        };
        LeafIndexChunk {
            id,
            indices: Vec::with_capacity(LEAF_INDEX_CHUNK_CAPACITY),
        }
    }

    /// Number of node and leaf index chunks handed out so far.
    pub fn chunk_counts(&self) -> (u32, u32) {
        let counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        (counters.node_chunks, counters.leaf_chunks)
    }
}

/// The chunks owned by one build task.
///
/// A task appends to its current chunks and retires them when full. Chunks of a joined sibling
/// task are moved in with [`TaskChunks::absorb`]. Dropping this releases every chunk it owns.
#[derive(Debug, Default)]
pub(crate) struct TaskChunks {
    current_nodes: Option<NodeChunk>,
    retired_nodes: BTreeMap<u32, NodeChunk>,
    current_leaves: Option<LeafIndexChunk>,
    retired_leaves: BTreeMap<u32, LeafIndexChunk>,
}

impl TaskChunks {
    /// Makes sure the current node chunk has at least `slots` free slots, rolling over if needed.
    fn node_chunk_with_room(&mut self, arena: &ChunkedNodeArena, slots: usize) -> &mut NodeChunk {
        if self
            .current_nodes
            .as_ref()
            .map_or(true, |chunk| chunk.free_slots() < slots)
        {
            if let Some(full) = self.current_nodes.take() {
                self.retired_nodes.insert(full.id, full);
            }
            self.current_nodes = Some(arena.allocate_node_chunk());
        }
        self.current_nodes.get_or_insert_with(|| arena.allocate_node_chunk())
    }

    /// Reserves a single node slot. Used for the root.
    pub fn reserve_node(&mut self, arena: &ChunkedNodeArena) -> ChunkRef {
        self.node_chunk_with_room(arena, 1).reserve()
    }

    /// Reserves the slots of two siblings in the same chunk.
    pub fn reserve_node_pair(&mut self, arena: &ChunkedNodeArena) -> (ChunkRef, ChunkRef) {
        let chunk = self.node_chunk_with_room(arena, 2);
        let left = chunk.reserve();
        let right = chunk.reserve();
        (left, right)
    }

    /// Writes a finished record into a slot previously reserved by this task or by a task it
    /// has absorbed.
    pub fn fill_node(&mut self, slot: ChunkRef, node: ArenaNode) {
        let chunk = match self.current_nodes.as_mut() {
            Some(current) if current.id == slot.chunk => current,
            _ => self
                .retired_nodes
                .get_mut(&slot.chunk)
                .unwrap_or_else(|| panic!("node chunk {} is not owned by this task", slot.chunk)),
        };
        chunk.fill(slot.local, node);
    }

    /// Stores a leaf's object indices contiguously and returns the location of the first one.
    pub fn append_leaf_indices<I>(&mut self, arena: &ChunkedNodeArena, indices: I) -> ChunkRef
    where
        I: ExactSizeIterator<Item = u32>,
    {
        let count = indices.len();
        assert!(
            count <= LEAF_INDEX_CHUNK_CAPACITY,
            "leaf of {} objects exceeds the leaf chunk capacity of {}",
            count,
            LEAF_INDEX_CHUNK_CAPACITY
        );
        if self
            .current_leaves
            .as_ref()
            .map_or(true, |chunk| chunk.free_slots() < count)
        {
            if let Some(full) = self.current_leaves.take() {
                self.retired_leaves.insert(full.id, full);
            }
            self.current_leaves = Some(arena.allocate_leaf_chunk());
        }
        let chunk = self
            .current_leaves
            .get_or_insert_with(|| arena.allocate_leaf_chunk());
        let first = ChunkRef {
            chunk: chunk.id,
            local: chunk.indices.len() as u32,
        };
        chunk.indices.extend(indices);
        first
    }

    /// Takes ownership of every chunk held by a joined sibling task.
    pub fn absorb(&mut self, other: TaskChunks) {
        let TaskChunks {
            current_nodes,
            retired_nodes,
            current_leaves,
            retired_leaves,
        } = other;
        self.retired_nodes.extend(retired_nodes);
        if let Some(chunk) = current_nodes {
            self.retired_nodes.insert(chunk.id, chunk);
        }
        self.retired_leaves.extend(retired_leaves);
        if let Some(chunk) = current_leaves {
            self.retired_leaves.insert(chunk.id, chunk);
        }
    }

    /// Flattens all owned chunks into the final node and leaf index arrays.
    ///
    /// Chunks are concatenated in id order. Each chunk's base offset is the running sum of the
    /// sizes of the chunks before it, and every reference resolves to `base + local`. Panics if a
    /// reserved slot was never filled, if a chunk id is missing, or if a child does not land
    /// after its parent.
    pub fn assemble(self, arena: &ChunkedNodeArena) -> (Vec<Node>, Vec<u32>) {
        let TaskChunks {
            current_nodes,
            mut retired_nodes,
            current_leaves,
            mut retired_leaves,
        } = self;
        if let Some(chunk) = current_nodes {
            retired_nodes.insert(chunk.id, chunk);
        }
        if let Some(chunk) = current_leaves {
            retired_leaves.insert(chunk.id, chunk);
        }

        let (node_chunk_count, leaf_chunk_count) = arena.chunk_counts();
        assert_eq!(
            retired_nodes.len(),
            node_chunk_count as usize,
            "node chunks were lost during the build"
        );
        assert_eq!(
            retired_leaves.len(),
            leaf_chunk_count as usize,
            "leaf index chunks were lost during the build"
        );

        let mut node_bases = Vec::with_capacity(retired_nodes.len());
        let mut node_count = 0u32;
        for (expected_id, (&id, chunk)) in retired_nodes.iter().enumerate() {
            assert_eq!(id as usize, expected_id, "node chunk ids must be dense");
            node_bases.push(node_count);
            node_count += chunk.nodes.len() as u32;
        }
        let mut leaf_bases = Vec::with_capacity(retired_leaves.len());
        let mut leaf_index_count = 0u32;
        for (expected_id, (&id, chunk)) in retired_leaves.iter().enumerate() {
            assert_eq!(id as usize, expected_id, "leaf chunk ids must be dense");
            leaf_bases.push(leaf_index_count);
            leaf_index_count += chunk.indices.len() as u32;
        }

        let resolve_node = |r: ChunkRef| node_bases[r.chunk as usize] + r.local;
        let mut nodes = Vec::with_capacity(node_count as usize);
        for chunk in retired_nodes.values() {
            for arena_node in &chunk.nodes {
                let index = nodes.len() as u32;
                let node = match *arena_node {
                    ArenaNode::Reserved => {
                        panic!("node {} was reserved but never written", index)
                    }
                    ArenaNode::Leaf { first, count } => Node::Leaf {
                        offset: leaf_bases[first.chunk as usize] + first.local,
                        count,
                    },
                    ArenaNode::Interior {
                        left_aabb,
                        right_aabb,
                        left,
                        right,
                    } => {
                        let left = resolve_node(left);
                        let right = resolve_node(right);
                        assert!(
                            left > index && right > index && left < node_count && right < node_count,
                            "children ({}, {}) of node {} must follow it and lie below {}",
                            left,
                            right,
                            index,
                            node_count
                        );
                        Node::Interior {
                            left_aabb,
                            right_aabb,
                            left,
                            right,
                        }
                    }
                };
                nodes.push(node);
            }
        }

        let mut leaf_indices = Vec::with_capacity(leaf_index_count as usize);
        for chunk in retired_leaves.into_values() {
            leaf_indices.extend(chunk.indices);
        }
        (nodes, leaf_indices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utilities::BoundingBox;

    #[test]
    fn test_capacities() {
        assert_eq!(LEAF_INDEX_CHUNK_CAPACITY, 16368);
        assert!(NODE_CHUNK_CAPACITY >= 2);
        assert!(NODE_CHUNK_CAPACITY * size_of::<ArenaNode>() < CHUNK_BYTE_BUDGET);
    }

    #[test]
    fn test_single_task_assembly() {
        let arena = ChunkedNodeArena::new();
        let mut chunks = TaskChunks::default();
        let root = chunks.reserve_node(&arena);
        let (left, right) = chunks.reserve_node_pair(&arena);
        let first_left = chunks.append_leaf_indices(&arena, [4u32, 2].into_iter());
        let first_right = chunks.append_leaf_indices(&arena, [7u32].into_iter());
        chunks.fill_node(left, ArenaNode::Leaf { first: first_left, count: 2 });
        chunks.fill_node(right, ArenaNode::Leaf { first: first_right, count: 1 });
        chunks.fill_node(
            root,
            ArenaNode::Interior {
                left_aabb: BoundingBox::empty(),
                right_aabb: BoundingBox::empty(),
                left,
                right,
            },
        );

        let (nodes, leaf_indices) = chunks.assemble(&arena);
        assert_eq!(nodes.len(), 3);
        assert_eq!(nodes[0].children(), Some((1, 2)));
        assert_eq!(nodes[1], Node::Leaf { offset: 0, count: 2 });
        assert_eq!(nodes[2], Node::Leaf { offset: 2, count: 1 });
        assert_eq!(leaf_indices, vec![4, 2, 7]);
    }

    #[test]
    fn test_rollover_and_absorb_resolve_offsets() {
        let arena = ChunkedNodeArena::new();
        let mut parent = TaskChunks::default();
        let root = parent.reserve_node(&arena);
        let (left, right) = parent.reserve_node_pair(&arena);

        // The sibling task fills a whole chunk, forcing a second one.
        let mut sibling = TaskChunks::default();
        let mut sibling_slots = Vec::new();
        for _ in 0..NODE_CHUNK_CAPACITY / 2 + 1 {
            let (a, b) = sibling.reserve_node_pair(&arena);
            sibling_slots.push(a);
            sibling_slots.push(b);
        }
        assert_eq!(arena.chunk_counts().0, 3);
        let leaf = sibling.append_leaf_indices(&arena, [0u32].into_iter());
        for slot in &sibling_slots {
            sibling.fill_node(*slot, ArenaNode::Leaf { first: leaf, count: 1 });
        }
        parent.absorb(sibling);

        let leaf = parent.append_leaf_indices(&arena, [1u32].into_iter());
        parent.fill_node(left, ArenaNode::Leaf { first: leaf, count: 1 });
        parent.fill_node(right, ArenaNode::Leaf { first: leaf, count: 1 });
        parent.fill_node(
            root,
            ArenaNode::Interior {
                left_aabb: BoundingBox::empty(),
                right_aabb: BoundingBox::empty(),
                left,
                right,
            },
        );

        let (nodes, leaf_indices) = parent.assemble(&arena);
        assert_eq!(nodes.len(), 3 + sibling_slots.len());
        assert_eq!(nodes[0].children(), Some((1, 2)));
        // Sibling chunks follow the parent's first chunk.
        assert_eq!(nodes[3], Node::Leaf { offset: 0, count: 1 });
        assert_eq!(nodes[1], Node::Leaf { offset: 1, count: 1 });
        assert_eq!(leaf_indices, vec![0, 1]);
    }

    #[test]
    #[should_panic(expected = "never written")]
    fn test_unfilled_slot_panics() {
        let arena = ChunkedNodeArena::new();
        let mut chunks = TaskChunks::default();
        chunks.reserve_node(&arena);
        chunks.assemble(&arena);
    }
}
