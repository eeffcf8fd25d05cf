/// Why a range was turned into a leaf.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LeafReason {
    /// The range held at most `leaf_threshold` objects.
    UnderThreshold,
    /// The range reached `max_depth`.
    MaxDepth,
    /// The best split was no cheaper than testing every object.
    CheaperNoSplit,
    /// No bin boundary separated the objects and they fit in one leaf.
    CouldNotSplit,
    /// Produced by median splitting, either of an inseparable range or of one that would
    /// otherwise run out of depth.
    ArbitrarySplit,
}

/// Counters gathered while building. Each build task owns one; they are merged after join.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BuildStats {
    pub num_under_thresh_leaves: u32,
    pub num_maxdepth_leaves: u32,
    pub num_cheaper_nosplit_leaves: u32,
    pub num_could_not_split_leaves: u32,
    pub num_arbitrary_split_leaves: u32,
    /// Total leaves, the sum of the per-reason counts.
    pub num_leaves: u32,
    pub num_interior_nodes: u32,
    /// Object count of the largest leaf.
    pub max_num_objects_per_leaf: u32,
    pub leaf_depth_sum: u64,
    /// Depth of the deepest leaf. The root has depth 0.
    pub max_leaf_depth: u32,
    /// Arena chunks handed out for result nodes.
    pub num_node_chunks: u32,
    /// Arena chunks handed out for leaf object indices.
    pub num_leaf_chunks: u32,
}

impl BuildStats {
    #[inline]
    pub(crate) fn record_leaf(&mut self, reason: LeafReason, depth: u32, count: usize) {
        match reason {
            LeafReason::UnderThreshold => self.num_under_thresh_leaves += 1,
            LeafReason::MaxDepth => self.num_maxdepth_leaves += 1,
            LeafReason::CheaperNoSplit => self.num_cheaper_nosplit_leaves += 1,
            LeafReason::CouldNotSplit => self.num_could_not_split_leaves += 1,
            LeafReason::ArbitrarySplit => self.num_arbitrary_split_leaves += 1,
        }
        self.num_leaves += 1;
        self.leaf_depth_sum += depth as u64;
        self.max_leaf_depth = self.max_leaf_depth.max(depth);
        self.max_num_objects_per_leaf = self.max_num_objects_per_leaf.max(count as u32);
    }

    #[inline]
    pub(crate) fn record_interior(&mut self) {
        self.num_interior_nodes += 1;
    }

    /// Folds another task's counters into these.
    pub fn accumulate(&mut self, other: &BuildStats) {
        self.num_under_thresh_leaves += other.num_under_thresh_leaves;
        self.num_maxdepth_leaves += other.num_maxdepth_leaves;
        self.num_cheaper_nosplit_leaves += other.num_cheaper_nosplit_leaves;
        self.num_could_not_split_leaves += other.num_could_not_split_leaves;
        self.num_arbitrary_split_leaves += other.num_arbitrary_split_leaves;
        self.num_leaves += other.num_leaves;
        self.num_interior_nodes += other.num_interior_nodes;
        self.max_num_objects_per_leaf = self
            .max_num_objects_per_leaf
            .max(other.max_num_objects_per_leaf);
        self.leaf_depth_sum += other.leaf_depth_sum;
        self.max_leaf_depth = self.max_leaf_depth.max(other.max_leaf_depth);
        self.num_node_chunks += other.num_node_chunks;
        self.num_leaf_chunks += other.num_leaf_chunks;
    }

    /// Total number of result nodes.
    #[inline]
    pub fn num_nodes(&self) -> u32 {
        self.num_leaves + self.num_interior_nodes
    }

    pub fn average_leaf_depth(&self) -> f32 {
        if self.num_leaves == 0 {
            0.0
        } else {
            self.leaf_depth_sum as f32 / self.num_leaves as f32
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_accumulate() {
        let mut a = BuildStats::default();
        a.record_leaf(LeafReason::UnderThreshold, 3, 4);
        a.record_interior();
        let mut b = BuildStats::default();
        b.record_leaf(LeafReason::MaxDepth, 7, 9);
        b.record_leaf(LeafReason::ArbitrarySplit, 5, 2);

        a.accumulate(&b);
        assert_eq!(a.num_leaves, 3);
        assert_eq!(a.num_under_thresh_leaves, 1);
        assert_eq!(a.num_maxdepth_leaves, 1);
        assert_eq!(a.num_arbitrary_split_leaves, 1);
        assert_eq!(a.num_interior_nodes, 1);
        assert_eq!(a.num_nodes(), 4);
        assert_eq!(a.max_leaf_depth, 7);
        assert_eq!(a.max_num_objects_per_leaf, 9);
        assert_eq!(a.leaf_depth_sum, 15);
        assert!((a.average_leaf_depth() - 5.0).abs() < 1e-6);
    }
}
