use log::warn;

use super::build_error::BuildError;
use super::node_arena::LEAF_INDEX_CHUNK_CAPACITY;

/// Deepest tree the builder will produce. Fixes the traversal stack capacity.
pub const MAX_SUPPORTED_DEPTH: u32 = 64;

/// Largest accepted `maximum_bin_count`. Bin arrays live on the stack.
pub const MAX_BIN_COUNT: usize = 64;

/// Tunables for [`BinnedBuilder`](super::BinnedBuilder).
///
/// Costs are relative to one node traversal, which is assumed to cost 1.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BuildConfig {
    /// A range with at most this many objects becomes a leaf without evaluating splits.
    pub leaf_threshold: usize,
    /// Upper bound on the object count of any leaf. Must be `>= leaf_threshold`.
    pub max_objects_per_leaf: usize,
    /// Ranges at this depth become leaves. The root has depth 0.
    pub max_depth: u32,
    /// Cost of one ray/primitive test relative to one node traversal.
    pub intersection_cost: f32,
    /// Both children must hold at least this many objects for the build to fork them into
    /// separate tasks. Smaller ranges recurse on the calling task.
    pub new_task_num_ob_threshold: usize,
    /// Lower bound on the SAH bin count per axis.
    pub minimum_bin_count: usize,
    /// Upper bound on the SAH bin count per axis.
    pub maximum_bin_count: usize,
    /// Bin count per axis scales with `count * leaf_to_bin_multiplier` between the bounds.
    pub leaf_to_bin_multiplier: f32,
    /// `None` builds on the global rayon pool; `Some(n)` builds on a dedicated pool of `n` workers.
    pub thread_count: Option<usize>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            leaf_threshold: 4,
            max_objects_per_leaf: 16,
            max_depth: 60,
            intersection_cost: 1.0,
            new_task_num_ob_threshold: 1 << 9,
            minimum_bin_count: 16,
            maximum_bin_count: 32,
            leaf_to_bin_multiplier: 1.0 / 16.0,
            thread_count: None,
        }
    }
}

impl BuildConfig {
    pub fn with_leaf_threshold(mut self, leaf_threshold: usize) -> Self {
        self.leaf_threshold = leaf_threshold;
        self
    }

    pub fn with_max_objects_per_leaf(mut self, max_objects_per_leaf: usize) -> Self {
        self.max_objects_per_leaf = max_objects_per_leaf;
        self
    }

    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_intersection_cost(mut self, intersection_cost: f32) -> Self {
        self.intersection_cost = intersection_cost;
        self
    }

    pub fn with_new_task_num_ob_threshold(mut self, threshold: usize) -> Self {
        self.new_task_num_ob_threshold = threshold;
        self
    }

    pub fn with_bin_counts(mut self, minimum_bin_count: usize, maximum_bin_count: usize) -> Self {
        self.minimum_bin_count = minimum_bin_count;
        self.maximum_bin_count = maximum_bin_count;
        self
    }

    pub fn with_leaf_to_bin_multiplier(mut self, multiplier: f32) -> Self {
        self.leaf_to_bin_multiplier = multiplier;
        self
    }

    pub fn with_thread_count(mut self, thread_count: Option<usize>) -> Self {
        self.thread_count = thread_count;
        self
    }

    /// Number of bins per axis for a range of `count` objects.
    #[inline]
    pub fn bin_count_for(&self, count: usize) -> usize {
        let scaled = (count as f32 * self.leaf_to_bin_multiplier) as usize;
        scaled.clamp(self.minimum_bin_count, self.maximum_bin_count)
    }

    /// Checks the configuration for consistency.
    pub fn validate(&self) -> Result<(), BuildError> {
        let invalid = |message: String| Err(BuildError::InvalidConfig { message });

        if self.leaf_threshold == 0 {
            return invalid("leaf_threshold must be at least 1".into());
        }
        if self.max_objects_per_leaf < self.leaf_threshold {
            return invalid(format!(
                "max_objects_per_leaf ({}) must be >= leaf_threshold ({})",
                self.max_objects_per_leaf, self.leaf_threshold
            ));
        }
        if self.max_objects_per_leaf > LEAF_INDEX_CHUNK_CAPACITY {
            return invalid(format!(
                "max_objects_per_leaf ({}) exceeds the leaf chunk capacity ({})",
                self.max_objects_per_leaf, LEAF_INDEX_CHUNK_CAPACITY
            ));
        }
        if self.max_depth > MAX_SUPPORTED_DEPTH {
            return invalid(format!(
                "max_depth ({}) exceeds the supported maximum ({})",
                self.max_depth, MAX_SUPPORTED_DEPTH
            ));
        }
        if !(self.intersection_cost.is_finite() && self.intersection_cost > 0.0) {
            return invalid(format!(
                "intersection_cost must be finite and positive, got {}",
                self.intersection_cost
            ));
        }
        if self.new_task_num_ob_threshold == 0 {
            return invalid("new_task_num_ob_threshold must be at least 1".into());
        }
        if self.minimum_bin_count < 2 || self.maximum_bin_count < self.minimum_bin_count {
            return invalid(format!(
                "bin counts must satisfy 2 <= minimum ({}) <= maximum ({})",
                self.minimum_bin_count, self.maximum_bin_count
            ));
        }
        if !(self.leaf_to_bin_multiplier.is_finite() && self.leaf_to_bin_multiplier >= 0.0) {
            return invalid(format!(
                "leaf_to_bin_multiplier must be finite and non-negative, got {}",
                self.leaf_to_bin_multiplier
            ));
        }
        if self.maximum_bin_count > MAX_BIN_COUNT {
            return invalid(format!(
                "maximum_bin_count ({}) exceeds the supported maximum ({})",
                self.maximum_bin_count, MAX_BIN_COUNT
            ));
        }
        if self.thread_count == Some(0) {
            return invalid("thread_count must be at least 1 when set".into());
        }
        if self.new_task_num_ob_threshold < 2 * self.max_objects_per_leaf {
            warn!(
                "new_task_num_ob_threshold {} is below twice max_objects_per_leaf; \
                 forking tiny ranges costs more than it saves",
                self.new_task_num_ob_threshold
            );
        }
        Ok(())
    }
}
