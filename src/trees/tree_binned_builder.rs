use crossbeam_utils::atomic::AtomicCell;
use log::{debug, info, warn};
use rayon::prelude::*;

use super::build_config::BuildConfig;
use super::build_error::{BuildError, InvalidInputKind};
use super::build_stats::{BuildStats, LeafReason};
use super::cancellation::ShouldCancelCallback;
use super::node::ArenaNode;
use super::node_arena::{ChunkedNodeArena, TaskChunks};
use super::split_evaluator::{BinMapping, SplitDecision, SplitEvaluator};
use super::tree::Tree;
use crate::utilities::BoundingBox;

/// A primitive as seen by the builder: its box and its registration index.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct BinningObject {
    pub(crate) aabb: BoundingBox,
    pub(crate) index: u32,
}

/// Box of a group of objects together with the box of their centroids.
#[derive(Clone, Copy, Debug, PartialEq)]
struct GroupBounds {
    aabb: BoundingBox,
    centroid_aabb: BoundingBox,
}

impl GroupBounds {
    fn empty() -> Self {
        Self {
            aabb: BoundingBox::empty(),
            centroid_aabb: BoundingBox::empty(),
        }
    }

    #[inline(always)]
    fn add(&mut self, object: &BinningObject) {
        self.aabb.enlarge_to_hold_bounding_box(&object.aabb);
        self.centroid_aabb.enlarge_to_hold_point(object.aabb.centroid());
    }

    fn merged(mut self, other: Self) -> Self {
        self.aabb.enlarge_to_hold_bounding_box(&other.aabb);
        self.centroid_aabb
            .enlarge_to_hold_bounding_box(&other.centroid_aabb);
        self
    }

    fn of(objects: &[BinningObject]) -> Self {
        let mut bounds = Self::empty();
        for object in objects {
            bounds.add(object);
        }
        bounds
    }
}

/// A contiguous run of objects that will become one subtree.
struct BuildRange<'a> {
    objects: &'a mut [BinningObject],
    bounds: GroupBounds,
    depth: u32,
}

impl<'a> BuildRange<'a> {
    /// Splits off the first `left_count` objects. Both halves sit one level deeper.
    fn split(
        self,
        left_count: usize,
        left_bounds: GroupBounds,
        right_bounds: GroupBounds,
    ) -> (BuildRange<'a>, BuildRange<'a>) {
        debug_assert!(
            self.bounds.aabb.contains_bounding_box(&left_bounds.aabb)
                && self.bounds.aabb.contains_bounding_box(&right_bounds.aabb),
            "child boxes must lie inside the parent box"
        );
        let depth = self.depth + 1;
        let (left, right) = self.objects.split_at_mut(left_count);
        (
            BuildRange {
                objects: left,
                bounds: left_bounds,
                depth,
            },
            BuildRange {
                objects: right,
                bounds: right_bounds,
                depth,
            },
        )
    }
}

/// Per-task mutable state. A forked task gets a fresh one, which its parent absorbs after join.
#[derive(Default)]
struct BuildContext {
    chunks: TaskChunks,
    stats: BuildStats,
}

impl BuildContext {
    fn absorb(&mut self, other: BuildContext) {
        self.chunks.absorb(other.chunks);
        self.stats.accumulate(&other.stats);
    }
}

/// State shared by every task of one build.
struct BinnedBuilderContext<'a> {
    config: &'a BuildConfig,
    arena: ChunkedNodeArena,
    should_cancel: &'a dyn ShouldCancelCallback,
    /// Raised when the build is cancelled or a task fails, so siblings stop early.
    stop: AtomicCell<bool>,
}

impl BinnedBuilderContext<'_> {
    fn check_cancel(&self) -> Result<(), BuildError> {
        if self.stop.load() {
            return Err(BuildError::Cancelled);
        }
        if self.should_cancel.should_cancel() {
            self.stop.store(true);
            return Err(BuildError::Cancelled);
        }
        Ok(())
    }

    fn make_leaf(&self, ctx: &mut BuildContext, range: &BuildRange, reason: LeafReason) -> ArenaNode {
        let count = range.objects.len();
        let first = ctx
            .chunks
            .append_leaf_indices(&self.arena, range.objects.iter().map(|o| o.index));
        ctx.stats.record_leaf(reason, range.depth, count);
        ArenaNode::Leaf {
            first,
            count: count as u32,
        }
    }

    /// Whether `count` objects at `depth` can still be spread over leaves of at most
    /// `max_objects_per_leaf` objects without going below `max_depth`.
    #[inline]
    fn fits_below(&self, count: usize, depth: u32) -> bool {
        let levels_left = self.config.max_depth.saturating_sub(depth);
        count as u128 <= (self.config.max_objects_per_leaf as u128) << levels_left
    }

    /// Builds the subtree for `range` and returns its root record.
    ///
    /// The caller owns the slot the record goes into; children are reserved here and filled
    /// once their own subtrees have returned.
    ///
    /// Every range handed in fits below its depth (see [`Self::fits_below`]). A surface area split
    /// that would leave a child unable to fit is replaced by median splits, which always fit.
    fn build_subtree(
        &self,
        ctx: &mut BuildContext,
        range: BuildRange<'_>,
    ) -> Result<ArenaNode, BuildError> {
        self.check_cancel()?;
        let count = range.objects.len();
        let config = self.config;

        if count <= config.leaf_threshold {
            return Ok(self.make_leaf(ctx, &range, LeafReason::UnderThreshold));
        }
        if range.depth >= config.max_depth {
            debug_assert!(count <= config.max_objects_per_leaf);
            return Ok(self.make_leaf(ctx, &range, LeafReason::MaxDepth));
        }

        let evaluator = SplitEvaluator::new(config, count);
        let candidate =
            match evaluator.evaluate(range.objects, &range.bounds.aabb, &range.bounds.centroid_aabb) {
                SplitDecision::Split(candidate) => candidate,
                // Too many objects for one leaf, so take the best separating split anyway.
                SplitDecision::NotBeneficial(candidate)
                    if count > config.max_objects_per_leaf =>
                {
                    candidate
                }
                SplitDecision::NotBeneficial(_) => {
                    return Ok(self.make_leaf(ctx, &range, LeafReason::CheaperNoSplit));
                }
                SplitDecision::NoSeparation if count <= config.max_objects_per_leaf => {
                    return Ok(self.make_leaf(ctx, &range, LeafReason::CouldNotSplit));
                }
                SplitDecision::NoSeparation => return self.build_arbitrary(ctx, range),
            };

        let (left_count, left_bounds, right_bounds) =
            partition(range.objects, &candidate.mapping, candidate.boundary);
        debug_assert_eq!(
            left_count, candidate.left_count,
            "partition disagrees with the evaluated split"
        );
        debug_assert!(candidate.cost.is_finite());
        debug_assert_eq!(left_bounds.aabb, candidate.left_aabb);
        debug_assert_eq!(right_bounds.aabb, candidate.right_aabb);
        let larger_side = left_count.max(count - left_count);
        if left_count == 0 || left_count == count || !self.fits_below(larger_side, range.depth + 1)
        {
            return self.build_arbitrary(ctx, range);
        }

        let (left, right) = range.split(left_count, left_bounds, right_bounds);
        self.build_children(ctx, left, right, Self::build_subtree)
    }

    /// Splits a range at its midpoint until the pieces fit in leaves.
    ///
    /// Halving keeps every piece within the leaf capacity left below its depth, so the pieces
    /// fit in leaves by `max_depth` at the latest.
    fn build_arbitrary(
        &self,
        ctx: &mut BuildContext,
        range: BuildRange<'_>,
    ) -> Result<ArenaNode, BuildError> {
        self.check_cancel()?;
        let count = range.objects.len();
        if count <= self.config.max_objects_per_leaf {
            return Ok(self.make_leaf(ctx, &range, LeafReason::ArbitrarySplit));
        }
        debug_assert!(range.depth < self.config.max_depth);
        let left_count = count / 2;
        let left_bounds = GroupBounds::of(&range.objects[..left_count]);
        let right_bounds = GroupBounds::of(&range.objects[left_count..]);
        let (left, right) = range.split(left_count, left_bounds, right_bounds);
        self.build_children(ctx, left, right, Self::build_arbitrary)
    }

    /// Reserves the two child slots, builds both children, and returns the interior record.
    ///
    /// When both children are large enough, the right child is built on a forked task with its
    /// own context.
    fn build_children<F>(
        &self,
        ctx: &mut BuildContext,
        left: BuildRange<'_>,
        right: BuildRange<'_>,
        build: F,
    ) -> Result<ArenaNode, BuildError>
    where
        F: Fn(&Self, &mut BuildContext, BuildRange<'_>) -> Result<ArenaNode, BuildError> + Sync,
    {
        let (left_slot, right_slot) = ctx.chunks.reserve_node_pair(&self.arena);
        ctx.stats.record_interior();
        let left_aabb = left.bounds.aabb;
        let right_aabb = right.bounds.aabb;

        self.check_cancel()?;
        let threshold = self.config.new_task_num_ob_threshold;
        let (left_node, right_node) =
            if left.objects.len() >= threshold && right.objects.len() >= threshold {
                let (left_result, (right_result, right_ctx)) = rayon::join(
                    || self.stop_on_error(build(self, ctx, left)),
                    || {
                        let mut right_ctx = BuildContext::default();
                        let result = self.stop_on_error(build(self, &mut right_ctx, right));
                        (result, right_ctx)
                    },
                );
                ctx.absorb(right_ctx);
                self.join_results(left_result, right_result)?
            } else {
                let left_node = build(self, ctx, left)?;
                let right_node = build(self, ctx, right)?;
                (left_node, right_node)
            };

        ctx.chunks.fill_node(left_slot, left_node);
        ctx.chunks.fill_node(right_slot, right_node);
        Ok(ArenaNode::Interior {
            left_aabb,
            right_aabb,
            left: left_slot,
            right: right_slot,
        })
    }

    /// Raises the stop flag when a forked task fails, so its sibling winds down early.
    fn stop_on_error<T>(&self, result: Result<T, BuildError>) -> Result<T, BuildError> {
        if result.is_err() {
            self.stop.store(true);
        }
        result
    }

    /// Combines the results of two forked tasks. A sibling stopped by the other side's failure
    /// reports `Cancelled`, so the original failure wins.
    fn join_results<A, B>(
        &self,
        left: Result<A, BuildError>,
        right: Result<B, BuildError>,
    ) -> Result<(A, B), BuildError> {
        match (left, right) {
            (Ok(a), Ok(b)) => Ok((a, b)),
            (Err(e), Ok(_)) | (Ok(_), Err(e)) => Err(e),
            (Err(BuildError::Cancelled), Err(e)) | (Err(e), Err(_)) => Err(e),
        }
    }
}

/// Moves the objects whose centroid bin is at most `boundary` to the front of the slice.
///
/// Returns the number of objects moved to the front and the bounds of both sides.
fn partition(
    objects: &mut [BinningObject],
    mapping: &BinMapping,
    boundary: usize,
) -> (usize, GroupBounds, GroupBounds) {
    let mut left_bounds = GroupBounds::empty();
    let mut right_bounds = GroupBounds::empty();
    let mut left_end = 0;
    let mut right_start = objects.len();
    while left_end < right_start {
        let object = objects[left_end];
        if mapping.bin_index(object.aabb.centroid()) <= boundary {
            left_bounds.add(&object);
            left_end += 1;
        } else {
            right_bounds.add(&object);
            right_start -= 1;
            objects.swap(left_end, right_start);
        }
    }
    (left_end, left_bounds, right_bounds)
}

/// Builds a [`Tree`] over axis-aligned boxes with the binned surface area heuristic.
///
/// Objects are registered by index, either all at once with [`BinnedBuilder::from_aabbs`] or one
/// at a time with [`BinnedBuilder::set_object_aabb`]. Large subtrees are built in parallel on
/// rayon; the resulting structure does not depend on the number of worker threads.
///
/// ```
/// use glam::Vec3;
/// use rust_bvh_accel::trees::{BinnedBuilder, BuildConfig, NeverCancel};
/// use rust_bvh_accel::utilities::BoundingBox;
///
/// let boxes: Vec<_> = (0..100)
///     .map(|i| {
///         let p = Vec3::new(i as f32, 0.0, 0.0);
///         BoundingBox::new(p, p + Vec3::ONE)
///     })
///     .collect();
/// let tree = BinnedBuilder::from_aabbs(BuildConfig::default(), &boxes)
///     .build(&NeverCancel)
///     .unwrap();
/// assert_eq!(tree.primitive_count(), 100);
/// ```
#[derive(Clone, Debug)]
pub struct BinnedBuilder {
    config: BuildConfig,
    objects: Vec<BinningObject>,
    object_is_set: Vec<bool>,
    root_aabb: BoundingBox,
    root_centroid_aabb: BoundingBox,
}

impl BinnedBuilder {
    /// Creates a builder for `num_objects` objects whose boxes are set individually.
    pub fn new(config: BuildConfig, num_objects: usize) -> Self {
        Self {
            config,
            objects: (0..num_objects)
                .map(|i| BinningObject {
                    aabb: BoundingBox::empty(),
                    index: i as u32,
                })
                .collect(),
            object_is_set: vec![false; num_objects],
            root_aabb: BoundingBox::empty(),
            root_centroid_aabb: BoundingBox::empty(),
        }
    }

    /// Creates a builder with every object's box registered. Object `i` gets `aabbs[i]`.
    pub fn from_aabbs(config: BuildConfig, aabbs: &[BoundingBox]) -> Self {
        let mut builder = Self::new(config, aabbs.len());
        for (i, aabb) in aabbs.iter().enumerate() {
            builder.set_object_aabb(i, *aabb);
        }
        builder
    }

    /// Sets the box of object `index` and grows the running root boxes.
    ///
    /// Panics if `index` is out of range. Overwriting an object's box does not shrink
    /// [`BinnedBuilder::root_aabb`]; the build recomputes the root from the final boxes.
    pub fn set_object_aabb(&mut self, index: usize, aabb: BoundingBox) {
        self.objects[index].aabb = aabb;
        self.object_is_set[index] = true;
        self.root_aabb.enlarge_to_hold_bounding_box(&aabb);
        self.root_centroid_aabb
            .enlarge_to_hold_point(aabb.centroid());
    }

    /// Sets the boxes of all objects at once.
    pub fn set_object_aabbs(&mut self, aabbs: &[BoundingBox]) -> Result<(), BuildError> {
        if aabbs.len() != self.objects.len() {
            return Err(InvalidInputKind::ObjectCountMismatch {
                expected: self.objects.len(),
                got: aabbs.len(),
            }
            .into());
        }
        for (i, aabb) in aabbs.iter().enumerate() {
            self.set_object_aabb(i, *aabb);
        }
        Ok(())
    }

    #[inline]
    pub fn num_objects(&self) -> usize {
        self.objects.len()
    }

    #[inline]
    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Union of all boxes registered so far.
    #[inline]
    pub fn root_aabb(&self) -> &BoundingBox {
        &self.root_aabb
    }

    /// Bounds of the centroids of all boxes registered so far.
    #[inline]
    pub fn root_centroid_aabb(&self) -> &BoundingBox {
        &self.root_centroid_aabb
    }

    /// Rejects unusable input before anything is allocated for the build.
    fn validate_input(&self) -> Result<(), BuildError> {
        self.config.validate()?;
        let count = self.objects.len();
        if count > u32::MAX as usize {
            return Err(InvalidInputKind::TooManyObjects { count }.into());
        }
        for (index, (object, &is_set)) in self.objects.iter().zip(&self.object_is_set).enumerate() {
            if !is_set {
                return Err(InvalidInputKind::UnsetObject { index }.into());
            }
            if !object.aabb.is_finite() {
                return Err(InvalidInputKind::NonFiniteBounds { index }.into());
            }
            if object.aabb.is_empty() {
                return Err(InvalidInputKind::InvertedBounds { index }.into());
            }
        }
        // Every level at most doubles the leaf count, so this many objects can never fit.
        let capacity = (self.config.max_objects_per_leaf as u128) << self.config.max_depth;
        if count as u128 > capacity {
            return Err(BuildError::DepthLimitExceeded {
                depth: self.config.max_depth,
                count,
                max_objects_per_leaf: self.config.max_objects_per_leaf,
            });
        }
        Ok(())
    }

    /// Builds the tree.
    ///
    /// `should_cancel` is polled throughout; once it returns true the build stops, releases
    /// everything it allocated, and returns [`BuildError::Cancelled`]. The builder itself is left
    /// untouched and can build again.
    pub fn build(&self, should_cancel: &dyn ShouldCancelCallback) -> Result<Tree, BuildError> {
        self.validate_input()?;

        if self.objects.is_empty() {
            if should_cancel.should_cancel() {
                info!("BVH build cancelled");
                return Err(BuildError::Cancelled);
            }
            let mut stats = BuildStats::default();
            stats.record_leaf(LeafReason::UnderThreshold, 0, 0);
            return Ok(Tree::empty(stats, self.config));
        }

        let result = match self.config.thread_count {
            Some(thread_count) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(thread_count)
                    .build()?;
                pool.install(|| self.build_on_current_pool(should_cancel))
            }
            None => self.build_on_current_pool(should_cancel),
        };
        if let Err(BuildError::Cancelled) = result {
            info!("BVH build over {} objects cancelled", self.objects.len());
        }
        result
    }

    fn build_on_current_pool(
        &self,
        should_cancel: &dyn ShouldCancelCallback,
    ) -> Result<Tree, BuildError> {
        let mut objects = self.objects.clone();
        let root_bounds = objects
            .par_iter()
            .fold(GroupBounds::empty, |mut bounds, object| {
                bounds.add(object);
                bounds
            })
            .reduce(GroupBounds::empty, GroupBounds::merged);
        debug!(
            "building BVH over {} objects, root {}",
            objects.len(),
            root_bounds.aabb.to_string()
        );

        let context = BinnedBuilderContext {
            config: &self.config,
            arena: ChunkedNodeArena::new(),
            should_cancel,
            stop: AtomicCell::new(false),
        };
        let mut ctx = BuildContext::default();
        let root_slot = ctx.chunks.reserve_node(&context.arena);
        let root_node = context.build_subtree(
            &mut ctx,
            BuildRange {
                objects: &mut objects,
                bounds: root_bounds,
                depth: 0,
            },
        )?;
        ctx.chunks.fill_node(root_slot, root_node);

        let BuildContext { chunks, mut stats } = ctx;
        let (nodes, leaf_indices) = chunks.assemble(&context.arena);
        let (num_node_chunks, num_leaf_chunks) = context.arena.chunk_counts();
        stats.num_node_chunks = num_node_chunks;
        stats.num_leaf_chunks = num_leaf_chunks;
        debug_assert_eq!(nodes.len() as u32, stats.num_nodes());
        debug_assert_eq!(leaf_indices.len(), objects.len());

        if stats.num_arbitrary_split_leaves > 0 {
            warn!(
                "{} BVH leaves came from median splits of inseparable or depth-limited ranges",
                stats.num_arbitrary_split_leaves
            );
        }
        debug!(
            "built BVH: {} nodes, {} leaves, max depth {}, average leaf depth {:.2}, \
             largest leaf {}, {} node chunks, {} leaf chunks",
            nodes.len(),
            stats.num_leaves,
            stats.max_leaf_depth,
            stats.average_leaf_depth(),
            stats.max_num_objects_per_leaf,
            stats.num_node_chunks,
            stats.num_leaf_chunks
        );

        let tree = Tree::new(root_bounds.aabb, nodes, leaf_indices, stats, self.config);
        #[cfg(debug_assertions)]
        tree.validate();
        Ok(tree)
    }
}

/// Convenience for callers that only have boxes.
pub fn build_tree(
    config: BuildConfig,
    aabbs: &[BoundingBox],
    should_cancel: &dyn ShouldCancelCallback,
) -> Result<Tree, BuildError> {
    BinnedBuilder::from_aabbs(config, aabbs).build(should_cancel)
}
