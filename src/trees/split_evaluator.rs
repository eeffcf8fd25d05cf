use glam::Vec3;

use super::build_config::{BuildConfig, MAX_BIN_COUNT};
use super::tree_binned_builder::BinningObject;
use crate::utilities::BoundingBox;

/// Cost of visiting one interior node. Intersection costs are expressed relative to this.
pub const TRAVERSAL_COST: f32 = 1.0;

#[derive(Clone, Copy, Debug)]
struct Bin {
    aabb: BoundingBox,
    count: usize,
}

impl Default for Bin {
    fn default() -> Self {
        Self {
            aabb: BoundingBox::empty(),
            count: 0,
        }
    }
}

/// Maps centroid coordinates along one axis to bin indices.
///
/// The same mapping is used to evaluate candidates and to partition, so the partition's side
/// counts always match the evaluated candidate.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct BinMapping {
    pub axis: usize,
    min: f32,
    scale: f32,
    bin_count: usize,
}

impl BinMapping {
    /// `None` when the centroids have no usable extent along `axis`.
    fn new(axis: usize, centroid_aabb: &BoundingBox, bin_count: usize) -> Option<Self> {
        let extent = centroid_aabb.axis_length(axis);
        if !(extent > 0.0) {
            return None;
        }
        let scale = bin_count as f32 / extent;
        if !scale.is_finite() {
            return None;
        }
        Some(Self {
            axis,
            min: centroid_aabb.min[axis],
            scale,
            bin_count,
        })
    }

    /// `clamp(floor((c - min) * bin_count / extent), 0, bin_count - 1)`.
    #[inline(always)]
    pub fn bin_index(&self, centroid: Vec3) -> usize {
        // Float to int casts saturate, so values below zero land in bin 0.
        (((centroid[self.axis] - self.min) * self.scale) as usize).min(self.bin_count - 1)
    }
}

/// Best split found for a range. Objects whose bin index is `<= boundary` go left.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct SplitCandidate {
    pub mapping: BinMapping,
    pub boundary: usize,
    pub cost: f32,
    pub left_count: usize,
    pub left_aabb: BoundingBox,
    pub right_aabb: BoundingBox,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum SplitDecision {
    /// Splitting is estimated to be cheaper than a leaf.
    Split(SplitCandidate),
    /// The best candidate separates the objects but is not cheaper than a leaf.
    NotBeneficial(SplitCandidate),
    /// No bin boundary on any axis puts objects on both sides.
    NoSeparation,
}

/// Binned surface area heuristic over object centroids.
#[derive(Clone, Copy, Debug)]
pub(crate) struct SplitEvaluator {
    bin_count: usize,
    intersection_cost: f32,
}

impl SplitEvaluator {
    pub fn new(config: &BuildConfig, count: usize) -> Self {
        Self {
            bin_count: config.bin_count_for(count),
            intersection_cost: config.intersection_cost,
        }
    }

    /// Evaluates every bin boundary on every axis with nonzero centroid extent.
    ///
    /// The cost of a candidate is
    /// `TRAVERSAL_COST + (area(L) * |L| + area(R) * |R|) * intersection_cost / area(range)`,
    /// compared against `intersection_cost * count` for a leaf. Axes are visited X, Y, Z and
    /// boundaries in increasing order; the first minimum wins.
    pub fn evaluate(
        &self,
        objects: &[BinningObject],
        aabb: &BoundingBox,
        centroid_aabb: &BoundingBox,
    ) -> SplitDecision {
        let bin_count = self.bin_count;
        debug_assert!((2..=MAX_BIN_COUNT).contains(&bin_count));

        let mappings = [
            BinMapping::new(0, centroid_aabb, bin_count),
            BinMapping::new(1, centroid_aabb, bin_count),
            BinMapping::new(2, centroid_aabb, bin_count),
        ];
        if mappings.iter().all(Option::is_none) {
            return SplitDecision::NoSeparation;
        }

        let mut bins = [[Bin::default(); MAX_BIN_COUNT]; 3];
        for object in objects {
            let centroid = object.aabb.centroid();
            for (axis_bins, mapping) in bins.iter_mut().zip(&mappings) {
                if let Some(mapping) = mapping {
                    let bin = &mut axis_bins[mapping.bin_index(centroid)];
                    bin.aabb.enlarge_to_hold_bounding_box(&object.aabb);
                    bin.count += 1;
                }
            }
        }

        let count = objects.len();
        // Ranges of zero-size objects on a line have no area; weigh by edge length instead.
        let use_area = aabb.get_half_surface_area() > 0.0;
        let measure = |b: &BoundingBox| {
            if use_area {
                b.get_half_surface_area()
            } else if b.is_empty() {
                0.0
            } else {
                (b.max - b.min).element_sum()
            }
        };
        let parent_area = measure(aabb);
        let mut best: Option<(BinMapping, usize, f32, usize)> = None;

        for (axis_bins, mapping) in bins.iter().zip(&mappings) {
            let Some(mapping) = mapping else {
                continue;
            };
            let axis_bins = &axis_bins[..bin_count];

            // right_area[b] and right_count[b] describe bins b + 1 .. bin_count.
            let mut right_area = [0.0f32; MAX_BIN_COUNT];
            let mut right_count = [0usize; MAX_BIN_COUNT];
            let mut accumulated = Bin::default();
            for b in (0..bin_count - 1).rev() {
                accumulated
                    .aabb
                    .enlarge_to_hold_bounding_box(&axis_bins[b + 1].aabb);
                accumulated.count += axis_bins[b + 1].count;
                right_area[b] = measure(&accumulated.aabb);
                right_count[b] = accumulated.count;
            }

            let mut left = Bin::default();
            for b in 0..bin_count - 1 {
                left.aabb.enlarge_to_hold_bounding_box(&axis_bins[b].aabb);
                left.count += axis_bins[b].count;
                if left.count == 0 || right_count[b] == 0 {
                    continue;
                }
                let cost = if parent_area > 0.0 {
                    TRAVERSAL_COST
                        + (measure(&left.aabb) * left.count as f32
                            + right_area[b] * right_count[b] as f32)
                            * self.intersection_cost
                            / parent_area
                } else {
                    // Coincident objects: no split can shrink anything.
                    TRAVERSAL_COST + self.intersection_cost * count as f32
                };
                if best.map_or(true, |(_, _, best_cost, _)| cost < best_cost) {
                    best = Some((*mapping, b, cost, left.count));
                }
            }
        }

        let Some((mapping, boundary, cost, left_count)) = best else {
            return SplitDecision::NoSeparation;
        };
        let axis_bins = &bins[mapping.axis][..bin_count];
        let mut left_aabb = BoundingBox::empty();
        let mut right_aabb = BoundingBox::empty();
        for (b, bin) in axis_bins.iter().enumerate() {
            if b <= boundary {
                left_aabb.enlarge_to_hold_bounding_box(&bin.aabb);
            } else {
                right_aabb.enlarge_to_hold_bounding_box(&bin.aabb);
            }
        }
        let candidate = SplitCandidate {
            mapping,
            boundary,
            cost,
            left_count,
            left_aabb,
            right_aabb,
        };
        if cost < self.intersection_cost * count as f32 {
            SplitDecision::Split(candidate)
        } else {
            SplitDecision::NotBeneficial(candidate)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(index: u32, min: Vec3, max: Vec3) -> BinningObject {
        BinningObject {
            aabb: BoundingBox::new(min, max),
            index,
        }
    }

    fn bounds(objects: &[BinningObject]) -> (BoundingBox, BoundingBox) {
        let mut aabb = BoundingBox::empty();
        let mut centroid_aabb = BoundingBox::empty();
        for o in objects {
            aabb.enlarge_to_hold_bounding_box(&o.aabb);
            centroid_aabb.enlarge_to_hold_point(o.aabb.centroid());
        }
        (aabb, centroid_aabb)
    }

    #[test]
    fn test_bin_mapping() {
        let centroids = BoundingBox::new(Vec3::ZERO, Vec3::new(16.0, 0.0, 0.0));
        let mapping = BinMapping::new(0, &centroids, 16).unwrap();
        assert_eq!(mapping.bin_index(Vec3::ZERO), 0);
        assert_eq!(mapping.bin_index(Vec3::new(3.5, 0.0, 0.0)), 3);
        assert_eq!(mapping.bin_index(Vec3::new(16.0, 0.0, 0.0)), 15);
        assert_eq!(mapping.bin_index(Vec3::new(-1.0, 0.0, 0.0)), 0);
        assert!(BinMapping::new(1, &centroids, 16).is_none());
    }

    #[test]
    fn test_two_clusters_split_between_them() {
        let mut objects = Vec::new();
        for i in 0..8 {
            let offset = if i < 4 { 0.0 } else { 100.0 };
            let p = Vec3::new(offset + i as f32 * 0.1, 0.0, 0.0);
            objects.push(object(i, p, p + Vec3::ONE));
        }
        let (aabb, centroid_aabb) = bounds(&objects);
        let evaluator = SplitEvaluator::new(&BuildConfig::default(), objects.len());
        match evaluator.evaluate(&objects, &aabb, &centroid_aabb) {
            SplitDecision::Split(candidate) => {
                assert_eq!(candidate.mapping.axis, 0);
                assert_eq!(candidate.left_count, 4);
                assert!(candidate.left_aabb.max.x < 2.0);
                assert!(candidate.right_aabb.min.x >= 100.0);
                assert!(candidate.cost < objects.len() as f32);
            }
            other => panic!("expected a split, got {:?}", other),
        }
    }

    #[test]
    fn test_identical_centroids_cannot_be_separated() {
        let objects: Vec<_> = (0..6)
            .map(|i| object(i, Vec3::splat(-(i as f32)), Vec3::splat(i as f32)))
            .collect();
        let (aabb, centroid_aabb) = bounds(&objects);
        let evaluator = SplitEvaluator::new(&BuildConfig::default(), objects.len());
        assert_eq!(
            evaluator.evaluate(&objects, &aabb, &centroid_aabb),
            SplitDecision::NoSeparation
        );
    }

    #[test]
    fn test_points_on_a_line_still_split() {
        let objects: Vec<_> = (0..32)
            .map(|i| {
                let p = Vec3::new(i as f32, 0.0, 0.0);
                object(i, p, p)
            })
            .collect();
        let (aabb, centroid_aabb) = bounds(&objects);
        assert_eq!(aabb.get_half_surface_area(), 0.0);
        let evaluator = SplitEvaluator::new(&BuildConfig::default(), objects.len());
        match evaluator.evaluate(&objects, &aabb, &centroid_aabb) {
            SplitDecision::Split(candidate) => assert_eq!(candidate.left_count, 16),
            other => panic!("expected a split, got {:?}", other),
        }
    }

    #[test]
    fn test_overlapping_pair_is_not_worth_splitting() {
        let objects = vec![
            object(0, Vec3::ZERO, Vec3::splat(10.0)),
            object(1, Vec3::splat(0.5), Vec3::splat(10.0)),
        ];
        let (aabb, centroid_aabb) = bounds(&objects);
        let evaluator = SplitEvaluator::new(&BuildConfig::default(), objects.len());
        match evaluator.evaluate(&objects, &aabb, &centroid_aabb) {
            SplitDecision::NotBeneficial(candidate) => assert_eq!(candidate.left_count, 1),
            other => panic!("expected a non-beneficial candidate, got {:?}", other),
        }
    }
}
