use super::build_config::MAX_SUPPORTED_DEPTH;
use super::node::Node;
use super::ray::{Ray, TreeRay};
use super::tree::Tree;
use crate::utilities::BoundingBox;

/// Capacity of the fixed traversal stack. A push happens at most once per level.
pub const TRAVERSAL_STACK_CAPACITY: usize = MAX_SUPPORTED_DEPTH as usize + 1;

/// Tests rays against the primitives stored in leaves.
pub trait RayLeafTester {
    /// Intersects `ray` with `primitive`, returning the hit distance if it lies in `[min_t, max_t]`.
    ///
    /// In closest-hit mode `max_t` shrinks to the best hit found so far.
    fn test_primitive(&mut self, primitive: u32, ray: &Ray, min_t: f32, max_t: f32) -> Option<f32>;
}

impl<F> RayLeafTester for F
where
    F: FnMut(u32, &Ray, f32, f32) -> Option<f32>,
{
    #[inline(always)]
    fn test_primitive(&mut self, primitive: u32, ray: &Ray, min_t: f32, max_t: f32) -> Option<f32> {
        self(primitive, ray, min_t, max_t)
    }
}

/// A primitive hit by a ray and the ray parameter at the hit.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RayHit {
    pub primitive: u32,
    pub t: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TraversalMode {
    /// Find the nearest hit in the ray's interval.
    ClosestHit,
    /// Stop at the first hit found, wherever it is in the interval.
    AnyHit,
}

#[derive(Clone, Copy, Debug, Default)]
struct StackEntry {
    node_index: u32,
    t_min: f32,
    t_max: f32,
}

impl Tree {
    /// Intersects a child box with the ray, clipped to the interval `[t_min, t_max]`.
    #[inline(always)]
    fn intersects_ray(
        aabb: &BoundingBox,
        tree_ray: &TreeRay,
        t_min: f32,
        t_max: f32,
    ) -> Option<(f32, f32)> {
        let (near, far) = aabb.ray_aabb_trace(tree_ray.origin, tree_ray.recip_direction)?;
        let near = near.max(t_min);
        let far = far.min(t_max);
        if near <= far {
            Some((near, far))
        } else {
            None
        }
    }

    /// Finds the closest primitive hit along `ray` within `[ray.min_t, ray.max_t]`.
    pub fn closest_hit<T: RayLeafTester>(&self, ray: &Ray, leaf_tester: &mut T) -> Option<RayHit> {
        self.trace(ray, TraversalMode::ClosestHit, leaf_tester)
    }

    /// Finds any primitive hit along `ray` within `[ray.min_t, ray.max_t]`.
    pub fn any_hit<T: RayLeafTester>(&self, ray: &Ray, leaf_tester: &mut T) -> Option<RayHit> {
        self.trace(ray, TraversalMode::AnyHit, leaf_tester)
    }

    /// Walks the tree front to back along `ray`, testing the primitives of every leaf whose box
    /// the ray enters.
    ///
    /// Children are visited nearest entry first; the farther child waits on a fixed-size stack
    /// with its interval. In closest-hit mode any box entered beyond the best hit so far is
    /// skipped. A leaf whose primitives all miss does not end the walk.
    pub fn trace<T: RayLeafTester>(
        &self,
        ray: &Ray,
        mode: TraversalMode,
        leaf_tester: &mut T,
    ) -> Option<RayHit> {
        if self.is_empty() {
            return None;
        }
        let tree_ray = TreeRay::from_ray(ray);
        let (mut t_min, mut t_max) =
            Self::intersects_ray(self.root_aabb(), &tree_ray, tree_ray.min_t, tree_ray.max_t)?;

        let mut best: Option<RayHit> = None;
        let mut best_t = tree_ray.max_t;
        let mut stack = [StackEntry::default(); TRAVERSAL_STACK_CAPACITY];
        let mut stack_end = 0usize;
        let mut node_index = 0u32;

        loop {
            match *self.node(node_index) {
                Node::Leaf { .. } => {
                    for &primitive in self.leaf_primitives(self.node(node_index)) {
                        let Some(t) =
                            leaf_tester.test_primitive(primitive, ray, tree_ray.min_t, best_t)
                        else {
                            continue;
                        };
                        debug_assert!(
                            t >= tree_ray.min_t && t <= best_t,
                            "Leaf tester reported t = {t} outside of [{}, {best_t}].",
                            tree_ray.min_t
                        );
                        let hit = RayHit { primitive, t };
                        match mode {
                            TraversalMode::AnyHit => return Some(hit),
                            TraversalMode::ClosestHit => {
                                if best.is_none() || t < best_t {
                                    best_t = t;
                                    best = Some(hit);
                                }
                            }
                        }
                    }
                }
                Node::Interior {
                    left_aabb,
                    right_aabb,
                    left,
                    right,
                } => {
                    let limit = t_max.min(best_t);
                    let left_hit = Self::intersects_ray(&left_aabb, &tree_ray, t_min, limit);
                    let right_hit = Self::intersects_ray(&right_aabb, &tree_ray, t_min, limit);
                    let next = match (left_hit, right_hit) {
                        (Some(l), Some(r)) => {
                            // Visit the earlier box intersection first.
                            let ((near, near_interval), (far, far_interval)) = if l.0 <= r.0 {
                                ((left, l), (right, r))
                            } else {
                                ((right, r), (left, l))
                            };
                            debug_assert!(
                                stack_end < TRAVERSAL_STACK_CAPACITY,
                                "Fixed size stack overflow."
                            );
                            stack[stack_end] = StackEntry {
                                node_index: far,
                                t_min: far_interval.0,
                                t_max: far_interval.1,
                            };
                            stack_end += 1;
                            Some((near, near_interval))
                        }
                        (Some(l), None) => Some((left, l)),
                        (None, Some(r)) => Some((right, r)),
                        (None, None) => None,
                    };
                    if let Some((child, (near, far))) = next {
                        node_index = child;
                        t_min = near;
                        t_max = far;
                        continue;
                    }
                }
            }

            // Nothing to descend into; pull from the stack.
            loop {
                if stack_end == 0 {
                    return best;
                }
                stack_end -= 1;
                let entry = stack[stack_end];
                if entry.t_min > best_t {
                    continue;
                }
                node_index = entry.node_index;
                t_min = entry.t_min;
                t_max = entry.t_max.min(best_t);
                break;
            }
        }
    }
}
