use super::node::Node;
use super::split_evaluator::TRAVERSAL_COST;
use super::tree::Tree;
use crate::utilities::{BoundingBox, ContainmentType};

impl Tree {
    /// Visits every node reachable from the root, depth first, with the box the parent stores for
    /// it and its depth.
    fn walk_nodes(&self, mut visit: impl FnMut(u32, &Node, &BoundingBox, u32)) {
        let mut stack = vec![(0u32, *self.root_aabb(), 0u32)];
        while let Some((node_index, aabb, depth)) = stack.pop() {
            let node = self.node(node_index);
            visit(node_index, node, &aabb, depth);
            if let Node::Interior {
                left_aabb,
                right_aabb,
                left,
                right,
            } = *node
            {
                stack.push((right, right_aabb, depth + 1));
                stack.push((left, left_aabb, depth + 1));
            }
        }
    }

    /// Depth of the deepest leaf. The root has depth 0.
    pub fn max_depth(&self) -> u32 {
        let mut max_depth = 0;
        self.walk_nodes(|_, node, _, depth| {
            if node.is_leaf() {
                max_depth = max_depth.max(depth);
            }
        });
        max_depth
    }

    /// Surface area heuristic cost of the tree, normalized by the root's area. Lower is better.
    ///
    /// Interior nodes contribute `area * TRAVERSAL_COST`, leaves `area * count * intersection_cost`.
    pub fn sah_cost(&self, intersection_cost: f32) -> f32 {
        let root_area = self.root_aabb().get_half_surface_area();
        if root_area <= 0.0 {
            return 0.0;
        }
        let mut total_cost = 0.0f32;
        self.walk_nodes(|_, node, aabb, _| {
            let area = aabb.get_half_surface_area();
            total_cost += match *node {
                Node::Interior { .. } => area * TRAVERSAL_COST,
                Node::Leaf { count, .. } => area * count as f32 * intersection_cost,
            };
        });
        total_cost / root_area
    }

    /// Validates the tree structure, panicking on any inconsistency.
    ///
    /// Checks that the nodes form a single tree rooted at 0 with children after their parents,
    /// that child boxes lie inside their parent's box, that no node is deeper than the configured
    /// `max_depth` and no leaf holds more than `max_objects_per_leaf` primitives, that leaves
    /// partition the leaf index array, that the leaf index array is a permutation of the primitive
    /// indices, and that the build statistics agree with the structure.
    pub fn validate(&self) {
        let max_depth = self.config().max_depth;
        let max_objects_per_leaf = self.config().max_objects_per_leaf;
        let node_count = self.node_count();
        let primitive_count = self.primitive_count();
        assert!(node_count >= 1, "Tree has no root node.");
        if self.is_empty() {
            assert_eq!(node_count, 1, "Empty tree must be a single leaf.");
            assert_eq!(
                *self.root(),
                Node::Leaf {
                    offset: 0,
                    count: 0
                },
                "Empty tree root must be an empty leaf."
            );
            return;
        }

        let mut visited = vec![false; node_count];
        let mut index_slot_used = vec![false; primitive_count];
        let mut primitive_seen = vec![false; primitive_count];
        let mut leaf_count = 0u32;
        let mut interior_count = 0u32;
        let mut max_leaf_depth = 0u32;
        let mut max_leaf_size = 0u32;

        self.walk_nodes(|node_index, node, aabb, depth| {
            assert!(
                !visited[node_index as usize],
                "Node {node_index} is reachable more than once."
            );
            visited[node_index as usize] = true;
            assert!(
                depth <= max_depth,
                "Node {node_index} at depth {depth} is deeper than the maximum of {max_depth}."
            );
            assert!(
                aabb.is_finite() && !aabb.is_empty(),
                "Node {node_index} has a bad bounding box {}.",
                aabb.to_string()
            );

            match *node {
                Node::Interior {
                    left_aabb,
                    right_aabb,
                    left,
                    right,
                } => {
                    interior_count += 1;
                    for (child, child_aabb) in [(left, left_aabb), (right, right_aabb)] {
                        assert!(
                            child > node_index && (child as usize) < node_count,
                            "Child {child} of node {node_index} must lie in ({node_index}, {node_count})."
                        );
                        let containment = aabb.contains(&child_aabb);
                        assert_eq!(
                            containment,
                            ContainmentType::Contains,
                            "Node {node_index} box {} does not contain child {child} box {}.",
                            aabb.to_string(),
                            child_aabb.to_string()
                        );
                    }
                }
                Node::Leaf { offset, count } => {
                    leaf_count += 1;
                    max_leaf_depth = max_leaf_depth.max(depth);
                    max_leaf_size = max_leaf_size.max(count);
                    assert!(count > 0, "Leaf {node_index} holds no primitives.");
                    assert!(
                        count as usize <= max_objects_per_leaf,
                        "Leaf {node_index} holds {count} primitives, more than {max_objects_per_leaf}."
                    );
                    let end = offset as usize + count as usize;
                    assert!(
                        end <= primitive_count,
                        "Leaf {node_index} run {offset}..{end} is outside of {primitive_count}."
                    );
                    for slot in offset as usize..end {
                        assert!(
                            !index_slot_used[slot],
                            "Leaf index slot {slot} is shared by two leaves."
                        );
                        index_slot_used[slot] = true;
                        let primitive = self.leaf_indices()[slot] as usize;
                        assert!(
                            primitive < primitive_count,
                            "Leaf {node_index} references primitive {primitive} outside of {primitive_count}."
                        );
                        assert!(
                            !primitive_seen[primitive],
                            "Primitive {primitive} appears in more than one leaf."
                        );
                        primitive_seen[primitive] = true;
                    }
                }
            }
        });

        assert!(
            visited.iter().all(|&v| v),
            "Some nodes are not reachable from the root."
        );
        assert!(
            index_slot_used.iter().all(|&v| v),
            "Some leaf index slots are not referenced by any leaf."
        );

        let stats = self.stats();
        assert_eq!(stats.num_leaves, leaf_count, "Bad leaf count in stats.");
        assert_eq!(
            stats.num_interior_nodes, interior_count,
            "Bad interior node count in stats."
        );
        assert_eq!(
            stats.max_leaf_depth, max_leaf_depth,
            "Bad maximum leaf depth in stats."
        );
        assert_eq!(
            stats.max_num_objects_per_leaf, max_leaf_size,
            "Bad maximum leaf size in stats."
        );
    }

    /// Runs [`Tree::validate`] and additionally checks the boxes against the primitives they hold.
    ///
    /// Every primitive's box must lie inside the box of its leaf, and the root box must be exactly
    /// the union of all primitive boxes.
    pub fn validate_with_object_aabbs(&self, object_aabbs: &[BoundingBox]) {
        assert_eq!(
            object_aabbs.len(),
            self.primitive_count(),
            "Tree was built over a different number of objects."
        );
        self.validate();

        let mut union = BoundingBox::empty();
        for aabb in object_aabbs {
            union.enlarge_to_hold_bounding_box(aabb);
        }
        assert_eq!(
            union,
            *self.root_aabb(),
            "Root box is not the union of the object boxes."
        );

        self.walk_nodes(|node_index, node, aabb, _| {
            for &primitive in self.leaf_primitives(node) {
                let object_aabb = &object_aabbs[primitive as usize];
                assert_eq!(
                    aabb.contains(object_aabb),
                    ContainmentType::Contains,
                    "Leaf {node_index} box {} does not contain primitive {primitive} box {}.",
                    aabb.to_string(),
                    object_aabb.to_string()
                );
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::super::build_config::BuildConfig;
    use super::super::build_stats::{BuildStats, LeafReason};
    use super::*;
    use glam::Vec3;

    fn two_leaf_tree(right_aabb: BoundingBox) -> Tree {
        two_leaf_tree_with_config(right_aabb, BuildConfig::default())
    }

    fn two_leaf_tree_with_config(right_aabb: BoundingBox, config: BuildConfig) -> Tree {
        let left_aabb = BoundingBox::new(Vec3::ZERO, Vec3::ONE);
        let mut root_aabb = left_aabb;
        root_aabb.enlarge_to_hold_bounding_box(&right_aabb);
        let mut stats = BuildStats::default();
        stats.record_interior();
        stats.record_leaf(LeafReason::UnderThreshold, 1, 1);
        stats.record_leaf(LeafReason::UnderThreshold, 1, 1);
        Tree::new(
            root_aabb,
            vec![
                Node::Interior {
                    left_aabb,
                    right_aabb,
                    left: 1,
                    right: 2,
                },
                Node::Leaf {
                    offset: 0,
                    count: 1,
                },
                Node::Leaf {
                    offset: 1,
                    count: 1,
                },
            ],
            vec![1, 0],
            stats,
            config,
        )
    }

    #[test]
    fn test_valid_tree_passes() {
        let right = BoundingBox::new(Vec3::new(2.0, 0.0, 0.0), Vec3::new(3.0, 1.0, 1.0));
        let tree = two_leaf_tree(right);
        tree.validate();
        tree.validate_with_object_aabbs(&[right, BoundingBox::new(Vec3::ZERO, Vec3::ONE)]);
        assert_eq!(tree.max_depth(), 1);
    }

    #[test]
    #[should_panic(expected = "does not contain primitive")]
    fn test_misplaced_primitive_is_detected() {
        let right = BoundingBox::new(Vec3::new(2.0, 0.0, 0.0), Vec3::new(3.0, 1.0, 1.0));
        let tree = two_leaf_tree(right);
        // Primitive 1 is stored in the left leaf but lies in the right box.
        tree.validate_with_object_aabbs(&[BoundingBox::new(Vec3::ZERO, Vec3::ONE), right]);
    }

    #[test]
    fn test_sah_cost() {
        let right = BoundingBox::new(Vec3::new(2.0, 0.0, 0.0), Vec3::new(3.0, 1.0, 1.0));
        let tree = two_leaf_tree(right);
        // Root half area: 3 + 1 + 3 = 7. Leaves: 3 each.
        let expected = (7.0 + 3.0 + 3.0) / 7.0;
        assert!((tree.sah_cost(1.0) - expected).abs() < 1e-6);
        let empty = Tree::empty(BuildStats::default(), BuildConfig::default());
        assert_eq!(empty.sah_cost(1.0), 0.0);
    }

    #[test]
    #[should_panic(expected = "deeper than the maximum")]
    fn test_node_below_max_depth_is_detected() {
        let right = BoundingBox::new(Vec3::new(2.0, 0.0, 0.0), Vec3::new(3.0, 1.0, 1.0));
        let config = BuildConfig::default()
            .with_leaf_threshold(1)
            .with_max_objects_per_leaf(1)
            .with_max_depth(0);
        two_leaf_tree_with_config(right, config).validate();
    }

    #[test]
    #[should_panic(expected = "more than 1")]
    fn test_oversized_leaf_is_detected() {
        let aabb = BoundingBox::new(Vec3::ZERO, Vec3::ONE);
        let mut stats = BuildStats::default();
        stats.record_leaf(LeafReason::MaxDepth, 0, 2);
        let config = BuildConfig::default()
            .with_leaf_threshold(1)
            .with_max_objects_per_leaf(1);
        let tree = Tree::new(
            aabb,
            vec![Node::Leaf {
                offset: 0,
                count: 2,
            }],
            vec![0, 1],
            stats,
            config,
        );
        tree.validate();
    }
}
