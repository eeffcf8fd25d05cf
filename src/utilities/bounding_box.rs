use glam::Vec3;

use super::containment_type::ContainmentType;

/// Provides simple axis-aligned bounding box functionality.
///
/// An "empty" box has `min = +inf` and `max = -inf` on every axis. It is the identity for
/// [`BoundingBox::enlarge_to_hold_bounding_box`], so folds over boxes can start from it.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    /// Location with the lowest X, Y, and Z coordinates in the axis-aligned bounding box.
    pub min: Vec3,
    /// Location with the highest X, Y, and Z coordinates in the axis-aligned bounding box.
    pub max: Vec3,
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::empty()
    }
}

impl BoundingBox {
    /// Constructs a bounding box from the specified minimum and maximum.
    #[inline]
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Returns the empty bounding box, `(+inf, -inf)` as `(min, max)`.
    #[inline]
    pub fn empty() -> Self {
        Self {
            min: Vec3::splat(f32::INFINITY),
            max: Vec3::splat(f32::NEG_INFINITY),
        }
    }

    /// Constructs a degenerate bounding box holding a single point.
    #[inline]
    pub fn from_point(point: Vec3) -> Self {
        Self {
            min: point,
            max: point,
        }
    }

    /// Creates the smallest possible bounding box that contains a list of points.
    /// Returns the empty box for an empty list.
    pub fn from_points(points: &[Vec3]) -> Self {
        let mut bounds = Self::empty();
        for point in points {
            bounds.enlarge_to_hold_point(*point);
        }
        bounds
    }

    /// True if the box holds no point at all, i.e. `min > max` on some axis.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.min.cmpgt(self.max).any()
    }

    /// True if every bound is a finite number.
    #[inline]
    pub fn is_finite(&self) -> bool {
        self.min.is_finite() && self.max.is_finite()
    }

    /// Grows the box so that it contains `point`.
    #[inline(always)]
    pub fn enlarge_to_hold_point(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    /// Grows the box so that it contains `other`. Componentwise min/max merge.
    #[inline(always)]
    pub fn enlarge_to_hold_bounding_box(&mut self, other: &BoundingBox) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    /// Determines if a bounding box intersects another bounding box.
    /// Touching boxes count as intersecting.
    #[inline]
    pub fn intersects(a: &Self, b: &Self) -> bool {
        Self::intersects_bounds(a.min, a.max, b.min, b.max)
    }

    /// Determines if a bounding box intersects another bounding box.
    #[inline]
    pub fn intersects_bounds(min_a: Vec3, max_a: Vec3, min_b: Vec3, max_b: Vec3) -> bool {
        let no_intersection_on_axes = max_a.cmplt(min_b) | max_b.cmplt(min_a);
        !no_intersection_on_axes.any()
    }

    /// Determines if two bounding boxes share no point.
    #[inline]
    pub fn disjoint(a: &Self, b: &Self) -> bool {
        !Self::intersects(a, b)
    }

    /// Classifies how `other` relates to this box. Touching boxes intersect.
    #[inline]
    pub fn contains(&self, other: &BoundingBox) -> ContainmentType {
        if Self::disjoint(self, other) {
            ContainmentType::Disjoint
        } else if self.contains_bounding_box(other) {
            ContainmentType::Contains
        } else {
            ContainmentType::Intersects
        }
    }

    /// True if `other` lies entirely inside this box. The empty box is contained by every box.
    #[inline]
    pub fn contains_bounding_box(&self, other: &BoundingBox) -> bool {
        other.is_empty() || (self.min.cmple(other.min).all() && self.max.cmpge(other.max).all())
    }

    /// Midpoint of the box.
    #[inline(always)]
    pub fn centroid(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Length of the box along `axis` (0 = X, 1 = Y, 2 = Z).
    #[inline]
    pub fn axis_length(&self, axis: usize) -> f32 {
        self.max[axis] - self.min[axis]
    }

    /// Surface area of the box, `2 * (dx*dy + dy*dz + dz*dx)`. Zero for the empty box.
    #[inline(always)]
    pub fn get_surface_area(&self) -> f32 {
        2.0 * self.get_half_surface_area()
    }

    /// Half of the surface area. Sufficient wherever only ratios of areas matter.
    #[inline(always)]
    pub fn get_half_surface_area(&self) -> f32 {
        if self.is_empty() {
            return 0.0;
        }
        let offset = self.max - self.min;
        offset.x * offset.y + offset.y * offset.z + offset.z * offset.x
    }

    /// Intersects a ray with the box using the slab test.
    ///
    /// `recip_direction` must come from [`TreeRay`](crate::trees::TreeRay), which never holds an
    /// infinite component. Per axis the two slab distances are ordered with min/max rather than by
    /// branching on the direction's sign, then reduced across axes with max-of-mins and
    /// min-of-maxes. Returns `(near_t, far_t)` when `far_t >= 0` and `far_t >= near_t`.
    /// `near_t` may be negative if the origin is inside the box.
    #[inline(always)]
    pub fn ray_aabb_trace(&self, origin: Vec3, recip_direction: Vec3) -> Option<(f32, f32)> {
        let t0 = (self.min - origin) * recip_direction;
        let t1 = (self.max - origin) * recip_direction;
        let near_t = t0.min(t1).max_element();
        let far_t = t0.max(t1).min_element();
        if far_t >= 0.0 && far_t >= near_t {
            Some((near_t, far_t))
        } else {
            None
        }
    }

    /// Creates a string representation of the bounding box.
    pub fn to_string(&self) -> String {
        format!("({}, {})", self.min, self.max)
    }
}
