use glam::Vec3;

/// Stand-in for an infinite reciprocal direction component.
///
/// Keeping the reciprocal finite means a slab test on an axis the ray is parallel to yields
/// large finite distances instead of `0 * inf = NaN` when the origin lies on the slab.
pub const RECIP_DIRECTION_SENTINEL: f32 = 1.0e30;

/// A ray with the parametric interval `[min_t, max_t]` in which hits are accepted.
///
/// The direction does not need to be normalized; distances are in units of its length.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
    pub min_t: f32,
    pub max_t: f32,
}

impl Ray {
    /// A ray accepting hits anywhere in front of its origin.
    #[inline]
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self::with_interval(origin, direction, 0.0, f32::INFINITY)
    }

    #[inline]
    pub fn with_interval(origin: Vec3, direction: Vec3, min_t: f32, max_t: f32) -> Self {
        Self {
            origin,
            direction,
            min_t,
            max_t,
        }
    }
}

/// Ray data prepared for repeated box tests.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TreeRay {
    pub origin: Vec3,
    /// Componentwise `1 / direction`, with infinities replaced by the signed sentinel.
    pub recip_direction: Vec3,
    pub min_t: f32,
    pub max_t: f32,
}

#[inline(always)]
fn finite_reciprocal(component: f32) -> f32 {
    let recip = 1.0 / component;
    if recip.is_infinite() {
        // The sign of a zero component carries through, so -0.0 maps to -sentinel.
        RECIP_DIRECTION_SENTINEL.copysign(recip)
    } else {
        recip
    }
}

impl TreeRay {
    #[inline]
    pub fn new(origin: Vec3, direction: Vec3, min_t: f32, max_t: f32) -> Self {
        Self {
            origin,
            recip_direction: Vec3::new(
                finite_reciprocal(direction.x),
                finite_reciprocal(direction.y),
                finite_reciprocal(direction.z),
            ),
            min_t,
            max_t,
        }
    }

    #[inline]
    pub fn from_ray(ray: &Ray) -> Self {
        Self::new(ray.origin, ray.direction, ray.min_t, ray.max_t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recip_direction_is_finite_and_signed() {
        let ray = TreeRay::new(Vec3::ZERO, Vec3::new(2.0, 0.0, -0.0), 0.0, 1.0);
        assert_eq!(ray.recip_direction.x, 0.5);
        assert_eq!(ray.recip_direction.y, RECIP_DIRECTION_SENTINEL);
        assert_eq!(ray.recip_direction.z, -RECIP_DIRECTION_SENTINEL);
    }

    #[test]
    fn test_from_ray_keeps_interval() {
        let ray = Ray::with_interval(Vec3::ONE, Vec3::Z, 0.5, 4.0);
        let tree_ray = TreeRay::from_ray(&ray);
        assert_eq!(tree_ray.origin, Vec3::ONE);
        assert_eq!(tree_ray.min_t, 0.5);
        assert_eq!(tree_ray.max_t, 4.0);
    }
}
