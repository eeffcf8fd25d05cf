//! Triangle scenes and linear-scan references for the tree tests.

use glam::Vec3;
use rand::Rng;

use super::ray::Ray;
use super::tree_ray_cast::{RayHit, RayLeafTester};
use crate::utilities::BoundingBox;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Triangle {
    pub a: Vec3,
    pub b: Vec3,
    pub c: Vec3,
}

impl Triangle {
    pub fn new(a: Vec3, b: Vec3, c: Vec3) -> Self {
        Self { a, b, c }
    }

    pub fn aabb(&self) -> BoundingBox {
        BoundingBox::from_points(&[self.a, self.b, self.c])
    }

    /// Möller–Trumbore ray/triangle test. Returns `t` if the hit lies in `[min_t, max_t]`.
    pub fn intersect(&self, ray: &Ray, min_t: f32, max_t: f32) -> Option<f32> {
        let edge1 = self.b - self.a;
        let edge2 = self.c - self.a;
        let p = ray.direction.cross(edge2);
        let det = edge1.dot(p);
        if det.abs() <= 1e-10 {
            return None;
        }
        let inv_det = 1.0 / det;
        let s = ray.origin - self.a;
        let u = s.dot(p) * inv_det;
        if !(0.0..=1.0).contains(&u) {
            return None;
        }
        let q = s.cross(edge1);
        let v = ray.direction.dot(q) * inv_det;
        if v < 0.0 || u + v > 1.0 {
            return None;
        }
        let t = edge2.dot(q) * inv_det;
        if t >= min_t && t <= max_t {
            Some(t)
        } else {
            None
        }
    }
}

pub struct TriangleTester<'a> {
    triangles: &'a [Triangle],
}

impl<'a> TriangleTester<'a> {
    pub fn new(triangles: &'a [Triangle]) -> Self {
        Self { triangles }
    }
}

impl RayLeafTester for TriangleTester<'_> {
    fn test_primitive(&mut self, primitive: u32, ray: &Ray, min_t: f32, max_t: f32) -> Option<f32> {
        self.triangles[primitive as usize].intersect(ray, min_t, max_t)
    }
}

pub fn brute_force_closest_hit(triangles: &[Triangle], ray: &Ray) -> Option<RayHit> {
    let mut best: Option<RayHit> = None;
    for (i, triangle) in triangles.iter().enumerate() {
        if let Some(t) = triangle.intersect(ray, ray.min_t, ray.max_t) {
            if best.map_or(true, |b| t < b.t) {
                best = Some(RayHit {
                    primitive: i as u32,
                    t,
                });
            }
        }
    }
    best
}

pub fn brute_force_any_hit(triangles: &[Triangle], ray: &Ray) -> bool {
    triangles
        .iter()
        .any(|triangle| triangle.intersect(ray, ray.min_t, ray.max_t).is_some())
}

fn random_point(rng: &mut impl Rng, extent: f32) -> Vec3 {
    Vec3::new(
        rng.gen_range(-extent..extent),
        rng.gen_range(-extent..extent),
        rng.gen_range(-extent..extent),
    )
}

/// Small triangles scattered through a 20 unit cube around the origin.
pub fn random_triangles(rng: &mut impl Rng, count: usize) -> Vec<Triangle> {
    (0..count)
        .map(|_| {
            let center = random_point(rng, 10.0);
            Triangle::new(
                center + random_point(rng, 1.5),
                center + random_point(rng, 1.5),
                center + random_point(rng, 1.5),
            )
        })
        .collect()
}

/// Boxes of varying size scattered through a 200 unit cube.
pub fn random_boxes(rng: &mut impl Rng, count: usize) -> Vec<BoundingBox> {
    (0..count)
        .map(|_| {
            let min = random_point(rng, 100.0);
            let size = Vec3::new(
                rng.gen_range(0.0..5.0),
                rng.gen_range(0.0..5.0),
                rng.gen_range(0.0..5.0),
            );
            BoundingBox::new(min, min + size)
        })
        .collect()
}

/// A ray from outside the triangle scene aimed at a random point inside it. Some rays get a
/// clipped interval.
pub fn random_ray(rng: &mut impl Rng) -> Ray {
    let origin = random_point(rng, 1.0).normalize_or_zero() * 25.0 + random_point(rng, 0.1);
    let target = random_point(rng, 10.0);
    let direction = target - origin;
    if rng.gen_bool(0.25) {
        let min_t = rng.gen_range(0.0..0.5);
        let max_t = rng.gen_range(min_t..1.5);
        Ray::with_interval(origin, direction, min_t, max_t)
    } else {
        Ray::new(origin, direction)
    }
}
