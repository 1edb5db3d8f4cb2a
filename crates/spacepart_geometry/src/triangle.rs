//! Intersection of rays with triangles.

use crate::{Ray, num::Float};
use nalgebra::Point3;
use num_traits::Signed;

/// Where a ray crosses a triangle.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RayTriangleHit<F: Float> {
    /// Ray parameter of the crossing point. May be negative, since the whole
    /// line along the ray is tested.
    pub t: F,
    /// Barycentric weight of the second vertex.
    pub u: F,
    /// Barycentric weight of the third vertex.
    pub v: F,
}

/// Finds where the line along the given ray crosses the triangle with vertices
/// `v0`, `v1` and `v2`, using the Möller-Trumbore algorithm.
///
/// Both triangle faces are tested. Triangles nearly parallel to the ray
/// (determinant magnitude below [`Float::INTERSECTION_EPSILON`]) are treated
/// as missed, as are degenerate triangles.
///
/// # Returns
/// The ray parameter and barycentric coordinates of the crossing, or `None`
/// if there is no crossing.
pub fn ray_triangle_intersection<F: Float>(
    v0: &Point3<F>,
    v1: &Point3<F>,
    v2: &Point3<F>,
    ray: &Ray<F>,
) -> Option<RayTriangleHit<F>> {
    let edge_1 = v1 - v0;
    let edge_2 = v2 - v0;

    let p = ray.direction().cross(&edge_2);
    let determinant = edge_1.dot(&p);

    if <F as Signed>::abs(&determinant) < F::INTERSECTION_EPSILON {
        return None;
    }
    let inverse_determinant = F::ONE / determinant;

    let s = ray.origin() - v0;
    let u = s.dot(&p) * inverse_determinant;
    if u < F::ZERO || u > F::ONE {
        return None;
    }

    let q = s.cross(&edge_1);
    let v = ray.direction().dot(&q) * inverse_determinant;
    if v < F::ZERO || u + v > F::ONE {
        return None;
    }

    let t = edge_2.dot(&q) * inverse_determinant;

    Some(RayTriangleHit { t, u, v })
}
