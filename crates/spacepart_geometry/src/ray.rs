//! Representation of rays.

use crate::{
    AxisAlignedBox, Plane,
    num::{self, Float},
    triangle,
};
use nalgebra::{Point3, Vector3};
use num_traits::Signed;

/// A ray (or rather a line, since intersection tests do not restrict the ray
/// parameter to be non-negative) defined by an origin and a direction.
///
/// The ray caches the component-wise reciprocal of its direction along with
/// the sign of each reciprocal component, which is what the slab test against
/// axis-aligned boxes consumes. The cache is only updated through
/// [`Self::new`] and [`Self::set_direction`], so it always corresponds to the
/// current direction.
#[derive(Clone, Debug, PartialEq)]
pub struct Ray<F: Float> {
    origin: Point3<F>,
    direction: Vector3<F>,
    inverse_direction: Vector3<F>,
    signs: [usize; 3],
}

impl<F: Float> Ray<F> {
    /// Creates a new ray with the given origin and direction. The direction
    /// does not have to be normalized. Zero direction components give
    /// infinite reciprocal components.
    pub fn new(origin: Point3<F>, direction: Vector3<F>) -> Self {
        let (inverse_direction, signs) = Self::compute_inverse_direction_and_signs(&direction);
        Self {
            origin,
            direction,
            inverse_direction,
            signs,
        }
    }

    /// Returns the origin of the ray.
    pub fn origin(&self) -> &Point3<F> {
        &self.origin
    }

    /// Returns the direction of the ray.
    pub fn direction(&self) -> &Vector3<F> {
        &self.direction
    }

    /// Returns the component-wise reciprocal of the direction.
    pub fn inverse_direction(&self) -> &Vector3<F> {
        &self.inverse_direction
    }

    /// Returns, for each axis, 1 if the reciprocal direction component is
    /// negative and 0 otherwise.
    pub fn signs(&self) -> &[usize; 3] {
        &self.signs
    }

    /// Moves the origin of the ray to the given point.
    pub fn set_origin(&mut self, origin: Point3<F>) {
        self.origin = origin;
    }

    /// Changes the direction of the ray, updating the cached reciprocal
    /// direction and signs.
    pub fn set_direction(&mut self, direction: Vector3<F>) {
        let (inverse_direction, signs) = Self::compute_inverse_direction_and_signs(&direction);
        self.direction = direction;
        self.inverse_direction = inverse_direction;
        self.signs = signs;
    }

    /// Returns the point `origin + t * direction`.
    pub fn point_at(&self, t: F) -> Point3<F> {
        self.origin + self.direction * t
    }

    /// Whether the infinite line along the ray passes through the given
    /// axis-aligned box, using the slab method. Touching the boundary counts
    /// as an intersection.
    ///
    /// An origin lying exactly on a face of the box with a zero direction
    /// component along the face normal makes the slab interval computation
    /// produce `0 * inf`. Such an interval is treated as unbounded.
    pub fn intersects_axis_aligned_box(&self, aabb: &AxisAlignedBox<F>) -> bool {
        let mut t_min = F::NEG_INFINITY;
        let mut t_max = F::INFINITY;

        for dim in 0..3 {
            let sign = self.signs[dim];

            let mut t_near =
                (aabb.bound(sign)[dim] - self.origin[dim]) * self.inverse_direction[dim];
            let mut t_far =
                (aabb.bound(1 - sign)[dim] - self.origin[dim]) * self.inverse_direction[dim];

            if num::is_nan(t_near) {
                t_near = F::NEG_INFINITY;
            }
            if num::is_nan(t_far) {
                t_far = F::INFINITY;
            }

            // An interval ending at -inf or starting at +inf is empty, which
            // happens when the line runs parallel to the slab outside of it
            if t_far == F::NEG_INFINITY || t_near == F::INFINITY {
                return false;
            }

            if t_near > t_max || t_min > t_far {
                return false;
            }
            if t_near > t_min {
                t_min = t_near;
            }
            if t_far < t_max {
                t_max = t_far;
            }
        }

        true
    }

    /// Whether the infinite line along the ray passes through the triangle
    /// with the given vertices.
    pub fn intersects_triangle(&self, v0: &Point3<F>, v1: &Point3<F>, v2: &Point3<F>) -> bool {
        triangle::ray_triangle_intersection(v0, v1, v2, self).is_some()
    }

    /// Computes the point where the line along the ray crosses the given
    /// plane.
    ///
    /// # Returns
    /// The intersection point and the corresponding ray parameter, or `None`
    /// if the ray is parallel to the plane.
    pub fn intersection_with_plane(&self, plane: &Plane<F>) -> Option<(Point3<F>, F)> {
        let normal_dot_direction = plane.normal().dot(&self.direction);

        if <F as Signed>::abs(&normal_dot_direction) < F::INTERSECTION_EPSILON {
            return None;
        }

        let t = -plane.signed_distance(&self.origin) / normal_dot_direction;

        Some((self.point_at(t), t))
    }

    fn compute_inverse_direction_and_signs(direction: &Vector3<F>) -> (Vector3<F>, [usize; 3]) {
        let inverse_direction = direction.map(|component| F::ONE / component);
        let signs = [0, 1, 2].map(|dim| usize::from(inverse_direction[dim] < F::ZERO));
        (inverse_direction, signs)
    }
}
