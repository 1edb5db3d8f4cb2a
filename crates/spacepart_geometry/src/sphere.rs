//! Representation of spheres.

use crate::{AxisAlignedBox, num::Float};
use nalgebra::{self as na, Point3};

/// A sphere represented by the center point and the radius.
#[derive(Clone, Debug, PartialEq)]
pub struct Sphere<F: Float> {
    center: Point3<F>,
    radius: F,
}

impl<F: Float> Sphere<F> {
    /// Creates a new sphere with the given center and radius.
    ///
    /// # Panics
    /// If `radius` is negative.
    pub fn new(center: Point3<F>, radius: F) -> Self {
        assert!(radius >= F::ZERO);
        Self { center, radius }
    }

    /// Creates the sphere centered on the given box that just encloses it.
    pub fn bounding_axis_aligned_box(aabb: &AxisAlignedBox<F>) -> Self {
        Self::new(aabb.center(), aabb.half_diagonal_length())
    }

    /// Returns the center point of the sphere.
    pub fn center(&self) -> &Point3<F> {
        &self.center
    }

    /// Returns the radius of the sphere.
    pub fn radius(&self) -> F {
        self.radius
    }

    /// Returns the square of the radius of the sphere.
    pub fn radius_squared(&self) -> F {
        self.radius * self.radius
    }

    /// Whether the given point is inside the sphere. Points on the surface
    /// are considered inside.
    pub fn contains_point(&self, point: &Point3<F>) -> bool {
        na::distance_squared(&self.center, point) <= self.radius_squared()
    }
}
