//! Geometrical objects and intersection predicates.

mod axis_aligned_box;
mod frustum;
mod plane;
mod ray;
mod sphere;
mod triangle;

pub mod num;

pub use axis_aligned_box::AxisAlignedBox;
pub use frustum::{Frustum, FrustumSide, combined_clip_transform};
pub use plane::{Plane, PlaneSide};
pub use ray::Ray;
pub use sphere::Sphere;
pub use triangle::{RayTriangleHit, ray_triangle_intersection};

use nalgebra::Point3;
use num::Float;

/// Anything that represents a 3D point.
pub trait Point<F: Float> {
    /// Returns a reference to the point.
    fn point(&self) -> &Point3<F>;
}

impl<F: Float> Point<F> for Point3<F> {
    fn point(&self) -> &Point3<F> {
        self
    }
}
