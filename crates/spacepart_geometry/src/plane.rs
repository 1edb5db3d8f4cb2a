//! Representation of planes.

use crate::{Ray, num::Float};
use approx::AbsDiffEq;
use nalgebra::{Point3, Vector3, vector};
use num_traits::Signed;

/// A plane in 3D, represented by a normal vector `n` and a displacement `D`
/// such that every point `p` in the plane satisfies `n.dot(p) = D`.
///
/// The normal is not required to have unit length. The signed distance
/// computed by [`Self::signed_distance`] is only a true Euclidean distance
/// once the plane has been normalized.
///
/// The plane divides space into two halfspaces, the positive and negative
/// halfspace. The positive one is defined as the halfspace the normal is
/// pointing into.
#[derive(Clone, Debug, PartialEq)]
pub struct Plane<F: Float> {
    normal: Vector3<F>,
    displacement: F,
}

/// Which side of a plane a point lies on.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PlaneSide {
    /// The point lies strictly in the positive halfspace.
    Positive,
    /// The point lies strictly in the negative halfspace.
    Negative,
    /// The point lies exactly in the plane.
    On,
}

impl<F: Float> Plane<F> {
    /// Creates a new plane defined by the given normal vector and
    /// displacement.
    pub fn new(normal: Vector3<F>, displacement: F) -> Self {
        Self {
            normal,
            displacement,
        }
    }

    /// Creates a new plane defined by the given normal vector and point in the
    /// plane.
    pub fn from_normal_and_point(normal: Vector3<F>, point_in_plane: &Point3<F>) -> Self {
        let displacement = normal.dot(&point_in_plane.coords);
        Self::new(normal, displacement)
    }

    /// Creates the plane whose positive halfspace consists of the points
    /// satisfying `a*x + b*y + c*z + d >= 0`. This is the form in which clip
    /// planes come out of a clip space transform.
    pub fn from_unnormalized_coefficients(a: F, b: F, c: F, d: F) -> Self {
        Self::new(vector![a, b, c], -d)
    }

    /// Returns the normal vector of the plane.
    pub fn normal(&self) -> &Vector3<F> {
        &self.normal
    }

    /// Returns the displacement of the plane.
    pub fn displacement(&self) -> F {
        self.displacement
    }

    /// Scales the normal to unit length, scaling the displacement by the same
    /// factor so that the plane stays the same. A plane with a zero normal is
    /// left unchanged.
    pub fn normalize(&mut self) {
        let magnitude = self.normal.norm();
        if magnitude > F::ZERO {
            self.normal /= magnitude;
            self.displacement /= magnitude;
        }
    }

    /// Returns a normalized copy of the plane.
    pub fn normalized(&self) -> Self {
        let mut plane = self.clone();
        plane.normalize();
        plane
    }

    /// Computes the signed distance from the plane to the given point, scaled
    /// by the length of the normal. If the signed distance is negative, the
    /// point lies in the negative halfspace of the plane.
    pub fn signed_distance(&self, point: &Point3<F>) -> F {
        self.normal.dot(&point.coords) - self.displacement
    }

    /// Determines which side of the plane the given point lies on.
    pub fn side_of_point(&self, point: &Point3<F>) -> PlaneSide {
        let signed_distance = self.signed_distance(point);
        if signed_distance > F::ZERO {
            PlaneSide::Positive
        } else if signed_distance < F::ZERO {
            PlaneSide::Negative
        } else {
            PlaneSide::On
        }
    }

    /// Computes the line along which this plane intersects the given plane,
    /// returned as a ray whose direction is the cross product of the two
    /// normals.
    ///
    /// # Returns
    /// `None` if the planes are parallel.
    pub fn intersection_line(&self, other: &Self) -> Option<Ray<F>> {
        let direction = self.normal.cross(&other.normal);
        let determinant = direction.norm_squared();

        if <F as Signed>::abs(&determinant) < F::INTERSECTION_EPSILON {
            return None;
        }

        let n1_dot_n1 = self.normal.norm_squared();
        let n2_dot_n2 = other.normal.norm_squared();
        let n1_dot_n2 = self.normal.dot(&other.normal);

        let c1 = (self.displacement * n2_dot_n2 - other.displacement * n1_dot_n2) / determinant;
        let c2 = (other.displacement * n1_dot_n1 - self.displacement * n1_dot_n2) / determinant;

        let origin = Point3::from(self.normal * c1 + other.normal * c2);

        Some(Ray::new(origin, direction))
    }
}

impl<F: Float> AbsDiffEq for Plane<F> {
    type Epsilon = F;

    fn default_epsilon() -> F {
        F::default_epsilon()
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: F) -> bool {
        self.normal.abs_diff_eq(&other.normal, epsilon)
            && self.displacement.abs_diff_eq(&other.displacement, epsilon)
    }
}
