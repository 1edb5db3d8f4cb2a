//! Representation of axis-aligned boxes.

use crate::{Point, num::Float};
use approx::AbsDiffEq;
use nalgebra::{self as na, Point3, Vector3, point};

use Corner::{Lower, Upper};

/// A box with orientation aligned with the coordinate system axes. The width,
/// height and depth axes are aligned with the x-, y- and z-axis respectively.
///
/// A box whose lower corner exceeds its upper corner along any axis is empty.
/// The canonical empty box from [`Self::empty`] has infinite corners of the
/// "wrong" sign, so that growing it by a point or box yields exactly the
/// bounds of that point or box.
#[derive(Clone, Debug, PartialEq)]
pub struct AxisAlignedBox<F: Float> {
    corners: [Point3<F>; 2],
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Corner {
    Lower = 0,
    Upper = 1,
}

const ALL_CORNER_COMPONENTS: [[Corner; 3]; 8] = [
    [Lower, Lower, Lower],
    [Lower, Lower, Upper],
    [Lower, Upper, Lower],
    [Lower, Upper, Upper],
    [Upper, Lower, Lower],
    [Upper, Lower, Upper],
    [Upper, Upper, Lower],
    [Upper, Upper, Upper],
];

impl<F: Float> AxisAlignedBox<F> {
    /// Creates a new box with the given lower and upper corner points.
    pub fn new(lower_corner: Point3<F>, upper_corner: Point3<F>) -> Self {
        Self {
            corners: [lower_corner, upper_corner],
        }
    }

    /// Creates an empty box, with the lower corner at positive infinity and
    /// the upper corner at negative infinity.
    pub fn empty() -> Self {
        Self::new(
            point![F::INFINITY, F::INFINITY, F::INFINITY],
            point![F::NEG_INFINITY, F::NEG_INFINITY, F::NEG_INFINITY],
        )
    }

    /// Creates the box centered on the given point with the given full extent
    /// along each axis.
    pub fn centered_with_extents(center: &Point3<F>, extents: &Vector3<F>) -> Self {
        let half_extents = extents * F::HALF;
        Self::new(center - half_extents, center + half_extents)
    }

    /// Creates the axis-aligned bounding box for the set of points in the given
    /// slice. The box is empty if the slice is.
    pub fn aabb_for_points(points: &[impl Point<F>]) -> Self {
        let mut aabb = Self::empty();
        for point in points {
            aabb.grow_to_include_point(point.point());
        }
        aabb
    }

    /// Creates the axis-aligned box bounding both the given axis-aligned boxes.
    pub fn aabb_from_pair(aabb_1: &Self, aabb_2: &Self) -> Self {
        Self::new(
            aabb_1.lower_corner().inf(aabb_2.lower_corner()),
            aabb_1.upper_corner().sup(aabb_2.upper_corner()),
        )
    }

    /// Returns a reference to the lower corner of the box.
    pub fn lower_corner(&self) -> &Point3<F> {
        &self.corners[0]
    }

    /// Returns a reference to the upper corner of the box.
    pub fn upper_corner(&self) -> &Point3<F> {
        &self.corners[1]
    }

    /// Returns the lower corner if `idx` is 0 and the upper corner if it is 1.
    ///
    /// # Panics
    /// If the given index exceeds 1.
    pub fn bound(&self, idx: usize) -> &Point3<F> {
        &self.corners[idx]
    }

    /// Whether the box has a negative extent along any axis.
    pub fn is_empty(&self) -> bool {
        (0..3).any(|dim| self.corners[0][dim] > self.corners[1][dim])
    }

    /// Calculates and returns the center point of the box.
    pub fn center(&self) -> Point3<F> {
        na::center(self.lower_corner(), self.upper_corner())
    }

    /// Returns the extent of the box along each axis.
    pub fn extents(&self) -> Vector3<F> {
        self.upper_corner() - self.lower_corner()
    }

    /// Returns half the extent of the box along each axis.
    pub fn half_extents(&self) -> Vector3<F> {
        self.extents() * F::HALF
    }

    /// Returns half the length of the box diagonal, which is the radius of the
    /// smallest sphere centered on the box that encloses it.
    pub fn half_diagonal_length(&self) -> F {
        self.extents().norm() * F::HALF
    }

    /// Returns the box corner with the given index. The corners are ordered
    /// from smaller to larger coordinates, with the z-component varying
    /// fastest.
    ///
    /// # Panics
    /// If the given index exceeds 7.
    pub fn corner(&self, corner_idx: usize) -> Point3<F> {
        let corner_components = &ALL_CORNER_COMPONENTS[corner_idx];
        point![
            self.corners[corner_components[0] as usize].x,
            self.corners[corner_components[1] as usize].y,
            self.corners[corner_components[2] as usize].z
        ]
    }

    /// Returns all eight corners of the box in the order of [`Self::corner`].
    pub fn all_corners(&self) -> [Point3<F>; 8] {
        std::array::from_fn(|idx| self.corner(idx))
    }

    /// Extends the box just enough to include the given point.
    pub fn grow_to_include_point(&mut self, point: &Point3<F>) {
        self.corners[0] = self.corners[0].inf(point);
        self.corners[1] = self.corners[1].sup(point);
    }

    /// Extends the box just enough to include the given box.
    pub fn grow_to_include_box(&mut self, other: &Self) {
        self.corners[0] = self.corners[0].inf(other.lower_corner());
        self.corners[1] = self.corners[1].sup(other.upper_corner());
    }

    /// Whether the given point lies inside the box. Points on the boundary
    /// are considered inside.
    pub fn contains_point(&self, point: &Point3<F>) -> bool {
        (0..3).all(|dim| self.corners[0][dim] <= point[dim] && point[dim] <= self.corners[1][dim])
    }

    /// Whether all of the given box lies inside this box. A box is considered
    /// to contain itself.
    pub fn contains_box(&self, other: &Self) -> bool {
        self.contains_point(other.lower_corner()) && self.contains_point(other.upper_corner())
    }

    /// Whether all of the given axis-aligned box is outside this box. If the
    /// boundaries exactly touch each other, the box is considered inside.
    pub fn box_lies_outside(&self, other: &Self) -> bool {
        !((self.lower_corner().x <= other.upper_corner().x
            && self.upper_corner().x >= other.lower_corner().x)
            && (self.lower_corner().y <= other.upper_corner().y
                && self.upper_corner().y >= other.lower_corner().y)
            && (self.lower_corner().z <= other.upper_corner().z
                && self.upper_corner().z >= other.lower_corner().z))
    }

    /// Computes the box resulting from translating this box by the given
    /// displacement.
    pub fn translated(&self, displacement: &Vector3<F>) -> Self {
        Self::new(
            self.lower_corner() + displacement,
            self.upper_corner() + displacement,
        )
    }
}

impl<F: Float> AbsDiffEq for AxisAlignedBox<F> {
    type Epsilon = F;

    fn default_epsilon() -> F {
        F::default_epsilon()
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: F) -> bool {
        self.lower_corner()
            .abs_diff_eq(other.lower_corner(), epsilon)
            && self
                .upper_corner()
                .abs_diff_eq(other.upper_corner(), epsilon)
    }
}
