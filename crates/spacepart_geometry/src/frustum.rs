//! Representation of frustums.

use crate::{AxisAlignedBox, Plane, Sphere, num::Float};
use approx::AbsDiffEq;
use nalgebra::{Matrix4, Point3, Vector3};

/// A frustum, which in general is a pyramid truncated at the top. It is here
/// represented by the six planes making up the faces of the truncated pyramid.
///
/// The planes are normalized and created in such a way that their negative
/// halfspaces correspond to the space outside the frustum.
#[derive(Clone, Debug, PartialEq)]
pub struct Frustum<F: Float> {
    planes: [Plane<F>; 6],
    transform_matrix: Matrix4<F>,
}

/// The faces of a frustum, in the order their planes are stored.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum FrustumSide {
    Right = 0,
    Left = 1,
    Bottom = 2,
    Top = 3,
    /// The far plane.
    Back = 4,
    /// The near plane.
    Front = 5,
}

impl FrustumSide {
    pub const ALL: [Self; 6] = [
        Self::Right,
        Self::Left,
        Self::Bottom,
        Self::Top,
        Self::Back,
        Self::Front,
    ];
}

/// Combines the given projection and view matrices into the single matrix
/// transforming world space points into clip space.
///
/// Matrices act on column vectors, so the view transform is applied first and
/// the product is `projection * view`.
pub fn combined_clip_transform<F: Float>(
    projection: &Matrix4<F>,
    view: &Matrix4<F>,
) -> Matrix4<F> {
    projection * view
}

impl<F: Float> Frustum<F> {
    /// Creates the frustum representing the clip space of the given transform
    /// matrix, with clip space spanning from -w to w along every axis.
    ///
    /// This function uses the method of Gribb and Hartmann (2001)
    /// "Fast Extraction of Viewing Frustum Planes from the
    /// World-View-Projection Matrix". A degenerate matrix gives meaningless
    /// planes rather than an error.
    pub fn from_transform_matrix(transform_matrix: Matrix4<F>) -> Self {
        Self {
            planes: Self::planes_from_transform_matrix(&transform_matrix),
            transform_matrix,
        }
    }

    /// Creates the frustum seen through the given projection from a camera
    /// with the given view transform.
    pub fn from_projection_and_view(projection: &Matrix4<F>, view: &Matrix4<F>) -> Self {
        Self::from_transform_matrix(combined_clip_transform(projection, view))
    }

    /// Creates the frustum representing the clip space of the identity
    /// transform, which is the cube spanning from -1 to 1 in each dimension.
    pub fn for_identity_transform() -> Self {
        Self::from_transform_matrix(Matrix4::identity())
    }

    /// Recomputes the planes for the given projection and view transforms.
    pub fn update(&mut self, projection: &Matrix4<F>, view: &Matrix4<F>) {
        self.transform_matrix = combined_clip_transform(projection, view);
        self.planes = Self::planes_from_transform_matrix(&self.transform_matrix);
    }

    /// Returns the plane defining the given face of the frustum.
    pub fn plane(&self, side: FrustumSide) -> &Plane<F> {
        &self.planes[side as usize]
    }

    /// Returns all six planes, indexed by [`FrustumSide`].
    pub fn planes(&self) -> &[Plane<F>; 6] {
        &self.planes
    }

    /// Returns the plane defining the right face of the frustum.
    pub fn right_plane(&self) -> &Plane<F> {
        self.plane(FrustumSide::Right)
    }

    /// Returns the plane defining the left face of the frustum.
    pub fn left_plane(&self) -> &Plane<F> {
        self.plane(FrustumSide::Left)
    }

    /// Returns the plane defining the bottom face of the frustum.
    pub fn bottom_plane(&self) -> &Plane<F> {
        self.plane(FrustumSide::Bottom)
    }

    /// Returns the plane defining the top face of the frustum.
    pub fn top_plane(&self) -> &Plane<F> {
        self.plane(FrustumSide::Top)
    }

    /// Returns the far plane of the frustum.
    pub fn back_plane(&self) -> &Plane<F> {
        self.plane(FrustumSide::Back)
    }

    /// Returns the near plane of the frustum.
    pub fn front_plane(&self) -> &Plane<F> {
        self.plane(FrustumSide::Front)
    }

    /// Returns the matrix of the transform into the clip space that this
    /// frustum represents.
    pub fn transform_matrix(&self) -> &Matrix4<F> {
        &self.transform_matrix
    }

    /// Whether the given point is inside the frustum. Points on the boundary
    /// are considered inside.
    pub fn contains_point(&self, point: &Point3<F>) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.signed_distance(point) >= F::ZERO)
    }

    /// Whether any of the given points is inside the frustum.
    pub fn contains_any_point(&self, points: &[Point3<F>]) -> bool {
        points.iter().any(|point| self.contains_point(point))
    }

    /// Whether any part of the given sphere could be inside the frustum. The
    /// sphere is only rejected when it lies entirely in the negative halfspace
    /// of one of the planes, so spheres just outside a frustum edge or corner
    /// are accepted.
    pub fn intersects_sphere(&self, sphere: &Sphere<F>) -> bool {
        let negative_radius = -sphere.radius();
        self.planes
            .iter()
            .all(|plane| plane.signed_distance(sphere.center()) >= negative_radius)
    }

    /// Returns zero if the given sphere lies entirely outside any of the
    /// planes. Otherwise returns the signed distance from the front plane to
    /// the sphere center plus the sphere radius, which for a sphere in view
    /// measures how far it extends beyond the near plane.
    pub fn sphere_distance(&self, sphere: &Sphere<F>) -> F {
        let mut distance = F::ZERO;
        for plane in &self.planes {
            distance = plane.signed_distance(sphere.center());
            if distance < -sphere.radius() {
                return F::ZERO;
            }
        }
        distance + sphere.radius()
    }

    /// Whether any part of the given axis-aligned box is considered to be
    /// inside the frustum.
    ///
    /// The box is accepted if its bounding sphere passes
    /// [`Self::intersects_sphere`] or if any of its corners lie inside the
    /// frustum. Boxes near a frustum edge or corner may be accepted even
    /// though they lie outside, but a box with any part inside is never
    /// rejected.
    pub fn intersects_axis_aligned_box(&self, aabb: &AxisAlignedBox<F>) -> bool {
        if self.intersects_sphere(&Sphere::bounding_axis_aligned_box(aabb)) {
            return true;
        }
        (0..8).any(|corner_idx| self.contains_point(&aabb.corner(corner_idx)))
    }

    /// Whether any part of the axis-aligned cube with the given center and
    /// half side length is considered to be inside the frustum.
    ///
    /// The cube is accepted if its inscribed sphere (radius `half_size`)
    /// passes [`Self::intersects_sphere`] or if any of its corners lie inside
    /// the frustum. This is stricter than
    /// [`Self::intersects_axis_aligned_box`] for the same cube.
    ///
    /// # Panics
    /// If `half_size` is negative.
    pub fn intersects_cube(&self, center: &Point3<F>, half_size: F) -> bool {
        if self.intersects_sphere(&Sphere::new(*center, half_size)) {
            return true;
        }
        (0..8).any(|corner_idx| {
            let offset = Vector3::new(
                if corner_idx & 4 == 0 { -half_size } else { half_size },
                if corner_idx & 2 == 0 { -half_size } else { half_size },
                if corner_idx & 1 == 0 { -half_size } else { half_size },
            );
            self.contains_point(&(center + offset))
        })
    }

    fn planes_from_transform_matrix(transform_matrix: &Matrix4<F>) -> [Plane<F>; 6] {
        let m = transform_matrix;

        let plane_from_rows = |row: usize, sign: F| {
            Plane::from_unnormalized_coefficients(
                m[(3, 0)] + sign * m[(row, 0)],
                m[(3, 1)] + sign * m[(row, 1)],
                m[(3, 2)] + sign * m[(row, 2)],
                m[(3, 3)] + sign * m[(row, 3)],
            )
            .normalized()
        };

        let right = plane_from_rows(0, F::NEG_ONE);
        let left = plane_from_rows(0, F::ONE);
        let bottom = plane_from_rows(1, F::ONE);
        let top = plane_from_rows(1, F::NEG_ONE);
        let back = plane_from_rows(2, F::NEG_ONE);
        let front = plane_from_rows(2, F::ONE);

        [right, left, bottom, top, back, front]
    }
}

impl<F: Float> Default for Frustum<F> {
    fn default() -> Self {
        Self::for_identity_transform()
    }
}

impl<F: Float> AbsDiffEq for Frustum<F> {
    type Epsilon = F;

    fn default_epsilon() -> F {
        F::default_epsilon()
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: F) -> bool {
        self.planes
            .iter()
            .zip(&other.planes)
            .all(|(plane, other_plane)| plane.abs_diff_eq(other_plane, epsilon))
            && self
                .transform_matrix
                .abs_diff_eq(&other.transform_matrix, epsilon)
    }
}
