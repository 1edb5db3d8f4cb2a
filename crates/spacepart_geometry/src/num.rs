//! Numbers and numerics.

use nalgebra as na;
use num_traits as nt;

/// Gathers traits useful for working with generic floating point types.
pub trait Float: Copy + nt::FloatConst + nt::FromPrimitive + na::RealField + na::Scalar {
    const ZERO: Self;
    const ONE: Self;
    const TWO: Self;
    const THREE: Self;
    const HALF: Self;
    const NEG_ONE: Self;
    const INFINITY: Self;
    const NEG_INFINITY: Self;
    /// Determinants smaller than this in magnitude are treated as zero in
    /// ray-triangle tests.
    const INTERSECTION_EPSILON: Self;
}

macro_rules! impl_float {
    ($f:ty) => {
        impl Float for $f {
            const ZERO: Self = 0.0;
            const ONE: Self = 1.0;
            const TWO: Self = 2.0;
            const THREE: Self = 3.0;
            const HALF: Self = 0.5;
            const NEG_ONE: Self = -1.0;
            const INFINITY: Self = <$f>::INFINITY;
            const NEG_INFINITY: Self = <$f>::NEG_INFINITY;
            const INTERSECTION_EPSILON: Self = 1e-6;
        }
    };
}

impl_float!(f32);
impl_float!(f64);

/// Whether the given value is NaN. Written without a `num_traits::Float`
/// bound to avoid method ambiguity with [`na::RealField`].
#[allow(clippy::eq_op)]
#[inline]
pub fn is_nan<F: Float>(value: F) -> bool {
    value != value
}
