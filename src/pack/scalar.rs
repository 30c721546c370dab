//! Scalar trait lookup for everything that can flow through a [`Pack`],
//! a reduction, or a workspace buffer.
//!
//! Two traits live here:
//!
//! - [`Scalar`] is the bound on pack *lanes*: plain arithmetic types with a
//!   sentinel "invalid" value (quiet NaN for floats, the maximum representable
//!   value for integers). The sentinel is what lets downstream code detect
//!   garbage lanes that should never have been read.
//! - [`ScalarTraits`] is the compile-time lookup used by the reduction
//!   utilities and the workspace: for any value type it names the underlying
//!   scalar, the lane count, and whether the type is packed.
//!
//! Nested packs are unrepresentable by construction: `Pack<T, N>` requires
//! `T: Scalar`, and `Pack` itself never implements `Scalar`.
//!
//! [`Pack`]: crate::pack::Pack

use num::traits::NumAssignOps;
use num::{Bounded, Float, Num, NumCast};

use crate::pack::Pack;

/// An arithmetic lane type: the building block of a [`Pack`].
///
/// Implemented for the primitive floats and integers via the macros below.
/// Every implementor provides a sentinel [`invalid`](Scalar::invalid) value
/// that default-constructed packs are filled with.
pub trait Scalar:
    Copy + PartialOrd + Num + NumCast + NumAssignOps + Send + Sync + 'static
{
    /// True only for `f32`. On accelerator-like topologies single-precision
    /// values double the per-lane throughput, which halves the effective
    /// concurrency for everything else (see `TeamUtils`).
    const IS_SINGLE_PRECISION: bool;

    /// Sentinel value for uninitialized lanes: quiet NaN for floating-point
    /// types, the maximum representable value for integral types.
    fn invalid() -> Self;

    /// Quiet NaN.
    ///
    /// # Panics
    ///
    /// Panics for integral types; NaN only exists for floating-point scalars.
    fn quiet_nan() -> Self;

    /// Lane-wise NaN test support. Always false for integral types.
    fn is_nan_value(self) -> bool;
}

/// Compile-time facts about a value type flowing through reductions or
/// workspace views: its underlying scalar, its lane count, and whether it is
/// a packed (SIMD) type.
pub trait ScalarTraits: Copy + Send + Sync + 'static {
    /// The underlying scalar: `Self` for plain scalars, the lane type for
    /// packs.
    type Scalar: Scalar;

    /// True exactly for `Pack<T, N>`.
    const IS_SIMD: bool;

    /// Lane count: 1 for plain scalars, `N` for `Pack<T, N>`.
    const LANES: usize;

    /// Every lane set to [`Scalar::invalid`].
    fn invalid_value() -> Self;

    /// Every lane set to quiet NaN (floats only, see [`Scalar::quiet_nan`]).
    fn quiet_nan_value() -> Self;

    /// Read lane `i`. For plain scalars only lane 0 exists.
    fn lane(&self, i: usize) -> Self::Scalar;

    /// Fold all lanes into their sum, in an unspecified (vectorizable)
    /// association order.
    fn sum_lanes(&self) -> Self::Scalar;
}

macro_rules! impl_float_scalar {
    ($t:ty, $single:expr) => {
        impl Scalar for $t {
            const IS_SINGLE_PRECISION: bool = $single;

            #[inline(always)]
            fn invalid() -> Self {
                <$t>::nan()
            }

            #[inline(always)]
            fn quiet_nan() -> Self {
                <$t>::nan()
            }

            #[inline(always)]
            fn is_nan_value(self) -> bool {
                Float::is_nan(self)
            }
        }

        impl ScalarTraits for $t {
            type Scalar = $t;
            const IS_SIMD: bool = false;
            const LANES: usize = 1;

            #[inline(always)]
            fn invalid_value() -> Self {
                <$t as Scalar>::invalid()
            }

            #[inline(always)]
            fn quiet_nan_value() -> Self {
                <$t as Scalar>::quiet_nan()
            }

            #[inline(always)]
            fn lane(&self, _i: usize) -> Self {
                *self
            }

            #[inline(always)]
            fn sum_lanes(&self) -> Self {
                *self
            }
        }
    };
}

macro_rules! impl_int_scalar {
    ($($t:ty),* $(,)?) => {
        $(
            impl Scalar for $t {
                const IS_SINGLE_PRECISION: bool = false;

                #[inline(always)]
                fn invalid() -> Self {
                    <$t as Bounded>::max_value()
                }

                fn quiet_nan() -> Self {
                    panic!("quiet NaN is only available for floating point scalars");
                }

                #[inline(always)]
                fn is_nan_value(self) -> bool {
                    false
                }
            }

            impl ScalarTraits for $t {
                type Scalar = $t;
                const IS_SIMD: bool = false;
                const LANES: usize = 1;

                #[inline(always)]
                fn invalid_value() -> Self {
                    <$t as Scalar>::invalid()
                }

                fn quiet_nan_value() -> Self {
                    <$t as Scalar>::quiet_nan()
                }

                #[inline(always)]
                fn lane(&self, _i: usize) -> Self {
                    *self
                }

                #[inline(always)]
                fn sum_lanes(&self) -> Self {
                    *self
                }
            }
        )*
    };
}

impl_float_scalar!(f32, true);
impl_float_scalar!(f64, false);
impl_int_scalar!(i32, i64, u32, u64, isize, usize);

impl<T: Scalar, const N: usize> ScalarTraits for Pack<T, N> {
    type Scalar = T;
    const IS_SIMD: bool = true;
    const LANES: usize = N;

    #[inline(always)]
    fn invalid_value() -> Self {
        Pack::invalid()
    }

    #[inline(always)]
    fn quiet_nan_value() -> Self {
        Pack::splat(T::quiet_nan())
    }

    #[inline(always)]
    fn lane(&self, i: usize) -> T {
        self[i]
    }

    #[inline(always)]
    fn sum_lanes(&self) -> T {
        crate::pack::math::reduce_sum::<false, T, N>(*self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_invalid_is_nan() {
        assert!(f32::invalid().is_nan());
        assert!(f64::invalid().is_nan());
        assert!(f64::quiet_nan().is_nan());
    }

    #[test]
    fn int_invalid_is_max() {
        assert_eq!(<i32 as Scalar>::invalid(), i32::MAX);
        assert_eq!(<u64 as Scalar>::invalid(), u64::MAX);
        assert_eq!(<usize as Scalar>::invalid(), usize::MAX);
    }

    #[test]
    fn single_precision_flag() {
        assert!(f32::IS_SINGLE_PRECISION);
        assert!(!f64::IS_SINGLE_PRECISION);
        assert!(!i64::IS_SINGLE_PRECISION);
    }

    #[test]
    fn scalar_traits_shape() {
        assert!(!<f64 as ScalarTraits>::IS_SIMD);
        assert_eq!(<f64 as ScalarTraits>::LANES, 1);
        assert!(<Pack<f64, 4> as ScalarTraits>::IS_SIMD);
        assert_eq!(<Pack<f64, 4> as ScalarTraits>::LANES, 4);
    }

    #[test]
    fn nan_detection() {
        assert!(f64::NAN.is_nan_value());
        assert!(!1.0f64.is_nan_value());
        assert!(!7i32.is_nan_value());
    }

    #[test]
    #[should_panic]
    fn int_quiet_nan_panics() {
        let _ = <i32 as Scalar>::quiet_nan();
    }
}
